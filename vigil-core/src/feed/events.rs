//! Feed event types and the payload classifier.
//!
//! Every frame on the wire carries a JSON envelope of the form
//! `{"type": "<kind>", "data": { ... }}`. The classifier dispatches on the
//! `type` discriminator and validates the body for the kinds the live feed
//! understands. Unknown kinds are passed through as [`FeedMessage::Other`]
//! so newer servers can add frame types without breaking older clients.

use crate::error::FeedError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Discriminator value for threat frames.
pub const KIND_THREAT: &str = "threat";
/// Discriminator value for metrics frames.
pub const KIND_METRICS: &str = "metrics";

/// Highest accepted value for [`ThreatEvent::risk`].
pub const MAX_RISK: u8 = 100;

/// Severity of a threat event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

impl Severity {
    pub const ALL: [Severity; 4] = [
        Severity::Critical,
        Severity::High,
        Severity::Medium,
        Severity::Low,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "critical" => Ok(Severity::Critical),
            "high" => Ok(Severity::High),
            "medium" => Ok(Severity::Medium),
            "low" => Ok(Severity::Low),
            other => Err(format!("unknown severity '{}'", other)),
        }
    }
}

/// A single threat observation. Immutable once accepted into the buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreatEvent {
    /// Opaque identifier, unique per event.
    pub id: String,
    pub timestamp: String,
    pub message: String,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Attack category, e.g. `"ddos"` or `"phishing"`.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Risk score in `0..=100`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk: Option<u8>,
}

impl ThreatEvent {
    /// Check the fields serde cannot express.
    pub fn validate(&self) -> Result<(), FeedError> {
        let invalid = |reason: &str| FeedError::InvalidEvent {
            kind: KIND_THREAT.to_string(),
            reason: reason.to_string(),
        };
        if self.id.trim().is_empty() {
            return Err(invalid("id must not be empty"));
        }
        if self.timestamp.trim().is_empty() {
            return Err(invalid("timestamp must not be empty"));
        }
        if self.message.trim().is_empty() {
            return Err(invalid("message must not be empty"));
        }
        if let Some(risk) = self.risk
            && risk > MAX_RISK
        {
            return Err(invalid(&format!("risk {} exceeds {}", risk, MAX_RISK)));
        }
        Ok(())
    }
}

/// Dashboard counters. Replaced wholesale on every update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub total_alerts: u64,
    pub it_alerts: u64,
    pub critical_anomalies: u64,
    pub vulnerabilities: u64,
    /// Mean time to detect, preformatted (e.g. `"4.2m"`).
    pub mttd: String,
    pub events_per_min: u64,
    pub active_incidents: u64,
    pub blocked_threats: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uae_threats: Option<u64>,
}

/// A classified inbound payload.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedMessage {
    Threat(ThreatEvent),
    Metrics(MetricsSnapshot),
    /// A well-formed envelope of a kind the live feed does not consume
    /// (`firmware`, `vulnerability`, or anything newer).
    Other { kind: String },
}

impl FeedMessage {
    pub fn kind(&self) -> &str {
        match self {
            FeedMessage::Threat(_) => KIND_THREAT,
            FeedMessage::Metrics(_) => KIND_METRICS,
            FeedMessage::Other { kind } => kind,
        }
    }
}

/// Wire envelope, used by the gateway when emitting frames.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: Value,
}

impl Envelope {
    pub fn threat(event: &ThreatEvent) -> Self {
        Self {
            kind: KIND_THREAT.to_string(),
            data: serde_json::to_value(event).unwrap_or(Value::Null),
        }
    }

    pub fn metrics(snapshot: &MetricsSnapshot) -> Self {
        Self {
            kind: KIND_METRICS.to_string(),
            data: serde_json::to_value(snapshot).unwrap_or(Value::Null),
        }
    }

    pub fn other(kind: impl Into<String>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            data,
        }
    }

    pub fn is_threat(&self) -> bool {
        self.kind == KIND_THREAT
    }

    /// Serialize to the single-line JSON carried in a `data:` field.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Classify a raw payload string.
pub fn classify(raw: &str) -> Result<FeedMessage, FeedError> {
    let value: Value = serde_json::from_str(raw).map_err(|e| FeedError::MalformedPayload {
        message: e.to_string(),
    })?;
    classify_value(value)
}

/// Classify an already-parsed payload.
pub fn classify_value(mut value: Value) -> Result<FeedMessage, FeedError> {
    let kind = match value.get("type").and_then(Value::as_str) {
        Some(kind) => kind.to_string(),
        None => return Err(FeedError::MissingType),
    };
    let body = value
        .get_mut("data")
        .map(Value::take)
        .unwrap_or(Value::Null);

    match kind.as_str() {
        KIND_THREAT => {
            let event: ThreatEvent =
                serde_json::from_value(body).map_err(|e| FeedError::InvalidEvent {
                    kind: kind.clone(),
                    reason: e.to_string(),
                })?;
            event.validate()?;
            Ok(FeedMessage::Threat(event))
        }
        KIND_METRICS => {
            let snapshot: MetricsSnapshot =
                serde_json::from_value(body).map_err(|e| FeedError::InvalidEvent {
                    kind: kind.clone(),
                    reason: e.to_string(),
                })?;
            Ok(FeedMessage::Metrics(snapshot))
        }
        _ => Ok(FeedMessage::Other { kind }),
    }
}
