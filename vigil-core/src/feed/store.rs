//! Subscriber-owned feed state and the consumer pause gate.
//!
//! Every inbound payload is classified, even while paused, so the stream
//! never stalls. Only the apply step is gated.

use super::buffer::ThreatBuffer;
use super::connection::ConnectionState;
use super::events::{FeedMessage, MetricsSnapshot, ThreatEvent, classify};
use crate::error::FeedError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

/// Longest payload prefix echoed into logs.
const PREVIEW_LEN: usize = 200;

/// Outcome of ingesting one payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Ingest {
    Threat(ThreatEvent),
    Metrics(MetricsSnapshot),
    /// Valid, but dropped by the pause gate.
    Suppressed,
    /// Valid envelope of a kind the feed does not consume.
    Ignored { kind: String },
    /// Malformed or invalid payload.
    Rejected(FeedError),
}

impl Ingest {
    /// Whether observable state changed.
    pub fn is_applied(&self) -> bool {
        matches!(self, Ingest::Threat(_) | Ingest::Metrics(_))
    }
}

/// Running ingestion counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FeedStats {
    pub received: u64,
    pub applied_threats: u64,
    pub applied_metrics: u64,
    pub suppressed: u64,
    pub rejected: u64,
    pub ignored: u64,
}

/// Mutable state of one subscriber.
#[derive(Debug)]
pub struct FeedState {
    threats: ThreatBuffer,
    metrics: Option<MetricsSnapshot>,
    paused: bool,
    status: ConnectionState,
    attempts: u32,
    last_error: Option<String>,
    last_event_at: Option<DateTime<Utc>>,
    stats: FeedStats,
}

impl FeedState {
    pub fn new(threat_capacity: usize) -> Self {
        Self {
            threats: ThreatBuffer::new(threat_capacity),
            metrics: None,
            paused: false,
            status: ConnectionState::Idle,
            attempts: 0,
            last_error: None,
            last_event_at: None,
            stats: FeedStats::default(),
        }
    }

    /// Classify a raw payload and apply it unless paused.
    pub fn ingest_raw(&mut self, raw: &str) -> Ingest {
        self.stats.received += 1;
        match classify(raw) {
            Ok(message) => self.apply(message),
            Err(e) => {
                self.stats.rejected += 1;
                warn!(
                    error = %e,
                    preview = %preview(raw),
                    "Discarding feed payload"
                );
                Ingest::Rejected(e)
            }
        }
    }

    /// Apply an already classified message unless paused.
    pub fn apply(&mut self, message: FeedMessage) -> Ingest {
        if let FeedMessage::Other { kind } = message {
            self.stats.ignored += 1;
            debug!(kind = kind.as_str(), "Ignoring feed message kind");
            return Ingest::Ignored { kind };
        }

        if self.paused {
            self.stats.suppressed += 1;
            return Ingest::Suppressed;
        }

        self.last_event_at = Some(Utc::now());
        match message {
            FeedMessage::Threat(event) => {
                self.stats.applied_threats += 1;
                if let Some(evicted) = self.threats.push(event.clone()) {
                    debug!(id = evicted.id.as_str(), "Evicted oldest threat");
                }
                Ingest::Threat(event)
            }
            FeedMessage::Metrics(snapshot) => {
                self.stats.applied_metrics += 1;
                self.metrics = Some(snapshot.clone());
                Ingest::Metrics(snapshot)
            }
            FeedMessage::Other { kind } => Ingest::Ignored { kind },
        }
    }

    /// Flip the pause gate. Returns the new value.
    pub fn toggle_pause(&mut self) -> bool {
        self.paused = !self.paused;
        self.paused
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Empty the threat buffer. Metrics and connection are untouched.
    pub fn clear(&mut self) -> usize {
        let removed = self.threats.len();
        self.threats.clear();
        removed
    }

    pub fn set_status(&mut self, status: ConnectionState, attempts: u32) {
        self.status = status;
        self.attempts = attempts;
    }

    pub fn set_last_error(&mut self, error: Option<String>) {
        self.last_error = error;
    }

    pub fn status(&self) -> ConnectionState {
        self.status
    }

    pub fn is_connected(&self) -> bool {
        self.status == ConnectionState::Open
    }

    pub fn threats(&self) -> &ThreatBuffer {
        &self.threats
    }

    pub fn metrics(&self) -> Option<&MetricsSnapshot> {
        self.metrics.as_ref()
    }

    pub fn stats(&self) -> FeedStats {
        self.stats
    }

    pub fn snapshot(&self) -> FeedSnapshot {
        FeedSnapshot {
            status: self.status,
            connected: self.is_connected(),
            attempts: self.attempts,
            paused: self.paused,
            threats: self.threats.to_vec(),
            metrics: self.metrics.clone(),
            last_error: self.last_error.clone(),
            last_event_at: self.last_event_at,
            stats: self.stats,
        }
    }
}

/// Point-in-time copy of [`FeedState`] for consumers.
#[derive(Debug, Clone, Serialize)]
pub struct FeedSnapshot {
    pub status: ConnectionState,
    pub connected: bool,
    pub attempts: u32,
    pub paused: bool,
    /// Most recent first.
    pub threats: Vec<ThreatEvent>,
    pub metrics: Option<MetricsSnapshot>,
    pub last_error: Option<String>,
    pub last_event_at: Option<DateTime<Utc>>,
    pub stats: FeedStats,
}

fn preview(raw: &str) -> &str {
    match raw.char_indices().nth(PREVIEW_LEN) {
        Some((idx, _)) => &raw[..idx],
        None => raw,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn threat(id: &str) -> String {
        json!({
            "type": "threat",
            "data": {
                "id": id,
                "timestamp": "2026-10-19T10:00:00Z",
                "message": "Port scan detected",
                "severity": "medium"
            }
        })
        .to_string()
    }

    fn metrics(total: u64) -> String {
        json!({
            "type": "metrics",
            "data": {
                "totalAlerts": total,
                "itAlerts": 1,
                "criticalAnomalies": 2,
                "vulnerabilities": 3,
                "mttd": "3.9m",
                "eventsPerMin": 4,
                "activeIncidents": 5,
                "blockedThreats": 6,
                "uaeThreats": 7
            }
        })
        .to_string()
    }

    #[test]
    fn test_threats_are_prepended() {
        let mut state = FeedState::new(100);
        assert!(state.ingest_raw(&threat("a")).is_applied());
        assert!(state.ingest_raw(&threat("b")).is_applied());
        let ids: Vec<_> = state.threats().iter().map(|e| e.id.clone()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn test_metrics_replace_wholesale() {
        let mut state = FeedState::new(10);
        state.ingest_raw(&metrics(10));
        state.ingest_raw(&metrics(20));
        let m = state.metrics().unwrap();
        assert_eq!(m.total_alerts, 20);
        assert_eq!(m.uae_threats, Some(7));
        assert_eq!(state.stats().applied_metrics, 2);
    }

    #[test]
    fn test_malformed_payload_is_rejected_and_counted() {
        let mut state = FeedState::new(10);
        state.ingest_raw(&threat("ok"));
        let outcome = state.ingest_raw("{not json");
        assert!(matches!(
            outcome,
            Ingest::Rejected(FeedError::MalformedPayload { .. })
        ));
        assert_eq!(state.threats().len(), 1);
        assert_eq!(state.stats().rejected, 1);
        assert_eq!(state.stats().received, 2);
    }

    #[test]
    fn test_pause_suppresses_then_resumes() {
        let mut state = FeedState::new(10);
        state.ingest_raw(&metrics(1));
        assert!(state.toggle_pause());

        assert_eq!(state.ingest_raw(&threat("dropped")), Ingest::Suppressed);
        assert_eq!(state.ingest_raw(&metrics(99)), Ingest::Suppressed);
        assert!(state.threats().is_empty());
        assert_eq!(state.metrics().unwrap().total_alerts, 1);

        assert!(!state.toggle_pause());
        state.ingest_raw(&threat("kept"));
        let ids: Vec<_> = state.threats().iter().map(|e| e.id.clone()).collect();
        assert_eq!(ids, vec!["kept"]);
        assert_eq!(state.stats().suppressed, 2);
    }

    #[test]
    fn test_paused_still_rejects_malformed() {
        let mut state = FeedState::new(10);
        state.set_paused(true);
        assert!(matches!(state.ingest_raw("]"), Ingest::Rejected(_)));
    }

    #[test]
    fn test_unknown_kinds_are_ignored() {
        let mut state = FeedState::new(10);
        let raw = json!({"type": "vulnerability", "data": {"cve": "CVE-2026-0001"}}).to_string();
        assert_eq!(
            state.ingest_raw(&raw),
            Ingest::Ignored {
                kind: "vulnerability".into()
            }
        );
        assert!(state.threats().is_empty());
        assert!(state.metrics().is_none());
    }

    #[test]
    fn test_clear_keeps_metrics() {
        let mut state = FeedState::new(10);
        state.ingest_raw(&threat("a"));
        state.ingest_raw(&threat("b"));
        state.ingest_raw(&metrics(5));
        state.set_paused(true);
        assert_eq!(state.clear(), 2);
        assert!(state.threats().is_empty());
        assert!(state.metrics().is_some());
        assert!(state.is_paused());
    }

    #[test]
    fn test_snapshot_reflects_state() {
        let mut state = FeedState::new(10);
        state.set_status(ConnectionState::Open, 0);
        state.ingest_raw(&threat("x"));
        let snap = state.snapshot();
        assert!(snap.connected);
        assert_eq!(snap.threats.len(), 1);
        assert!(snap.last_event_at.is_some());

        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["status"], "open");
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        let long = "é".repeat(300);
        assert_eq!(preview(&long).chars().count(), PREVIEW_LEN);
        assert_eq!(preview("short"), "short");
    }
}
