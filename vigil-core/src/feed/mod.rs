//! # Live Feed
//!
//! Subscription client for the simulated SOC telemetry stream. A single
//! server-push connection per subscriber is opened, decoded, classified,
//! and folded into a bounded threat history plus a latest-value metrics
//! cell. Reconnection follows a bounded retry policy; a consumer-facing
//! pause gate suppresses state changes without closing the transport.

pub mod backoff;
pub mod buffer;
pub mod client;
pub mod connection;
pub mod events;
pub mod frame;
pub mod store;
pub mod transport;

pub use backoff::{BackoffStrategy, RetryDecision, RetryPolicy, RetryState};
pub use buffer::{DEFAULT_THREAT_CAPACITY, ThreatBuffer};
pub use client::{FeedClient, FeedConnection, FeedUpdate, SharedFeedState};
pub use connection::{ConnectionManager, ConnectionState};
pub use events::{
    Envelope, FeedMessage, MetricsSnapshot, Severity, ThreatEvent, classify, classify_value,
};
pub use frame::{DEFAULT_MAX_FRAME_BYTES, FrameDecoder};
pub use store::{FeedSnapshot, FeedState, FeedStats, Ingest};
pub use transport::{
    ChannelTransport, FeedTransport, HttpTransportFactory, PollingTransport, SseTransport,
    TransportEvent, TransportFactory,
};

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Which transport the client uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedMode {
    /// Long-lived server-push stream.
    #[default]
    Stream,
    /// Periodic JSON polling of the snapshot endpoints.
    Polling,
}

/// Configuration for the live-feed client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Base URL of the telemetry gateway.
    pub server_url: String,
    /// Path of the server-push endpoint.
    pub stream_path: String,
    /// Stream or polling fallback.
    pub mode: FeedMode,
    /// Delay between subscriber start and the first connect.
    pub startup_delay_ms: u64,
    /// Reconnect attempts before giving up.
    pub max_retries: u32,
    /// Base reconnect delay.
    pub retry_base_delay_ms: u64,
    /// Upper bound for exponential reconnect delays.
    pub retry_max_delay_ms: u64,
    /// How reconnect delays grow with the attempt number.
    pub backoff: BackoffStrategy,
    /// Maximum retained threat events.
    pub threat_capacity: usize,
    /// Polling mode: interval between polls.
    pub poll_interval_ms: u64,
    /// Polling mode: threats requested per poll.
    pub poll_threat_limit: usize,
    /// TCP connect timeout for HTTP transports.
    pub connect_timeout_secs: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:18790".to_string(),
            stream_path: "/api/sse".to_string(),
            mode: FeedMode::Stream,
            startup_delay_ms: 1000,
            max_retries: backoff::DEFAULT_MAX_ATTEMPTS,
            retry_base_delay_ms: backoff::DEFAULT_BASE_DELAY_MS,
            retry_max_delay_ms: backoff::DEFAULT_MAX_DELAY_MS,
            backoff: BackoffStrategy::Linear,
            threat_capacity: DEFAULT_THREAT_CAPACITY,
            poll_interval_ms: 5000,
            poll_threat_limit: 20,
            connect_timeout_secs: 10,
        }
    }
}

impl FeedConfig {
    pub fn stream_url(&self) -> String {
        join_url(&self.server_url, &self.stream_path)
    }

    pub fn metrics_url(&self) -> String {
        join_url(&self.server_url, "/api/metrics")
    }

    pub fn threats_url(&self) -> String {
        format!(
            "{}?limit={}",
            join_url(&self.server_url, "/api/threats"),
            self.poll_threat_limit
        )
    }

    pub fn startup_delay(&self) -> Duration {
        Duration::from_millis(self.startup_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Build a fresh retry policy from these settings.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_retries,
            Duration::from_millis(self.retry_base_delay_ms),
        )
        .with_strategy(self.backoff)
        .with_max_delay(Duration::from_millis(self.retry_max_delay_ms))
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
