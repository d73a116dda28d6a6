//! # Vigil Core
//!
//! Core library for the Vigil SOC live feed.
//! Provides the subscription client (connection manager, retry policy,
//! classifier, threat buffer, pause gate), its transports, the simulated
//! telemetry gateway, configuration, and the error taxonomy.

pub mod config;
pub mod error;
pub mod feed;
pub mod gateway;

// Re-export commonly used types at the crate root.
pub use config::{VigilConfig, load_config};
pub use error::{ConfigError, FeedError, GatewayError, Result, TransportError, VigilError};
pub use feed::{
    ConnectionState, FeedClient, FeedConfig, FeedConnection, FeedMode, FeedSnapshot, FeedUpdate,
    MetricsSnapshot, Severity, ThreatEvent,
};
pub use gateway::{GatewayConfig, GatewayServer, SharedGateway};
