//! # Telemetry Gateway
//!
//! Serves simulated SOC telemetry over HTTP: two server-push streams
//! (`/api/sse` and `/api/threatmap`) plus JSON snapshot endpoints used by
//! the polling fallback. A background task ticks the simulator and fans
//! frames out to every stream subscriber.

mod server;
mod simulator;

pub use server::{
    GatewayServer, SharedGateway, router as gateway_router, run as run_gateway,
    run_simulation, serve as serve_gateway,
};
pub use simulator::TelemetrySimulator;

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the telemetry gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Host to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Interval between simulator ticks.
    pub tick_interval_ms: u64,
    /// A metrics frame is emitted every this many ticks.
    pub metrics_every_ticks: u64,
    /// A firmware or vulnerability frame is emitted every this many ticks.
    pub peripheral_every_ticks: u64,
    /// Threats retained for `/api/threats`.
    pub recent_capacity: usize,
    /// Frames buffered per stream subscriber before it starts skipping.
    pub broadcast_capacity: usize,
    /// Fixed simulator seed. Random when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 18790,
            tick_interval_ms: 2000,
            metrics_every_ticks: 3,
            peripheral_every_ticks: 10,
            recent_capacity: 100,
            broadcast_capacity: 256,
            seed: None,
        }
    }
}

impl GatewayConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}
