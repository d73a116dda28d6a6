//! Telemetry gateway server built on axum.

use super::GatewayConfig;
use super::simulator::TelemetrySimulator;
use crate::error::GatewayError;
use crate::feed::buffer::ThreatBuffer;
use crate::feed::events::{Envelope, MetricsSnapshot, Severity, ThreatEvent};
use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::get,
};
use chrono::Utc;
use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, broadcast};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, trace, warn};

/// Default page size for `/api/threats`.
const DEFAULT_THREAT_LIMIT: usize = 20;

/// Thread-safe shared gateway reference for axum handlers.
pub type SharedGateway = Arc<Mutex<GatewayServer>>;

/// Simulated telemetry source plus the state the JSON endpoints serve.
pub struct GatewayServer {
    config: GatewayConfig,
    simulator: TelemetrySimulator,
    recent: ThreatBuffer,
    metrics: MetricsSnapshot,
    ticks: u64,
    event_tx: broadcast::Sender<Envelope>,
    /// Fires when open streams must end.
    streams_closed: CancellationToken,
    started_at: chrono::DateTime<Utc>,
}

impl std::fmt::Debug for GatewayServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayServer")
            .field("config", &self.config)
            .field("ticks", &self.ticks)
            .field("recent", &self.recent.len())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl GatewayServer {
    pub fn new(config: GatewayConfig) -> Self {
        let mut simulator = TelemetrySimulator::new(config.seed);
        let metrics = simulator.next_metrics();
        let recent = ThreatBuffer::new(config.recent_capacity);
        let (event_tx, _) = broadcast::channel(config.broadcast_capacity.max(1));

        Self {
            config,
            simulator,
            recent,
            metrics,
            ticks: 0,
            event_tx,
            streams_closed: CancellationToken::new(),
            started_at: Utc::now(),
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn metrics(&self) -> &MetricsSnapshot {
        &self.metrics
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Advance the simulation one step and broadcast the produced frames.
    ///
    /// Every tick yields a threat; metrics and peripheral frames follow on
    /// their configured cadence.
    pub fn tick(&mut self) -> Vec<Envelope> {
        self.ticks += 1;

        let threat = self.simulator.next_threat();
        let mut frames = vec![Envelope::threat(&threat)];
        self.recent.push(threat);

        if self.ticks % self.config.metrics_every_ticks.max(1) == 0 {
            self.metrics = self.simulator.next_metrics();
            frames.push(Envelope::metrics(&self.metrics));
        }
        if self.config.peripheral_every_ticks > 0
            && self.ticks % self.config.peripheral_every_ticks == 0
        {
            frames.push(self.simulator.next_peripheral());
        }

        for frame in &frames {
            self.broadcast(frame.clone());
        }
        frames
    }

    /// Most recent threats first, optionally filtered by severity.
    pub fn recent_threats(&self, severity: Option<Severity>, limit: usize) -> Vec<ThreatEvent> {
        self.recent
            .iter()
            .filter(|e| severity.is_none_or(|s| e.severity == s))
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.event_tx.subscribe()
    }

    /// Broadcast a frame to every stream subscriber. Returns the number of
    /// receivers.
    pub fn broadcast(&self, frame: Envelope) -> usize {
        self.event_tx.send(frame).unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.event_tx.receiver_count()
    }

    /// Token that ends every open stream once cancelled.
    pub fn streams_closed(&self) -> CancellationToken {
        self.streams_closed.clone()
    }

    /// End every open stream. New streams end immediately.
    pub fn close_streams(&self) {
        self.streams_closed.cancel();
    }

    pub fn uptime_secs(&self) -> u64 {
        (Utc::now() - self.started_at).num_seconds().max(0) as u64
    }
}

/// Build the axum Router with the stream, snapshot, and health routes.
pub fn router(shared: SharedGateway) -> Router {
    Router::new()
        .route("/api/sse", get(sse_handler))
        .route("/api/threatmap", get(threatmap_handler))
        .route("/api/metrics", get(metrics_handler))
        .route("/api/threats", get(threats_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(shared)
}

/// Every envelope, starting with the current metrics.
async fn sse_handler(State(gw): State<SharedGateway>) -> impl IntoResponse {
    let (initial, rx, closed) = {
        let gw = gw.lock().await;
        (
            vec![Envelope::metrics(gw.metrics())],
            gw.subscribe(),
            gw.streams_closed(),
        )
    };
    debug!("Stream subscriber attached to /api/sse");
    Sse::new(envelope_stream(initial, rx, false, closed)).keep_alive(KeepAlive::default())
}

/// Threat envelopes only.
async fn threatmap_handler(State(gw): State<SharedGateway>) -> impl IntoResponse {
    let (rx, closed) = {
        let gw = gw.lock().await;
        (gw.subscribe(), gw.streams_closed())
    };
    debug!("Stream subscriber attached to /api/threatmap");
    Sse::new(envelope_stream(Vec::new(), rx, true, closed)).keep_alive(KeepAlive::default())
}

async fn metrics_handler(State(gw): State<SharedGateway>) -> impl IntoResponse {
    let gw = gw.lock().await;
    Json(json!({ "data": gw.metrics() }))
}

#[derive(Debug, Deserialize)]
struct ThreatsQuery {
    severity: Option<String>,
    limit: Option<usize>,
}

async fn threats_handler(
    State(gw): State<SharedGateway>,
    Query(params): Query<ThreatsQuery>,
) -> Response {
    let severity = match params.severity.as_deref() {
        None | Some("") => None,
        Some(raw) => match raw.parse::<Severity>() {
            Ok(s) => Some(s),
            Err(e) => {
                return (StatusCode::BAD_REQUEST, Json(json!({ "error": e }))).into_response();
            }
        },
    };

    let gw = gw.lock().await;
    let limit = params
        .limit
        .unwrap_or(DEFAULT_THREAT_LIMIT)
        .min(gw.config().recent_capacity);
    let threats = gw.recent_threats(severity, limit);
    let total = threats.len();
    Json(json!({ "data": threats, "total": total })).into_response()
}

/// Health check endpoint.
async fn health_handler(State(gw): State<SharedGateway>) -> impl IntoResponse {
    let gw = gw.lock().await;
    Json(json!({
        "status": "ok",
        "uptime_secs": gw.uptime_secs(),
        "subscribers": gw.subscriber_count(),
        "ticks": gw.ticks(),
    }))
}

/// Turn a broadcast receiver into an SSE event stream. Lagging receivers
/// skip the frames they missed. The stream ends when `closed` fires.
fn envelope_stream(
    initial: Vec<Envelope>,
    rx: broadcast::Receiver<Envelope>,
    threats_only: bool,
    closed: CancellationToken,
) -> impl Stream<Item = Result<Event, Infallible>> {
    let live = stream::unfold(rx, move |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(frame) if threats_only && !frame.is_threat() => continue,
                Ok(frame) => return Some((frame, rx)),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Stream subscriber lagging, frames dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    });

    stream::iter(initial)
        .chain(live)
        .take_until(closed.cancelled_owned())
        .map(|frame| Ok(Event::default().data(frame.to_json())))
}

/// Tick the simulator until cancelled.
pub async fn run_simulation(gw: SharedGateway, cancel: CancellationToken) {
    let interval = gw.lock().await.config().tick_interval();
    let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let frames = gw.lock().await.tick();
                trace!(frames = frames.len(), "Simulator tick");
            }
        }
    }
    debug!("Simulation stopped");
}

/// Serve the gateway on an already bound listener until `shutdown` fires.
pub async fn serve(
    listener: TcpListener,
    gw: SharedGateway,
    shutdown: CancellationToken,
) -> Result<(), GatewayError> {
    let simulation = tokio::spawn(run_simulation(Arc::clone(&gw), shutdown.clone()));
    let streams = Arc::clone(&gw);
    let app = router(gw);

    // Streams only end on request; drain waits on them.
    let signal = shutdown.clone();
    let result = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            signal.cancelled().await;
            streams.lock().await.close_streams();
            debug!("Closing open streams for shutdown");
        })
        .await;

    shutdown.cancel();
    if let Err(e) = simulation.await {
        warn!(error = %e, "Simulation task failed");
    }
    result.map_err(|e| GatewayError::Serve {
        message: e.to_string(),
    })
}

/// Bind the configured address and serve until `shutdown` fires.
pub async fn run(gw: SharedGateway, shutdown: CancellationToken) -> Result<(), GatewayError> {
    let addr = gw.lock().await.config().bind_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|source| GatewayError::Bind {
            addr: addr.clone(),
            source,
        })?;
    info!(addr = addr.as_str(), "Telemetry gateway listening");
    serve(listener, gw, shutdown).await
}
