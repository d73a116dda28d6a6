//! Live-feed subscription client.
//!
//! [`FeedClient`] owns one subscriber's state and at most one background
//! driver task. [`FeedClient::connect`] hands back a [`FeedConnection`]
//! handle; passing it to [`FeedClient::disconnect`] or dropping it
//! cancels the driver, including any pending retry timer.

use super::connection::{ConnectionManager, ConnectionState};
use super::events::{MetricsSnapshot, ThreatEvent};
use super::store::{FeedSnapshot, FeedState, Ingest};
use super::transport::{FeedTransport, HttpTransportFactory, TransportFactory};
use super::FeedConfig;
use super::backoff::RetryDecision;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, broadcast};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// State shared between the client and its driver task.
pub type SharedFeedState = Arc<RwLock<FeedState>>;

/// Capacity of the update broadcast channel.
const UPDATE_CHANNEL_CAPACITY: usize = 256;

/// Notifications published to subscribers of [`FeedClient::subscribe`].
#[derive(Debug, Clone, PartialEq)]
pub enum FeedUpdate {
    Status {
        state: ConnectionState,
        attempts: u32,
    },
    Retrying {
        attempt: u32,
        delay: Duration,
    },
    Threat(ThreatEvent),
    Metrics(MetricsSnapshot),
    Cleared {
        removed: usize,
    },
    PauseToggled {
        paused: bool,
    },
}

/// Owned handle to a running connection.
///
/// Dropping the handle cancels the connection.
#[must_use = "dropping a FeedConnection closes it"]
#[derive(Debug)]
pub struct FeedConnection {
    id: Uuid,
    cancel: CancellationToken,
}

impl FeedConnection {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Whether this connection has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for FeedConnection {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct ActiveDriver {
    id: Uuid,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// One subscriber of the live feed.
pub struct FeedClient {
    config: FeedConfig,
    factory: Arc<dyn TransportFactory>,
    state: SharedFeedState,
    updates: broadcast::Sender<FeedUpdate>,
    active: Option<ActiveDriver>,
}

impl std::fmt::Debug for FeedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedClient")
            .field("server_url", &self.config.server_url)
            .field("mode", &self.config.mode)
            .field("running", &self.is_running())
            .finish()
    }
}

impl FeedClient {
    /// Client using the HTTP transport selected by `config.mode`.
    pub fn new(config: FeedConfig) -> Self {
        let factory = Arc::new(HttpTransportFactory::new(config.clone()));
        Self::with_factory(config, factory)
    }

    /// Client using a caller-supplied transport factory.
    pub fn with_factory(config: FeedConfig, factory: Arc<dyn TransportFactory>) -> Self {
        let state = Arc::new(RwLock::new(FeedState::new(config.threat_capacity)));
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Self {
            config,
            factory,
            state,
            updates,
            active: None,
        }
    }

    pub fn config(&self) -> &FeedConfig {
        &self.config
    }

    /// Open the feed after the configured startup delay.
    ///
    /// Any connection previously opened by this client is closed first.
    pub async fn connect(&mut self) -> FeedConnection {
        let delay = self.config.startup_delay();
        self.start(delay).await
    }

    /// Explicit manual reconnect. Starts immediately with a fresh retry
    /// budget, leaving the given-up state.
    pub async fn reconnect(&mut self) -> FeedConnection {
        info!("Manual reconnect requested");
        self.start(Duration::ZERO).await
    }

    /// Close a connection and wait for its driver to exit. Idempotent.
    pub async fn disconnect(&mut self, conn: FeedConnection) {
        conn.cancel.cancel();
        if self.active.as_ref().is_some_and(|a| a.id == conn.id) {
            self.stop().await;
        }
    }

    /// Whether a driver task is currently running.
    pub fn is_running(&self) -> bool {
        self.active.as_ref().is_some_and(|a| !a.task.is_finished())
    }

    pub async fn is_connected(&self) -> bool {
        self.state.read().await.is_connected()
    }

    pub async fn status(&self) -> ConnectionState {
        self.state.read().await.status()
    }

    /// Flip the pause gate. Returns the new value.
    pub async fn toggle_pause(&self) -> bool {
        let paused = self.state.write().await.toggle_pause();
        info!(paused, "Feed pause toggled");
        let _ = self.updates.send(FeedUpdate::PauseToggled { paused });
        paused
    }

    /// Empty the threat buffer. Returns the number of removed events.
    pub async fn clear(&self) -> usize {
        let removed = self.state.write().await.clear();
        let _ = self.updates.send(FeedUpdate::Cleared { removed });
        removed
    }

    pub async fn snapshot(&self) -> FeedSnapshot {
        self.state.read().await.snapshot()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FeedUpdate> {
        self.updates.subscribe()
    }

    pub fn state(&self) -> SharedFeedState {
        Arc::clone(&self.state)
    }

    async fn start(&mut self, delay: Duration) -> FeedConnection {
        self.stop().await;

        let id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        let driver = Driver {
            id,
            transport: self.factory.create(),
            manager: ConnectionManager::new(self.config.retry_policy()),
            state: Arc::clone(&self.state),
            updates: self.updates.clone(),
            cancel: cancel.clone(),
        };
        debug!(connection = %id, delay_ms = delay.as_millis() as u64, "Starting feed driver");
        let task = tokio::spawn(driver.run(delay));

        self.active = Some(ActiveDriver {
            id,
            cancel: cancel.clone(),
            task,
        });
        FeedConnection { id, cancel }
    }

    async fn stop(&mut self) {
        if let Some(active) = self.active.take() {
            active.cancel.cancel();
            if let Err(e) = active.task.await {
                warn!(connection = %active.id, error = %e, "Feed driver task failed");
            }
        }
    }
}

impl Drop for FeedClient {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            active.cancel.cancel();
        }
    }
}

/// Background task owning the transport and the connection state machine.
struct Driver {
    id: Uuid,
    transport: Box<dyn FeedTransport>,
    manager: ConnectionManager,
    state: SharedFeedState,
    updates: broadcast::Sender<FeedUpdate>,
    cancel: CancellationToken,
}

impl Driver {
    async fn run(mut self, startup_delay: Duration) {
        if !startup_delay.is_zero() {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    self.finish().await;
                    return;
                }
                _ = tokio::time::sleep(startup_delay) => {}
            }
        }

        loop {
            if self.manager.begin_connect().is_err() {
                break;
            }
            self.publish_status().await;

            let opened = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                result = self.transport.open() => result,
            };

            let failure = match opened {
                Ok(()) => {
                    if let Err(e) = self.manager.on_open() {
                        warn!(error = %e, "Unexpected open notification");
                    }
                    self.state.write().await.set_last_error(None);
                    info!(
                        connection = %self.id,
                        transport = self.transport.name(),
                        "Feed connected"
                    );
                    self.publish_status().await;
                    match self.pump().await {
                        Some(reason) => reason,
                        None => break,
                    }
                }
                Err(e) => e.to_string(),
            };

            self.transport.close().await;
            warn!(connection = %self.id, error = failure.as_str(), "Feed connection lost");
            self.state.write().await.set_last_error(Some(failure));

            match self.manager.on_failure() {
                RetryDecision::Retry { attempt, delay } => {
                    self.publish_status().await;
                    let _ = self.updates.send(FeedUpdate::Retrying { attempt, delay });
                    tokio::select! {
                        _ = self.cancel.cancelled() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                RetryDecision::GiveUp { attempts } => {
                    warn!(connection = %self.id, attempts, "Feed gave up reconnecting");
                    break;
                }
                RetryDecision::Halted => break,
            }
        }

        self.finish().await;
    }

    /// Read payloads until the stream fails. `None` when cancelled.
    async fn pump(&mut self) -> Option<String> {
        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return None,
                result = self.transport.next_payload() => result,
            };
            match next {
                Ok(Some(raw)) => {
                    let outcome = self.state.write().await.ingest_raw(&raw);
                    match outcome {
                        Ingest::Threat(event) => {
                            let _ = self.updates.send(FeedUpdate::Threat(event));
                        }
                        Ingest::Metrics(snapshot) => {
                            let _ = self.updates.send(FeedUpdate::Metrics(snapshot));
                        }
                        _ => {}
                    }
                }
                Ok(None) => return Some("stream ended by server".to_string()),
                Err(e) => return Some(e.to_string()),
            }
        }
    }

    async fn finish(&mut self) {
        self.transport.close().await;
        self.manager.on_disconnect();
        self.publish_status().await;
        debug!(connection = %self.id, state = %self.manager.state(), "Feed driver stopped");
    }

    async fn publish_status(&mut self) {
        let state = self.manager.state();
        let attempts = self.manager.attempts();
        self.state.write().await.set_status(state, attempts);
        let _ = self.updates.send(FeedUpdate::Status { state, attempts });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::transport::{ChannelTransport, TransportEvent};

    fn config() -> FeedConfig {
        FeedConfig {
            startup_delay_ms: 0,
            ..FeedConfig::default()
        }
    }

    fn client() -> (FeedClient, ChannelTransport, tokio::sync::mpsc::UnboundedSender<TransportEvent>) {
        let (transport, tx) = ChannelTransport::new();
        let client = FeedClient::with_factory(config(), Arc::new(transport.share()));
        (client, transport, tx)
    }

    async fn wait_for_status(
        rx: &mut broadcast::Receiver<FeedUpdate>,
        wanted: ConnectionState,
    ) {
        loop {
            match rx.recv().await {
                Ok(FeedUpdate::Status { state, .. }) if state == wanted => return,
                Ok(_) => continue,
                Err(e) => panic!("update channel closed: {}", e),
            }
        }
    }

    #[tokio::test]
    async fn test_connect_and_receive_threat() {
        let (mut client, _transport, tx) = client();
        let mut rx = client.subscribe();
        tx.send(TransportEvent::Open).unwrap();

        let conn = client.connect().await;
        wait_for_status(&mut rx, ConnectionState::Open).await;
        assert!(client.is_connected().await);

        tx.send(TransportEvent::Chunk(
            "data: {\"type\":\"threat\",\"data\":{\"id\":\"1\",\"timestamp\":\"t\",\"message\":\"m\",\"severity\":\"low\"}}\n\n"
                .into(),
        ))
        .unwrap();
        loop {
            if let Ok(FeedUpdate::Threat(event)) = rx.recv().await {
                assert_eq!(event.id, "1");
                break;
            }
        }

        client.disconnect(conn).await;
        assert!(!client.is_running());
        assert_eq!(client.status().await, ConnectionState::Closed);
        assert_eq!(client.snapshot().await.threats.len(), 1);
    }

    #[tokio::test]
    async fn test_pause_and_clear_publish_updates() {
        let (client, _transport, _tx) = client();
        let mut rx = client.subscribe();
        assert!(client.toggle_pause().await);
        assert_eq!(
            rx.recv().await.unwrap(),
            FeedUpdate::PauseToggled { paused: true }
        );
        assert_eq!(client.clear().await, 0);
        assert_eq!(rx.recv().await.unwrap(), FeedUpdate::Cleared { removed: 0 });
    }

    #[tokio::test]
    async fn test_dropping_handle_stops_driver() {
        let (mut client, _transport, tx) = client();
        let mut rx = client.subscribe();
        tx.send(TransportEvent::Open).unwrap();

        let conn = client.connect().await;
        wait_for_status(&mut rx, ConnectionState::Open).await;
        drop(conn);
        wait_for_status(&mut rx, ConnectionState::Closed).await;
        assert!(!client.is_connected().await);
    }

    #[tokio::test]
    async fn test_http_client_drives_sse_transport() {
        let mut client = FeedClient::new(FeedConfig {
            server_url: "http://127.0.0.1:9".into(),
            max_retries: 0,
            connect_timeout_secs: 1,
            ..config()
        });
        let mut rx = client.subscribe();

        let conn = client.connect().await;
        wait_for_status(&mut rx, ConnectionState::GivenUp).await;
        assert!(client.snapshot().await.last_error.is_some());
        client.disconnect(conn).await;
    }
}
