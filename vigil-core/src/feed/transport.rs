//! Transport layer for the live feed.
//!
//! Provides different transport implementations that yield raw JSON
//! payloads to the client driver:
//! - [`SseTransport`]: long-lived `text/event-stream` response over HTTP
//! - [`PollingTransport`]: periodic JSON polling of the snapshot endpoints
//! - [`ChannelTransport`]: in-process scripted transport (for testing)

use super::events::{Envelope, KIND_METRICS, KIND_THREAT};
use super::frame::FrameDecoder;
use super::{FeedConfig, FeedMode};
use crate::error::TransportError;
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, trace, warn};

/// A source of raw feed payloads.
///
/// A transport can be opened, read, and closed repeatedly; the client
/// driver reuses one transport across reconnect attempts.
#[async_trait]
pub trait FeedTransport: Send {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Establish the connection. Resolves once the server accepted it.
    async fn open(&mut self) -> Result<(), TransportError>;

    /// Next payload. `Ok(None)` when the server ended the stream.
    async fn next_payload(&mut self) -> Result<Option<String>, TransportError>;

    /// Release the connection. Must be idempotent.
    async fn close(&mut self);
}

/// Creates a transport per connection.
pub trait TransportFactory: Send + Sync {
    fn create(&self) -> Box<dyn FeedTransport>;
}

// ---------------------------------------------------------------------------
// HttpTransportFactory
// ---------------------------------------------------------------------------

/// Builds [`SseTransport`] or [`PollingTransport`] from a [`FeedConfig`].
#[derive(Debug, Clone)]
pub struct HttpTransportFactory {
    config: FeedConfig,
    client: reqwest::Client,
}

impl HttpTransportFactory {
    pub fn new(config: FeedConfig) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Failed to build HTTP client, using defaults");
                reqwest::Client::new()
            });
        Self { config, client }
    }

    pub fn mode(&self) -> FeedMode {
        self.config.mode
    }
}

impl TransportFactory for HttpTransportFactory {
    fn create(&self) -> Box<dyn FeedTransport> {
        match self.config.mode {
            FeedMode::Stream => Box::new(SseTransport::new(
                self.client.clone(),
                self.config.stream_url(),
            )),
            FeedMode::Polling => Box::new(PollingTransport::new(
                self.client.clone(),
                &self.config,
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// SseTransport
// ---------------------------------------------------------------------------

/// Transport reading a `text/event-stream` response body.
pub struct SseTransport {
    client: reqwest::Client,
    url: String,
    stream: Option<BoxStream<'static, reqwest::Result<Bytes>>>,
    decoder: FrameDecoder,
    pending: VecDeque<String>,
}

impl std::fmt::Debug for SseTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SseTransport")
            .field("url", &self.url)
            .field("open", &self.stream.is_some())
            .finish()
    }
}

impl SseTransport {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
            stream: None,
            decoder: FrameDecoder::new(),
            pending: VecDeque::new(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl FeedTransport for SseTransport {
    fn name(&self) -> &'static str {
        "sse"
    }

    async fn open(&mut self) -> Result<(), TransportError> {
        self.close().await;
        debug!(url = self.url.as_str(), "Opening event stream");

        let response = self
            .client
            .get(&self.url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .header(reqwest::header::CACHE_CONTROL, "no-cache")
            .send()
            .await
            .map_err(|e| TransportError::ConnectFailed {
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::HttpStatus {
                status: status.as_u16(),
            });
        }

        self.stream = Some(response.bytes_stream().boxed());
        Ok(())
    }

    async fn next_payload(&mut self) -> Result<Option<String>, TransportError> {
        loop {
            if let Some(payload) = self.pending.pop_front() {
                return Ok(Some(payload));
            }
            let stream = self.stream.as_mut().ok_or(TransportError::NotOpen)?;
            match stream.next().await {
                Some(Ok(chunk)) => {
                    trace!(bytes = chunk.len(), "Received stream chunk");
                    self.pending.extend(self.decoder.push(&chunk));
                }
                Some(Err(e)) => {
                    self.stream = None;
                    return Err(TransportError::Stream {
                        message: e.to_string(),
                    });
                }
                None => {
                    self.stream = None;
                    return Ok(None);
                }
            }
        }
    }

    async fn close(&mut self) {
        self.stream = None;
        self.decoder.reset();
        self.pending.clear();
    }
}

// ---------------------------------------------------------------------------
// PollingTransport
// ---------------------------------------------------------------------------

/// Fallback transport polling `/api/metrics` and `/api/threats`.
///
/// A failed poll (network error, non-2xx, unparsable body) yields no data
/// for that cycle and never fails the connection.
pub struct PollingTransport {
    client: reqwest::Client,
    metrics_url: String,
    threats_url: String,
    interval: Duration,
    pending: VecDeque<String>,
    seen: VecDeque<String>,
    seen_capacity: usize,
    open: bool,
    polled: bool,
}

impl std::fmt::Debug for PollingTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollingTransport")
            .field("metrics_url", &self.metrics_url)
            .field("threats_url", &self.threats_url)
            .field("interval", &self.interval)
            .finish()
    }
}

impl PollingTransport {
    pub fn new(client: reqwest::Client, config: &FeedConfig) -> Self {
        Self {
            client,
            metrics_url: config.metrics_url(),
            threats_url: config.threats_url(),
            interval: config.poll_interval(),
            pending: VecDeque::new(),
            seen: VecDeque::new(),
            seen_capacity: config.poll_threat_limit.max(1) * 4,
            open: false,
            polled: false,
        }
    }

    async fn poll_once(&mut self) {
        if let Some(body) = self.fetch_json(&self.metrics_url).await
            && let Some(data) = body.get("data")
        {
            self.pending
                .push_back(Envelope::other(KIND_METRICS, data.clone()).to_json());
        }

        let threats = match self.fetch_json(&self.threats_url).await {
            Some(body) => match body.get("data").and_then(Value::as_array) {
                Some(items) => items.clone(),
                None => Vec::new(),
            },
            None => Vec::new(),
        };

        // Served most recent first; deliver oldest first so prepending keeps order.
        for item in threats.into_iter().rev() {
            let Some(id) = item.get("id").and_then(Value::as_str).map(str::to_string) else {
                // Let the classifier reject it.
                self.pending
                    .push_back(Envelope::other(KIND_THREAT, item).to_json());
                continue;
            };
            if self.seen.contains(&id) {
                continue;
            }
            self.remember(id);
            self.pending
                .push_back(Envelope::other(KIND_THREAT, item).to_json());
        }
    }

    fn remember(&mut self, id: String) {
        self.seen.push_back(id);
        while self.seen.len() > self.seen_capacity {
            self.seen.pop_front();
        }
    }

    async fn fetch_json(&self, url: &str) -> Option<Value> {
        let response = match self.client.get(url).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!(url, error = %e, "Poll request failed");
                return None;
            }
        };
        let status = response.status();
        if !status.is_success() {
            warn!(url, status = status.as_u16(), "Poll returned non-success status");
            return None;
        }
        match response.json::<Value>().await {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(url, error = %e, "Poll returned unparsable body");
                None
            }
        }
    }
}

#[async_trait]
impl FeedTransport for PollingTransport {
    fn name(&self) -> &'static str {
        "polling"
    }

    async fn open(&mut self) -> Result<(), TransportError> {
        self.pending.clear();
        self.open = true;
        self.polled = false;
        Ok(())
    }

    async fn next_payload(&mut self) -> Result<Option<String>, TransportError> {
        loop {
            if !self.open {
                return Err(TransportError::NotOpen);
            }
            if let Some(payload) = self.pending.pop_front() {
                return Ok(Some(payload));
            }
            if self.polled {
                tokio::time::sleep(self.interval).await;
            }
            self.polled = true;
            self.poll_once().await;
        }
    }

    async fn close(&mut self) {
        self.open = false;
        self.pending.clear();
    }
}

// ---------------------------------------------------------------------------
// ChannelTransport
// ---------------------------------------------------------------------------

/// Scripted step consumed by [`ChannelTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Accept the pending open.
    Open,
    /// Reject the pending open.
    Refuse(String),
    /// Raw wire bytes, decoded with [`FrameDecoder`].
    Chunk(String),
    /// Fail the open stream.
    Drop(String),
    /// End the open stream cleanly.
    End,
}

/// In-process transport backed by a tokio mpsc channel.
///
/// This is primarily useful for tests that exercise the full driver
/// (decode, classify, retry) without a network. Every transport created
/// from the same channel shares the script and the open counter.
pub struct ChannelTransport {
    events: Arc<Mutex<mpsc::UnboundedReceiver<TransportEvent>>>,
    opens: Arc<AtomicUsize>,
    decoder: FrameDecoder,
    pending: VecDeque<String>,
    open: bool,
}

impl std::fmt::Debug for ChannelTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelTransport")
            .field("opens", &self.open_attempts())
            .field("open", &self.open)
            .finish()
    }
}

impl ChannelTransport {
    /// Create a transport and the sender that scripts it.
    pub fn new() -> (Self, mpsc::UnboundedSender<TransportEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = Self {
            events: Arc::new(Mutex::new(rx)),
            opens: Arc::new(AtomicUsize::new(0)),
            decoder: FrameDecoder::new(),
            pending: VecDeque::new(),
            open: false,
        };
        (transport, tx)
    }

    /// A new transport sharing this one's script and counter.
    pub fn share(&self) -> Self {
        Self {
            events: Arc::clone(&self.events),
            opens: Arc::clone(&self.opens),
            decoder: FrameDecoder::new(),
            pending: VecDeque::new(),
            open: false,
        }
    }

    /// Number of `open` calls across all shared transports.
    pub fn open_attempts(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

impl TransportFactory for ChannelTransport {
    fn create(&self) -> Box<dyn FeedTransport> {
        Box::new(self.share())
    }
}

#[async_trait]
impl FeedTransport for ChannelTransport {
    fn name(&self) -> &'static str {
        "channel"
    }

    async fn open(&mut self) -> Result<(), TransportError> {
        self.close().await;
        self.opens.fetch_add(1, Ordering::SeqCst);
        let mut events = self.events.lock().await;
        match events.recv().await {
            Some(TransportEvent::Open) => {
                self.open = true;
                Ok(())
            }
            Some(TransportEvent::Refuse(message)) => {
                Err(TransportError::ConnectFailed { message })
            }
            Some(other) => Err(TransportError::ConnectFailed {
                message: format!("unexpected {:?} before open", other),
            }),
            None => Err(TransportError::Closed),
        }
    }

    async fn next_payload(&mut self) -> Result<Option<String>, TransportError> {
        loop {
            if let Some(payload) = self.pending.pop_front() {
                return Ok(Some(payload));
            }
            if !self.open {
                return Err(TransportError::NotOpen);
            }
            let event = self.events.lock().await.recv().await;
            match event {
                Some(TransportEvent::Chunk(raw)) => {
                    self.pending.extend(self.decoder.push(raw.as_bytes()));
                }
                Some(TransportEvent::Drop(message)) => {
                    self.open = false;
                    return Err(TransportError::Stream { message });
                }
                Some(TransportEvent::End) | None => {
                    self.open = false;
                    return Ok(None);
                }
                Some(other) => trace!(event = ?other, "Ignoring event on open stream"),
            }
        }
    }

    async fn close(&mut self) {
        self.open = false;
        self.decoder.reset();
        self.pending.clear();
    }
}
