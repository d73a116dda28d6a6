//! Error types for the Vigil core library.
//!
//! Uses `thiserror` for public API error types with structured variants
//! covering feed payloads, transports, configuration, and the gateway.
//! None of the live-feed public operations surface these to a consumer
//! directly; the driver logs them and degrades to a status flag.

/// Top-level error type for the Vigil core library.
#[derive(Debug, thiserror::Error)]
pub enum VigilError {
    #[error("Feed error: {0}")]
    Feed(#[from] FeedError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors raised while turning an inbound payload into a typed event.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FeedError {
    #[error("Malformed payload: {message}")]
    MalformedPayload { message: String },

    #[error("Payload has no 'type' discriminator")]
    MissingType,

    #[error("Invalid {kind} event: {reason}")]
    InvalidEvent { kind: String, reason: String },

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
}

/// Errors from a feed transport.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("Connection failed: {message}")]
    ConnectFailed { message: String },

    #[error("Server responded with HTTP {status}")]
    HttpStatus { status: u16 },

    #[error("Stream error: {message}")]
    Stream { message: String },

    #[error("Transport is not open")]
    NotOpen,

    #[error("Transport closed")]
    Closed,
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },
}

/// Errors from the simulated telemetry gateway.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Server terminated: {message}")]
    Serve { message: String },
}

/// A type alias for results using the top-level `VigilError`.
pub type Result<T> = std::result::Result<T, VigilError>;
