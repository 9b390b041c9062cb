use thiserror::Error;

/// Malformed or unsupported Engine.IO / Socket.IO frames
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Empty packet")]
    Empty,

    #[error("Unknown {layer} packet type: {kind}")]
    UnknownType { layer: &'static str, kind: char },

    #[error("Unsupported packet: {0}")]
    Unsupported(String),

    #[error("Invalid packet payload: {0}")]
    InvalidPayload(String),
}

#[derive(Error, Debug)]
pub enum RealtimeError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Runtime error: {0}")]
    Runtime(#[from] tokio::runtime::TryCurrentError),

    #[error("Connection rejected: {0}")]
    Rejected(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Transport closed: {0}")]
    Closed(String),
}

impl RealtimeError {
    /// Message suitable for a `connect_error` event
    pub fn connect_error_message(&self) -> String {
        match self {
            RealtimeError::Rejected(message) => message.clone(),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RealtimeError>;
