//! Engine transports and the Socket.IO connection task
//!
//! # Modules
//!
//! - `reconnect`: fixed-delay reconnection schedule with an attempt ceiling
//! - `websocket`: Engine.IO over a WebSocket (one packet per text frame)
//! - `polling`: Engine.IO over HTTP long-polling
//! - `socket`: `SocketIoConnector` and the per-handle connection task

mod polling;
mod reconnect;
mod socket;
mod websocket;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{RealtimeError, Result};
use crate::protocol::{EnginePacket, OpenHandshake, ENGINE_PROTOCOL};

pub use reconnect::{ReconnectPolicy, ReconnectSchedule};
pub use socket::{SocketHandle, SocketIoConnector};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Websocket,
    Polling,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Websocket => "websocket",
            TransportKind::Polling => "polling",
        }
    }
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything needed to open connections to one backend
#[derive(Debug, Clone)]
pub struct TransportOptions {
    pub url: Url,
    pub path: String,
    /// Tried in order; the first one that opens wins
    pub transports: Vec<TransportKind>,
    pub reconnection: ReconnectPolicy,
    pub connect_timeout: Duration,
    pub outbound_buffer: usize,
}

impl TransportOptions {
    /// Engine.IO endpoint for a transport, e.g. `ws://host/socket.io/?EIO=4&transport=websocket`
    pub fn endpoint(&self, kind: TransportKind) -> Url {
        let mut url = self.url.clone();
        let secure = matches!(url.scheme(), "https" | "wss");
        let scheme = match (kind, secure) {
            (TransportKind::Websocket, false) => "ws",
            (TransportKind::Websocket, true) => "wss",
            (TransportKind::Polling, false) => "http",
            (TransportKind::Polling, true) => "https",
        };
        // Switching between special schemes cannot fail
        let _ = url.set_scheme(scheme);
        url.set_path(&self.path);
        url.query_pairs_mut()
            .clear()
            .append_pair("EIO", ENGINE_PROTOCOL)
            .append_pair("transport", kind.as_str());
        url
    }
}

/// Write half of an open engine connection
#[async_trait]
pub trait PacketSink: Send {
    async fn send(&mut self, packets: Vec<EnginePacket>) -> Result<()>;

    /// Best-effort close; errors are ignored
    async fn close(&mut self);
}

/// Read half of an open engine connection
#[async_trait]
pub trait PacketStream: Send {
    /// Next batch of packets, `None` once the transport is closed
    async fn next_batch(&mut self) -> Result<Option<Vec<EnginePacket>>>;
}

/// An Engine.IO session after the `open` handshake
pub struct EngineConnection {
    pub kind: TransportKind,
    pub handshake: OpenHandshake,
    pub sink: Box<dyn PacketSink>,
    pub stream: Box<dyn PacketStream>,
}

/// Open an engine connection, falling back through the configured transports
pub(crate) async fn open_engine(
    options: &TransportOptions,
    http: &reqwest::Client,
) -> Result<EngineConnection> {
    let mut last_error = None;

    for kind in &options.transports {
        let endpoint = options.endpoint(*kind);
        let result = match kind {
            TransportKind::Websocket => websocket::open(endpoint).await,
            TransportKind::Polling => polling::open(http.clone(), endpoint).await,
        };

        match result {
            Ok(connection) => {
                tracing::debug!(
                    transport = %kind,
                    engine_sid = %connection.handshake.sid,
                    "Engine connection opened"
                );
                return Ok(connection);
            }
            Err(e) => {
                tracing::debug!(transport = %kind, error = %e, "Transport unavailable");
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| {
        RealtimeError::Validation("no transports configured".to_string())
    }))
}
