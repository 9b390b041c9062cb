use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::error::{RealtimeError, Result};
use crate::protocol::EnginePacket;

use super::{EngineConnection, PacketSink, PacketStream, TransportKind};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct WebSocketSink {
    inner: SplitSink<WsStream, Message>,
}

struct WebSocketReader {
    inner: SplitStream<WsStream>,
}

/// Connect and wait for the Engine.IO `open` packet
pub(super) async fn open(url: Url) -> Result<EngineConnection> {
    let (ws, _response) = connect_async(url.as_str()).await?;
    let (sink, stream) = ws.split();
    let mut reader = WebSocketReader { inner: stream };

    let handshake = match reader.next_batch().await? {
        Some(packets) => match packets.into_iter().next() {
            Some(EnginePacket::Open(handshake)) => handshake,
            other => {
                return Err(RealtimeError::Closed(format!(
                    "expected open packet, got {:?}",
                    other
                )))
            }
        },
        None => {
            return Err(RealtimeError::Closed(
                "websocket closed before handshake".to_string(),
            ))
        }
    };

    Ok(EngineConnection {
        kind: TransportKind::Websocket,
        handshake,
        sink: Box::new(WebSocketSink { inner: sink }),
        stream: Box::new(reader),
    })
}

#[async_trait]
impl PacketSink for WebSocketSink {
    async fn send(&mut self, packets: Vec<EnginePacket>) -> Result<()> {
        for packet in packets {
            self.inner.send(Message::Text(packet.encode().into())).await?;
        }
        Ok(())
    }

    async fn close(&mut self) {
        let _ = self
            .inner
            .send(Message::Text(EnginePacket::Close.encode().into()))
            .await;
        let _ = self.inner.send(Message::Close(None)).await;
        let _ = self.inner.close().await;
    }
}

#[async_trait]
impl PacketStream for WebSocketReader {
    async fn next_batch(&mut self) -> Result<Option<Vec<EnginePacket>>> {
        loop {
            match self.inner.next().await {
                Some(Ok(Message::Text(text))) => {
                    return Ok(Some(vec![EnginePacket::decode(text.as_str())?]));
                }
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                // Binary attachments are not used; control frames are handled by tungstenite
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
            }
        }
    }
}
