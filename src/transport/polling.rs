use std::collections::VecDeque;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use url::Url;

use crate::error::{RealtimeError, Result};
use crate::protocol::{decode_payload, encode_payload, EnginePacket};

use super::{EngineConnection, PacketSink, PacketStream, TransportKind};

const PAYLOAD_CONTENT_TYPE: &str = "text/plain;charset=UTF-8";

struct PollingSink {
    client: reqwest::Client,
    url: Url,
}

struct PollingReader {
    client: reqwest::Client,
    url: Url,
    /// Packets that arrived with the handshake response
    pending: VecDeque<EnginePacket>,
    closed: bool,
}

/// Perform the polling handshake (`GET` without sid)
pub(super) async fn open(client: reqwest::Client, url: Url) -> Result<EngineConnection> {
    let body = client
        .get(url.clone())
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;

    let mut packets = decode_payload(&body)?.into_iter();
    let handshake = match packets.next() {
        Some(EnginePacket::Open(handshake)) => handshake,
        other => {
            return Err(RealtimeError::Closed(format!(
                "expected open packet, got {:?}",
                other
            )))
        }
    };

    let mut session_url = url;
    session_url
        .query_pairs_mut()
        .append_pair("sid", &handshake.sid);

    Ok(EngineConnection {
        kind: TransportKind::Polling,
        handshake,
        sink: Box::new(PollingSink {
            client: client.clone(),
            url: session_url.clone(),
        }),
        stream: Box::new(PollingReader {
            client,
            url: session_url,
            pending: packets.collect(),
            closed: false,
        }),
    })
}

#[async_trait]
impl PacketSink for PollingSink {
    async fn send(&mut self, packets: Vec<EnginePacket>) -> Result<()> {
        if packets.is_empty() {
            return Ok(());
        }

        self.client
            .post(self.url.clone())
            .header(CONTENT_TYPE, PAYLOAD_CONTENT_TYPE)
            .body(encode_payload(&packets))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn close(&mut self) {
        let _ = self.send(vec![EnginePacket::Close]).await;
    }
}

impl PollingReader {
    /// Stop at an engine `close` packet; later polls report end of stream
    fn take_until_close(&mut self, packets: impl IntoIterator<Item = EnginePacket>) -> Vec<EnginePacket> {
        let mut batch = Vec::new();
        for packet in packets {
            if packet == EnginePacket::Close {
                self.closed = true;
                break;
            }
            batch.push(packet);
        }
        batch
    }
}

#[async_trait]
impl PacketStream for PollingReader {
    async fn next_batch(&mut self) -> Result<Option<Vec<EnginePacket>>> {
        if !self.pending.is_empty() {
            let pending: Vec<EnginePacket> = self.pending.drain(..).collect();
            let batch = self.take_until_close(pending);
            if !batch.is_empty() {
                return Ok(Some(batch));
            }
        }

        loop {
            if self.closed {
                return Ok(None);
            }

            let body = self
                .client
                .get(self.url.clone())
                .send()
                .await?
                .error_for_status()?
                .text()
                .await?;

            let packets = decode_payload(&body)?;
            let batch = self.take_until_close(packets);
            if !batch.is_empty() {
                return Ok(Some(batch));
            }
        }
    }
}
