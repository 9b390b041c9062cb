//! Engine.IO v4 packets
//!
//! Text encoding is a single type digit followed by the packet data.
//! Long-polling payloads join packets with the record separator `0x1e`.

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// Engine.IO protocol revision spoken by this client
pub const ENGINE_PROTOCOL: &str = "4";

/// Separator between packets in a polling payload
pub const RECORD_SEPARATOR: char = '\u{1e}';

/// Handshake data carried by the `open` packet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenHandshake {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    /// Server ping interval in milliseconds
    pub ping_interval: u64,
    /// Grace period after a missed ping in milliseconds
    pub ping_timeout: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_payload: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnginePacket {
    Open(OpenHandshake),
    Close,
    Ping(String),
    Pong(String),
    Message(String),
    Upgrade,
    Noop,
}

impl EnginePacket {
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let mut chars = text.chars();
        let kind = chars.next().ok_or(ProtocolError::Empty)?;
        let data = chars.as_str();

        match kind {
            '0' => serde_json::from_str(data)
                .map(EnginePacket::Open)
                .map_err(|e| ProtocolError::InvalidPayload(format!("open handshake: {}", e))),
            '1' => Ok(EnginePacket::Close),
            '2' => Ok(EnginePacket::Ping(data.to_string())),
            '3' => Ok(EnginePacket::Pong(data.to_string())),
            '4' => Ok(EnginePacket::Message(data.to_string())),
            '5' => Ok(EnginePacket::Upgrade),
            '6' => Ok(EnginePacket::Noop),
            'b' => Err(ProtocolError::Unsupported("binary engine packet".to_string())),
            other => Err(ProtocolError::UnknownType {
                layer: "engine",
                kind: other,
            }),
        }
    }

    pub fn encode(&self) -> String {
        match self {
            EnginePacket::Open(handshake) => {
                // OpenHandshake only holds strings and integers
                let json = serde_json::to_string(handshake).unwrap_or_default();
                format!("0{}", json)
            }
            EnginePacket::Close => "1".to_string(),
            EnginePacket::Ping(data) => format!("2{}", data),
            EnginePacket::Pong(data) => format!("3{}", data),
            EnginePacket::Message(data) => format!("4{}", data),
            EnginePacket::Upgrade => "5".to_string(),
            EnginePacket::Noop => "6".to_string(),
        }
    }
}

/// Decode a long-polling response body into its packets
pub fn decode_payload(body: &str) -> Result<Vec<EnginePacket>, ProtocolError> {
    if body.is_empty() {
        return Ok(Vec::new());
    }
    body.split(RECORD_SEPARATOR).map(EnginePacket::decode).collect()
}

/// Encode packets into a long-polling request body
pub fn encode_payload(packets: &[EnginePacket]) -> String {
    let mut body = String::new();
    for (i, packet) in packets.iter().enumerate() {
        if i > 0 {
            body.push(RECORD_SEPARATOR);
        }
        body.push_str(&packet.encode());
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_decode_open_handshake() {
        let packet = assert_ok!(EnginePacket::decode(
            r#"0{"sid":"lv_VI97HAXpY6yYWAAAC","upgrades":["websocket"],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#
        ));

        match packet {
            EnginePacket::Open(handshake) => {
                assert_eq!(handshake.sid, "lv_VI97HAXpY6yYWAAAC");
                assert_eq!(handshake.upgrades, vec!["websocket".to_string()]);
                assert_eq!(handshake.ping_interval, 25000);
                assert_eq!(handshake.ping_timeout, 20000);
                assert_eq!(handshake.max_payload, Some(1_000_000));
            }
            other => panic!("Expected open packet, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_control_packets() {
        assert_eq!(assert_ok!(EnginePacket::decode("1")), EnginePacket::Close);
        assert_eq!(
            assert_ok!(EnginePacket::decode("2")),
            EnginePacket::Ping(String::new())
        );
        assert_eq!(
            assert_ok!(EnginePacket::decode("3echo")),
            EnginePacket::Pong("echo".to_string())
        );
        assert_eq!(assert_ok!(EnginePacket::decode("6")), EnginePacket::Noop);
    }

    #[test]
    fn test_decode_message_keeps_socket_payload() {
        let packet = assert_ok!(EnginePacket::decode(r#"42["new_message",{"id":1}]"#));
        assert_eq!(
            packet,
            EnginePacket::Message(r#"2["new_message",{"id":1}]"#.to_string())
        );
    }

    #[test]
    fn test_decode_rejects_malformed_packets() {
        assert_eq!(assert_err!(EnginePacket::decode("")), ProtocolError::Empty);
        assert!(matches!(
            assert_err!(EnginePacket::decode("9")),
            ProtocolError::UnknownType { layer: "engine", kind: '9' }
        ));
        assert!(matches!(
            assert_err!(EnginePacket::decode("0{not json")),
            ProtocolError::InvalidPayload(_)
        ));
        assert!(matches!(
            assert_err!(EnginePacket::decode("bAQID")),
            ProtocolError::Unsupported(_)
        ));
    }

    #[test]
    fn test_encode_packets() {
        assert_eq!(EnginePacket::Ping(String::new()).encode(), "2");
        assert_eq!(EnginePacket::Pong(String::new()).encode(), "3");
        assert_eq!(EnginePacket::Close.encode(), "1");
        assert_eq!(
            EnginePacket::Message(r#"0{"token":"abc"}"#.to_string()).encode(),
            r#"40{"token":"abc"}"#
        );
    }

    #[test]
    fn test_polling_payload_uses_record_separator() {
        let body = "40{\"sid\":\"s1\"}\u{1e}2\u{1e}42[\"x\"]";
        let packets = assert_ok!(decode_payload(body));
        assert_eq!(packets.len(), 3);
        assert_eq!(packets[1], EnginePacket::Ping(String::new()));

        assert_eq!(encode_payload(&packets), body);
        assert!(assert_ok!(decode_payload("")).is_empty());
    }
}
