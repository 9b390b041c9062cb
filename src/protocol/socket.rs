//! Socket.IO v5 packets, carried inside Engine.IO `message` packets
//!
//! Text form: `<type>[<namespace>,][<ack id>][<json>]`. Acknowledgements and
//! binary attachments are not used by this client.

use serde_json::Value;

use crate::error::ProtocolError;

pub const DEFAULT_NAMESPACE: &str = "/";

#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    Connect {
        namespace: String,
        data: Option<Value>,
    },
    Disconnect {
        namespace: String,
    },
    /// `data` is `[event name, args...]`
    Event {
        namespace: String,
        data: Vec<Value>,
    },
    ConnectError {
        namespace: String,
        data: Value,
    },
}

impl SocketPacket {
    /// CONNECT on the default namespace with an auth payload
    pub fn connect(auth: Option<Value>) -> Self {
        SocketPacket::Connect {
            namespace: DEFAULT_NAMESPACE.to_string(),
            data: auth,
        }
    }

    pub fn disconnect() -> Self {
        SocketPacket::Disconnect {
            namespace: DEFAULT_NAMESPACE.to_string(),
        }
    }

    /// EVENT on the default namespace
    pub fn event(name: &str, args: impl IntoIterator<Item = Value>) -> Self {
        let mut data = vec![Value::String(name.to_string())];
        data.extend(args);
        SocketPacket::Event {
            namespace: DEFAULT_NAMESPACE.to_string(),
            data,
        }
    }

    pub fn namespace(&self) -> &str {
        match self {
            SocketPacket::Connect { namespace, .. }
            | SocketPacket::Disconnect { namespace }
            | SocketPacket::Event { namespace, .. }
            | SocketPacket::ConnectError { namespace, .. } => namespace,
        }
    }

    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let mut chars = text.chars();
        let kind = chars.next().ok_or(ProtocolError::Empty)?;
        let rest = chars.as_str();

        if matches!(kind, '3' | '5' | '6') {
            return Err(ProtocolError::Unsupported(format!(
                "socket packet type {}",
                kind
            )));
        }

        let (namespace, rest) = split_namespace(rest);
        // Ack ids precede the JSON body; this client never requests acks
        let body = rest.trim_start_matches(|c: char| c.is_ascii_digit());

        match kind {
            '0' => Ok(SocketPacket::Connect {
                namespace,
                data: parse_optional(body)?,
            }),
            '1' => Ok(SocketPacket::Disconnect { namespace }),
            '2' => match parse_optional(body)? {
                Some(Value::Array(data)) if matches!(data.first(), Some(Value::String(_))) => {
                    Ok(SocketPacket::Event { namespace, data })
                }
                _ => Err(ProtocolError::InvalidPayload(
                    "event payload must be an array starting with the event name".to_string(),
                )),
            },
            '4' => Ok(SocketPacket::ConnectError {
                namespace,
                data: parse_optional(body)?.unwrap_or(Value::Null),
            }),
            other => Err(ProtocolError::UnknownType {
                layer: "socket",
                kind: other,
            }),
        }
    }

    pub fn encode(&self) -> String {
        let (kind, data) = match self {
            SocketPacket::Connect { data, .. } => ('0', data.as_ref()),
            SocketPacket::Disconnect { .. } => ('1', None),
            SocketPacket::Event { .. } => ('2', None),
            SocketPacket::ConnectError { data, .. } => ('4', Some(data)),
        };

        let mut out = String::new();
        out.push(kind);

        let namespace = self.namespace();
        if namespace != DEFAULT_NAMESPACE {
            out.push_str(namespace);
            out.push(',');
        }

        match self {
            SocketPacket::Event { data, .. } => {
                out.push_str(&Value::Array(data.clone()).to_string());
            }
            _ => {
                if let Some(data) = data {
                    out.push_str(&data.to_string());
                }
            }
        }

        out
    }

    /// Event name and first argument of an EVENT packet
    pub fn event_parts(&self) -> Option<(&str, Value)> {
        match self {
            SocketPacket::Event { data, .. } => {
                let name = data.first()?.as_str()?;
                let payload = data.get(1).cloned().unwrap_or(Value::Null);
                Some((name, payload))
            }
            _ => None,
        }
    }
}

fn split_namespace(rest: &str) -> (String, &str) {
    if rest.starts_with('/') {
        match rest.find(',') {
            Some(idx) => (rest[..idx].to_string(), &rest[idx + 1..]),
            None => (rest.to_string(), ""),
        }
    } else {
        (DEFAULT_NAMESPACE.to_string(), rest)
    }
}

fn parse_optional(body: &str) -> Result<Option<Value>, ProtocolError> {
    if body.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(body)
        .map(Some)
        .map_err(|e| ProtocolError::InvalidPayload(e.to_string()))
}
