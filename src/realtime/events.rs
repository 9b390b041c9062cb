use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Name under which listeners are registered
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventName {
    Connect,
    Disconnect,
    ConnectError,
    Error,
    /// Any other server-pushed event
    Custom(String),
}

impl EventName {
    pub fn as_str(&self) -> &str {
        match self {
            EventName::Connect => "connect",
            EventName::Disconnect => "disconnect",
            EventName::ConnectError => "connect_error",
            EventName::Error => "error",
            EventName::Custom(name) => name,
        }
    }
}

impl std::fmt::Display for EventName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DisconnectReason {
    /// The server sent a DISCONNECT packet
    IoServerDisconnect,
    /// `close()` was called on the handle
    IoClientDisconnect,
    /// No ping within `pingInterval + pingTimeout`
    PingTimeout,
    TransportClose,
    TransportError,
}

impl DisconnectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisconnectReason::IoServerDisconnect => "io server disconnect",
            DisconnectReason::IoClientDisconnect => "io client disconnect",
            DisconnectReason::PingTimeout => "ping timeout",
            DisconnectReason::TransportClose => "transport close",
            DisconnectReason::TransportError => "transport error",
        }
    }

    /// Whether the transport's reconnection policy applies
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            DisconnectReason::IoServerDisconnect | DisconnectReason::IoClientDisconnect
        )
    }
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a transport handle reports to its listeners
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    Connect { sid: String },
    Disconnect { reason: DisconnectReason },
    ConnectError { message: String },
    /// Server-originated `error` event, payload untouched
    Error { payload: Value },
    Server { name: String, payload: Value },
}

impl InboundEvent {
    pub fn name(&self) -> EventName {
        match self {
            InboundEvent::Connect { .. } => EventName::Connect,
            InboundEvent::Disconnect { .. } => EventName::Disconnect,
            InboundEvent::ConnectError { .. } => EventName::ConnectError,
            InboundEvent::Error { .. } => EventName::Error,
            InboundEvent::Server { name, .. } => EventName::Custom(name.clone()),
        }
    }

    /// Map a server EVENT packet onto the typed union
    pub fn from_server(name: &str, payload: Value) -> Self {
        match name {
            "error" => InboundEvent::Error { payload },
            other => InboundEvent::Server {
                name: other.to_string(),
                payload,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationPayload {
    pub conversation_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload {
    pub conversation_id: String,
    pub content: String,
}

/// Conversation actions emitted to the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundEvent {
    SendMessage(MessagePayload),
    JoinConversation(ConversationPayload),
    LeaveConversation(ConversationPayload),
    StartTyping(ConversationPayload),
    StopTyping(ConversationPayload),
    MarkRead(ConversationPayload),
}

impl OutboundEvent {
    pub fn send_message(conversation_id: impl Into<String>, content: impl Into<String>) -> Self {
        OutboundEvent::SendMessage(MessagePayload {
            conversation_id: conversation_id.into(),
            content: content.into(),
        })
    }

    pub fn join_conversation(conversation_id: impl Into<String>) -> Self {
        OutboundEvent::JoinConversation(conversation(conversation_id))
    }

    pub fn leave_conversation(conversation_id: impl Into<String>) -> Self {
        OutboundEvent::LeaveConversation(conversation(conversation_id))
    }

    pub fn start_typing(conversation_id: impl Into<String>) -> Self {
        OutboundEvent::StartTyping(conversation(conversation_id))
    }

    pub fn stop_typing(conversation_id: impl Into<String>) -> Self {
        OutboundEvent::StopTyping(conversation(conversation_id))
    }

    pub fn mark_read(conversation_id: impl Into<String>) -> Self {
        OutboundEvent::MarkRead(conversation(conversation_id))
    }

    /// Wire event name
    pub fn name(&self) -> &'static str {
        match self {
            OutboundEvent::SendMessage(_) => "send_message",
            OutboundEvent::JoinConversation(_) => "join_conversation",
            OutboundEvent::LeaveConversation(_) => "leave_conversation",
            OutboundEvent::StartTyping(_) => "user_typing",
            OutboundEvent::StopTyping(_) => "user_stop_typing",
            OutboundEvent::MarkRead(_) => "mark_read",
        }
    }

    pub fn payload(&self) -> serde_json::Result<Value> {
        match self {
            OutboundEvent::SendMessage(payload) => serde_json::to_value(payload),
            OutboundEvent::JoinConversation(payload)
            | OutboundEvent::LeaveConversation(payload)
            | OutboundEvent::StartTyping(payload)
            | OutboundEvent::StopTyping(payload)
            | OutboundEvent::MarkRead(payload) => serde_json::to_value(payload),
        }
    }

    pub fn conversation_id(&self) -> &str {
        match self {
            OutboundEvent::SendMessage(payload) => &payload.conversation_id,
            OutboundEvent::JoinConversation(payload)
            | OutboundEvent::LeaveConversation(payload)
            | OutboundEvent::StartTyping(payload)
            | OutboundEvent::StopTyping(payload)
            | OutboundEvent::MarkRead(payload) => &payload.conversation_id,
        }
    }
}

fn conversation(conversation_id: impl Into<String>) -> ConversationPayload {
    ConversationPayload {
        conversation_id: conversation_id.into(),
    }
}
