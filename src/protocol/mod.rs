//! Wire codec for the realtime backend
//!
//! - `engine`: Engine.IO v4 framing (open/ping/pong/message, polling payloads)
//! - `socket`: Socket.IO v5 packets carried in Engine.IO messages

mod engine;
mod socket;

pub use engine::{
    decode_payload, encode_payload, EnginePacket, OpenHandshake, ENGINE_PROTOCOL,
    RECORD_SEPARATOR,
};
pub use socket::{SocketPacket, DEFAULT_NAMESPACE};
