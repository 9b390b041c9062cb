//! Realtime connection manager and its typed event surface
//!
//! - `events`: inbound/outbound event unions and disconnect reasons
//! - `listeners`: per-handle listener registry
//! - `handle`: `TransportHandle` / `Connector` seams
//! - `manager`: `ConnectionManager`, the single-connection owner

mod events;
mod handle;
mod listeners;
mod manager;

pub use events::{
    ConversationPayload, DisconnectReason, EventName, InboundEvent, MessagePayload, OutboundEvent,
};
pub use handle::{Connector, TransportHandle};
pub use listeners::{Listener, ListenerId, Listeners};
pub use manager::{ConnectionManager, ConnectionStats, StateDispatcher};
