use std::sync::Arc;

use uuid::Uuid;

use super::events::{EventName, OutboundEvent};
use super::listeners::{Listener, ListenerId};

/// One live duplex connection to the realtime backend.
///
/// State changes happen asynchronously; observe them through `on`.
pub trait TransportHandle: Send + Sync {
    fn id(&self) -> Uuid;

    fn is_connected(&self) -> bool;

    /// Begin connecting. Listeners registered before this see every event.
    /// Later calls are no-ops.
    fn start(&self);

    fn on(&self, event: EventName, listener: Listener) -> ListenerId;

    fn off(&self, event: &EventName, id: ListenerId) -> bool;

    /// Fire-and-forget; dropped when the transport cannot take it
    fn emit(&self, event: OutboundEvent);

    /// Sever the transport and stop reconnecting. Idempotent.
    fn close(&self);
}

/// Creates idle transport handles; the caller starts them with `start`.
pub trait Connector: Send + Sync {
    fn open(&self, token: &str) -> Arc<dyn TransportHandle>;
}
