//! Owns the single realtime connection and the conversation actions on top of it.
//!
//! Every operation is best-effort: failures are logged, never returned.

use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::config::RealtimeConfig;
use crate::error::Result;
use crate::metrics::LifecycleMetrics;
use crate::transport::SocketIoConnector;

use super::events::{EventName, InboundEvent, OutboundEvent};
use super::handle::{Connector, TransportHandle};
use super::listeners::{Listener, ListenerId};

/// External state hook fed with every lifecycle event the manager observes
pub trait StateDispatcher: Send + Sync {
    fn dispatch(&self, event: &InboundEvent);
}

type DispatcherSlot = Arc<RwLock<Option<Arc<dyn StateDispatcher>>>>;

/// Counter state updated by the lifecycle observers
struct LifecycleState {
    reconnect_attempts: AtomicU32,
    reconnect_ceiling: u32,
    /// Unix millis of the last successful connect, 0 if never
    last_connected_at: AtomicI64,
}

/// Snapshot of the manager's connection state
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionStats {
    pub handle_id: Option<Uuid>,
    pub connected: bool,
    pub reconnect_attempts: u32,
    pub reconnect_ceiling: u32,
    pub last_connected_at: Option<DateTime<Utc>>,
}

pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    handle: RwLock<Option<Arc<dyn TransportHandle>>>,
    dispatcher: DispatcherSlot,
    lifecycle: Arc<LifecycleState>,
}

impl ConnectionManager {
    /// `reconnect_ceiling` is the attempt count after which a terminal failure is logged
    pub fn new(connector: Arc<dyn Connector>, reconnect_ceiling: u32) -> Self {
        Self {
            connector,
            handle: RwLock::new(None),
            dispatcher: Arc::new(RwLock::new(None)),
            lifecycle: Arc::new(LifecycleState {
                reconnect_attempts: AtomicU32::new(0),
                reconnect_ceiling,
                last_connected_at: AtomicI64::new(0),
            }),
        }
    }

    /// Build a manager backed by the Socket.IO transport
    pub fn from_config(config: &RealtimeConfig) -> Result<Self> {
        let options = config.transport_options()?;
        let ceiling = options.reconnection.max_attempts;
        let connector = SocketIoConnector::new(options)?;
        Ok(Self::new(Arc::new(connector), ceiling))
    }

    /// Install the state-dispatch hook. Passing `None` keeps an existing hook.
    pub fn initialize(&self, dispatcher: Option<Arc<dyn StateDispatcher>>) {
        if let Some(dispatcher) = dispatcher {
            *self
                .dispatcher
                .write()
                .unwrap_or_else(PoisonError::into_inner) = Some(dispatcher);
            tracing::debug!("Realtime state dispatcher installed");
        }
    }

    /// Return the live handle, or replace a stale one with a fresh connection.
    ///
    /// A fresh connection starts with a zero attempt counter and is started
    /// only after the lifecycle observers are attached. Does not wait for the
    /// handshake.
    pub fn connect(&self, token: &str) -> Arc<dyn TransportHandle> {
        let mut slot = self.slot_mut();

        if let Some(existing) = slot.as_ref() {
            if existing.is_connected() {
                tracing::debug!(handle_id = %existing.id(), "Realtime connection already established");
                return existing.clone();
            }
        }

        if let Some(stale) = slot.take() {
            tracing::debug!(handle_id = %stale.id(), "Tearing down stale realtime connection");
            stale.close();
        }

        let handle = self.connector.open(token);
        // The attempt counter belongs to the connection it observes
        self.lifecycle.reconnect_attempts.store(0, Ordering::Release);
        self.register_lifecycle_observers(handle.as_ref());
        handle.start();
        tracing::info!(handle_id = %handle.id(), "Realtime connection created");

        *slot = Some(handle.clone());
        handle
    }

    /// Close and forget the current handle, if any
    pub fn disconnect(&self) {
        if let Some(handle) = self.slot_mut().take() {
            tracing::info!(handle_id = %handle.id(), "Realtime connection closed by client");
            handle.close();
        }
    }

    pub fn is_connected(&self) -> bool {
        self.slot()
            .as_ref()
            .map(|handle| handle.is_connected())
            .unwrap_or(false)
    }

    /// Current handle, if one was created
    pub fn handle(&self) -> Option<Arc<dyn TransportHandle>> {
        self.slot().clone()
    }

    /// Register a listener on the current handle; `None` when there is no handle
    pub fn on(&self, event: EventName, listener: Listener) -> Option<ListenerId> {
        self.slot().as_ref().map(|handle| handle.on(event, listener))
    }

    pub fn off(&self, event: &EventName, id: ListenerId) {
        if let Some(handle) = self.slot().as_ref() {
            handle.off(event, id);
        }
    }

    pub fn send_message(&self, conversation_id: &str, content: &str) {
        self.emit(OutboundEvent::send_message(conversation_id, content));
    }

    pub fn join_conversation(&self, conversation_id: &str) {
        self.emit(OutboundEvent::join_conversation(conversation_id));
    }

    pub fn leave_conversation(&self, conversation_id: &str) {
        self.emit(OutboundEvent::leave_conversation(conversation_id));
    }

    pub fn start_typing(&self, conversation_id: &str) {
        self.emit(OutboundEvent::start_typing(conversation_id));
    }

    pub fn stop_typing(&self, conversation_id: &str) {
        self.emit(OutboundEvent::stop_typing(conversation_id));
    }

    pub fn mark_read(&self, conversation_id: &str) {
        self.emit(OutboundEvent::mark_read(conversation_id));
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.lifecycle.reconnect_attempts.load(Ordering::Acquire)
    }

    /// True once the observed failures reached the reconnection ceiling
    pub fn reconnect_exhausted(&self) -> bool {
        self.reconnect_attempts() >= self.lifecycle.reconnect_ceiling
    }

    pub fn stats(&self) -> ConnectionStats {
        let slot = self.slot();
        let last_connected_ms = self.lifecycle.last_connected_at.load(Ordering::Acquire);

        ConnectionStats {
            handle_id: slot.as_ref().map(|handle| handle.id()),
            connected: slot
                .as_ref()
                .map(|handle| handle.is_connected())
                .unwrap_or(false),
            reconnect_attempts: self.reconnect_attempts(),
            reconnect_ceiling: self.lifecycle.reconnect_ceiling,
            last_connected_at: (last_connected_ms > 0)
                .then(|| DateTime::from_timestamp_millis(last_connected_ms))
                .flatten(),
        }
    }

    /// Domain actions are guarded only by the handle existing
    fn emit(&self, event: OutboundEvent) {
        match self.slot().as_ref() {
            Some(handle) => handle.emit(event),
            None => {
                tracing::trace!(event = event.name(), "No realtime connection, event discarded");
            }
        }
    }

    fn register_lifecycle_observers(&self, handle: &dyn TransportHandle) {
        let lifecycle = self.lifecycle.clone();
        let dispatcher = self.dispatcher.clone();
        let handle_id = handle.id();

        let observer: Listener = Arc::new(move |event: &InboundEvent| {
            observe(&lifecycle, handle_id, event);

            let hook = dispatcher
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            if let Some(hook) = hook {
                hook.dispatch(event);
            }
        });

        for name in [
            EventName::Connect,
            EventName::Disconnect,
            EventName::ConnectError,
            EventName::Error,
        ] {
            handle.on(name, observer.clone());
        }
    }

    fn slot(&self) -> RwLockReadGuard<'_, Option<Arc<dyn TransportHandle>>> {
        self.handle.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn slot_mut(&self) -> RwLockWriteGuard<'_, Option<Arc<dyn TransportHandle>>> {
        self.handle.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Core lifecycle bookkeeping. Never stops the transport's own retry loop.
fn observe(lifecycle: &LifecycleState, handle_id: Uuid, event: &InboundEvent) {
    match event {
        InboundEvent::Connect { sid } => {
            lifecycle.reconnect_attempts.store(0, Ordering::Release);
            lifecycle
                .last_connected_at
                .store(Utc::now().timestamp_millis(), Ordering::Release);
            tracing::info!(handle_id = %handle_id, sid = %sid, "Realtime connected");
        }
        InboundEvent::Disconnect { reason } => {
            tracing::info!(handle_id = %handle_id, reason = %reason, "Realtime disconnected");
        }
        InboundEvent::ConnectError { message } => {
            let attempts = lifecycle.reconnect_attempts.fetch_add(1, Ordering::AcqRel) + 1;
            tracing::warn!(
                handle_id = %handle_id,
                attempt = attempts,
                error = %message,
                "Realtime connection error"
            );

            if attempts == lifecycle.reconnect_ceiling {
                LifecycleMetrics::record_reconnects_exhausted();
            }
            if attempts >= lifecycle.reconnect_ceiling {
                tracing::error!(
                    handle_id = %handle_id,
                    attempts,
                    ceiling = lifecycle.reconnect_ceiling,
                    "Realtime connection failed after maximum reconnection attempts"
                );
            }
        }
        InboundEvent::Error { payload } => {
            tracing::error!(handle_id = %handle_id, payload = %payload, "Realtime server error");
        }
        InboundEvent::Server { name, .. } => {
            tracing::debug!(handle_id = %handle_id, event = %name, "Realtime server event");
        }
    }
}
