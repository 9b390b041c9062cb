//! Connection manager behaviour against an in-memory transport
//!
//! The mock handle records what the manager does to it and lets each test
//! fire lifecycle events as if they came from the network.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::json;
use uuid::Uuid;

use storefront_realtime::realtime::{
    Connector, ConnectionManager, DisconnectReason, EventName, InboundEvent, Listener,
    ListenerId, Listeners, OutboundEvent, StateDispatcher, TransportHandle,
};

#[derive(Default)]
struct MockHandle {
    id: Uuid,
    token: String,
    connected: AtomicBool,
    closed: AtomicBool,
    /// ConnectError listeners present when `start` was called
    observers_at_start: Mutex<Option<usize>>,
    listeners: Listeners,
    emitted: Mutex<Vec<OutboundEvent>>,
}

impl MockHandle {
    /// Deliver an event the way the transport task would
    fn fire(&self, event: InboundEvent) {
        match &event {
            InboundEvent::Connect { .. } => self.connected.store(true, Ordering::SeqCst),
            InboundEvent::Disconnect { .. } => self.connected.store(false, Ordering::SeqCst),
            _ => {}
        }
        self.listeners.emit(&event);
    }

    fn emitted(&self) -> Vec<OutboundEvent> {
        self.emitted.lock().unwrap().clone()
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn observers_at_start(&self) -> Option<usize> {
        *self.observers_at_start.lock().unwrap()
    }
}

impl TransportHandle for MockHandle {
    fn id(&self) -> Uuid {
        self.id
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn start(&self) {
        let mut slot = self.observers_at_start.lock().unwrap();
        if slot.is_none() {
            *slot = Some(self.listeners.count(&EventName::ConnectError));
        }
    }

    fn on(&self, event: EventName, listener: Listener) -> ListenerId {
        self.listeners.add(event, listener)
    }

    fn off(&self, event: &EventName, id: ListenerId) -> bool {
        self.listeners.remove(event, id)
    }

    fn emit(&self, event: OutboundEvent) {
        self.emitted.lock().unwrap().push(event);
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct MockConnector {
    opened: Mutex<Vec<Arc<MockHandle>>>,
}

impl MockConnector {
    fn open_count(&self) -> usize {
        self.opened.lock().unwrap().len()
    }

    fn last(&self) -> Arc<MockHandle> {
        self.opened.lock().unwrap().last().cloned().expect("no handle opened")
    }
}

impl Connector for MockConnector {
    fn open(&self, token: &str) -> Arc<dyn TransportHandle> {
        let handle = Arc::new(MockHandle {
            id: Uuid::new_v4(),
            token: token.to_string(),
            ..Default::default()
        });
        self.opened.lock().unwrap().push(handle.clone());
        handle
    }
}

#[derive(Default)]
struct RecordingDispatcher {
    events: Mutex<Vec<InboundEvent>>,
}

impl StateDispatcher for RecordingDispatcher {
    fn dispatch(&self, event: &InboundEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

fn setup(ceiling: u32) -> (Arc<MockConnector>, ConnectionManager) {
    let connector = Arc::new(MockConnector::default());
    let manager = ConnectionManager::new(connector.clone(), ceiling);
    (connector, manager)
}

fn connected() -> InboundEvent {
    InboundEvent::Connect {
        sid: "sock-1".to_string(),
    }
}

fn connect_error(message: &str) -> InboundEvent {
    InboundEvent::ConnectError {
        message: message.to_string(),
    }
}

#[test]
fn test_connect_twice_while_connected_reuses_handle() {
    let (connector, manager) = setup(5);

    let first = manager.connect("tok-123");
    connector.last().fire(connected());

    let second = manager.connect("tok-123");

    assert_eq!(first.id(), second.id());
    assert_eq!(connector.open_count(), 1);
    assert!(manager.is_connected());
}

#[test]
fn test_disconnect_without_connect_is_noop() {
    let (connector, manager) = setup(5);

    manager.disconnect();
    manager.disconnect();

    assert!(!manager.is_connected());
    assert!(manager.handle().is_none());
    assert_eq!(connector.open_count(), 0);
}

#[test]
fn test_connect_after_disconnect_creates_fresh_handle() {
    let (connector, manager) = setup(5);

    let first = manager.connect("tok-123");
    manager.disconnect();

    assert!(!manager.is_connected());
    assert!(connector.last().is_closed());

    let second = manager.connect("tok-123");
    assert_ne!(first.id(), second.id());
    assert_eq!(connector.open_count(), 2);
}

#[test]
fn test_connect_replaces_stale_handle() {
    let (connector, manager) = setup(5);

    manager.connect("tok-old");
    let stale = connector.last();
    // Never reached the connected state

    manager.connect("tok-new");

    assert!(stale.is_closed());
    assert_eq!(connector.open_count(), 2);
    assert_eq!(connector.last().token, "tok-new");
}

#[test]
fn test_off_before_fire_prevents_callback() {
    let (connector, manager) = setup(5);
    manager.connect("tok-123");

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let id = manager
        .on(
            EventName::Custom("new_message".to_string()),
            Arc::new(move |_: &InboundEvent| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .expect("handle exists");

    manager.off(&EventName::Custom("new_message".to_string()), id);
    connector.last().fire(InboundEvent::Server {
        name: "new_message".to_string(),
        payload: json!({"content": "hello"}),
    });

    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_on_without_handle_is_ignored() {
    let (_connector, manager) = setup(5);
    let id = manager.on(EventName::Connect, Arc::new(|_: &InboundEvent| {}));
    assert!(id.is_none());
}

#[test]
fn test_domain_actions_without_handle_have_no_effect() {
    let (connector, manager) = setup(5);

    manager.send_message("conv-1", "hello");
    manager.join_conversation("conv-1");
    manager.leave_conversation("conv-1");
    manager.start_typing("conv-1");
    manager.stop_typing("conv-1");
    manager.mark_read("conv-1");

    assert_eq!(connector.open_count(), 0);
    assert!(manager.handle().is_none());
}

#[test]
fn test_domain_actions_reach_the_handle() {
    let (connector, manager) = setup(5);
    manager.connect("tok-123");
    connector.last().fire(connected());

    manager.join_conversation("conv-7");
    manager.send_message("conv-7", "Is my order on its way?");
    manager.start_typing("conv-7");
    manager.stop_typing("conv-7");
    manager.mark_read("conv-7");
    manager.leave_conversation("conv-7");

    let emitted = connector.last().emitted();
    let names: Vec<&str> = emitted.iter().map(|event| event.name()).collect();
    assert_eq!(
        names,
        vec![
            "join_conversation",
            "send_message",
            "user_typing",
            "user_stop_typing",
            "mark_read",
            "leave_conversation"
        ]
    );
    assert_eq!(
        emitted[1].payload().unwrap(),
        json!({"conversationId": "conv-7", "content": "Is my order on its way?"})
    );
    assert_eq!(emitted[4].payload().unwrap(), json!({"conversationId": "conv-7"}));
}

#[test]
fn test_domain_actions_forwarded_while_handle_not_yet_connected() {
    // The handle decides what to do with events sent before the handshake
    let (connector, manager) = setup(5);
    manager.connect("tok-123");

    manager.mark_read("conv-1");

    assert_eq!(connector.last().emitted().len(), 1);
}

#[test]
fn test_connect_error_ceiling_is_observed_without_disconnect() {
    let (connector, manager) = setup(3);
    manager.connect("tok-123");
    let handle = connector.last();

    for attempt in 1..=3 {
        handle.fire(connect_error("xhr poll error"));
        assert_eq!(manager.reconnect_attempts(), attempt);
    }

    assert!(manager.reconnect_exhausted());
    assert!(!handle.is_closed());
    assert!(manager.handle().is_some());

    // Further failures keep counting past the ceiling
    handle.fire(connect_error("xhr poll error"));
    assert_eq!(manager.reconnect_attempts(), 4);
    assert!(!handle.is_closed());
}

#[test]
fn test_handle_started_after_observers_attached() {
    let (connector, manager) = setup(5);
    manager.connect("tok-123");

    assert_eq!(connector.last().observers_at_start(), Some(1));
}

#[test]
fn test_existing_connected_handle_is_not_restarted() {
    let (connector, manager) = setup(5);
    manager.connect("tok-123");
    let handle = connector.last();
    handle.fire(connected());

    manager.connect("tok-123");

    // Still the single observer registration from the first connect
    assert_eq!(handle.listeners.count(&EventName::ConnectError), 1);
    assert_eq!(connector.open_count(), 1);
}

#[test]
fn test_fresh_handle_starts_with_zero_attempts() {
    let (connector, manager) = setup(3);
    manager.connect("tok-123");
    let first = connector.last();
    for _ in 0..4 {
        first.fire(connect_error("invalid token"));
    }
    assert_eq!(manager.reconnect_attempts(), 4);
    assert!(manager.reconnect_exhausted());

    manager.disconnect();
    manager.connect("tok-fresh");

    assert_eq!(manager.reconnect_attempts(), 0);
    assert!(!manager.reconnect_exhausted());

    connector.last().fire(connect_error("timeout"));
    assert_eq!(manager.reconnect_attempts(), 1);
    assert!(!manager.reconnect_exhausted());
}

#[test]
fn test_stale_handle_events_do_not_leak_into_fresh_counter() {
    let (connector, manager) = setup(3);
    manager.connect("tok-old");
    let stale = connector.last();
    stale.fire(connect_error("timeout"));
    stale.fire(connect_error("timeout"));

    manager.connect("tok-new");
    assert_eq!(manager.reconnect_attempts(), 0);
    assert_eq!(manager.stats().handle_id, Some(connector.last().id));
}

#[test]
fn test_connect_resets_attempt_counter() {
    let (connector, manager) = setup(5);
    manager.connect("tok-123");
    let handle = connector.last();

    handle.fire(connect_error("timeout"));
    handle.fire(connect_error("timeout"));
    assert_eq!(manager.reconnect_attempts(), 2);

    handle.fire(connected());
    assert_eq!(manager.reconnect_attempts(), 0);
    assert!(!manager.reconnect_exhausted());

    let stats = manager.stats();
    assert!(stats.connected);
    assert_eq!(stats.handle_id, Some(handle.id));
    assert!(stats.last_connected_at.is_some());
}

#[test]
fn test_connect_then_transport_close_scenario() {
    let (connector, manager) = setup(5);

    manager.connect("tok-123");
    let handle = connector.last();
    assert_eq!(handle.token, "tok-123");

    handle.fire(connected());
    assert!(manager.is_connected());

    handle.fire(InboundEvent::Disconnect {
        reason: DisconnectReason::TransportClose,
    });
    assert!(!manager.is_connected());
    // The handle is kept so the transport can reconnect on its own
    assert!(manager.handle().is_some());
}

#[test]
fn test_dispatcher_receives_lifecycle_events() {
    let (connector, manager) = setup(5);
    let dispatcher = Arc::new(RecordingDispatcher::default());
    manager.initialize(Some(dispatcher.clone()));

    manager.connect("tok-123");
    let handle = connector.last();
    handle.fire(connected());
    handle.fire(InboundEvent::Error {
        payload: json!({"code": "forbidden"}),
    });
    handle.fire(InboundEvent::Disconnect {
        reason: DisconnectReason::PingTimeout,
    });

    let events = dispatcher.events.lock().unwrap();
    let names: Vec<EventName> = events.iter().map(InboundEvent::name).collect();
    assert_eq!(
        names,
        vec![EventName::Connect, EventName::Error, EventName::Disconnect]
    );
}

#[test]
fn test_initialize_none_keeps_existing_dispatcher() {
    let (connector, manager) = setup(5);
    let dispatcher = Arc::new(RecordingDispatcher::default());
    manager.initialize(Some(dispatcher.clone()));
    manager.initialize(None);

    manager.connect("tok-123");
    connector.last().fire(connected());

    assert_eq!(dispatcher.events.lock().unwrap().len(), 1);
}

#[test]
fn test_drop_closes_handle() {
    let (connector, manager) = setup(5);
    manager.connect("tok-123");
    let handle = connector.last();

    drop(manager);

    assert!(handle.is_closed());
}
