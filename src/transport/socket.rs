//! Socket.IO client connection: handle plus background connection task

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::watch;
use tokio::time::{timeout, Instant};
use uuid::Uuid;

use crate::error::{RealtimeError, Result};
use crate::metrics::{EventMetrics, LifecycleMetrics};
use crate::protocol::{EnginePacket, OpenHandshake, SocketPacket, DEFAULT_NAMESPACE};
use crate::realtime::{
    Connector, DisconnectReason, EventName, InboundEvent, Listener, ListenerId, Listeners,
    OutboundEvent, TransportHandle,
};

use super::{open_engine, EngineConnection, PacketSink, ReconnectSchedule, TransportOptions};

/// Buffered inbound batches between the reader task and the session loop
const INBOUND_BUFFER: usize = 32;

/// Upper bound for a best-effort transport close
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Ceiling for the server-announced ping window
const MAX_PING_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

/// Opens Socket.IO connections against one backend.
///
/// Must be created inside a Tokio runtime; connection tasks run on it.
pub struct SocketIoConnector {
    options: TransportOptions,
    http: reqwest::Client,
    runtime: Handle,
}

impl SocketIoConnector {
    pub fn new(options: TransportOptions) -> Result<Self> {
        let runtime = Handle::try_current()?;
        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            options,
            http,
            runtime,
        })
    }
}

impl Connector for SocketIoConnector {
    fn open(&self, token: &str) -> Arc<dyn TransportHandle> {
        SocketHandle::new(
            self.options.clone(),
            self.http.clone(),
            token.to_string(),
            self.runtime.clone(),
        )
    }
}

/// State shared between a handle and its connection task
#[derive(Default)]
struct Shared {
    connected: AtomicBool,
    listeners: Listeners,
}

/// Handle for one Socket.IO connection.
///
/// Nothing happens on the network until `start`. Dropping the last
/// reference stops the connection task.
pub struct SocketHandle {
    id: Uuid,
    shared: Arc<Shared>,
    outbound: mpsc::Sender<OutboundEvent>,
    shutdown: watch::Sender<bool>,
    runtime: Handle,
    /// Taken by the first `start`
    pending: Mutex<Option<ConnectionTask>>,
}

impl SocketHandle {
    pub fn new(
        options: TransportOptions,
        http: reqwest::Client,
        token: String,
        runtime: Handle,
    ) -> Arc<Self> {
        let id = Uuid::new_v4();
        let shared = Arc::new(Shared::default());
        let (outbound_tx, outbound_rx) = mpsc::channel(options.outbound_buffer.max(1));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = ConnectionTask {
            id,
            schedule: ReconnectSchedule::new(options.reconnection.clone()),
            options,
            http,
            token,
            shared: shared.clone(),
            outbound: outbound_rx,
            shutdown: shutdown_rx,
        };

        Arc::new(Self {
            id,
            shared,
            outbound: outbound_tx,
            shutdown: shutdown_tx,
            runtime,
            pending: Mutex::new(Some(task)),
        })
    }
}

impl TransportHandle for SocketHandle {
    fn id(&self) -> Uuid {
        self.id
    }

    fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::Acquire)
    }

    fn start(&self) {
        let task = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            tracing::debug!(handle_id = %self.id, "Starting realtime connection task");
            self.runtime.spawn(task.run());
        }
    }

    fn on(&self, event: EventName, listener: Listener) -> ListenerId {
        self.shared.listeners.add(event, listener)
    }

    fn off(&self, event: &EventName, id: ListenerId) -> bool {
        self.shared.listeners.remove(event, id)
    }

    fn emit(&self, event: OutboundEvent) {
        let name = event.name();

        if !self.is_connected() {
            tracing::trace!(
                handle_id = %self.id,
                event = name,
                conversation_id = event.conversation_id(),
                "Not connected, event dropped"
            );
            EventMetrics::record_dropped_disconnected(name);
            return;
        }

        match self.outbound.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                tracing::warn!(
                    handle_id = %self.id,
                    event = name,
                    "Outbound queue full, event dropped"
                );
                EventMetrics::record_dropped_backpressure(name);
            }
            Err(TrySendError::Closed(_)) => {
                tracing::trace!(handle_id = %self.id, event = name, "Connection task stopped, event dropped");
                EventMetrics::record_dropped_disconnected(name);
            }
        }
    }

    fn close(&self) {
        if !self.shutdown.send_replace(true) {
            tracing::debug!(handle_id = %self.id, "Closing realtime connection");
        }
    }
}

impl Drop for SocketHandle {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}

/// Connected Socket.IO session before the packet pump starts
struct Session {
    connection: EngineConnection,
    sid: String,
    /// Packets received in the same batch as the CONNECT ack
    backlog: Vec<EnginePacket>,
}

struct ConnectionTask {
    id: Uuid,
    options: TransportOptions,
    schedule: ReconnectSchedule,
    http: reqwest::Client,
    token: String,
    shared: Arc<Shared>,
    outbound: mpsc::Receiver<OutboundEvent>,
    shutdown: watch::Receiver<bool>,
}

impl ConnectionTask {
    #[tracing::instrument(name = "realtime.connection", skip(self), fields(handle_id = %self.id))]
    async fn run(mut self) {
        loop {
            if *self.shutdown.borrow() {
                break;
            }

            let attempt = tokio::select! {
                biased;
                _ = wait_shutdown(&mut self.shutdown) => break,
                result = establish(&self.options, &self.http, &self.token) => result,
            };

            match attempt {
                Ok(session) => {
                    self.schedule.reset();
                    let reason = self.run_session(session).await;
                    if !reason.is_recoverable() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::debug!(error = %e, "Realtime connection attempt failed");
                    LifecycleMetrics::record_connect_error();
                    self.shared.listeners.emit(&InboundEvent::ConnectError {
                        message: e.connect_error_message(),
                    });
                }
            }

            if !self.schedule.is_enabled() {
                tracing::debug!("Reconnection disabled, connection task stopping");
                break;
            }

            let Some(delay) = self.schedule.next_delay() else {
                tracing::warn!(
                    attempts = self.schedule.attempt(),
                    "Reconnection attempts exhausted, giving up"
                );
                break;
            };

            tracing::debug!(
                attempt = self.schedule.attempt(),
                delay_ms = delay.as_millis() as u64,
                "Reconnecting"
            );

            tokio::select! {
                biased;
                _ = wait_shutdown(&mut self.shutdown) => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        tracing::debug!("Realtime connection task stopped");
    }

    /// Pump packets until the session ends, then report the reason
    async fn run_session(&mut self, session: Session) -> DisconnectReason {
        let Session {
            connection,
            sid,
            backlog,
        } = session;
        let EngineConnection {
            kind,
            handshake,
            mut sink,
            mut stream,
        } = connection;

        // Nothing carries over a reconnect boundary
        while self.outbound.try_recv().is_ok() {}

        self.shared.connected.store(true, Ordering::Release);
        LifecycleMetrics::record_connected();
        tracing::debug!(transport = %kind, engine_sid = %handshake.sid, sid = %sid, "Realtime session established");
        self.shared.listeners.emit(&InboundEvent::Connect { sid });

        let (inbound_tx, mut inbound_rx) = mpsc::channel::<Result<Vec<EnginePacket>>>(INBOUND_BUFFER);
        let reader = tokio::spawn(async move {
            loop {
                match stream.next_batch().await {
                    Ok(Some(batch)) => {
                        if inbound_tx.send(Ok(batch)).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(RealtimeError::Protocol(e)) => {
                        tracing::warn!(error = %e, "Skipping malformed engine packet");
                    }
                    Err(e) => {
                        let _ = inbound_tx.send(Err(e)).await;
                        break;
                    }
                }
            }
        });

        let ping_window = ping_window(&handshake);
        let ping_deadline = tokio::time::sleep(ping_window);
        tokio::pin!(ping_deadline);

        let mut ended = None;
        if !backlog.is_empty() {
            let outcome = process_batch(&self.shared, sink.as_mut(), backlog).await;
            if outcome.pinged {
                ping_deadline.as_mut().reset(Instant::now() + ping_window);
            }
            ended = outcome.end;
        }

        let reason = match ended {
            Some(reason) => reason,
            None => loop {
                tokio::select! {
                    biased;
                    _ = wait_shutdown(&mut self.shutdown) => {
                        let _ = timeout(
                            CLOSE_TIMEOUT,
                            sink.send(vec![EnginePacket::Message(SocketPacket::disconnect().encode())]),
                        )
                        .await;
                        break DisconnectReason::IoClientDisconnect;
                    }
                    _ = &mut ping_deadline => {
                        tracing::warn!(window_ms = ping_window.as_millis() as u64, "No ping from server");
                        break DisconnectReason::PingTimeout;
                    }
                    batch = inbound_rx.recv() => match batch {
                        None => break DisconnectReason::TransportClose,
                        Some(Err(e)) => {
                            tracing::warn!(error = %e, "Realtime transport error");
                            break DisconnectReason::TransportError;
                        }
                        Some(Ok(packets)) => {
                            let outcome = process_batch(&self.shared, sink.as_mut(), packets).await;
                            if outcome.pinged {
                                ping_deadline.as_mut().reset(Instant::now() + ping_window);
                            }
                            if let Some(reason) = outcome.end {
                                break reason;
                            }
                        }
                    },
                    Some(event) = self.outbound.recv() => {
                        if let Err(e) = write_event(sink.as_mut(), &event).await {
                            tracing::warn!(error = %e, event = event.name(), "Failed to write event");
                            break DisconnectReason::TransportError;
                        }
                    }
                }
            },
        };

        reader.abort();
        let _ = timeout(CLOSE_TIMEOUT, sink.close()).await;

        self.shared.connected.store(false, Ordering::Release);
        LifecycleMetrics::record_disconnected(reason);
        self.shared.listeners.emit(&InboundEvent::Disconnect { reason });

        reason
    }
}

/// How long a session may go without a server ping
fn ping_window(handshake: &OpenHandshake) -> Duration {
    Duration::from_millis(handshake.ping_interval.saturating_add(handshake.ping_timeout))
        .min(MAX_PING_WINDOW)
}

async fn wait_shutdown(shutdown: &mut watch::Receiver<bool>) {
    // A dropped sender means the handle is gone
    let _ = shutdown.wait_for(|closed| *closed).await;
}

/// Open an engine connection and complete the Socket.IO CONNECT exchange
async fn establish(
    options: &TransportOptions,
    http: &reqwest::Client,
    token: &str,
) -> Result<Session> {
    match timeout(options.connect_timeout, handshake(options, http, token)).await {
        Ok(result) => result,
        Err(_) => Err(RealtimeError::Timeout(format!(
            "handshake not completed within {}ms",
            options.connect_timeout.as_millis()
        ))),
    }
}

async fn handshake(
    options: &TransportOptions,
    http: &reqwest::Client,
    token: &str,
) -> Result<Session> {
    let mut connection = open_engine(options, http).await?;

    let auth = json!({ "token": token });
    connection
        .sink
        .send(vec![EnginePacket::Message(
            SocketPacket::connect(Some(auth)).encode(),
        )])
        .await?;

    loop {
        let Some(batch) = connection.stream.next_batch().await? else {
            return Err(RealtimeError::Closed(
                "transport closed during handshake".to_string(),
            ));
        };

        let mut packets = batch.into_iter();
        while let Some(packet) = packets.next() {
            match packet {
                EnginePacket::Ping(data) => {
                    connection.sink.send(vec![EnginePacket::Pong(data)]).await?;
                }
                EnginePacket::Close => {
                    return Err(RealtimeError::Closed(
                        "server closed the transport during handshake".to_string(),
                    ));
                }
                EnginePacket::Message(text) => match SocketPacket::decode(&text)? {
                    SocketPacket::Connect { data, .. } => {
                        let sid = data
                            .as_ref()
                            .and_then(|d| d.get("sid"))
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string();
                        return Ok(Session {
                            connection,
                            sid,
                            backlog: packets.collect(),
                        });
                    }
                    SocketPacket::ConnectError { data, .. } => {
                        let message = data
                            .get("message")
                            .and_then(Value::as_str)
                            .map(str::to_string)
                            .unwrap_or_else(|| data.to_string());
                        let _ = timeout(CLOSE_TIMEOUT, connection.sink.close()).await;
                        return Err(RealtimeError::Rejected(message));
                    }
                    other => {
                        tracing::trace!(packet = ?other, "Ignoring packet before connect ack");
                    }
                },
                _ => {}
            }
        }
    }
}

#[derive(Default)]
struct BatchOutcome {
    pinged: bool,
    end: Option<DisconnectReason>,
}

async fn process_batch(
    shared: &Shared,
    sink: &mut dyn PacketSink,
    packets: Vec<EnginePacket>,
) -> BatchOutcome {
    let mut outcome = BatchOutcome::default();

    for packet in packets {
        match packet {
            EnginePacket::Ping(data) => {
                outcome.pinged = true;
                if let Err(e) = sink.send(vec![EnginePacket::Pong(data)]).await {
                    tracing::warn!(error = %e, "Failed to answer ping");
                    outcome.end = Some(DisconnectReason::TransportError);
                    break;
                }
            }
            EnginePacket::Close => {
                outcome.end = Some(DisconnectReason::TransportClose);
                break;
            }
            EnginePacket::Message(text) => match SocketPacket::decode(&text) {
                Ok(packet) if packet.namespace() != DEFAULT_NAMESPACE => {
                    tracing::trace!(namespace = packet.namespace(), "Ignoring packet for other namespace");
                }
                Ok(SocketPacket::Disconnect { .. }) => {
                    outcome.end = Some(DisconnectReason::IoServerDisconnect);
                    break;
                }
                Ok(packet @ SocketPacket::Event { .. }) => {
                    if let Some((name, payload)) = packet.event_parts() {
                        EventMetrics::record_server_event();
                        shared.listeners.emit(&InboundEvent::from_server(name, payload));
                    }
                }
                Ok(SocketPacket::ConnectError { data, .. }) => {
                    tracing::warn!(data = %data, "Unexpected connect error during session");
                }
                Ok(SocketPacket::Connect { .. }) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping malformed socket packet");
                }
            },
            EnginePacket::Open(_) | EnginePacket::Pong(_) | EnginePacket::Upgrade | EnginePacket::Noop => {}
        }
    }

    outcome
}

async fn write_event(sink: &mut dyn PacketSink, event: &OutboundEvent) -> Result<()> {
    let packet = SocketPacket::event(event.name(), [event.payload()?]);
    sink.send(vec![EnginePacket::Message(packet.encode())]).await?;
    EventMetrics::record_emitted(event.name());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{ReconnectPolicy, TransportKind};

    fn handshake(ping_interval: u64, ping_timeout: u64) -> OpenHandshake {
        OpenHandshake {
            sid: "eng-1".to_string(),
            upgrades: vec![],
            ping_interval,
            ping_timeout,
            max_payload: None,
        }
    }

    fn options() -> TransportOptions {
        TransportOptions {
            url: url::Url::parse("http://127.0.0.1:9").unwrap(),
            path: "/socket.io/".to_string(),
            transports: vec![TransportKind::Websocket],
            reconnection: ReconnectPolicy::default(),
            connect_timeout: Duration::from_secs(1),
            outbound_buffer: 4,
        }
    }

    #[test]
    fn test_ping_window_adds_interval_and_timeout() {
        assert_eq!(
            ping_window(&handshake(25_000, 20_000)),
            Duration::from_millis(45_000)
        );
    }

    #[test]
    fn test_ping_window_saturates_on_oversized_values() {
        assert_eq!(ping_window(&handshake(u64::MAX, u64::MAX)), MAX_PING_WINDOW);
        assert_eq!(ping_window(&handshake(u64::MAX - 1, 5)), MAX_PING_WINDOW);
    }

    #[test]
    fn test_connector_requires_runtime() {
        let result = SocketIoConnector::new(options());
        assert!(matches!(result, Err(RealtimeError::Runtime(_))));
    }

    #[tokio::test]
    async fn test_handle_stays_idle_until_started() {
        let connector = SocketIoConnector::new(options()).unwrap();
        let handle = connector.open("tok");

        let errors = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = errors.clone();
        handle.on(
            EventName::ConnectError,
            Arc::new(move |_: &InboundEvent| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(errors.load(Ordering::SeqCst), 0);
        assert!(!handle.is_connected());
        handle.close();
    }
}
