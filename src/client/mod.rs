//! Live Series Client
//!
//! One multiplexed WebSocket carrying many named time-series subscriptions.
//!
//! ## Architecture
//!
//! - **SubscriptionRegistry**: desired state per group; the wire protocol is
//!   a projection of it and is replayed in full after every `hello`
//! - **ListenerRegistry**: event name → callbacks, including the composite
//!   `ack:<group>`, `init:<group>` and `append:<series>` keys
//! - **Backoff**: reconnect schedule, advanced only by the close path
//! - **Session**: the open socket, with reader, writer and health-probe tasks
//!
//! ## Usage
//!
//! ```rust,no_run
//! use liveseries::{key, ClientConfig, LiveEvent, LiveSeriesClient, Resolution, SubscriptionConfig};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let client = LiveSeriesClient::new(&ClientConfig::default())?;
//!
//! client.on(key::append("pod-cpu-default/nginx"), |event| {
//!     if let LiveEvent::Append { point, .. } = event {
//!         println!("{} {}", point.t, point.v);
//!     }
//! });
//!
//! client.subscribe(
//!     SubscriptionConfig::new("nginx-cpu", Resolution::Hi, "0").series_key("pod-cpu-default/nginx"),
//! );
//! client.connect().await?;
//! # Ok(())
//! # }
//! ```

mod backoff;
mod error;
mod events;
mod state;
mod subscriptions;


pub use backoff::{Backoff, ReconnectPolicy};
pub use error::{ClientError, ClientResult};
pub use events::{key, ErrorOrigin, LiveEvent, Listener, ListenerId, ListenerRegistry, StreamError};
pub use state::{ConnectionPhase, ConnectionState};
pub use subscriptions::{Removal, SubscriptionConfig, SubscriptionRegistry};

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use url::Url;
use uuid::Uuid;

use crate::config::ClientConfig;
use crate::websocket::{
    ClientMessage, Connection, Connector, Frame, FrameSink, FrameStream, Limits, ServerMessage,
    WsConnector,
};

/// Handle to the shared streaming client
///
/// Cloning is cheap and every clone drives the same connection, so the
/// application builds one client and hands clones to each consumer.
#[derive(Clone)]
pub struct LiveSeriesClient {
    inner: Arc<Inner>,
}

struct Inner {
    endpoint: Url,
    health_interval: Option<Duration>,
    connector: Arc<dyn Connector>,
    listeners: ListenerRegistry,
    core: Mutex<Core>,
    /// Serialises connect attempts
    connect_gate: tokio::sync::Mutex<()>,
}

struct Core {
    phase: ConnectionPhase,
    state: ConnectionState,
    subscriptions: SubscriptionRegistry,
    should_auto_reconnect: bool,
    backoff: Backoff,
    session: Option<Session>,
    reconnect_task: Option<JoinHandle<()>>,
    /// Bumped by `disconnect()`; attempts started under an older epoch are discarded
    epoch: u64,
}

/// An open socket and the tasks serving it
struct Session {
    id: String,
    outbound: mpsc::UnboundedSender<Frame>,
    reader: JoinHandle<()>,
    health: Option<JoinHandle<()>>,
}

impl Session {
    fn is_open(&self) -> bool {
        !self.outbound.is_closed()
    }

    /// Stop reading and probing. The writer drains whatever is queued.
    fn stop(self) {
        self.reader.abort();
        if let Some(health) = self.health {
            health.abort();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    Caller,
    Reconnect,
}

impl Core {
    fn is_connected(&self) -> bool {
        self.state.connected && self.session.as_ref().is_some_and(Session::is_open)
    }

    /// Fire-and-forget send; a logged no-op while disconnected
    fn send(&self, message: &ClientMessage) -> bool {
        let session = match &self.session {
            Some(session) if self.is_connected() => session,
            _ => {
                tracing::warn!(message = ?message, "Not connected, dropping outbound message");
                return false;
            }
        };

        let text = match serde_json::to_string(message) {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize message");
                return false;
            }
        };

        session.outbound.send(Frame::Text(text)).is_ok()
    }
}

impl LiveSeriesClient {
    /// Create a client for the configured endpoint using the WebSocket transport
    pub fn new(config: &ClientConfig) -> ClientResult<Self> {
        Self::with_connector(config, Arc::new(WsConnector))
    }

    /// Create a client over a custom transport
    pub fn with_connector(config: &ClientConfig, connector: Arc<dyn Connector>) -> ClientResult<Self> {
        let endpoint = config.endpoint()?;

        let core = Core {
            phase: ConnectionPhase::Disconnected,
            state: ConnectionState::default(),
            subscriptions: SubscriptionRegistry::new(),
            should_auto_reconnect: true,
            backoff: Backoff::new(config.reconnect.clone()),
            session: None,
            reconnect_task: None,
            epoch: 0,
        };

        Ok(Self {
            inner: Arc::new(Inner {
                endpoint,
                health_interval: config.health_interval(),
                connector,
                listeners: ListenerRegistry::new(),
                core: Mutex::new(core),
                connect_gate: tokio::sync::Mutex::new(()),
            }),
        })
    }

    /// WebSocket URL this client connects to
    pub fn endpoint(&self) -> &Url {
        &self.inner.endpoint
    }

    /// Open the connection, or confirm it is already open
    ///
    /// Re-enables auto-reconnect. From `Disconnected` the attempt counter is
    /// reset; while reconnecting the pending retry stays scheduled until an
    /// attempt succeeds. Fails only if the socket errors before it opens;
    /// later drops are handled in the background and reported through events.
    pub async fn connect(&self) -> ClientResult<()> {
        {
            let mut core = self.inner.core.lock();
            core.should_auto_reconnect = true;
            if core.phase == ConnectionPhase::Disconnected {
                core.backoff.reset();
            }
        }
        self.inner.open(Attempt::Caller).await
    }

    /// Close the connection and disable auto-reconnect
    ///
    /// Subscriptions and listeners are kept, so a later `connect()` resumes
    /// every group.
    pub fn disconnect(&self) {
        self.inner.disconnect();
    }

    /// Declare interest in a group of series
    ///
    /// Merges into any stored subscription for the group. Sends the full
    /// resulting series list when connected and something changed; does
    /// nothing at all when nothing changed.
    pub fn subscribe(&self, config: SubscriptionConfig) {
        let mut core = self.inner.core.lock();
        let group_id = config.group_id.clone();

        let Some(current) = core.subscriptions.upsert(config) else {
            tracing::trace!(group_id = %group_id, "Subscription unchanged");
            return;
        };

        if core.is_connected() {
            tracing::debug!(
                group_id = %group_id,
                series = current.series.len(),
                "Subscribing"
            );
            core.send(&current.to_subscribe());
        } else {
            tracing::debug!(group_id = %group_id, "Not connected, subscription sent after hello");
        }
    }

    /// Drop a whole group
    pub fn unsubscribe(&self, group_id: &str) {
        let mut core = self.inner.core.lock();
        let Some(removed) = core.subscriptions.remove_group(group_id) else {
            return;
        };

        tracing::debug!(group_id = %group_id, "Unsubscribing group");
        core.send(&ClientMessage::Unsubscribe {
            group_id: group_id.to_string(),
            series: removed.series_list(),
        });
    }

    /// Drop some series from a group; the group goes away once it is empty
    pub fn unsubscribe_series<S: AsRef<str>>(&self, group_id: &str, series: &[S]) {
        let mut core = self.inner.core.lock();
        let Some(removal) = core.subscriptions.remove_series(group_id, series) else {
            return;
        };
        if removal.removed.is_empty() {
            return;
        }

        tracing::debug!(
            group_id = %group_id,
            series = ?removal.removed,
            group_dropped = removal.group_dropped,
            "Unsubscribing series"
        );
        core.send(&ClientMessage::Unsubscribe {
            group_id: group_id.to_string(),
            series: removal.removed,
        });
    }

    /// Register a listener for an event name or composite key
    pub fn on<F>(&self, event: impl Into<String>, listener: F) -> ListenerId
    where
        F: Fn(&LiveEvent) + Send + Sync + 'static,
    {
        self.inner.listeners.on(event, listener)
    }

    /// Remove one registration
    pub fn off(&self, event: &str, id: ListenerId) -> bool {
        self.inner.listeners.off(event, id)
    }

    /// Listen for acks of one group
    pub fn on_ack<F>(&self, group_id: &str, listener: F) -> ListenerId
    where
        F: Fn(&LiveEvent) + Send + Sync + 'static,
    {
        self.on(key::ack(group_id), listener)
    }

    /// Listen for backfill of one group
    pub fn on_init<F>(&self, group_id: &str, listener: F) -> ListenerId
    where
        F: Fn(&LiveEvent) + Send + Sync + 'static,
    {
        self.on(key::init(group_id), listener)
    }

    /// Listen for new points of one series
    pub fn on_append<F>(&self, series_key: &str, listener: F) -> ListenerId
    where
        F: Fn(&LiveEvent) + Send + Sync + 'static,
    {
        self.on(key::append(series_key), listener)
    }

    /// Socket open and the open handler has run
    pub fn is_connected(&self) -> bool {
        self.inner.core.lock().is_connected()
    }

    /// Snapshot of connection health
    pub fn connection_state(&self) -> ConnectionState {
        self.inner.core.lock().state.clone()
    }

    pub fn phase(&self) -> ConnectionPhase {
        self.inner.core.lock().phase
    }

    /// Snapshot of every stored subscription, in registration order
    pub fn subscriptions(&self) -> Vec<SubscriptionConfig> {
        self.inner.core.lock().subscriptions.iter().cloned().collect()
    }

    pub fn subscription(&self, group_id: &str) -> Option<SubscriptionConfig> {
        self.inner.core.lock().subscriptions.get(group_id).cloned()
    }

    /// Process one inbound text frame
    ///
    /// Called by the socket reader; exposed for replaying captured traffic.
    pub fn handle_message(&self, text: &str) {
        self.inner.handle_message(text);
    }
}

impl std::fmt::Debug for LiveSeriesClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let core = self.inner.core.lock();
        f.debug_struct("LiveSeriesClient")
            .field("endpoint", &self.inner.endpoint.as_str())
            .field("phase", &core.phase)
            .field("subscriptions", &core.subscriptions.len())
            .finish()
    }
}

impl Inner {
    async fn open(self: &Arc<Self>, attempt: Attempt) -> ClientResult<()> {
        let _gate = self.connect_gate.lock().await;

        let epoch = {
            let mut core = self.core.lock();
            if core.is_connected() {
                return Ok(());
            }
            if attempt == Attempt::Reconnect && !core.should_auto_reconnect {
                return Err(ClientError::Aborted);
            }
            core.phase = ConnectionPhase::Connecting;
            core.epoch
        };

        tracing::info!(endpoint = %self.endpoint, attempt = ?attempt, "Connecting to live series stream");

        match self.connector.connect(&self.endpoint).await {
            Ok(connection) => self.on_open(connection, epoch),
            Err(e) => {
                let message = e.to_string();
                tracing::warn!(endpoint = %self.endpoint, error = %message, "Connection failed");

                let retry = {
                    let mut core = self.core.lock();
                    core.state.connected = false;
                    core.state.last_error = Some(message.clone());
                    // A caller attempt made while reconnecting leaves the pending retry in place
                    core.phase = if core.reconnect_task.is_some() {
                        ConnectionPhase::Reconnecting
                    } else {
                        ConnectionPhase::Disconnected
                    };
                    attempt == Attempt::Reconnect && core.epoch == epoch && core.should_auto_reconnect
                };

                self.listeners
                    .emit(key::ERROR, &LiveEvent::Error(StreamError::transport(message)));

                if retry {
                    self.schedule_reconnect();
                }
                Err(e.into())
            }
        }
    }

    fn on_open(self: &Arc<Self>, connection: Connection, epoch: u64) -> ClientResult<()> {
        let Connection { sink, stream } = connection;
        let mut core = self.core.lock();

        if core.epoch != epoch {
            drop(core);
            tracing::debug!("Disconnect raced the handshake, closing new socket");
            tokio::spawn(close_sink(sink));
            return Err(ClientError::Aborted);
        }

        let connection_id = Uuid::new_v4().to_string();
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (start_tx, start_rx) = oneshot::channel();

        tokio::spawn(write_loop(sink, outbound_rx, connection_id.clone()));
        let reader = tokio::spawn(Arc::clone(self).read_loop(stream, connection_id.clone(), start_rx));
        let health = self
            .health_interval
            .map(|period| tokio::spawn(Arc::clone(self).health_loop(connection_id.clone(), period)));

        core.session = Some(Session {
            id: connection_id.clone(),
            outbound,
            reader,
            health,
        });
        if let Some(task) = core.reconnect_task.take() {
            task.abort();
        }
        core.state.connected = true;
        core.state.last_error = None;
        core.backoff.reset();
        core.phase = ConnectionPhase::Connected;
        drop(core);

        tracing::info!(connection_id = %connection_id, "Live series stream connected");
        self.listeners.emit(key::CONNECT, &LiveEvent::Connect);

        // Frames are only dispatched once `connect` listeners have run
        let _ = start_tx.send(());
        Ok(())
    }

    fn disconnect(&self) {
        let mut core = self.core.lock();
        core.should_auto_reconnect = false;
        core.epoch += 1;

        if let Some(task) = core.reconnect_task.take() {
            task.abort();
        }

        if let Some(session) = core.session.take() {
            let _ = session.outbound.send(Frame::close_normal("client disconnect"));
            tracing::info!(connection_id = %session.id, "Disconnecting live series stream");
            session.stop();
        }

        core.state.connected = false;
        core.phase = ConnectionPhase::Disconnected;
    }

    fn on_close(self: &Arc<Self>, connection_id: &str, reason: String) {
        let mut core = self.core.lock();

        if core.session.as_ref().map(|s| s.id.as_str()) != Some(connection_id) {
            return;
        }
        if let Some(session) = core.session.take() {
            session.stop();
        }
        core.state.connected = false;

        tracing::warn!(connection_id = %connection_id, reason = %reason, "Live series stream closed");

        if !core.should_auto_reconnect {
            core.phase = ConnectionPhase::Disconnected;
            return;
        }
        drop(core);

        self.schedule_reconnect();
    }

    /// The single place the attempt counter advances
    fn schedule_reconnect(self: &Arc<Self>) {
        let mut core = self.core.lock();
        if !core.should_auto_reconnect {
            core.phase = ConnectionPhase::Disconnected;
            return;
        }

        match core.backoff.next_delay() {
            Some(delay) => {
                core.phase = ConnectionPhase::Reconnecting;
                tracing::info!(
                    attempt = core.backoff.attempts(),
                    delay_ms = delay.as_millis() as u64,
                    "Scheduling reconnect"
                );

                let inner = Arc::clone(self);
                let task = tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    inner.reconnect().await;
                });
                if let Some(previous) = core.reconnect_task.replace(task) {
                    previous.abort();
                }
            }
            None => {
                let max_attempts = core.backoff.policy().max_attempts;
                let reason = format!("Gave up after {} reconnect attempts", max_attempts);
                core.phase = ConnectionPhase::Disconnected;
                core.state.last_error = Some(reason.clone());
                drop(core);

                tracing::error!(max_attempts, "Maximum reconnect attempts reached");
                self.listeners
                    .emit(key::DISCONNECT, &LiveEvent::Disconnect { reason });
            }
        }
    }

    async fn reconnect(self: Arc<Self>) {
        {
            let mut core = self.core.lock();
            core.reconnect_task = None;
            if !core.should_auto_reconnect {
                return;
            }
        }

        if let Err(e) = self.open(Attempt::Reconnect).await {
            tracing::debug!(error = %e, "Reconnect attempt failed");
        }
    }

    async fn read_loop(
        self: Arc<Self>,
        mut stream: FrameStream,
        connection_id: String,
        start: oneshot::Receiver<()>,
    ) {
        let _ = start.await;

        let reason = loop {
            match stream.next().await {
                Some(Ok(Frame::Text(text))) => self.handle_message(&text),
                Some(Ok(Frame::Pong(payload))) => self.record_pong(&payload),
                Some(Ok(Frame::Ping(_))) => {
                    // answered by the transport
                }
                Some(Ok(Frame::Binary(data))) => {
                    tracing::debug!(bytes = data.len(), "Ignoring binary frame");
                }
                Some(Ok(Frame::Close { code, reason })) => {
                    break format!("closed by server (code {}): {}", code, reason);
                }
                Some(Err(e)) => break e.to_string(),
                None => break "stream ended".to_string(),
            }
        };

        self.on_close(&connection_id, reason);
    }

    async fn health_loop(self: Arc<Self>, connection_id: String, period: Duration) {
        let start = tokio::time::Instant::now() + period;
        let mut ticker = tokio::time::interval_at(start, period);

        loop {
            ticker.tick().await;

            let core = self.core.lock();
            let session = match &core.session {
                Some(session) if session.id == connection_id && core.state.connected => session,
                _ => break,
            };

            let payload = Utc::now().timestamp_millis().to_be_bytes().to_vec();
            if session.outbound.send(Frame::Ping(payload)).is_err() {
                break;
            }
        }
    }

    fn record_pong(&self, payload: &[u8]) {
        let Ok(bytes) = <[u8; 8]>::try_from(payload) else {
            return;
        };
        let sent = i64::from_be_bytes(bytes);
        let latency = Utc::now().timestamp_millis().saturating_sub(sent).max(0) as u64;

        self.core.lock().state.latency = latency;
        tracing::trace!(latency_ms = latency, "Health probe answered");
    }

    fn handle_message(&self, text: &str) {
        let value: Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(error = %e, "Dropping malformed frame");
                return;
            }
        };

        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let message = match serde_json::from_value::<ServerMessage>(value) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(kind = %kind, error = %e, "Dropping frame with unexpected shape");
                return;
            }
        };

        match message {
            ServerMessage::Hello {
                capabilities,
                limits,
            } => self.on_hello(capabilities, limits),
            ServerMessage::Ack {
                group_id,
                accepted,
                rejected,
            } => {
                for rejection in &rejected {
                    tracing::warn!(
                        group_id = %group_id,
                        key = %rejection.key,
                        reason = %rejection.reason,
                        "Series rejected by server"
                    );
                }

                let group_key = key::ack(&group_id);
                let event = LiveEvent::Ack {
                    group_id,
                    accepted,
                    rejected,
                };
                self.listeners.emit(key::ACK, &event);
                self.listeners.emit(&group_key, &event);
            }
            ServerMessage::Init { group_id, data } => {
                tracing::debug!(group_id = %group_id, series = data.series.len(), "Backfill received");

                let group_key = key::init(&group_id);
                let event = LiveEvent::Init { group_id, data };
                self.listeners.emit(key::INIT, &event);
                self.listeners.emit(&group_key, &event);
            }
            ServerMessage::Append { key: series_key, point } => {
                let series_event_key = key::append(&series_key);
                let event = LiveEvent::Append {
                    key: series_key,
                    point,
                };
                self.listeners.emit(key::APPEND, &event);
                self.listeners.emit(&series_event_key, &event);
            }
            ServerMessage::Error { error } => {
                tracing::warn!(error = %error, "Server reported an error");
                self.core.lock().state.last_error = Some(error.clone());
                self.listeners
                    .emit(key::ERROR, &LiveEvent::Error(StreamError::server(error)));
            }
            ServerMessage::Unknown => {
                tracing::warn!(kind = %kind, "Ignoring unknown message type");
            }
        }
    }

    fn on_hello(&self, capabilities: HashMap<String, bool>, limits: Option<Limits>) {
        let mut core = self.core.lock();
        core.state.capabilities = Some(capabilities.clone());
        core.state.limits = limits;

        let replay: Vec<ClientMessage> = core.subscriptions.iter().map(|s| s.to_subscribe()).collect();
        let sent = replay.iter().filter(|message| core.send(message)).count();
        drop(core);

        tracing::info!(groups = sent, "Hello received, subscriptions replayed");
        self.listeners
            .emit(key::HELLO, &LiveEvent::Hello { capabilities, limits });
    }
}

async fn write_loop(mut sink: FrameSink, mut outbound: mpsc::UnboundedReceiver<Frame>, connection_id: String) {
    while let Some(frame) = outbound.recv().await {
        let closing = matches!(frame, Frame::Close { .. });

        if let Err(e) = sink.send(frame).await {
            tracing::debug!(
                connection_id = %connection_id,
                error = %e,
                "WebSocket send failed, closing writer"
            );
            break;
        }
        if closing {
            let _ = sink.close().await;
            break;
        }
    }
}

async fn close_sink(mut sink: FrameSink) {
    let _ = sink.send(Frame::close_normal("client disconnect")).await;
    let _ = sink.close().await;
}
