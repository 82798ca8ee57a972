//! Connection manager: owns the one WebSocket to the backend, reconnects
//! with backoff, and fans incoming frames out over a named event bus.
//!
//! All dispatch happens on the driver task, so listeners observe whole
//! frames in transport order and never a partially-applied update.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use crate::error::RealtimeError;
use crate::wire::{self, Frame, Topic};

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Listener callback, invoked with a borrowed payload on the driver task.
pub type Callback = Arc<dyn Fn(&Value) + Send + Sync>;

/// Supplies the currently-active topic set for replay after a reconnect.
pub type ReplaySource = Arc<dyn Fn() -> Vec<Topic> + Send + Sync>;

/// Retry pacing after a dropped or failed connection. The delay doubles
/// from `initial` up to `max` and resets after a successful connect.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    pub initial: Duration,
    pub max: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(250),
            max: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub url: String,
    pub reconnect: ReconnectPolicy,
}

impl ClientConfig {
    pub fn new(url: impl Into<String>) -> Result<Self, RealtimeError> {
        let url = url.into();
        let parsed =
            url::Url::parse(&url).map_err(|_| RealtimeError::InvalidUrl(url.clone()))?;
        if parsed.scheme() != "ws" && parsed.scheme() != "wss" {
            return Err(RealtimeError::InvalidUrl(url));
        }
        Ok(Self {
            url,
            reconnect: ReconnectPolicy::default(),
        })
    }
}

/// Connection lifecycle, queryable synchronously at any time. `Connected`
/// and `Disconnected` are not terminal; they alternate across reconnects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Disconnected,
    Connecting,
    Connected,
    Errored,
}

/// Removal token for a listener registered with [`ConnectionManager::on`].
/// Passing it to [`ConnectionManager::off`] removes exactly that listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerToken {
    event: String,
    id: u64,
}

struct BusInner {
    next_id: u64,
    handlers: HashMap<String, Vec<(u64, Callback)>>,
}

/// Ordered callback registry keyed by event name. Dispatch snapshots the
/// listener list outside the lock so callbacks may re-enter on/off.
struct EventBus {
    inner: Mutex<BusInner>,
}

impl EventBus {
    fn new() -> Self {
        Self {
            inner: Mutex::new(BusInner {
                next_id: 0,
                handlers: HashMap::new(),
            }),
        }
    }

    fn on(&self, event: &str, callback: Callback) -> ListenerToken {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.next_id;
        inner.next_id += 1;
        inner
            .handlers
            .entry(event.to_string())
            .or_default()
            .push((id, callback));
        ListenerToken {
            event: event.to_string(),
            id,
        }
    }

    // Unknown tokens are a no-op.
    fn off(&self, token: &ListenerToken) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(list) = inner.handlers.get_mut(&token.event) {
            list.retain(|(id, _)| *id != token.id);
            if list.is_empty() {
                inner.handlers.remove(&token.event);
            }
        }
    }

    fn dispatch(&self, event: &str, payload: &Value) {
        let callbacks: Vec<Callback> = {
            let inner = self.inner.lock().unwrap();
            match inner.handlers.get(event) {
                Some(list) => list.iter().map(|(_, cb)| cb.clone()).collect(),
                None => return,
            }
        };
        for cb in callbacks {
            cb(payload);
        }
    }
}

struct ConnShared {
    config: ClientConfig,
    state: Mutex<ConnState>,
    connected: AtomicBool,
    started: AtomicBool,
    bus: EventBus,
    outbox: Mutex<Option<mpsc::UnboundedSender<Frame>>>,
    replay: Mutex<Option<ReplaySource>>,
}

impl ConnShared {
    fn set_state(&self, next: ConnState) {
        *self.state.lock().unwrap() = next;
    }
}

/// Owns the single transport connection shared by every subscription.
pub struct ConnectionManager {
    shared: Arc<ConnShared>,
}

impl ConnectionManager {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            shared: Arc::new(ConnShared {
                config,
                state: Mutex::new(ConnState::Disconnected),
                connected: AtomicBool::new(false),
                started: AtomicBool::new(false),
                bus: EventBus::new(),
                outbox: Mutex::new(None),
                replay: Mutex::new(None),
            }),
        }
    }

    /// Idempotent: the first call spawns the driver task, later calls are
    /// no-ops. Must be called from within a tokio runtime.
    pub fn connect(&self) {
        if self.shared.started.swap(true, Ordering::SeqCst) {
            return;
        }
        let shared = self.shared.clone();
        tokio::spawn(async move {
            drive(shared).await;
        });
    }

    pub fn state(&self) -> ConnState {
        *self.shared.state.lock().unwrap()
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    /// Register a listener for a lifecycle event or a topic push event.
    pub fn on(&self, event: &str, callback: Callback) -> ListenerToken {
        self.shared.bus.on(event, callback)
    }

    /// Remove exactly the listener behind `token`; unknown tokens are a
    /// no-op and other listeners for the same event are untouched.
    pub fn off(&self, token: &ListenerToken) {
        self.shared.bus.off(token);
    }

    /// Send a frame upstream, fire-and-forget. Dropped silently while
    /// disconnected; the replay source restores subscriptions on connect.
    pub fn emit(&self, frame: Frame) {
        let outbox = self.shared.outbox.lock().unwrap();
        match outbox.as_ref() {
            Some(tx) => {
                let _ = tx.send(frame);
            }
            None => tracing::trace!(event = %frame.event, "not connected, dropping frame"),
        }
    }

    /// Install the closure the driver calls on every (re)connect to learn
    /// which topics to re-subscribe. The registry owns the topic set.
    pub fn set_replay_source(&self, source: ReplaySource) {
        *self.shared.replay.lock().unwrap() = Some(source);
    }

    /// Dispatch a push event as if it had arrived on the transport.
    #[cfg(test)]
    pub(crate) fn deliver(&self, event: &str, payload: &Value) {
        self.shared.bus.dispatch(event, payload);
    }

    /// Capture upstream frames without a live transport.
    #[cfg(test)]
    pub(crate) fn install_test_outbox(&self) -> mpsc::UnboundedReceiver<Frame> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.shared.outbox.lock().unwrap() = Some(tx);
        rx
    }
}

async fn drive(shared: Arc<ConnShared>) {
    let mut delay = shared.config.reconnect.initial;
    loop {
        shared.set_state(ConnState::Connecting);
        match connect_async(shared.config.url.as_str()).await {
            Ok((ws, _)) => {
                delay = shared.config.reconnect.initial;
                session(&shared, ws).await;
            }
            Err(e) => {
                tracing::debug!(url = %shared.config.url, error = %e, "connect failed");
                shared.set_state(ConnState::Errored);
                shared
                    .bus
                    .dispatch(wire::SOCKET_ERROR, &json!({ "message": e.to_string() }));
            }
        }
        tokio::time::sleep(delay).await;
        delay = (delay * 2).min(shared.config.reconnect.max);
    }
}

/// One connected session: replay subscriptions, then pump commands out and
/// push events in until the transport drops.
async fn session(shared: &Arc<ConnShared>, ws: WsStream) {
    let (mut sink, mut stream) = ws.split();

    // Outbox goes live before the replay snapshot: a topic registered in
    // between is either in the snapshot or queued, never lost. The agent
    // side tolerates the rare duplicate subscribe this allows.
    let (tx, mut rx) = mpsc::unbounded_channel::<Frame>();
    *shared.outbox.lock().unwrap() = Some(tx);

    // Re-establish the active topic set before consumers hear about the
    // (re)connect, so no push event can slip past an unsubscribed topic.
    let topics = {
        let replay = shared.replay.lock().unwrap();
        replay.as_ref().map(|f| f()).unwrap_or_default()
    };
    for topic in topics {
        let frame = Frame::subscribe(&topic);
        match frame.encode() {
            Ok(text) => {
                if sink.send(Message::Text(text)).await.is_err() {
                    shared.outbox.lock().unwrap().take();
                    shared.set_state(ConnState::Disconnected);
                    shared.bus.dispatch(wire::CONNECTION_LOST, &Value::Null);
                    return;
                }
            }
            Err(e) => tracing::debug!(error = %e, "skipping unencodable subscribe"),
        }
    }

    shared.connected.store(true, Ordering::SeqCst);
    shared.set_state(ConnState::Connected);
    shared
        .bus
        .dispatch(wire::CONNECTION_ESTABLISHED, &Value::Null);

    loop {
        tokio::select! {
            cmd = rx.recv() => match cmd {
                Some(frame) => {
                    let text = match frame.encode() {
                        Ok(t) => t,
                        Err(e) => {
                            tracing::debug!(error = %e, "skipping unencodable frame");
                            continue;
                        }
                    };
                    if sink.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => match Frame::decode(&text) {
                    Ok(frame) => shared.bus.dispatch(&frame.event, &frame.payload),
                    Err(e) => tracing::debug!(error = %e, "ignoring malformed frame"),
                },
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {} // ping/pong/binary: nothing to do
                Some(Err(e)) => {
                    shared
                        .bus
                        .dispatch(wire::SOCKET_ERROR, &json!({ "message": e.to_string() }));
                    break;
                }
            },
        }
    }

    shared.outbox.lock().unwrap().take();
    shared.connected.store(false, Ordering::SeqCst);
    shared.set_state(ConnState::Disconnected);
    shared.bus.dispatch(wire::CONNECTION_LOST, &Value::Null);
}
