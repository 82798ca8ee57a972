//! Consumer adapters: the per-screen binding layer. Each adapter owns its
//! local view of one topic, applies that topic's merge rule on every push,
//! and cleans up exactly the subscription it registered when dropped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::conn::{Callback, ClientConfig, ConnState, ConnectionManager, ListenerToken};
use crate::registry::{ChannelRegistry, SubscriptionHandle};
use crate::store::{
    AlertStore, DeploymentStore, Latest, LogStore, ALERT_CAP, DEPLOYMENT_CAP, LOG_CAP,
};
use crate::types::{Alert, Deployment, LogEntry, MetricSnapshot, SystemStatus};
use crate::wire::{self, Frame};

/// The shared connection + registry bundle. Created once per session and
/// handed to adapters explicitly; there is no process-wide global.
pub struct RealtimeService {
    conn: Arc<ConnectionManager>,
    registry: Arc<ChannelRegistry>,
}

impl RealtimeService {
    pub fn new(config: ClientConfig) -> Arc<Self> {
        let conn = Arc::new(ConnectionManager::new(config));
        let registry = ChannelRegistry::new(conn.clone());
        Arc::new(Self { conn, registry })
    }

    /// Idempotent; see [`ConnectionManager::connect`].
    pub fn connect(&self) {
        self.conn.connect();
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_connected()
    }

    pub fn state(&self) -> ConnState {
        self.conn.state()
    }

    pub fn connection(&self) -> &Arc<ConnectionManager> {
        &self.conn
    }

    pub fn registry(&self) -> &Arc<ChannelRegistry> {
        &self.registry
    }

    /// Fire-and-forget upstream acknowledgment; no response correlation.
    pub fn acknowledge_alert(&self, alert_id: &str) {
        self.conn.emit(Frame::acknowledge_alert(alert_id));
    }
}

/// Where an adapter sits in its lifecycle. `Connected` and `Disconnected`
/// alternate for as long as the adapter lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterPhase {
    /// No subscription held (missing scope id, or detached).
    Idle,
    Connecting,
    Connected,
    Disconnected,
}

struct LinkInner {
    connected: AtomicBool,
    last_error: Mutex<Option<String>>,
}

/// Per-adapter view of connection health, fed by the lifecycle events.
struct Link {
    service: Arc<RealtimeService>,
    inner: Arc<LinkInner>,
    tokens: Vec<ListenerToken>,
}

impl Link {
    fn attach(service: &Arc<RealtimeService>) -> Self {
        service.connect();
        let inner = Arc::new(LinkInner {
            connected: AtomicBool::new(service.is_connected()),
            last_error: Mutex::new(None),
        });

        let conn = service.connection();
        let up = inner.clone();
        let established = conn.on(
            wire::CONNECTION_ESTABLISHED,
            Arc::new(move |_| up.connected.store(true, Ordering::SeqCst)),
        );
        let down = inner.clone();
        let lost = conn.on(
            wire::CONNECTION_LOST,
            Arc::new(move |_| down.connected.store(false, Ordering::SeqCst)),
        );
        let err = inner.clone();
        let errored = conn.on(
            wire::SOCKET_ERROR,
            Arc::new(move |payload| {
                let message = payload
                    .get("message")
                    .and_then(|m| m.as_str())
                    .unwrap_or("socket error")
                    .to_string();
                *err.last_error.lock().unwrap() = Some(message);
            }),
        );

        Self {
            service: service.clone(),
            inner,
            tokens: vec![established, lost, errored],
        }
    }

    fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    fn last_error(&self) -> Option<String> {
        self.inner.last_error.lock().unwrap().clone()
    }

    fn release(&mut self) {
        for token in self.tokens.drain(..) {
            self.service.connection().off(&token);
        }
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        self.release();
    }
}

fn phase(service: &RealtimeService, active: bool) -> AdapterPhase {
    if !active {
        return AdapterPhase::Idle;
    }
    match service.state() {
        ConnState::Connecting => AdapterPhase::Connecting,
        ConnState::Connected => AdapterPhase::Connected,
        ConnState::Disconnected | ConnState::Errored => AdapterPhase::Disconnected,
    }
}

// Successful data delivery clears any stale socket error, mirroring how
// the dashboard resets its error banner on fresh data.
fn clear_error(link: &Arc<LinkInner>) {
    *link.last_error.lock().unwrap() = None;
}

/// Latest metric snapshot for one project. An empty `project_id` leaves
/// the adapter idle: nothing is subscribed until a project is selected.
pub struct MetricsAdapter {
    service: Arc<RealtimeService>,
    latest: Arc<Mutex<Latest<MetricSnapshot>>>,
    handle: Option<SubscriptionHandle>,
    link: Link,
}

impl MetricsAdapter {
    pub fn new(service: &Arc<RealtimeService>, project_id: &str) -> Self {
        let link = Link::attach(service);
        let latest = Arc::new(Mutex::new(Latest::new()));

        let state = latest.clone();
        let health = link.inner.clone();
        let callback: Callback = Arc::new(move |payload| {
            state.lock().unwrap().replace(payload.clone());
            clear_error(&health);
        });
        let handle = service.registry().subscribe_metrics(project_id, callback);

        Self {
            service: service.clone(),
            latest,
            handle,
            link,
        }
    }

    pub fn latest(&self) -> Option<MetricSnapshot> {
        self.latest.lock().unwrap().get()
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_connected()
    }

    pub fn last_error(&self) -> Option<String> {
        self.link.last_error()
    }

    pub fn phase(&self) -> AdapterPhase {
        phase(&self.service, self.handle.is_some())
    }

    pub fn detach(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.service.registry().unsubscribe(&handle);
        }
        self.link.release();
    }
}

impl Drop for MetricsAdapter {
    fn drop(&mut self) {
        self.detach();
    }
}

/// Newest-first log ring for one deployment, capped at 1000 entries.
pub struct LogsAdapter {
    service: Arc<RealtimeService>,
    store: Arc<Mutex<LogStore>>,
    handle: Option<SubscriptionHandle>,
    link: Link,
}

impl LogsAdapter {
    pub fn new(service: &Arc<RealtimeService>, deployment_id: &str) -> Self {
        let link = Link::attach(service);
        let store = Arc::new(Mutex::new(LogStore::new(LOG_CAP)));

        let state = store.clone();
        let health = link.inner.clone();
        let callback: Callback = Arc::new(move |payload| {
            match serde_json::from_value::<LogEntry>(payload.clone()) {
                Ok(entry) => {
                    state.lock().unwrap().push(entry);
                    clear_error(&health);
                }
                Err(e) => tracing::debug!(error = %e, "ignoring malformed log entry"),
            }
        });
        let handle = service.registry().subscribe_logs(deployment_id, callback);

        Self {
            service: service.clone(),
            store,
            handle,
            link,
        }
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.store.lock().unwrap().entries()
    }

    /// Empty the local ring without touching the subscription.
    pub fn clear(&self) {
        self.store.lock().unwrap().clear();
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_connected()
    }

    pub fn last_error(&self) -> Option<String> {
        self.link.last_error()
    }

    pub fn phase(&self) -> AdapterPhase {
        phase(&self.service, self.handle.is_some())
    }

    pub fn detach(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.service.registry().unsubscribe(&handle);
        }
        self.link.release();
    }
}

impl Drop for LogsAdapter {
    fn drop(&mut self) {
        self.detach();
    }
}

/// Global alert feed, capped at 100, with optimistic acknowledgment.
pub struct AlertsAdapter {
    service: Arc<RealtimeService>,
    store: Arc<Mutex<AlertStore>>,
    handle: Option<SubscriptionHandle>,
    link: Link,
}

impl AlertsAdapter {
    pub fn new(service: &Arc<RealtimeService>) -> Self {
        let link = Link::attach(service);
        let store = Arc::new(Mutex::new(AlertStore::new(ALERT_CAP)));

        let state = store.clone();
        let health = link.inner.clone();
        let callback: Callback = Arc::new(move |payload| {
            match serde_json::from_value::<Alert>(payload.clone()) {
                Ok(alert) => {
                    state.lock().unwrap().push(alert);
                    clear_error(&health);
                }
                Err(e) => tracing::debug!(error = %e, "ignoring malformed alert"),
            }
        });
        let handle = Some(service.registry().subscribe_alerts(callback));

        Self {
            service: service.clone(),
            store,
            handle,
            link,
        }
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.store.lock().unwrap().entries()
    }

    /// Remove the alert locally right away and tell the backend. There is
    /// no rollback path: if the upstream ack is lost, the backend still
    /// holds the alert and its next push re-inserts it here.
    pub fn acknowledge(&self, alert_id: &str) {
        self.store.lock().unwrap().acknowledge(alert_id);
        self.service.acknowledge_alert(alert_id);
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_connected()
    }

    pub fn last_error(&self) -> Option<String> {
        self.link.last_error()
    }

    pub fn phase(&self) -> AdapterPhase {
        phase(&self.service, self.handle.is_some())
    }

    pub fn detach(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.service.registry().unsubscribe(&handle);
        }
        self.link.release();
    }
}

impl Drop for AlertsAdapter {
    fn drop(&mut self) {
        self.detach();
    }
}

/// Global deployment list, upserted by id, capped at the 50 most recent.
pub struct DeploymentsAdapter {
    service: Arc<RealtimeService>,
    store: Arc<Mutex<DeploymentStore>>,
    handle: Option<SubscriptionHandle>,
    link: Link,
}

impl DeploymentsAdapter {
    pub fn new(service: &Arc<RealtimeService>) -> Self {
        let link = Link::attach(service);
        let store = Arc::new(Mutex::new(DeploymentStore::new(DEPLOYMENT_CAP)));

        let state = store.clone();
        let health = link.inner.clone();
        let callback: Callback = Arc::new(move |payload| {
            match serde_json::from_value::<Deployment>(payload.clone()) {
                Ok(record) => {
                    state.lock().unwrap().upsert(record);
                    clear_error(&health);
                }
                Err(e) => tracing::debug!(error = %e, "ignoring malformed deployment"),
            }
        });
        let handle = Some(service.registry().subscribe_deployments(callback));

        Self {
            service: service.clone(),
            store,
            handle,
            link,
        }
    }

    pub fn deployments(&self) -> Vec<Deployment> {
        self.store.lock().unwrap().records()
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_connected()
    }

    pub fn last_error(&self) -> Option<String> {
        self.link.last_error()
    }

    pub fn phase(&self) -> AdapterPhase {
        phase(&self.service, self.handle.is_some())
    }

    pub fn detach(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.service.registry().unsubscribe(&handle);
        }
        self.link.release();
    }
}

impl Drop for DeploymentsAdapter {
    fn drop(&mut self) {
        self.detach();
    }
}

/// Latest platform-health snapshot.
pub struct SystemStatusAdapter {
    service: Arc<RealtimeService>,
    latest: Arc<Mutex<Latest<SystemStatus>>>,
    handle: Option<SubscriptionHandle>,
    link: Link,
}

impl SystemStatusAdapter {
    pub fn new(service: &Arc<RealtimeService>) -> Self {
        let link = Link::attach(service);
        let latest = Arc::new(Mutex::new(Latest::new()));

        let state = latest.clone();
        let health = link.inner.clone();
        let callback: Callback = Arc::new(move |payload| {
            match serde_json::from_value::<SystemStatus>(payload.clone()) {
                Ok(status) => {
                    state.lock().unwrap().replace(status);
                    clear_error(&health);
                }
                Err(e) => tracing::debug!(error = %e, "ignoring malformed status"),
            }
        });
        let handle = Some(service.registry().subscribe_system_status(callback));

        Self {
            service: service.clone(),
            latest,
            handle,
            link,
        }
    }

    pub fn status(&self) -> Option<SystemStatus> {
        self.latest.lock().unwrap().get()
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_connected()
    }

    pub fn last_error(&self) -> Option<String> {
        self.link.last_error()
    }

    pub fn phase(&self) -> AdapterPhase {
        phase(&self.service, self.handle.is_some())
    }

    pub fn detach(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.service.registry().unsubscribe(&handle);
        }
        self.link.release();
    }
}

impl Drop for SystemStatusAdapter {
    fn drop(&mut self) {
        self.detach();
    }
}
