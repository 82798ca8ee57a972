//! Channel registry: multiplexes many keyed subscriptions over the one
//! connection. The transport learns about a topic exactly once, however
//! many listeners attach to it, and is told to drop it when the last
//! listener leaves.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use crate::conn::{Callback, ConnectionManager, ListenerToken};
use crate::wire::{Frame, Topic};

/// Returned by every subscribe call; passing it back to
/// [`ChannelRegistry::unsubscribe`] removes exactly that listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionHandle {
    topic: Topic,
    id: u64,
}

impl SubscriptionHandle {
    pub fn topic(&self) -> &Topic {
        &self.topic
    }
}

struct TopicEntry {
    token: ListenerToken,
    listeners: Vec<(u64, Callback)>,
}

struct RegistryInner {
    next_id: u64,
    topics: HashMap<Topic, TopicEntry>,
}

pub struct ChannelRegistry {
    conn: Arc<ConnectionManager>,
    inner: Arc<Mutex<RegistryInner>>,
}

impl ChannelRegistry {
    /// Builds the registry and installs it as the connection's replay
    /// source: the active topic set here is what gets re-subscribed after
    /// every reconnect.
    pub fn new(conn: Arc<ConnectionManager>) -> Arc<Self> {
        let inner = Arc::new(Mutex::new(RegistryInner {
            next_id: 0,
            topics: HashMap::new(),
        }));

        let replay_inner = inner.clone();
        conn.set_replay_source(Arc::new(move || {
            replay_inner.lock().unwrap().topics.keys().cloned().collect()
        }));

        Arc::new(Self { conn, inner })
    }

    pub fn subscribe_metrics(&self, project_id: &str, callback: Callback) -> Option<SubscriptionHandle> {
        if project_id.is_empty() {
            return None;
        }
        Some(self.subscribe(Topic::Metrics(project_id.to_string()), callback))
    }

    pub fn subscribe_logs(&self, deployment_id: &str, callback: Callback) -> Option<SubscriptionHandle> {
        if deployment_id.is_empty() {
            return None;
        }
        Some(self.subscribe(Topic::Logs(deployment_id.to_string()), callback))
    }

    pub fn subscribe_alerts(&self, callback: Callback) -> SubscriptionHandle {
        self.subscribe(Topic::Alerts, callback)
    }

    pub fn subscribe_deployments(&self, callback: Callback) -> SubscriptionHandle {
        self.subscribe(Topic::Deployments, callback)
    }

    pub fn subscribe_system_status(&self, callback: Callback) -> SubscriptionHandle {
        self.subscribe(Topic::SystemStatus, callback)
    }

    /// Register a listener for a topic. The first listener creates the
    /// topic and issues the one upstream subscribe; later listeners only
    /// join the fan-out list.
    pub fn subscribe(&self, topic: Topic, callback: Callback) -> SubscriptionHandle {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.next_id;
        inner.next_id += 1;

        match inner.topics.entry(topic.clone()) {
            Entry::Occupied(mut occupied) => {
                occupied.get_mut().listeners.push((id, callback));
            }
            Entry::Vacant(vacant) => {
                let token = self.conn.on(&topic.key(), self.fanout(topic.clone()));
                self.conn.emit(Frame::subscribe(&topic));
                tracing::debug!(topic = %topic, "topic activated");
                vacant.insert(TopicEntry {
                    token,
                    listeners: vec![(id, callback)],
                });
            }
        }

        SubscriptionHandle { topic, id }
    }

    /// Remove exactly the listener behind `handle`. Takes effect before
    /// returning; an unknown or already-removed handle is a no-op. The
    /// last listener's removal retires the topic upstream.
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) {
        let mut inner = self.inner.lock().unwrap();
        let Some(entry) = inner.topics.get_mut(&handle.topic) else {
            return;
        };
        entry.listeners.retain(|(id, _)| *id != handle.id);
        if entry.listeners.is_empty() {
            if let Some(entry) = inner.topics.remove(&handle.topic) {
                self.conn.off(&entry.token);
                self.conn.emit(Frame::unsubscribe(&handle.topic));
                tracing::debug!(topic = %handle.topic, "topic retired");
            }
        }
    }

    pub fn active_topics(&self) -> Vec<Topic> {
        self.inner.lock().unwrap().topics.keys().cloned().collect()
    }

    pub fn listener_count(&self, topic: &Topic) -> usize {
        self.inner
            .lock()
            .unwrap()
            .topics
            .get(topic)
            .map(|e| e.listeners.len())
            .unwrap_or(0)
    }

    // The single bus handler per topic: snapshot the listener list, then
    // invoke in registration order with the shared payload.
    fn fanout(&self, topic: Topic) -> Callback {
        let weak: Weak<Mutex<RegistryInner>> = Arc::downgrade(&self.inner);
        Arc::new(move |payload| {
            let Some(inner) = weak.upgrade() else { return };
            let listeners: Vec<Callback> = {
                let inner = inner.lock().unwrap();
                match inner.topics.get(&topic) {
                    Some(entry) => entry.listeners.iter().map(|(_, cb)| cb.clone()).collect(),
                    None => return,
                }
            };
            for cb in listeners {
                cb(payload);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conn::ClientConfig;
    use crate::wire;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc::UnboundedReceiver;

    fn setup() -> (Arc<ConnectionManager>, Arc<ChannelRegistry>, UnboundedReceiver<Frame>) {
        let conn = Arc::new(ConnectionManager::new(
            ClientConfig::new("ws://127.0.0.1:9/ws").expect("url"),
        ));
        let rx = conn.install_test_outbox();
        let registry = ChannelRegistry::new(conn.clone());
        (conn, registry, rx)
    }

    fn drain_upstream(rx: &mut UnboundedReceiver<Frame>) -> Vec<Frame> {
        let mut frames = Vec::new();
        while let Ok(f) = rx.try_recv() {
            frames.push(f);
        }
        frames
    }

    fn counting_callback(hits: &Arc<AtomicUsize>) -> Callback {
        let hits = hits.clone();
        Arc::new(move |_| {
            hits.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn upstream_subscribe_is_issued_once_per_topic() {
        let (_conn, registry, mut rx) = setup();
        let hits = Arc::new(AtomicUsize::new(0));

        let h1 = registry.subscribe_logs("dep-1", counting_callback(&hits)).unwrap();
        let h2 = registry.subscribe_logs("dep-1", counting_callback(&hits)).unwrap();
        let h3 = registry.subscribe_logs("dep-1", counting_callback(&hits)).unwrap();

        let frames = drain_upstream(&mut rx);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event, wire::SUBSCRIBE);
        assert_eq!(frames[0].payload["topic"], "logs:dep-1");

        // Only the last removal retires the topic.
        registry.unsubscribe(&h1);
        registry.unsubscribe(&h2);
        assert!(drain_upstream(&mut rx).is_empty());

        registry.unsubscribe(&h3);
        let frames = drain_upstream(&mut rx);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event, wire::UNSUBSCRIBE);
        assert_eq!(frames[0].payload["topic"], "logs:dep-1");
        assert!(registry.active_topics().is_empty());
    }

    #[test]
    fn fanout_hits_every_listener_with_the_same_payload() {
        let (conn, registry, _rx) = setup();
        let seen_a = Arc::new(Mutex::new(Vec::new()));
        let seen_b = Arc::new(Mutex::new(Vec::new()));

        let a = seen_a.clone();
        registry.subscribe_alerts(Arc::new(move |v| a.lock().unwrap().push(v.clone())));
        let b = seen_b.clone();
        registry.subscribe_alerts(Arc::new(move |v| b.lock().unwrap().push(v.clone())));

        let payload = json!({ "id": "a1", "severity": "critical" });
        conn.deliver("alerts", &payload);

        assert_eq!(*seen_a.lock().unwrap(), vec![payload.clone()]);
        assert_eq!(*seen_b.lock().unwrap(), vec![payload]);
    }

    #[test]
    fn unsubscribed_listener_stops_receiving() {
        let (conn, registry, _rx) = setup();
        let hits = Arc::new(AtomicUsize::new(0));
        let stays = Arc::new(AtomicUsize::new(0));

        let handle = registry.subscribe_deployments(counting_callback(&hits));
        registry.subscribe_deployments(counting_callback(&stays));

        conn.deliver("deployments", &json!({ "id": "d1" }));
        registry.unsubscribe(&handle);
        conn.deliver("deployments", &json!({ "id": "d2" }));

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(stays.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unsubscribing_twice_is_a_no_op() {
        let (_conn, registry, mut rx) = setup();
        let hits = Arc::new(AtomicUsize::new(0));

        let h1 = registry.subscribe_system_status(counting_callback(&hits));
        let _h2 = registry.subscribe_system_status(counting_callback(&hits));
        drain_upstream(&mut rx);

        registry.unsubscribe(&h1);
        registry.unsubscribe(&h1);
        // The sibling listener must still hold the topic open.
        assert!(drain_upstream(&mut rx).is_empty());
        assert_eq!(registry.listener_count(&Topic::SystemStatus), 1);
    }

    #[test]
    fn empty_scope_ids_do_not_subscribe_upstream() {
        let (_conn, registry, mut rx) = setup();
        let hits = Arc::new(AtomicUsize::new(0));

        assert!(registry.subscribe_metrics("", counting_callback(&hits)).is_none());
        assert!(registry.subscribe_logs("", counting_callback(&hits)).is_none());
        assert!(drain_upstream(&mut rx).is_empty());
        assert!(registry.active_topics().is_empty());
    }

    #[test]
    fn listener_can_unsubscribe_itself_during_fanout() {
        let (conn, registry, _rx) = setup();
        let registry2 = registry.clone();
        let slot: Arc<Mutex<Option<SubscriptionHandle>>> = Arc::new(Mutex::new(None));

        let slot2 = slot.clone();
        let handle = registry.subscribe_alerts(Arc::new(move |_| {
            if let Some(h) = slot2.lock().unwrap().take() {
                registry2.unsubscribe(&h);
            }
        }));
        *slot.lock().unwrap() = Some(handle);

        conn.deliver("alerts", &Value::Null);
        conn.deliver("alerts", &Value::Null);
        assert!(registry.active_topics().is_empty());
    }
}
