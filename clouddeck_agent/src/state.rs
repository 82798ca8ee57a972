//! Shared hub state: broadcast fan-out plus the bookkeeping integration
//! tests assert against (subscribe counts, received acks).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

/// One text frame on the wire; matches the client's envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub event: String,
    #[serde(default)]
    pub payload: Value,
}

#[derive(Clone)]
pub struct AppState {
    tx: broadcast::Sender<Envelope>,
    subscribes: Arc<Mutex<HashMap<String, u64>>>,
    unsubscribes: Arc<Mutex<HashMap<String, u64>>>,
    acks: Arc<Mutex<Vec<String>>>,
    kick: broadcast::Sender<()>,
}

impl AppState {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(256);
        let (kick, _krx) = broadcast::channel(4);
        Self {
            tx,
            subscribes: Arc::new(Mutex::new(HashMap::new())),
            unsubscribes: Arc::new(Mutex::new(HashMap::new())),
            acks: Arc::new(Mutex::new(Vec::new())),
            kick,
        }
    }

    /// Push an event to every socket currently subscribed to `topic`.
    pub fn publish(&self, topic: &str, payload: Value) {
        let _ = self.tx.send(Envelope {
            event: topic.to_string(),
            payload,
        });
    }

    pub(crate) fn feed(&self) -> broadcast::Receiver<Envelope> {
        self.tx.subscribe()
    }

    /// Force-close every connected socket; clients are expected to come
    /// back on their own.
    pub fn kick_all(&self) {
        let _ = self.kick.send(());
    }

    pub(crate) fn kick_feed(&self) -> broadcast::Receiver<()> {
        self.kick.subscribe()
    }

    pub fn subscribe_count(&self, topic: &str) -> u64 {
        *self.subscribes.lock().unwrap().get(topic).unwrap_or(&0)
    }

    pub fn unsubscribe_count(&self, topic: &str) -> u64 {
        *self.unsubscribes.lock().unwrap().get(topic).unwrap_or(&0)
    }

    pub fn acknowledged(&self) -> Vec<String> {
        self.acks.lock().unwrap().clone()
    }

    pub(crate) fn record_subscribe(&self, topic: &str) {
        *self
            .subscribes
            .lock()
            .unwrap()
            .entry(topic.to_string())
            .or_insert(0) += 1;
    }

    pub(crate) fn record_unsubscribe(&self, topic: &str) {
        *self
            .unsubscribes
            .lock()
            .unwrap()
            .entry(topic.to_string())
            .or_insert(0) += 1;
    }

    pub(crate) fn record_ack(&self, alert_id: &str) {
        self.acks.lock().unwrap().push(alert_id.to_string());
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
