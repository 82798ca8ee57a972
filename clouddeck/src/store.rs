//! Bounded accumulation policies for pushed topic data.
//!
//! Each topic kind has exactly one merge rule: replace-latest for metrics
//! and system status, newest-first prepend for logs and alerts, keyed
//! upsert for deployments. Collections never exceed their cap after an
//! update; the oldest entries fall off the tail.

use std::collections::VecDeque;

use crate::types::{Alert, Deployment, LogEntry};

pub const LOG_CAP: usize = 1000;
pub const ALERT_CAP: usize = 100;
pub const DEPLOYMENT_CAP: usize = 50;

// Prepend and truncate the tail so the newest entries always survive.
fn prepend_capped<T>(dq: &mut VecDeque<T>, v: T, cap: usize) {
    dq.push_front(v);
    dq.truncate(cap);
}

/// Replace-latest policy: keeps only the most recent value.
#[derive(Debug, Clone)]
pub struct Latest<T> {
    value: Option<T>,
}

impl<T> Default for Latest<T> {
    fn default() -> Self {
        Self { value: None }
    }
}

impl<T: Clone> Latest<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace(&mut self, v: T) {
        self.value = Some(v);
    }

    pub fn get(&self) -> Option<T> {
        self.value.clone()
    }
}

/// Newest-first ring of log lines for one deployment.
#[derive(Debug)]
pub struct LogStore {
    entries: VecDeque<LogEntry>,
    cap: usize,
}

impl LogStore {
    pub fn new(cap: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(cap.min(64)),
            cap,
        }
    }

    pub fn push(&mut self, entry: LogEntry) {
        prepend_capped(&mut self.entries, entry, self.cap);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.iter().cloned().collect()
    }
}

/// Newest-first ring of alerts; acknowledged alerts are removed by id.
#[derive(Debug)]
pub struct AlertStore {
    entries: VecDeque<Alert>,
    cap: usize,
}

impl AlertStore {
    pub fn new(cap: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            cap,
        }
    }

    pub fn push(&mut self, alert: Alert) {
        prepend_capped(&mut self.entries, alert, self.cap);
    }

    /// Remove the alert with the given id; returns whether it was present.
    pub fn acknowledge(&mut self, alert_id: &str) -> bool {
        match self.entries.iter().position(|a| a.id == alert_id) {
            Some(pos) => {
                self.entries.remove(pos);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> Vec<Alert> {
        self.entries.iter().cloned().collect()
    }
}

/// Deployment records keyed by id. A known id is replaced in place so its
/// list position is stable; an unknown id is inserted at the front.
#[derive(Debug)]
pub struct DeploymentStore {
    records: VecDeque<Deployment>,
    cap: usize,
}

impl DeploymentStore {
    pub fn new(cap: usize) -> Self {
        Self {
            records: VecDeque::new(),
            cap,
        }
    }

    pub fn upsert(&mut self, record: Deployment) {
        match self.records.iter().position(|d| d.id == record.id) {
            Some(pos) => self.records[pos] = record,
            None => prepend_capped(&mut self.records, record, self.cap),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> Vec<Deployment> {
        self.records.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log(id: u64) -> LogEntry {
        LogEntry {
            id,
            timestamp: None,
            level: "info".into(),
            message: format!("line {id}"),
        }
    }

    fn alert(id: &str) -> Alert {
        Alert {
            id: id.into(),
            severity: "warning".into(),
            message: String::new(),
            created_at: None,
        }
    }

    fn deployment(id: &str, status: &str) -> Deployment {
        Deployment {
            id: id.into(),
            name: format!("app-{id}"),
            status: status.into(),
            created_at: None,
        }
    }

    #[test]
    fn logs_prepend_newest_first() {
        let mut store = LogStore::new(LOG_CAP);
        store.push(log(1));
        store.push(log(2));
        let ids: Vec<u64> = store.entries().iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![2, 1]);
    }

    #[test]
    fn log_store_never_exceeds_cap() {
        let mut store = LogStore::new(LOG_CAP);
        for id in 1..=1001 {
            store.push(log(id));
        }
        assert_eq!(store.len(), 1000);
        let entries = store.entries();
        assert_eq!(entries[0].id, 1001, "newest entry must be present");
        assert!(
            !entries.iter().any(|e| e.id == 1),
            "oldest entry must have been dropped"
        );
    }

    #[test]
    fn alert_store_caps_and_acknowledges() {
        let mut store = AlertStore::new(ALERT_CAP);
        for i in 0..101 {
            store.push(alert(&format!("a{i}")));
        }
        assert_eq!(store.len(), 100);
        assert!(!store.entries().iter().any(|a| a.id == "a0"));

        assert!(store.acknowledge("a42"));
        assert_eq!(store.len(), 99);
        assert!(!store.entries().iter().any(|a| a.id == "a42"));

        // Acknowledging an unknown id is a no-op.
        assert!(!store.acknowledge("a42"));
        assert_eq!(store.len(), 99);
    }

    #[test]
    fn deployment_upsert_preserves_position() {
        let mut store = DeploymentStore::new(DEPLOYMENT_CAP);
        store.upsert(deployment("d1", "building"));
        store.upsert(deployment("d2", "building"));
        store.upsert(deployment("d3", "building"));
        // d1 sits at the back; updating it must not move it.
        store.upsert(deployment("d1", "running"));

        let records = store.records();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].id, "d3");
        assert_eq!(records[2].id, "d1");
        assert_eq!(records[2].status, "running");
    }

    #[test]
    fn deployment_new_id_inserts_at_front() {
        let mut store = DeploymentStore::new(DEPLOYMENT_CAP);
        store.upsert(deployment("d1", "running"));
        store.upsert(deployment("d2", "building"));
        assert_eq!(store.records()[0].id, "d2");
    }

    #[test]
    fn deployment_store_keeps_50_most_recent() {
        let mut store = DeploymentStore::new(DEPLOYMENT_CAP);
        for i in 1..=51 {
            store.upsert(deployment(&format!("d{i}"), "running"));
        }
        assert_eq!(store.len(), 50);
        let records = store.records();
        assert_eq!(records[0].id, "d51");
        assert!(!records.iter().any(|d| d.id == "d1"));
    }

    #[test]
    fn latest_replaces_without_history() {
        let mut latest = Latest::new();
        assert_eq!(latest.get(), None);
        latest.replace(1u32);
        latest.replace(2u32);
        assert_eq!(latest.get(), Some(2));
    }
}
