//! JSON envelope and topic keys shared with the push backend.
//!
//! Every text frame, in both directions, is `{ "event": ..., "payload": ... }`.
//! Push events use the topic key as the event name; upstream commands use
//! the `subscribe` / `unsubscribe` / `acknowledge_alert` event names.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::RealtimeError;

// Local lifecycle events, dispatched on the connection bus (never on the wire).
pub const CONNECTION_ESTABLISHED: &str = "connection_established";
pub const CONNECTION_LOST: &str = "connection_lost";
pub const SOCKET_ERROR: &str = "socket_error";

// Upstream command event names.
pub const SUBSCRIBE: &str = "subscribe";
pub const UNSUBSCRIBE: &str = "unsubscribe";
pub const ACKNOWLEDGE_ALERT: &str = "acknowledge_alert";

/// One text frame on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Frame {
    pub event: String,
    #[serde(default)]
    pub payload: Value,
}

impl Frame {
    pub fn new(event: impl Into<String>, payload: Value) -> Self {
        Self {
            event: event.into(),
            payload,
        }
    }

    pub fn subscribe(topic: &Topic) -> Self {
        Self::new(SUBSCRIBE, json!({ "topic": topic.key() }))
    }

    pub fn unsubscribe(topic: &Topic) -> Self {
        Self::new(UNSUBSCRIBE, json!({ "topic": topic.key() }))
    }

    pub fn acknowledge_alert(alert_id: &str) -> Self {
        Self::new(ACKNOWLEDGE_ALERT, json!({ "alertId": alert_id }))
    }

    pub fn encode(&self) -> Result<String, RealtimeError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(text: &str) -> Result<Self, RealtimeError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// A named, optionally entity-scoped subscription channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Per-project metric snapshots.
    Metrics(String),
    /// Per-deployment log stream.
    Logs(String),
    Alerts,
    Deployments,
    SystemStatus,
}

impl Topic {
    /// The string key used as the push event name on the wire.
    pub fn key(&self) -> String {
        match self {
            Topic::Metrics(project_id) => format!("metrics:{project_id}"),
            Topic::Logs(deployment_id) => format!("logs:{deployment_id}"),
            Topic::Alerts => "alerts".to_string(),
            Topic::Deployments => "deployments".to_string(),
            Topic::SystemStatus => "system-status".to_string(),
        }
    }

    /// Parse a topic key back into a typed topic. Scoped kinds require a
    /// non-empty scope id.
    pub fn parse(key: &str) -> Option<Topic> {
        if let Some(id) = key.strip_prefix("metrics:") {
            return (!id.is_empty()).then(|| Topic::Metrics(id.to_string()));
        }
        if let Some(id) = key.strip_prefix("logs:") {
            return (!id.is_empty()).then(|| Topic::Logs(id.to_string()));
        }
        match key {
            "alerts" => Some(Topic::Alerts),
            "deployments" => Some(Topic::Deployments),
            "system-status" => Some(Topic::SystemStatus),
            _ => None,
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_keys_round_trip() {
        let topics = [
            Topic::Metrics("proj-1".into()),
            Topic::Logs("dep-1".into()),
            Topic::Alerts,
            Topic::Deployments,
            Topic::SystemStatus,
        ];
        for t in topics {
            assert_eq!(Topic::parse(&t.key()), Some(t));
        }
    }

    #[test]
    fn scoped_topics_require_an_id() {
        assert_eq!(Topic::parse("metrics:"), None);
        assert_eq!(Topic::parse("logs:"), None);
        assert_eq!(Topic::parse("unknown"), None);
    }

    #[test]
    fn acknowledge_frame_carries_alert_id() {
        let frame = Frame::acknowledge_alert("alert-7");
        assert_eq!(frame.event, ACKNOWLEDGE_ALERT);
        assert_eq!(frame.payload["alertId"], "alert-7");
    }

    #[test]
    fn decode_defaults_missing_payload_to_null() {
        let frame = Frame::decode(r#"{"event":"connection_lost"}"#).expect("decode");
        assert_eq!(frame.event, CONNECTION_LOST);
        assert!(frame.payload.is_null());
    }
}
