//! Types that mirror the backend's push payload schema.
//!
//! Payloads arrive as loose JSON; only the fields the dashboard acts on are
//! required, everything else defaults so older backends stay compatible.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Latest-only metric payload for one project. The distribution layer
/// treats it as opaque JSON; the charts pick out what they need.
pub type MetricSnapshot = Value;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogEntry {
    pub id: u64,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub level: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: String,
    #[serde(default)]
    pub severity: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// One deployment record, keyed by id. Status strings come from the
/// backend (`running`, `building`, `failed`, `success`) and are carried
/// opaquely.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Whole-platform health snapshot (`operational`, `degraded`,
/// `maintenance`, `outage`), replace-latest only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SystemStatus {
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub services: Value,
}
