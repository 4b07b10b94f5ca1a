//! Ingestion of client error telemetry.
//!
//! Clients tail their Jenkins error log and forward entries here. Accepted
//! entries are emitted through the service's own structured log under the
//! `evergreen::telemetry` target for downstream collection.

use serde::{Deserialize, Serialize};
use tracing::info;

/// One error-log entry reported by a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception: Option<serde_json::Value>,
}

/// Record a telemetry entry for the given device.
pub fn record(uuid: &str, entry: &LogEntry) {
    info!(
        target: "evergreen::telemetry",
        %uuid,
        logger = entry.name.as_deref().unwrap_or("unknown"),
        level = entry.level.as_deref().unwrap_or("unknown"),
        message = %entry.message,
        "client error report"
    );
}
