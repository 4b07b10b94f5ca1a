//! Error telemetry forwarding.
//!
//! Tails the Jenkins error log (a JSON-lines file) and forwards each parsed
//! entry to the backend. The log file being absent, rotated, or truncated
//! must never take the agent down; those conditions reset or pause the tail
//! and the loop carries on.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncSeekExt, SeekFrom};
use tracing::{debug, info, warn};

use crate::api::BackendClient;
use crate::error::ClientError;

const POLL_INTERVAL: Duration = Duration::from_secs(10);

/// One log record as Jenkins writes it, one JSON object per line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
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

/// Watches one log file and forwards entries as a given device identity.
pub struct ErrorTelemetry {
    api: BackendClient,
    file: PathBuf,
    uuid: String,
    token: String,
}

impl ErrorTelemetry {
    pub fn new(api: BackendClient, file: PathBuf, uuid: &str, token: &str) -> Self {
        Self {
            api,
            file,
            uuid: uuid.to_string(),
            token: token.to_string(),
        }
    }

    /// Path of the log file to tail: `ESSENTIALS_LOG_FILE` if set, otherwise
    /// the standard location under the Evergreen home.
    pub fn file_to_watch(home: &Path) -> PathBuf {
        match std::env::var("ESSENTIALS_LOG_FILE") {
            Ok(path) if !path.is_empty() => PathBuf::from(path),
            _ => {
                debug!("Defaulting to essentials.log.0");
                home.join("jenkins")
                    .join("var")
                    .join("logs")
                    .join("essentials.log.0")
            }
        }
    }

    /// Tail the file forever, forwarding new entries as they appear.
    ///
    /// Forwarding failures are logged and the entry dropped; the offset
    /// still advances so one poisoned record cannot wedge the loop.
    pub async fn run(&self) {
        info!(file = %self.file.display(), "Watching error log");

        let mut offset: u64 = 0;
        let mut interval = tokio::time::interval(POLL_INTERVAL);
        loop {
            interval.tick().await;

            let (entries, next_offset) = match read_new_entries(&self.file, offset).await {
                Ok(result) => result,
                Err(e) => {
                    warn!(error = %e, "Failed to read error log");
                    continue;
                }
            };
            offset = next_offset;

            for entry in entries {
                if let Err(e) = self
                    .api
                    .send_error_telemetry(&self.token, &self.uuid, &entry)
                    .await
                {
                    warn!(error = %e, "Failed to forward an error-log entry");
                }
            }
        }
    }
}

/// Read complete lines appended since `offset`, returning the parsed entries
/// and the new offset.
///
/// A missing file is not an error (Jenkins may not have logged yet). A file
/// shorter than the last offset was rotated or truncated, so the tail
/// restarts from the beginning. A trailing partial line is left unconsumed
/// until its newline arrives.
pub async fn read_new_entries(
    path: &Path,
    offset: u64,
) -> Result<(Vec<LogEntry>, u64), ClientError> {
    let mut file = match tokio::fs::File::open(path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok((Vec::new(), offset));
        }
        Err(e) => {
            return Err(ClientError::Persistence(format!(
                "cannot open {}: {}",
                path.display(),
                e
            )));
        }
    };

    let len = file
        .metadata()
        .await
        .map_err(|e| ClientError::Persistence(format!("cannot stat {}: {}", path.display(), e)))?
        .len();
    let mut offset = offset;
    if len < offset {
        warn!(file = %path.display(), "Log file shrank, assuming rotation");
        offset = 0;
    }

    file.seek(SeekFrom::Start(offset))
        .await
        .map_err(|e| ClientError::Persistence(format!("cannot seek {}: {}", path.display(), e)))?;

    let mut buf = Vec::new();
    file.read_to_end(&mut buf)
        .await
        .map_err(|e| ClientError::Persistence(format!("cannot read {}: {}", path.display(), e)))?;

    // Only consume up to the last newline; the remainder is a partial line.
    let consumed = match buf.iter().rposition(|&b| b == b'\n') {
        Some(pos) => pos + 1,
        None => return Ok((Vec::new(), offset)),
    };

    let mut entries = Vec::new();
    for line in String::from_utf8_lossy(&buf[..consumed]).lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<LogEntry>(line) {
            Ok(entry) => entries.push(entry),
            Err(e) => warn!(error = %e, "Skipping an unparseable log line"),
        }
    }

    Ok((entries, offset + consumed as u64))
}
