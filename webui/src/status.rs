//! Watcher liveness derived from the state file's modification time

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;
use std::time::{Duration, SystemTime};

/// A state file older than this suggests the watcher stopped saving
pub const STALL_THRESHOLD: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WatcherState {
    WaitingForFirstRun,
    Running,
    PossiblyStalled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WatcherStatus {
    pub state_file_exists: bool,
    pub status: WatcherState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_update_seconds_ago: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_update: Option<DateTime<Utc>>,
}

pub async fn check(state_path: &Path, now: SystemTime) -> std::io::Result<WatcherStatus> {
    let metadata = match tokio::fs::metadata(state_path).await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(WatcherStatus {
                state_file_exists: false,
                status: WatcherState::WaitingForFirstRun,
                last_update_seconds_ago: None,
                last_update: None,
            })
        }
        Err(e) => return Err(e),
    };

    let modified = metadata.modified()?;
    // Clock skew can put mtime in the future
    let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
    let status = if age < STALL_THRESHOLD {
        WatcherState::Running
    } else {
        WatcherState::PossiblyStalled
    };

    Ok(WatcherStatus {
        state_file_exists: true,
        status,
        last_update_seconds_ago: Some(age.as_secs()),
        last_update: Some(DateTime::<Utc>::from(modified)),
    })
}
