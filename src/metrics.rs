//! Metrics recording for stale-lock reclaims.
//!
//! When an acquirer forcibly removes an abandoned publish lock, the reclaim
//! is recorded here for observability: which lock was reclaimed, who owned
//! it, and how old it was.
//!
//! The event log is a JSON array at `content/metrics/lock-events.json`,
//! rewritten atomically (temp file + rename) on every append so a concurrent
//! writer or a crash can never truncate it.
//!
//! # Best-effort contract
//!
//! Recording is a non-critical side effect. Callers on the reclaim path must
//! catch and log any error from `record_reclaim` rather than propagate it;
//! a metrics failure must never block or fail the reclaim itself.

use crate::error::{CreelError, Result};
use crate::fs::atomic_write_file;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One stale-lock reclaim event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReclaimEvent {
    /// Lock id of the record that was reclaimed.
    pub lock_id: String,

    /// Owner token of the abandoned record (diagnostics only).
    pub owner_token: String,

    /// When the abandoned record was created.
    pub created_at: DateTime<Utc>,

    /// Age of the record at reclaim time, in milliseconds.
    pub age_ms: u64,
}

/// Append-only recorder for reclaim events.
#[derive(Debug, Clone)]
pub struct MetricsRecorder {
    path: PathBuf,
}

impl MetricsRecorder {
    /// Create a recorder writing to the given event log path.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Path of the event log.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a reclaim event to the log.
    ///
    /// Best-effort by contract: the reclaim call site catches and logs any
    /// error from this function instead of propagating it.
    pub fn record_reclaim(&self, event: &ReclaimEvent) -> Result<()> {
        let mut events = self.load_or_empty();
        events.push(event.clone());

        let json = serde_json::to_string_pretty(&events).map_err(|e| {
            CreelError::UserError(format!("failed to serialize reclaim events: {}", e))
        })?;

        atomic_write_file(&self.path, &json)
    }

    /// Read all recorded events. A missing log yields an empty list.
    pub fn read_events(&self) -> Result<Vec<ReclaimEvent>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let content = std::fs::read_to_string(&self.path).map_err(|e| {
            CreelError::UserError(format!(
                "failed to read metrics file '{}': {}",
                self.path.display(),
                e
            ))
        })?;

        serde_json::from_str(&content).map_err(|e| {
            CreelError::UserError(format!(
                "failed to parse metrics file '{}': {}",
                self.path.display(),
                e
            ))
        })
    }

    /// Load existing events, starting fresh (with a warning) if the log is
    /// missing or corrupt. A corrupt log must not block new recordings.
    fn load_or_empty(&self) -> Vec<ReclaimEvent> {
        match self.read_events() {
            Ok(events) => events,
            Err(e) => {
                eprintln!("Warning: resetting unreadable metrics log: {}", e);
                Vec::new()
            }
        }
    }
}
