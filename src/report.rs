//! Per-record results and the aggregate run report.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use syncline_core::SyncError;

/// Outcome of syncing a single record. Immutable once produced.
#[derive(Debug, Clone, Serialize)]
pub struct SyncResult {
    pub record_id: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub retries_consumed: usize,
    pub wall_duration_ms: u64,
}

impl SyncResult {
    pub fn succeeded(record_id: String, retries_consumed: usize, wall: Duration) -> Self {
        Self {
            record_id,
            success: true,
            error: None,
            retries_consumed,
            wall_duration_ms: wall.as_millis() as u64,
        }
    }

    pub fn failed(
        record_id: String,
        error: &SyncError,
        retries_consumed: usize,
        wall: Duration,
    ) -> Self {
        Self {
            record_id,
            success: false,
            error: Some(error.to_string()),
            retries_consumed,
            wall_duration_ms: wall.as_millis() as u64,
        }
    }
}

/// Aggregate report of one sync run.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Retries consumed across every record.
    pub retries: usize,
    pub results: Vec<SyncResult>,
}

impl SyncReport {
    pub fn new(
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        total: usize,
        results: Vec<SyncResult>,
    ) -> Self {
        let succeeded = results.iter().filter(|r| r.success).count();
        let failed = results.iter().filter(|r| !r.success).count();
        let retries = results.iter().map(|r| r.retries_consumed).sum();
        Self {
            started_at,
            finished_at,
            total,
            succeeded,
            failed,
            retries,
            results,
        }
    }

    /// `(record_id, error message)` for every failed record.
    pub fn failures(&self) -> Vec<(&str, &str)> {
        self.results
            .iter()
            .filter(|r| !r.success)
            .map(|r| {
                (
                    r.record_id.as_str(),
                    r.error.as_deref().unwrap_or("unknown error"),
                )
            })
            .collect()
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}
