//! Completion ledger row model.

use serde::Serialize;
use sqlx::FromRow;
use vidcron_core::types::{JobId, Timestamp};

/// A row from the `completion_records` table.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct CompletionRecord {
    /// The job's unique id.
    pub id: JobId,
    pub start_time: Timestamp,
    /// `None` for an attempt that started but was never confirmed.
    pub end_time: Option<Timestamp>,
}

impl CompletionRecord {
    /// Whether the record proves the job completed.
    pub fn is_complete(&self) -> bool {
        self.end_time.is_some()
    }

    pub fn is_interrupted(&self) -> bool {
        self.end_time.is_none()
    }
}
