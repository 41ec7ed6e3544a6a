//! Repository for the `completion_records` table.
//!
//! Presence of a record with an `end_time` means the job succeeded.
//! Records are only ever inserted, except for the `end_time` backfill
//! performed when a verify pass confirms an interrupted attempt.

use vidcron_core::types::Timestamp;

use crate::error::LedgerError;
use crate::models::completion_record::CompletionRecord;
use crate::DbPool;

/// Column list for `completion_records` queries.
const COLUMNS: &str = "id, start_time, end_time";

/// Point lookups and inserts against the completion ledger.
pub struct CompletionRepo;

impl CompletionRepo {
    /// Find the record for `id`, if any.
    pub async fn find(pool: &DbPool, id: &str) -> Result<Option<CompletionRecord>, LedgerError> {
        let query = format!("SELECT {COLUMNS} FROM completion_records WHERE id = ?");
        let record = sqlx::query_as::<_, CompletionRecord>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await?;
        Ok(record)
    }

    /// Insert a completed record.
    ///
    /// Fails with [`LedgerError::DuplicateRecord`] if a record for `id`
    /// already exists; existing rows are never overwritten.
    pub async fn record_completion(
        pool: &DbPool,
        id: &str,
        start_time: Timestamp,
        end_time: Timestamp,
    ) -> Result<CompletionRecord, LedgerError> {
        Self::insert(pool, id, start_time, Some(end_time)).await
    }

    /// Insert a started-but-unfinished record for a resumable attempt.
    pub async fn mark_interrupted(
        pool: &DbPool,
        id: &str,
        start_time: Timestamp,
    ) -> Result<CompletionRecord, LedgerError> {
        Self::insert(pool, id, start_time, None).await
    }

    /// Backfill `end_time` on an interrupted record after verification.
    ///
    /// Completed records are left untouched; the returned row reflects
    /// whatever is stored afterwards.
    pub async fn mark_finished(
        pool: &DbPool,
        id: &str,
        end_time: Timestamp,
    ) -> Result<CompletionRecord, LedgerError> {
        let query = format!(
            "UPDATE completion_records SET end_time = ? \
             WHERE id = ? AND end_time IS NULL \
             RETURNING {COLUMNS}"
        );
        let updated = sqlx::query_as::<_, CompletionRecord>(&query)
            .bind(end_time)
            .bind(id)
            .fetch_optional(pool)
            .await?;

        match updated {
            Some(record) => Ok(record),
            None => Self::find(pool, id)
                .await?
                .ok_or_else(|| LedgerError::NotFound { id: id.to_string() }),
        }
    }

    /// All records whose attempt was never confirmed, oldest first.
    pub async fn list_interrupted(pool: &DbPool) -> Result<Vec<CompletionRecord>, LedgerError> {
        let query = format!(
            "SELECT {COLUMNS} FROM completion_records \
             WHERE end_time IS NULL ORDER BY start_time ASC"
        );
        let records = sqlx::query_as::<_, CompletionRecord>(&query)
            .fetch_all(pool)
            .await?;
        Ok(records)
    }

    /// Total number of records, interrupted ones included.
    pub async fn count(pool: &DbPool) -> Result<i64, LedgerError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM completion_records")
            .fetch_one(pool)
            .await?;
        Ok(count)
    }

    async fn insert(
        pool: &DbPool,
        id: &str,
        start_time: Timestamp,
        end_time: Option<Timestamp>,
    ) -> Result<CompletionRecord, LedgerError> {
        let query = format!(
            "INSERT INTO completion_records (id, start_time, end_time) \
             VALUES (?, ?, ?) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, CompletionRecord>(&query)
            .bind(id)
            .bind(start_time)
            .bind(end_time)
            .fetch_one(pool)
            .await
            .map_err(|e| LedgerError::from_insert(id, e))
    }
}
