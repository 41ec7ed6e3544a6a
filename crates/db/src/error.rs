use vidcron_core::types::JobId;

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// A record for this id already exists. Given write-only-on-success
    /// this means two workers completed the same job.
    #[error("Completion record already exists for {id}")]
    DuplicateRecord { id: JobId },

    #[error("No completion record for {id}")]
    NotFound { id: JobId },

    #[error("Ledger database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Ledger migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl LedgerError {
    /// Classify an insert failure, turning key conflicts into
    /// [`LedgerError::DuplicateRecord`].
    pub(crate) fn from_insert(id: &str, err: sqlx::Error) -> Self {
        if is_unique_violation(&err) {
            Self::DuplicateRecord { id: id.to_string() }
        } else {
            Self::Database(err)
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::DuplicateRecord { .. })
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            db_err.is_unique_violation() || db_err.message().contains("UNIQUE constraint failed")
        }
        _ => false,
    }
}
