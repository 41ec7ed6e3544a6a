use vidcron_core::error::CoreError;
use vidcron_core::process::ProcessError;
use vidcron_db::LedgerError;

/// Failure of a whole source. The source is skipped; others still run.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Required binary {0} is not available")]
    MissingBinary(String),

    #[error(transparent)]
    Process(#[from] ProcessError),
}

impl SourceError {
    /// Captured stderr when the source's listing command failed.
    pub fn stderr(&self) -> &[String] {
        match self {
            Self::Process(err) => err.stderr(),
            _ => &[],
        }
    }
}

impl From<CoreError> for SourceError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Configuration(msg) | CoreError::Validation(msg) => Self::Configuration(msg),
            other => Self::Configuration(other.to_string()),
        }
    }
}

impl From<validator::ValidationErrors> for SourceError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::Configuration(errors.to_string())
    }
}

/// Engine-level defects. These never fail a single job; they indicate
/// that an invariant of the engine itself was broken.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// A completed job found its ledger row already present.
    #[error("Ledger invariant violated for {job_id}: {source}")]
    DuplicateRecord {
        job_id: String,
        #[source]
        source: LedgerError,
    },

    /// A worker task died outside the per-job catch boundary.
    #[error("Scheduler worker failed: {0}")]
    WorkerFailed(String),
}
