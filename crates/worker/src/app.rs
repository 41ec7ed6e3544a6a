//! One complete run: open the ledger, discover jobs, schedule them.
//!
//! Lifecycle:
//! 1. Resolve overrides (CLI / environment) against the config file.
//! 2. Open and migrate the completion ledger. Failure is fatal.
//! 3. Build every source with the startup capability probe and collect
//!    their jobs. Source failures only skip that source.
//! 4. Run all jobs through the [`ConcurrencyScheduler`].
//! 5. Hand back the [`RunReport`]; the caller logs it and picks the exit code.

use std::num::NonZeroUsize;
use std::path::PathBuf;

use vidcron_core::config::GlobalConfig;
use vidcron_core::error::CoreError;
use vidcron_core::probe::Capabilities;
use vidcron_core::process::ProcessRunner;
use vidcron_db::LedgerError;
use vidcron_pipeline::{discover_jobs, ConcurrencyScheduler, RunReport, SourceContext, SourceKind};

/// Exit status when the config file is missing or malformed.
pub const EXIT_CONFIG: u8 = 2;
/// Exit status when the ledger cannot be opened or migrated.
pub const EXIT_LEDGER: u8 = 3;

/// Fatal errors that abort a run before any job executes.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] CoreError),

    #[error("Completion ledger unavailable: {0}")]
    Ledger(#[from] LedgerError),
}

impl AppError {
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_) => EXIT_CONFIG,
            Self::Ledger(_) => EXIT_LEDGER,
        }
    }
}

/// Settings that take precedence over the config file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub max_concurrent: Option<NonZeroUsize>,
    pub ledger_path: Option<PathBuf>,
}

/// Binaries needed by the configured sources, deduplicated.
///
/// Sources with an unknown `Type` contribute nothing; discovery reports
/// them later.
pub fn required_binaries(config: &GlobalConfig) -> Vec<&'static str> {
    let mut binaries: Vec<&'static str> = config
        .sources
        .iter()
        .filter_map(|source| SourceKind::for_config(source).ok())
        .flat_map(|kind| kind.required_binaries().iter().copied())
        .collect();
    binaries.sort_unstable();
    binaries.dedup();
    binaries
}

/// Run every job the configured sources offer.
pub async fn execute(
    config: &GlobalConfig,
    capabilities: Capabilities,
    overrides: &Overrides,
) -> Result<RunReport, AppError> {
    let ledger_path = overrides
        .ledger_path
        .clone()
        .unwrap_or_else(|| config.ledger_path());
    let max_concurrent = overrides
        .max_concurrent
        .map_or_else(|| config.max_concurrent_jobs(), NonZeroUsize::get);

    let pool = vidcron_db::open_ledger(&ledger_path).await?;
    tracing::info!(path = %ledger_path.display(), "Completion ledger ready");

    let ctx = SourceContext {
        runner: ProcessRunner::new().with_timeout(config.job_timeout()),
        capabilities,
    };
    let jobs = discover_jobs(&config.sources, &ctx).await;

    let report = ConcurrencyScheduler::new(pool.clone(), max_concurrent)
        .run(jobs)
        .await;

    pool.close().await;
    Ok(report)
}

/// `0` when the engine upheld its invariants, even if jobs failed.
pub fn report_exit_code(report: &RunReport) -> u8 {
    if report.has_defects() {
        1
    } else {
        0
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
