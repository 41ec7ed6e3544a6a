//! Job discovery across every configured source.
//!
//! A source that cannot be built or whose listing fails is logged and
//! skipped; the remaining sources still contribute jobs. Jobs are
//! deduplicated by unique id, first source wins.

use vidcron_core::config::SourceConfig;
use vidcron_core::job::JobSet;

use crate::error::SourceError;
use crate::sources::{JobSource, SourceContext, SourceKind};

/// Build every configured source and collect their jobs.
pub async fn discover_jobs(configs: &[SourceConfig], ctx: &SourceContext) -> JobSet {
    let mut sources = Vec::with_capacity(configs.len());
    for config in configs {
        match SourceKind::for_config(config).and_then(|kind| kind.build(config, ctx)) {
            Ok(source) => sources.push(source),
            Err(e) => log_source_error(&config.name, &e, "Skipping source that could not be built"),
        }
    }
    collect_jobs(&sources).await
}

/// Ask each source for its jobs, in order.
pub async fn collect_jobs(sources: &[Box<dyn JobSource>]) -> JobSet {
    let mut jobs = JobSet::new();
    for source in sources {
        let discovered = match source.get_all_jobs().await {
            Ok(discovered) => discovered,
            Err(e) => {
                log_source_error(source.name(), &e, "Failed to retrieve jobs from source");
                continue;
            }
        };

        let offered = discovered.len();
        let mut duplicates = 0usize;
        for job in discovered {
            if !jobs.insert(job) {
                duplicates += 1;
            }
        }
        if duplicates > 0 {
            tracing::warn!(source = %source.name(), duplicates, "Ignoring duplicate job ids");
        }
        tracing::info!(source = %source.name(), jobs = offered - duplicates, "Collected jobs");
    }

    tracing::info!(total = jobs.len(), "Discovery finished");
    jobs
}

fn log_source_error(source: &str, error: &SourceError, message: &str) {
    tracing::error!(source = %source, error = %error, "{message}");
    for line in error.stderr() {
        tracing::error!(source = %source, stderr = %line);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
