//! Tracing subscriber setup.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use vidcron_core::config::LogLevel;

use crate::cli::LogFormat;

/// Default directives for a configured level: our crates at `level`,
/// sqlx limited to warnings so query logs don't drown job output.
pub fn default_directives(level: LogLevel) -> String {
    let level = level.as_filter();
    format!(
        "vidcron={level},vidcron_worker={level},vidcron_core={level},vidcron_db={level},vidcron_pipeline={level},sqlx=warn"
    )
}

/// Install the global subscriber. `RUST_LOG` wins over the config level.
pub fn init(level: LogLevel, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .init(),
    }
}
