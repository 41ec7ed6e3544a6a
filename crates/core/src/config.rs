//! Run configuration, loaded from a JSON file.
//!
//! Keys are PascalCase (`MaxConcurrentJobs`, `Sources`, ...) so existing
//! config files keep working. Unknown keys are ignored.
//!
//! | Key                 | Default                       |
//! |---------------------|-------------------------------|
//! | `LogLevel`          | `Information`                 |
//! | `MaxConcurrentJobs` | available processor count     |
//! | `JobTimeoutSeconds` | none (jobs may run forever)   |
//! | `LedgerPath`        | `downloads.db`                |
//! | `Sources`           | empty                         |

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use validator::Validate;

use crate::error::CoreError;

/// Ledger file used when neither the config nor the environment names one.
pub const DEFAULT_LEDGER_PATH: &str = "downloads.db";

/// Verbosity of the run's log output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum LogLevel {
    #[serde(alias = "trace")]
    Trace,
    #[serde(alias = "debug")]
    Debug,
    #[default]
    #[serde(alias = "Info", alias = "info")]
    Information,
    #[serde(alias = "Warn", alias = "warn")]
    Warning,
    #[serde(alias = "error")]
    Error,
    #[serde(alias = "critical")]
    Critical,
    #[serde(alias = "none", alias = "Off", alias = "off")]
    None,
}

impl LogLevel {
    /// Directive understood by `tracing_subscriber::EnvFilter`.
    pub fn as_filter(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Information => "info",
            Self::Warning => "warn",
            Self::Error | Self::Critical => "error",
            Self::None => "off",
        }
    }
}

/// Top-level configuration for one run.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "PascalCase")]
pub struct GlobalConfig {
    #[serde(default)]
    pub log_level: LogLevel,

    #[validate(range(min = 1, message = "MaxConcurrentJobs must be at least 1"))]
    pub max_concurrent_jobs: Option<usize>,

    #[validate(range(min = 1, message = "JobTimeoutSeconds must be at least 1"))]
    pub job_timeout_seconds: Option<u64>,

    pub ledger_path: Option<PathBuf>,

    /// Sources are validated individually when built, so one malformed
    /// entry only disables that source.
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

impl GlobalConfig {
    /// Read, parse, and validate a config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| CoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, CoreError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Configured worker count, falling back to the processor count.
    pub fn max_concurrent_jobs(&self) -> usize {
        self.max_concurrent_jobs.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1)
        })
    }

    pub fn job_timeout(&self) -> Option<Duration> {
        self.job_timeout_seconds.map(Duration::from_secs)
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.ledger_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LEDGER_PATH))
    }
}

/// One configured job source.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "PascalCase")]
pub struct SourceConfig {
    /// Source kind tag, e.g. `youtubedl`.
    #[serde(rename = "Type")]
    pub kind: Option<String>,

    #[serde(default)]
    #[validate(length(min = 1, message = "source Name must not be empty"))]
    pub name: String,

    pub destination_folder: Option<PathBuf>,

    #[serde(default)]
    pub properties: HashMap<String, String>,
}

impl SourceConfig {
    /// Look up a property, preferring an exact key match.
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties
            .get(key)
            .or_else(|| {
                self.properties
                    .iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(key))
                    .map(|(_, v)| v)
            })
            .map(String::as_str)
    }

    pub fn require_property(&self, key: &str) -> Result<&str, CoreError> {
        self.property(key)
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| {
                CoreError::Configuration(format!(
                    "Source \"{}\" is missing required property {key}",
                    self.name
                ))
            })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
