//! Pluggable job sources.
//!
//! The set of source kinds is closed, so the registry is the
//! [`SourceKind`] enum: a config `Type` tag resolves to a variant, and
//! the variant knows how to build its [`JobSource`] and which external
//! binaries it needs probed at startup.

pub mod yt_dlp;

use async_trait::async_trait;
use vidcron_core::config::SourceConfig;
use vidcron_core::job::Job;
use vidcron_core::probe::Capabilities;
use vidcron_core::process::ProcessRunner;

use crate::error::SourceError;

pub use yt_dlp::YtDlpSource;

/// Produces the jobs for one configured source.
#[async_trait]
pub trait JobSource: Send + Sync {
    /// The configured source name, used as each job's `source_name`.
    fn name(&self) -> &str;

    /// Discover every job this source currently offers.
    ///
    /// Errors fail only this source; discovery continues with the rest.
    async fn get_all_jobs(&self) -> Result<Vec<Job>, SourceError>;
}

/// Shared inputs for building sources.
#[derive(Debug, Clone, Default)]
pub struct SourceContext {
    /// Runner (with the run's deadline) used for every external command.
    pub runner: ProcessRunner,
    /// Result of the startup binary probe.
    pub capabilities: Capabilities,
}

/// Every supported source kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    YtDlp,
}

impl SourceKind {
    pub const ALL: [SourceKind; 1] = [SourceKind::YtDlp];

    /// Resolve a config `Type` tag, case-insensitively.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "youtubedl" | "youtube-dl" | "yt-dlp" | "ytdlp" | "yt_dlp" => Some(Self::YtDlp),
            _ => None,
        }
    }

    /// Resolve the kind of a source config, or explain why it has none.
    pub fn for_config(config: &SourceConfig) -> Result<Self, SourceError> {
        config
            .kind
            .as_deref()
            .and_then(Self::from_tag)
            .ok_or_else(|| {
                SourceError::Configuration(format!(
                    "Cannot process source config of type: {}",
                    config.kind.as_deref().unwrap_or("<missing>")
                ))
            })
    }

    /// External binaries this kind needs on `PATH`.
    pub fn required_binaries(self) -> &'static [&'static str] {
        match self {
            Self::YtDlp => &[yt_dlp::BINARY],
        }
    }

    pub fn build(
        self,
        config: &SourceConfig,
        ctx: &SourceContext,
    ) -> Result<Box<dyn JobSource>, SourceError> {
        match self {
            Self::YtDlp => Ok(Box::new(YtDlpSource::new(config, ctx)?)),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
