use std::num::NonZeroUsize;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Exit status for command-line usage errors (`EX_USAGE`).
pub const EXIT_USAGE: u8 = 64;

/// Log line formatting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

/// vidcron - download everything your sources offer, exactly once
#[derive(Parser, Debug)]
#[command(name = "vidcron")]
#[command(version)]
#[command(about = "Discover jobs from configured sources and run the ones not yet completed", long_about = None)]
pub struct Cli {
    /// Path to the JSON configuration file
    pub config: PathBuf,

    /// Log output format
    #[arg(long = "log-format", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Maximum number of jobs running at once (overrides MaxConcurrentJobs)
    #[arg(long = "max-concurrent", env = "VIDCRON_MAX_CONCURRENT")]
    pub max_concurrent: Option<NonZeroUsize>,

    /// Completion ledger file (overrides LedgerPath)
    #[arg(long = "ledger", env = "VIDCRON_LEDGER_PATH")]
    pub ledger: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_positional_config_with_defaults() {
        let cli = Cli::try_parse_from(["vidcron", "config.json"]).expect("valid args");
        assert_eq!(cli.config, PathBuf::from("config.json"));
        assert_eq!(cli.log_format, LogFormat::Text);
    }

    #[test]
    fn parses_overrides() {
        let cli = Cli::try_parse_from([
            "vidcron",
            "--log-format",
            "json",
            "--max-concurrent",
            "3",
            "--ledger",
            "/tmp/ledger.db",
            "config.json",
        ])
        .expect("valid args");
        assert_eq!(cli.log_format, LogFormat::Json);
        assert_eq!(cli.max_concurrent.map(NonZeroUsize::get), Some(3));
        assert_eq!(cli.ledger, Some(PathBuf::from("/tmp/ledger.db")));
    }

    #[test]
    fn rejects_zero_concurrency_and_missing_config() {
        assert!(Cli::try_parse_from(["vidcron", "--max-concurrent", "0", "c.json"]).is_err());
        assert!(Cli::try_parse_from(["vidcron"]).is_err());
    }
}
