//! Structured results of a process invocation.
//!
//! Success and failure are both plain data: a zero exit yields a
//! [`ProcessOutcome`], anything else a [`ProcessError`] variant that keeps
//! every captured line.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Output of a process that exited with code 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessOutcome {
    /// Always `0`; kept so the outcome mirrors [`ProcessFailure`].
    pub exit_code: i32,
    /// Non-empty stdout lines in the order they were written, right-trimmed.
    pub stdout: Vec<String>,
    /// Non-empty stderr lines in the order they were written, right-trimmed.
    pub stderr: Vec<String>,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
}

impl ProcessOutcome {
    /// The first stdout line, if the process printed anything.
    pub fn first_line(&self) -> Option<&str> {
        self.stdout.first().map(String::as_str)
    }
}

/// A process that ran to completion but exited non-zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessFailure {
    pub program: String,
    /// Process exit code (`-1` if killed by signal).
    pub exit_code: i32,
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
}

impl fmt::Display for ProcessFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Process {} failed with exit code {}",
            self.program, self.exit_code
        )?;
        if !self.stderr.is_empty() {
            write!(f, ": {}", self.stderr.join("\n"))?;
        }
        Ok(())
    }
}

impl std::error::Error for ProcessFailure {}

/// Errors that can occur while invoking an external process.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    /// The process could not be started (binary missing, permission denied).
    #[error("Failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The process ran but exited with a non-zero exit code.
    #[error(transparent)]
    Failure(#[from] ProcessFailure),

    /// The caller-supplied deadline expired and the process group was killed.
    #[error("Process {program} timed out after {elapsed_ms}ms")]
    Timeout { program: String, elapsed_ms: u64 },

    /// Waiting on the child failed after a successful spawn.
    #[error("I/O error while waiting for {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

impl ProcessError {
    /// Captured stderr lines, empty for variants that never ran to exit.
    pub fn stderr(&self) -> &[String] {
        match self {
            Self::Failure(failure) => &failure.stderr,
            _ => &[],
        }
    }

    /// Exit code for [`ProcessError::Failure`].
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Failure(failure) => Some(failure.exit_code),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(stderr: &[&str]) -> ProcessFailure {
        ProcessFailure {
            program: "yt-dlp".to_string(),
            exit_code: 2,
            stdout: vec![],
            stderr: stderr.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn display_failure_without_stderr() {
        let err = ProcessError::Failure(failure(&[]));
        assert_eq!(err.to_string(), "Process yt-dlp failed with exit code 2");
    }

    #[test]
    fn display_failure_includes_stderr() {
        let err = ProcessError::Failure(failure(&["ERROR: video unavailable", "retry later"]));
        assert_eq!(
            err.to_string(),
            "Process yt-dlp failed with exit code 2: ERROR: video unavailable\nretry later"
        );
        assert_eq!(err.stderr().len(), 2);
        assert_eq!(err.exit_code(), Some(2));
    }

    #[test]
    fn display_launch() {
        let err = ProcessError::Launch {
            program: "missing-tool".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
        };
        assert!(err.to_string().starts_with("Failed to launch missing-tool"));
        assert!(std::error::Error::source(&err).is_some());
        assert!(err.stderr().is_empty());
    }

    #[test]
    fn display_timeout() {
        let err = ProcessError::Timeout {
            program: "sleep".to_string(),
            elapsed_ms: 5000,
        };
        assert_eq!(err.to_string(), "Process sleep timed out after 5000ms");
        assert_eq!(err.exit_code(), None);
    }
}
