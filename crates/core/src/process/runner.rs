//! Spawn + drain + wait for a single external command.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

use super::outcome::{ProcessError, ProcessFailure, ProcessOutcome};

/// Maximum number of lines retained per stream.
///
/// Lines past the limit are still read (so the child never blocks on a
/// full pipe) but are not kept.
const MAX_CAPTURED_LINES: usize = 1_000_000;

/// Runs external commands and captures their output line by line.
///
/// Cheap to clone; sources keep one configured with the run's deadline
/// and share it across every job they produce.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    timeout: Option<Duration>,
    working_directory: Option<PathBuf>,
    env_vars: Vec<(String, String)>,
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Kill the process group and fail with [`ProcessError::Timeout`] once
    /// `timeout` has elapsed. `None` waits indefinitely.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.push((key.into(), value.into()));
        self
    }

    /// Directory the child runs in; `None` inherits the caller's.
    pub fn working_directory(&self) -> Option<&Path> {
        self.working_directory.as_deref()
    }

    /// Run `program` with `args` and wait for it to exit.
    ///
    /// Both output streams are read concurrently with the wait, so a
    /// process producing unbounded output cannot stall on a full pipe.
    pub async fn run<I, S>(&self, program: &str, args: I) -> Result<ProcessOutcome, ProcessError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let args: Vec<OsString> = args
            .into_iter()
            .map(|arg| arg.as_ref().to_os_string())
            .collect();

        let mut cmd = Command::new(program);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Own process group so a timeout can take down grandchildren too.
        #[cfg(unix)]
        cmd.process_group(0);

        for (key, value) in &self.env_vars {
            cmd.env(key, value);
        }
        if let Some(dir) = &self.working_directory {
            cmd.current_dir(dir);
        }

        tracing::debug!(program, args = ?args, "Launching process");
        let start = Instant::now();

        let mut child = cmd.spawn().map_err(|source| ProcessError::Launch {
            program: program.to_string(),
            source,
        })?;
        // Taken now: `id()` goes away once the child is reaped, but the
        // group outlives it while any grandchild is alive.
        let group = child.id();

        let mut stdout_task = tokio::spawn(collect_lines(child.stdout.take()));
        let mut stderr_task = tokio::spawn(collect_lines(child.stderr.take()));

        // A grandchild can keep the pipes open after the child exits, so the
        // deadline covers draining as well as the wait.
        let finished = async {
            let status = child.wait().await;
            let stdout = join_lines(&mut stdout_task, "stdout").await;
            let stderr = join_lines(&mut stderr_task, "stderr").await;
            (status, stdout, stderr)
        };
        let finished = match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, finished).await.ok(),
            None => Some(finished.await),
        };

        let Some((waited, stdout, stderr)) = finished else {
            terminate(&mut child, group).await;
            stdout_task.abort();
            stderr_task.abort();
            let elapsed_ms = start.elapsed().as_millis() as u64;
            tracing::warn!(program, elapsed_ms, "Process timed out, killed");
            return Err(ProcessError::Timeout {
                program: program.to_string(),
                elapsed_ms,
            });
        };

        let status = waited.map_err(|source| ProcessError::Io {
            program: program.to_string(),
            source,
        })?;

        let exit_code = status.code().unwrap_or(-1);
        let duration_ms = start.elapsed().as_millis() as u64;

        tracing::debug!(
            program,
            exit_code,
            duration_ms,
            stdout_lines = stdout.len(),
            stderr_lines = stderr.len(),
            "Process exited",
        );

        if exit_code == 0 {
            Ok(ProcessOutcome {
                exit_code,
                stdout,
                stderr,
                duration_ms,
            })
        } else {
            Err(ProcessError::Failure(ProcessFailure {
                program: program.to_string(),
                exit_code,
                stdout,
                stderr,
            }))
        }
    }
}

/// Kill the process group `group`, then reap the child.
async fn terminate(child: &mut Child, group: Option<u32>) {
    #[cfg(unix)]
    if let Some(pgid) = group {
        // SAFETY: `killpg` only sends a signal. The child was spawned with
        // `process_group(0)`, so its pid is also its process group id.
        unsafe {
            libc::killpg(pgid as libc::pid_t, libc::SIGKILL);
        }
    }
    #[cfg(not(unix))]
    let _ = group;
    let _ = child.start_kill();
    let _ = child.wait().await;
}

/// Await a reader task. A reader that panicked or was cancelled yields no
/// lines.
async fn join_lines(task: &mut JoinHandle<Vec<String>>, stream: &'static str) -> Vec<String> {
    match task.await {
        Ok(lines) => lines,
        Err(e) => {
            tracing::warn!(stream, error = %e, "Process output reader failed, output discarded");
            Vec::new()
        }
    }
}

/// Read a stream to EOF, keeping right-trimmed non-empty lines.
///
/// Invalid UTF-8 is replaced rather than aborting the read.
async fn collect_lines<R: AsyncRead + Unpin>(handle: Option<R>) -> Vec<String> {
    let mut lines = Vec::new();
    let Some(handle) = handle else {
        return lines;
    };

    let mut reader = BufReader::new(handle);
    let mut buf = Vec::new();
    let mut dropped = 0usize;

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let decoded = String::from_utf8_lossy(&buf);
                let line = decoded.trim_end();
                if line.is_empty() {
                    continue;
                }
                if lines.len() < MAX_CAPTURED_LINES {
                    lines.push(line.to_string());
                } else {
                    dropped += 1;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed reading process output");
                break;
            }
        }
    }

    if dropped > 0 {
        tracing::warn!(dropped, "Process output exceeded capture limit");
    }
    lines
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
