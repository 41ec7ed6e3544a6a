//! Job and result model.
//!
//! A [`Job`] is an immutable description of one unit of work (stable id,
//! labels, and the actions that perform or verify it) plus a result slot
//! that the scheduler fills exactly once. Jobs compare and hash by their
//! unique id only, so a [`JobSet`] deduplicates discovery output.

use std::borrow::Borrow;
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};

use crate::process::ProcessError;
use crate::types::{JobId, Timestamp};

/// Future returned by a job's run or verify action.
pub type ActionFuture = BoxFuture<'static, Result<JobResult, JobError>>;

/// Zero-argument operation producing a [`JobResult`].
pub type JobAction = Arc<dyn Fn() -> ActionFuture + Send + Sync>;

/// Terminal (and initial) states of a job's result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Not executed yet.
    NotRun,
    /// The action ran (or verification confirmed a prior run) and succeeded.
    Completed,
    /// The ledger already held a completed record; the action was skipped.
    CompletedNotRun,
    /// The action failed, returned an error, or panicked.
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotRun => "not_run",
            Self::Completed => "completed",
            Self::CompletedNotRun => "completed_not_run",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors a job's action may fail with.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error("Malformed tool output: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Job panicked: {0}")]
    Panicked(String),

    #[error("{0}")]
    Message(String),
}

impl JobError {
    pub fn message(msg: impl Into<String>) -> Self {
        Self::Message(msg.into())
    }

    /// Captured stderr when the failure came from an external process.
    pub fn stderr(&self) -> &[String] {
        match self {
            Self::Process(err) => err.stderr(),
            _ => &[],
        }
    }
}

/// Outcome of executing (or skipping) one job.
#[derive(Debug)]
pub struct JobResult {
    pub status: JobStatus,
    /// When the action started; absent when nothing ran.
    pub start_time: Option<Timestamp>,
    /// Present only when `status` is [`JobStatus::Completed`].
    pub end_time: Option<Timestamp>,
    /// Present only when `status` is [`JobStatus::Failed`].
    pub error: Option<JobError>,
}

impl JobResult {
    pub fn not_run() -> Self {
        Self {
            status: JobStatus::NotRun,
            start_time: None,
            end_time: None,
            error: None,
        }
    }

    pub fn completed(start_time: Timestamp, end_time: Timestamp) -> Self {
        Self {
            status: JobStatus::Completed,
            start_time: Some(start_time),
            end_time: Some(end_time),
            error: None,
        }
    }

    pub fn completed_not_run() -> Self {
        Self {
            status: JobStatus::CompletedNotRun,
            start_time: None,
            end_time: None,
            error: None,
        }
    }

    pub fn failed(start_time: Timestamp, error: impl Into<JobError>) -> Self {
        Self {
            status: JobStatus::Failed,
            start_time: Some(start_time),
            end_time: None,
            error: Some(error.into()),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == JobStatus::Completed
    }

    pub fn is_failed(&self) -> bool {
        self.status == JobStatus::Failed
    }
}

/// One schedulable unit of work.
pub struct Job {
    unique_id: JobId,
    display_name: String,
    source_name: String,
    run: JobAction,
    verify: Option<JobAction>,
    result: Option<JobResult>,
}

impl Job {
    /// Create a job whose run action is `run`.
    ///
    /// `unique_id` must be stable across runs for the same logical item;
    /// it is the completion ledger's primary key.
    pub fn new<F, Fut>(
        unique_id: impl Into<JobId>,
        display_name: impl Into<String>,
        source_name: impl Into<String>,
        run: F,
    ) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<JobResult, JobError>> + Send + 'static,
    {
        Self {
            unique_id: unique_id.into(),
            display_name: display_name.into(),
            source_name: source_name.into(),
            run: Arc::new(move || run().boxed()),
            verify: None,
            result: None,
        }
    }

    /// Attach an action that confirms or refutes a prior, unfinished run.
    pub fn with_verify<F, Fut>(mut self, verify: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<JobResult, JobError>> + Send + 'static,
    {
        self.verify = Some(Arc::new(move || verify().boxed()));
        self
    }

    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    /// Start the run action.
    pub fn run_action(&self) -> ActionFuture {
        (self.run)()
    }

    /// The verify action, if one is attached. Calling it starts a verify pass.
    pub fn verifier(&self) -> Option<&JobAction> {
        self.verify.as_ref()
    }

    pub fn result(&self) -> Option<&JobResult> {
        self.result.as_ref()
    }

    pub fn status(&self) -> JobStatus {
        self.result
            .as_ref()
            .map_or(JobStatus::NotRun, |result| result.status)
    }

    /// Fill the result slot. A second call is rejected and hands the
    /// rejected result back.
    pub fn set_result(&mut self, result: JobResult) -> Result<(), JobResult> {
        if self.result.is_some() {
            return Err(result);
        }
        self.result = Some(result);
        Ok(())
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("unique_id", &self.unique_id)
            .field("display_name", &self.display_name)
            .field("source_name", &self.source_name)
            .field("has_verify", &self.verify.is_some())
            .field("result", &self.result)
            .finish()
    }
}

impl PartialEq for Job {
    fn eq(&self, other: &Self) -> bool {
        self.unique_id == other.unique_id
    }
}

impl Eq for Job {}

impl Hash for Job {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.unique_id.hash(state);
    }
}

impl Borrow<str> for Job {
    fn borrow(&self) -> &str {
        &self.unique_id
    }
}

/// Jobs keyed by unique id. The first job inserted for an id wins.
#[derive(Debug, Default)]
pub struct JobSet {
    jobs: HashSet<Job>,
}

impl JobSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `job`, returning `false` if a job with the same id exists.
    pub fn insert(&mut self, job: Job) -> bool {
        self.jobs.insert(job)
    }

    pub fn contains(&self, unique_id: &str) -> bool {
        self.jobs.contains(unique_id)
    }

    pub fn get(&self, unique_id: &str) -> Option<&Job> {
        self.jobs.get(unique_id)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Job> {
        self.jobs.iter()
    }
}

impl Extend<Job> for JobSet {
    fn extend<T: IntoIterator<Item = Job>>(&mut self, iter: T) {
        for job in iter {
            self.insert(job);
        }
    }
}

impl FromIterator<Job> for JobSet {
    fn from_iter<T: IntoIterator<Item = Job>>(iter: T) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}

impl IntoIterator for JobSet {
    type Item = Job;
    type IntoIter = std::collections::hash_set::IntoIter<Job>;

    fn into_iter(self) -> Self::IntoIter {
        self.jobs.into_iter()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
