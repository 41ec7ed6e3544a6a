//! Bounded-concurrency job scheduler.
//!
//! Each job runs the same strictly sequential steps while holding one
//! concurrency slot:
//! 1. Look up the job's completion record.
//! 2. A completed record means the job is skipped (`CompletedNotRun`).
//! 3. An interrupted record with a verify action is verified first.
//! 4. Otherwise the run action is invoked.
//! 5. Errors and panics from either action become a `Failed` result.
//! 6. A `Completed` result is written to the ledger; `Failed` writes nothing.
//!
//! The slot is held across ledger I/O too, so at most `max_concurrent`
//! jobs touch the ledger or run actions at any instant. Jobs have no
//! ordering guarantees relative to each other.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::Utc;
use futures::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::Instrument;
use vidcron_core::job::{ActionFuture, Job, JobError, JobResult, JobStatus};
use vidcron_core::types::Timestamp;
use vidcron_db::models::completion_record::CompletionRecord;
use vidcron_db::repositories::CompletionRepo;
use vidcron_db::{DbPool, LedgerError};

use crate::error::SchedulerError;
use crate::report::RunReport;

/// Runs jobs against the completion ledger, at most `max_concurrent` at a time.
pub struct ConcurrencyScheduler {
    pool: DbPool,
    max_concurrent: usize,
}

impl ConcurrencyScheduler {
    /// Create a scheduler. A `max_concurrent` of 0 is treated as 1.
    pub fn new(pool: DbPool, max_concurrent: usize) -> Self {
        Self {
            pool,
            max_concurrent: max_concurrent.max(1),
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Run every job to a terminal result.
    ///
    /// Never short-circuits: one job's failure or panic does not affect
    /// its siblings. Returns once every job has a result.
    pub async fn run(&self, jobs: impl IntoIterator<Item = Job>) -> RunReport {
        let limiter = Arc::new(Semaphore::new(self.max_concurrent));
        let mut workers = JoinSet::new();
        let mut report = RunReport::default();

        tracing::info!(max_concurrent = self.max_concurrent, "Running jobs");

        for job in jobs {
            // Acquire before spawning so no more than `max_concurrent`
            // workers exist at once.
            let permit = match Arc::clone(&limiter).acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    report.push_defect(SchedulerError::WorkerFailed(e.to_string()));
                    break;
                }
            };
            let pool = self.pool.clone();
            let span = tracing::info_span!(
                "job",
                job_id = %job.unique_id(),
                source = %job.source_name(),
                display_name = %job.display_name(),
            );

            workers.spawn(
                async move {
                    let outcome = execute_job(&pool, job).await;
                    drop(permit);
                    outcome
                }
                .instrument(span),
            );

            // Collect whatever already finished to keep memory flat.
            while let Some(joined) = workers.try_join_next() {
                collect(&mut report, joined);
            }
        }

        while let Some(joined) = workers.join_next().await {
            collect(&mut report, joined);
        }

        report
    }
}

/// Result of one worker: the job with its result set, plus any defect.
struct JobOutcome {
    job: Job,
    defect: Option<SchedulerError>,
}

fn collect(report: &mut RunReport, joined: Result<JobOutcome, tokio::task::JoinError>) {
    match joined {
        Ok(outcome) => {
            if let Some(defect) = outcome.defect {
                report.push_defect(defect);
            }
            report.push(outcome.job);
        }
        Err(e) => {
            tracing::error!(error = %e, "Scheduler worker task failed");
            report.push_defect(SchedulerError::WorkerFailed(e.to_string()));
        }
    }
}

/// Run steps 1-6 for `job` and fill its result slot.
///
/// A panic anywhere in the sequence, not only inside an action, still
/// leaves the job with a `Failed` result.
async fn execute_job(pool: &DbPool, mut job: Job) -> JobOutcome {
    let (result, defect) = match AssertUnwindSafe(job_steps(pool, &job)).catch_unwind().await {
        Ok(outcome) => outcome,
        Err(panic) => {
            let err = JobError::Panicked(panic_message(&*panic));
            (JobResult::failed(Utc::now(), err), None)
        }
    };

    match result.status {
        JobStatus::Failed => {
            let error = result
                .error
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default();
            tracing::error!(error = %error, "Job failed");
        }
        status => tracing::info!(status = %status, "Job finished"),
    }

    if job.set_result(result).is_err() {
        tracing::warn!("Job result was already set, keeping the first one");
    }
    JobOutcome { job, defect }
}

/// Steps 1-6 for a single job.
async fn job_steps(pool: &DbPool, job: &Job) -> (JobResult, Option<SchedulerError>) {
    match CompletionRepo::find(pool, job.unique_id()).await {
        Err(e) => {
            let err = JobError::message(format!("Ledger lookup failed: {e}"));
            (JobResult::failed(Utc::now(), err), None)
        }
        Ok(Some(record)) if record.is_complete() => {
            tracing::debug!("Job already completed, skipping");
            (JobResult::completed_not_run(), None)
        }
        Ok(Some(record)) => resume_interrupted(pool, job, &record).await,
        Ok(None) => {
            tracing::info!("Running job");
            let result = guarded(|| job.run_action()).await;
            persist(pool, job, result, None).await
        }
    }
}

/// An earlier attempt started but never confirmed completion.
///
/// With a verify action, a confirmed attempt only backfills the end
/// time. A refuted attempt (or no verify action) runs the job again.
async fn resume_interrupted(
    pool: &DbPool,
    job: &Job,
    record: &CompletionRecord,
) -> (JobResult, Option<SchedulerError>) {
    if let Some(verify) = job.verifier() {
        tracing::info!(started_at = %record.start_time, "Verifying interrupted job");
        let start = Utc::now();
        match invoke(|| verify()).await {
            Ok(verified) if verified.status == JobStatus::Completed => {
                tracing::info!("Prior attempt confirmed");
                let result = normalize(start, Ok(verified));
                return persist(pool, job, result, Some(record)).await;
            }
            Ok(verified) => {
                tracing::info!(status = %verified.status, "Prior attempt refuted, running job again");
            }
            Err(err) => return (JobResult::failed(start, err), None),
        }
    } else {
        tracing::info!(started_at = %record.start_time, "Rerunning interrupted job");
    }

    let result = guarded(|| job.run_action()).await;
    persist(pool, job, result, Some(record)).await
}

/// Invoke an action inside the catch boundary and normalize its result.
async fn guarded(start_action: impl FnOnce() -> ActionFuture) -> JobResult {
    let start = Utc::now();
    normalize(start, invoke(start_action).await)
}

/// Start and await an action, turning a panic into [`JobError::Panicked`].
///
/// Starting the action calls user code too, so it sits inside the
/// boundary along with the returned future.
async fn invoke(start_action: impl FnOnce() -> ActionFuture) -> Result<JobResult, JobError> {
    let action = match std::panic::catch_unwind(AssertUnwindSafe(start_action)) {
        Ok(action) => action,
        Err(panic) => return Err(JobError::Panicked(panic_message(&*panic))),
    };
    match AssertUnwindSafe(action).catch_unwind().await {
        Ok(outcome) => outcome,
        Err(panic) => Err(JobError::Panicked(panic_message(&*panic))),
    }
}

/// Make an action's result terminal and internally consistent.
fn normalize(start: Timestamp, outcome: Result<JobResult, JobError>) -> JobResult {
    let result = match outcome {
        Ok(result) => result,
        Err(err) => return JobResult::failed(start, err),
    };

    match result.status {
        JobStatus::Completed => JobResult::completed(
            result.start_time.unwrap_or(start),
            result.end_time.unwrap_or_else(Utc::now),
        ),
        JobStatus::Failed => JobResult::failed(
            result.start_time.unwrap_or(start),
            result
                .error
                .unwrap_or_else(|| JobError::message("Job reported failure without an error")),
        ),
        JobStatus::CompletedNotRun => result,
        JobStatus::NotRun => JobResult::failed(
            start,
            JobError::message("Job action returned without running"),
        ),
    }
}

/// Step 6: write the ledger only for completed results.
///
/// A completed job with an interrupted record gets its end time
/// backfilled; otherwise a fresh record is inserted.
async fn persist(
    pool: &DbPool,
    job: &Job,
    result: JobResult,
    interrupted: Option<&CompletionRecord>,
) -> (JobResult, Option<SchedulerError>) {
    let (Some(start), Some(end), JobStatus::Completed) =
        (result.start_time, result.end_time, result.status)
    else {
        return (result, None);
    };

    tracing::debug!("Storing completion record");
    let written = match interrupted {
        Some(_) => CompletionRepo::mark_finished(pool, job.unique_id(), end)
            .await
            .map(|_| ()),
        None => CompletionRepo::record_completion(pool, job.unique_id(), start, end)
            .await
            .map(|_| ()),
    };

    match written {
        Ok(()) => (result, None),
        Err(e @ LedgerError::DuplicateRecord { .. }) => {
            tracing::error!(error = %e, "Completion record already existed");
            let defect = SchedulerError::DuplicateRecord {
                job_id: job.unique_id().to_string(),
                source: e,
            };
            (result, Some(defect))
        }
        Err(e) => {
            // Not recorded means the job must run again next time.
            let err = JobError::message(format!("Job completed but could not be recorded: {e}"));
            (JobResult::failed(start, err), None)
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_message_extracts_str_and_string() {
        let boxed: Box<dyn std::any::Any + Send> = Box::new("static message");
        assert_eq!(panic_message(&*boxed), "static message");

        let boxed: Box<dyn std::any::Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(&*boxed), "owned");

        let boxed: Box<dyn std::any::Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(&*boxed), "unknown panic");
    }

    #[tokio::test]
    async fn guarded_converts_error_to_failed() {
        let result = guarded(|| async { Err::<JobResult, _>(JobError::message("boom")) }.boxed()).await;
        assert!(result.is_failed());
        assert!(result.start_time.is_some());
        assert_eq!(result.error.map(|e| e.to_string()).as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn guarded_catches_panics() {
        let result = guarded(|| {
            async {
                if true {
                    panic!("action exploded");
                }
                Ok(JobResult::not_run())
            }
            .boxed()
        })
        .await;
        assert!(result.is_failed());
        assert!(result
            .error
            .map(|e| e.to_string())
            .is_some_and(|msg| msg.contains("action exploded")));
    }

    #[tokio::test]
    async fn guarded_catches_panic_while_starting_action() {
        let result = guarded(|| -> ActionFuture { panic!("failed before returning a future") }).await;
        assert!(result.is_failed());
        assert!(result.start_time.is_some());
        assert!(matches!(
            result.error,
            Some(JobError::Panicked(msg)) if msg.contains("before returning")
        ));
    }

    #[tokio::test]
    async fn guarded_fills_missing_times_for_completed() {
        let result = guarded(|| {
            async {
                Ok(JobResult {
                    status: JobStatus::Completed,
                    start_time: None,
                    end_time: None,
                    error: None,
                })
            }
            .boxed()
        })
        .await;
        assert!(result.is_completed());
        assert!(result.start_time.unwrap() <= result.end_time.unwrap());
    }

    #[tokio::test]
    async fn guarded_rejects_not_run() {
        let result = guarded(|| async { Ok(JobResult::not_run()) }.boxed()).await;
        assert!(result.is_failed());
    }
}
