//! Integration tests for the concurrency scheduler.
//!
//! Every test runs against a real, file-backed completion ledger:
//! - Completed jobs are skipped on later runs
//! - Failed jobs leave no record and run again
//! - At most `max_concurrent` actions are in flight
//! - A failing or panicking job never affects its siblings
//! - Interrupted records are verified or rerun

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use chrono::{TimeZone, Utc};
use vidcron_core::job::{Job, JobError, JobResult, JobStatus};
use vidcron_core::process::ProcessRunner;
use vidcron_db::repositories::CompletionRepo;
use vidcron_db::DbPool;
use vidcron_pipeline::{ConcurrencyScheduler, SchedulerError};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn file_ledger(dir: &tempfile::TempDir) -> DbPool {
    vidcron_db::open_ledger(dir.path().join("ledger.db"))
        .await
        .expect("open ledger")
}

/// Job whose run action bumps `calls` and succeeds.
fn counting_job(id: &str, calls: &Arc<AtomicUsize>) -> Job {
    let calls = Arc::clone(calls);
    Job::new(id, id, "test", move || {
        let calls = Arc::clone(&calls);
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            let start = Utc::now();
            Ok(JobResult::completed(start, Utc::now()))
        }
    })
}

fn failing_job(id: &str, calls: &Arc<AtomicUsize>) -> Job {
    let calls = Arc::clone(calls);
    Job::new(id, id, "test", move || {
        let calls = Arc::clone(&calls);
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(JobError::message("download refused"))
        }
    })
}

// ---------------------------------------------------------------------------
// Idempotency and retry
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_completed_jobs_are_skipped_on_second_run() {
    let dir = tempfile::tempdir().expect("temp dir");
    let pool = file_ledger(&dir).await;
    let scheduler = ConcurrencyScheduler::new(pool.clone(), 4);
    let calls = Arc::new(AtomicUsize::new(0));

    let first = scheduler
        .run(["a", "b", "c"].map(|id| counting_job(id, &calls)))
        .await;
    assert_eq!(first.count(JobStatus::Completed), 3);
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    let second = scheduler
        .run(["a", "b", "c"].map(|id| counting_job(id, &calls)))
        .await;
    assert_eq!(second.count(JobStatus::CompletedNotRun), 3);
    assert_eq!(calls.load(Ordering::SeqCst), 3, "actions must not rerun");
    assert_eq!(CompletionRepo::count(&pool).await.expect("count"), 3);
    assert!(!second.has_defects());
}

#[tokio::test]
async fn test_failed_jobs_leave_no_record_and_retry() {
    let dir = tempfile::tempdir().expect("temp dir");
    let pool = file_ledger(&dir).await;
    let scheduler = ConcurrencyScheduler::new(pool.clone(), 2);
    let calls = Arc::new(AtomicUsize::new(0));

    let first = scheduler.run([failing_job("flaky", &calls)]).await;
    assert_eq!(first.count(JobStatus::Failed), 1);
    assert!(CompletionRepo::find(&pool, "flaky").await.expect("find").is_none());

    let second = scheduler.run([counting_job("flaky", &calls)]).await;
    assert_eq!(second.count(JobStatus::Completed), 1);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(CompletionRepo::find(&pool, "flaky")
        .await
        .expect("find")
        .is_some_and(|record| record.is_complete()));
}

// ---------------------------------------------------------------------------
// Concurrency bound and isolation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_concurrency_never_exceeds_limit() {
    let dir = tempfile::tempdir().expect("temp dir");
    let pool = file_ledger(&dir).await;
    let scheduler = ConcurrencyScheduler::new(pool, 2);

    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let jobs: Vec<Job> = (0..6)
        .map(|i| {
            let active = Arc::clone(&active);
            let peak = Arc::clone(&peak);
            Job::new(format!("job-{i}"), format!("Job {i}"), "test", move || {
                let active = Arc::clone(&active);
                let peak = Arc::clone(&peak);
                async move {
                    let start = Utc::now();
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                    Ok(JobResult::completed(start, Utc::now()))
                }
            })
        })
        .collect();

    let report = scheduler.run(jobs).await;
    assert_eq!(report.count(JobStatus::Completed), 6);
    assert!(peak.load(Ordering::SeqCst) <= 2);
    assert!(peak.load(Ordering::SeqCst) >= 1);
}

#[tokio::test]
async fn test_zero_concurrency_is_treated_as_one() {
    let dir = tempfile::tempdir().expect("temp dir");
    let scheduler = ConcurrencyScheduler::new(file_ledger(&dir).await, 0);
    assert_eq!(scheduler.max_concurrent(), 1);
}

#[tokio::test]
async fn test_failure_and_panic_do_not_affect_siblings() {
    let dir = tempfile::tempdir().expect("temp dir");
    let pool = file_ledger(&dir).await;
    let scheduler = ConcurrencyScheduler::new(pool.clone(), 3);
    let calls = Arc::new(AtomicUsize::new(0));

    let panicking = Job::new("panics", "panics", "test", || async {
        if true {
            panic!("exploded mid-download");
        }
        Ok(JobResult::not_run())
    });

    let report = scheduler
        .run([
            panicking,
            failing_job("errors", &calls),
            counting_job("fine-1", &calls),
            counting_job("fine-2", &calls),
        ])
        .await;

    assert_eq!(report.jobs().len(), 4);
    assert_eq!(report.count(JobStatus::Completed), 2);
    assert_eq!(report.count(JobStatus::Failed), 2);

    let panicked = report.get("panics").and_then(Job::result).expect("result");
    assert_matches!(&panicked.error, Some(JobError::Panicked(msg)) if msg.contains("exploded"));
    assert_eq!(CompletionRepo::count(&pool).await.expect("count"), 2);
}

#[tokio::test]
async fn test_panic_while_starting_action_still_yields_failed_result() {
    let dir = tempfile::tempdir().expect("temp dir");
    let pool = file_ledger(&dir).await;
    let calls = Arc::new(AtomicUsize::new(0));

    let eager = Job::new(
        "eager-panic",
        "eager-panic",
        "test",
        || -> std::future::Ready<Result<JobResult, JobError>> {
            panic!("panicked before building the future")
        },
    );

    let report = ConcurrencyScheduler::new(pool.clone(), 2)
        .run([eager, counting_job("sibling", &calls)])
        .await;

    assert_eq!(report.jobs().len(), 2);
    assert!(!report.has_defects());
    assert_eq!(report.count(JobStatus::Completed), 1);

    let failed = report
        .get("eager-panic")
        .and_then(Job::result)
        .expect("panicking job keeps its result");
    assert_matches!(
        &failed.error,
        Some(JobError::Panicked(msg)) if msg.contains("before building")
    );
    assert!(CompletionRepo::find(&pool, "eager-panic")
        .await
        .expect("find")
        .is_none());
}

// ---------------------------------------------------------------------------
// External processes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_process_jobs_record_success_and_surface_stderr() {
    let dir = tempfile::tempdir().expect("temp dir");
    let pool = file_ledger(&dir).await;
    let scheduler = ConcurrencyScheduler::new(pool.clone(), 2);
    let runner = ProcessRunner::new();

    let ok_runner = runner.clone();
    let ok = Job::new("x", "x", "shell", move || {
        let runner = ok_runner.clone();
        async move {
            let start = Utc::now();
            let outcome = runner.run("sh", ["-c", r#"echo '{"id":"x"}'"#]).await?;
            assert_eq!(outcome.first_line(), Some(r#"{"id":"x"}"#));
            Ok(JobResult::completed(start, Utc::now()))
        }
    });

    let bad_runner = runner.clone();
    let bad = Job::new("y", "y", "shell", move || {
        let runner = bad_runner.clone();
        async move {
            let start = Utc::now();
            runner.run("sh", ["-c", "echo boom >&2; exit 1"]).await?;
            Ok(JobResult::completed(start, Utc::now()))
        }
    });

    let report = scheduler.run([ok, bad]).await;

    let x = report.get("x").and_then(Job::result).expect("x result");
    assert!(x.is_completed());
    let record = CompletionRepo::find(&pool, "x")
        .await
        .expect("find")
        .expect("x recorded");
    let end = record.end_time.expect("end time");
    assert!(record.start_time <= end);

    let y = report.get("y").and_then(Job::result).expect("y result");
    assert!(y.is_failed());
    let error = y.error.as_ref().expect("error");
    assert!(error.to_string().contains("boom"));
    assert_eq!(error.stderr(), ["boom".to_string()]);
    assert!(CompletionRepo::find(&pool, "y").await.expect("find").is_none());
}

// ---------------------------------------------------------------------------
// Interrupted records
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_verified_interrupted_job_is_backfilled_without_rerun() {
    let dir = tempfile::tempdir().expect("temp dir");
    let pool = file_ledger(&dir).await;
    let started = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
    CompletionRepo::mark_interrupted(&pool, "resumable", started)
        .await
        .expect("seed interrupted record");

    let calls = Arc::new(AtomicUsize::new(0));
    let job = counting_job("resumable", &calls).with_verify(|| async {
        let now = Utc::now();
        Ok(JobResult::completed(now, now))
    });

    let report = ConcurrencyScheduler::new(pool.clone(), 1).run([job]).await;

    assert_eq!(report.count(JobStatus::Completed), 1);
    assert_eq!(calls.load(Ordering::SeqCst), 0, "confirmed run must not repeat");
    let record = CompletionRepo::find(&pool, "resumable")
        .await
        .expect("find")
        .expect("record");
    assert!(record.is_complete());
    assert_eq!(record.start_time, started);
}

#[tokio::test]
async fn test_refuted_interrupted_job_runs_again() {
    let dir = tempfile::tempdir().expect("temp dir");
    let pool = file_ledger(&dir).await;
    CompletionRepo::mark_interrupted(&pool, "partial", Utc::now())
        .await
        .expect("seed interrupted record");

    let calls = Arc::new(AtomicUsize::new(0));
    let job = counting_job("partial", &calls).with_verify(|| async { Ok(JobResult::not_run()) });

    let report = ConcurrencyScheduler::new(pool.clone(), 1).run([job]).await;

    assert_eq!(report.count(JobStatus::Completed), 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(CompletionRepo::find(&pool, "partial")
        .await
        .expect("find")
        .is_some_and(|record| record.is_complete()));
    assert!(CompletionRepo::list_interrupted(&pool)
        .await
        .expect("list")
        .is_empty());
}

#[tokio::test]
async fn test_interrupted_job_without_verify_reruns() {
    let dir = tempfile::tempdir().expect("temp dir");
    let pool = file_ledger(&dir).await;
    CompletionRepo::mark_interrupted(&pool, "legacy", Utc::now())
        .await
        .expect("seed interrupted record");

    let calls = Arc::new(AtomicUsize::new(0));
    let report = ConcurrencyScheduler::new(pool.clone(), 1)
        .run([counting_job("legacy", &calls)])
        .await;

    assert_eq!(report.count(JobStatus::Completed), 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(CompletionRepo::count(&pool).await.expect("count"), 1);
}

// ---------------------------------------------------------------------------
// Engine defects
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_duplicate_record_is_reported_as_defect() {
    let dir = tempfile::tempdir().expect("temp dir");
    let pool = file_ledger(&dir).await;

    // The action writes its own record, so the scheduler's insert collides.
    let action_pool = pool.clone();
    let job = Job::new("racy", "racy", "test", move || {
        let pool = action_pool.clone();
        async move {
            let start = Utc::now();
            let end = Utc::now();
            CompletionRepo::record_completion(&pool, "racy", start, end)
                .await
                .map_err(|e| JobError::message(e.to_string()))?;
            Ok(JobResult::completed(start, end))
        }
    });

    let report = ConcurrencyScheduler::new(pool, 1).run([job]).await;

    assert_eq!(report.count(JobStatus::Completed), 1);
    assert_eq!(report.defects().len(), 1);
    assert_matches!(
        &report.defects()[0],
        SchedulerError::DuplicateRecord { job_id, .. } if job_id == "racy"
    );
}
