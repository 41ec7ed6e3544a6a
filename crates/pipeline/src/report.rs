//! Per-run outcome handed to reporting.
//!
//! Formatting and delivery (email, chat, ...) are left to the consumer;
//! the report only exposes `(source name, job, result)` entries, status
//! counts, and engine defects.

use serde::Serialize;
use vidcron_core::job::{Job, JobResult, JobStatus};

use crate::error::SchedulerError;

/// Jobs with their results, plus defects raised by the engine itself.
#[derive(Debug, Default)]
pub struct RunReport {
    jobs: Vec<Job>,
    defects: Vec<SchedulerError>,
}

/// Status counts for a finished run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub total: usize,
    pub completed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub defects: usize,
}

impl RunReport {
    pub(crate) fn push(&mut self, job: Job) {
        self.jobs.push(job);
    }

    pub(crate) fn push_defect(&mut self, defect: SchedulerError) {
        self.defects.push(defect);
    }

    /// `(source name, job, result)` for every job that produced a result.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &Job, &JobResult)> {
        self.jobs
            .iter()
            .filter_map(|job| job.result().map(|result| (job.source_name(), job, result)))
    }

    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    pub fn get(&self, unique_id: &str) -> Option<&Job> {
        self.jobs.iter().find(|job| job.unique_id() == unique_id)
    }

    pub fn failed(&self) -> impl Iterator<Item = &Job> {
        self.jobs
            .iter()
            .filter(|job| job.status() == JobStatus::Failed)
    }

    pub fn defects(&self) -> &[SchedulerError] {
        &self.defects
    }

    pub fn has_defects(&self) -> bool {
        !self.defects.is_empty()
    }

    pub fn count(&self, status: JobStatus) -> usize {
        self.jobs.iter().filter(|job| job.status() == status).count()
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            total: self.jobs.len(),
            completed: self.count(JobStatus::Completed),
            skipped: self.count(JobStatus::CompletedNotRun),
            failed: self.count(JobStatus::Failed),
            defects: self.defects.len(),
        }
    }

    /// Log one summary line, then one line per failed job and defect.
    pub fn log_summary(&self) {
        let summary = self.summary();
        tracing::info!(
            total = summary.total,
            completed = summary.completed,
            skipped = summary.skipped,
            failed = summary.failed,
            defects = summary.defects,
            "Run finished",
        );

        for job in self.failed() {
            let Some(error) = job.result().and_then(|result| result.error.as_ref()) else {
                continue;
            };
            tracing::error!(
                job_id = %job.unique_id(),
                source = %job.source_name(),
                display_name = %job.display_name(),
                error = %error,
                "Job failed",
            );
            for line in error.stderr() {
                tracing::error!(job_id = %job.unique_id(), stderr = %line);
            }
        }

        for defect in &self.defects {
            tracing::error!(error = %defect, "Engine defect");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
