//! Job discovery, scheduling, and reporting.
//!
//! Sources turn configuration into [`Job`](vidcron_core::job::Job)s,
//! [`discovery`] merges them into one deduplicated set, and the
//! [`ConcurrencyScheduler`] runs that set against the completion ledger.

pub mod discovery;
pub mod error;
pub mod report;
pub mod scheduler;
pub mod sources;

pub use discovery::{collect_jobs, discover_jobs};
pub use error::{SchedulerError, SourceError};
pub use report::{RunReport, RunSummary};
pub use scheduler::ConcurrencyScheduler;
pub use sources::{JobSource, SourceContext, SourceKind};
