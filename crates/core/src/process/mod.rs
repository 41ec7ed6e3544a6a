//! External process invocation.
//!
//! [`ProcessRunner`] spawns a program directly (never through a shell),
//! drains its stdout/stderr line by line while it runs, and turns the exit
//! status into either a [`ProcessOutcome`] or a [`ProcessError`]. Retry
//! policy belongs to the caller.

pub mod outcome;
pub mod runner;

pub use outcome::{ProcessError, ProcessFailure, ProcessOutcome};
pub use runner::ProcessRunner;
