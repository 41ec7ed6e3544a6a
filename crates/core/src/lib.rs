//! Core domain types for the vidcron job execution engine.
//!
//! Holds everything that is pure with respect to persistence: the job
//! and result model, external process invocation, the startup binary
//! probe, and the configuration model. Ledger access lives in
//! `vidcron-db`; scheduling and sources live in `vidcron-pipeline`.

pub mod config;
pub mod error;
pub mod job;
pub mod probe;
pub mod process;
pub mod types;
