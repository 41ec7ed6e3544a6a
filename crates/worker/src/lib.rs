//! The `vidcron` binary's building blocks: CLI parsing, tracing setup,
//! and the discover-then-schedule run.

pub mod app;
pub mod cli;
pub mod logging;
