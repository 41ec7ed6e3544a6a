//! SQLite-backed completion ledger.
//!
//! The ledger is a single file-resident table keyed by job id. Callers
//! share a [`DbPool`]; every repository call checks out its own
//! connection, and SQLite serializes writers (WAL mode plus a busy
//! timeout), so concurrent workers never share a session.

use std::path::Path;
use std::time::Duration;

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous,
};

pub mod error;
pub mod models;
pub mod repositories;

pub use error::LedgerError;

pub type DbPool = sqlx::SqlitePool;

/// Upper bound on pooled connections; extra workers wait for a free one.
const MAX_CONNECTIONS: u32 = 8;

/// How long a writer waits for the database lock before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

/// Open (creating if missing) the ledger file at `path`.
pub async fn create_pool(path: impl AsRef<Path>) -> Result<DbPool, LedgerError> {
    let path = path.as_ref();
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(BUSY_TIMEOUT);

    let pool = SqlitePoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .connect_with(options)
        .await?;

    tracing::debug!(path = %path.display(), "Opened completion ledger");
    Ok(pool)
}

/// Apply all pending migrations embedded from `crates/db/migrations`.
pub async fn run_migrations(pool: &DbPool) -> Result<(), LedgerError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Verify the ledger answers a trivial query.
pub async fn health_check(pool: &DbPool) -> Result<(), LedgerError> {
    sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(pool)
        .await?;
    Ok(())
}

/// Open, check, and migrate the ledger in one step.
///
/// Any failure here is fatal to the run: without a usable ledger the
/// engine cannot honour its at-most-once-success guarantee.
pub async fn open_ledger(path: impl AsRef<Path>) -> Result<DbPool, LedgerError> {
    let pool = create_pool(path).await?;
    health_check(&pool).await?;
    run_migrations(&pool).await?;
    Ok(pool)
}
