//! MySQL connection pool, schema bootstrap and the sync/async bridge used by
//! the MySQL-backed stores.

use std::future::Future;
use std::time::Duration;

use sqlx::MySqlPool;
use sqlx::mysql::MySqlPoolOptions;
use tokio::runtime::Handle;

const SCHEMA: &str = include_str!("../migrations/0001_init.sql");

pub async fn connect(database_url: &str, max_connections: u32) -> Result<MySqlPool, sqlx::Error> {
    MySqlPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
}

/// Create the `events` and `read_models` tables when missing.
pub async fn ensure_schema(pool: &MySqlPool) -> Result<(), sqlx::Error> {
    for statement in SCHEMA.split(';').map(str::trim).filter(|s| !s.is_empty()) {
        sqlx::query(statement).execute(pool).await?;
    }
    tracing::info!("database schema ready");
    Ok(())
}

/// Drive `fut` to completion from synchronous code.
///
/// Inside a runtime worker the thread is handed over with `block_in_place`,
/// which requires the multi-threaded runtime. Plain threads (projection
/// workers) block on the captured handle directly.
pub(crate) fn block_on<F: Future>(handle: &Handle, fut: F) -> F::Output {
    if Handle::try_current().is_ok() {
        tokio::task::block_in_place(|| handle.block_on(fut))
    } else {
        handle.block_on(fut)
    }
}
