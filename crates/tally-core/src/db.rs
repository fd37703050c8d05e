//! SQLite connection setup for the key-value store.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use std::path::Path;
use std::time::Duration;

use crate::error::StorageError;

pub use sqlx::SqlitePool as DbPool;

/// Other processes may hold the file open; writers wait this long for the lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens the database at `db_path`, creating the file and its directory if
/// needed, and brings the schema up to date.
pub async fn establish_connection(db_path: &str) -> Result<DbPool, StorageError> {
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(BUSY_TIMEOUT);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}
