//! SQLite pool setup.
//!
//! Workers and session monitors write from many tasks at once, so the pool runs
//! in WAL mode with a busy timeout instead of failing on a locked database.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};

use crate::error_handling::DatabaseError;

const MAX_CONNECTIONS: u32 = 8;
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens (creating if needed) the database at `db_path`.
pub async fn init_db_pool_with_path(db_path: &Path) -> Result<Arc<Pool<Sqlite>>, DatabaseError> {
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if !parent.is_dir() {
            return Err(DatabaseError::FileCreationError(format!(
                "directory {} does not exist",
                parent.display()
            )));
        }
    }
    let existed = db_path.exists();

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(BUSY_TIMEOUT);
    let pool = SqlitePoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .connect_with(options)
        .await
        .map_err(|e| {
            log::error!("Failed to open database {}: {e}", db_path.display());
            DatabaseError::SqlError(e)
        })?;

    if existed {
        log::info!("Using existing database file: {}", db_path.display());
    } else {
        log::info!("Database file created: {}", db_path.display());
    }
    Ok(Arc::new(pool))
}
