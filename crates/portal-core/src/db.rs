//! SQLite plumbing for the portal database.
//!
//! [`DatabaseError`] classifies driver failures so callers can tell a
//! uniqueness race from a lost connection; [`open_pool`] applies the
//! portal's connection settings.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use tracing::info;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);
const FILE_POOL_SIZE: u32 = 5;

/// Database errors for the portal's own storage.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// A unique constraint rejected the write.
    #[error("Conflict: {0}")]
    Conflict(String),
}

impl DatabaseError {
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<sqlx::Error> for DatabaseError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                Self::Conflict(db.message().to_string())
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                Self::Connection(e.to_string())
            }
            _ => Self::Query(e.to_string()),
        }
    }
}

/// Where a pool connects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqliteTarget {
    /// A database file, created with its parent directory if missing.
    File(PathBuf),
    /// A private in-memory database. The pool holds a single connection so
    /// every query sees the same data.
    Memory,
}

/// Open a connection pool with WAL journaling, foreign keys and a busy timeout.
pub async fn open_pool(target: &SqliteTarget) -> Result<Pool<Sqlite>, DatabaseError> {
    let (options, max_connections) = match target {
        SqliteTarget::File(path) => (file_options(path)?, FILE_POOL_SIZE),
        SqliteTarget::Memory => (SqliteConnectOptions::new().in_memory(true), 1),
    };
    let options = options
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true)
        .busy_timeout(BUSY_TIMEOUT);

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect_with(options)
        .await
        .map_err(|e| DatabaseError::Connection(e.to_string()))?;

    if let SqliteTarget::File(path) = target {
        info!(path = %path.display(), "Database opened");
    }
    Ok(pool)
}

fn file_options(path: &Path) -> Result<SqliteConnectOptions, DatabaseError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| DatabaseError::Io(e.to_string()))?;
    }
    Ok(SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true))
}

/// Current time as unix seconds.
pub fn unix_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn unix_timestamp_is_reasonable() {
        // After 2024-01-01.
        assert!(unix_timestamp() > 1_704_067_200);
    }

    #[tokio::test]
    async fn file_pool_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("portal.db");
        let pool = open_pool(&SqliteTarget::File(path.clone())).await.unwrap();
        assert!(path.exists());
        pool.close().await;
    }

    #[tokio::test]
    async fn unique_violation_is_a_conflict() {
        let pool = open_pool(&SqliteTarget::Memory).await.unwrap();
        sqlx::query("CREATE TABLE t (name TEXT PRIMARY KEY)")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO t VALUES ('a')")
            .execute(&pool)
            .await
            .unwrap();
        let err: DatabaseError = sqlx::query("INSERT INTO t VALUES ('a')")
            .execute(&pool)
            .await
            .unwrap_err()
            .into();
        assert!(matches!(err, DatabaseError::Conflict(_)), "{err:?}");
    }

    #[test]
    fn not_found_is_distinguishable() {
        assert!(DatabaseError::NotFound("Node x".into()).is_not_found());
        assert!(!DatabaseError::Query("syntax".into()).is_not_found());
    }
}
