//! The portal database handle.

use std::path::Path;

use portal_core::db::{DatabaseError, SqliteTarget, open_pool};
use sqlx::{Pool, Sqlite};
use tracing::debug;

/// Node records and signing keys. Cheap to clone.
#[derive(Debug, Clone)]
pub struct PortalDatabase {
    pool: Pool<Sqlite>,
}

impl PortalDatabase {
    /// Open or create the database file and apply migrations.
    pub async fn open(path: &Path) -> Result<Self, DatabaseError> {
        Self::connect(&SqliteTarget::File(path.to_path_buf())).await
    }

    /// A throwaway in-memory database.
    pub async fn open_in_memory() -> Result<Self, DatabaseError> {
        Self::connect(&SqliteTarget::Memory).await
    }

    async fn connect(target: &SqliteTarget) -> Result<Self, DatabaseError> {
        let pool = open_pool(target).await?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| DatabaseError::Migration(e.to_string()))?;
        debug!("Portal database migrations complete");
        Ok(Self { pool })
    }

    pub const fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}
