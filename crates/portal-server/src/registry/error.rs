//! Node registry errors.

use portal_core::db::DatabaseError;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("node not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Validation(String),

    #[error("storage error: {0}")]
    Storage(DatabaseError),
}

impl RegistryError {
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<DatabaseError> for RegistryError {
    fn from(e: DatabaseError) -> Self {
        match e {
            DatabaseError::NotFound(what) => Self::NotFound(what),
            DatabaseError::Conflict(what) => Self::Conflict(what),
            other => Self::Storage(other),
        }
    }
}

impl From<RegistryError> for portal_core::Error {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::NotFound(what) => Self::NotFound(what),
            RegistryError::Conflict(what) => Self::Conflict(what),
            RegistryError::Validation(msg) => Self::Validation(msg),
            RegistryError::Storage(db) => db.into(),
        }
    }
}
