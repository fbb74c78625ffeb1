//! Error taxonomy shared by every portal component.
//!
//! Layer-specific errors (storage, tokens, provisioning, HTTP client) convert
//! into [`Error`], which is what the HTTP layer maps to status codes and the
//! CLI maps to process exit codes.

use thiserror::Error;

/// Result type alias using the portal [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Exit code for failures that fit no other category.
pub const EXIT_GENERIC: i32 = 1;
/// Exit code for invalid input or a host that is not configured as a portal.
pub const EXIT_VALIDATION: i32 = 2;
/// Exit code for an unknown node or key.
pub const EXIT_NOT_FOUND: i32 = 3;
/// Exit code for missing or rejected credentials.
pub const EXIT_UNAUTHORIZED: i32 = 4;
/// Exit code for a registration state conflict.
pub const EXIT_CONFLICT: i32 = 5;
/// Exit code for exhausted rate-limit retries.
pub const EXIT_RATE_LIMITED: i32 = 6;

/// Portal error categories.
#[derive(Debug, Error)]
pub enum Error {
    /// Bad input: scope, role, identifiers, URLs.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Bad or missing credentials, bad signature.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Unknown node or key.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Registration state mismatch.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Backoff exhausted while the server kept answering 429.
    #[error("Rate limited after {attempts} attempts")]
    RateLimited { attempts: u32 },

    /// Database engine that cannot be auto-provisioned.
    #[error("Unsupported database engine: {0}")]
    UnsupportedEngine(String),

    /// Timeouts and connection loss; eligible for retry.
    #[error("Transient error: {0}")]
    Transient(String),

    /// Missing or invalid portal configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Failure inside the portal that the caller cannot fix.
    #[error("Internal error: {0}")]
    Internal(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Process exit code for this error category.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Validation(_) | Self::Config(_) => EXIT_VALIDATION,
            Self::NotFound(_) => EXIT_NOT_FOUND,
            Self::Auth(_) => EXIT_UNAUTHORIZED,
            Self::Conflict(_) => EXIT_CONFLICT,
            Self::RateLimited { .. } => EXIT_RATE_LIMITED,
            Self::UnsupportedEngine(_)
            | Self::Transient(_)
            | Self::Internal(_)
            | Self::Json(_)
            | Self::Io(_) => EXIT_GENERIC,
        }
    }

    /// Short machine-readable kind, used in JSON error bodies.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Auth(_) => "unauthorized",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::RateLimited { .. } => "rate_limited",
            Self::UnsupportedEngine(_) => "unsupported_engine",
            Self::Transient(_) => "transient",
            Self::Config(_) => "config",
            Self::Internal(_) | Self::Json(_) | Self::Io(_) => "internal",
        }
    }

    /// Whether a retry at the connection or backoff layer may succeed.
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::RateLimited { .. })
    }
}

impl From<crate::db::DatabaseError> for Error {
    fn from(e: crate::db::DatabaseError) -> Self {
        use crate::db::DatabaseError;
        match e {
            DatabaseError::NotFound(what) => Self::NotFound(what),
            DatabaseError::Conflict(what) => Self::Conflict(what),
            DatabaseError::Connection(msg) => Self::Transient(msg),
            other => Self::Internal(other.to_string()),
        }
    }
}
