//! Token issuance and verification errors.

use portal_core::db::DatabaseError;

use super::scope::Scope;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("malformed token: {0}")]
    MalformedToken(String),

    #[error("unknown signing key {0:?}")]
    UnknownKey(String),

    #[error("bad signature")]
    BadSignature,

    #[error("token expired")]
    Expired,

    #[error("token not yet valid")]
    NotYetValid,

    #[error("issuer mismatch: expected {expected:?}, got {actual:?}")]
    IssuerMismatch { expected: String, actual: String },

    #[error("audience {0:?} not present")]
    AudienceMismatch(String),

    #[error("scope {0} not granted")]
    MissingScope(Scope),

    #[error("{0}")]
    Validation(String),

    #[error("no active signing key: {0}")]
    KeyNotFound(String),

    #[error("signing key unavailable: {0}")]
    SigningKey(String),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("JWKS fetch failed: {0}")]
    Fetch(String),

    #[error("storage error: {0}")]
    Storage(#[from] DatabaseError),
}

impl AuthError {
    /// Whether the token itself was rejected, as opposed to a local failure.
    pub const fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::MalformedToken(_)
                | Self::UnknownKey(_)
                | Self::BadSignature
                | Self::Expired
                | Self::NotYetValid
                | Self::IssuerMismatch { .. }
                | Self::AudienceMismatch(_)
                | Self::MissingScope(_)
        )
    }
}

impl From<AuthError> for portal_core::Error {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::Validation(msg) => Self::Validation(msg),
            AuthError::KeyNotFound(msg) => Self::NotFound(msg),
            AuthError::SigningKey(msg) | AuthError::Signing(msg) => Self::Config(msg),
            AuthError::Fetch(msg) => Self::Transient(msg),
            AuthError::Storage(db) => db.into(),
            rejected => Self::Auth(rejected.to_string()),
        }
    }
}
