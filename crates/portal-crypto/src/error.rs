//! Crypto error types.

/// Errors from cryptographic operations.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("Invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Secret hashing failed: {0}")]
    Hash(String),

    #[error("Insecure file permissions on {path}: {mode:o} (expected 600)")]
    InsecurePermissions { path: String, mode: u32 },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}
