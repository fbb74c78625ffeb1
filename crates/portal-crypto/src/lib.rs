//! Portal Crypto Library
//!
//! Cryptographic building blocks shared by the portal server and `portalctl`.
//!
//! ## Primitives
//!
//! - **Signing keys**: Ed25519 keypairs, PKCS#8 encoding, JWK publication
//! - **Secrets**: argon2id hashing of client secrets, constant-time comparison
//! - **Random material**: database passwords, client IDs/secrets, join tokens
//! - **Identifiers**: HMAC-SHA256 suffixes encoded as lowercase base32

pub mod error;
pub mod join_token;
pub mod names;
pub mod random;
pub mod secret;
pub mod signing;

pub use error::CryptoError;
pub use join_token::JoinTokenFile;
pub use names::hmac_suffix;
pub use random::{
    generate_client_id, generate_client_secret, generate_join_token, generate_password,
};
pub use secret::{constant_time_str_eq, hash_secret, verify_secret};
pub use signing::{Jwk, Jwks, SigningKeyPair, compute_kid};
