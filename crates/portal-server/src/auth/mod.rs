//! Cluster tokens: signing keys, issuance, verification and remote key sets.

pub mod claims;
pub mod error;
pub mod issuer;
pub mod jwks;
pub mod keys;
pub mod scope;
pub mod verifier;

pub use claims::{Claims, ClaimsSpec, DEFAULT_TTL_SECS};
pub use error::AuthError;
pub use issuer::TokenIssuer;
pub use jwks::{CacheStatus, DEFAULT_JWKS_TTL, RemoteJwks};
pub use keys::{KeyInfo, KeyManager};
pub use scope::Scope;
pub use verifier::{ExpectedClaims, Inspection, PublicKey, TokenVerifier, inspect, verify, verify_at};
