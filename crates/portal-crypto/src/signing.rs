//! Ed25519 signing keys and their JSON Web Key form.
//!
//! The portal signs tokens with one active Ed25519 key at a time. Each key is
//! identified by a `kid` of the form `YYYYMMDD-<16 hex>`, where the hex part
//! is the prefix of SHA-256 over the public key.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use ed25519_dalek::{SigningKey, VerifyingKey};
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, Zeroizing};

use crate::error::CryptoError;

/// Ed25519 PKCS#8 v1 prefix: SEQUENCE, version 0, OID 1.3.101.112, nested OCTET STRING.
const PKCS8_ED25519_PREFIX: [u8; 16] = [
    0x30, 0x2e, 0x02, 0x01, 0x00, 0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70, 0x04, 0x22, 0x04, 0x20,
];

/// An Ed25519 keypair with its key identifier.
pub struct SigningKeyPair {
    kid: String,
    created_at: i64,
    signing: SigningKey,
}

impl std::fmt::Debug for SigningKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKeyPair")
            .field("kid", &self.kid)
            .field("created_at", &self.created_at)
            .field("public", &hex::encode(self.public_bytes()))
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

impl SigningKeyPair {
    /// Generate a new random keypair created at `created_at` (unix seconds).
    pub fn generate(created_at: i64) -> Self {
        let mut seed = Zeroizing::new([0u8; 32]);
        OsRng.fill_bytes(&mut *seed);
        let signing = SigningKey::from_bytes(&seed);
        let kid = compute_kid(signing.verifying_key().as_bytes(), created_at);
        Self {
            kid,
            created_at,
            signing,
        }
    }

    /// Reconstruct a stored keypair from its 32-byte secret.
    pub fn from_secret_bytes(kid: &str, created_at: i64, bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != 32 {
            return Err(CryptoError::InvalidKeyLength {
                expected: 32,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(bytes);
        let signing = SigningKey::from_bytes(&arr);
        arr.zeroize();
        Ok(Self {
            kid: kid.to_string(),
            created_at,
            signing,
        })
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }

    pub const fn created_at(&self) -> i64 {
        self.created_at
    }

    pub fn public_bytes(&self) -> [u8; 32] {
        self.signing.verifying_key().to_bytes()
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing.verifying_key()
    }

    /// Raw secret bytes for persistence. Handle with care.
    pub fn secret_bytes(&self) -> Zeroizing<[u8; 32]> {
        Zeroizing::new(self.signing.to_bytes())
    }

    /// PKCS#8 v1 DER encoding of the private key, as accepted by
    /// `jsonwebtoken::EncodingKey::from_ed_der`.
    pub fn pkcs8_der(&self) -> Zeroizing<Vec<u8>> {
        let mut der = Zeroizing::new(Vec::with_capacity(48));
        der.extend_from_slice(&PKCS8_ED25519_PREFIX);
        der.extend_from_slice(&self.secret_bytes()[..]);
        der
    }

    /// Public half as a JWK.
    pub fn to_jwk(&self) -> Jwk {
        Jwk::ed25519(&self.kid, &self.public_bytes())
    }
}

/// Key identifier: creation date plus the first 16 hex chars of SHA-256(public key).
pub fn compute_kid(public: &[u8; 32], created_at: i64) -> String {
    let date = chrono::DateTime::from_timestamp(created_at, 0).unwrap_or_default();
    let digest = Sha256::digest(public);
    let mut fp = hex::encode(digest);
    fp.truncate(16);
    format!("{}-{fp}", date.format("%Y%m%d"))
}

/// A public JSON Web Key (OKP / Ed25519 only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    pub kty: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
    #[serde(rename = "use", default, skip_serializing_if = "Option::is_none")]
    pub use_: Option<String>,
}

impl Jwk {
    pub fn ed25519(kid: &str, public: &[u8; 32]) -> Self {
        Self {
            kty: "OKP".to_string(),
            crv: Some("Ed25519".to_string()),
            x: Some(URL_SAFE_NO_PAD.encode(public)),
            kid: Some(kid.to_string()),
            alg: Some("EdDSA".to_string()),
            use_: Some("sig".to_string()),
        }
    }

    /// Decode the Ed25519 verifying key this JWK carries.
    pub fn verifying_key(&self) -> Result<VerifyingKey, CryptoError> {
        if self.kty != "OKP" || self.crv.as_deref() != Some("Ed25519") {
            return Err(CryptoError::InvalidKey(format!(
                "unsupported key type {}/{}",
                self.kty,
                self.crv.as_deref().unwrap_or("-")
            )));
        }
        let x = self
            .x
            .as_deref()
            .ok_or_else(|| CryptoError::InvalidKey("missing x coordinate".to_string()))?;
        let bytes = URL_SAFE_NO_PAD
            .decode(x)
            .map_err(|e| CryptoError::InvalidKey(format!("invalid base64url: {e}")))?;
        let arr: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| CryptoError::InvalidKeyLength {
                expected: 32,
                actual: bytes.len(),
            })?;
        VerifyingKey::from_bytes(&arr).map_err(|e| CryptoError::InvalidKey(e.to_string()))
    }
}

/// A JSON Web Key Set document: `{"keys": [...]}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwks {
    pub keys: Vec<Jwk>,
}

impl Jwks {
    pub fn find(&self, kid: &str) -> Option<&Jwk> {
        self.keys.iter().find(|k| k.kid.as_deref() == Some(kid))
    }

    pub fn key_ids(&self) -> Vec<String> {
        self.keys.iter().filter_map(|k| k.kid.clone()).collect()
    }
}
