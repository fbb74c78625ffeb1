//! Signing key lifecycle: generation, rotation, publication and pruning.
//!
//! Keys live in the portal database. Exactly one key is active at a time;
//! retired keys stay valid for verification until their `not_after`.

use std::time::Duration;

use ed25519_dalek::VerifyingKey;
use portal_core::db::{DatabaseError, unix_timestamp};
use portal_crypto::{Jwk, Jwks, SigningKeyPair};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::error::AuthError;
use super::verifier::PublicKey;
use crate::storage::{PortalDatabase, SigningKeyRow};

/// Summary of a stored key, without secret material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyInfo {
    pub kid: String,
    pub active: bool,
    pub created_at: i64,
    pub not_after: Option<i64>,
}

/// Owns the portal's signing keys.
pub struct KeyManager {
    db: PortalDatabase,
    grace_secs: i64,
    // Serialises generation and rotation within this process; the unique
    // index arbitrates across processes.
    lock: Mutex<()>,
}

impl KeyManager {
    /// `grace` is how long a retired key stays in the JWKS after rotation.
    pub fn new(db: PortalDatabase, grace: Duration) -> Self {
        Self {
            db,
            grace_secs: i64::try_from(grace.as_secs()).unwrap_or(i64::MAX),
            lock: Mutex::new(()),
        }
    }

    /// How long a retired key stays valid, in seconds.
    pub const fn grace_secs(&self) -> i64 {
        self.grace_secs
    }

    /// The active key, generating one on first use.
    pub async fn ensure_active_key(&self) -> Result<SigningKeyPair, AuthError> {
        self.ensure_active_key_at(unix_timestamp()).await
    }

    pub async fn ensure_active_key_at(&self, now: i64) -> Result<SigningKeyPair, AuthError> {
        let _guard = self.lock.lock().await;

        if let Some(row) = self.db.get_active_key().await? {
            return pair_from_row(&row);
        }

        let pair = SigningKeyPair::generate(now);
        match self.db.insert_active_key(&row_from_pair(&pair)).await {
            Ok(()) => {
                info!(kid = %pair.kid(), "Generated signing key");
                Ok(pair)
            }
            Err(DatabaseError::Conflict(_)) => {
                debug!("Another writer created the active key first");
                self.active_key().await
            }
            Err(e) => Err(e.into()),
        }
    }

    /// The active key, or `KeyNotFound` if none has been generated.
    pub async fn active_key(&self) -> Result<SigningKeyPair, AuthError> {
        let row = self
            .db
            .get_active_key()
            .await?
            .ok_or_else(|| AuthError::KeyNotFound("no signing key has been generated".into()))?;
        pair_from_row(&row)
    }

    /// Active plus retired-but-valid keys, newest first.
    pub async fn all_keys(&self) -> Result<Vec<KeyInfo>, AuthError> {
        self.all_keys_at(unix_timestamp()).await
    }

    pub async fn all_keys_at(&self, now: i64) -> Result<Vec<KeyInfo>, AuthError> {
        Ok(self
            .db
            .list_valid_keys(now)
            .await?
            .into_iter()
            .map(|row| KeyInfo {
                kid: row.kid,
                active: row.active == 1,
                created_at: row.created_at,
                not_after: row.not_after,
            })
            .collect())
    }

    /// Public JWKS document: one entry per non-expired key.
    pub async fn jwks(&self) -> Result<Jwks, AuthError> {
        self.jwks_at(unix_timestamp()).await
    }

    pub async fn jwks_at(&self, now: i64) -> Result<Jwks, AuthError> {
        let keys = self
            .db
            .list_valid_keys(now)
            .await?
            .iter()
            .map(|row| Ok(Jwk::ed25519(&row.kid, &public_bytes(row)?)))
            .collect::<Result<Vec<_>, AuthError>>()?;
        Ok(Jwks { keys })
    }

    /// Verification keys for locally issued tokens.
    pub async fn public_keys(&self) -> Result<Vec<PublicKey>, AuthError> {
        self.public_keys_at(unix_timestamp()).await
    }

    pub async fn public_keys_at(&self, now: i64) -> Result<Vec<PublicKey>, AuthError> {
        self.db
            .list_valid_keys(now)
            .await?
            .iter()
            .map(|row| {
                let key = VerifyingKey::from_bytes(&public_bytes(row)?)
                    .map_err(|e| AuthError::SigningKey(format!("key {}: {e}", row.kid)))?;
                Ok(PublicKey {
                    kid: row.kid.clone(),
                    key,
                })
            })
            .collect()
    }

    /// Make a new key active. The previous key stays valid for the grace period.
    pub async fn rotate(&self) -> Result<SigningKeyPair, AuthError> {
        self.rotate_at(unix_timestamp()).await
    }

    pub async fn rotate_at(&self, now: i64) -> Result<SigningKeyPair, AuthError> {
        let _guard = self.lock.lock().await;

        let pair = SigningKeyPair::generate(now);
        let retired = self
            .db
            .rotate_active_key(&row_from_pair(&pair), now.saturating_add(self.grace_secs))
            .await?;
        info!(
            kid = %pair.kid(),
            retired = retired.as_deref().unwrap_or("-"),
            "Rotated signing key"
        );

        self.db.delete_expired_keys(now).await?;
        Ok(pair)
    }

    /// Delete retired keys past their `not_after`.
    pub async fn prune(&self) -> Result<u64, AuthError> {
        self.prune_at(unix_timestamp()).await
    }

    pub async fn prune_at(&self, now: i64) -> Result<u64, AuthError> {
        let removed = self.db.delete_expired_keys(now).await?;
        if removed > 0 {
            info!(removed, "Pruned expired signing keys");
        }
        Ok(removed)
    }
}

fn pair_from_row(row: &SigningKeyRow) -> Result<SigningKeyPair, AuthError> {
    SigningKeyPair::from_secret_bytes(&row.kid, row.created_at, &row.secret_key)
        .map_err(|e| AuthError::SigningKey(format!("key {}: {e}", row.kid)))
}

fn row_from_pair(pair: &SigningKeyPair) -> SigningKeyRow {
    SigningKeyRow {
        kid: pair.kid().to_string(),
        secret_key: pair.secret_bytes().to_vec(),
        public_key: pair.public_bytes().to_vec(),
        active: 1,
        created_at: pair.created_at(),
        not_after: None,
    }
}

fn public_bytes(row: &SigningKeyRow) -> Result<[u8; 32], AuthError> {
    row.public_key
        .as_slice()
        .try_into()
        .map_err(|_| AuthError::SigningKey(format!("key {} has a malformed public key", row.kid)))
}
