//! JWT issuance with the portal's active signing key.

use std::sync::Arc;

use jsonwebtoken::{Algorithm, EncodingKey, Header};
use portal_core::db::unix_timestamp;

use super::claims::{Claims, ClaimsSpec};
use super::error::AuthError;
use super::keys::KeyManager;

/// Signs tokens with the active key from a [`KeyManager`].
#[derive(Clone)]
pub struct TokenIssuer {
    keys: Arc<KeyManager>,
}

impl TokenIssuer {
    pub const fn new(keys: Arc<KeyManager>) -> Self {
        Self { keys }
    }

    /// Issue a token now.
    pub async fn issue(&self, spec: &ClaimsSpec) -> Result<String, AuthError> {
        self.issue_at(spec, unix_timestamp()).await
    }

    /// Issue a token as of `now` (unix seconds).
    pub async fn issue_at(&self, spec: &ClaimsSpec, now: i64) -> Result<String, AuthError> {
        validate_spec(spec)?;
        let ttl = spec.effective_ttl();
        // A retired key is pruned once its grace ends; tokens must expire first.
        if ttl > self.keys.grace_secs() {
            return Err(AuthError::Validation(format!(
                "ttl of {ttl}s exceeds the signing key grace period of {}s",
                self.keys.grace_secs()
            )));
        }
        let exp = now
            .checked_add(ttl)
            .ok_or_else(|| AuthError::Validation(format!("ttl of {ttl}s is out of range")))?;

        let key = self
            .keys
            .ensure_active_key_at(now)
            .await
            .map_err(|e| AuthError::SigningKey(e.to_string()))?;

        let claims = Claims {
            iss: spec.issuer.clone(),
            sub: spec.subject.clone(),
            aud: spec.audience.clone(),
            scope: spec.scope.clone(),
            iat: now,
            exp,
            nbf: now,
            jti: uuid::Uuid::new_v4().to_string(),
        };

        let mut header = Header::new(Algorithm::EdDSA);
        header.kid = Some(key.kid().to_string());
        let encoding_key = EncodingKey::from_ed_der(&key.pkcs8_der());

        jsonwebtoken::encode(&header, &claims, &encoding_key)
            .map_err(|e| AuthError::Signing(e.to_string()))
    }
}

fn validate_spec(spec: &ClaimsSpec) -> Result<(), AuthError> {
    if spec.issuer.trim().is_empty() {
        return Err(AuthError::Validation("issuer is required".into()));
    }
    if spec.subject.trim().is_empty() {
        return Err(AuthError::Validation("subject is required".into()));
    }
    if spec.audience.is_empty() || spec.audience.iter().any(|a| a.trim().is_empty()) {
        return Err(AuthError::Validation("audience must be non-empty".into()));
    }
    if spec.scope.is_empty() {
        return Err(AuthError::Validation("at least one scope is required".into()));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::auth::scope::Scope;
    use crate::auth::verifier::{ExpectedClaims, inspect, verify_at};
    use crate::storage::PortalDatabase;

    const NOW: i64 = 1_772_366_400;

    async fn setup() -> (Arc<KeyManager>, TokenIssuer) {
        let db = PortalDatabase::open_in_memory().await.unwrap();
        let keys = Arc::new(KeyManager::new(db, Duration::from_secs(86_400)));
        (Arc::clone(&keys), TokenIssuer::new(keys))
    }

    fn spec() -> ClaimsSpec {
        ClaimsSpec {
            issuer: "portal:c1".into(),
            subject: "node:n1".into(),
            audience: vec!["node:n1".into()],
            scope: vec![Scope::Cluster],
            ttl_secs: 3600,
        }
    }

    #[tokio::test]
    async fn issued_token_verifies() {
        let (keys, issuer) = setup().await;
        let token = issuer.issue_at(&spec(), NOW).await.unwrap();

        let expected = ExpectedClaims {
            issuer: Some("portal:c1".into()),
            audience: Some("node:n1".into()),
            scope: vec![Scope::Cluster],
        };
        let public = keys.public_keys_at(NOW).await.unwrap();
        let claims = verify_at(&token, &expected, &public, Duration::ZERO, NOW).unwrap();
        assert_eq!(claims.iat, NOW);
        assert_eq!(claims.exp, NOW + 3600);
        assert_eq!(claims.nbf, NOW);
    }

    #[tokio::test]
    async fn header_carries_active_kid() {
        let (keys, issuer) = setup().await;
        let token = issuer.issue_at(&spec(), NOW).await.unwrap();
        let active = keys.active_key().await.unwrap();

        let inspection = inspect(&token).unwrap();
        assert_eq!(inspection.header["kid"], active.kid());
        assert_eq!(inspection.header["alg"], "EdDSA");
        assert_eq!(inspection.header["typ"], "JWT");
    }

    #[tokio::test]
    async fn every_token_gets_a_fresh_jti() {
        let (_, issuer) = setup().await;
        let a = inspect(&issuer.issue_at(&spec(), NOW).await.unwrap()).unwrap();
        let b = inspect(&issuer.issue_at(&spec(), NOW).await.unwrap()).unwrap();
        assert_ne!(a.claims["jti"], b.claims["jti"]);
    }

    #[tokio::test]
    async fn zero_ttl_defaults_to_one_hour() {
        let (_, issuer) = setup().await;
        let token = issuer
            .issue_at(
                &ClaimsSpec {
                    ttl_secs: 0,
                    ..spec()
                },
                NOW,
            )
            .await
            .unwrap();
        let claims = inspect(&token).unwrap().claims;
        assert_eq!(claims["exp"], NOW + 3600);
    }

    #[tokio::test]
    async fn empty_scope_is_rejected() {
        let (_, issuer) = setup().await;
        let err = issuer
            .issue_at(
                &ClaimsSpec {
                    scope: vec![],
                    ..spec()
                },
                NOW,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Validation(_)));
    }

    #[tokio::test]
    async fn ttl_beyond_key_grace_is_rejected() {
        let (keys, issuer) = setup().await;
        let week = ClaimsSpec {
            ttl_secs: 7 * 86_400,
            ..spec()
        };
        let err = issuer.issue_at(&week, NOW).await.unwrap_err();
        assert!(matches!(err, AuthError::Validation(_)), "{err:?}");
        // Rejected before a key is generated.
        assert!(keys.all_keys_at(NOW).await.unwrap().is_empty());

        let max = ClaimsSpec {
            ttl_secs: i64::MAX,
            ..spec()
        };
        let err = issuer.issue_at(&max, NOW).await.unwrap_err();
        assert!(matches!(err, AuthError::Validation(_)), "{err:?}");
    }

    #[tokio::test]
    async fn ttl_overflowing_expiry_is_rejected() {
        let db = PortalDatabase::open_in_memory().await.unwrap();
        let keys = Arc::new(KeyManager::new(db, Duration::from_secs(u64::MAX)));
        let issuer = TokenIssuer::new(keys);
        let err = issuer
            .issue_at(
                &ClaimsSpec {
                    ttl_secs: i64::MAX,
                    ..spec()
                },
                NOW,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Validation(_)), "{err:?}");
    }

    #[tokio::test]
    async fn token_at_full_grace_survives_rotation_and_prune() {
        let (keys, issuer) = setup().await;
        let token = issuer
            .issue_at(
                &ClaimsSpec {
                    ttl_secs: 86_400,
                    ..spec()
                },
                NOW,
            )
            .await
            .unwrap();
        keys.rotate_at(NOW).await.unwrap();

        let later = NOW + 86_400 - 1;
        keys.prune_at(later).await.unwrap();
        let public = keys.public_keys_at(later).await.unwrap();
        verify_at(&token, &ExpectedClaims::default(), &public, Duration::ZERO, later).unwrap();
    }

    #[tokio::test]
    async fn token_from_retired_key_still_verifies() {
        let (keys, issuer) = setup().await;
        let token = issuer.issue_at(&spec(), NOW).await.unwrap();
        keys.rotate_at(NOW + 60).await.unwrap();

        let public = keys.public_keys_at(NOW + 120).await.unwrap();
        assert_eq!(public.len(), 2);
        verify_at(
            &token,
            &ExpectedClaims::default(),
            &public,
            Duration::ZERO,
            NOW + 120,
        )
        .unwrap();
    }
}
