//! Token verification against a set of Ed25519 public keys.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use ed25519_dalek::{Signature, VerifyingKey};
use jsonwebtoken::Algorithm;
use portal_core::db::unix_timestamp;
use portal_crypto::Jwks;
use serde::Serialize;
use tracing::debug;

use super::claims::Claims;
use super::error::AuthError;
use super::keys::KeyManager;
use super::scope::Scope;

/// A verification key selected by `kid`.
#[derive(Debug, Clone)]
pub struct PublicKey {
    pub kid: String,
    pub key: VerifyingKey,
}

impl PublicKey {
    /// Usable keys from a JWKS. Entries without a `kid` or of another key
    /// type are skipped.
    pub fn from_jwks(jwks: &Jwks) -> Vec<Self> {
        jwks.keys
            .iter()
            .filter_map(|jwk| {
                let kid = jwk.kid.clone()?;
                match jwk.verifying_key() {
                    Ok(key) => Some(Self { kid, key }),
                    Err(e) => {
                        debug!(kid = %kid, error = %e, "Skipping JWK");
                        None
                    }
                }
            })
            .collect()
    }
}

/// Constraints checked after the signature.
#[derive(Debug, Clone, Default)]
pub struct ExpectedClaims {
    pub issuer: Option<String>,
    pub audience: Option<String>,
    pub scope: Vec<Scope>,
}

/// Verify `token` at the current time.
pub fn verify(
    token: &str,
    expected: &ExpectedClaims,
    keys: &[PublicKey],
    leeway: Duration,
) -> Result<Claims, AuthError> {
    verify_at(token, expected, keys, leeway, unix_timestamp())
}

/// Verify `token` as of `now` (unix seconds).
pub fn verify_at(
    token: &str,
    expected: &ExpectedClaims,
    keys: &[PublicKey],
    leeway: Duration,
    now: i64,
) -> Result<Claims, AuthError> {
    let segments: Vec<&str> = token.split('.').collect();
    let [header_b64, payload_b64, signature_b64] = segments[..] else {
        return Err(AuthError::MalformedToken(format!(
            "expected 3 segments, got {}",
            segments.len()
        )));
    };

    let header = jsonwebtoken::decode_header(token)
        .map_err(|e| AuthError::MalformedToken(format!("header: {e}")))?;
    if header.alg != Algorithm::EdDSA {
        return Err(AuthError::MalformedToken(format!(
            "unsupported algorithm {:?}",
            header.alg
        )));
    }
    let kid = header
        .kid
        .ok_or_else(|| AuthError::MalformedToken("header has no kid".into()))?;
    let key = keys
        .iter()
        .find(|k| k.kid == kid)
        .ok_or(AuthError::UnknownKey(kid))?;

    let signature_bytes = URL_SAFE_NO_PAD
        .decode(signature_b64)
        .map_err(|_| AuthError::BadSignature)?;
    let signature = Signature::from_slice(&signature_bytes).map_err(|_| AuthError::BadSignature)?;
    let signing_input = format!("{header_b64}.{payload_b64}");
    key.key
        .verify_strict(signing_input.as_bytes(), &signature)
        .map_err(|_| AuthError::BadSignature)?;

    let payload = URL_SAFE_NO_PAD
        .decode(payload_b64)
        .map_err(|e| AuthError::MalformedToken(format!("payload: {e}")))?;
    let claims: Claims = serde_json::from_slice(&payload)
        .map_err(|e| AuthError::MalformedToken(format!("claims: {e}")))?;

    let leeway = i64::try_from(leeway.as_secs()).unwrap_or(i64::MAX);
    if claims.exp.saturating_add(leeway) < now {
        return Err(AuthError::Expired);
    }
    if claims.nbf.saturating_sub(leeway) > now {
        return Err(AuthError::NotYetValid);
    }

    if let Some(issuer) = expected.issuer.as_deref() {
        if claims.iss != issuer {
            return Err(AuthError::IssuerMismatch {
                expected: issuer.to_string(),
                actual: claims.iss,
            });
        }
    }
    if let Some(aud) = expected.audience.as_deref() {
        if !claims.has_audience(aud) {
            return Err(AuthError::AudienceMismatch(aud.to_string()));
        }
    }
    if let Some(missing) = expected.scope.iter().find(|s| !claims.has_scope(**s)) {
        return Err(AuthError::MissingScope(*missing));
    }

    Ok(claims)
}

/// Decoded header and claims of an unverified token.
#[derive(Debug, Clone, Serialize)]
pub struct Inspection {
    pub header: serde_json::Value,
    pub claims: serde_json::Value,
}

/// Decode a token without checking its signature or claims.
pub fn inspect(token: &str) -> Result<Inspection, AuthError> {
    let segments: Vec<&str> = token.split('.').collect();
    let [header_b64, payload_b64, _] = segments[..] else {
        return Err(AuthError::MalformedToken(format!(
            "expected 3 segments, got {}",
            segments.len()
        )));
    };
    let decode = |segment: &str, what: &str| -> Result<serde_json::Value, AuthError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(segment)
            .map_err(|e| AuthError::MalformedToken(format!("{what}: {e}")))?;
        serde_json::from_slice(&bytes).map_err(|e| AuthError::MalformedToken(format!("{what}: {e}")))
    };
    Ok(Inspection {
        header: decode(header_b64, "header")?,
        claims: decode(payload_b64, "claims")?,
    })
}

/// Verifies tokens issued by this portal against its own key set.
#[derive(Clone)]
pub struct TokenVerifier {
    keys: Arc<KeyManager>,
    issuers: Vec<String>,
    audience: String,
    leeway: Duration,
}

impl TokenVerifier {
    /// `issuers` lists every accepted `iss`; `audience` must appear in `aud`.
    pub fn new(keys: Arc<KeyManager>, issuers: Vec<String>, audience: String) -> Self {
        Self {
            keys,
            issuers,
            audience,
            leeway: Duration::from_secs(30),
        }
    }

    #[must_use]
    pub const fn with_leeway(mut self, leeway: Duration) -> Self {
        self.leeway = leeway;
        self
    }

    /// Verify a bearer token and require `scope`.
    pub async fn authorize(&self, token: &str, scope: Scope) -> Result<Claims, AuthError> {
        let keys = self.keys.public_keys().await?;
        let expected = ExpectedClaims {
            issuer: None,
            audience: Some(self.audience.clone()),
            scope: vec![scope],
        };
        let claims = verify(token, &expected, &keys, self.leeway)?;
        if !self.issuers.iter().any(|i| *i == claims.iss) {
            return Err(AuthError::IssuerMismatch {
                expected: self.issuers.join(" | "),
                actual: claims.iss,
            });
        }
        Ok(claims)
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use jsonwebtoken::{EncodingKey, Header};
    use portal_crypto::SigningKeyPair;

    use super::*;

    const NOW: i64 = 1_772_366_400;

    fn sign(pair: &SigningKeyPair, claims: &serde_json::Value) -> String {
        let mut header = Header::new(Algorithm::EdDSA);
        header.kid = Some(pair.kid().to_string());
        let key = EncodingKey::from_ed_der(&pair.pkcs8_der());
        jsonwebtoken::encode(&header, claims, &key).unwrap()
    }

    fn claims(exp: i64, nbf: i64) -> serde_json::Value {
        serde_json::json!({
            "iss": "portal:c1",
            "sub": "node:n1",
            "aud": ["node:n1"],
            "scope": ["cluster"],
            "iat": NOW,
            "exp": exp,
            "nbf": nbf,
            "jti": "j1",
        })
    }

    fn keyset(pair: &SigningKeyPair) -> Vec<PublicKey> {
        vec![PublicKey {
            kid: pair.kid().to_string(),
            key: pair.verifying_key(),
        }]
    }

    #[test]
    fn valid_token_passes_all_checks() {
        let pair = SigningKeyPair::generate(NOW);
        let token = sign(&pair, &claims(NOW + 3600, NOW));
        let expected = ExpectedClaims {
            issuer: Some("portal:c1".into()),
            audience: Some("node:n1".into()),
            scope: vec![Scope::Cluster],
        };
        let claims = verify_at(&token, &expected, &keyset(&pair), Duration::ZERO, NOW).unwrap();
        assert_eq!(claims.sub, "node:n1");
    }

    #[test]
    fn two_segments_is_malformed() {
        let err = verify_at("a.b", &ExpectedClaims::default(), &[], Duration::ZERO, NOW)
            .unwrap_err();
        assert!(matches!(err, AuthError::MalformedToken(_)));
    }

    #[test]
    fn unknown_kid_is_reported() {
        let pair = SigningKeyPair::generate(NOW);
        let other = SigningKeyPair::generate(NOW);
        let token = sign(&pair, &claims(NOW + 60, NOW));
        let err = verify_at(
            &token,
            &ExpectedClaims::default(),
            &keyset(&other),
            Duration::ZERO,
            NOW,
        )
        .unwrap_err();
        assert!(matches!(err, AuthError::UnknownKey(ref kid) if kid == pair.kid()));
    }

    #[test]
    fn flipped_signature_byte_is_bad_signature() {
        let pair = SigningKeyPair::generate(NOW);
        let token = sign(&pair, &claims(NOW + 60, NOW));
        let (signing_input, sig_b64) = token.rsplit_once('.').unwrap();
        let mut sig = URL_SAFE_NO_PAD.decode(sig_b64).unwrap();
        sig[10] ^= 0x01;
        let tampered = format!("{signing_input}.{}", URL_SAFE_NO_PAD.encode(sig));

        let err = verify_at(
            &tampered,
            &ExpectedClaims::default(),
            &keyset(&pair),
            Duration::ZERO,
            NOW,
        )
        .unwrap_err();
        assert!(matches!(err, AuthError::BadSignature));
    }

    #[test]
    fn expiry_respects_leeway() {
        let pair = SigningKeyPair::generate(NOW);
        let token = sign(&pair, &claims(NOW - 1, NOW - 100));
        let keys = keyset(&pair);
        let expected = ExpectedClaims::default();

        let err = verify_at(&token, &expected, &keys, Duration::ZERO, NOW).unwrap_err();
        assert!(matches!(err, AuthError::Expired));
        assert!(verify_at(&token, &expected, &keys, Duration::from_secs(2), NOW).is_ok());
    }

    #[test]
    fn future_nbf_is_not_yet_valid() {
        let pair = SigningKeyPair::generate(NOW);
        let token = sign(&pair, &claims(NOW + 3600, NOW + 60));
        let err = verify_at(
            &token,
            &ExpectedClaims::default(),
            &keyset(&pair),
            Duration::from_secs(30),
            NOW,
        )
        .unwrap_err();
        assert!(matches!(err, AuthError::NotYetValid));
    }

    #[test]
    fn missing_scope_fails_despite_valid_signature() {
        let pair = SigningKeyPair::generate(NOW);
        let token = sign(&pair, &claims(NOW + 60, NOW));
        let expected = ExpectedClaims {
            scope: vec![Scope::Cluster, Scope::Nodes],
            ..Default::default()
        };
        let err = verify_at(&token, &expected, &keyset(&pair), Duration::ZERO, NOW).unwrap_err();
        assert!(matches!(err, AuthError::MissingScope(Scope::Nodes)));
    }

    #[test]
    fn issuer_and_audience_mismatch() {
        let pair = SigningKeyPair::generate(NOW);
        let token = sign(&pair, &claims(NOW + 60, NOW));
        let keys = keyset(&pair);

        let wrong_iss = ExpectedClaims {
            issuer: Some("portal:other".into()),
            ..Default::default()
        };
        assert!(matches!(
            verify_at(&token, &wrong_iss, &keys, Duration::ZERO, NOW).unwrap_err(),
            AuthError::IssuerMismatch { .. }
        ));

        let wrong_aud = ExpectedClaims {
            audience: Some("node:n2".into()),
            ..Default::default()
        };
        assert!(matches!(
            verify_at(&token, &wrong_aud, &keys, Duration::ZERO, NOW).unwrap_err(),
            AuthError::AudienceMismatch(_)
        ));
    }

    #[test]
    fn inspect_decodes_without_keys() {
        let pair = SigningKeyPair::generate(NOW);
        let token = sign(&pair, &claims(NOW - 1000, NOW - 2000));
        let inspection = inspect(&token).unwrap();
        assert_eq!(inspection.header["kid"], pair.kid());
        assert_eq!(inspection.header["alg"], "EdDSA");
        assert_eq!(inspection.claims["sub"], "node:n1");
    }

    #[test]
    fn from_jwks_skips_foreign_keys() {
        let pair = SigningKeyPair::generate(NOW);
        let mut jwks = Jwks {
            keys: vec![pair.to_jwk()],
        };
        let mut rsa = pair.to_jwk();
        rsa.kty = "RSA".into();
        rsa.kid = Some("rsa-1".into());
        jwks.keys.push(rsa);

        let keys = PublicKey::from_jwks(&jwks);
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].kid, pair.kid());
    }
}
