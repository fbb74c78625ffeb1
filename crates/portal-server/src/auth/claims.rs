//! JWT claims for cluster tokens.

use serde::{Deserialize, Deserializer, Serialize};

use super::scope::Scope;

/// Default token lifetime when a non-positive TTL is requested.
pub const DEFAULT_TTL_SECS: i64 = 3600;

/// JWT claims embedded in portal-issued tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Issuer: `portal:<clusterUUID>` or the portal's public URL.
    pub iss: String,
    /// Subject, e.g. `node:<uuid>`.
    pub sub: String,
    /// Audience list. A bare string is accepted when decoding.
    #[serde(deserialize_with = "one_or_many")]
    pub aud: Vec<String>,
    #[serde(default)]
    pub scope: Vec<Scope>,
    pub iat: i64,
    pub exp: i64,
    #[serde(default)]
    pub nbf: i64,
    pub jti: String,
}

impl Claims {
    pub fn has_scope(&self, scope: Scope) -> bool {
        self.scope.contains(&scope)
    }

    pub fn has_audience(&self, aud: &str) -> bool {
        self.aud.iter().any(|a| a == aud)
    }
}

/// What to put in a token.
#[derive(Debug, Clone, Default)]
pub struct ClaimsSpec {
    pub issuer: String,
    pub subject: String,
    pub audience: Vec<String>,
    pub scope: Vec<Scope>,
    /// Lifetime in seconds; `<= 0` selects [`DEFAULT_TTL_SECS`].
    pub ttl_secs: i64,
}

impl ClaimsSpec {
    pub const fn effective_ttl(&self) -> i64 {
        if self.ttl_secs <= 0 {
            DEFAULT_TTL_SECS
        } else {
            self.ttl_secs
        }
    }
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) => vec![s],
        OneOrMany::Many(v) => v,
    })
}
