//! Resource names a token can be scoped to.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::AuthError;

/// A cluster resource. The set is closed; anything else is rejected on parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Cluster,
    Nodes,
    Jwks,
    Config,
    Metrics,
    Vision,
    Files,
    Users,
}

impl Scope {
    pub const ALL: [Self; 8] = [
        Self::Cluster,
        Self::Nodes,
        Self::Jwks,
        Self::Config,
        Self::Metrics,
        Self::Vision,
        Self::Files,
        Self::Users,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cluster => "cluster",
            Self::Nodes => "nodes",
            Self::Jwks => "jwks",
            Self::Config => "config",
            Self::Metrics => "metrics",
            Self::Vision => "vision",
            Self::Files => "files",
            Self::Users => "users",
        }
    }

    /// Parse a space- or comma-separated scope list. Duplicates are dropped,
    /// order is preserved.
    pub fn parse_list(input: &str) -> Result<Vec<Self>, AuthError> {
        let mut scopes = Vec::new();
        for name in input
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|s| !s.is_empty())
        {
            let scope: Self = name.parse()?;
            if !scopes.contains(&scope) {
                scopes.push(scope);
            }
        }
        Ok(scopes)
    }

    /// Space-separated form used in OAuth responses.
    pub fn join(scopes: &[Self]) -> String {
        scopes
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|scope| scope.as_str() == name)
            .ok_or_else(|| AuthError::Validation(format!("unknown scope {s:?}")))
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn every_scope_roundtrips_through_str() {
        for scope in Scope::ALL {
            assert_eq!(scope.as_str().parse::<Scope>().unwrap(), scope);
        }
    }

    #[test]
    fn unknown_scope_is_validation_error() {
        let err = "admin".parse::<Scope>().unwrap_err();
        assert!(matches!(err, AuthError::Validation(_)));
    }

    #[test]
    fn parse_list_accepts_commas_and_spaces() {
        let scopes = Scope::parse_list("cluster, nodes jwks,cluster").unwrap();
        assert_eq!(scopes, vec![Scope::Cluster, Scope::Nodes, Scope::Jwks]);
        assert_eq!(Scope::join(&scopes), "cluster nodes jwks");
    }

    #[test]
    fn serializes_lowercase() {
        let json = serde_json::to_string(&vec![Scope::Vision, Scope::Users]).unwrap();
        assert_eq!(json, r#"["vision","users"]"#);
    }
}
