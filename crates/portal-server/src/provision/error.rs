//! Provisioning errors.

use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error("{0}")]
    Validation(String),

    #[error("unsupported database engine {0:?}; only mysql and mariadb can be provisioned")]
    UnsupportedEngine(String),

    #[error("{what} timed out after {after:?}")]
    Timeout { what: &'static str, after: Duration },

    #[error("admin connection failed: {0}")]
    Connection(String),

    #[error("statement failed: {0}")]
    Sql(String),
}

impl ProvisionError {
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Connection(_))
    }
}

impl From<ProvisionError> for portal_core::Error {
    fn from(e: ProvisionError) -> Self {
        match e {
            ProvisionError::Validation(msg) => Self::Validation(msg),
            ProvisionError::UnsupportedEngine(engine) => Self::UnsupportedEngine(engine),
            transient @ (ProvisionError::Timeout { .. } | ProvisionError::Connection(_)) => {
                Self::Transient(transient.to_string())
            }
            ProvisionError::Sql(msg) => Self::Internal(msg),
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn timeouts_are_transient() {
        let err = ProvisionError::Timeout {
            what: "ping",
            after: Duration::from_secs(2),
        };
        assert!(err.is_transient());
        let core: portal_core::Error = err.into();
        assert!(core.is_transient());
        assert_eq!(core.to_string(), "Transient error: ping timed out after 2s");
    }

    #[test]
    fn engine_rejection_keeps_its_category() {
        let core: portal_core::Error = ProvisionError::UnsupportedEngine("postgres".into()).into();
        assert!(matches!(core, portal_core::Error::UnsupportedEngine(ref e) if e == "postgres"));
    }
}
