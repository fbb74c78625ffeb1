//! Local access to the portal's own state, for commands run on the portal host.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use portal_core::PortalConfig;
use portal_server::auth::{KeyManager, TokenIssuer};
use portal_server::provision::{CredentialProvisioner, ProxySync};
use portal_server::registry::{NodeRegistry, SqliteNodeRegistry};
use portal_server::server::Registrar;
use portal_server::storage::PortalDatabase;
use tracing::debug;

/// Configuration plus an opened portal database.
pub struct LocalPortal {
    pub config: PortalConfig,
    pub db: PortalDatabase,
}

impl LocalPortal {
    /// Validate configuration and open the database.
    ///
    /// Fails with a `Config` error (exit 2) when this host is not configured
    /// as a portal.
    pub async fn from_config(config: PortalConfig) -> portal_core::Result<Self> {
        config.validate()?;
        let path: PathBuf = config.database_path().ok_or_else(|| {
            portal_core::Error::Config("cannot determine the portal database path".into())
        })?;
        debug!(path = %path.display(), "Opening portal database");
        let db = PortalDatabase::open(&path).await?;
        Ok(Self { config, db })
    }

    pub fn keys(&self) -> Arc<KeyManager> {
        Arc::new(KeyManager::new(
            self.db.clone(),
            Duration::from_secs(self.config.key_grace_secs),
        ))
    }

    pub fn issuer(&self) -> TokenIssuer {
        TokenIssuer::new(self.keys())
    }

    pub fn registry(&self) -> Arc<dyn NodeRegistry> {
        Arc::new(SqliteNodeRegistry::new(self.db.clone()))
    }

    /// A registrar able to revoke database accounts, for `nodes rm`.
    pub fn registrar(&self) -> portal_core::Result<Registrar> {
        let mut registrar = Registrar::new(
            self.config.require_cluster_uuid()?,
            None,
            self.registry(),
        );
        if let Some(provision) = &self.config.provision {
            registrar = registrar.with_provisioner(CredentialProvisioner::from_config(provision));
        }
        if let Some(proxy) = &self.config.proxy {
            registrar = registrar.with_proxy(ProxySync::from_config(proxy));
        }
        Ok(registrar)
    }
}
