//! Mirrors node accounts into `ProxySQL`'s `mysql_users` table.

use std::sync::Arc;

use portal_core::config::ProxyConfig;
use tracing::{info, instrument};

use super::admin::{AdminConnection, MySqlAdmin};
use super::error::ProvisionError;
use super::provisioner::Credentials;
use super::quote::{quote_literal, quote_user};

#[derive(Clone)]
pub struct ProxySync {
    admin: Arc<dyn AdminConnection>,
    hostgroup: u32,
}

impl std::fmt::Debug for ProxySync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxySync")
            .field("hostgroup", &self.hostgroup)
            .finish_non_exhaustive()
    }
}

impl ProxySync {
    pub fn new(admin: Arc<dyn AdminConnection>, hostgroup: u32) -> Self {
        Self { admin, hostgroup }
    }

    pub fn from_config(config: &ProxyConfig) -> Self {
        Self::new(Arc::new(MySqlAdmin::for_proxy(config)), config.hostgroup)
    }

    /// Replace the proxy account for `creds.user`, then load it to runtime
    /// and persist it. Requires freshly issued credentials.
    #[instrument(skip_all, fields(user = %creds.user))]
    pub async fn sync_user(&self, creds: &Credentials) -> Result<(), ProvisionError> {
        let password = creds.password.as_deref().ok_or_else(|| {
            ProvisionError::Validation("proxy sync needs a freshly issued password".into())
        })?;
        let user = quote_user(&creds.user)?;
        let password = quote_literal(password)?;
        let schema = quote_literal(&creds.name)?;

        self.admin
            .execute(&format!("DELETE FROM mysql_users WHERE username = {user}"))
            .await?;
        self.admin
            .execute(&format!(
                "INSERT INTO mysql_users (username, password, default_hostgroup, default_schema, active) \
                 VALUES ({user}, {password}, {}, {schema}, 1)",
                self.hostgroup
            ))
            .await?;
        self.apply().await?;
        info!(hostgroup = self.hostgroup, "Proxy user synced");
        Ok(())
    }

    /// Remove the proxy account for `user`. Missing accounts are not an error.
    #[instrument(skip(self))]
    pub async fn drop_user(&self, user: &str) -> Result<(), ProvisionError> {
        let quoted = quote_user(user)?;
        self.admin
            .execute(&format!("DELETE FROM mysql_users WHERE username = {quoted}"))
            .await?;
        self.apply().await?;
        info!("Proxy user dropped");
        Ok(())
    }

    async fn apply(&self) -> Result<(), ProvisionError> {
        self.admin.execute("LOAD MYSQL USERS TO RUNTIME").await?;
        self.admin.execute("SAVE MYSQL USERS TO DISK").await
    }
}
