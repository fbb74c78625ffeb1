//! Configuration resolution for the portal.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Global config (`$XDG_CONFIG_HOME/portal/portal.json`)
//! 3. Explicit config file (`--config`)
//! 4. Environment variables (`PORTAL_*`)
//! 5. CLI arguments (highest priority, applied by the binaries)

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Default lifetime of issued access tokens.
pub const DEFAULT_TOKEN_TTL_SECS: u64 = 3600;
/// Default time a retired signing key stays valid for verification.
pub const DEFAULT_KEY_GRACE_SECS: u64 = 24 * 60 * 60;

/// Complete portal configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalConfig {
    /// Cluster identifier; required on the portal.
    pub cluster_uuid: Option<String>,
    /// Public URL of the portal, used as an alternative token issuer.
    pub portal_url: Option<String>,
    pub listen_addr: SocketAddr,
    pub database_path: Option<PathBuf>,
    /// Shared bootstrap secret. Takes precedence over `join_token_path`.
    pub join_token: Option<String>,
    pub join_token_path: Option<PathBuf>,
    pub token_ttl_secs: u64,
    pub key_grace_secs: u64,
    /// Registration requests accepted per minute before answering 429.
    pub registration_rate_limit: u32,
    pub provision: Option<ProvisionConfig>,
    pub proxy: Option<ProxyConfig>,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            cluster_uuid: None,
            portal_url: None,
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 2342)),
            database_path: None,
            join_token: None,
            join_token_path: None,
            token_ttl_secs: DEFAULT_TOKEN_TTL_SECS,
            key_grace_secs: DEFAULT_KEY_GRACE_SECS,
            registration_rate_limit: 60,
            provision: None,
            proxy: None,
        }
    }
}

/// Admin connection used to provision per-node schemas and users.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisionConfig {
    /// `mysql` or `mariadb`; anything else is rejected at provisioning time.
    pub driver: String,
    pub host: String,
    pub port: u16,
    pub admin_user: String,
    pub admin_password: String,
    pub connect_timeout_secs: u64,
    pub exec_timeout_secs: u64,
    pub ping_timeout_secs: u64,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            driver: "mysql".to_string(),
            host: "127.0.0.1".to_string(),
            port: 3306,
            admin_user: "root".to_string(),
            admin_password: String::new(),
            connect_timeout_secs: 5,
            exec_timeout_secs: 10,
            ping_timeout_secs: 2,
        }
    }
}

impl std::fmt::Debug for ProvisionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProvisionConfig")
            .field("driver", &self.driver)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("admin_user", &self.admin_user)
            .field("admin_password", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

/// `ProxySQL` admin interface that mirrors node accounts.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    pub host: String,
    pub port: u16,
    pub admin_user: String,
    pub admin_password: String,
    /// Hostgroup new users are routed to.
    pub hostgroup: u32,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6032,
            admin_user: "admin".to_string(),
            admin_password: String::new(),
            hostgroup: 0,
        }
    }
}

impl std::fmt::Debug for ProxyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("admin_user", &self.admin_user)
            .field("admin_password", &"[REDACTED]")
            .field("hostgroup", &self.hostgroup)
            .finish()
    }
}

impl PortalConfig {
    /// The cluster UUID, or a `Config` error when this host is not a portal.
    pub fn require_cluster_uuid(&self) -> Result<&str> {
        self.cluster_uuid
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::Config("cluster UUID is not configured".to_string()))
    }

    /// Token issuer for this portal: `portal:<clusterUUID>`.
    pub fn issuer(&self) -> Result<String> {
        Ok(format!("portal:{}", self.require_cluster_uuid()?))
    }

    /// Issuers accepted when verifying this portal's own tokens.
    pub fn accepted_issuers(&self) -> Result<Vec<String>> {
        let mut issuers = vec![self.issuer()?];
        if let Some(url) = self.portal_url.as_deref().filter(|u| !u.is_empty()) {
            issuers.push(url.trim_end_matches('/').to_string());
        }
        Ok(issuers)
    }

    /// Check the settings a portal cannot run without.
    pub fn validate(&self) -> Result<()> {
        let cluster_uuid = self.require_cluster_uuid()?;
        uuid::Uuid::parse_str(cluster_uuid)
            .map_err(|e| Error::Config(format!("cluster UUID {cluster_uuid:?} is invalid: {e}")))?;
        if self.token_ttl_secs == 0 {
            return Err(Error::Config("token_ttl_secs must be positive".to_string()));
        }
        if self.key_grace_secs < self.token_ttl_secs {
            return Err(Error::Config(
                "key_grace_secs must be at least token_ttl_secs".to_string(),
            ));
        }
        if let Some(p) = &self.provision {
            if p.exec_timeout_secs == 0 || p.ping_timeout_secs == 0 || p.connect_timeout_secs == 0 {
                return Err(Error::Config("provision timeouts must be positive".to_string()));
            }
        }
        Ok(())
    }

    /// Database path, falling back to `<config dir>/portal/portal.db`.
    pub fn database_path(&self) -> Option<PathBuf> {
        self.database_path
            .clone()
            .or_else(|| config_dir().map(|d| d.join("portal.db")))
    }
}

/// Load configuration with hierarchical resolution.
pub fn load_config(explicit: Option<&Path>) -> Result<PortalConfig> {
    let mut config = PortalConfig::default();

    if let Some(global_path) = global_config_path() {
        if global_path.exists() {
            let global = load_config_file(&global_path)?;
            merge_config(&mut config, global);
        }
    }

    if let Some(path) = explicit {
        let file = load_config_file(path)?;
        merge_config(&mut config, file);
    }

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());

    Ok(config)
}

/// Directory holding the portal's global config and default database.
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("portal"))
}

/// Path of the global config file.
pub fn global_config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("portal.json"))
}

fn load_config_file(path: &Path) -> Result<PortalConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })
}

fn merge_config(base: &mut PortalConfig, overlay: PortalConfig) {
    let defaults = PortalConfig::default();

    if overlay.cluster_uuid.is_some() {
        base.cluster_uuid = overlay.cluster_uuid;
    }
    if overlay.portal_url.is_some() {
        base.portal_url = overlay.portal_url;
    }
    if overlay.database_path.is_some() {
        base.database_path = overlay.database_path;
    }
    if overlay.join_token.is_some() {
        base.join_token = overlay.join_token;
    }
    if overlay.join_token_path.is_some() {
        base.join_token_path = overlay.join_token_path;
    }
    if overlay.provision.is_some() {
        base.provision = overlay.provision;
    }
    if overlay.proxy.is_some() {
        base.proxy = overlay.proxy;
    }
    // Scalars only override when the overlay moved away from the default.
    if overlay.listen_addr != defaults.listen_addr {
        base.listen_addr = overlay.listen_addr;
    }
    if overlay.token_ttl_secs != defaults.token_ttl_secs {
        base.token_ttl_secs = overlay.token_ttl_secs;
    }
    if overlay.key_grace_secs != defaults.key_grace_secs {
        base.key_grace_secs = overlay.key_grace_secs;
    }
    if overlay.registration_rate_limit != defaults.registration_rate_limit {
        base.registration_rate_limit = overlay.registration_rate_limit;
    }
}

fn apply_env_overrides(config: &mut PortalConfig, var: impl Fn(&str) -> Option<String>) {
    if let Some(val) = var("PORTAL_CLUSTER_UUID") {
        config.cluster_uuid = Some(val);
    }
    if let Some(val) = var("PORTAL_URL") {
        config.portal_url = Some(val);
    }
    if let Some(addr) = var("PORTAL_LISTEN_ADDR").and_then(|v| v.parse().ok()) {
        config.listen_addr = addr;
    }
    if let Some(val) = var("PORTAL_DATABASE_PATH") {
        config.database_path = Some(PathBuf::from(val));
    }
    if let Some(val) = var("PORTAL_JOIN_TOKEN") {
        config.join_token = Some(val);
    }
    if let Some(val) = var("PORTAL_JOIN_TOKEN_PATH") {
        config.join_token_path = Some(PathBuf::from(val));
    }
    if let Some(n) = var("PORTAL_TOKEN_TTL_SECS").and_then(|v| v.parse().ok()) {
        config.token_ttl_secs = n;
    }
    if let Some(n) = var("PORTAL_KEY_GRACE_SECS").and_then(|v| v.parse().ok()) {
        config.key_grace_secs = n;
    }
    if let Some(val) = var("PORTAL_DB_ADMIN_PASSWORD") {
        config
            .provision
            .get_or_insert_with(ProvisionConfig::default)
            .admin_password = val;
    }
    if let Some(val) = var("PORTAL_DB_HOST") {
        config
            .provision
            .get_or_insert_with(ProvisionConfig::default)
            .host = val;
    }
    if let Some(val) = var("PORTAL_PROXY_ADMIN_PASSWORD") {
        if let Some(proxy) = config.proxy.as_mut() {
            proxy.admin_password = val;
        }
    }
}
