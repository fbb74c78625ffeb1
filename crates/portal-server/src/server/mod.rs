//! Portal HTTP API: registration, client-credentials tokens, JWKS and node
//! administration.

pub mod api;
pub mod error;
pub mod rate_limit;
pub mod register;
pub mod routes;


use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::{delete, get, post};
use portal_core::config::PortalConfig;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::auth::{KeyManager, TokenIssuer, TokenVerifier};
use crate::provision::{CredentialProvisioner, ProxySync};
use crate::registry::SqliteNodeRegistry;
use crate::storage::PortalDatabase;

pub use api::*;
pub use error::ApiError;
pub use rate_limit::RateLimiter;
pub use register::{RegisterError, Registrar};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub cluster_uuid: String,
    pub issuer: String,
    pub token_ttl_secs: i64,
    pub keys: Arc<KeyManager>,
    pub tokens: TokenIssuer,
    pub verifier: TokenVerifier,
    pub registrar: Arc<Registrar>,
    pub limiter: Arc<RateLimiter>,
}

impl AppState {
    /// Wire the full portal from configuration: SQLite registry, signing
    /// keys and, when configured, MySQL provisioning and `ProxySQL` sync.
    ///
    /// Generates the first signing key if none is active.
    pub async fn new(
        config: &PortalConfig,
        db: PortalDatabase,
        join_token: Option<String>,
    ) -> portal_core::Result<Self> {
        config.validate()?;
        let cluster_uuid = config.require_cluster_uuid()?;

        let registry = Arc::new(SqliteNodeRegistry::new(db.clone()));
        let mut registrar = Registrar::new(cluster_uuid, join_token, registry);
        if let Some(provision) = &config.provision {
            info!(driver = %provision.driver, host = %provision.host, "Database provisioning enabled");
            registrar = registrar.with_provisioner(CredentialProvisioner::from_config(provision));
        }
        if let Some(proxy) = &config.proxy {
            info!(host = %proxy.host, hostgroup = proxy.hostgroup, "ProxySQL sync enabled");
            registrar = registrar.with_proxy(ProxySync::from_config(proxy));
        }

        let keys = Arc::new(KeyManager::new(
            db,
            Duration::from_secs(config.key_grace_secs),
        ));
        let active = keys.ensure_active_key().await?;
        info!(kid = %active.kid(), "Signing key ready");

        Self::from_parts(config, keys, registrar)
    }

    /// Assemble state from prebuilt parts.
    pub fn from_parts(
        config: &PortalConfig,
        keys: Arc<KeyManager>,
        registrar: Registrar,
    ) -> portal_core::Result<Self> {
        let issuer = config.issuer()?;
        let verifier = TokenVerifier::new(
            Arc::clone(&keys),
            config.accepted_issuers()?,
            issuer.clone(),
        );
        Ok(Self {
            cluster_uuid: config.require_cluster_uuid()?.to_string(),
            issuer,
            token_ttl_secs: i64::try_from(config.token_ttl_secs).unwrap_or(i64::MAX),
            tokens: TokenIssuer::new(Arc::clone(&keys)),
            keys,
            verifier,
            registrar: Arc::new(registrar),
            limiter: Arc::new(RateLimiter::per_minute(config.registration_rate_limit)),
        })
    }
}

/// Build the portal router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(REGISTER_PATH, post(routes::register))
        .route(TOKEN_PATH, post(routes::token))
        .route(WELL_KNOWN_JWKS_PATH, get(routes::jwks))
        .route(JWKS_PATH, get(routes::jwks))
        .route(NODES_PATH, get(routes::list_nodes))
        .route(&format!("{NODES_PATH}/{{uuid}}"), delete(routes::remove_node))
        .route(HEALTH_PATH, get(routes::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
