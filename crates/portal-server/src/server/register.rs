//! Node registration: authenticate, resolve, provision, issue secrets.

use std::sync::Arc;

use portal_core::db::unix_timestamp;
use portal_crypto::{
    CryptoError, constant_time_str_eq, generate_client_id, generate_client_secret, hash_secret,
    verify_secret,
};
use reqwest::Url;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};
use zeroize::Zeroizing;

use super::api::{NodeSecrets, RegisterRequest, RegisterResponse};
use crate::provision::{
    CredentialProvisioner, Credentials, DatabaseNames, ProvisionError, ProxySync, generate_names,
};
use crate::registry::{
    DatabaseRef, Node, NodeRegistry, NodeRole, RegistryError, validate_node_name,
};

#[derive(Debug, thiserror::Error)]
pub enum RegisterError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Provision(#[from] ProvisionError),

    #[error("secret handling failed: {0}")]
    Crypto(#[from] CryptoError),
}

impl From<RegisterError> for portal_core::Error {
    fn from(e: RegisterError) -> Self {
        match e {
            RegisterError::Validation(msg) => Self::Validation(msg),
            RegisterError::Unauthorized(msg) => Self::Auth(msg),
            RegisterError::Conflict(msg) => Self::Conflict(msg),
            RegisterError::Registry(e) => e.into(),
            RegisterError::Provision(e) => e.into(),
            RegisterError::Crypto(e) => Self::Internal(e.to_string()),
        }
    }
}

/// The portal side of node registration.
pub struct Registrar {
    cluster_uuid: String,
    join_token: Option<Zeroizing<String>>,
    registry: Arc<dyn NodeRegistry>,
    provisioner: Option<CredentialProvisioner>,
    proxy: Option<ProxySync>,
    /// Serialises resolve-then-put so two registrations cannot claim one name.
    lock: Mutex<()>,
}

impl std::fmt::Debug for Registrar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registrar")
            .field("cluster_uuid", &self.cluster_uuid)
            .field("join_token", &self.join_token.as_ref().map(|_| "[REDACTED]"))
            .field("provisioner", &self.provisioner)
            .field("proxy", &self.proxy)
            .finish_non_exhaustive()
    }
}

impl Registrar {
    /// `join_token == None` disables join-token registration; nodes can
    /// then only re-register with their own client credentials.
    pub fn new(
        cluster_uuid: impl Into<String>,
        join_token: Option<String>,
        registry: Arc<dyn NodeRegistry>,
    ) -> Self {
        Self {
            cluster_uuid: cluster_uuid.into(),
            join_token: join_token.filter(|t| !t.is_empty()).map(Zeroizing::new),
            registry,
            provisioner: None,
            proxy: None,
            lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn with_provisioner(mut self, provisioner: CredentialProvisioner) -> Self {
        self.provisioner = Some(provisioner);
        self
    }

    #[must_use]
    pub fn with_proxy(mut self, proxy: ProxySync) -> Self {
        self.proxy = Some(proxy);
        self
    }

    pub fn registry(&self) -> &Arc<dyn NodeRegistry> {
        &self.registry
    }

    /// Look up a node by client ID and check its secret.
    ///
    /// Unknown IDs and wrong secrets produce the same error.
    pub async fn authenticate_client(
        &self,
        client_id: &str,
        client_secret: &str,
    ) -> Result<Node, RegisterError> {
        let rejected = || RegisterError::Unauthorized("invalid client credentials".into());
        let node = match self.registry.find_by_client_id(client_id).await {
            Ok(node) => node,
            Err(RegistryError::NotFound(_)) => return Err(rejected()),
            Err(e) => return Err(e.into()),
        };
        if verify_secret(client_secret, &node.secret_hash)? {
            Ok(node)
        } else {
            warn!(client_id, "Client secret mismatch");
            Err(rejected())
        }
    }

    fn check_join_token(&self, bearer: Option<&str>) -> Result<(), RegisterError> {
        let Some(expected) = self.join_token.as_deref() else {
            return Err(RegisterError::Unauthorized(
                "join token registration is disabled".into(),
            ));
        };
        let Some(presented) = bearer.filter(|b| !b.is_empty()) else {
            return Err(RegisterError::Unauthorized("missing bearer token".into()));
        };
        if constant_time_str_eq(presented, expected) {
            Ok(())
        } else {
            warn!("Registration with invalid join token");
            Err(RegisterError::Unauthorized("invalid join token".into()))
        }
    }

    /// Register a new node or re-register an existing one.
    ///
    /// `bearer` is the `Authorization: Bearer` value, compared against the
    /// join token when the body carries no client credentials.
    #[instrument(skip_all, fields(node_name = %req.node_name))]
    pub async fn register(
        &self,
        bearer: Option<&str>,
        req: RegisterRequest,
    ) -> Result<RegisterResponse, RegisterError> {
        let role = validate_request(&req)?;

        let authed = match (req.client_id.as_deref(), req.client_secret.as_deref()) {
            (Some(id), Some(secret)) => Some(self.authenticate_client(id, secret).await?),
            (None, None) => {
                self.check_join_token(bearer)?;
                None
            }
            _ => {
                return Err(RegisterError::Validation(
                    "clientId and clientSecret must be sent together".into(),
                ));
            }
        };

        let _guard = self.lock.lock().await;

        let existing = if let Some(uuid) = req.node_uuid.as_deref() {
            lookup(self.registry.find_by_node_uuid(uuid)).await?
        } else if let Some(node) = &authed {
            Some(node.clone())
        } else {
            lookup(self.registry.find_by_name(&req.node_name)).await?
        };

        if let Some(authed) = &authed {
            if existing.as_ref().is_none_or(|n| n.uuid != authed.uuid) {
                return Err(RegisterError::Conflict(format!(
                    "client {} belongs to a different node",
                    authed.client_id
                )));
            }
        }
        if let Some(node) = &existing {
            if node.role == NodeRole::Portal {
                return Err(RegisterError::Conflict(format!(
                    "{} is the portal and cannot re-register",
                    node.name
                )));
            }
        }

        let uuid = existing.as_ref().map_or_else(
            || {
                req.node_uuid
                    .clone()
                    .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
            },
            |n| n.uuid.clone(),
        );

        if existing.as_ref().is_none_or(|n| n.name != req.node_name) {
            if let Some(holder) = lookup(self.registry.find_by_name(&req.node_name)).await? {
                if holder.uuid != uuid {
                    return Err(RegisterError::Conflict(format!(
                        "node name {} is already registered to {}",
                        req.node_name, holder.uuid
                    )));
                }
            }
        }

        let now = unix_timestamp();
        let is_new = existing.is_none();

        let (db, database, already_provisioned) = self
            .provision(&uuid, &req, existing.as_ref())
            .await?;

        let (client_id, secret_hash, secrets) = if is_new || req.rotate_secret {
            let client_id = existing
                .as_ref()
                .map_or_else(generate_client_id, |n| n.client_id.clone());
            let client_secret = generate_client_secret();
            let hash = hash_secret(&client_secret)?;
            let secrets = NodeSecrets {
                client_id: client_id.clone(),
                client_secret,
                rotated_at: now,
            };
            (client_id, hash, Some(secrets))
        } else {
            let node = existing.as_ref().ok_or_else(|| {
                RegisterError::Conflict("node disappeared during registration".into())
            })?;
            (node.client_id.clone(), node.secret_hash.clone(), None)
        };

        let node = Node {
            uuid,
            client_id,
            secret_hash,
            name: req.node_name.clone(),
            role,
            labels: if req.labels.is_empty() {
                existing.as_ref().map(|n| n.labels.clone()).unwrap_or_default()
            } else {
                req.labels.clone()
            },
            advertise_url: req
                .advertise_url
                .clone()
                .or_else(|| existing.as_ref().and_then(|n| n.advertise_url.clone())),
            site_url: req
                .site_url
                .clone()
                .or_else(|| existing.as_ref().and_then(|n| n.site_url.clone())),
            database,
            created_at: existing.as_ref().map_or(now, |n| n.created_at),
            updated_at: now,
        };
        self.registry.put(&node).await?;

        info!(
            node_uuid = %node.uuid,
            role = %node.role,
            new = is_new,
            secret_rotated = secrets.is_some(),
            db_rotated = db.as_ref().is_some_and(|c| c.password.is_some()),
            "Node registered"
        );

        Ok(RegisterResponse {
            node,
            db,
            secrets,
            already_registered: !is_new,
            already_provisioned,
        })
    }

    async fn provision(
        &self,
        uuid: &str,
        req: &RegisterRequest,
        existing: Option<&Node>,
    ) -> Result<(Option<Credentials>, Option<DatabaseRef>, bool), RegisterError> {
        let previous = existing.and_then(|n| n.database.clone());
        let Some(provisioner) = &self.provisioner else {
            let provisioned = previous.is_some();
            return Ok((None, previous, provisioned));
        };

        // A node keeps the names it was first given, across renames too.
        let names = match &previous {
            Some(db) => DatabaseNames {
                name: db.name.clone(),
                user: db.user.clone(),
            },
            None => {
                let names = generate_names(&self.cluster_uuid, &req.node_name)?;
                self.check_names_unclaimed(uuid, &names).await?;
                names
            }
        };
        let rotate = req.rotate_database || previous.is_none();

        let (creds, created) = provisioner.ensure_named(&names, uuid, rotate).await?;

        if creds.password.is_some() {
            if let Some(proxy) = &self.proxy {
                proxy.sync_user(&creds).await?;
            }
        }

        let database = DatabaseRef {
            driver: creds.driver.clone(),
            host: creds.host.clone(),
            port: creds.port,
            name: creds.name.clone(),
            user: creds.user.clone(),
            rotated_at: creds
                .rotated_at
                .or_else(|| previous.as_ref().and_then(|p| p.rotated_at)),
        };
        Ok((Some(creds), Some(database), !created))
    }

    /// Distinct node names can share a slug and so derive the same schema
    /// and user. The first node to hold them keeps them.
    async fn check_names_unclaimed(
        &self,
        uuid: &str,
        names: &DatabaseNames,
    ) -> Result<(), RegisterError> {
        let holder = self.registry.list().await?.into_iter().find(|n| {
            n.uuid != uuid
                && n.database
                    .as_ref()
                    .is_some_and(|db| db.name == names.name || db.user == names.user)
        });
        match holder {
            Some(node) => Err(RegisterError::Conflict(format!(
                "database {} is already assigned to node {} ({})",
                names.name, node.name, node.uuid
            ))),
            None => Ok(()),
        }
    }

    /// Revoke a node's database account and delete its record.
    #[instrument(skip(self))]
    pub async fn remove(&self, uuid: &str, drop_database: bool) -> Result<Node, RegisterError> {
        let _guard = self.lock.lock().await;
        let node = self.registry.get(uuid).await?;

        if let (Some(db), Some(provisioner)) = (&node.database, &self.provisioner) {
            let names = DatabaseNames {
                name: db.name.clone(),
                user: db.user.clone(),
            };
            provisioner.revoke_credentials(&names, drop_database).await?;
            if let Some(proxy) = &self.proxy {
                proxy.drop_user(&db.user).await?;
            }
        }

        self.registry.delete(uuid).await?;
        info!(node_uuid = %uuid, name = %node.name, drop_database, "Node removed");
        Ok(node)
    }
}

async fn lookup(
    find: impl Future<Output = Result<Node, RegistryError>>,
) -> Result<Option<Node>, RegisterError> {
    match find.await {
        Ok(node) => Ok(Some(node)),
        Err(RegistryError::NotFound(_)) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn validate_request(req: &RegisterRequest) -> Result<NodeRole, RegisterError> {
    validate_node_name(&req.node_name).map_err(|e| RegisterError::Validation(e.to_string()))?;

    let role = req.node_role.unwrap_or(NodeRole::Instance);
    if !role.is_registrable() {
        return Err(RegisterError::Validation(format!(
            "role {role} cannot register; use instance or service"
        )));
    }

    if let Some(uuid) = req.node_uuid.as_deref() {
        uuid::Uuid::parse_str(uuid)
            .map_err(|e| RegisterError::Validation(format!("nodeUuid {uuid:?} is invalid: {e}")))?;
    }

    for (field, value) in [
        ("advertiseUrl", req.advertise_url.as_deref()),
        ("siteUrl", req.site_url.as_deref()),
    ] {
        if let Some(value) = value {
            validate_url(field, value)?;
        }
    }
    Ok(role)
}

fn validate_url(field: &str, value: &str) -> Result<(), RegisterError> {
    let url = Url::parse(value)
        .map_err(|e| RegisterError::Validation(format!("{field} {value:?} is invalid: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(RegisterError::Validation(format!(
            "{field} must be an http(s) URL with a host"
        )));
    }
    Ok(())
}
