//! JSON wire types shared by the portal and its clients.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::provision::Credentials;
use crate::registry::{Node, NodeRole};

/// Registration endpoint path.
pub const REGISTER_PATH: &str = "/api/v1/cluster/nodes/register";
/// OAuth client-credentials endpoint path.
pub const TOKEN_PATH: &str = "/api/v1/oauth/token";
pub const NODES_PATH: &str = "/api/v1/cluster/nodes";
pub const JWKS_PATH: &str = "/api/v1/cluster/jwks";
pub const WELL_KNOWN_JWKS_PATH: &str = "/.well-known/jwks.json";
pub const HEALTH_PATH: &str = "/api/v1/cluster/health";

/// `POST /api/v1/cluster/nodes/register`
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub node_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_role: Option<NodeRole>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advertise_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_url: Option<String>,
    #[serde(default)]
    pub rotate_database: bool,
    #[serde(default)]
    pub rotate_secret: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_uuid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
}

impl std::fmt::Debug for RegisterRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisterRequest")
            .field("node_name", &self.node_name)
            .field("node_role", &self.node_role)
            .field("labels", &self.labels)
            .field("advertise_url", &self.advertise_url)
            .field("site_url", &self.site_url)
            .field("rotate_database", &self.rotate_database)
            .field("rotate_secret", &self.rotate_secret)
            .field("node_uuid", &self.node_uuid)
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Client credentials handed out on creation or rotation.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSecrets {
    pub client_id: String,
    pub client_secret: String,
    pub rotated_at: i64,
}

impl std::fmt::Debug for NodeSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeSecrets")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("rotated_at", &self.rotated_at)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub node: Node,
    /// `None` when the portal has no provisioner configured.
    pub db: Option<Credentials>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secrets: Option<NodeSecrets>,
    pub already_registered: bool,
    pub already_provisioned: bool,
}

/// `POST /api/v1/oauth/token`, form encoded.
#[derive(Clone, Deserialize, Serialize)]
pub struct TokenRequest {
    pub grant_type: String,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub scope: Option<String>,
}

impl std::fmt::Debug for TokenRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenRequest")
            .field("grant_type", &self.grant_type)
            .field("client_id", &self.client_id)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub scope: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub cluster_uuid: String,
    pub active_kid: Option<String>,
}

/// Body of every error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}
