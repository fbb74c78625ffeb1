//! Node identity records.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::RegistryError;
use crate::storage::NodeRow;

/// Longest DNS label.
pub const MAX_NAME_LEN: usize = 63;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    Portal,
    Instance,
    Service,
}

impl NodeRole {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Portal => "portal",
            Self::Instance => "instance",
            Self::Service => "service",
        }
    }

    /// Roles a node may claim when registering itself.
    pub const fn is_registrable(self) -> bool {
        matches!(self, Self::Instance | Self::Service)
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeRole {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "portal" => Ok(Self::Portal),
            "instance" => Ok(Self::Instance),
            "service" => Ok(Self::Service),
            other => Err(RegistryError::Validation(format!("unknown node role {other:?}"))),
        }
    }
}

/// Where a node's database lives. Never carries the password.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseRef {
    pub driver: String,
    pub host: String,
    pub port: u16,
    pub name: String,
    pub user: String,
    pub rotated_at: Option<i64>,
}

/// A cluster member's durable identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub uuid: String,
    pub client_id: String,
    /// argon2id PHC string of the client secret.
    #[serde(skip)]
    pub secret_hash: String,
    pub name: String,
    pub role: NodeRole,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advertise_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<DatabaseRef>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A DNS label: 1-63 chars of `[a-z0-9-]`, not starting or ending with `-`.
pub fn validate_node_name(name: &str) -> Result<(), RegistryError> {
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return Err(RegistryError::Validation(format!(
            "node name must be 1-{MAX_NAME_LEN} characters"
        )));
    }
    if !name
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
    {
        return Err(RegistryError::Validation(format!(
            "node name {name:?} may only contain a-z, 0-9 and '-'"
        )));
    }
    if name.starts_with('-') || name.ends_with('-') {
        return Err(RegistryError::Validation(format!(
            "node name {name:?} may not start or end with '-'"
        )));
    }
    Ok(())
}

impl TryFrom<NodeRow> for Node {
    type Error = RegistryError;

    fn try_from(row: NodeRow) -> Result<Self, Self::Error> {
        let labels = serde_json::from_str(&row.labels).map_err(|e| {
            RegistryError::Validation(format!("node {} has malformed labels: {e}", row.uuid))
        })?;
        let database = match (row.db_driver, row.db_host, row.db_name, row.db_user) {
            (Some(driver), Some(host), Some(name), Some(user)) => Some(DatabaseRef {
                driver,
                host,
                port: row
                    .db_port
                    .and_then(|p| u16::try_from(p).ok())
                    .unwrap_or(3306),
                name,
                user,
                rotated_at: row.db_rotated_at,
            }),
            _ => None,
        };
        Ok(Self {
            role: row.role.parse()?,
            uuid: row.uuid,
            client_id: row.client_id,
            secret_hash: row.secret_hash,
            name: row.name,
            labels,
            advertise_url: row.advertise_url,
            site_url: row.site_url,
            database,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl TryFrom<&Node> for NodeRow {
    type Error = RegistryError;

    fn try_from(node: &Node) -> Result<Self, Self::Error> {
        let labels = serde_json::to_string(&node.labels)
            .map_err(|e| RegistryError::Validation(format!("labels: {e}")))?;
        let db = node.database.as_ref();
        Ok(Self {
            uuid: node.uuid.clone(),
            client_id: node.client_id.clone(),
            secret_hash: node.secret_hash.clone(),
            name: node.name.clone(),
            role: node.role.as_str().to_string(),
            labels,
            advertise_url: node.advertise_url.clone(),
            site_url: node.site_url.clone(),
            db_driver: db.map(|d| d.driver.clone()),
            db_host: db.map(|d| d.host.clone()),
            db_port: db.map(|d| i64::from(d.port)),
            db_name: db.map(|d| d.name.clone()),
            db_user: db.map(|d| d.user.clone()),
            db_rotated_at: db.and_then(|d| d.rotated_at),
            created_at: node.created_at,
            updated_at: node.updated_at,
        })
    }
}
