//! [`NodeRegistry`] backed by the portal database.

use async_trait::async_trait;

use super::error::RegistryError;
use super::node::{Node, validate_node_name};
use super::NodeRegistry;
use crate::storage::{NodeRow, PortalDatabase};

#[derive(Debug, Clone)]
pub struct SqliteNodeRegistry {
    db: PortalDatabase,
}

impl SqliteNodeRegistry {
    pub const fn new(db: PortalDatabase) -> Self {
        Self { db }
    }
}

#[async_trait]
impl NodeRegistry for SqliteNodeRegistry {
    async fn put(&self, node: &Node) -> Result<(), RegistryError> {
        validate_node_name(&node.name)?;
        if node.uuid.is_empty() || node.client_id.is_empty() {
            return Err(RegistryError::Validation(
                "node UUID and client ID are required".into(),
            ));
        }
        let row = NodeRow::try_from(node)?;
        self.db.upsert_node(&row).await.map_err(|e| match RegistryError::from(e) {
            RegistryError::Conflict(_) => RegistryError::Conflict(format!(
                "name {:?} or client ID is already held by another node",
                node.name
            )),
            other => other,
        })
    }

    async fn delete(&self, uuid: &str) -> Result<(), RegistryError> {
        if self.db.delete_node(uuid).await? {
            Ok(())
        } else {
            Err(RegistryError::NotFound(format!("Node {uuid}")))
        }
    }

    async fn list(&self) -> Result<Vec<Node>, RegistryError> {
        self.db
            .list_nodes()
            .await?
            .into_iter()
            .map(Node::try_from)
            .collect()
    }

    async fn find_by_name(&self, name: &str) -> Result<Node, RegistryError> {
        self.db.get_node_by_name(name).await?.try_into()
    }

    async fn find_by_client_id(&self, client_id: &str) -> Result<Node, RegistryError> {
        self.db.get_node_by_client_id(client_id).await?.try_into()
    }

    async fn find_by_node_uuid(&self, uuid: &str) -> Result<Node, RegistryError> {
        self.db.get_node(uuid).await?.try_into()
    }
}
