//! Node identity records and their lookups.

mod error;
mod node;
mod sqlite;

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests;

use async_trait::async_trait;

pub use error::RegistryError;
pub use node::{DatabaseRef, MAX_NAME_LEN, Node, NodeRole, validate_node_name};
pub use sqlite::SqliteNodeRegistry;

/// Persistent store of [`Node`] records.
///
/// Lookups return [`RegistryError::NotFound`] when nothing matches, never an
/// empty success.
#[async_trait]
pub trait NodeRegistry: Send + Sync {
    /// Insert or replace by UUID. A name or client ID held by another node
    /// is a [`RegistryError::Conflict`].
    async fn put(&self, node: &Node) -> Result<(), RegistryError>;

    async fn get(&self, uuid: &str) -> Result<Node, RegistryError> {
        self.find_by_node_uuid(uuid).await
    }

    async fn delete(&self, uuid: &str) -> Result<(), RegistryError>;

    /// All nodes ordered by name.
    async fn list(&self) -> Result<Vec<Node>, RegistryError>;

    async fn find_by_name(&self, name: &str) -> Result<Node, RegistryError>;

    async fn find_by_client_id(&self, client_id: &str) -> Result<Node, RegistryError>;

    async fn find_by_node_uuid(&self, uuid: &str) -> Result<Node, RegistryError>;
}
