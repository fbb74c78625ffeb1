//! Node record queries.

use super::db::PortalDatabase;
use super::models::NodeRow;
use portal_core::db::DatabaseError;

impl PortalDatabase {
    /// Insert a node, or replace every mutable column of an existing one.
    ///
    /// A `client_id` or `name` already held by another node surfaces as
    /// [`DatabaseError::Conflict`].
    pub async fn upsert_node(&self, node: &NodeRow) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT INTO nodes (uuid, client_id, secret_hash, name, role, labels, advertise_url, \
             site_url, db_driver, db_host, db_port, db_name, db_user, db_rotated_at, created_at, \
             updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(uuid) DO UPDATE SET \
             client_id = excluded.client_id, secret_hash = excluded.secret_hash, \
             name = excluded.name, role = excluded.role, labels = excluded.labels, \
             advertise_url = excluded.advertise_url, site_url = excluded.site_url, \
             db_driver = excluded.db_driver, db_host = excluded.db_host, \
             db_port = excluded.db_port, db_name = excluded.db_name, \
             db_user = excluded.db_user, db_rotated_at = excluded.db_rotated_at, \
             updated_at = excluded.updated_at",
        )
        .bind(&node.uuid)
        .bind(&node.client_id)
        .bind(&node.secret_hash)
        .bind(&node.name)
        .bind(&node.role)
        .bind(&node.labels)
        .bind(&node.advertise_url)
        .bind(&node.site_url)
        .bind(&node.db_driver)
        .bind(&node.db_host)
        .bind(node.db_port)
        .bind(&node.db_name)
        .bind(&node.db_user)
        .bind(node.db_rotated_at)
        .bind(node.created_at)
        .bind(node.updated_at)
        .execute(self.pool())
        .await?;

        Ok(())
    }

    /// Get a node by UUID.
    pub async fn get_node(&self, uuid: &str) -> Result<NodeRow, DatabaseError> {
        sqlx::query_as::<_, NodeRow>("SELECT * FROM nodes WHERE uuid = ?")
            .bind(uuid)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Node {uuid}")))
    }

    /// Get a node by client ID.
    pub async fn get_node_by_client_id(&self, client_id: &str) -> Result<NodeRow, DatabaseError> {
        sqlx::query_as::<_, NodeRow>("SELECT * FROM nodes WHERE client_id = ?")
            .bind(client_id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Node with client ID {client_id}")))
    }

    /// Get a node by name.
    pub async fn get_node_by_name(&self, name: &str) -> Result<NodeRow, DatabaseError> {
        sqlx::query_as::<_, NodeRow>("SELECT * FROM nodes WHERE name = ?")
            .bind(name)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Node named {name}")))
    }

    /// List all nodes ordered by name.
    pub async fn list_nodes(&self) -> Result<Vec<NodeRow>, DatabaseError> {
        let nodes = sqlx::query_as::<_, NodeRow>("SELECT * FROM nodes ORDER BY name")
            .fetch_all(self.pool())
            .await?;
        Ok(nodes)
    }

    /// Delete a node. Returns whether a row was removed.
    pub async fn delete_node(&self, uuid: &str) -> Result<bool, DatabaseError> {
        let result = sqlx::query("DELETE FROM nodes WHERE uuid = ?")
            .bind(uuid)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
