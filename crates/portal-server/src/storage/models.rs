//! Row types for portal storage.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct NodeRow {
    pub uuid: String,
    pub client_id: String,
    pub secret_hash: String,
    pub name: String,
    pub role: String,
    /// JSON object of string labels.
    pub labels: String,
    pub advertise_url: Option<String>,
    pub site_url: Option<String>,
    pub db_driver: Option<String>,
    pub db_host: Option<String>,
    pub db_port: Option<i64>,
    pub db_name: Option<String>,
    pub db_user: Option<String>,
    pub db_rotated_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Clone, sqlx::FromRow)]
pub struct SigningKeyRow {
    pub kid: String,
    pub secret_key: Vec<u8>,
    pub public_key: Vec<u8>,
    pub active: i64,
    pub created_at: i64,
    pub not_after: Option<i64>,
}

impl std::fmt::Debug for SigningKeyRow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKeyRow")
            .field("kid", &self.kid)
            .field("active", &self.active)
            .field("created_at", &self.created_at)
            .field("not_after", &self.not_after)
            .finish_non_exhaustive()
    }
}
