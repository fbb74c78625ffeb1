//! Signing key queries.
//!
//! The partial unique index on `active = 1` guarantees at most one active
//! key; an insert racing another writer fails with
//! [`DatabaseError::Conflict`].

use super::db::PortalDatabase;
use super::models::SigningKeyRow;
use portal_core::db::DatabaseError;

impl PortalDatabase {
    /// The current active key, if any.
    pub async fn get_active_key(&self) -> Result<Option<SigningKeyRow>, DatabaseError> {
        let key = sqlx::query_as::<_, SigningKeyRow>("SELECT * FROM signing_keys WHERE active = 1")
            .fetch_optional(self.pool())
            .await?;
        Ok(key)
    }

    /// Insert `key` as the active key. Fails with `Conflict` if one exists.
    pub async fn insert_active_key(&self, key: &SigningKeyRow) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT INTO signing_keys (kid, secret_key, public_key, active, created_at, not_after) \
             VALUES (?, ?, ?, 1, ?, NULL)",
        )
        .bind(&key.kid)
        .bind(&key.secret_key)
        .bind(&key.public_key)
        .bind(key.created_at)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Retire the active key (valid until `retire_until`) and make `key` active,
    /// in one transaction.
    pub async fn rotate_active_key(
        &self,
        key: &SigningKeyRow,
        retire_until: i64,
    ) -> Result<Option<String>, DatabaseError> {
        let mut tx = self.pool().begin().await?;

        let retired: Option<String> =
            sqlx::query_scalar("SELECT kid FROM signing_keys WHERE active = 1")
                .fetch_optional(&mut *tx)
                .await?;

        sqlx::query("UPDATE signing_keys SET active = 0, not_after = ? WHERE active = 1")
            .bind(retire_until)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT INTO signing_keys (kid, secret_key, public_key, active, created_at, not_after) \
             VALUES (?, ?, ?, 1, ?, NULL)",
        )
        .bind(&key.kid)
        .bind(&key.secret_key)
        .bind(&key.public_key)
        .bind(key.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(retired)
    }

    /// Keys usable for verification at `now`: the active key plus retired
    /// keys whose `not_after` has not passed. Newest first.
    pub async fn list_valid_keys(&self, now: i64) -> Result<Vec<SigningKeyRow>, DatabaseError> {
        let keys = sqlx::query_as::<_, SigningKeyRow>(
            "SELECT * FROM signing_keys WHERE active = 1 OR not_after IS NULL OR not_after > ? \
             ORDER BY created_at DESC, kid DESC",
        )
        .bind(now)
        .fetch_all(self.pool())
        .await?;
        Ok(keys)
    }

    /// Delete retired keys whose `not_after` has passed. Returns the count.
    pub async fn delete_expired_keys(&self, now: i64) -> Result<u64, DatabaseError> {
        let result =
            sqlx::query("DELETE FROM signing_keys WHERE active = 0 AND not_after IS NOT NULL AND not_after <= ?")
                .bind(now)
                .execute(self.pool())
                .await?;
        Ok(result.rows_affected())
    }
}
