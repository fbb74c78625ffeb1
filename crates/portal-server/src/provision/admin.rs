//! Admin connections used for provisioning.

use std::time::Duration;

use async_trait::async_trait;
use portal_core::config::{ProvisionConfig, ProxyConfig};
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions};
use sqlx::Connection;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, warn};

use super::error::ProvisionError;

/// Privileged connection that can inspect catalogs and run DDL.
#[async_trait]
pub trait AdminConnection: Send + Sync {
    async fn schema_exists(&self, name: &str) -> Result<bool, ProvisionError>;

    async fn user_exists(&self, user: &str) -> Result<bool, ProvisionError>;

    /// Run one statement assembled with the quoting helpers.
    async fn execute(&self, sql: &str) -> Result<(), ProvisionError>;
}

/// Deadlines applied by [`MySqlAdmin`].
#[derive(Debug, Clone, Copy)]
pub struct AdminTimeouts {
    pub connect: Duration,
    pub ping: Duration,
    pub exec: Duration,
}

impl Default for AdminTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(5),
            ping: Duration::from_secs(2),
            exec: Duration::from_secs(10),
        }
    }
}

/// MySQL/MariaDB (or `ProxySQL` admin) connection pool.
///
/// The pool is opened lazily and pinged before every use. A failed ping
/// closes it and the next call opens a fresh one.
pub struct MySqlAdmin {
    options: MySqlConnectOptions,
    timeouts: AdminTimeouts,
    pool: Mutex<Option<MySqlPool>>,
}

impl std::fmt::Debug for MySqlAdmin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MySqlAdmin")
            .field("host", &self.options.get_host())
            .field("port", &self.options.get_port())
            .field("timeouts", &self.timeouts)
            .finish_non_exhaustive()
    }
}

impl MySqlAdmin {
    pub fn new(options: MySqlConnectOptions, timeouts: AdminTimeouts) -> Self {
        Self {
            options,
            timeouts,
            pool: Mutex::new(None),
        }
    }

    pub fn from_config(config: &ProvisionConfig) -> Self {
        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.admin_user)
            .password(&config.admin_password);
        Self::new(
            options,
            AdminTimeouts {
                connect: Duration::from_secs(config.connect_timeout_secs),
                ping: Duration::from_secs(config.ping_timeout_secs),
                exec: Duration::from_secs(config.exec_timeout_secs),
            },
        )
    }

    /// `ProxySQL`'s admin interface rejects the session variables sqlx sets
    /// by default, so they are turned off here.
    pub fn for_proxy(config: &ProxyConfig) -> Self {
        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.admin_user)
            .password(&config.admin_password)
            .pipes_as_concat(false)
            .no_engine_substitution(false)
            .timezone(None::<String>);
        Self::new(options, AdminTimeouts::default())
    }

    async fn pool(&self) -> Result<MySqlPool, ProvisionError> {
        let mut slot = self.pool.lock().await;

        if let Some(pool) = slot.take() {
            match self.ping(&pool).await {
                Ok(()) => {
                    *slot = Some(pool.clone());
                    return Ok(pool);
                }
                Err(e) => {
                    warn!(error = %e, "Admin connection failed ping; reopening");
                    pool.close().await;
                }
            }
        }

        let connect = MySqlPoolOptions::new()
            .max_connections(4)
            .acquire_timeout(self.timeouts.connect)
            .connect_with(self.options.clone());
        let pool = timeout(self.timeouts.connect, connect)
            .await
            .map_err(|_| ProvisionError::Timeout {
                what: "admin connect",
                after: self.timeouts.connect,
            })?
            .map_err(|e| ProvisionError::Connection(e.to_string()))?;

        debug!(host = %self.options.get_host(), "Admin connection opened");
        *slot = Some(pool.clone());
        Ok(pool)
    }

    async fn ping(&self, pool: &MySqlPool) -> Result<(), ProvisionError> {
        let check = async {
            let mut conn = pool.acquire().await?;
            conn.ping().await
        };
        timeout(self.timeouts.ping, check)
            .await
            .map_err(|_| ProvisionError::Timeout {
                what: "admin ping",
                after: self.timeouts.ping,
            })?
            .map_err(|e| ProvisionError::Connection(e.to_string()))
    }

    async fn count(&self, sql: &'static str, value: &str) -> Result<bool, ProvisionError> {
        let pool = self.pool().await?;
        let query = sqlx::query_scalar::<_, i64>(sql).bind(value).fetch_one(&pool);
        let n = timeout(self.timeouts.exec, query)
            .await
            .map_err(|_| ProvisionError::Timeout {
                what: "catalog query",
                after: self.timeouts.exec,
            })?
            .map_err(classify)?;
        Ok(n > 0)
    }
}

#[async_trait]
impl AdminConnection for MySqlAdmin {
    async fn schema_exists(&self, name: &str) -> Result<bool, ProvisionError> {
        self.count(
            "SELECT COUNT(*) FROM information_schema.SCHEMATA WHERE SCHEMA_NAME = ?",
            name,
        )
        .await
    }

    async fn user_exists(&self, user: &str) -> Result<bool, ProvisionError> {
        self.count("SELECT COUNT(*) FROM mysql.user WHERE User = ?", user)
            .await
    }

    async fn execute(&self, sql: &str) -> Result<(), ProvisionError> {
        let pool = self.pool().await?;
        // Text protocol: DDL and ProxySQL admin commands are not preparable.
        timeout(self.timeouts.exec, sqlx::raw_sql(sql).execute(&pool))
            .await
            .map_err(|_| ProvisionError::Timeout {
                what: "statement",
                after: self.timeouts.exec,
            })?
            .map_err(classify)?;
        Ok(())
    }
}

fn classify(e: sqlx::Error) -> ProvisionError {
    match e {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
            ProvisionError::Connection(e.to_string())
        }
        other => ProvisionError::Sql(other.to_string()),
    }
}
