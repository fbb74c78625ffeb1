//! In-memory [`AdminConnection`] that interprets the provisioning statements.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::admin::AdminConnection;
use super::error::ProvisionError;

/// A row of the fake `mysql_users` proxy table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyUser {
    pub password: String,
    pub hostgroup: u32,
    pub schema: String,
}

#[derive(Default)]
struct State {
    schemas: BTreeSet<String>,
    users: BTreeMap<String, String>,
    grants: BTreeSet<(String, String)>,
    proxy_users: BTreeMap<String, ProxyUser>,
    statements: Vec<String>,
    unavailable: bool,
}

/// Shared handle; clones see the same server.
#[derive(Clone, Default)]
pub struct FakeAdmin {
    state: Arc<Mutex<State>>,
}

impl FakeAdmin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail with a connection error.
    pub async fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().await.unavailable = unavailable;
    }

    /// Every statement executed so far, in order.
    pub async fn statements(&self) -> Vec<String> {
        self.state.lock().await.statements.clone()
    }

    pub async fn has_schema(&self, name: &str) -> bool {
        self.state.lock().await.schemas.contains(name)
    }

    pub async fn password_of(&self, user: &str) -> Option<String> {
        self.state.lock().await.users.get(user).cloned()
    }

    pub async fn has_grant(&self, user: &str, schema: &str) -> bool {
        self.state
            .lock()
            .await
            .grants
            .contains(&(user.to_string(), schema.to_string()))
    }

    pub async fn proxy_user(&self, user: &str) -> Option<ProxyUser> {
        self.state.lock().await.proxy_users.get(user).cloned()
    }
}

fn between(sql: &str, quote: char) -> Vec<String> {
    sql.split(quote)
        .skip(1)
        .step_by(2)
        .map(str::to_string)
        .collect()
}

fn nth(values: &[String], index: usize, sql: &str) -> Result<String, ProvisionError> {
    values
        .get(index)
        .cloned()
        .ok_or_else(|| ProvisionError::Sql(format!("malformed statement: {sql}")))
}

impl State {
    fn check_available(&self) -> Result<(), ProvisionError> {
        if self.unavailable {
            return Err(ProvisionError::Connection("connection refused".into()));
        }
        Ok(())
    }

    fn apply(&mut self, sql: &str) -> Result<(), ProvisionError> {
        let literals = between(sql, '\'');
        let idents = between(sql, '`');

        if sql.starts_with("CREATE DATABASE IF NOT EXISTS ") {
            self.schemas.insert(nth(&idents, 0, sql)?);
        } else if sql.starts_with("CREATE USER IF NOT EXISTS ") {
            let user = nth(&literals, 0, sql)?;
            let password = nth(&literals, 2, sql)?;
            self.users.entry(user).or_insert(password);
        } else if sql.starts_with("ALTER USER ") {
            let user = nth(&literals, 0, sql)?;
            let password = nth(&literals, 2, sql)?;
            let slot = self
                .users
                .get_mut(&user)
                .ok_or_else(|| ProvisionError::Sql(format!("Operation ALTER USER failed for '{user}'")))?;
            *slot = password;
        } else if sql.starts_with("GRANT ALL PRIVILEGES ON ") {
            let schema = nth(&idents, 0, sql)?;
            let user = nth(&literals, 0, sql)?;
            if !self.users.contains_key(&user) {
                return Err(ProvisionError::Sql(format!("no such user '{user}'")));
            }
            self.grants.insert((user, schema));
        } else if sql.starts_with("DROP USER IF EXISTS ") {
            let user = nth(&literals, 0, sql)?;
            self.users.remove(&user);
            self.grants.retain(|(u, _)| *u != user);
        } else if sql.starts_with("DROP DATABASE IF EXISTS ") {
            let schema = nth(&idents, 0, sql)?;
            self.schemas.remove(&schema);
            self.grants.retain(|(_, s)| *s != schema);
        } else if sql.starts_with("DELETE FROM mysql_users ") {
            self.proxy_users.remove(&nth(&literals, 0, sql)?);
        } else if sql.starts_with("INSERT INTO mysql_users ") {
            let hostgroup = sql
                .split_once("VALUES (")
                .and_then(|(_, values)| values.split(',').nth(2))
                .and_then(|v| v.trim().parse().ok())
                .ok_or_else(|| ProvisionError::Sql(format!("malformed statement: {sql}")))?;
            self.proxy_users.insert(
                nth(&literals, 0, sql)?,
                ProxyUser {
                    password: nth(&literals, 1, sql)?,
                    hostgroup,
                    schema: nth(&literals, 2, sql)?,
                },
            );
        } else if !matches!(
            sql,
            "FLUSH PRIVILEGES" | "LOAD MYSQL USERS TO RUNTIME" | "SAVE MYSQL USERS TO DISK"
        ) {
            return Err(ProvisionError::Sql(format!("unrecognised statement: {sql}")));
        }
        Ok(())
    }
}

#[async_trait]
impl AdminConnection for FakeAdmin {
    async fn schema_exists(&self, name: &str) -> Result<bool, ProvisionError> {
        let state = self.state.lock().await;
        state.check_available()?;
        Ok(state.schemas.contains(name))
    }

    async fn user_exists(&self, user: &str) -> Result<bool, ProvisionError> {
        let state = self.state.lock().await;
        state.check_available()?;
        Ok(state.users.contains_key(user))
    }

    async fn execute(&self, sql: &str) -> Result<(), ProvisionError> {
        let mut state = self.state.lock().await;
        state.check_available()?;
        state.statements.push(sql.to_string());
        state.apply(sql)
    }
}
