//! Per-node database provisioning on MySQL/MariaDB, with optional `ProxySQL`
//! account mirroring.
//!
//! Every statement is idempotent (`IF NOT EXISTS` / `IF EXISTS`), so
//! concurrent first registrations of the same node converge on one schema
//! and one user without extra locking.

pub mod admin;
pub mod error;
#[cfg(any(test, feature = "test-utils"))]
pub mod fake;
pub mod names;
pub mod provisioner;
pub mod proxy;
pub mod quote;

pub use admin::{AdminConnection, AdminTimeouts, MySqlAdmin};
pub use error::ProvisionError;
pub use names::{DatabaseNames, generate_names, slug};
pub use provisioner::{CredentialProvisioner, Credentials, SUPPORTED_DRIVERS, dsn};
pub use proxy::ProxySync;
pub use quote::{quote_ident, quote_literal, quote_user};
