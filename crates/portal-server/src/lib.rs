//! Cluster Portal Server Library
//!
//! Identity and credential provisioning for cluster nodes:
//! - Ed25519 signing keys, JWT issuance and verification, remote JWKS cache
//! - Per-node MySQL/MariaDB schemas and accounts, `ProxySQL` mirroring
//! - SQLite-backed node registry
//! - HTTP registration protocol and client-credentials token endpoint

pub mod auth;
pub mod provision;
pub mod registry;
pub mod server;
pub mod storage;
