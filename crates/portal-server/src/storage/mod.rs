//! SQLite storage for the portal.
//!
//! Persists node identity records and token signing keys.

mod db;
mod models;
mod queries_keys;
mod queries_nodes;


pub use db::PortalDatabase;
pub use models::*;
pub use portal_core::db::DatabaseError;
