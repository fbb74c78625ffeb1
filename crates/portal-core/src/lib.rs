//! Portal Core Library
//!
//! Shared functionality for the cluster portal components:
//! - Error taxonomy and CLI exit codes
//! - Configuration resolution and hierarchy
//! - `SQLite` pool helpers for the portal database
//! - Tracing initialisation

pub mod config;
pub mod db;
pub mod error;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod tracing_init;

pub use config::PortalConfig;
pub use error::{Error, Result};
