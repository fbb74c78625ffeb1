//! portalctl library
//!
//! Node registration against a remote portal, plus token, key and node
//! administration run on the portal host itself.

pub mod backoff;
pub mod client;
pub mod credentials;
pub mod join_token_cmd;
pub mod jwt_cmd;
pub mod nodes_cmd;
pub mod output;
pub mod portal;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use portal_core::PortalConfig;
use portal_core::config::load_config;

use crate::output::Output;
use crate::portal::LocalPortal;

#[derive(Parser, Debug)]
#[command(name = "portalctl")]
#[command(version, about = "Cluster portal administration", long_about = None)]
pub struct Cli {
    /// Print JSON instead of tables.
    #[arg(long, global = true)]
    pub json: bool,

    /// Portal config file (defaults to the global config).
    #[arg(long, global = true, env = "PORTAL_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Tokens and signing keys.
    Jwt {
        #[command(subcommand)]
        action: jwt_cmd::JwtAction,
    },
    /// Node registration and the node registry.
    Nodes {
        #[command(subcommand)]
        action: nodes_cmd::NodesAction,
    },
    /// The bootstrap join token.
    JoinToken {
        #[command(subcommand)]
        action: join_token_cmd::JoinTokenAction,
    },
}

/// Shared state for a single command invocation.
#[derive(Debug, Clone)]
pub struct Context {
    pub config_path: Option<PathBuf>,
    pub out: Output,
}

impl Context {
    pub const fn new(config_path: Option<PathBuf>, json: bool) -> Self {
        Self {
            config_path,
            out: Output::new(json),
        }
    }

    pub fn config(&self) -> portal_core::Result<PortalConfig> {
        load_config(self.config_path.as_deref())
    }

    /// Open the local portal; only meaningful on the portal host.
    pub async fn portal(&self) -> portal_core::Result<LocalPortal> {
        LocalPortal::from_config(self.config()?).await
    }
}

/// Dispatch a parsed command line.
pub async fn run(cli: Cli) -> portal_core::Result<()> {
    let ctx = Context::new(cli.config, cli.json);
    match cli.command {
        Command::Jwt { action } => jwt_cmd::run(action, &ctx).await,
        Command::Nodes { action } => nodes_cmd::run(action, &ctx).await,
        Command::JoinToken { action } => join_token_cmd::run(action, &ctx),
    }
}
