//! Cluster Portal Server
//!
//! Registers nodes, provisions their databases and issues cluster tokens.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use portal_core::PortalConfig;
use portal_core::config::{config_dir, load_config};
use portal_crypto::JoinTokenFile;
use portal_server::server::{AppState, build_router};
use portal_server::storage::PortalDatabase;

#[derive(Parser, Debug)]
#[command(name = "portal")]
#[command(
    version,
    about = "Cluster portal - node registration, database provisioning and token issuance"
)]
struct Args {
    /// Config file layered over the global one.
    #[arg(long, env = "PORTAL_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on.
    #[arg(long)]
    addr: Option<SocketAddr>,

    /// Path to SQLite database file.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Cluster UUID; required.
    #[arg(long)]
    cluster_uuid: Option<String>,

    /// Public URL of this portal, accepted as an alternative token issuer.
    #[arg(long)]
    portal_url: Option<String>,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long)]
    log_json: bool,

    /// OTLP gRPC endpoint for traces and metrics.
    #[cfg(feature = "metrics")]
    #[arg(long, env = "PORTAL_METRICS_ENDPOINT")]
    metrics_endpoint: Option<String>,
}

impl Args {
    fn apply(&self, config: &mut PortalConfig) {
        if let Some(addr) = self.addr {
            config.listen_addr = addr;
        }
        if let Some(path) = &self.db_path {
            config.database_path = Some(path.clone());
        }
        if let Some(uuid) = &self.cluster_uuid {
            config.cluster_uuid = Some(uuid.clone());
        }
        if let Some(url) = &self.portal_url {
            config.portal_url = Some(url.clone());
        }
    }
}

const DEFAULT_FILTER: &str = "portal_server=info,tower_http=info";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    #[cfg(feature = "metrics")]
    let telemetry = match &args.metrics_endpoint {
        Some(endpoint) => {
            let guard = portal_core::metrics::init_telemetry(endpoint)?;
            portal_core::metrics::init_tracing_with_telemetry(DEFAULT_FILTER, args.log_json, &guard);
            Some(guard)
        }
        None => {
            portal_core::tracing_init::init_tracing(DEFAULT_FILTER, args.log_json);
            None
        }
    };
    #[cfg(not(feature = "metrics"))]
    portal_core::tracing_init::init_tracing(DEFAULT_FILTER, args.log_json);

    let mut config = load_config(args.config.as_deref())?;
    args.apply(&mut config);
    config.validate()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %config.listen_addr,
        cluster_uuid = config.cluster_uuid.as_deref().unwrap_or_default(),
        "Starting portal"
    );

    let db_path = config
        .database_path()
        .context("cannot determine the portal database path; pass --db-path")?;
    info!(path = %db_path.display(), "Opening portal database");
    let db = PortalDatabase::open(&db_path).await?;

    let join_token = resolve_join_token(&config)?;
    let state = AppState::new(&config, db, join_token).await?;

    // Hourly prune of signing keys past their grace period.
    let prune_keys = Arc::clone(&state.keys);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(3600));
        interval.tick().await;
        loop {
            interval.tick().await;
            if let Err(e) = prune_keys.prune().await {
                warn!(error = %e, "Signing key prune failed");
            }
        }
    });

    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    info!(addr = %config.listen_addr, "Portal listening");
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Received shutdown signal");
        })
        .await?;

    #[cfg(feature = "metrics")]
    if let Some(guard) = telemetry {
        guard.shutdown()?;
    }

    info!("Portal stopped");
    Ok(())
}

/// Join token from config, or loaded from (or generated into) the token file.
fn resolve_join_token(config: &PortalConfig) -> anyhow::Result<Option<String>> {
    if let Some(token) = config.join_token.as_deref().filter(|t| !t.is_empty()) {
        info!("Using join token from configuration");
        return Ok(Some(token.to_string()));
    }

    let Some(path) = config
        .join_token_path
        .clone()
        .or_else(|| config_dir().map(|d| d.join("join-token")))
    else {
        warn!("No join token path available; bootstrap registration is disabled");
        return Ok(None);
    };
    load_join_token(&path).map(Some)
}

fn load_join_token(path: &Path) -> anyhow::Result<String> {
    let (file, generated) = JoinTokenFile::load_or_generate(path)
        .with_context(|| format!("join token file {}", path.display()))?;
    if generated {
        info!(path = %path.display(), "Generated join token");
    } else {
        info!(path = %path.display(), "Loaded join token");
    }
    Ok(file.token().to_string())
}
