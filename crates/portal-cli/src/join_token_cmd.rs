//! Join token subcommands.

use std::io::Write;
use std::path::{Path, PathBuf};

use portal_core::PortalConfig;
use portal_core::config::config_dir;
use portal_crypto::JoinTokenFile;
use serde::Serialize;

use crate::Context;

#[derive(clap::Subcommand, Debug)]
pub enum JoinTokenAction {
    /// Write a fresh join token file.
    Generate {
        /// Defaults to the configured join token path.
        #[arg(long)]
        path: Option<PathBuf>,
        /// Replace an existing token; nodes holding the old one can no longer join.
        #[arg(long)]
        force: bool,
    },
    /// Print the current join token.
    Show {
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

#[derive(Debug, Serialize)]
struct TokenReport<'a> {
    path: String,
    token: &'a str,
}

pub fn run(action: JoinTokenAction, ctx: &Context) -> portal_core::Result<()> {
    match action {
        JoinTokenAction::Generate { path, force } => {
            let path = resolve_path(ctx, path)?;
            let file = generate(&path, force)?;
            let report = TokenReport {
                path: path.display().to_string(),
                token: file.token(),
            };
            ctx.out.emit(&report, |out| {
                writeln!(out, "Wrote join token to {}", report.path)?;
                writeln!(out, "{}", report.token)
            })
        }
        JoinTokenAction::Show { path } => {
            let path = resolve_path(ctx, path)?;
            let file = load(&path)?;
            let report = TokenReport {
                path: path.display().to_string(),
                token: file.token(),
            };
            ctx.out.emit(&report, |out| writeln!(out, "{}", report.token))
        }
    }
}

/// Generate and save a token; refuses to overwrite unless `force`.
pub fn generate(path: &Path, force: bool) -> portal_core::Result<JoinTokenFile> {
    if path.exists() && !force {
        return Err(portal_core::Error::Conflict(format!(
            "{} already exists; pass --force to replace it",
            path.display()
        )));
    }
    let file = JoinTokenFile::generate();
    file.save(path)
        .map_err(|e| portal_core::Error::Internal(format!("{}: {e}", path.display())))?;
    Ok(file)
}

fn load(path: &Path) -> portal_core::Result<JoinTokenFile> {
    if !path.exists() {
        return Err(portal_core::Error::NotFound(format!(
            "no join token at {}",
            path.display()
        )));
    }
    JoinTokenFile::load(path)
        .map_err(|e| portal_core::Error::Validation(format!("{}: {e}", path.display())))
}

fn resolve_path(ctx: &Context, explicit: Option<PathBuf>) -> portal_core::Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path);
    }
    let config = ctx.config()?;
    default_path(&config).ok_or_else(|| {
        portal_core::Error::Config("cannot determine the join token path; pass --path".into())
    })
}

fn default_path(config: &PortalConfig) -> Option<PathBuf> {
    config
        .join_token_path
        .clone()
        .or_else(|| config_dir().map(|d| d.join("join-token")))
}
