//! Node subcommands: register, rotate, ls, rm.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use portal_server::registry::{Node, NodeRole};
use portal_server::server::{RegisterRequest, RegisterResponse};
use tracing::{debug, info};

use crate::Context;
use crate::client::RegistrationClient;
use crate::credentials::NodeCredentials;
use crate::output::format_ts;

/// Node subcommand actions.
#[derive(clap::Subcommand, Debug)]
pub enum NodesAction {
    /// Register this node with a portal (or re-register it).
    Register {
        #[arg(long, env = "PORTAL_URL")]
        portal_url: String,
        /// DNS-label node name.
        #[arg(long)]
        name: String,
        /// `instance` or `service`.
        #[arg(long)]
        role: Option<NodeRole>,
        /// `key=value`; repeatable.
        #[arg(long = "label", value_parser = parse_label)]
        labels: Vec<(String, String)>,
        #[arg(long)]
        advertise_url: Option<String>,
        #[arg(long)]
        site_url: Option<String>,
        /// Bootstrap token; not needed when `--save` already holds client credentials.
        #[arg(long, env = "PORTAL_JOIN_TOKEN", hide_env_values = true)]
        join_token: Option<String>,
        /// Keep a specific UUID instead of letting the portal assign one.
        #[arg(long)]
        node_uuid: Option<String>,
        #[arg(long)]
        rotate_database: bool,
        #[arg(long)]
        rotate_secret: bool,
        /// Credentials file to read previous secrets from and write results to.
        #[arg(long)]
        save: Option<PathBuf>,
    },
    /// Rotate secrets using stored client credentials.
    Rotate {
        #[arg(long, env = "PORTAL_URL")]
        portal_url: Option<String>,
        /// Credentials file written by `register --save`.
        #[arg(long)]
        credentials: PathBuf,
        /// Rotate the database password only.
        #[arg(long)]
        database: bool,
        /// Rotate the client secret only.
        #[arg(long)]
        secret: bool,
    },
    /// List registered nodes (portal host only).
    Ls,
    /// Remove a node (portal host only).
    Rm {
        uuid: String,
        /// Also drop the node's database and accounts.
        #[arg(long)]
        drop_database: bool,
    },
}

fn parse_label(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got {s:?}"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty label key in {s:?}"));
    }
    Ok((key.to_string(), value.trim().to_string()))
}

/// Execute a node subcommand.
pub async fn run(action: NodesAction, ctx: &Context) -> portal_core::Result<()> {
    match action {
        NodesAction::Register {
            portal_url,
            name,
            role,
            labels,
            advertise_url,
            site_url,
            join_token,
            node_uuid,
            rotate_database,
            rotate_secret,
            save,
        } => {
            let req = RegisterRequest {
                node_name: name,
                node_role: role,
                labels: labels.into_iter().collect::<BTreeMap<_, _>>(),
                advertise_url,
                site_url,
                rotate_database,
                rotate_secret,
                node_uuid,
                ..RegisterRequest::default()
            };
            register(ctx, &portal_url, req, join_token, save.as_deref()).await
        }
        NodesAction::Rotate {
            portal_url,
            credentials,
            database,
            secret,
        } => rotate(ctx, portal_url, &credentials, database, secret).await,
        NodesAction::Ls => list(ctx).await,
        NodesAction::Rm {
            uuid,
            drop_database,
        } => remove(ctx, &uuid, drop_database).await,
    }
}

async fn register(
    ctx: &Context,
    portal_url: &str,
    mut req: RegisterRequest,
    join_token: Option<String>,
    save: Option<&Path>,
) -> portal_core::Result<()> {
    let previous = match save {
        Some(path) if path.exists() => Some(NodeCredentials::load(path)?),
        _ => None,
    };

    let join_token = join_token.filter(|t| !t.trim().is_empty());
    if join_token.is_none() {
        let Some(prev) = &previous else {
            return Err(portal_core::Error::Validation(
                "a join token is required for a first registration".into(),
            ));
        };
        debug!(node_uuid = %prev.node_uuid, "Re-registering with stored client credentials");
        req.client_id = Some(prev.client_id.clone());
        req.client_secret = Some(prev.client_secret.clone());
        if req.node_uuid.is_none() {
            req.node_uuid = Some(prev.node_uuid.clone());
        }
    }

    let client = RegistrationClient::new(portal_url)?;
    let resp = client.register(join_token.as_deref(), &req).await?;
    finish(ctx, client.base_url(), previous, &resp, save)
}

async fn rotate(
    ctx: &Context,
    portal_url: Option<String>,
    path: &Path,
    database: bool,
    secret: bool,
) -> portal_core::Result<()> {
    let stored = NodeCredentials::load(path)?;
    let both = !database && !secret;
    let portal_url = portal_url.unwrap_or_else(|| stored.portal_url.clone());

    let req = RegisterRequest {
        node_name: stored.node_name.clone(),
        node_uuid: Some(stored.node_uuid.clone()),
        client_id: Some(stored.client_id.clone()),
        client_secret: Some(stored.client_secret.clone()),
        rotate_database: database || both,
        rotate_secret: secret || both,
        ..RegisterRequest::default()
    };

    let client = RegistrationClient::new(&portal_url)?;
    let resp = client.register(None, &req).await?;
    finish(ctx, client.base_url(), Some(stored), &resp, Some(path))
}

/// Persist what the portal returned and report it.
fn finish(
    ctx: &Context,
    portal_url: &str,
    previous: Option<NodeCredentials>,
    resp: &RegisterResponse,
    save: Option<&Path>,
) -> portal_core::Result<()> {
    if let Some(path) = save {
        match NodeCredentials::merge(previous, portal_url, resp) {
            Some(creds) => {
                creds.save(path)?;
                info!(path = %path.display(), "Saved node credentials");
            }
            None => {
                return Err(portal_core::Error::Conflict(format!(
                    "node {} is already registered but no stored credentials exist at {}",
                    resp.node.name,
                    path.display()
                )));
            }
        }
    }

    ctx.out.emit(resp, |out| {
        writeln!(out, "Node:        {} ({})", resp.node.name, resp.node.uuid)?;
        writeln!(out, "Role:        {}", resp.node.role)?;
        writeln!(out, "Client ID:   {}", resp.node.client_id)?;
        writeln!(
            out,
            "Status:      {}",
            if resp.already_registered { "re-registered" } else { "registered" }
        )?;
        if let Some(secrets) = &resp.secrets {
            if save.is_some() {
                writeln!(out, "Secret:      rotated at {}", format_ts(secrets.rotated_at))?;
            } else {
                writeln!(out, "Secret:      {}", secrets.client_secret)?;
            }
        }
        if let Some(db) = &resp.db {
            writeln!(out, "Database:    {} on {}:{}", db.name, db.host, db.port)?;
            writeln!(out, "DB user:     {}", db.user)?;
            match (&db.password, save) {
                (Some(_), Some(_)) => writeln!(out, "DB password: issued")?,
                (Some(password), None) => writeln!(out, "DB password: {password}")?,
                (None, _) => writeln!(out, "DB password: unchanged")?,
            }
        }
        Ok(())
    })
}

async fn list(ctx: &Context) -> portal_core::Result<()> {
    let portal = ctx.portal().await?;
    let nodes = portal.registry().list().await?;
    ctx.out.emit(&nodes, |out| print_nodes(out, &nodes))
}

fn print_nodes(out: &mut dyn Write, nodes: &[Node]) -> std::io::Result<()> {
    if nodes.is_empty() {
        return writeln!(out, "No registered nodes");
    }
    writeln!(
        out,
        "{:<36}  {:<20} {:<9} {:<24} {:<20}",
        "UUID", "NAME", "ROLE", "DATABASE", "UPDATED"
    )?;
    for node in nodes {
        writeln!(
            out,
            "{:<36}  {:<20} {:<9} {:<24} {:<20}",
            node.uuid,
            node.name,
            node.role,
            node.database.as_ref().map_or("-", |d| d.name.as_str()),
            format_ts(node.updated_at)
        )?;
    }
    Ok(())
}

async fn remove(ctx: &Context, uuid: &str, drop_database: bool) -> portal_core::Result<()> {
    let portal = ctx.portal().await?;
    let node = portal.registrar()?.remove(uuid, drop_database).await?;
    ctx.out.emit(&node, |out| {
        writeln!(out, "Removed node {} ({})", node.name, node.uuid)?;
        if drop_database && node.database.is_some() {
            writeln!(out, "Database and accounts dropped")?;
        }
        Ok(())
    })
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn labels_parse_as_key_value() {
        assert_eq!(
            parse_label("zone = eu-1").unwrap(),
            ("zone".to_string(), "eu-1".to_string())
        );
        assert_eq!(parse_label("empty=").unwrap().1, "");
        assert!(parse_label("novalue").is_err());
        assert!(parse_label("=x").is_err());
    }

    #[test]
    fn empty_node_list_prints_placeholder() {
        let mut buf = Vec::new();
        print_nodes(&mut buf, &[]).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "No registered nodes\n");
    }
}
