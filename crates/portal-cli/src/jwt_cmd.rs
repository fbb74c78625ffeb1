//! JWT subcommands: issue, inspect, keys, status.

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use portal_server::auth::{
    ClaimsSpec, ExpectedClaims, RemoteJwks, Scope, inspect as decode, verify as verify_token,
};
use serde::Serialize;
use tracing::warn;

use crate::Context;
use crate::output::{format_opt_ts, format_ts};

/// JWT subcommand actions.
#[derive(clap::Subcommand, Debug)]
pub enum JwtAction {
    /// Issue a token signed with the portal's active key.
    Issue {
        /// Subject, e.g. `node:<uuid>`.
        #[arg(long)]
        subject: String,
        /// Audience; repeat or comma-separate.
        #[arg(long, value_delimiter = ',', required = true)]
        audience: Vec<String>,
        /// Scopes, space- or comma-separated.
        #[arg(long, default_value = "cluster")]
        scope: String,
        /// Lifetime in seconds.
        #[arg(long, default_value_t = 3600)]
        ttl: i64,
        /// Issuer; defaults to `portal:<clusterUUID>`.
        #[arg(long)]
        issuer: Option<String>,
    },
    /// Decode a token, optionally verifying it.
    Inspect {
        token: String,
        /// Check signature and claims.
        #[arg(long)]
        verify: bool,
        /// Verify against a remote JWKS instead of the local key set.
        #[arg(long)]
        jwks_url: Option<String>,
        /// Disk cache for `--jwks-url`.
        #[arg(long)]
        cache_path: Option<PathBuf>,
        #[arg(long)]
        expect_issuer: Option<String>,
        #[arg(long)]
        expect_audience: Option<String>,
        #[arg(long)]
        require_scope: Option<String>,
        /// Clock skew tolerance in seconds.
        #[arg(long, default_value_t = 30)]
        leeway: u64,
    },
    /// Signing key management.
    Keys {
        #[command(subcommand)]
        action: KeysAction,
    },
    /// Refresh and describe a remote JWKS cache.
    Status {
        #[arg(long)]
        jwks_url: String,
        #[arg(long)]
        cache_path: Option<PathBuf>,
        /// Staleness threshold in seconds.
        #[arg(long, default_value_t = 300)]
        ttl: u64,
    },
}

#[derive(clap::Subcommand, Debug)]
pub enum KeysAction {
    /// List signing keys.
    Ls,
    /// Generate a new active key; the old one stays published for the grace period.
    Rotate,
}

#[derive(Debug, Serialize)]
struct IssuedToken<'a> {
    token: &'a str,
    kid: String,
    #[serde(rename = "expiresIn")]
    expires_in: i64,
}

#[derive(Debug, Serialize)]
struct InspectReport {
    header: serde_json::Value,
    claims: serde_json::Value,
    verified: bool,
}

/// Execute a JWT subcommand.
pub async fn run(action: JwtAction, ctx: &Context) -> portal_core::Result<()> {
    match action {
        JwtAction::Issue {
            subject,
            audience,
            scope,
            ttl,
            issuer,
        } => issue(ctx, subject, audience, &scope, ttl, issuer).await,
        JwtAction::Inspect {
            token,
            verify,
            jwks_url,
            cache_path,
            expect_issuer,
            expect_audience,
            require_scope,
            leeway,
        } => {
            let expected = if verify {
                Some(ExpectedClaims {
                    issuer: expect_issuer,
                    audience: expect_audience,
                    scope: match require_scope {
                        Some(list) => Scope::parse_list(&list)?,
                        None => Vec::new(),
                    },
                })
            } else {
                None
            };
            inspect(
                ctx,
                &token,
                expected,
                jwks_url,
                cache_path,
                Duration::from_secs(leeway),
            )
            .await
        }
        JwtAction::Keys { action } => match action {
            KeysAction::Ls => keys_ls(ctx).await,
            KeysAction::Rotate => keys_rotate(ctx).await,
        },
        JwtAction::Status {
            jwks_url,
            cache_path,
            ttl,
        } => status(ctx, &jwks_url, cache_path, Duration::from_secs(ttl)).await,
    }
}

async fn issue(
    ctx: &Context,
    subject: String,
    audience: Vec<String>,
    scope: &str,
    ttl: i64,
    issuer: Option<String>,
) -> portal_core::Result<()> {
    let portal = ctx.portal().await?;
    let issuer = match issuer {
        Some(issuer) => issuer,
        None => portal.config.issuer()?,
    };
    let spec = ClaimsSpec {
        issuer,
        subject,
        audience: audience.into_iter().filter(|a| !a.trim().is_empty()).collect(),
        scope: Scope::parse_list(scope)?,
        ttl_secs: ttl,
    };
    let token = portal.issuer().issue(&spec).await?;
    let kid = portal.keys().active_key().await?.kid().to_string();

    let report = IssuedToken {
        token: &token,
        kid,
        expires_in: spec.effective_ttl(),
    };
    ctx.out.emit(&report, |out| writeln!(out, "{token}"))
}

async fn inspect(
    ctx: &Context,
    token: &str,
    expected: Option<ExpectedClaims>,
    jwks_url: Option<String>,
    cache_path: Option<PathBuf>,
    leeway: Duration,
) -> portal_core::Result<()> {
    let decoded = decode(token)?;

    let verified = if let Some(expected) = expected {
        if let Some(url) = jwks_url {
            let jwks = RemoteJwks::new(&url, cache_path, portal_server::auth::DEFAULT_JWKS_TTL)?;
            jwks.verify(token, &expected, leeway).await?;
        } else {
            let portal = ctx.portal().await?;
            let keys = portal.keys().public_keys().await?;
            verify_token(token, &expected, &keys, leeway)?;
        }
        true
    } else {
        false
    };

    let report = InspectReport {
        header: decoded.header,
        claims: decoded.claims,
        verified,
    };
    ctx.out.emit(&report, |out| {
        writeln!(out, "Header:")?;
        writeln!(out, "{}", pretty(&report.header))?;
        writeln!(out, "Claims:")?;
        writeln!(out, "{}", pretty(&report.claims))?;
        writeln!(out, "Verified: {}", report.verified)
    })
}

fn pretty(value: &serde_json::Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

async fn keys_ls(ctx: &Context) -> portal_core::Result<()> {
    let portal = ctx.portal().await?;
    let keys = portal.keys().all_keys().await?;
    ctx.out.emit(&keys, |out| {
        if keys.is_empty() {
            return writeln!(out, "No signing keys");
        }
        writeln!(out, "{:<26} {:<7} {:<20} {:<20}", "KID", "ACTIVE", "CREATED", "NOT AFTER")?;
        for k in &keys {
            writeln!(
                out,
                "{:<26} {:<7} {:<20} {:<20}",
                k.kid,
                if k.active { "yes" } else { "no" },
                format_ts(k.created_at),
                format_opt_ts(k.not_after)
            )?;
        }
        Ok(())
    })
}

async fn keys_rotate(ctx: &Context) -> portal_core::Result<()> {
    let portal = ctx.portal().await?;
    let key = portal.keys().rotate().await?;
    let report = serde_json::json!({ "kid": key.kid(), "createdAt": key.created_at() });
    ctx.out
        .emit(&report, |out| writeln!(out, "Active key: {}", key.kid()))
}

async fn status(
    ctx: &Context,
    url: &str,
    cache_path: Option<PathBuf>,
    ttl: Duration,
) -> portal_core::Result<()> {
    let jwks = RemoteJwks::new(url, cache_path, ttl)?;
    if let Err(e) = jwks.refresh().await {
        let cached = jwks.status(ttl).await;
        if cached.fetched_at.is_none() {
            return Err(e.into());
        }
        warn!(error = %e, "JWKS refresh failed; showing cached copy");
    }

    let status = jwks.status(ttl).await;
    ctx.out.emit(&status, |out| {
        writeln!(out, "URL:        {}", status.url)?;
        writeln!(
            out,
            "Cache:      {}",
            status.cache_path.as_deref().unwrap_or("(memory only)")
        )?;
        writeln!(out, "ETag:       {}", status.etag.as_deref().unwrap_or("-"))?;
        writeln!(out, "Fetched:    {}", format_opt_ts(status.fetched_at))?;
        writeln!(
            out,
            "Age:        {}",
            status.age_secs.map_or_else(|| "-".to_string(), |a| format!("{a}s"))
        )?;
        writeln!(out, "Stale:      {}", status.stale)?;
        writeln!(out, "Keys:       {} ({})", status.key_count, status.key_ids.join(", "))
    })
}
