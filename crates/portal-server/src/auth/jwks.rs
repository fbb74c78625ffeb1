//! Remote JWKS fetcher with an on-disk cache.
//!
//! Verifies tokens from another issuer by fetching its key set over HTTP.
//!
//! # Cache behaviour
//!
//! - Conditional GET with `If-None-Match`; a `304` only bumps the fetch time.
//! - The last good document is persisted as JSON (mode 0600) and reloaded on
//!   start, so a restart does not require the issuer to be reachable.
//! - Once `ttl` has elapsed the cache is stale. Stale keys are still served
//!   immediately while a single background refresh runs.
//! - An unknown `kid` forces a refresh, at most once per 10 seconds.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use portal_core::db::unix_timestamp;
use portal_crypto::Jwks;
use reqwest::StatusCode;
use reqwest::header::{ETAG, IF_NONE_MATCH};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::claims::Claims;
use super::error::AuthError;
use super::verifier::{ExpectedClaims, PublicKey, verify};

/// Default staleness threshold for a cached key set.
pub const DEFAULT_JWKS_TTL: Duration = Duration::from_secs(300);

/// Minimum time between forced (kid-miss) refreshes.
const MIN_FORCED_REFRESH: Duration = Duration::from_secs(10);

/// Timeout for JWKS HTTP fetches.
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// On-disk cache document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CachedJwks {
    url: String,
    #[serde(default)]
    etag: Option<String>,
    fetched_at: i64,
    jwks: Jwks,
}

/// Cache diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatus {
    pub url: String,
    pub cache_path: Option<String>,
    pub etag: Option<String>,
    pub fetched_at: Option<i64>,
    pub age_secs: Option<i64>,
    pub key_count: usize,
    pub key_ids: Vec<String>,
    pub stale: bool,
}

struct Inner {
    url: String,
    cache_path: Option<PathBuf>,
    client: reqwest::Client,
    ttl: Duration,
    cache: RwLock<Option<CachedJwks>>,
    refreshing: AtomicBool,
    last_forced: Mutex<Option<Instant>>,
}

/// Key set of a remote issuer. Cheap to clone.
#[derive(Clone)]
pub struct RemoteJwks {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for RemoteJwks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteJwks")
            .field("url", &self.inner.url)
            .field("cache_path", &self.inner.cache_path)
            .field("ttl", &self.inner.ttl)
            .finish_non_exhaustive()
    }
}

impl RemoteJwks {
    /// Create a fetcher for `url`. A cache file written for a different URL
    /// is ignored.
    pub fn new(url: &str, cache_path: Option<PathBuf>, ttl: Duration) -> Result<Self, AuthError> {
        // reqwest is built with rustls-no-provider; Err means already installed.
        let _ = rustls::crypto::ring::default_provider().install_default();

        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| AuthError::Fetch(format!("HTTP client: {e}")))?;

        let cached = cache_path
            .as_deref()
            .and_then(|path| load_cache_file(path, url));

        Ok(Self {
            inner: Arc::new(Inner {
                url: url.to_string(),
                cache_path,
                client,
                ttl,
                cache: RwLock::new(cached),
                refreshing: AtomicBool::new(false),
                last_forced: Mutex::new(None),
            }),
        })
    }

    pub fn url(&self) -> &str {
        &self.inner.url
    }

    /// Current key set. Fetches synchronously only when nothing is cached.
    pub async fn keys(&self) -> Result<Jwks, AuthError> {
        let cached = self.inner.cache.read().await.clone();
        match cached {
            Some(entry) => {
                if is_stale(entry.fetched_at, self.inner.ttl, unix_timestamp()) {
                    self.spawn_refresh();
                }
                Ok(entry.jwks)
            }
            None => {
                self.inner.refresh().await?;
                self.cached_jwks().await
            }
        }
    }

    /// Verification keys from the current key set.
    pub async fn public_keys(&self) -> Result<Vec<PublicKey>, AuthError> {
        Ok(PublicKey::from_jwks(&self.keys().await?))
    }

    /// The key for `kid`, forcing one refresh on a miss.
    pub async fn key_for(&self, kid: &str) -> Result<PublicKey, AuthError> {
        if let Some(key) = find_key(&self.keys().await?, kid) {
            return Ok(key);
        }

        {
            let mut last = self.inner.last_forced.lock().await;
            if last.is_some_and(|at| at.elapsed() < MIN_FORCED_REFRESH) {
                debug!(kid, "Unknown kid, forced refresh rate-limited");
                return Err(AuthError::UnknownKey(kid.to_string()));
            }
            *last = Some(Instant::now());
        }

        debug!(kid, url = %self.inner.url, "Unknown kid, refreshing JWKS");
        self.inner.refresh().await?;
        find_key(&self.cached_jwks().await?, kid)
            .ok_or_else(|| AuthError::UnknownKey(kid.to_string()))
    }

    /// Verify a token signed by the remote issuer.
    pub async fn verify(
        &self,
        token: &str,
        expected: &ExpectedClaims,
        leeway: Duration,
    ) -> Result<Claims, AuthError> {
        let header = jsonwebtoken::decode_header(token)
            .map_err(|e| AuthError::MalformedToken(format!("header: {e}")))?;
        let kid = header
            .kid
            .ok_or_else(|| AuthError::MalformedToken("header has no kid".into()))?;
        let key = self.key_for(&kid).await?;
        verify(token, expected, &[key], leeway)
    }

    /// Fetch now, regardless of staleness. Returns `true` if the document changed.
    pub async fn refresh(&self) -> Result<bool, AuthError> {
        self.inner.refresh().await
    }

    /// Cache diagnostics, judging staleness against `ttl`.
    pub async fn status(&self, ttl: Duration) -> CacheStatus {
        let now = unix_timestamp();
        let cache = self.inner.cache.read().await;
        let cache_path = self
            .inner
            .cache_path
            .as_ref()
            .map(|p| p.display().to_string());
        match cache.as_ref() {
            Some(entry) => CacheStatus {
                url: self.inner.url.clone(),
                cache_path,
                etag: entry.etag.clone(),
                fetched_at: Some(entry.fetched_at),
                age_secs: Some(now.saturating_sub(entry.fetched_at)),
                key_count: entry.jwks.keys.len(),
                key_ids: entry.jwks.key_ids(),
                stale: is_stale(entry.fetched_at, ttl, now),
            },
            None => CacheStatus {
                url: self.inner.url.clone(),
                cache_path,
                etag: None,
                fetched_at: None,
                age_secs: None,
                key_count: 0,
                key_ids: Vec::new(),
                stale: true,
            },
        }
    }

    async fn cached_jwks(&self) -> Result<Jwks, AuthError> {
        self.inner
            .cache
            .read()
            .await
            .as_ref()
            .map(|entry| entry.jwks.clone())
            .ok_or_else(|| AuthError::Fetch(format!("no key set cached for {}", self.inner.url)))
    }

    fn spawn_refresh(&self) {
        if self
            .inner
            .refreshing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            if let Err(e) = inner.refresh().await {
                warn!(url = %inner.url, error = %e, "Background JWKS refresh failed; serving stale keys");
            }
            inner.refreshing.store(false, Ordering::Release);
        });
    }
}

impl Inner {
    async fn refresh(&self) -> Result<bool, AuthError> {
        let etag = self
            .cache
            .read()
            .await
            .as_ref()
            .and_then(|entry| entry.etag.clone());

        let mut request = self.client.get(&self.url);
        if let Some(etag) = etag.as_deref() {
            request = request.header(IF_NONE_MATCH, etag);
        }
        let response = request
            .send()
            .await
            .map_err(|e| AuthError::Fetch(format!("{}: {e}", self.url)))?;

        let now = unix_timestamp();
        let status = response.status();

        if status == StatusCode::NOT_MODIFIED {
            let mut cache = self.cache.write().await;
            if let Some(entry) = cache.as_mut() {
                entry.fetched_at = now;
                debug!(url = %self.url, "JWKS not modified");
                self.persist(entry).await;
                return Ok(false);
            }
            return Err(AuthError::Fetch(format!(
                "{}: 304 without a cached key set",
                self.url
            )));
        }
        if !status.is_success() {
            return Err(AuthError::Fetch(format!("{}: HTTP {status}", self.url)));
        }

        let new_etag = response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let jwks: Jwks = response
            .json()
            .await
            .map_err(|e| AuthError::Fetch(format!("{}: invalid JWKS: {e}", self.url)))?;

        let entry = CachedJwks {
            url: self.url.clone(),
            etag: new_etag,
            fetched_at: now,
            jwks,
        };
        let mut cache = self.cache.write().await;
        let changed = cache.as_ref().is_none_or(|old| old.jwks != entry.jwks);
        info!(
            url = %self.url,
            key_count = entry.jwks.keys.len(),
            changed,
            "JWKS fetched"
        );
        self.persist(&entry).await;
        *cache = Some(entry);
        Ok(changed)
    }

    async fn persist(&self, entry: &CachedJwks) {
        let Some(path) = self.cache_path.as_deref() else {
            return;
        };
        if let Err(e) = write_cache_file(path, entry).await {
            warn!(path = %path.display(), error = %e, "Failed to write JWKS cache");
        }
    }
}

fn is_stale(fetched_at: i64, ttl: Duration, now: i64) -> bool {
    let ttl = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
    now.saturating_sub(fetched_at) >= ttl
}

fn find_key(jwks: &Jwks, kid: &str) -> Option<PublicKey> {
    PublicKey::from_jwks(jwks).into_iter().find(|k| k.kid == kid)
}

fn load_cache_file(path: &Path, url: &str) -> Option<CachedJwks> {
    let raw = std::fs::read(path).ok()?;
    match serde_json::from_slice::<CachedJwks>(&raw) {
        Ok(entry) if entry.url == url => Some(entry),
        Ok(entry) => {
            debug!(cached = %entry.url, url, "Ignoring JWKS cache for another URL");
            None
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Ignoring unreadable JWKS cache");
            None
        }
    }
}

async fn write_cache_file(path: &Path, entry: &CachedJwks) -> std::io::Result<()> {
    use tokio::io::AsyncWriteExt;

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let body = serde_json::to_vec_pretty(entry).map_err(std::io::Error::other)?;
    let tmp = path.with_extension("tmp");

    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);
    let mut file = options.open(&tmp).await?;
    file.write_all(&body).await?;
    file.sync_all().await?;
    drop(file);

    tokio::fs::rename(&tmp, path).await
}
