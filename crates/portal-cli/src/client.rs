//! HTTP client for the portal registration endpoint.

use std::time::Duration;

use portal_server::server::{ErrorBody, REGISTER_PATH, RegisterRequest, RegisterResponse};
use reqwest::StatusCode;
use reqwest::header::RETRY_AFTER;
use tracing::{debug, warn};

use crate::backoff::BackoffPolicy;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Registration client errors.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid request: {0}")]
    Validation(String),

    #[error("still rate limited after {attempts} attempts")]
    RateLimited { attempts: u32 },

    #[error("portal returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid portal URL {0:?}")]
    InvalidUrl(String),
}

impl From<ClientError> for portal_core::Error {
    fn from(e: ClientError) -> Self {
        match e {
            ClientError::Unauthorized(msg) => Self::Auth(msg),
            ClientError::NotFound(msg) => Self::NotFound(msg),
            ClientError::Conflict(msg) => Self::Conflict(msg),
            ClientError::Validation(msg) => Self::Validation(msg),
            ClientError::RateLimited { attempts } => Self::RateLimited { attempts },
            ClientError::InvalidUrl(url) => Self::Validation(format!("invalid portal URL {url:?}")),
            other @ (ClientError::Status { .. } | ClientError::Http(_)) => {
                Self::Transient(other.to_string())
            }
        }
    }
}

/// Map a non-success, non-429 response to a typed error.
pub fn status_error(status: StatusCode, message: String) -> ClientError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ClientError::Unauthorized(message),
        StatusCode::NOT_FOUND => ClientError::NotFound(message),
        StatusCode::CONFLICT => ClientError::Conflict(message),
        StatusCode::BAD_REQUEST => ClientError::Validation(message),
        other => ClientError::Status {
            status: other.as_u16(),
            message,
        },
    }
}

/// Registers nodes with a portal, retrying on `429 Too Many Requests`.
///
/// Dropping a returned future aborts the request in flight.
#[derive(Debug, Clone)]
pub struct RegistrationClient {
    http: reqwest::Client,
    base_url: String,
    policy: BackoffPolicy,
}

impl RegistrationClient {
    pub fn new(portal_url: &str) -> Result<Self, ClientError> {
        let base_url = portal_url.trim().trim_end_matches('/').to_string();
        let parsed =
            reqwest::Url::parse(&base_url).map_err(|_| ClientError::InvalidUrl(base_url.clone()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ClientError::InvalidUrl(base_url));
        }

        // reqwest is built with rustls-no-provider; `Err` means already installed.
        let _ = rustls::crypto::ring::default_provider().install_default();

        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(concat!("portalctl/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            base_url,
            policy: BackoffPolicy::default(),
        })
    }

    #[must_use]
    pub const fn with_policy(mut self, policy: BackoffPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `POST /api/v1/cluster/nodes/register`.
    ///
    /// `bearer` is the join token for a first registration; re-registrations
    /// put the node's client credentials in `req` instead.
    pub async fn register(
        &self,
        bearer: Option<&str>,
        req: &RegisterRequest,
    ) -> Result<RegisterResponse, ClientError> {
        let url = format!("{}{REGISTER_PATH}", self.base_url);
        let mut attempts = 0;
        loop {
            attempts += 1;
            let mut builder = self.http.post(&url).json(req);
            if let Some(token) = bearer {
                builder = builder.bearer_auth(token);
            }
            let resp = builder.send().await?;
            let status = resp.status();
            debug!(attempt = attempts, status = status.as_u16(), "Registration response");

            if status.is_success() {
                return Ok(resp.json().await?);
            }
            if status != StatusCode::TOO_MANY_REQUESTS {
                return Err(status_error(status, error_message(resp).await));
            }
            if !self.policy.should_retry(attempts) {
                return Err(ClientError::RateLimited { attempts });
            }

            let retry_after = resp
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            let delay = retry_delay(&self.policy, attempts, retry_after);
            warn!(
                attempt = attempts,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "Portal rate limited registration; backing off"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

/// `max(Retry-After, backoff)`, capped at the policy's `max_delay`.
pub fn retry_delay(policy: &BackoffPolicy, retry: u32, retry_after: Option<Duration>) -> Duration {
    let backoff = policy.delay(retry);
    retry_after
        .map_or(backoff, |ra| ra.max(backoff))
        .min(policy.max_delay)
}

async fn error_message(resp: reqwest::Response) -> String {
    let status = resp.status();
    let fallback = status.canonical_reason().unwrap_or("unknown error").to_string();
    match resp.json::<ErrorBody>().await {
        Ok(body) if !body.message.is_empty() => body.message,
        _ => fallback,
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn statuses_map_to_typed_errors() {
        let cases = [
            (StatusCode::UNAUTHORIZED, portal_core::error::EXIT_UNAUTHORIZED),
            (StatusCode::FORBIDDEN, portal_core::error::EXIT_UNAUTHORIZED),
            (StatusCode::NOT_FOUND, portal_core::error::EXIT_NOT_FOUND),
            (StatusCode::CONFLICT, portal_core::error::EXIT_CONFLICT),
            (StatusCode::BAD_REQUEST, portal_core::error::EXIT_VALIDATION),
            (StatusCode::INTERNAL_SERVER_ERROR, portal_core::error::EXIT_GENERIC),
            (StatusCode::BAD_GATEWAY, portal_core::error::EXIT_GENERIC),
        ];
        for (status, code) in cases {
            let err: portal_core::Error = status_error(status, "x".into()).into();
            assert_eq!(err.exit_code(), code, "{status}");
        }
    }

    #[test]
    fn rate_limited_exits_with_six() {
        let err: portal_core::Error = ClientError::RateLimited { attempts: 5 }.into();
        assert_eq!(err.exit_code(), 6);
    }

    #[test]
    fn retry_after_wins_when_longer_but_is_capped() {
        let policy = BackoffPolicy {
            jitter: 0.0,
            ..BackoffPolicy::default()
        };
        assert_eq!(retry_delay(&policy, 1, None), Duration::from_millis(500));
        assert_eq!(
            retry_delay(&policy, 1, Some(Duration::from_secs(3))),
            Duration::from_secs(3)
        );
        assert_eq!(
            retry_delay(&policy, 3, Some(Duration::from_secs(1))),
            Duration::from_secs(2)
        );
        assert_eq!(
            retry_delay(&policy, 1, Some(Duration::from_secs(120))),
            Duration::from_secs(8)
        );
    }

    #[test]
    fn rejects_non_http_urls() {
        assert!(matches!(
            RegistrationClient::new("ftp://portal"),
            Err(ClientError::InvalidUrl(_))
        ));
        assert!(RegistrationClient::new("not a url").is_err());
        let client = RegistrationClient::new("https://portal.example/").unwrap();
        assert_eq!(client.base_url(), "https://portal.example");
    }
}
