//! HTTP error responses.

use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use tracing::{error, warn};

use super::api::ErrorBody;
use crate::auth::AuthError;
use crate::provision::ProvisionError;
use crate::registry::RegistryError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Portal(#[from] portal_core::Error),

    /// Authenticated, but the token lacks the required scope or role.
    #[error("{0}")]
    Forbidden(String),

    #[error("too many registration requests; retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
}

impl ApiError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Portal(portal_core::Error::Validation(msg.into()))
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Portal(portal_core::Error::Auth(msg.into()))
    }

    pub const fn status(&self) -> StatusCode {
        use portal_core::Error as E;
        match self {
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::RateLimited { .. } | Self::Portal(E::RateLimited { .. }) => {
                StatusCode::TOO_MANY_REQUESTS
            }
            Self::Portal(e) => match e {
                E::Validation(_) | E::Json(_) => StatusCode::BAD_REQUEST,
                E::Auth(_) => StatusCode::UNAUTHORIZED,
                E::NotFound(_) => StatusCode::NOT_FOUND,
                E::Conflict(_) => StatusCode::CONFLICT,
                E::UnsupportedEngine(_) => StatusCode::NOT_IMPLEMENTED,
                E::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Forbidden(_) => "forbidden",
            Self::RateLimited { .. } => "rate_limited",
            Self::Portal(e) => e.kind(),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::MissingScope(scope) => {
                Self::Forbidden(format!("token lacks the {scope} scope"))
            }
            other => Self::Portal(other.into()),
        }
    }
}

impl From<RegistryError> for ApiError {
    fn from(e: RegistryError) -> Self {
        Self::Portal(e.into())
    }
}

impl From<ProvisionError> for ApiError {
    fn from(e: ProvisionError) -> Self {
        Self::Portal(e.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %self, "Request failed");
        } else {
            warn!(status = status.as_u16(), error = %self, "Request rejected");
        }

        let body = ErrorBody {
            error: self.kind().to_string(),
            message: self.to_string(),
        };
        let mut response = (status, Json(body)).into_response();
        if let Self::RateLimited { retry_after_secs } = self {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
        }
        response
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::auth::Scope;

    #[test]
    fn taxonomy_maps_to_status() {
        let cases = [
            (ApiError::validation("x"), StatusCode::BAD_REQUEST),
            (ApiError::unauthorized("x"), StatusCode::UNAUTHORIZED),
            (ApiError::Forbidden("x".into()), StatusCode::FORBIDDEN),
            (portal_core::Error::NotFound("x".into()).into(), StatusCode::NOT_FOUND),
            (portal_core::Error::Conflict("x".into()).into(), StatusCode::CONFLICT),
            (
                ApiError::RateLimited { retry_after_secs: 3 },
                StatusCode::TOO_MANY_REQUESTS,
            ),
            (
                portal_core::Error::UnsupportedEngine("pg".into()).into(),
                StatusCode::NOT_IMPLEMENTED,
            ),
            (
                portal_core::Error::Transient("x".into()).into(),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                portal_core::Error::Config("x".into()).into(),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(err.status(), status, "{err}");
        }
    }

    #[test]
    fn missing_scope_is_forbidden_not_unauthorized() {
        let err: ApiError = AuthError::MissingScope(Scope::Nodes).into();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        let err: ApiError = AuthError::BadSignature.into();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn rate_limited_sets_retry_after() {
        let response = ApiError::RateLimited { retry_after_secs: 7 }.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "7");
    }
}
