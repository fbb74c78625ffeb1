//! HTTP handlers.

use axum::Json;
use axum::extract::rejection::{FormRejection, JsonRejection, QueryRejection};
use axum::extract::{Form, Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::IntoResponse;
use portal_crypto::Jwks;
use serde::Deserialize;
use tracing::{info, instrument};

use super::AppState;
use super::api::{HealthResponse, RegisterRequest, RegisterResponse, TokenRequest, TokenResponse};
use super::error::ApiError;
use crate::auth::{Claims, ClaimsSpec, Scope};
use crate::registry::{Node, NodeRole};

/// The value of `Authorization: Bearer <token>`, if present.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| {
            v.strip_prefix("Bearer ")
                .or_else(|| v.strip_prefix("bearer "))
        })
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

async fn require_scope(
    state: &AppState,
    headers: &HeaderMap,
    scope: Scope,
) -> Result<Claims, ApiError> {
    let token = bearer_token(headers).ok_or_else(|| ApiError::unauthorized("missing bearer token"))?;
    Ok(state.verifier.authorize(token, scope).await?)
}

/// `POST /api/v1/cluster/nodes/register`
#[instrument(skip_all)]
pub async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<Json<RegisterResponse>, ApiError> {
    state
        .limiter
        .check()
        .map_err(|retry_after_secs| ApiError::RateLimited { retry_after_secs })?;
    let Json(req) = body.map_err(|e| ApiError::validation(e.body_text()))?;

    let response = state
        .registrar
        .register(bearer_token(&headers), req)
        .await
        .map_err(portal_core::Error::from)?;
    Ok(Json(response))
}

/// `POST /api/v1/oauth/token`
#[instrument(skip_all)]
pub async fn token(
    State(state): State<AppState>,
    form: Result<Form<TokenRequest>, FormRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Form(req) = form.map_err(|e| ApiError::validation(e.body_text()))?;
    if req.grant_type != "client_credentials" {
        return Err(ApiError::validation(format!(
            "unsupported grant_type {:?}",
            req.grant_type
        )));
    }

    let node = state
        .registrar
        .authenticate_client(&req.client_id, &req.client_secret)
        .await
        .map_err(portal_core::Error::from)?;

    let scope = match req.scope.as_deref().map(str::trim) {
        Some(list) if !list.is_empty() => Scope::parse_list(list)?,
        _ => vec![Scope::Cluster],
    };
    if scope.contains(&Scope::Nodes) && node.role != NodeRole::Portal {
        return Err(ApiError::Forbidden(format!(
            "role {} may not request the nodes scope",
            node.role
        )));
    }

    let spec = ClaimsSpec {
        issuer: state.issuer.clone(),
        subject: format!("node:{}", node.uuid),
        audience: vec![state.issuer.clone()],
        scope,
        ttl_secs: state.token_ttl_secs,
    };
    let access_token = state.tokens.issue(&spec).await?;
    info!(node_uuid = %node.uuid, scope = %Scope::join(&spec.scope), "Access token issued");

    let body = TokenResponse {
        access_token,
        token_type: "Bearer".to_string(),
        expires_in: spec.effective_ttl(),
        scope: Scope::join(&spec.scope),
    };
    Ok(([(header::CACHE_CONTROL, "no-store")], Json(body)))
}

/// `GET /.well-known/jwks.json` and `GET /api/v1/cluster/jwks`
pub async fn jwks(State(state): State<AppState>) -> Result<Json<Jwks>, ApiError> {
    Ok(Json(state.keys.jwks().await?))
}

/// `GET /api/v1/cluster/nodes`
#[instrument(skip_all)]
pub async fn list_nodes(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Node>>, ApiError> {
    require_scope(&state, &headers, Scope::Nodes).await?;
    Ok(Json(state.registrar.registry().list().await?))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveParams {
    #[serde(default)]
    pub drop_database: bool,
}

/// `DELETE /api/v1/cluster/nodes/{uuid}`
#[instrument(skip(state, headers, params))]
pub async fn remove_node(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(uuid): Path<String>,
    params: Result<Query<RemoveParams>, QueryRejection>,
) -> Result<StatusCode, ApiError> {
    let claims = require_scope(&state, &headers, Scope::Nodes).await?;
    let Query(params) = params.map_err(|e| ApiError::validation(e.body_text()))?;

    state
        .registrar
        .remove(&uuid, params.drop_database)
        .await
        .map_err(portal_core::Error::from)?;
    info!(node_uuid = %uuid, by = %claims.sub, "Node removed over API");
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/v1/cluster/health`
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let active_kid = state
        .keys
        .active_key()
        .await
        .ok()
        .map(|k| k.kid().to_string());
    Json(HealthResponse {
        status: "ok".to_string(),
        cluster_uuid: state.cluster_uuid.clone(),
        active_kid,
    })
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn headers(auth: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(header::AUTHORIZATION, HeaderValue::from_str(auth).unwrap());
        h
    }

    #[test]
    fn bearer_is_extracted() {
        assert_eq!(bearer_token(&headers("Bearer abc")), Some("abc"));
        assert_eq!(bearer_token(&headers("bearer  abc ")), Some("abc"));
    }

    #[test]
    fn other_schemes_and_empty_tokens_are_ignored() {
        assert_eq!(bearer_token(&headers("Basic Zm9vOmJhcg==")), None);
        assert_eq!(bearer_token(&headers("Bearer ")), None);
        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }
}
