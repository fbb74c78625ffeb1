#![allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use serde_json::{Value, json};
use tower::ServiceExt;

use portal_core::PortalConfig;
use portal_server::auth::{ClaimsSpec, KeyManager, Scope, TokenIssuer};
use portal_server::provision::fake::FakeAdmin;
use portal_server::provision::CredentialProvisioner;
use portal_server::registry::SqliteNodeRegistry;
use portal_server::server::{AppState, Registrar, build_router};
use portal_server::storage::PortalDatabase;

const CLUSTER: &str = "4f1e2d3c-0000-4000-8000-000000000001";
const JOIN: &str = "pjt_integration-join-token";

struct Harness {
    app: axum::Router,
    state: AppState,
    admin: FakeAdmin,
}

async fn harness_with_limit(limit: u32) -> Harness {
    let config = PortalConfig {
        cluster_uuid: Some(CLUSTER.to_string()),
        registration_rate_limit: limit,
        ..Default::default()
    };
    let db = PortalDatabase::open_in_memory().await.unwrap();
    let admin = FakeAdmin::new();
    let registrar = Registrar::new(
        CLUSTER,
        Some(JOIN.to_string()),
        Arc::new(SqliteNodeRegistry::new(db.clone())),
    )
    .with_provisioner(CredentialProvisioner::new(
        Arc::new(admin.clone()),
        "mysql",
        "db.internal",
        3306,
    ));
    let keys = Arc::new(KeyManager::new(db, Duration::from_secs(86_400)));
    keys.ensure_active_key().await.unwrap();

    let state = AppState::from_parts(&config, keys, registrar).unwrap();
    Harness {
        app: build_router(state.clone()),
        state,
        admin,
    }
}

async fn harness() -> Harness {
    harness_with_limit(0).await
}

/// Send a request and return (status, headers, JSON body or `Value::Null`).
async fn send(app: &axum::Router, req: Request<Body>) -> (StatusCode, header::HeaderMap, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let headers = resp.headers().clone();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, headers, body)
}

fn register_req(bearer: Option<&str>, body: &Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri("/api/v1/cluster/nodes/register")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn token_req(form: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/api/v1/oauth/token")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(form.to_string()))
        .unwrap()
}

fn get(uri: &str, bearer: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

async fn admin_token(state: &AppState, scope: Scope) -> String {
    TokenIssuer::new(Arc::clone(&state.keys))
        .issue(&ClaimsSpec {
            issuer: state.issuer.clone(),
            subject: "operator".into(),
            audience: vec![state.issuer.clone()],
            scope: vec![scope],
            ttl_secs: 300,
        })
        .await
        .unwrap()
}

#[tokio::test]
async fn health_reports_cluster_and_active_key() {
    let h = harness().await;
    let (status, _, body) = send(&h.app, get("/api/v1/cluster/health", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["clusterUuid"], CLUSTER);
    let kid = h.state.keys.active_key().await.unwrap().kid().to_string();
    assert_eq!(body["activeKid"], kid);
}

#[tokio::test]
async fn jwks_is_served_on_both_paths() {
    let h = harness().await;
    for uri in ["/.well-known/jwks.json", "/api/v1/cluster/jwks"] {
        let (status, _, body) = send(&h.app, get(uri, None)).await;
        assert_eq!(status, StatusCode::OK, "{uri}");
        let keys = body["keys"].as_array().unwrap();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0]["kty"], "OKP");
        assert_eq!(keys[0]["crv"], "Ed25519");
        assert!(keys[0]["kid"].is_string());
    }
}

#[tokio::test]
async fn register_then_reregister() {
    let h = harness().await;
    let body = json!({ "nodeName": "web-1", "nodeRole": "instance", "labels": {"zone": "eu-1"} });

    let (status, _, first) = send(&h.app, register_req(Some(JOIN), &body)).await;
    assert_eq!(status, StatusCode::OK, "{first}");
    assert_eq!(first["alreadyRegistered"], false);
    assert_eq!(first["node"]["name"], "web-1");
    assert_eq!(first["node"]["labels"]["zone"], "eu-1");
    assert!(first["node"].get("secretHash").is_none());
    assert!(first["secrets"]["clientSecret"].is_string());
    assert!(first["db"]["password"].is_string());
    assert!(first["db"]["dsn"].as_str().unwrap().starts_with("mysql://"));

    let user = first["db"]["user"].as_str().unwrap();
    assert!(h.admin.password_of(user).await.is_some());

    let (status, _, second) = send(&h.app, register_req(Some(JOIN), &body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["alreadyRegistered"], true);
    assert_eq!(second["alreadyProvisioned"], true);
    assert!(second.get("secrets").is_none());
    assert!(second["db"].get("password").is_none());
    assert_eq!(second["node"]["uuid"], first["node"]["uuid"]);
}

#[tokio::test]
async fn register_without_join_token_is_unauthorized() {
    let h = harness().await;
    let body = json!({ "nodeName": "web-1" });

    let (status, _, resp) = send(&h.app, register_req(None, &body)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(resp["error"], "unauthorized");

    let (status, _, _) = send(&h.app, register_req(Some("pjt_nope"), &body)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn register_rejects_bad_input() {
    let h = harness().await;

    let (status, _, resp) = send(&h.app, register_req(Some(JOIN), &json!({ "nodeName": "Not A Label" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(resp["error"], "validation");

    let malformed = Request::builder()
        .method(Method::POST)
        .uri("/api/v1/cluster/nodes/register")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, format!("Bearer {JOIN}"))
        .body(Body::from("{not json"))
        .unwrap();
    let (status, _, _) = send(&h.app, malformed).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn rename_collision_is_conflict() {
    let h = harness().await;
    let (_, _, a) = send(&h.app, register_req(Some(JOIN), &json!({ "nodeName": "web-1" }))).await;
    send(&h.app, register_req(Some(JOIN), &json!({ "nodeName": "web-2" }))).await;

    let body = json!({ "nodeName": "web-2", "nodeUuid": a["node"]["uuid"] });
    let (status, _, resp) = send(&h.app, register_req(Some(JOIN), &body)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(resp["error"], "conflict");
}

#[tokio::test]
async fn registration_is_rate_limited() {
    let h = harness_with_limit(1).await;
    let body = json!({ "nodeName": "web-1" });

    let (status, _, _) = send(&h.app, register_req(Some(JOIN), &body)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, headers, resp) = send(&h.app, register_req(Some(JOIN), &body)).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(resp["error"], "rate_limited");
    let retry: u64 = headers[header::RETRY_AFTER].to_str().unwrap().parse().unwrap();
    assert!((1..=60).contains(&retry));
}

#[tokio::test]
async fn client_credentials_grant_issues_cluster_token() {
    let h = harness().await;
    let (_, _, reg) = send(&h.app, register_req(Some(JOIN), &json!({ "nodeName": "web-1" }))).await;
    let client_id = reg["secrets"]["clientId"].as_str().unwrap();
    let client_secret = reg["secrets"]["clientSecret"].as_str().unwrap();
    let node_uuid = reg["node"]["uuid"].as_str().unwrap();

    let form = format!("grant_type=client_credentials&client_id={client_id}&client_secret={client_secret}");
    let (status, headers, body) = send(&h.app, token_req(&form)).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(headers[header::CACHE_CONTROL], "no-store");
    assert_eq!(body["token_type"], "Bearer");
    assert_eq!(body["scope"], "cluster");
    assert_eq!(body["expires_in"], 3600);

    let token = body["access_token"].as_str().unwrap();
    let claims = h.state.verifier.authorize(token, Scope::Cluster).await.unwrap();
    assert_eq!(claims.sub, format!("node:{node_uuid}"));
    assert_eq!(claims.iss, format!("portal:{CLUSTER}"));

    // A cluster token cannot administer nodes.
    let (status, _, resp) = send(&h.app, get("/api/v1/cluster/nodes", Some(token))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(resp["error"], "forbidden");
}

#[tokio::test]
async fn client_credentials_grant_rejects_bad_requests() {
    let h = harness().await;
    let (_, _, reg) = send(&h.app, register_req(Some(JOIN), &json!({ "nodeName": "web-1" }))).await;
    let client_id = reg["secrets"]["clientId"].as_str().unwrap();
    let client_secret = reg["secrets"]["clientSecret"].as_str().unwrap();

    let (status, _, _) = send(
        &h.app,
        token_req(&format!("grant_type=password&client_id={client_id}&client_secret={client_secret}")),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, _) = send(
        &h.app,
        token_req(&format!("grant_type=client_credentials&client_id={client_id}&client_secret=wrong")),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _, _) = send(
        &h.app,
        token_req(&format!(
            "grant_type=client_credentials&client_id={client_id}&client_secret={client_secret}&scope=bogus"
        )),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, _) = send(
        &h.app,
        token_req(&format!(
            "grant_type=client_credentials&client_id={client_id}&client_secret={client_secret}&scope=nodes"
        )),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn node_admin_requires_nodes_scope() {
    let h = harness().await;
    let (_, _, reg) = send(&h.app, register_req(Some(JOIN), &json!({ "nodeName": "web-1" }))).await;
    let uuid = reg["node"]["uuid"].as_str().unwrap().to_string();
    let user = reg["db"]["user"].as_str().unwrap().to_string();

    let (status, _, _) = send(&h.app, get("/api/v1/cluster/nodes", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let token = admin_token(&h.state, Scope::Nodes).await;
    let (status, _, list) = send(&h.app, get("/api/v1/cluster/nodes", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);
    assert_eq!(list[0]["uuid"], uuid.as_str());

    let delete = Request::builder()
        .method(Method::DELETE)
        .uri(format!("/api/v1/cluster/nodes/{uuid}?dropDatabase=true"))
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    let (status, _, _) = send(&h.app, delete).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(h.admin.password_of(&user).await.is_none());

    let (_, _, list) = send(&h.app, get("/api/v1/cluster/nodes", Some(&token))).await;
    assert!(list.as_array().unwrap().is_empty());

    let missing = Request::builder()
        .method(Method::DELETE)
        .uri(format!("/api/v1/cluster/nodes/{uuid}"))
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    let (status, _, resp) = send(&h.app, missing).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(resp["error"], "not_found");
}
