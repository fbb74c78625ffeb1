//! Registration client against a mock portal.

#![allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]

use std::collections::BTreeMap;
use std::time::Duration;

use portal_cli::backoff::BackoffPolicy;
use portal_cli::client::{ClientError, RegistrationClient};
use portal_cli::credentials::NodeCredentials;
use portal_server::provision::Credentials;
use portal_server::registry::{Node, NodeRole};
use portal_server::server::{NodeSecrets, REGISTER_PATH, RegisterRequest, RegisterResponse};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const NODE_UUID: &str = "3f2b1c7e-5d4a-4e8f-9a6b-0c1d2e3f4a5b";

fn fast_policy(max_attempts: u32) -> BackoffPolicy {
    BackoffPolicy {
        max_attempts,
        base_delay: Duration::from_millis(10),
        multiplier: 2.0,
        max_delay: Duration::from_millis(50),
        jitter: 0.0,
    }
}

fn request() -> RegisterRequest {
    RegisterRequest {
        node_name: "web-1".into(),
        node_role: Some(NodeRole::Instance),
        ..RegisterRequest::default()
    }
}

fn response() -> RegisterResponse {
    RegisterResponse {
        node: Node {
            uuid: NODE_UUID.into(),
            client_id: "cid_0123456789abcdef".into(),
            secret_hash: String::new(),
            name: "web-1".into(),
            role: NodeRole::Instance,
            labels: BTreeMap::new(),
            advertise_url: None,
            site_url: None,
            database: None,
            created_at: 1_772_366_400,
            updated_at: 1_772_366_400,
        },
        db: Some(Credentials {
            driver: "mysql".into(),
            host: "db.internal".into(),
            port: 3306,
            name: "pp_web_1_a1b2c3d4e5f6".into(),
            user: "pp_web_1_f6e5d4c3b2a1".into(),
            password: Some("pw".into()),
            dsn: Some("mysql://pp_web_1_f6e5d4c3b2a1:pw@db.internal:3306/pp_web_1_a1b2c3d4e5f6?charset=utf8mb4".into()),
            rotated_at: Some(1_772_366_400),
        }),
        secrets: Some(NodeSecrets {
            client_id: "cid_0123456789abcdef".into(),
            client_secret: "secret-1".into(),
            rotated_at: 1_772_366_400,
        }),
        already_registered: false,
        already_provisioned: false,
    }
}

fn error_body(kind: &str, message: &str) -> serde_json::Value {
    serde_json::json!({ "error": kind, "message": message })
}

#[tokio::test]
async fn retries_once_after_rate_limit_then_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(REGISTER_PATH))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("Retry-After", "0")
                .set_body_json(error_body("rate_limited", "slow down")),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(REGISTER_PATH))
        .and(header("authorization", "Bearer pjt_join"))
        .and(body_partial_json(serde_json::json!({ "nodeName": "web-1" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(response()))
        .mount(&server)
        .await;

    let client = RegistrationClient::new(&server.uri())
        .unwrap()
        .with_policy(fast_policy(5));
    let resp = client.register(Some("pjt_join"), &request()).await.unwrap();

    assert_eq!(resp.node.uuid, NODE_UUID);
    assert_eq!(resp.secrets.unwrap().client_secret, "secret-1");
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn gives_up_after_max_attempts() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(REGISTER_PATH))
        .respond_with(ResponseTemplate::new(429).set_body_json(error_body("rate_limited", "no")))
        .expect(3)
        .mount(&server)
        .await;

    let client = RegistrationClient::new(&server.uri())
        .unwrap()
        .with_policy(fast_policy(3));
    let err = client.register(Some("pjt_join"), &request()).await.unwrap_err();

    assert!(matches!(err, ClientError::RateLimited { attempts: 3 }), "{err:?}");
    let err: portal_core::Error = err.into();
    assert_eq!(err.exit_code(), portal_core::error::EXIT_RATE_LIMITED);
}

#[tokio::test]
async fn unauthorized_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(REGISTER_PATH))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(error_body("unauthorized", "bad join token")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = RegistrationClient::new(&server.uri())
        .unwrap()
        .with_policy(fast_policy(5));
    let err = client.register(Some("wrong"), &request()).await.unwrap_err();

    match &err {
        ClientError::Unauthorized(msg) => assert_eq!(msg, "bad join token"),
        other => panic!("expected unauthorized, got {other:?}"),
    }
    let err: portal_core::Error = err.into();
    assert_eq!(err.exit_code(), portal_core::error::EXIT_UNAUTHORIZED);
}

#[tokio::test]
async fn conflict_maps_to_exit_five() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(REGISTER_PATH))
        .respond_with(
            ResponseTemplate::new(409).set_body_json(error_body("conflict", "name is taken")),
        )
        .mount(&server)
        .await;

    let client = RegistrationClient::new(&server.uri()).unwrap();
    let err: portal_core::Error = client
        .register(Some("pjt_join"), &request())
        .await
        .unwrap_err()
        .into();
    assert_eq!(err.exit_code(), portal_core::error::EXIT_CONFLICT);
    assert!(err.to_string().contains("name is taken"));
}

#[tokio::test]
async fn server_error_without_body_uses_reason_phrase() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(REGISTER_PATH))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let client = RegistrationClient::new(&server.uri()).unwrap();
    let err = client.register(Some("pjt_join"), &request()).await.unwrap_err();
    match err {
        ClientError::Status { status, message } => {
            assert_eq!(status, 503);
            assert_eq!(message, "Service Unavailable");
        }
        other => panic!("expected status error, got {other:?}"),
    }
}

#[tokio::test]
async fn reregistration_sends_client_credentials_and_keeps_saved_secrets() {
    let server = MockServer::start().await;
    let mut again = response();
    again.secrets = None;
    again.already_registered = true;
    again.already_provisioned = true;
    if let Some(db) = again.db.as_mut() {
        db.password = None;
        db.dsn = None;
    }
    Mock::given(method("POST"))
        .and(path(REGISTER_PATH))
        .and(body_partial_json(serde_json::json!({
            "clientId": "cid_0123456789abcdef",
            "clientSecret": "secret-1",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(again))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("credentials.json");
    NodeCredentials::merge(None, &server.uri(), &response())
        .unwrap()
        .save(&path)
        .unwrap();
    let stored = NodeCredentials::load(&path).unwrap();

    let req = RegisterRequest {
        node_uuid: Some(stored.node_uuid.clone()),
        client_id: Some(stored.client_id.clone()),
        client_secret: Some(stored.client_secret.clone()),
        ..request()
    };
    let client = RegistrationClient::new(&server.uri()).unwrap();
    let resp = client.register(None, &req).await.unwrap();
    assert!(resp.already_registered);

    let merged = NodeCredentials::merge(Some(stored), &server.uri(), &resp).unwrap();
    assert_eq!(merged.client_secret, "secret-1");
    assert_eq!(merged.db.unwrap().password.as_deref(), Some("pw"));
}
