//! HTTP tests for the records API, run against the full router
//! over an in-memory (or temporary file) world state.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header::AUTHORIZATION, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use cidstore_daemon::http_server;
use cidstore_daemon::{ServiceConfig, ServiceState};
use common::prelude::{Identity, OrdererConfig, OwnerQueryPolicy};

fn token(label: &str) -> String {
    format!("secret-{}", label)
}

/// Every identity gets its own token, the first one is the default
fn config(labels: &[&str], policy: OwnerQueryPolicy, sqlite_path: Option<PathBuf>) -> ServiceConfig {
    ServiceConfig {
        identities: labels
            .iter()
            .map(|label| Identity::x509(*label, "Org1MSP"))
            .collect(),
        tokens: labels
            .iter()
            .map(|label| (token(label), label.to_string()))
            .collect(),
        default_identity: labels[0].to_string(),
        owner_query_policy: policy,
        orderer: OrdererConfig {
            max_message_count: 1,
            batch_timeout: Duration::from_millis(10),
        },
        sqlite_path,
        ..Default::default()
    }
}

/// Let requests without credentials act as the default identity
fn anonymous_default(mut config: ServiceConfig) -> ServiceConfig {
    let default = config.default_identity.clone();
    config.tokens.retain(|_, label| *label != default);
    config
}

async fn router_for(config: &ServiceConfig) -> Router {
    let state = ServiceState::from_config(config).await.unwrap();
    let http_config = http_server::Config::new(SocketAddr::from(([127, 0, 0, 1], 0)));
    http_server::router(http_config, state)
}

async fn setup(labels: &[&str]) -> Router {
    router_for(&config(labels, OwnerQueryPolicy::CallerOnly, None)).await
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, value)
}

fn get(uri: &str, as_label: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(label) = as_label {
        builder = builder.header(AUTHORIZATION, format!("Bearer {}", token(label)));
    }
    builder.body(Body::empty()).unwrap()
}

fn store(body: Value, as_label: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/v0/records")
        .header("content-type", "application/json");
    if let Some(label) = as_label {
        builder = builder.header(AUTHORIZATION, format!("Bearer {}", token(label)));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

#[tokio::test]
async fn test_store_then_read_back() {
    let router = setup(&["appUser"]).await;

    let (status, body) = send(
        &router,
        store(json!({"cid": "Qm123", "fileName": "photo.png"}), Some("appUser")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
    assert_eq!(body["result"]["cid"], "Qm123");
    assert_eq!(body["result"]["fileName"], "photo.png");
    assert_eq!(body["result"]["docType"], "cidRecord");
    assert_eq!(
        body["result"]["owner"],
        "x509::CN=appUser,OU=client::CN=ca.org1"
    );

    let (status, body) = send(&router, get("/api/v0/records/Qm123", Some("appUser"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"]["fileName"], "photo.png");

    let (status, body) = send(&router, get("/api/v0/records", Some("appUser"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_fingerprint_alias_in_body() {
    let router = setup(&["appUser"]).await;
    let (status, body) = send(
        &router,
        store(json!({"fingerprint": "Qm9", "fileName": "a.txt"}), Some("appUser")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["result"]["cid"], "Qm9");
}

#[tokio::test]
async fn test_missing_record_is_not_found() {
    let router = setup(&["appUser"]).await;
    let (status, body) = send(
        &router,
        get("/api/v0/records/QmMissing", Some("appUser")),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert_eq!(body["kind"], "NotFound");
    assert_eq!(body["error"], "the CID QmMissing does not exist");
    assert!(body.get("detail").is_none());
}

#[tokio::test]
async fn test_bad_input_is_a_validation_error() {
    let router = setup(&["appUser"]).await;

    let (status, body) = send(
        &router,
        store(json!({"cid": "", "fileName": "a"}), Some("appUser")),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "ValidationError");

    let (status, body) = send(&router, store(json!({"cid": "Qm1"}), Some("appUser")))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "ValidationError");
}

#[tokio::test]
async fn test_requests_need_a_valid_credential() {
    let router = setup(&["appUser", "user2"]).await;

    let (status, body) = send(&router, get("/api/v0/records", Some("mallory"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["kind"], "AuthenticationError");

    // the default identity has a token, so it cannot be used without one
    let (status, _) = send(&router, get("/api/v0/records", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = send(
        &router,
        store(json!({"cid": "Qm1", "fileName": "a"}), None),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let malformed = Request::builder()
        .uri("/api/v0/records")
        .header(AUTHORIZATION, "Basic dXNlcjI6")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&router, malformed).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&router, get("/api/v0/records", Some("user2"))).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_anonymous_requests_act_as_default_identity() {
    let config = anonymous_default(config(
        &["appUser", "user2"],
        OwnerQueryPolicy::CallerOnly,
        None,
    ));
    let router = router_for(&config).await;

    let (status, body) = send(
        &router,
        store(json!({"cid": "Qm1", "fileName": "mine.txt"}), None),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(
        body["result"]["owner"],
        "x509::CN=appUser,OU=client::CN=ca.org1"
    );
    send(
        &router,
        store(json!({"cid": "Qm1", "fileName": "theirs.txt"}), Some("user2")),
    )
    .await;

    let (_, body) = send(&router, get("/api/v0/records/Qm1", None)).await;
    assert_eq!(body["result"]["fileName"], "mine.txt");
    let (_, body) = send(&router, get("/api/v0/records", None)).await;
    assert_eq!(body["result"].as_array().unwrap().len(), 1);

    // a default identity without a token cannot be named by one
    let (status, _) = send(&router, get("/api/v0/records", Some("appUser"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_owners_are_independent() {
    let router = setup(&["user1", "user2"]).await;

    for (identity, file) in [("user1", "one.txt"), ("user2", "two.txt")] {
        let (status, _) = send(
            &router,
            store(json!({"cid": "QmShared", "fileName": file}), Some(identity)),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (_, body) = send(&router, get("/api/v0/records/QmShared", Some("user1"))).await;
    assert_eq!(body["result"]["fileName"], "one.txt");
    let (_, body) = send(&router, get("/api/v0/records/QmShared", Some("user2"))).await;
    assert_eq!(body["result"]["fileName"], "two.txt");

    let (_, body) = send(&router, get("/api/v0/records", Some("user2"))).await;
    let entries = body["result"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["owner"], "x509::CN=user2,OU=client::CN=ca.org1");
}

#[tokio::test]
async fn test_owner_query_respects_policy() {
    let user1 = "x509::CN=user1,OU=client::CN=ca.org1";
    let user2 = "x509::CN=user2,OU=client::CN=ca.org1";
    let owner_uri = |owner: &str| format!("/api/v0/owners/{}/records", owner);

    let router = setup(&["user1", "user2"]).await;
    send(
        &router,
        store(json!({"cid": "Qm1", "fileName": "a"}), Some("user2")),
    )
    .await;

    let (status, body) = send(&router, get(&owner_uri(user2), Some("user1"))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["kind"], "Forbidden");

    let (status, body) = send(&router, get(&owner_uri(user1), Some("user1"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"], json!([]));

    let open = router_for(&config(&["user1", "user2"], OwnerQueryPolicy::Open, None)).await;
    send(
        &open,
        store(json!({"cid": "Qm1", "fileName": "a"}), Some("user2")),
    )
    .await;
    let (status, body) = send(&open, get(&owner_uri(user2), Some("user1"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"][0]["cid"], "Qm1");
}

#[tokio::test]
async fn test_status_routes() {
    let router = setup(&["appUser"]).await;

    let (status, body) = send(&router, get("/_status/livez", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, body) = send(&router, get("/_status/readyz", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, _) = send(&router, get("/_status/version", None)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&router, get("/api/v0/nothing-here", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_records_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("db.sqlite");
    std::fs::write(&db_path, "").unwrap();
    let config = anonymous_default(config(
        &["appUser"],
        OwnerQueryPolicy::CallerOnly,
        Some(db_path),
    ));

    {
        let router = router_for(&config).await;
        let (status, _) = send(
            &router,
            store(json!({"cid": "QmKeep", "fileName": "keep.txt"}), None),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    // the ledger resumes after its last committed block
    let router = router_for(&config).await;
    let (status, body) = send(&router, get("/api/v0/records/QmKeep", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"]["fileName"], "keep.txt");

    let (status, _) = send(
        &router,
        store(json!({"cid": "QmNext", "fileName": "next.txt"}), None),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let (_, body) = send(&router, get("/api/v0/records", None)).await;
    assert_eq!(body["result"].as_array().unwrap().len(), 2);
}
