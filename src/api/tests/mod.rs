use super::*;
use crate::jobs::test_helpers::*;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use serde_json::{Value, json};
use std::time::Duration;
use tower::ServiceExt;


/// Send one request through a fresh router and decode the JSON body (Null if not JSON)
async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn api_server_spawns() {
    let mut config = test_config();
    config.api.bind_address = "127.0.0.1:0".parse().unwrap();
    let h = create_test_manager_with(config, StubFetch::new());

    let api_handle = tokio::spawn(start_api_server(h.manager.clone()));
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(!api_handle.is_finished(), "server exited early");
    api_handle.abort();
}

#[tokio::test]
async fn cors_headers_are_added_when_enabled() {
    let h = create_test_manager();
    let app = create_router(h.manager.clone());

    let request = Request::builder()
        .uri("/health")
        .header("Origin", "http://localhost:3000")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response
            .headers()
            .contains_key("access-control-allow-origin")
    );
}

#[tokio::test]
async fn cors_can_be_restricted_to_listed_origins() {
    let mut config = test_config();
    config.api.cors_origins = vec!["https://app.test".to_string()];
    let h = create_test_manager_with(config, StubFetch::new());

    let request = |origin: &str| {
        Request::builder()
            .uri("/health")
            .header("Origin", origin)
            .body(Body::empty())
            .unwrap()
    };

    let allowed = create_router(h.manager.clone())
        .oneshot(request("https://app.test"))
        .await
        .unwrap();
    assert_eq!(
        allowed.headers()["access-control-allow-origin"],
        "https://app.test"
    );

    let denied = create_router(h.manager.clone())
        .oneshot(request("https://other.test"))
        .await
        .unwrap();
    assert!(
        !denied
            .headers()
            .contains_key("access-control-allow-origin")
    );
}

#[tokio::test]
async fn swagger_ui_can_be_disabled() {
    let mut config = test_config();
    config.api.swagger_ui = false;
    let h = create_test_manager_with(config, StubFetch::new());

    let (status, _) = send(create_router(h.manager.clone()), get("/swagger-ui/")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let h = create_test_manager();
    let (status, _) = send(create_router(h.manager.clone()), get("/swagger-ui/")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn finished_archives_are_served_under_files() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config();
    config.storage.output_dir = dir.path().to_path_buf();
    std::fs::create_dir_all(dir.path().join("exports/evt")).unwrap();
    std::fs::write(dir.path().join("exports/evt/evt-part-1.zip"), b"PK").unwrap();

    let h = create_test_manager_with(config.clone(), StubFetch::new());
    let response = create_router(h.manager.clone())
        .oneshot(get("/files/exports/evt/evt-part-1.zip"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&body[..], b"PK");

    config.storage.serve_outputs = false;
    let h = create_test_manager_with(config, StubFetch::new());
    let (status, _) = send(
        create_router(h.manager.clone()),
        get("/files/exports/evt/evt-part-1.zip"),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
