use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use plants_service::comms::{create_router, AppState};
use plants_service::config::Config;
use plants_service::security::issue_token;

const SECRET: &str = "local-backend-secret";

fn config_for(dir: &std::path::Path) -> Config {
    let env: HashMap<&str, String> = HashMap::from([
        ("JWT_SECRET", SECRET.to_string()),
        ("ASSET_BACKEND", "local".to_string()),
        ("UPLOAD_DIR", dir.join("uploads").display().to_string()),
        ("PUBLIC_BASE_URL", "http://plants.test".to_string()),
        ("PLANTS_DATA_FILE", dir.join("plants.json").display().to_string()),
    ]);
    Config::from_lookup(|key| env.get(key).cloned()).unwrap()
}

async fn router(config: &Config) -> axum::Router {
    create_router(Arc::new(AppState::from_config(config).await.unwrap()))
}

fn create_request(token: &str) -> Request<Body> {
    let body = "--b\r\n\
        Content-Disposition: form-data; name=\"name\"\r\n\r\nBasil\r\n\
        --b\r\n\
        Content-Disposition: form-data; name=\"description\"\r\n\r\nKitchen herb\r\n\
        --b\r\n\
        Content-Disposition: form-data; name=\"season\"\r\n\r\nSummer\r\n\
        --b\r\n\
        Content-Disposition: form-data; name=\"image\"; filename=\"basil leaf.png\"\r\n\
        Content-Type: image/png\r\n\r\n\
        BASILBYTES\r\n\
        --b--\r\n";
    Request::builder()
        .method("POST")
        .uri("/plants")
        .header("authorization", token)
        .header("content-type", "multipart/form-data; boundary=b")
        .body(Body::from(body))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_uploaded_image_is_served_back() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_for(dir.path());
    let app = router(&config).await;
    let token = issue_token(SECRET.as_bytes(), "tester", Duration::from_secs(60)).unwrap();

    let response = app.clone().oneshot(create_request(&token)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let created = json_body(response).await;

    let url = created["image"].as_str().unwrap();
    let path = url.strip_prefix("http://plants.test").unwrap();
    assert!(path.starts_with("/uploads/"));

    let response = app
        .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"BASILBYTES");
}

#[tokio::test]
async fn test_records_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_for(dir.path());
    let token = issue_token(SECRET.as_bytes(), "tester", Duration::from_secs(60)).unwrap();

    let created = {
        let app = router(&config).await;
        let response = app.oneshot(create_request(&token)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        json_body(response).await
    };

    let app = router(&config).await;
    let uri = format!("/plants/{}", created["uuid"].as_str().unwrap());
    let response = app
        .oneshot(
            Request::builder()
                .uri(uri)
                .header("authorization", &token)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, created);

    let on_disk = std::fs::read_to_string(dir.path().join("plants.json")).unwrap();
    assert!(on_disk.contains("Basil"));
}

#[tokio::test]
async fn test_oversized_upload_is_413() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_for(dir.path());
    let state = AppState::from_config(&config).await.unwrap().with_max_upload_bytes(64);
    let app = create_router(Arc::new(state));
    let token = issue_token(SECRET.as_bytes(), "tester", Duration::from_secs(60)).unwrap();

    let response = app.oneshot(create_request(&token)).await.unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_oversized_json_body_is_413() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_for(dir.path());
    let state = AppState::from_config(&config).await.unwrap().with_max_upload_bytes(64);
    let app = create_router(Arc::new(state));
    let token = issue_token(SECRET.as_bytes(), "tester", Duration::from_secs(60)).unwrap();

    let body = serde_json::json!({
        "name": "Basil",
        "description": "x".repeat(200),
        "season": "Summer",
    });
    let request = Request::builder()
        .method("POST")
        .uri("/plants")
        .header("authorization", &token)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(json_body(response).await["message"], "Upload too large");
}
