//! API integration tests.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use kinetic_api::{create_router, ApiConfig, AppState};
use kinetic_media::{FfmpegEncoder, FfprobeProbe, SvgRasterizer};
use kinetic_worker::{JobManager, Pipeline, WorkerConfig};

fn test_router(dir: &TempDir) -> Router {
    let worker_config = WorkerConfig {
        work_dir: dir.path().join("work"),
        output_dir: dir.path().join("out"),
        cleanup_inputs: false,
        ..Default::default()
    };
    let pipeline = Pipeline::new(
        worker_config,
        Arc::new(FfprobeProbe),
        Arc::new(SvgRasterizer::new()),
        Arc::new(FfmpegEncoder),
    );
    let state = AppState::new(ApiConfig::default(), JobManager::new(pipeline));
    create_router(state, None)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let dir = TempDir::new().unwrap();
    let response = test_router(&dir)
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(body_json(response).await["status"], "healthy");
}

#[tokio::test]
async fn test_metrics_disabled_is_not_found() {
    let dir = TempDir::new().unwrap();
    let response = test_router(&dir)
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_submit_missing_file_is_bad_request() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("missing.mp4");
    let response = test_router(&dir)
        .oneshot(post_json(
            "/api/jobs",
            json!({ "source": { "kind": "video", "path": missing } }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body["detail"].as_str().unwrap().contains("not found"));
}

#[tokio::test]
async fn test_unknown_job_is_not_found() {
    let dir = TempDir::new().unwrap();
    let router = test_router(&dir);

    let response = router
        .clone()
        .oneshot(Request::builder().uri("/api/jobs/nope").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = router
        .oneshot(post_json("/api/jobs/nope/cancel", json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_submit_then_poll() {
    let dir = TempDir::new().unwrap();
    let router = test_router(&dir);

    let response = router
        .clone()
        .oneshot(post_json(
            "/api/jobs",
            json!({ "source": { "kind": "solid", "color": "navy", "width": 320, "height": 240, "duration_secs": 1.0 } }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = body_json(response).await;
    assert_eq!(body["state"], "pending");
    let job_id = body["job_id"].as_str().unwrap().to_string();

    let response = router
        .oneshot(
            Request::builder()
                .uri(format!("/api/jobs/{}", job_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["job_id"], job_id.as_str());
    assert_eq!(body["source"], "solid");
}
