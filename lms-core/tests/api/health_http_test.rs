//! Health endpoint HTTP tests

use super::{router, send_json, TestAppState};
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use tower::ServiceExt;

#[tokio::test]
async fn test_health_endpoint() {
    let state = TestAppState::new();
    let app = router(&state);

    let (status, body) =
        send_json::<(), serde_json::Value>(&app, Method::GET, "/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    let body = body.unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_ready_endpoint() {
    let state = TestAppState::new();
    let app = router(&state);

    let response = app
        .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], b"ready");
}

#[tokio::test]
async fn test_responses_carry_request_id() {
    let state = TestAppState::new();
    let app = router(&state);

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn test_openapi_document_is_served() {
    let state = TestAppState::new();
    let app = router(&state);

    let (status, body) =
        send_json::<(), serde_json::Value>(&app, Method::GET, "/api-docs/openapi.json", None, None)
            .await;

    assert_eq!(status, StatusCode::OK);
    let body = body.unwrap();
    assert_eq!(body["info"]["title"], "LMS Core API");
    assert!(body["paths"]["/api/v1/courses/{id}/enrollments"].is_object());
}
