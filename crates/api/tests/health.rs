//! Integration tests for the health check endpoint and issue CRUD over HTTP.

mod common;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::json;
use tower::ServiceExt;

use kaartwerk_api::routes;
use kaartwerk_api::state::AppState;

use common::{test_config, token_for};

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("read body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("body is JSON")
}

// ---------------------------------------------------------------------------
// Test: GET /health returns 200 with expected JSON fields
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_check_returns_ok_with_json() {
    let app = routes::app(AppState::new(test_config()));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
    assert_eq!(json["auth_connections"], 0);
    assert_eq!(json["notify_connections"], 0);
}

// ---------------------------------------------------------------------------
// Test: unknown route returns 404
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_route_returns_404() {
    let app = routes::app(AppState::new(test_config()));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/this-route-does-not-exist")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Test: issue creation requires a bearer token
// ---------------------------------------------------------------------------

#[tokio::test]
async fn create_issue_without_token_is_unauthorized() {
    let app = routes::app(AppState::new(test_config()));

    let response = app
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/api/v1/issues")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({
                        "title": "Pothole",
                        "description": "<p>x</p>",
                        "geometry": {"type": "Point", "coordinates": [0.0, 0.0]},
                        "category": "road"
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let json = body_json(response).await;
    assert_eq!(json["code"], "UNAUTHORIZED");
}

// ---------------------------------------------------------------------------
// Test: authenticated create then public read round-trips
// ---------------------------------------------------------------------------

#[tokio::test]
async fn create_then_list_round_trips() {
    let app = routes::app(AppState::new(test_config()));
    let token = token_for(1, "alice", Some("Alice"));

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/api/v1/issues")
                .header(header::CONTENT_TYPE, "application/json")
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::from(
                    json!({
                        "title": "Pothole",
                        "description": "<p>x</p>",
                        "geometry": {"type": "Point", "coordinates": [0.0, 0.0]},
                        "category": "road"
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let created = body_json(response).await;
    assert_eq!(created["data"]["title"], "Pothole");
    assert_eq!(created["data"]["owner"], "Alice");

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/issues")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let listed = body_json(response).await;
    assert_eq!(listed["data"].as_array().map(Vec::len), Some(1));
}
