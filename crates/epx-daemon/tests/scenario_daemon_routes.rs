//! In-process scenario tests for epx-daemon HTTP endpoints.
//!
//! These tests spin up the Axum router **without** binding a TCP socket.
//! Each test calls `routes::build_router` and drives it via
//! `tower::ServiceExt::oneshot`, no network I/O required.

use std::sync::Arc;

use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use epx_daemon::{routes, state};
use serde_json::json;
use tower::ServiceExt; // oneshot

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn make_router() -> axum::Router {
    let st = Arc::new(state::AppState::new());
    routes::build_router(st)
}

async fn call(router: &axum::Router, req: Request<axum::body::Body>) -> (StatusCode, bytes::Bytes) {
    let resp = router.clone().oneshot(req).await.expect("oneshot failed");
    let status = resp.status();
    let body = resp
        .into_body()
        .collect()
        .await
        .expect("body collect failed")
        .to_bytes();
    (status, body)
}

fn get(uri: &str) -> Request<axum::body::Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap()
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<axum::body::Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(axum::body::Body::from(body.to_string()))
        .unwrap()
}

fn parse_json(b: bytes::Bytes) -> serde_json::Value {
    serde_json::from_slice(&b).expect("body is not valid JSON")
}

async fn open(router: &axum::Router, student: &str) -> String {
    let (status, body) = call(router, post_json("/v1/attempts", json!({ "student_id": student }))).await;
    assert_eq!(status, StatusCode::CREATED);
    parse_json(body)["attempt_id"].as_str().unwrap().to_string()
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_returns_200_ok_true() {
    let router = make_router();
    let (status, body) = call(&router, get("/v1/health")).await;
    assert_eq!(status, StatusCode::OK);

    let json = parse_json(body);
    assert_eq!(json["ok"], true);
    assert_eq!(json["service"], "epx-daemon");
    assert_eq!(json["active_sessions"], 0);
}

// ---------------------------------------------------------------------------
// Attempts
// ---------------------------------------------------------------------------

#[tokio::test]
async fn open_attempt_starts_at_full_score() {
    let router = make_router();
    let id = open(&router, "stu-1").await;

    let (status, body) = call(&router, get(&format!("/v1/attempts/{id}"))).await;
    assert_eq!(status, StatusCode::OK);
    let json = parse_json(body);
    assert_eq!(json["student_id"], "stu-1");
    assert_eq!(json["state"]["integrity"]["score"], 100);
    assert_eq!(json["state"]["phase"]["phase"], "active");
}

#[tokio::test]
async fn reopening_same_id_is_idempotent() {
    let router = make_router();
    let id = open(&router, "stu-1").await;
    let (status, body) = call(
        &router,
        post_json("/v1/attempts", json!({ "student_id": "stu-1", "attempt_id": id })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(parse_json(body)["attempt_id"], id.as_str());
}

#[tokio::test]
async fn blank_student_is_400() {
    let router = make_router();
    let (status, body) = call(&router, post_json("/v1/attempts", json!({ "student_id": "  " }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(parse_json(body)["code"], "bad_request");
}

#[tokio::test]
async fn unknown_attempt_is_404() {
    let router = make_router();
    let uri = format!("/v1/attempts/{}", uuid::Uuid::new_v4());
    let (status, body) = call(&router, get(&uri)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(parse_json(body)["code"], "unknown_attempt");
}

// ---------------------------------------------------------------------------
// Signals
// ---------------------------------------------------------------------------

#[tokio::test]
async fn fullscreen_exit_costs_ten_points() {
    let router = make_router();
    let id = open(&router, "stu-2").await;

    let (status, body) = call(
        &router,
        post_json(
            &format!("/v1/attempts/{id}/signals"),
            json!({ "kind": "fullscreen_exit", "ts_millis": 1000 }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let json = parse_json(body);
    assert_eq!(json["score"], 90);
    assert_eq!(json["outcome"]["outcome"], "accepted");
    assert_eq!(json["outcome"]["violation"]["severity"], "high");
    assert_eq!(json["decision"]["action"], "continue");
}

#[tokio::test]
async fn unknown_kind_is_400_and_state_unchanged() {
    let router = make_router();
    let id = open(&router, "stu-3").await;

    let (status, body) = call(
        &router,
        post_json(
            &format!("/v1/attempts/{id}/signals"),
            json!({ "kind": "telepathy", "ts_millis": 1000 }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(parse_json(body)["code"], "invalid_signal");

    let (_, body) = call(&router, get(&format!("/v1/attempts/{id}"))).await;
    assert_eq!(parse_json(body)["state"]["integrity"]["score"], 100);
}

#[tokio::test]
async fn untrusted_override_is_400() {
    let router = make_router();
    let id = open(&router, "stu-4").await;
    let (status, _) = call(
        &router,
        post_json(
            &format!("/v1/attempts/{id}/signals"),
            json!({ "kind": "tab_hidden", "ts_millis": 0, "score_delta": -50 }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn malformed_body_is_400() {
    let router = make_router();
    let id = open(&router, "stu-5").await;
    let req = Request::builder()
        .method("POST")
        .uri(format!("/v1/attempts/{id}/signals"))
        .header("content-type", "application/json")
        .body(axum::body::Body::from("{not json"))
        .unwrap();
    let (status, _) = call(&router, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn minimal_ai_band_records_nothing() {
    let router = make_router();
    let id = open(&router, "stu-6").await;
    let (status, body) = call(
        &router,
        post_json(
            &format!("/v1/attempts/{id}/signals"),
            json!({ "kind": "ai_content", "ts_millis": 0, "ai_likelihood": 12.0 }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let json = parse_json(body);
    assert!(json["outcome"].is_null());
    assert_eq!(json["score"], 100);
}

// ---------------------------------------------------------------------------
// Dashboard
// ---------------------------------------------------------------------------

#[tokio::test]
async fn dashboard_summarises_open_attempts() {
    let router = make_router();
    let a = open(&router, "alice").await;
    let _b = open(&router, "bob").await;

    for (i, kind) in ["fullscreen_exit", "tab_hidden", "no_face_detected"].iter().enumerate() {
        let (status, _) = call(
            &router,
            post_json(
                &format!("/v1/attempts/{a}/signals"),
                json!({ "kind": kind, "ts_millis": i as i64 * 100 }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = call(&router, get("/v1/dashboard")).await;
    assert_eq!(status, StatusCode::OK);
    let json = parse_json(body);
    assert_eq!(json["summary"]["total_students"], 2);
    assert_eq!(json["summary"]["active_students"], 2);
    // alice 75, bob 100
    assert_eq!(json["summary"]["average_integrity"], 88);

    let alice = json["students"]
        .as_array()
        .unwrap()
        .iter()
        .find(|r| r["student_id"] == "alice")
        .unwrap();
    assert_eq!(alice["integrity_score"], 75);
    assert_eq!(alice["status"], "warning");
    assert_eq!(alice["violation_count"], 3);
}
