//! Probe and delivery tests against a local HTTP fixture server.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Redirect};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde_json::json;

use sitewatch::checks::http::HttpCheck;
use sitewatch::checks::json_api::JsonApiCheck;
use sitewatch::checks::keyword::KeywordCheck;
use sitewatch::checks::header::HeaderCheck;
use sitewatch::checks::redirect::RedirectCheck;
use sitewatch::checks::response_time::ResponseTimeCheck;
use sitewatch::checks::Check;
use sitewatch::db::models::{CheckStatus, NotificationTrigger};
use sitewatch::notifications::channels::WebhookChannel;
use sitewatch::notifications::{NotificationPayload, NotificationSender, SenderError};

async fn page() -> impl IntoResponse {
    "Welcome to Example. All systems operational."
}

async fn service_unavailable() -> impl IntoResponse {
    (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
}

async fn json_ok() -> impl IntoResponse {
    Json(json!({
        "data": { "user": { "id": 7 }, "items": [1, 2, 3] },
        "ok": true
    }))
}

async fn json_broken() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/json")],
        "{ definitely not json",
    )
}

async fn with_headers() -> impl IntoResponse {
    (
        [
            ("X-Custom", "enabled"),
            ("Strict-Transport-Security", "max-age=31536000"),
        ],
        "ok",
    )
}

async fn spawn_fixture() -> String {
    let app = Router::new()
        .route("/page", get(page))
        .route("/status/503", get(service_unavailable))
        .route("/json", get(json_ok))
        .route("/json-broken", get(json_broken))
        .route("/headers", get(with_headers))
        .route("/loop/a", get(|| async { Redirect::temporary("/loop/b") }))
        .route("/loop/b", get(|| async { Redirect::temporary("/loop/a") }))
        .route("/chain/1", get(|| async { Redirect::temporary("/chain/2") }))
        .route("/chain/2", get(|| async { Redirect::temporary("/chain/3") }))
        .route("/chain/3", get(|| async { Redirect::temporary("/final") }))
        .route("/final", get(page))
        .route("/missing", get(|| async { Redirect::temporary("/nowhere") }))
        .route("/hook/ok", post(|| async { StatusCode::OK }))
        .route(
            "/hook/fail",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "kaboom") }),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn http_check_flags_unexpected_status() {
    let base = spawn_fixture().await;
    let outcome = HttpCheck
        .execute(
            &format!("{base}/status/503"),
            &json!({ "expected_status_code": 200 }),
        )
        .await;
    assert_eq!(outcome.status, CheckStatus::Failure);
    assert!(outcome.error_message.as_deref().unwrap().contains("503"));
    assert_eq!(outcome.result_data["status_code"], 503);
}

#[tokio::test]
async fn http_check_passes_on_expected_status() {
    let base = spawn_fixture().await;
    let outcome = HttpCheck
        .execute(&format!("{base}/page"), &json!({}))
        .await;
    assert_eq!(outcome.status, CheckStatus::Success);
    assert!(outcome.response_time_ms.is_some());
    assert_eq!(outcome.result_data["status_code"], 200);
}

#[tokio::test]
async fn http_check_accepts_expected_error_status() {
    let base = spawn_fixture().await;
    let outcome = HttpCheck
        .execute(
            &format!("{base}/status/503"),
            &json!({ "expected_status_code": 503 }),
        )
        .await;
    assert_eq!(outcome.status, CheckStatus::Success);
}

#[tokio::test]
async fn http_check_fails_on_unreachable_target() {
    // Reserved port with nothing listening.
    let outcome = HttpCheck
        .execute("http://127.0.0.1:9/", &json!({ "timeout_seconds": 2 }))
        .await;
    assert_eq!(outcome.status, CheckStatus::Failure);
}

#[tokio::test]
async fn redirect_loop_is_detected_before_max_redirects() {
    let base = spawn_fixture().await;
    let outcome = RedirectCheck
        .execute(&format!("{base}/loop/a"), &json!({ "max_redirects": 10 }))
        .await;
    assert_eq!(outcome.status, CheckStatus::Failure);
    assert!(outcome
        .error_message
        .as_deref()
        .unwrap()
        .contains("Redirect loop detected"));
    // The loop is caught on revisit, well before max_redirects hops.
    assert!(outcome.result_data["redirect_chain"].as_array().unwrap().len() <= 3);
}

#[tokio::test]
async fn redirect_chain_warns_at_configured_depth() {
    let base = spawn_fixture().await;
    let outcome = RedirectCheck
        .execute(
            &format!("{base}/chain/1"),
            &json!({ "warn_on_redirect_count": 3 }),
        )
        .await;
    assert_eq!(outcome.status, CheckStatus::Warning);
    assert_eq!(outcome.result_data["redirect_count"], 3);
    assert_eq!(outcome.result_data["final_status_code"], 200);
}

#[tokio::test]
async fn redirect_to_error_destination_fails() {
    let base = spawn_fixture().await;
    let outcome = RedirectCheck
        .execute(&format!("{base}/missing"), &json!({}))
        .await;
    assert_eq!(outcome.status, CheckStatus::Failure);
    assert!(outcome
        .error_message
        .as_deref()
        .unwrap()
        .contains("error status"));
}

#[tokio::test]
async fn keyword_check_enforces_presence_and_absence() {
    let base = spawn_fixture().await;
    let target = format!("{base}/page");

    let outcome = KeywordCheck
        .execute(
            &target,
            &json!({ "keywords_present": ["operational"], "keywords_absent": ["error"] }),
        )
        .await;
    assert_eq!(outcome.status, CheckStatus::Success);

    let outcome = KeywordCheck
        .execute(
            &target,
            &json!({ "keywords_present": ["maintenance"], "keywords_absent": ["operational"] }),
        )
        .await;
    assert_eq!(outcome.status, CheckStatus::Failure);
    let message = outcome.error_message.unwrap();
    assert!(message.contains("Missing keywords: maintenance"));
    assert!(message.contains("Found forbidden keywords: operational"));
}

#[tokio::test]
async fn json_api_check_validates_structure() {
    let base = spawn_fixture().await;
    let target = format!("{base}/json");

    let outcome = JsonApiCheck
        .execute(
            &target,
            &json!({
                "required_fields": ["data.user.id", "data.items.2", "ok"],
                "field_type_checks": { "data.user.id": "integer", "ok": "boolean" }
            }),
        )
        .await;
    assert_eq!(outcome.status, CheckStatus::Success);

    let outcome = JsonApiCheck
        .execute(&target, &json!({ "required_fields": ["data.user.email"] }))
        .await;
    assert_eq!(outcome.status, CheckStatus::Failure);
    assert!(outcome
        .error_message
        .as_deref()
        .unwrap()
        .contains("data.user.email"));
}

#[tokio::test]
async fn json_api_check_rejects_unparseable_bodies() {
    let base = spawn_fixture().await;
    let outcome = JsonApiCheck
        .execute(&format!("{base}/json-broken"), &json!({}))
        .await;
    assert_eq!(outcome.status, CheckStatus::Failure);
    assert!(outcome
        .error_message
        .as_deref()
        .unwrap()
        .contains("Invalid JSON"));
}

#[tokio::test]
async fn header_check_verifies_required_and_security_headers() {
    let base = spawn_fixture().await;
    let target = format!("{base}/headers");

    let outcome = HeaderCheck
        .execute(
            &target,
            &json!({ "method": "GET", "required_headers": { "X-Custom": "enabled" } }),
        )
        .await;
    assert_eq!(outcome.status, CheckStatus::Success);

    let outcome = HeaderCheck
        .execute(
            &target,
            &json!({ "method": "GET", "required_headers": { "X-Absent": "*" } }),
        )
        .await;
    assert_eq!(outcome.status, CheckStatus::Failure);

    // Security audit only ever warns.
    let outcome = HeaderCheck
        .execute(&target, &json!({ "method": "GET", "security_headers_check": true }))
        .await;
    assert_eq!(outcome.status, CheckStatus::Warning);
    let score = outcome.result_data["header_results"]["_security_check"]["score"]
        .as_str()
        .unwrap();
    assert_eq!(score, "1/6");
}

#[tokio::test]
async fn response_time_check_passes_fast_local_responses() {
    let base = spawn_fixture().await;
    let outcome = ResponseTimeCheck
        .execute(&format!("{base}/page"), &json!({}))
        .await;
    assert_eq!(outcome.status, CheckStatus::Success);
    assert!(outcome.response_time_ms.unwrap() < 1000);
}

fn webhook_payload() -> NotificationPayload {
    NotificationPayload {
        trigger: NotificationTrigger::CheckFailure,
        site_name: "example".to_string(),
        site_url: "https://example.com".to_string(),
        check_name: "homepage".to_string(),
        check_type: "http".to_string(),
        status: CheckStatus::Failure,
        error_message: Some("it broke".to_string()),
        response_time_ms: Some(12),
        checked_at: Utc::now(),
        incident_id: None,
    }
}

#[tokio::test]
async fn webhook_send_succeeds_against_accepting_endpoint() {
    let base = spawn_fixture().await;
    let config = json!({ "url": format!("{base}/hook/ok") });
    WebhookChannel
        .send(&config, &webhook_payload())
        .await
        .unwrap();
}

#[tokio::test]
async fn webhook_send_raises_on_server_error() {
    let base = spawn_fixture().await;
    let config = json!({ "url": format!("{base}/hook/fail") });
    let err = WebhookChannel
        .send(&config, &webhook_payload())
        .await
        .unwrap_err();
    match err {
        SenderError::SendFailed(message) => {
            assert!(message.contains("500"));
            assert!(message.contains("kaboom"));
        }
        other => panic!("expected SendFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn webhook_test_connection_treats_sub_500_as_reachable() {
    let base = spawn_fixture().await;
    // The endpoint only answers POST; OPTIONS yields 405, which still
    // proves reachability.
    let config = json!({ "url": format!("{base}/hook/ok") });
    WebhookChannel.test_connection(&config).await.unwrap();
}
