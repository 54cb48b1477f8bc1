//! HTTP error contract of the assembled router.
//!
//! Every failure carries `{"error": {"code", "message"}}`; state conflicts
//! add `details.retryable`.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use escrow_api::state::AppState;

async fn post(app: &axum::Router, uri: &str, user: Uuid, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("authorization", format!("Bearer {user}"))
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

#[tokio::test]
async fn conflict_bodies_carry_code_and_retryable_flag() {
    let app = escrow_api::app(AppState::new());
    let (buyer, seller) = (Uuid::new_v4(), Uuid::new_v4());

    let (status, tx) = post(
        &app,
        "/v1/transactions",
        buyer,
        json!({ "buyer_id": buyer, "seller_id": seller, "title": "Copywriting", "amount": 800 }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let tx_id = tx["id"].as_str().unwrap();

    // No accepted contract yet, so payment is out of order.
    let (status, body) =
        post(&app, &format!("/v1/transactions/{tx_id}/payment"), buyer, json!({})).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "INVALID_TRANSITION");
    assert_eq!(body["error"]["details"]["retryable"], false);
    assert!(body["error"]["message"].as_str().unwrap().contains("created"));
}

#[tokio::test]
async fn client_errors_share_the_error_envelope() {
    let app = escrow_api::app(AppState::new());
    let user = Uuid::new_v4();

    let (status, body) = post(&app, "/v1/contracts", user, json!({ "content": 5 })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");

    let missing = Uuid::new_v4();
    let (status, body) = post(
        &app,
        &format!("/v1/proposals/{missing}/respond"),
        user,
        json!({ "response": "accept" }),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
    assert!(body["error"].get("details").is_none());

    let request = Request::builder()
        .uri("/v1/users/me")
        .header("authorization", "Bearer not-a-uuid")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
