//! Refresh-token rotation and reuse detection at the token endpoint.

mod common;

use axum::http::StatusCode;
use common::{json_body, login, refresh, seed_public_client, seed_user, test_state};

#[tokio::test]
async fn rotation_issues_a_new_refresh_token() {
    let (state, _) = test_state();
    seed_user(&state, "alice@example.com", "hunter2").await;
    seed_public_client(&state, "app_mobile").await;

    let (_, rt1) = login(&state, "alice@example.com", "hunter2", "app_mobile").await;

    let response = refresh(&state, "app_mobile", &rt1).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;

    assert_eq!(body["token_type"], "Bearer");
    assert!(body["access_token"].as_str().is_some());
    let rt2 = body["refresh_token"].as_str().unwrap();
    assert_ne!(rt2, rt1);
}

#[tokio::test]
async fn replaying_a_rotated_token_revokes_the_session() {
    let (state, _) = test_state();
    seed_user(&state, "alice@example.com", "hunter2").await;
    seed_public_client(&state, "app_mobile").await;

    let (_, rt1) = login(&state, "alice@example.com", "hunter2", "app_mobile").await;

    let response = refresh(&state, "app_mobile", &rt1).await;
    assert_eq!(response.status(), StatusCode::OK);
    let rt2 = json_body(response).await["refresh_token"]
        .as_str()
        .unwrap()
        .to_string();

    // Replay the consumed token.
    let response = refresh(&state, "app_mobile", &rt1).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"], "invalid_grant");

    // The reuse killed the whole session: the current token is dead too.
    let response = refresh(&state, "app_mobile", &rt2).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error_description"], "Invalid refresh token");
}

#[tokio::test]
async fn unknown_refresh_token_is_invalid_grant() {
    let (state, _) = test_state();
    seed_public_client(&state, "app_mobile").await;

    let response = refresh(&state, "app_mobile", "deadbeef").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"], "invalid_grant");
    assert_eq!(body["error_description"], "Invalid refresh token");
}

#[tokio::test]
async fn error_responses_are_not_cacheable() {
    let (state, _) = test_state();
    seed_public_client(&state, "app_mobile").await;

    let response = refresh(&state, "app_mobile", "deadbeef").await;
    assert_eq!(
        response.headers().get("cache-control").unwrap(),
        "no-store"
    );
    assert_eq!(response.headers().get("pragma").unwrap(), "no-cache");
}

#[tokio::test]
async fn missing_refresh_token_is_invalid_request() {
    let (state, _) = test_state();
    seed_public_client(&state, "app_mobile").await;

    let response = common::post_form(
        &state,
        "/oauth2/token",
        "grant_type=refresh_token&client_id=app_mobile",
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"], "invalid_request");
}
