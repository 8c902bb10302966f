//! Authentication Tests
//!
//! Covers role-scoped login, token lifecycle, and protected route authorization.

mod common;

use axum::http::StatusCode;
use common::{app, DEFAULT_PASSWORD};
use serde_json::json;

// ===========================================================================
// Login
// ===========================================================================

#[tokio::test]
async fn login_with_matching_role() {
    let app = app().await;
    let ngo = app.create_ngo().await;

    let resp = app
        .post_json(
            "/auth/login",
            json!({ "email": ngo.email, "password": DEFAULT_PASSWORD, "role": "NGO" }),
            None,
        )
        .await;

    assert_eq!(resp.status, StatusCode::OK);
    let body = resp.json();
    assert_eq!(body["success"], true);
    assert!(body["data"]["accessToken"].is_string());
    assert!(body["data"]["refreshToken"].is_string());
    assert!(body["data"]["accessExpiresAt"].is_string());
}

#[tokio::test]
async fn login_email_is_case_insensitive() {
    let app = app().await;
    let donor = app.create_donor().await;

    let resp = app
        .post_json(
            "/auth/login",
            json!({
                "email": donor.email.to_uppercase(),
                "password": DEFAULT_PASSWORD,
                "role": "DONOR"
            }),
            None,
        )
        .await;

    assert_eq!(resp.status, StatusCode::OK);
}

#[tokio::test]
async fn login_with_wrong_role_is_rejected() {
    let app = app().await;
    let donor = app.create_donor().await;

    let resp = app
        .post_json(
            "/auth/login",
            json!({ "email": donor.email, "password": DEFAULT_PASSWORD, "role": "ADMIN" }),
            None,
        )
        .await;

    // Same answer as an unknown email
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
    assert_eq!(resp.error_message(), "invalid credentials");
}

#[tokio::test]
async fn login_invalid_password() {
    let app = app().await;
    let admin = app.create_admin().await;

    let resp = app
        .post_json(
            "/auth/login",
            json!({ "email": admin.email, "password": "wrong_password", "role": "ADMIN" }),
            None,
        )
        .await;

    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
    assert_eq!(resp.error_message(), "invalid credentials");
    assert_eq!(resp.json()["success"], false);
}

#[tokio::test]
async fn login_empty_email() {
    let app = app().await;

    let resp = app
        .post_json(
            "/auth/login",
            json!({ "email": "", "password": "somepassword", "role": "DONOR" }),
            None,
        )
        .await;

    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.error_message(), "email and password are required");
}

#[tokio::test]
async fn login_unknown_role_is_a_bad_body() {
    let app = app().await;

    let resp = app
        .post_json(
            "/auth/login",
            json!({ "email": "a@example.com", "password": "somepassword", "role": "VOLUNTEER" }),
            None,
        )
        .await;

    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert!(resp.error_message().starts_with("invalid request body"));
}

// ===========================================================================
// Token lifecycle
// ===========================================================================

#[tokio::test]
async fn refresh_rotates_and_old_token_stops_working() {
    let app = app().await;
    let donor = app.create_donor().await;

    let resp = app
        .post_json(
            "/auth/refresh",
            json!({ "refreshToken": donor.refresh_token }),
            None,
        )
        .await;
    assert_eq!(resp.status, StatusCode::OK);
    let rotated = resp.data()["refreshToken"].as_str().unwrap().to_string();
    assert_ne!(rotated, donor.refresh_token);

    let replay = app
        .post_json(
            "/auth/refresh",
            json!({ "refreshToken": donor.refresh_token }),
            None,
        )
        .await;
    assert_eq!(replay.status, StatusCode::UNAUTHORIZED);
    assert_eq!(replay.error_message(), "invalid refresh token");
}

#[tokio::test]
async fn refreshed_access_token_keeps_the_role() {
    let app = app().await;
    let ngo = app.create_ngo().await;

    let resp = app
        .post_json("/auth/refresh", json!({ "refreshToken": ngo.refresh_token }), None)
        .await;
    assert_eq!(resp.status, StatusCode::OK);
    let access = resp.data()["accessToken"].as_str().unwrap().to_string();

    let list = app.get("/ngo/contributions", Some(&access)).await;
    assert_eq!(list.status, StatusCode::OK);
}

#[tokio::test]
async fn revoked_refresh_token_cannot_refresh() {
    let app = app().await;
    let admin = app.create_admin().await;

    let resp = app
        .post_json("/auth/revoke", json!({ "refreshToken": admin.refresh_token }), None)
        .await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.json()["success"], true);
    assert_eq!(resp.json()["message"], "refresh token revoked");

    let resp = app
        .post_json("/auth/refresh", json!({ "refreshToken": admin.refresh_token }), None)
        .await;
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
}

// ===========================================================================
// Protected routes
// ===========================================================================

#[tokio::test]
async fn protected_route_without_token() {
    let app = app().await;

    let resp = app.get("/donor/contributions", None).await;

    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
    assert_eq!(resp.error_message(), "missing Authorization header");
}

#[tokio::test]
async fn protected_route_with_garbage_token() {
    let app = app().await;

    let resp = app.get("/notifications", Some("not-a-token")).await;

    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
    assert_eq!(resp.error_message(), "invalid token");
}

#[tokio::test]
async fn refresh_token_is_not_an_access_token() {
    let app = app().await;
    let donor = app.create_donor().await;

    let resp = app
        .get("/donor/contributions", Some(&donor.refresh_token))
        .await;

    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn role_scoped_route_rejects_other_roles() {
    let app = app().await;
    let donor = app.create_donor().await;

    let resp = app.get("/ngo/payments", donor.token()).await;

    assert_eq!(resp.status, StatusCode::FORBIDDEN);
    assert_eq!(
        resp.error_message(),
        "DONOR accounts cannot perform this action"
    );
}

#[tokio::test]
async fn realtime_gateway_requires_a_token() {
    let app = app().await;

    let resp = app.get("/ws", None).await;

    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
    assert_eq!(resp.error_message(), "missing access token");
}

#[tokio::test]
async fn realtime_gateway_rejects_an_invalid_query_token() {
    let app = app().await;

    let resp = app.get("/ws?token=forged", None).await;

    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
    assert_eq!(resp.error_message(), "invalid token");
}

#[tokio::test]
async fn health_reports_ok() {
    let app = app().await;

    let resp = app.get("/health", None).await;

    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.json()["success"], true);
    assert_eq!(resp.data()["status"], "ok");
}
