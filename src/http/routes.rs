use axum::{routing::delete, routing::get, routing::patch, routing::post, routing::put, Router};

use crate::AppState;
use crate::http::{handlers, realtime};

pub fn health() -> Router<AppState> {
    Router::new().route("/health", get(handlers::health))
}

pub fn auth() -> Router<AppState> {
    Router::new()
        .route("/auth/login", post(handlers::login))
        .route("/auth/refresh", post(handlers::refresh_token))
        .route("/auth/revoke", post(handlers::revoke_token))
}

pub fn contributions() -> Router<AppState> {
    Router::new()
        .route(
            "/donation-requests/:id/contribute",
            post(handlers::contribute_to_request),
        )
        .route(
            "/donations/:id/contribute",
            post(handlers::contribute_to_donation),
        )
        .route("/contributions/:id", get(handlers::get_contribution))
        .route("/donor/contributions", get(handlers::list_donor_contributions))
        .route("/ngo/contributions", get(handlers::list_ngo_contributions))
}

pub fn status() -> Router<AppState> {
    Router::new()
        .route(
            "/ngo/donations/:id/status",
            put(handlers::update_request_contribution_status),
        )
        .route(
            "/ngo/dashboard/donations/:contribution_id/status",
            put(handlers::update_request_contribution_status),
        )
        .route(
            "/ngo/contributions/:id/status",
            patch(handlers::update_pickup_contribution_status),
        )
        .route("/ngo/pickups/:id/status", patch(handlers::update_pickup_status))
}

pub fn payments() -> Router<AppState> {
    Router::new()
        .route("/payments/:id", get(handlers::get_payment))
        .route("/payments/:id/confirm", post(handlers::confirm_payment))
        .route("/donor/payments", get(handlers::list_donor_payments))
        .route("/ngo/payments", get(handlers::list_ngo_payments))
        .route(
            "/org/payments/:id/verify",
            patch(handlers::verify_payment_as_admin),
        )
        .route(
            "/ngo/payments/:id/verify",
            patch(handlers::verify_payment_as_ngo),
        )
}

pub fn notifications() -> Router<AppState> {
    Router::new()
        .route("/notifications", get(handlers::list_notifications))
        .route(
            "/notifications/unread-count",
            get(handlers::unread_notification_count),
        )
        .route(
            "/notifications/read-all",
            post(handlers::mark_all_notifications_read),
        )
        .route(
            "/notifications/:id/read",
            post(handlers::mark_notification_read),
        )
        .route("/notifications/:id", delete(handlers::delete_notification))
}

pub fn realtime() -> Router<AppState> {
    Router::new().route("/ws", get(realtime::connect))
}
