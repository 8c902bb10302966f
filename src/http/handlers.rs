use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::app::contributions::ContributionService;
use crate::app::donations::DonationService;
use crate::app::notifications::NotificationService;
use crate::app::payments::PaymentService;
use crate::app::status::StatusService;
use crate::domain::account::Role;
use crate::domain::contribution::{
    Contribution, ContributionPayload, PickupContribution, RequestContribution,
};
use crate::domain::donation::is_funds;
use crate::domain::notification::Notification;
use crate::domain::payment::{Payment, PaymentReceipt, VerificationOutcome};
use crate::domain::status::{
    PaymentStatus, PickupContributionStatus, PickupStatus, RequestContributionStatus,
};
use crate::http::auth::auth_service;
use crate::http::middleware::rate_limit::enforce_rate_limit;
use crate::http::{AppError, AuthUser};
use crate::AppState;

/// Success envelope shared by every endpoint.
#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(message: impl Into<String>, data: T) -> Json<Self> {
        Json(Self {
            success: true,
            message: message.into(),
            data: Some(data),
        })
    }
}

impl ApiResponse<()> {
    fn done(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            success: true,
            message: message.into(),
            data: None,
        })
    }
}

fn created<T: Serialize>(message: &str, data: T) -> (StatusCode, Json<ApiResponse<T>>) {
    (StatusCode::CREATED, ApiResponse::ok(message, data))
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, AppError>;

#[derive(Serialize)]
pub(crate) struct HealthResponse {
    status: &'static str,
}

#[derive(Deserialize)]
pub struct PaginationQuery {
    pub limit: Option<i64>,
    pub cursor: Option<String>,
    #[serde(default)]
    pub unread: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResponse<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
}

fn parse_limit(limit: Option<i64>) -> Result<i64, AppError> {
    let limit = limit.unwrap_or(50);
    if !(1..=200).contains(&limit) {
        return Err(AppError::bad_request("limit must be between 1 and 200"));
    }
    Ok(limit)
}

fn parse_cursor(cursor: Option<String>) -> Result<Option<(OffsetDateTime, Uuid)>, AppError> {
    let Some(cursor) = cursor else {
        return Ok(None);
    };

    let mut parts = cursor.splitn(2, '/');
    let timestamp = parts
        .next()
        .ok_or_else(|| AppError::bad_request("invalid cursor"))?;
    let id = parts
        .next()
        .ok_or_else(|| AppError::bad_request("invalid cursor"))?;

    let timestamp = OffsetDateTime::parse(timestamp, &Rfc3339)
        .map_err(|_| AppError::bad_request("invalid cursor"))?;
    let id = Uuid::parse_str(id).map_err(|_| AppError::bad_request("invalid cursor"))?;

    Ok(Some((timestamp, id)))
}

fn encode_cursor(cursor: Option<(OffsetDateTime, Uuid)>) -> Option<String> {
    let (timestamp, id) = cursor?;
    let timestamp = timestamp.format(&Rfc3339).ok()?;
    Some(format!("{}/{}", timestamp, id))
}

fn parse_status<T>(value: &str, parse: fn(&str) -> Option<T>) -> Result<T, AppError> {
    parse(value.trim()).ok_or_else(|| AppError::bad_request(format!("invalid status: {}", value)))
}

fn contributions(state: &AppState) -> ContributionService {
    ContributionService::new(
        state.db.clone(),
        state.events.clone(),
        state.pickup_window_minutes,
    )
}

fn payments(state: &AppState) -> PaymentService {
    PaymentService::new(
        state.db.clone(),
        state.events.clone(),
        state.payment_ref_max_attempts,
    )
}

pub(crate) async fn health(State(state): State<AppState>) -> Json<ApiResponse<HealthResponse>> {
    let db = state.db.ping().await.is_ok();
    let redis = state.cache.ping().await.is_ok();
    let status = if db && redis { "ok" } else { "degraded" };

    ApiResponse::ok(format!("service {}", status), HealthResponse { status })
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    pub role: Role,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthTokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(with = "time::serde::rfc3339")]
    pub access_expires_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub refresh_expires_at: OffsetDateTime,
}

impl From<crate::app::auth::TokenPair> for AuthTokenResponse {
    fn from(tokens: crate::app::auth::TokenPair) -> Self {
        Self {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            access_expires_at: tokens.access_expires_at,
            refresh_expires_at: tokens.refresh_expires_at,
        }
    }
}

pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<AuthTokenResponse> {
    const MAX_PASSWORD_LEN: usize = 128;

    let Json(payload) = payload?;
    if payload.email.trim().is_empty() || payload.password.trim().is_empty() {
        return Err(AppError::bad_request("email and password are required"));
    }
    if payload.password.len() > MAX_PASSWORD_LEN {
        return Err(AppError::bad_request("password must be at most 128 characters"));
    }

    let tokens = auth_service(&state)
        .login(&payload.email, &payload.password, payload.role)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to login");
            AppError::internal("failed to login")
        })?;

    match tokens {
        Some(tokens) => Ok(ApiResponse::ok("logged in", tokens.into())),
        None => Err(AppError::unauthorized("invalid credentials")),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

pub async fn refresh_token(
    State(state): State<AppState>,
    payload: Result<Json<RefreshRequest>, JsonRejection>,
) -> ApiResult<AuthTokenResponse> {
    let Json(payload) = payload?;
    if payload.refresh_token.trim().is_empty() {
        return Err(AppError::bad_request("refreshToken is required"));
    }

    let tokens = auth_service(&state)
        .refresh(&payload.refresh_token)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to refresh token");
            AppError::internal("failed to refresh token")
        })?;

    match tokens {
        Some(tokens) => Ok(ApiResponse::ok("token refreshed", tokens.into())),
        None => Err(AppError::unauthorized("invalid refresh token")),
    }
}

pub async fn revoke_token(
    State(state): State<AppState>,
    payload: Result<Json<RefreshRequest>, JsonRejection>,
) -> ApiResult<()> {
    let Json(payload) = payload?;
    if payload.refresh_token.trim().is_empty() {
        return Err(AppError::bad_request("refreshToken is required"));
    }

    let revoked = auth_service(&state)
        .revoke_refresh_token(&payload.refresh_token)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to revoke token");
            AppError::internal("failed to revoke token")
        })?;

    tracing::debug!(revoked, "refresh token revocation requested");
    Ok(ApiResponse::done("refresh token revoked"))
}

pub async fn contribute_to_request(
    auth: AuthUser,
    path: Result<Path<Uuid>, PathRejection>,
    State(state): State<AppState>,
    payload: Result<Json<ContributionPayload>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<RequestContribution>>), AppError> {
    let Path(id) = path?;
    let donor = auth.require(&[Role::Donor])?;
    let Json(payload) = payload?;

    let contribution = contributions(&state)
        .create_request_contribution(donor.id, id, payload)
        .await
        .map_err(|err| AppError::from_service(err, "failed to create request contribution"))?;

    Ok(created("contribution submitted", contribution))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DonationContributionRequest {
    #[serde(flatten)]
    pub contribution: ContributionPayload,
    pub donor_provided_reference: Option<String>,
}

#[derive(Serialize)]
#[serde(untagged)]
pub enum DonationContribution {
    Payment(PaymentReceipt),
    Pickup(PickupContribution),
}

/// Fund donations start a payment; everything else books a pickup.
pub async fn contribute_to_donation(
    auth: AuthUser,
    path: Result<Path<Uuid>, PathRejection>,
    State(state): State<AppState>,
    payload: Result<Json<DonationContributionRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<DonationContribution>>), AppError> {
    let Path(id) = path?;
    let donor = auth.require(&[Role::Donor])?;
    let Json(payload) = payload?;

    let donation = DonationService::new(state.db.clone())
        .find_donation(id)
        .await
        .map_err(|err| AppError::from_service(err, "failed to load donation"))?
        .ok_or_else(|| AppError::not_found("donation not found"))?;

    if is_funds(&donation.donation_type) {
        enforce_rate_limit(&state, auth, "payment").await?;
        let receipt = payments(&state)
            .initiate(
                donor.id,
                id,
                payload.contribution.quantity_or_amount,
                payload.donor_provided_reference,
            )
            .await
            .map_err(|err| AppError::from_service(err, "failed to initiate payment"))?;
        return Ok(created(
            "payment initiated",
            DonationContribution::Payment(receipt),
        ));
    }

    let contribution = contributions(&state)
        .create_pickup_contribution(donor.id, id, payload.contribution)
        .await
        .map_err(|err| AppError::from_service(err, "failed to create pickup contribution"))?;

    Ok(created(
        "contribution submitted",
        DonationContribution::Pickup(contribution),
    ))
}

pub async fn get_contribution(
    auth: AuthUser,
    path: Result<Path<Uuid>, PathRejection>,
    State(state): State<AppState>,
) -> ApiResult<Contribution> {
    let Path(id) = path?;
    let contribution = contributions(&state)
        .get_contribution(id, auth.actor())
        .await
        .map_err(|err| AppError::from_service(err, "failed to fetch contribution"))?;

    Ok(ApiResponse::ok("contribution fetched", contribution))
}

pub async fn list_donor_contributions(
    auth: AuthUser,
    State(state): State<AppState>,
    query: Result<Query<PaginationQuery>, QueryRejection>,
) -> ApiResult<Vec<Contribution>> {
    let Query(query) = query?;
    let donor = auth.require(&[Role::Donor])?;
    let limit = parse_limit(query.limit)?;

    let items = contributions(&state)
        .list_for(donor, limit)
        .await
        .map_err(|err| AppError::from_service(err, "failed to list donor contributions"))?;

    Ok(ApiResponse::ok("contributions fetched", items))
}

pub async fn list_ngo_contributions(
    auth: AuthUser,
    State(state): State<AppState>,
    query: Result<Query<PaginationQuery>, QueryRejection>,
) -> ApiResult<Vec<Contribution>> {
    let Query(query) = query?;
    let ngo = auth.require(&[Role::Ngo, Role::Admin])?;
    let limit = parse_limit(query.limit)?;

    let items = contributions(&state)
        .list_for(ngo, limit)
        .await
        .map_err(|err| AppError::from_service(err, "failed to list NGO contributions"))?;

    Ok(ApiResponse::ok("contributions fetched", items))
}

#[derive(Deserialize)]
pub struct StatusRequest {
    pub status: String,
}

pub async fn update_request_contribution_status(
    auth: AuthUser,
    path: Result<Path<Uuid>, PathRejection>,
    State(state): State<AppState>,
    payload: Result<Json<StatusRequest>, JsonRejection>,
) -> ApiResult<RequestContribution> {
    let Path(id) = path?;
    let actor = auth.require(&[Role::Ngo, Role::Admin])?;
    let Json(payload) = payload?;
    let requested = parse_status(&payload.status, RequestContributionStatus::from_db)?;

    let contribution = StatusService::new(state.db.clone(), state.events.clone())
        .update_request_status(id, actor, requested)
        .await
        .map_err(|err| AppError::from_service(err, "failed to update contribution status"))?;

    Ok(ApiResponse::ok("contribution status updated", contribution))
}

pub async fn update_pickup_contribution_status(
    auth: AuthUser,
    path: Result<Path<Uuid>, PathRejection>,
    State(state): State<AppState>,
    payload: Result<Json<StatusRequest>, JsonRejection>,
) -> ApiResult<PickupContribution> {
    let Path(id) = path?;
    let actor = auth.require(&[Role::Ngo, Role::Admin])?;
    let Json(payload) = payload?;
    let requested = parse_status(&payload.status, PickupContributionStatus::from_db)?;

    let contribution = StatusService::new(state.db.clone(), state.events.clone())
        .update_pickup_contribution_status(id, actor, requested)
        .await
        .map_err(|err| AppError::from_service(err, "failed to update contribution status"))?;

    Ok(ApiResponse::ok("contribution status updated", contribution))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PickupStatusRequest {
    pub pickup_status: String,
}

pub async fn update_pickup_status(
    auth: AuthUser,
    path: Result<Path<Uuid>, PathRejection>,
    State(state): State<AppState>,
    payload: Result<Json<PickupStatusRequest>, JsonRejection>,
) -> ApiResult<PickupContribution> {
    let Path(id) = path?;
    let actor = auth.require(&[Role::Ngo, Role::Admin])?;
    let Json(payload) = payload?;
    let requested = parse_status(&payload.pickup_status, PickupStatus::from_db)?;

    let contribution = StatusService::new(state.db.clone(), state.events.clone())
        .update_pickup_status(id, actor, requested)
        .await
        .map_err(|err| AppError::from_service(err, "failed to update pickup status"))?;

    Ok(ApiResponse::ok("pickup status updated", contribution))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmPaymentRequest {
    pub donor_provided_reference: Option<String>,
}

pub async fn confirm_payment(
    auth: AuthUser,
    path: Result<Path<Uuid>, PathRejection>,
    State(state): State<AppState>,
    payload: Result<Json<ConfirmPaymentRequest>, JsonRejection>,
) -> ApiResult<Payment> {
    let Path(id) = path?;
    let donor = auth.require(&[Role::Donor])?;
    let Json(payload) = payload?;

    let payment = payments(&state)
        .confirm(id, donor.id, payload.donor_provided_reference)
        .await
        .map_err(|err| AppError::from_service(err, "failed to confirm payment"))?;

    Ok(ApiResponse::ok("payment confirmation recorded", payment))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPaymentRequest {
    pub payment_status: String,
}

async fn verify_payment(
    auth: AuthUser,
    role: Role,
    id: Uuid,
    state: &AppState,
    payload: Result<Json<VerifyPaymentRequest>, JsonRejection>,
) -> ApiResult<VerificationOutcome> {
    let actor = auth.require(&[role])?;
    let Json(payload) = payload?;
    let outcome = parse_status(&payload.payment_status, PaymentStatus::from_db)?;

    let verification = payments(state)
        .verify(id, actor, outcome)
        .await
        .map_err(|err| AppError::from_service(err, "failed to verify payment"))?;

    Ok(ApiResponse::ok("payment verified", verification))
}

pub async fn verify_payment_as_admin(
    auth: AuthUser,
    path: Result<Path<Uuid>, PathRejection>,
    State(state): State<AppState>,
    payload: Result<Json<VerifyPaymentRequest>, JsonRejection>,
) -> ApiResult<VerificationOutcome> {
    let Path(id) = path?;
    verify_payment(auth, Role::Admin, id, &state, payload).await
}

pub async fn verify_payment_as_ngo(
    auth: AuthUser,
    path: Result<Path<Uuid>, PathRejection>,
    State(state): State<AppState>,
    payload: Result<Json<VerifyPaymentRequest>, JsonRejection>,
) -> ApiResult<VerificationOutcome> {
    let Path(id) = path?;
    verify_payment(auth, Role::Ngo, id, &state, payload).await
}

pub async fn get_payment(
    auth: AuthUser,
    path: Result<Path<Uuid>, PathRejection>,
    State(state): State<AppState>,
) -> ApiResult<Payment> {
    let Path(id) = path?;
    let payment = payments(&state)
        .get(id, auth.actor())
        .await
        .map_err(|err| AppError::from_service(err, "failed to fetch payment"))?;

    Ok(ApiResponse::ok("payment fetched", payment))
}

pub async fn list_donor_payments(
    auth: AuthUser,
    State(state): State<AppState>,
    query: Result<Query<PaginationQuery>, QueryRejection>,
) -> ApiResult<Vec<Payment>> {
    let Query(query) = query?;
    let donor = auth.require(&[Role::Donor])?;
    let limit = parse_limit(query.limit)?;

    let items = payments(&state)
        .list_for(donor, limit)
        .await
        .map_err(|err| AppError::from_service(err, "failed to list donor payments"))?;

    Ok(ApiResponse::ok("payments fetched", items))
}

pub async fn list_ngo_payments(
    auth: AuthUser,
    State(state): State<AppState>,
    query: Result<Query<PaginationQuery>, QueryRejection>,
) -> ApiResult<Vec<Payment>> {
    let Query(query) = query?;
    let ngo = auth.require(&[Role::Ngo, Role::Admin])?;
    let limit = parse_limit(query.limit)?;

    let items = payments(&state)
        .list_for(ngo, limit)
        .await
        .map_err(|err| AppError::from_service(err, "failed to list NGO payments"))?;

    Ok(ApiResponse::ok("payments fetched", items))
}

pub async fn list_notifications(
    auth: AuthUser,
    State(state): State<AppState>,
    query: Result<Query<PaginationQuery>, QueryRejection>,
) -> ApiResult<ListResponse<Notification>> {
    let Query(query) = query?;
    let limit = parse_limit(query.limit)?;
    let cursor = parse_cursor(query.cursor)?;

    let service = NotificationService::new(state.db.clone());
    let mut notifications = service
        .list(auth.actor(), cursor, query.unread, limit + 1)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, user_id = %auth.user_id, "failed to list notifications");
            AppError::internal("failed to list notifications")
        })?;

    let next_cursor = if notifications.len() > limit as usize {
        notifications.truncate(limit as usize);
        notifications.last().map(|last| (last.created_at, last.id))
    } else {
        None
    };

    Ok(ApiResponse::ok(
        "notifications fetched",
        ListResponse {
            items: notifications,
            next_cursor: encode_cursor(next_cursor),
        },
    ))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnreadCount {
    pub unread_count: i64,
}

pub async fn unread_notification_count(
    auth: AuthUser,
    State(state): State<AppState>,
) -> ApiResult<UnreadCount> {
    let unread_count = NotificationService::new(state.db.clone())
        .unread_count(auth.actor())
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, user_id = %auth.user_id, "failed to count notifications");
            AppError::internal("failed to count notifications")
        })?;

    Ok(ApiResponse::ok("unread count fetched", UnreadCount { unread_count }))
}

pub async fn mark_notification_read(
    auth: AuthUser,
    path: Result<Path<Uuid>, PathRejection>,
    State(state): State<AppState>,
) -> ApiResult<()> {
    let Path(id) = path?;
    let service = NotificationService::new(state.db.clone());
    let updated = service
        .mark_read(id, auth.actor())
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, notification_id = %id, user_id = %auth.user_id, "failed to mark notification read");
            AppError::internal("failed to mark notification read")
        })?;

    if updated {
        Ok(ApiResponse::done("notification marked read"))
    } else {
        Err(AppError::not_found("notification not found"))
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkedRead {
    pub updated: u64,
}

pub async fn mark_all_notifications_read(
    auth: AuthUser,
    State(state): State<AppState>,
) -> ApiResult<MarkedRead> {
    let updated = NotificationService::new(state.db.clone())
        .mark_all_read(auth.actor())
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, user_id = %auth.user_id, "failed to mark notifications read");
            AppError::internal("failed to mark notifications read")
        })?;

    Ok(ApiResponse::ok("notifications marked read", MarkedRead { updated }))
}

pub async fn delete_notification(
    auth: AuthUser,
    path: Result<Path<Uuid>, PathRejection>,
    State(state): State<AppState>,
) -> ApiResult<()> {
    let Path(id) = path?;
    let deleted = NotificationService::new(state.db.clone())
        .delete(id, auth.actor())
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, notification_id = %id, user_id = %auth.user_id, "failed to delete notification");
            AppError::internal("failed to delete notification")
        })?;

    if deleted {
        Ok(ApiResponse::done("notification deleted"))
    } else {
        Err(AppError::not_found("notification not found"))
    }
}
