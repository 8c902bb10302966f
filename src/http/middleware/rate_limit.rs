use axum::extract::{ConnectInfo, Request, State};
use axum::http::Method;
use axum::middleware::Next;
use axum::response::Response;
use std::net::SocketAddr;

use crate::app::rate_limiter::RateLimiter;
use crate::config::rate_limits::{RateWindow, LOGIN_ATTEMPTS_PER_IP_PER_HOUR};
use crate::http::{AppError, AuthUser};
use crate::AppState;

/// Metered action behind a request, if any.
fn action_for(path: &str, method: &Method) -> Option<&'static str> {
    let writes = method == Method::PUT || method == Method::PATCH;
    if method == Method::POST && path.ends_with("/contribute") {
        Some("contribute")
    } else if method == Method::POST && path.starts_with("/payments/") && path.ends_with("/confirm") {
        Some("payment")
    } else if writes && path.ends_with("/status") {
        Some("status")
    } else if method == Method::PATCH && path.ends_with("/verify") {
        Some("verify")
    } else if path.starts_with("/notifications") {
        Some("notifications")
    } else {
        None
    }
}

/// Counts one `action` against the caller's budget, rejecting the request
/// once the budget is spent.
pub(crate) async fn enforce_rate_limit(
    state: &AppState,
    auth_user: AuthUser,
    action: &'static str,
) -> Result<(), AppError> {
    let rate_limiter = RateLimiter::new(state.cache.clone());
    let info = rate_limiter
        .check_rate_limit(auth_user.user_id, auth_user.role, action)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to check rate limit");
            AppError::internal("failed to check rate limit")
        })?;

    if info.limited {
        return Err(AppError::rate_limited(format!(
            "Rate limit exceeded for action: {}. Please try again later.",
            action
        )));
    }

    if let Err(err) = rate_limiter
        .increment(auth_user.user_id, auth_user.role, action)
        .await
    {
        tracing::warn!(error = ?err, "failed to increment rate limit counter");
    }

    Ok(())
}

/// Rate limiting middleware for authenticated endpoints. Fund payments are
/// only known once the donation is loaded, so their initiation is metered
/// by the handler.
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    auth: Option<AuthUser>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let action = action_for(request.uri().path(), request.method());

    if let (Some(action), Some(auth_user)) = (action, auth) {
        enforce_rate_limit(&state, auth_user, action).await?;
    }

    Ok(next.run(request).await)
}

/// IP-based rate limiting for login
pub async fn ip_rate_limit_middleware(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if !(request.method() == Method::POST && request.uri().path() == "/auth/login") {
        return Ok(next.run(request).await);
    }

    let (action, window) = ("login", RateWindow::Hour);
    let ip = addr.ip().to_string();
    let rate_limiter = RateLimiter::new(state.cache.clone());

    let is_limited = rate_limiter
        .check_ip_rate_limit(&ip, action, LOGIN_ATTEMPTS_PER_IP_PER_HOUR, window)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to check IP rate limit");
            AppError::internal("failed to check rate limit")
        })?;

    if is_limited {
        tracing::warn!(ip = ip, action = action, "IP rate limit exceeded");
        return Err(AppError::rate_limited(
            "Too many attempts from your IP address. Please try again later.",
        ));
    }

    if let Err(err) = rate_limiter.increment_ip(&ip, action, window).await {
        tracing::warn!(error = ?err, "failed to increment IP rate limit counter");
    }

    Ok(next.run(request).await)
}
