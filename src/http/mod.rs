use axum::Router;

use crate::AppState;

mod auth;
mod error;
mod handlers;
pub mod middleware;
mod realtime;
mod routes;

pub use auth::AuthUser;
pub use error::AppError;

pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(routes::health())
        .merge(routes::auth())
        .merge(routes::contributions())
        .merge(routes::status())
        .merge(routes::payments())
        .merge(routes::notifications())
        .merge(routes::realtime())
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::rate_limit::rate_limit_middleware,
        ))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::rate_limit::ip_rate_limit_middleware,
        ))
        .with_state(state)
}
