use axum::extract::FromRequestParts;
use axum::http::header;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use uuid::Uuid;

use crate::app::auth::{AuthService, AuthSession};
use crate::domain::account::{Actor, Role};
use crate::http::AppError;
use crate::AppState;

#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub role: Role,
}

impl AuthUser {
    pub fn actor(&self) -> Actor {
        Actor::new(self.user_id, self.role)
    }

    /// Rejects callers whose role is not listed.
    pub fn require(&self, roles: &[Role]) -> Result<Actor, AppError> {
        if roles.contains(&self.role) {
            Ok(self.actor())
        } else {
            Err(AppError::forbidden(format!(
                "{} accounts cannot perform this action",
                self.role.as_db()
            )))
        }
    }
}

pub(crate) fn auth_service(state: &AppState) -> AuthService {
    AuthService::new(
        state.db.clone(),
        state.paseto_access_key,
        state.paseto_refresh_key,
        state.access_ttl_minutes,
        state.refresh_ttl_days,
    )
}

pub(crate) fn bearer_token(headers: &HeaderMap) -> Result<Option<&str>, AppError> {
    let Some(auth_header) = headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };
    let auth_header = auth_header
        .to_str()
        .map_err(|_| AppError::unauthorized("invalid Authorization header"))?;
    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::unauthorized("invalid Authorization header"))?;
    Ok(Some(token))
}

pub(crate) async fn authenticate(state: &AppState, token: &str) -> Result<AuthSession, AppError> {
    let session = auth_service(state)
        .authenticate_access_token(token)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to authenticate access token");
            AppError::internal("failed to authenticate")
        })?;

    session.ok_or_else(|| AppError::unauthorized("invalid token"))
}

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)?
            .ok_or_else(|| AppError::unauthorized("missing Authorization header"))?;

        let session = authenticate(state, token).await?;
        Ok(AuthUser {
            user_id: session.user_id,
            role: session.role,
        })
    }
}
