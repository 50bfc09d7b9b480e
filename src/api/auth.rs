//! Session endpoints.

use axum::{extract::State, Json};
use serde::Serialize;

use super::{error, success, ApiResult};
use crate::models::{LoginRequest, PasswordResetRequest, RegisterRequest, User};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// GET /api/auth/session - The signed-in user, or null.
pub async fn get_session(State(state): State<AppState>) -> ApiResult<Option<User>> {
    success(state.session.current_user().await, state.entities.revision())
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> ApiResult<User> {
    let revision_id = state.entities.revision();

    match state
        .session
        .login(&request.email, &request.password, request.admin_code.as_deref())
        .await
    {
        Ok(user) => success(user, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// POST /api/auth/logout
pub async fn logout(State(state): State<AppState>) -> ApiResult<()> {
    let revision_id = state.entities.revision();

    match state.session.logout().await {
        Ok(()) => success((), revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// POST /api/auth/register - Create an account and sign it in.
pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> ApiResult<User> {
    let revision_id = state.entities.revision();

    match state.session.register(request).await {
        Ok(user) => success(user, state.entities.revision()),
        Err(e) => error(e, revision_id),
    }
}

/// POST /api/auth/password-reset
pub async fn password_reset(
    State(state): State<AppState>,
    Json(request): Json<PasswordResetRequest>,
) -> ApiResult<MessageResponse> {
    let revision_id = state.entities.revision();

    match state.session.reset_password(&request.email).await {
        Ok(message) => success(MessageResponse { message }, revision_id),
        Err(e) => error(e, revision_id),
    }
}
