//! Endpoints scoped to the signed-in user.

use axum::{extract::State, Json};

use super::{error, success, ApiResult};
use crate::auth::require_user;
use crate::models::{Certificate, ProfileUpdateRequest, Registration, UserRecord};
use crate::AppState;

/// GET /api/me/registrations
pub async fn my_registrations(State(state): State<AppState>) -> ApiResult<Vec<Registration>> {
    let revision_id = state.entities.revision();

    match require_user(&state.session).await {
        Ok(user) => success(state.entities.get_user_registrations(&user.uid), revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// GET /api/me/certificates
pub async fn my_certificates(State(state): State<AppState>) -> ApiResult<Vec<Certificate>> {
    let revision_id = state.entities.revision();

    match require_user(&state.session).await {
        Ok(user) => success(state.entities.user_certificates(&user.uid), revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// PUT /api/me/profile
pub async fn update_profile(
    State(state): State<AppState>,
    Json(request): Json<ProfileUpdateRequest>,
) -> ApiResult<Option<UserRecord>> {
    let revision_id = state.entities.revision();
    let user = match require_user(&state.session).await {
        Ok(user) => user,
        Err(e) => return error(e, revision_id),
    };

    match state.entities.update_profile(&user.uid, request).await {
        Ok(record) => success(record, state.entities.revision()),
        Err(e) => error(e, revision_id),
    }
}
