//! Announcement API endpoints.

use axum::{
    extract::{Path, State},
    Json,
};

use super::{error, success, ApiResult};
use crate::auth::require_admin;
use crate::models::{Announcement, CreateAnnouncementRequest, UpdateAnnouncementRequest};
use crate::AppState;

/// GET /api/announcements
pub async fn list_announcements(State(state): State<AppState>) -> ApiResult<Vec<Announcement>> {
    let revision_id = state.entities.revision();
    success(state.entities.announcements(), revision_id)
}

/// POST /api/announcements
pub async fn create_announcement(
    State(state): State<AppState>,
    Json(request): Json<CreateAnnouncementRequest>,
) -> ApiResult<Announcement> {
    let revision_id = state.entities.revision();
    let admin = match require_admin(&state.session).await {
        Ok(user) => user,
        Err(e) => return error(e, revision_id),
    };

    match state.entities.add_announcement(&admin.uid, request).await {
        Ok(announcement) => success(announcement, state.entities.revision()),
        Err(e) => error(e, revision_id),
    }
}

/// PUT /api/announcements/:id
pub async fn update_announcement(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<UpdateAnnouncementRequest>,
) -> ApiResult<Announcement> {
    let revision_id = state.entities.revision();
    let admin = match require_admin(&state.session).await {
        Ok(user) => user,
        Err(e) => return error(e, revision_id),
    };

    match state
        .entities
        .update_announcement(&admin.uid, &id, request)
        .await
    {
        Ok(announcement) => success(announcement, state.entities.revision()),
        Err(e) => error(e, revision_id),
    }
}

/// DELETE /api/announcements/:id
pub async fn delete_announcement(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<()> {
    let revision_id = state.entities.revision();
    let admin = match require_admin(&state.session).await {
        Ok(user) => user,
        Err(e) => return error(e, revision_id),
    };

    match state.entities.delete_announcement(&admin.uid, &id).await {
        Ok(()) => success((), state.entities.revision()),
        Err(e) => error(e, revision_id),
    }
}
