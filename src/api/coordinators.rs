//! Coordinator API endpoints.

use axum::{
    extract::{Path, State},
    Json,
};

use super::{error, success, ApiResult};
use crate::auth::require_admin;
use crate::models::{Coordinator, CreateCoordinatorRequest, UpdateCoordinatorRequest};
use crate::AppState;

/// GET /api/coordinators
pub async fn list_coordinators(State(state): State<AppState>) -> ApiResult<Vec<Coordinator>> {
    let revision_id = state.entities.revision();
    success(state.entities.coordinators(), revision_id)
}

/// POST /api/coordinators
pub async fn create_coordinator(
    State(state): State<AppState>,
    Json(request): Json<CreateCoordinatorRequest>,
) -> ApiResult<Coordinator> {
    let revision_id = state.entities.revision();
    let admin = match require_admin(&state.session).await {
        Ok(user) => user,
        Err(e) => return error(e, revision_id),
    };

    match state.entities.add_coordinator(&admin.uid, request).await {
        Ok(coordinator) => success(coordinator, state.entities.revision()),
        Err(e) => error(e, revision_id),
    }
}

/// PUT /api/coordinators/:id
pub async fn update_coordinator(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<UpdateCoordinatorRequest>,
) -> ApiResult<Coordinator> {
    let revision_id = state.entities.revision();
    let admin = match require_admin(&state.session).await {
        Ok(user) => user,
        Err(e) => return error(e, revision_id),
    };

    match state
        .entities
        .update_coordinator(&admin.uid, &id, request)
        .await
    {
        Ok(coordinator) => success(coordinator, state.entities.revision()),
        Err(e) => error(e, revision_id),
    }
}

/// DELETE /api/coordinators/:id
pub async fn delete_coordinator(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<()> {
    let revision_id = state.entities.revision();
    let admin = match require_admin(&state.session).await {
        Ok(user) => user,
        Err(e) => return error(e, revision_id),
    };

    match state.entities.delete_coordinator(&admin.uid, &id).await {
        Ok(()) => success((), state.entities.revision()),
        Err(e) => error(e, revision_id),
    }
}
