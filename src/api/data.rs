//! Whole-store and admin dashboard endpoints.

use axum::extract::{Query, State};

use super::{error, success, ApiResult};
use crate::auth::require_admin;
use crate::models::{timestamp_now, ActivityLog, ActivityQuery, AllData, Analytics, RevisionInfo};
use crate::AppState;

/// GET /api/data - Every collection in one response.
pub async fn get_all_data(State(state): State<AppState>) -> ApiResult<AllData> {
    let revision_id = state.entities.revision();
    success(state.entities.get_all_data(), revision_id)
}

/// GET /api/data/revision - Get the current revision info.
pub async fn get_revision(State(state): State<AppState>) -> ApiResult<RevisionInfo> {
    let revision_id = state.entities.revision();
    let info = RevisionInfo {
        revision_id,
        generated_at: timestamp_now(),
    };
    success(info, revision_id)
}

/// GET /api/activity - Activity log, newest first. Admin only.
pub async fn list_activity(
    State(state): State<AppState>,
    Query(query): Query<ActivityQuery>,
) -> ApiResult<Vec<ActivityLog>> {
    let revision_id = state.entities.revision();

    if let Err(e) = require_admin(&state.session).await {
        return error(e, revision_id);
    }
    success(state.entities.activity_log(query.action), revision_id)
}

/// GET /api/analytics - Dashboard counters. Admin only.
pub async fn get_analytics(State(state): State<AppState>) -> ApiResult<Analytics> {
    let revision_id = state.entities.revision();

    if let Err(e) = require_admin(&state.session).await {
        return error(e, revision_id);
    }
    success(state.entities.analytics(), revision_id)
}
