//! UI preference endpoints.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use super::{error, success, ApiResult};
use crate::AppState;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DarkModeSetting {
    /// `None` until the user picks one
    pub dark_mode: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetDarkModeRequest {
    pub dark_mode: bool,
}

/// GET /api/preferences/dark-mode
pub async fn get_dark_mode(State(state): State<AppState>) -> ApiResult<DarkModeSetting> {
    let revision_id = state.entities.revision();

    match state.preferences.dark_mode() {
        Ok(dark_mode) => success(DarkModeSetting { dark_mode }, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// PUT /api/preferences/dark-mode
pub async fn set_dark_mode(
    State(state): State<AppState>,
    Json(request): Json<SetDarkModeRequest>,
) -> ApiResult<DarkModeSetting> {
    let revision_id = state.entities.revision();

    match state.preferences.set_dark_mode(request.dark_mode) {
        Ok(()) => success(
            DarkModeSetting {
                dark_mode: Some(request.dark_mode),
            },
            revision_id,
        ),
        Err(e) => error(e, revision_id),
    }
}
