//! REST API module.
//!
//! Handlers for the portal's JSON endpoints. Every response carries the entity store revision
//! so the client can tell when its copy is stale.

mod announcements;
mod auth;
mod certificates;
mod coordinators;
mod data;
mod events;
mod me;
mod preferences;

pub use announcements::*;
pub use auth::*;
pub use certificates::*;
pub use coordinators::*;
pub use data::*;
pub use events::*;
pub use me::*;
pub use preferences::*;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::errors::{AppError, AppErrorWithRevision};

/// Success response envelope.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
    pub revision_id: u64,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(data: T, revision_id: u64) -> Self {
        Self {
            success: true,
            data,
            revision_id,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// Response type that can be either success or error.
pub type ApiResult<T> = Result<ApiResponse<T>, AppErrorWithRevision>;

/// Create a successful API response.
pub fn success<T: Serialize>(data: T, revision_id: u64) -> ApiResult<T> {
    Ok(ApiResponse::new(data, revision_id))
}

/// Create an error API response.
pub fn error<T: Serialize>(err: AppError, revision_id: u64) -> ApiResult<T> {
    Err(AppErrorWithRevision {
        error: err,
        revision_id,
    })
}
