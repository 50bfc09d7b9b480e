//! Certificate API endpoints. Admin only; students read theirs under `/api/me`.

use axum::{extract::State, Json};

use super::{error, success, ApiResult};
use crate::auth::require_admin;
use crate::models::{Certificate, IssueCertificateRequest};
use crate::AppState;

/// GET /api/certificates
pub async fn list_certificates(State(state): State<AppState>) -> ApiResult<Vec<Certificate>> {
    let revision_id = state.entities.revision();

    if let Err(e) = require_admin(&state.session).await {
        return error(e, revision_id);
    }
    success(state.entities.certificates(), revision_id)
}

/// POST /api/certificates
pub async fn issue_certificate(
    State(state): State<AppState>,
    Json(request): Json<IssueCertificateRequest>,
) -> ApiResult<Certificate> {
    let revision_id = state.entities.revision();

    if let Err(e) = require_admin(&state.session).await {
        return error(e, revision_id);
    }
    match state.entities.issue_certificate(request).await {
        Ok(certificate) => success(certificate, state.entities.revision()),
        Err(e) => error(e, revision_id),
    }
}
