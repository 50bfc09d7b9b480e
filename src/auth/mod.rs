//! Access guards for API handlers.
//!
//! The session is process-wide, so the router also refuses browser requests from origins
//! outside the configured frontend. Secrets are compared in constant time to mitigate timing
//! attacks.

use std::sync::Arc;

use axum::{
    extract::Request,
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
};
use subtle::ConstantTimeEq;

use crate::errors::{AppError, AppErrorWithRevision};
use crate::models::User;
use crate::session::SessionStore;

/// Perform constant-time string comparison.
pub fn constant_time_compare(a: &str, b: &str) -> bool {
    let a_bytes = a.as_bytes();
    let b_bytes = b.as_bytes();

    a_bytes.ct_eq(b_bytes).into()
}

/// Origin layer: requests without an `Origin` header (same-origin navigation, CLI clients)
/// pass, and so do those from an allowed origin. Anything else is refused with `Forbidden`.
pub async fn origin_guard_layer(
    allowed_origins: Arc<Vec<String>>,
    request: Request,
    next: Next,
) -> Response {
    let origin = request
        .headers()
        .get(header::ORIGIN)
        .map(|v| v.to_str().unwrap_or_default().to_string());

    match origin {
        Some(origin) if !origin_allowed(&allowed_origins, &origin) => {
            tracing::warn!(%origin, method = %request.method(), path = %request.uri().path(), "Refused cross-origin request");
            AppErrorWithRevision {
                error: AppError::Forbidden("Origin not allowed".to_string()),
                revision_id: 0,
            }
            .into_response()
        }
        _ => next.run(request).await,
    }
}

/// Exact match after dropping a trailing slash. `null` and empty origins never match.
pub fn origin_allowed(allowed_origins: &[String], origin: &str) -> bool {
    let origin = origin.trim_end_matches('/');
    !origin.is_empty() && allowed_origins.iter().any(|allowed| allowed == origin)
}

/// The signed-in user, or `Unauthorized`.
pub async fn require_user(session: &SessionStore) -> Result<User, AppError> {
    session
        .current_user()
        .await
        .ok_or_else(|| AppError::Unauthorized("Please sign in first".to_string()))
}

/// The signed-in admin, or `Unauthorized`/`Forbidden`.
pub async fn require_admin(session: &SessionStore) -> Result<User, AppError> {
    let user = require_user(session).await?;
    if user.is_admin() {
        Ok(user)
    } else {
        tracing::warn!(uid = %user.uid, "Admin-only operation refused");
        Err(AppError::Forbidden("Admin access required".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_time_compare_equal() {
        assert!(constant_time_compare("CLUB-CODE-2025", "CLUB-CODE-2025"));
    }

    #[test]
    fn test_constant_time_compare_not_equal() {
        assert!(!constant_time_compare("CLUB-CODE-2025", "CLUB-CODE-2026"));
    }

    #[test]
    fn test_constant_time_compare_different_lengths() {
        assert!(!constant_time_compare("short", "much-longer-code"));
    }

    #[test]
    fn test_origin_allowed() {
        let allowed = vec!["http://localhost:5173".to_string()];

        assert!(origin_allowed(&allowed, "http://localhost:5173"));
        assert!(origin_allowed(&allowed, "http://localhost:5173/"));
        assert!(!origin_allowed(&allowed, "http://localhost:5174"));
        assert!(!origin_allowed(&allowed, "https://evil.example"));
        assert!(!origin_allowed(&allowed, "null"));
        assert!(!origin_allowed(&allowed, ""));
    }

    #[test]
    fn test_constant_time_compare_empty() {
        assert!(constant_time_compare("", ""));
        assert!(!constant_time_compare("", "not-empty"));
    }
}
