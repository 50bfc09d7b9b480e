//! Error handling module for the club backend.
//!
//! Provides centralized error types with mapping to HTTP status codes and response envelopes,
//! plus the stable authentication failure enum the session store surfaces to callers.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::identity::{ProviderError, ProviderErrorCode};

/// Error codes as constants to avoid stringly-typed errors.
pub mod codes {
    pub const UNAUTHORIZED: &str = "UNAUTHORIZED";
    pub const FORBIDDEN: &str = "FORBIDDEN";
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
    pub const ALREADY_REGISTERED: &str = "ALREADY_REGISTERED";
    pub const EVENT_FULL: &str = "EVENT_FULL";
    pub const CONFLICT: &str = "CONFLICT";
    pub const LIMIT_REACHED: &str = "LIMIT_REACHED";
    pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
    pub const DATABASE_ERROR: &str = "DATABASE_ERROR";
    pub const STORAGE_ERROR: &str = "STORAGE_ERROR";
    pub const CONFIGURATION_ERROR: &str = "CONFIGURATION_ERROR";
    pub const BAD_REQUEST: &str = "BAD_REQUEST";
}

/// Which session operation a provider failure came from.
///
/// The same provider code maps to different user-facing messages depending on context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOperation {
    Login,
    PasswordReset,
    Register,
}

impl AuthOperation {
    fn fallback_message(&self) -> &'static str {
        match self {
            AuthOperation::Login => "Login failed",
            AuthOperation::PasswordReset => "Failed to send password reset email",
            AuthOperation::Register => "Registration failed",
        }
    }
}

/// Stable authentication failures surfaced by the session store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthFailure {
    /// Email/password pair rejected without saying which part was wrong
    InvalidCredentials,
    WrongPassword,
    UserNotFound,
    /// Malformed email; the reset form words this differently
    InvalidEmail { reset: bool },
    MissingEmail,
    UserDisabled,
    TooManyRequests,
    NetworkFailure,
    /// The provider has the sign-in method switched off
    MethodDisabled,
    /// Admin principal without a matching admin code
    OperationNotPermitted,
    EmailAlreadyInUse,
    WeakPassword,
    /// Anything the provider reports that has no dedicated message
    Other(String),
}

impl AuthFailure {
    /// Map a provider error to the message enum for the given operation.
    pub fn from_provider(operation: AuthOperation, err: &ProviderError) -> Self {
        use ProviderErrorCode as Code;

        let mapped = match (operation, err.code) {
            (_, Code::NetworkRequestFailed) => Some(AuthFailure::NetworkFailure),
            (AuthOperation::Login | AuthOperation::PasswordReset, Code::UserNotFound) => {
                Some(AuthFailure::UserNotFound)
            }
            (AuthOperation::PasswordReset, Code::InvalidEmail) => {
                Some(AuthFailure::InvalidEmail { reset: true })
            }
            (_, Code::InvalidEmail) => Some(AuthFailure::InvalidEmail { reset: false }),
            (AuthOperation::Login, Code::WrongPassword) => Some(AuthFailure::WrongPassword),
            (AuthOperation::Login, Code::UserDisabled) => Some(AuthFailure::UserDisabled),
            (AuthOperation::Login, Code::TooManyRequests) => Some(AuthFailure::TooManyRequests),
            (AuthOperation::Login, Code::OperationNotAllowed) => Some(AuthFailure::MethodDisabled),
            (AuthOperation::Login, Code::InvalidCredential) => Some(AuthFailure::InvalidCredentials),
            (AuthOperation::Register, Code::EmailAlreadyInUse) => {
                Some(AuthFailure::EmailAlreadyInUse)
            }
            (AuthOperation::Register, Code::WeakPassword) => Some(AuthFailure::WeakPassword),
            _ => None,
        };

        mapped.unwrap_or_else(|| {
            if err.message.trim().is_empty() {
                AuthFailure::Other(operation.fallback_message().to_string())
            } else {
                AuthFailure::Other(err.message.clone())
            }
        })
    }

    /// User-facing message.
    pub fn message(&self) -> String {
        match self {
            AuthFailure::InvalidCredentials => "Invalid email or password".to_string(),
            AuthFailure::WrongPassword => "Incorrect password".to_string(),
            AuthFailure::UserNotFound => "No user found with this email address".to_string(),
            AuthFailure::InvalidEmail { reset: true } => {
                "Please enter a valid email address".to_string()
            }
            AuthFailure::InvalidEmail { reset: false } => "Invalid email address".to_string(),
            AuthFailure::MissingEmail => "Email address is required".to_string(),
            AuthFailure::UserDisabled => "This account has been disabled".to_string(),
            AuthFailure::TooManyRequests => {
                "Too many login attempts. Please try again later.".to_string()
            }
            AuthFailure::NetworkFailure => {
                "Network error. Please check your internet connection.".to_string()
            }
            AuthFailure::MethodDisabled => {
                "Authentication method not enabled. Please contact the administrator.".to_string()
            }
            AuthFailure::OperationNotPermitted => "Invalid admin credentials".to_string(),
            AuthFailure::EmailAlreadyInUse => "Email is already in use".to_string(),
            AuthFailure::WeakPassword => "Password is too weak".to_string(),
            AuthFailure::Other(msg) => msg.clone(),
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            AuthFailure::InvalidCredentials | AuthFailure::WrongPassword => "INVALID_CREDENTIALS",
            AuthFailure::UserNotFound => "USER_NOT_FOUND",
            AuthFailure::InvalidEmail { .. } => "INVALID_EMAIL",
            AuthFailure::MissingEmail => "MISSING_EMAIL",
            AuthFailure::UserDisabled => "USER_DISABLED",
            AuthFailure::TooManyRequests => "TOO_MANY_REQUESTS",
            AuthFailure::NetworkFailure => "NETWORK_FAILURE",
            AuthFailure::MethodDisabled => "METHOD_DISABLED",
            AuthFailure::OperationNotPermitted => "OPERATION_NOT_PERMITTED",
            AuthFailure::EmailAlreadyInUse => "EMAIL_ALREADY_IN_USE",
            AuthFailure::WeakPassword => "WEAK_PASSWORD",
            AuthFailure::Other(_) => "AUTH_FAILED",
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AuthFailure::InvalidCredentials
            | AuthFailure::WrongPassword
            | AuthFailure::UserNotFound => StatusCode::UNAUTHORIZED,
            AuthFailure::InvalidEmail { .. }
            | AuthFailure::MissingEmail
            | AuthFailure::WeakPassword => StatusCode::BAD_REQUEST,
            AuthFailure::UserDisabled
            | AuthFailure::MethodDisabled
            | AuthFailure::OperationNotPermitted => StatusCode::FORBIDDEN,
            AuthFailure::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            AuthFailure::NetworkFailure => StatusCode::SERVICE_UNAVAILABLE,
            AuthFailure::EmailAlreadyInUse => StatusCode::CONFLICT,
            AuthFailure::Other(_) => StatusCode::BAD_REQUEST,
        }
    }
}

/// Application error type.
#[derive(Debug)]
pub enum AppError {
    /// Sign-in required
    Unauthorized(String),
    /// Signed in, but not allowed
    Forbidden(String),
    /// Resource not found
    NotFound(String),
    /// Validation error
    Validation(String),
    /// Second registration for the same (user, event) pair
    AlreadyRegistered,
    /// Event has no free slots
    EventFull,
    /// Unique constraint violated inside a write batch
    Conflict(String),
    /// Bounded increment hit its limit inside a write batch
    LimitReached(String),
    /// Identity provider failure, already mapped to a stable message
    Auth(AuthFailure),
    /// Database error
    Database(String),
    /// Key-value storage error
    Storage(String),
    /// Invalid configuration
    Configuration(String),
    /// Internal server error
    Internal(String),
    /// Bad request
    BadRequest(String),
}

impl AppError {
    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::AlreadyRegistered => StatusCode::CONFLICT,
            AppError::EventFull => StatusCode::CONFLICT,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::LimitReached(_) => StatusCode::CONFLICT,
            AppError::Auth(failure) => failure.status_code(),
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Unauthorized(_) => codes::UNAUTHORIZED,
            AppError::Forbidden(_) => codes::FORBIDDEN,
            AppError::NotFound(_) => codes::NOT_FOUND,
            AppError::Validation(_) => codes::VALIDATION_ERROR,
            AppError::AlreadyRegistered => codes::ALREADY_REGISTERED,
            AppError::EventFull => codes::EVENT_FULL,
            AppError::Conflict(_) => codes::CONFLICT,
            AppError::LimitReached(_) => codes::LIMIT_REACHED,
            AppError::Auth(failure) => failure.code(),
            AppError::Database(_) => codes::DATABASE_ERROR,
            AppError::Storage(_) => codes::STORAGE_ERROR,
            AppError::Configuration(_) => codes::CONFIGURATION_ERROR,
            AppError::Internal(_) => codes::INTERNAL_ERROR,
            AppError::BadRequest(_) => codes::BAD_REQUEST,
        }
    }

    /// Get the error message.
    pub fn message(&self) -> String {
        match self {
            AppError::Unauthorized(msg) => msg.clone(),
            AppError::Forbidden(msg) => msg.clone(),
            AppError::NotFound(msg) => msg.clone(),
            AppError::Validation(msg) => msg.clone(),
            AppError::AlreadyRegistered => "You are already registered for this event".to_string(),
            AppError::EventFull => "This event is full".to_string(),
            AppError::Conflict(msg) => msg.clone(),
            AppError::LimitReached(msg) => msg.clone(),
            AppError::Auth(failure) => failure.message(),
            AppError::Database(msg) => msg.clone(),
            AppError::Storage(msg) => msg.clone(),
            AppError::Configuration(msg) => msg.clone(),
            AppError::Internal(msg) => msg.clone(),
            AppError::BadRequest(msg) => msg.clone(),
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error_code(), self.message())
    }
}

impl std::error::Error for AppError {}

impl From<AuthFailure> for AppError {
    fn from(failure: AuthFailure) -> Self {
        AppError::Auth(failure)
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!("Database error: {:?}", err);
        AppError::Database(format!("Database error: {}", err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        tracing::error!("JSON error: {:?}", err);
        AppError::BadRequest(format!("JSON error: {}", err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        tracing::error!("Storage I/O error: {:?}", err);
        AppError::Storage(format!("Storage error: {}", err))
    }
}

/// Error details in the response envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: String,
    pub message: String,
}

/// Error response envelope.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ErrorDetails,
    pub revision_id: u64,
}

impl ErrorResponse {
    pub fn new(error: &AppError, revision_id: u64) -> Self {
        Self {
            success: false,
            error: ErrorDetails {
                code: error.error_code().to_string(),
                message: error.message(),
            },
            revision_id,
        }
    }
}

/// Wrapper type for errors that carry revision_id context.
pub struct AppErrorWithRevision {
    pub error: AppError,
    pub revision_id: u64,
}

impl IntoResponse for AppErrorWithRevision {
    fn into_response(self) -> Response {
        let status = self.error.status_code();
        let body = ErrorResponse::new(&self.error, self.revision_id);
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider_error(code: ProviderErrorCode) -> ProviderError {
        ProviderError::new(code, "provider said no")
    }

    #[test]
    fn test_login_mapping() {
        let failure =
            AuthFailure::from_provider(AuthOperation::Login, &provider_error(ProviderErrorCode::WrongPassword));
        assert_eq!(failure, AuthFailure::WrongPassword);
        assert_eq!(failure.message(), "Incorrect password");

        let failure = AuthFailure::from_provider(
            AuthOperation::Login,
            &provider_error(ProviderErrorCode::InvalidCredential),
        );
        assert_eq!(failure.message(), "Invalid email or password");

        let failure = AuthFailure::from_provider(
            AuthOperation::Login,
            &provider_error(ProviderErrorCode::TooManyRequests),
        );
        assert_eq!(failure.code(), "TOO_MANY_REQUESTS");
    }

    #[test]
    fn test_invalid_email_wording_depends_on_operation() {
        let err = provider_error(ProviderErrorCode::InvalidEmail);
        assert_eq!(
            AuthFailure::from_provider(AuthOperation::PasswordReset, &err).message(),
            "Please enter a valid email address"
        );
        assert_eq!(
            AuthFailure::from_provider(AuthOperation::Register, &err).message(),
            "Invalid email address"
        );
    }

    #[test]
    fn test_register_mapping() {
        let failure = AuthFailure::from_provider(
            AuthOperation::Register,
            &provider_error(ProviderErrorCode::EmailAlreadyInUse),
        );
        assert_eq!(failure, AuthFailure::EmailAlreadyInUse);

        let failure = AuthFailure::from_provider(
            AuthOperation::Register,
            &provider_error(ProviderErrorCode::WeakPassword),
        );
        assert_eq!(failure.message(), "Password is too weak");
    }

    #[test]
    fn test_unmapped_code_keeps_provider_message() {
        let failure = AuthFailure::from_provider(
            AuthOperation::Register,
            &provider_error(ProviderErrorCode::WrongPassword),
        );
        assert_eq!(failure, AuthFailure::Other("provider said no".to_string()));

        let empty = ProviderError::new(ProviderErrorCode::Internal, "");
        assert_eq!(
            AuthFailure::from_provider(AuthOperation::PasswordReset, &empty).message(),
            "Failed to send password reset email"
        );
    }

    #[test]
    fn test_network_failure_maps_everywhere() {
        let err = provider_error(ProviderErrorCode::NetworkRequestFailed);
        for op in [
            AuthOperation::Login,
            AuthOperation::PasswordReset,
            AuthOperation::Register,
        ] {
            assert_eq!(AuthFailure::from_provider(op, &err), AuthFailure::NetworkFailure);
        }
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(AppError::EventFull.status_code(), StatusCode::CONFLICT);
        assert_eq!(
            AppError::Auth(AuthFailure::OperationNotPermitted).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(AppError::AlreadyRegistered.error_code(), codes::ALREADY_REGISTERED);
    }
}
