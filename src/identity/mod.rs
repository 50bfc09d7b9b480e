//! Identity provider seam.
//!
//! The session store authenticates only through [`IdentityProvider`]; it never sees passwords
//! at rest or decides claims itself.

mod directory;

pub use directory::*;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// An authenticated identity as the provider reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    pub uid: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// Provider-asserted attributes of a principal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub admin: bool,
}

/// Provider failure codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorCode {
    UserNotFound,
    WrongPassword,
    InvalidEmail,
    UserDisabled,
    TooManyRequests,
    NetworkRequestFailed,
    OperationNotAllowed,
    InvalidCredential,
    EmailAlreadyInUse,
    WeakPassword,
    /// Anything else; the message carries the detail
    Internal,
}

impl ProviderErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderErrorCode::UserNotFound => "auth/user-not-found",
            ProviderErrorCode::WrongPassword => "auth/wrong-password",
            ProviderErrorCode::InvalidEmail => "auth/invalid-email",
            ProviderErrorCode::UserDisabled => "auth/user-disabled",
            ProviderErrorCode::TooManyRequests => "auth/too-many-requests",
            ProviderErrorCode::NetworkRequestFailed => "auth/network-request-failed",
            ProviderErrorCode::OperationNotAllowed => "auth/operation-not-allowed",
            ProviderErrorCode::InvalidCredential => "auth/invalid-credential",
            ProviderErrorCode::EmailAlreadyInUse => "auth/email-already-in-use",
            ProviderErrorCode::WeakPassword => "auth/weak-password",
            ProviderErrorCode::Internal => "auth/internal-error",
        }
    }
}

/// Error returned by an [`IdentityProvider`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderError {
    pub code: ProviderErrorCode,
    pub message: String,
}

impl ProviderError {
    pub fn new(code: ProviderErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for ProviderError {}

/// External authentication service, as consumed by the session store.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Principal, ProviderError>;

    async fn sign_out(&self) -> Result<(), ProviderError>;

    async fn send_password_reset(&self, email: &str) -> Result<(), ProviderError>;

    /// Create a principal and sign it in.
    async fn create_account(&self, email: &str, password: &str)
        -> Result<Principal, ProviderError>;

    async fn set_display_name(&self, principal: &Principal, name: &str)
        -> Result<(), ProviderError>;

    /// Current auth state; every change is pushed to the receiver. Dropping it unsubscribes.
    fn observe_auth_state(&self) -> watch::Receiver<Option<Principal>>;

    async fn get_claims(&self, principal: &Principal) -> Result<Claims, ProviderError>;
}
