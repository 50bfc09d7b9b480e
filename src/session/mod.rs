//! Session store: the one signed-in user of this data layer, if any.
//!
//! The provider decides who is signed in and which claims they hold. The session store only
//! adds the admin-code check: an admin session exists only after a login that presented the
//! configured code.

use std::sync::Arc;

use serde_json::json;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;

use crate::activity::ActivityRecorder;
use crate::auth::constant_time_compare;
use crate::db::{to_fields, Collection, DocumentStore};
use crate::errors::{AppError, AuthFailure, AuthOperation};
use crate::identity::{Claims, IdentityProvider, Principal};
use crate::models::{timestamp_now, ActivityAction, RegisterRequest, Role, User, UserRecord};

pub const RESET_EMAIL_SENT: &str =
    "Password reset email sent successfully. Please check your inbox.";

pub struct SessionStore {
    provider: Arc<dyn IdentityProvider>,
    docs: Arc<dyn DocumentStore>,
    activity: ActivityRecorder,
    admin_code: Option<String>,
    current: Arc<RwLock<Option<User>>>,
    observer: JoinHandle<()>,
}

impl SessionStore {
    /// Start observing the provider's auth state.
    ///
    /// With `admin_code` unset no login can produce an admin session. Must be called from
    /// inside a Tokio runtime.
    pub fn start(
        provider: Arc<dyn IdentityProvider>,
        docs: Arc<dyn DocumentStore>,
        admin_code: Option<String>,
    ) -> Self {
        let current = Arc::new(RwLock::new(None));
        let observer = tokio::spawn(observe(
            provider.clone(),
            provider.observe_auth_state(),
            current.clone(),
        ));

        Self {
            activity: ActivityRecorder::new(docs.clone()),
            provider,
            docs,
            admin_code: admin_code.filter(|code| !code.is_empty()),
            current,
            observer,
        }
    }

    pub async fn current_user(&self) -> Option<User> {
        self.current.read().await.clone()
    }

    /// Sign in with email and password.
    ///
    /// A principal holding the admin claim must also present the configured admin code.
    /// Otherwise the principal is signed straight back out and no session remains.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        admin_code: Option<&str>,
    ) -> Result<User, AppError> {
        let principal = self
            .provider
            .sign_in(email, password)
            .await
            .map_err(|e| AuthFailure::from_provider(AuthOperation::Login, &e))?;
        let claims = self.claims_or_default(&principal).await;

        let mut session = self.current.write().await;

        if claims.admin && !self.admin_code_matches(admin_code) {
            if let Err(e) = self.provider.sign_out().await {
                tracing::warn!(uid = %principal.uid, "Sign-out after rejected admin login failed: {}", e);
            }
            *session = None;
            tracing::warn!(uid = %principal.uid, "Admin login rejected: admin code missing or wrong");
            return Err(AuthFailure::OperationNotPermitted.into());
        }

        let role = if claims.admin { Role::Admin } else { Role::Student };
        let user = session_user(&principal, None, role);
        *session = Some(user.clone());

        tracing::info!(uid = %user.uid, role = ?user.role, "Login successful");
        Ok(user)
    }

    pub async fn logout(&self) -> Result<(), AppError> {
        self.provider
            .sign_out()
            .await
            .map_err(|e| AppError::Internal(format!("Sign-out failed: {}", e)))?;
        let previous = self.current.write().await.take();

        if let Some(user) = previous {
            tracing::info!(uid = %user.uid, "Logged out");
        }
        Ok(())
    }

    /// Ask the provider to send a password reset email.
    pub async fn reset_password(&self, email: &str) -> Result<String, AppError> {
        let email = email.trim();
        if email.is_empty() {
            return Err(AuthFailure::MissingEmail.into());
        }

        self.provider
            .send_password_reset(email)
            .await
            .map_err(|e| AuthFailure::from_provider(AuthOperation::PasswordReset, &e))?;

        Ok(RESET_EMAIL_SENT.to_string())
    }

    /// Create an account, write its user record and start a session.
    ///
    /// If the user record cannot be written the error is returned and no session remains. The
    /// provider account itself is not rolled back.
    ///
    /// The session is always a student session. An account holding the admin claim gets its
    /// admin session from a later login with the admin code.
    pub async fn register(&self, request: RegisterRequest) -> Result<User, AppError> {
        let name = request.name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::Validation("Name is required".to_string()));
        }

        let principal = self
            .provider
            .create_account(&request.email, &request.password)
            .await
            .map_err(|e| AuthFailure::from_provider(AuthOperation::Register, &e))?;

        if let Err(e) = self.provider.set_display_name(&principal, &name).await {
            tracing::warn!(uid = %principal.uid, "Failed to set display name: {}", e);
        }

        let claims = self.claims_or_default(&principal).await;
        let role = if claims.admin { Role::Admin } else { Role::Student };
        if request.role == Some(Role::Admin) && !claims.admin {
            tracing::warn!(uid = %principal.uid, "Requested admin role without admin claim, registering as student");
        }

        let record = UserRecord {
            id: String::new(),
            uid: principal.uid.clone(),
            name: name.clone(),
            email: principal.email.clone(),
            role,
            created_at: timestamp_now(),
        };
        if let Err(e) = self.write_user_record(&record).await {
            tracing::error!(uid = %principal.uid, "Failed to write user record, registration aborted: {}", e);
            if let Err(e) = self.provider.sign_out().await {
                tracing::warn!(uid = %principal.uid, "Sign-out after failed registration failed: {}", e);
            }
            *self.current.write().await = None;
            return Err(e);
        }

        self.activity
            .record_best_effort(
                ActivityAction::UserRegistered,
                &principal.uid,
                json!({"name": name, "email": principal.email, "role": role}),
            )
            .await;

        let user = session_user(&principal, Some(&name), Role::Student);
        *self.current.write().await = Some(user.clone());

        tracing::info!(uid = %user.uid, "Registered new account");
        Ok(user)
    }

    async fn write_user_record(&self, record: &UserRecord) -> Result<(), AppError> {
        self.docs
            .insert(Collection::Users, to_fields(record)?)
            .await
            .map(|_| ())
    }

    async fn claims_or_default(&self, principal: &Principal) -> Claims {
        match self.provider.get_claims(principal).await {
            Ok(claims) => claims,
            Err(e) => {
                tracing::warn!(uid = %principal.uid, "Could not read claims, treating as student: {}", e);
                Claims::default()
            }
        }
    }

    fn admin_code_matches(&self, given: Option<&str>) -> bool {
        match (&self.admin_code, given) {
            (Some(expected), Some(given)) => constant_time_compare(given, expected),
            _ => false,
        }
    }
}

impl Drop for SessionStore {
    fn drop(&mut self) {
        self.observer.abort();
    }
}

/// Follow provider auth-state pushes.
///
/// Sign-out always clears the session. A signed-in principal refreshes it, except that an
/// admin role is only kept when the session already holds that uid as a verified admin.
async fn observe(
    provider: Arc<dyn IdentityProvider>,
    mut rx: watch::Receiver<Option<Principal>>,
    current: Arc<RwLock<Option<User>>>,
) {
    while rx.changed().await.is_ok() {
        let state = rx.borrow_and_update().clone();

        let Some(principal) = state else {
            if current.write().await.take().is_some() {
                tracing::debug!("Provider signed out, session cleared");
            }
            continue;
        };

        let claims = match provider.get_claims(&principal).await {
            Ok(claims) => claims,
            Err(e) => {
                tracing::warn!(uid = %principal.uid, "Could not read claims: {}", e);
                Claims::default()
            }
        };

        // A newer push is already waiting; let it win.
        if rx.borrow().as_ref() != Some(&principal) {
            continue;
        }

        let mut session = current.write().await;
        let verified_admin = session
            .as_ref()
            .is_some_and(|u| u.uid == principal.uid && u.is_admin());

        if claims.admin && !verified_admin {
            if !session.as_ref().is_some_and(|u| u.uid == principal.uid) {
                tracing::debug!(uid = %principal.uid, "Admin principal awaiting code verification");
            }
            continue;
        }

        let role = if verified_admin { Role::Admin } else { Role::Student };
        *session = Some(session_user(&principal, None, role));
    }
}

fn session_user(principal: &Principal, name: Option<&str>, role: Role) -> User {
    let name = name
        .map(str::to_string)
        .or_else(|| principal.display_name.clone().filter(|n| !n.trim().is_empty()))
        .unwrap_or_else(|| {
            principal
                .email
                .split('@')
                .next()
                .unwrap_or_default()
                .to_string()
        });

    User {
        uid: principal.uid.clone(),
        email: principal.email.clone(),
        name,
        role,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Document, Filter, LocalDocumentStore, MemoryStorage, Subscription, WriteBatch};
    use crate::identity::AccountDirectory;
    use async_trait::async_trait;
    use std::time::Duration;

    /// Rejects every batch that writes to `users`.
    struct UsersUnavailable {
        inner: LocalDocumentStore,
    }

    #[async_trait]
    impl DocumentStore for UsersUnavailable {
        async fn query(
            &self,
            collection: Collection,
            filter: &Filter,
        ) -> Result<Vec<Document>, AppError> {
            self.inner.query(collection, filter).await
        }

        async fn commit(&self, batch: WriteBatch) -> Result<Vec<String>, AppError> {
            if batch.touched().contains(&Collection::Users) {
                return Err(AppError::Database("users table locked".to_string()));
            }
            self.inner.commit(batch).await
        }

        fn watch(&self, collection: Collection) -> Subscription {
            self.inner.watch(collection)
        }

        fn kind(&self) -> &'static str {
            "users-unavailable"
        }
    }

    const CODE: &str = "club-admin-code";

    struct Fixture {
        directory: Arc<AccountDirectory>,
        docs: Arc<dyn DocumentStore>,
        session: SessionStore,
    }

    fn fixture(admin_code: Option<&str>) -> Fixture {
        let docs: Arc<dyn DocumentStore> =
            Arc::new(LocalDocumentStore::open(Arc::new(MemoryStorage::new())).unwrap());
        fixture_over(admin_code, docs)
    }

    fn fixture_over(admin_code: Option<&str>, docs: Arc<dyn DocumentStore>) -> Fixture {
        let directory = Arc::new(
            AccountDirectory::open(
                Arc::new(MemoryStorage::new()),
                &["admin@club.edu".to_string()],
            )
            .unwrap(),
        );
        let session = SessionStore::start(
            directory.clone(),
            docs.clone(),
            admin_code.map(str::to_string),
        );
        Fixture {
            directory,
            docs,
            session,
        }
    }

    fn register_request(name: &str, email: &str) -> RegisterRequest {
        RegisterRequest {
            name: name.to_string(),
            email: email.to_string(),
            password: "secret1".to_string(),
            role: None,
        }
    }

    async fn create_admin(f: &Fixture) {
        f.directory
            .create_account("admin@club.edu", "secret1")
            .await
            .unwrap();
        f.directory.sign_out().await.unwrap();
    }

    /// Wait until the observer has caught up with the provider.
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn test_student_login_needs_only_credentials() {
        let f = fixture(Some(CODE));
        f.session
            .register(register_request("Asha", "asha@club.edu"))
            .await
            .unwrap();
        f.session.logout().await.unwrap();
        assert!(f.session.current_user().await.is_none());

        let user = f.session.login("asha@club.edu", "secret1", None).await.unwrap();
        assert_eq!(user.role, Role::Student);
        assert_eq!(user.name, "Asha");
        assert_eq!(f.session.current_user().await, Some(user));
    }

    #[tokio::test]
    async fn test_admin_login_requires_matching_code() {
        let f = fixture(Some(CODE));
        create_admin(&f).await;

        let err = f
            .session
            .login("admin@club.edu", "secret1", Some("wrong"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Auth(AuthFailure::OperationNotPermitted)));
        assert_eq!(err.message(), "Invalid admin credentials");
        settle().await;
        assert!(f.session.current_user().await.is_none());
        assert!(f.directory.observe_auth_state().borrow().is_none());

        let err = f
            .session
            .login("admin@club.edu", "secret1", None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Auth(AuthFailure::OperationNotPermitted)));

        let user = f
            .session
            .login("admin@club.edu", "secret1", Some(CODE))
            .await
            .unwrap();
        assert_eq!(user.role, Role::Admin);
        assert_eq!(user.name, "admin");
        settle().await;
        assert!(f.session.current_user().await.unwrap().is_admin());
    }

    #[tokio::test]
    async fn test_admin_login_disabled_without_configured_code() {
        let f = fixture(None);
        create_admin(&f).await;

        let err = f
            .session
            .login("admin@club.edu", "secret1", Some(""))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Auth(AuthFailure::OperationNotPermitted)));
        assert!(f.session.current_user().await.is_none());
    }

    #[tokio::test]
    async fn test_login_maps_provider_failures() {
        let f = fixture(Some(CODE));
        f.session
            .register(register_request("Asha", "asha@club.edu"))
            .await
            .unwrap();

        let err = f
            .session
            .login("asha@club.edu", "nope", None)
            .await
            .unwrap_err();
        assert_eq!(err.message(), "Incorrect password");

        let err = f
            .session
            .login("ghost@club.edu", "secret1", None)
            .await
            .unwrap_err();
        assert_eq!(err.message(), "No user found with this email address");

        let err = f.session.login("bad", "secret1", None).await.unwrap_err();
        assert_eq!(err.message(), "Invalid email address");
    }

    #[tokio::test]
    async fn test_register_writes_record_and_activity() {
        let f = fixture(Some(CODE));
        let user = f
            .session
            .register(RegisterRequest {
                role: Some(Role::Admin),
                ..register_request("Ravi", "ravi@club.edu")
            })
            .await
            .unwrap();
        assert_eq!(user.role, Role::Student);
        assert_eq!(user.name, "Ravi");

        let records = f
            .docs
            .query(Collection::Users, &Filter::field_equals("uid", user.uid.clone()))
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get("role"), Some(&json!("student")));

        let logs = f
            .docs
            .query(
                Collection::ActivityLogs,
                &Filter::field_equals("action", "user_registered"),
            )
            .await
            .unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].get("userId"), Some(&json!(user.uid)));
    }

    #[tokio::test]
    async fn test_register_fails_when_user_record_cannot_be_written() {
        let docs: Arc<dyn DocumentStore> = Arc::new(UsersUnavailable {
            inner: LocalDocumentStore::open(Arc::new(MemoryStorage::new())).unwrap(),
        });
        let f = fixture_over(Some(CODE), docs);

        let err = f
            .session
            .register(register_request("Asha", "asha@club.edu"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Database(_)));

        settle().await;
        assert!(f.session.current_user().await.is_none());
        assert!(f.directory.observe_auth_state().borrow().is_none());

        let logs = f
            .docs
            .query(Collection::ActivityLogs, &Filter::All)
            .await
            .unwrap();
        assert!(logs.is_empty());
    }

    #[tokio::test]
    async fn test_register_with_admin_claim_gets_student_session() {
        let f = fixture(Some(CODE));
        let user = f
            .session
            .register(register_request("Head", "admin@club.edu"))
            .await
            .unwrap();
        assert_eq!(user.role, Role::Student);
        settle().await;
        assert!(!f.session.current_user().await.unwrap().is_admin());
    }

    #[tokio::test]
    async fn test_register_failures() {
        let f = fixture(Some(CODE));
        f.session
            .register(register_request("Asha", "asha@club.edu"))
            .await
            .unwrap();

        let err = f
            .session
            .register(register_request("Asha", "asha@club.edu"))
            .await
            .unwrap_err();
        assert_eq!(err.message(), "Email is already in use");

        let err = f
            .session
            .register(RegisterRequest {
                password: "123".to_string(),
                ..register_request("B", "b@club.edu")
            })
            .await
            .unwrap_err();
        assert_eq!(err.message(), "Password is too weak");

        let err = f
            .session
            .register(register_request("  ", "c@club.edu"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_reset_password() {
        let f = fixture(Some(CODE));
        let err = f.session.reset_password("  ").await.unwrap_err();
        assert_eq!(err.message(), "Email address is required");

        let err = f.session.reset_password("ghost@club.edu").await.unwrap_err();
        assert_eq!(err.message(), "No user found with this email address");

        let err = f.session.reset_password("not-an-email").await.unwrap_err();
        assert_eq!(err.message(), "Please enter a valid email address");

        f.session
            .register(register_request("Asha", "asha@club.edu"))
            .await
            .unwrap();
        assert_eq!(
            f.session.reset_password("asha@club.edu").await.unwrap(),
            RESET_EMAIL_SENT
        );
    }

    #[tokio::test]
    async fn test_observer_follows_provider_sign_out() {
        let f = fixture(Some(CODE));
        f.session
            .register(register_request("Asha", "asha@club.edu"))
            .await
            .unwrap();
        assert!(f.session.current_user().await.is_some());

        f.directory.set_disabled("asha@club.edu", true).unwrap();
        settle().await;
        assert!(f.session.current_user().await.is_none());
    }

    #[tokio::test]
    async fn test_observer_picks_up_student_sign_in() {
        let f = fixture(Some(CODE));
        f.directory
            .create_account("kiran@club.edu", "secret1")
            .await
            .unwrap();
        settle().await;

        let user = f.session.current_user().await.unwrap();
        assert_eq!(user.email, "kiran@club.edu");
        assert_eq!(user.name, "kiran");
        assert_eq!(user.role, Role::Student);
    }

    #[tokio::test]
    async fn test_observer_never_grants_admin() {
        let f = fixture(Some(CODE));
        f.directory
            .create_account("admin@club.edu", "secret1")
            .await
            .unwrap();
        settle().await;
        assert!(f.session.current_user().await.is_none());
    }
}
