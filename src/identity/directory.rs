//! In-process account directory implementing [`IdentityProvider`].
//!
//! Accounts live in key-value storage with Argon2id password hashes. Admin claims are asserted
//! by the directory from its configured admin list, never by the caller.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use super::{Claims, IdentityProvider, Principal, ProviderError, ProviderErrorCode};
use crate::db::KeyValueStorage;
use crate::models::timestamp_now;

/// Storage key for the account list.
pub const ACCOUNTS_KEY: &str = "codvix_accounts";

pub const MIN_PASSWORD_LENGTH: usize = 6;

/// Consecutive failed sign-ins before an account is locked.
pub const MAX_FAILED_ATTEMPTS: u32 = 5;

pub const LOCKOUT_SECONDS: i64 = 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Account {
    uid: String,
    email: String,
    password_hash: String,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    admin: bool,
    #[serde(default)]
    disabled: bool,
    created_at: String,
}

impl Account {
    fn principal(&self) -> Principal {
        Principal {
            uid: self.uid.clone(),
            email: self.email.clone(),
            display_name: self.display_name.clone(),
        }
    }
}

#[derive(Debug, Default)]
struct Attempts {
    failures: u32,
    locked_until: Option<DateTime<Utc>>,
}

/// Account directory persisted in key-value storage.
pub struct AccountDirectory {
    storage: Arc<dyn KeyValueStorage>,
    accounts: Mutex<Vec<Account>>,
    admin_emails: Vec<String>,
    attempts: Mutex<HashMap<String, Attempts>>,
    state: watch::Sender<Option<Principal>>,
}

impl AccountDirectory {
    /// Load accounts from storage. Emails in `admin_emails` get the admin claim.
    pub fn open(
        storage: Arc<dyn KeyValueStorage>,
        admin_emails: &[String],
    ) -> Result<Self, ProviderError> {
        let accounts: Vec<Account> = match storage.get(ACCOUNTS_KEY).map_err(internal)? {
            Some(raw) => serde_json::from_str(&raw).map_err(internal)?,
            None => Vec::new(),
        };
        let admin_emails: Vec<String> = admin_emails.iter().map(|e| normalize_email(e)).collect();

        tracing::debug!(accounts = accounts.len(), "Opened account directory");

        Ok(Self {
            storage,
            accounts: Mutex::new(accounts),
            admin_emails,
            attempts: Mutex::new(HashMap::new()),
            state: watch::Sender::new(None),
        })
    }

    /// Enable or disable an account. Disabling the signed-in account signs it out.
    pub fn set_disabled(&self, email: &str, disabled: bool) -> Result<(), ProviderError> {
        let email = normalize_email(email);
        let mut accounts = lock(&self.accounts)?;
        let mut next = accounts.clone();
        let account = next
            .iter_mut()
            .find(|a| a.email == email)
            .ok_or_else(user_not_found)?;
        account.disabled = disabled;
        let uid = account.uid.clone();
        self.persist(&next)?;
        *accounts = next;
        drop(accounts);

        if disabled {
            self.state.send_if_modified(|current| {
                if current.as_ref().is_some_and(|p| p.uid == uid) {
                    *current = None;
                    true
                } else {
                    false
                }
            });
        }
        Ok(())
    }

    fn persist(&self, accounts: &[Account]) -> Result<(), ProviderError> {
        let raw = serde_json::to_string(accounts).map_err(internal)?;
        self.storage.set(ACCOUNTS_KEY, &raw).map_err(internal)
    }

    fn check_lockout(&self, email: &str) -> Result<(), ProviderError> {
        let attempts = lock(&self.attempts)?;
        if let Some(locked_until) = attempts.get(email).and_then(|a| a.locked_until) {
            if Utc::now() < locked_until {
                return Err(ProviderError::new(
                    ProviderErrorCode::TooManyRequests,
                    "Account temporarily locked after repeated failures",
                ));
            }
        }
        Ok(())
    }

    fn record_failure(&self, email: &str) -> Result<(), ProviderError> {
        let mut attempts = lock(&self.attempts)?;
        let entry = attempts.entry(email.to_string()).or_default();
        entry.failures += 1;
        if entry.failures >= MAX_FAILED_ATTEMPTS {
            entry.failures = 0;
            entry.locked_until = Some(Utc::now() + Duration::seconds(LOCKOUT_SECONDS));
            tracing::warn!(%email, "Too many failed sign-ins, locking account");
        }
        Ok(())
    }

    fn find(&self, email: &str) -> Result<Option<Account>, ProviderError> {
        Ok(lock(&self.accounts)?
            .iter()
            .find(|a| a.email == email)
            .cloned())
    }
}

#[async_trait]
impl IdentityProvider for AccountDirectory {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Principal, ProviderError> {
        let email = normalize_email(email);
        validate_email(&email)?;
        self.check_lockout(&email)?;

        let account = self.find(&email)?.ok_or_else(user_not_found)?;
        if account.disabled {
            return Err(ProviderError::new(
                ProviderErrorCode::UserDisabled,
                "Account disabled",
            ));
        }

        if !verify_password(password, &account.password_hash).await {
            self.record_failure(&email)?;
            return Err(ProviderError::new(
                ProviderErrorCode::WrongPassword,
                "Password does not match",
            ));
        }

        lock(&self.attempts)?.remove(&email);
        let principal = account.principal();
        self.state.send_replace(Some(principal.clone()));
        tracing::info!(uid = %principal.uid, "Principal signed in");
        Ok(principal)
    }

    async fn sign_out(&self) -> Result<(), ProviderError> {
        self.state.send_replace(None);
        Ok(())
    }

    async fn send_password_reset(&self, email: &str) -> Result<(), ProviderError> {
        let email = normalize_email(email);
        validate_email(&email)?;
        let account = self.find(&email)?.ok_or_else(user_not_found)?;

        // Delivery belongs to the mail relay; the directory only records the request.
        tracing::info!(uid = %account.uid, "Password reset requested");
        Ok(())
    }

    async fn create_account(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Principal, ProviderError> {
        let email = normalize_email(email);
        validate_email(&email)?;
        if password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(ProviderError::new(
                ProviderErrorCode::WeakPassword,
                format!("Password must be at least {} characters", MIN_PASSWORD_LENGTH),
            ));
        }

        let password_hash = hash_password(password).await?;

        let mut accounts = lock(&self.accounts)?;
        if accounts.iter().any(|a| a.email == email) {
            return Err(ProviderError::new(
                ProviderErrorCode::EmailAlreadyInUse,
                "An account with this email already exists",
            ));
        }

        let account = Account {
            uid: uuid::Uuid::new_v4().simple().to_string(),
            admin: self.admin_emails.contains(&email),
            email,
            password_hash,
            display_name: None,
            disabled: false,
            created_at: timestamp_now(),
        };

        let mut next = accounts.clone();
        next.push(account.clone());
        self.persist(&next)?;
        *accounts = next;
        drop(accounts);

        let principal = account.principal();
        self.state.send_replace(Some(principal.clone()));
        tracing::info!(uid = %principal.uid, admin = account.admin, "Account created");
        Ok(principal)
    }

    async fn set_display_name(
        &self,
        principal: &Principal,
        name: &str,
    ) -> Result<(), ProviderError> {
        let mut accounts = lock(&self.accounts)?;
        let mut next = accounts.clone();
        let account = next
            .iter_mut()
            .find(|a| a.uid == principal.uid)
            .ok_or_else(user_not_found)?;
        account.display_name = Some(name.to_string());
        let updated = account.principal();
        self.persist(&next)?;
        *accounts = next;
        drop(accounts);

        self.state.send_if_modified(|current| match current {
            Some(p) if p.uid == updated.uid => {
                *p = updated;
                true
            }
            _ => false,
        });
        Ok(())
    }

    fn observe_auth_state(&self) -> watch::Receiver<Option<Principal>> {
        self.state.subscribe()
    }

    async fn get_claims(&self, principal: &Principal) -> Result<Claims, ProviderError> {
        let accounts = lock(&self.accounts)?;
        let account = accounts
            .iter()
            .find(|a| a.uid == principal.uid)
            .ok_or_else(user_not_found)?;
        Ok(Claims {
            admin: account.admin,
        })
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn validate_email(email: &str) -> Result<(), ProviderError> {
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };

    if valid {
        Ok(())
    } else {
        Err(ProviderError::new(
            ProviderErrorCode::InvalidEmail,
            "Malformed email address",
        ))
    }
}

/// Argon2 is CPU-bound, so hashing and verification run on the blocking pool.
async fn hash_password(password: &str) -> Result<String, ProviderError> {
    let password = password.to_string();
    tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| internal(format!("Password hashing failed: {}", e)))
    })
    .await
    .map_err(|e| internal(format!("Password hashing task failed: {}", e)))?
}

async fn verify_password(password: &str, password_hash: &str) -> bool {
    let password = password.to_string();
    let password_hash = password_hash.to_string();
    let verified = tokio::task::spawn_blocking(move || match PasswordHash::new(&password_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            tracing::error!("Stored password hash is unreadable: {}", e);
            false
        }
    })
    .await;

    verified.unwrap_or_else(|e| {
        tracing::error!("Password verification task failed: {}", e);
        false
    })
}

fn user_not_found() -> ProviderError {
    ProviderError::new(ProviderErrorCode::UserNotFound, "No account for this identity")
}

fn internal(err: impl std::fmt::Display) -> ProviderError {
    ProviderError::new(ProviderErrorCode::Internal, err.to_string())
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, ProviderError> {
    mutex
        .lock()
        .map_err(|_| internal("Account directory lock poisoned"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStorage;

    fn directory() -> AccountDirectory {
        AccountDirectory::open(
            Arc::new(MemoryStorage::new()),
            &["Admin@Club.edu".to_string()],
        )
        .unwrap()
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_password_work_leaves_runtime_responsive() {
        use std::sync::atomic::{AtomicU32, Ordering};

        let dir = directory();
        let ticks = Arc::new(AtomicU32::new(0));
        let ticker = {
            let ticks = ticks.clone();
            tokio::spawn(async move {
                loop {
                    ticks.fetch_add(1, Ordering::SeqCst);
                    tokio::task::yield_now().await;
                }
            })
        };

        dir.create_account("asha@club.edu", "secret1").await.unwrap();
        let after_create = ticks.load(Ordering::SeqCst);
        assert!(after_create > 0);

        dir.sign_in("asha@club.edu", "secret1").await.unwrap();
        assert!(ticks.load(Ordering::SeqCst) > after_create);

        ticker.abort();
    }

    #[tokio::test]
    async fn test_create_account_signs_in() {
        let dir = directory();
        let rx = dir.observe_auth_state();
        assert!(rx.borrow().is_none());

        let principal = dir.create_account("Student@Club.edu", "secret1").await.unwrap();
        assert_eq!(principal.email, "student@club.edu");
        assert_eq!(rx.borrow().as_ref(), Some(&principal));
        assert!(!dir.get_claims(&principal).await.unwrap().admin);
    }

    #[tokio::test]
    async fn test_admin_claim_comes_from_configured_list() {
        let dir = directory();
        let principal = dir.create_account("admin@club.edu", "secret1").await.unwrap();
        assert!(dir.get_claims(&principal).await.unwrap().admin);
    }

    #[tokio::test]
    async fn test_create_account_rejections() {
        let dir = directory();
        let err = dir.create_account("not-an-email", "secret1").await.unwrap_err();
        assert_eq!(err.code, ProviderErrorCode::InvalidEmail);

        let err = dir.create_account("a@club.edu", "123").await.unwrap_err();
        assert_eq!(err.code, ProviderErrorCode::WeakPassword);

        dir.create_account("a@club.edu", "secret1").await.unwrap();
        let err = dir.create_account("A@club.edu", "secret2").await.unwrap_err();
        assert_eq!(err.code, ProviderErrorCode::EmailAlreadyInUse);
    }

    #[tokio::test]
    async fn test_sign_in_failures() {
        let dir = directory();
        dir.create_account("a@club.edu", "secret1").await.unwrap();
        dir.sign_out().await.unwrap();

        let err = dir.sign_in("nobody@club.edu", "secret1").await.unwrap_err();
        assert_eq!(err.code, ProviderErrorCode::UserNotFound);

        let err = dir.sign_in("a@club.edu", "wrong").await.unwrap_err();
        assert_eq!(err.code, ProviderErrorCode::WrongPassword);
        assert!(dir.observe_auth_state().borrow().is_none());

        dir.set_disabled("a@club.edu", true).unwrap();
        let err = dir.sign_in("a@club.edu", "secret1").await.unwrap_err();
        assert_eq!(err.code, ProviderErrorCode::UserDisabled);
    }

    #[tokio::test]
    async fn test_repeated_failures_lock_the_account() {
        let dir = directory();
        dir.create_account("a@club.edu", "secret1").await.unwrap();

        for _ in 0..MAX_FAILED_ATTEMPTS {
            let _ = dir.sign_in("a@club.edu", "wrong").await;
        }
        let err = dir.sign_in("a@club.edu", "secret1").await.unwrap_err();
        assert_eq!(err.code, ProviderErrorCode::TooManyRequests);
    }

    #[tokio::test]
    async fn test_disabling_signed_in_account_signs_out() {
        let dir = directory();
        dir.create_account("a@club.edu", "secret1").await.unwrap();
        assert!(dir.observe_auth_state().borrow().is_some());

        dir.set_disabled("a@club.edu", true).unwrap();
        assert!(dir.observe_auth_state().borrow().is_none());
    }

    #[tokio::test]
    async fn test_display_name_updates_observed_principal() {
        let dir = directory();
        let principal = dir.create_account("a@club.edu", "secret1").await.unwrap();
        dir.set_display_name(&principal, "Asha").await.unwrap();

        let rx = dir.observe_auth_state();
        let current = rx.borrow().clone().unwrap();
        assert_eq!(current.display_name.as_deref(), Some("Asha"));
    }

    #[tokio::test]
    async fn test_accounts_survive_reopen() {
        let storage = Arc::new(MemoryStorage::new());
        {
            let dir = AccountDirectory::open(storage.clone(), &[]).unwrap();
            dir.create_account("a@club.edu", "secret1").await.unwrap();
        }
        let dir = AccountDirectory::open(storage, &[]).unwrap();
        assert!(dir.sign_in("a@club.edu", "secret1").await.is_ok());
    }

    #[tokio::test]
    async fn test_password_reset_requires_known_account() {
        let dir = directory();
        let err = dir.send_password_reset("ghost@club.edu").await.unwrap_err();
        assert_eq!(err.code, ProviderErrorCode::UserNotFound);

        dir.create_account("a@club.edu", "secret1").await.unwrap();
        assert!(dir.send_password_reset("a@club.edu").await.is_ok());
    }
}
