//! Configuration module for the club backend.
//!
//! All configuration is loaded from environment variables with sensible defaults.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::errors::AppError;

/// Dev server of the portal's single-page frontend.
pub const DEFAULT_ALLOWED_ORIGIN: &str = "http://localhost:5173";

/// Which document store variant backs the entity store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    /// SQLite database with live snapshot pushes
    Remote,
    /// JSON collections in the local storage file
    Local,
}

impl std::str::FromStr for StorageBackend {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "remote" | "sqlite" => Ok(StorageBackend::Remote),
            "local" => Ok(StorageBackend::Local),
            other => Err(AppError::Configuration(format!(
                "Invalid CLUB_STORAGE '{}', expected 'remote' or 'local'",
                other
            ))),
        }
    }
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub storage: StorageBackend,
    /// Path to SQLite database file
    pub db_path: PathBuf,
    /// Key-value file holding accounts, preferences and, for the local variant, collections
    pub local_storage_path: PathBuf,
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Second factor for admin logins; admin login is disabled when unset
    pub admin_code: Option<String>,
    /// Accounts created with these emails get the admin claim
    pub admin_emails: Vec<String>,
    /// Insert sample rows into empty collections at startup
    pub seed_data: bool,
    /// Browser origins allowed to call the API; requests carrying any other `Origin` are refused
    pub allowed_origins: Vec<String>,
}

impl Config {
    /// Load configuration from environment variables, after reading `.env` if present.
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let storage = match lookup("CLUB_STORAGE") {
            Some(value) => value.parse()?,
            None => StorageBackend::Remote,
        };

        let db_path = lookup("CLUB_DB_PATH")
            .unwrap_or_else(|| "./data/club.sqlite".to_string())
            .into();

        let local_storage_path = lookup("CLUB_LOCAL_STORAGE_PATH")
            .unwrap_or_else(|| "./data/local-storage.json".to_string())
            .into();

        let bind_addr = lookup("CLUB_BIND_ADDR")
            .unwrap_or_else(|| "127.0.0.1:8080".to_string());
        let bind_addr = bind_addr.parse().map_err(|_| {
            AppError::Configuration(format!("Invalid CLUB_BIND_ADDR '{}'", bind_addr))
        })?;

        let log_level = lookup("CLUB_LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        let admin_code = lookup("CLUB_ADMIN_CODE")
            .map(|code| code.trim().to_string())
            .filter(|code| !code.is_empty());

        let admin_emails = lookup("CLUB_ADMIN_EMAILS")
            .map(|list| {
                list.split(',')
                    .map(|email| email.trim().to_lowercase())
                    .filter(|email| !email.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let seed_data = match lookup("CLUB_SEED_DATA") {
            Some(value) => parse_bool("CLUB_SEED_DATA", &value)?,
            None => true,
        };

        let allowed_origins: Vec<String> = lookup("CLUB_ALLOWED_ORIGINS")
            .unwrap_or_else(|| DEFAULT_ALLOWED_ORIGIN.to_string())
            .split(',')
            .map(|origin| origin.trim().trim_end_matches('/').to_string())
            .filter(|origin| !origin.is_empty())
            .collect();
        if let Some(bad) = allowed_origins
            .iter()
            .find(|origin| origin.as_str() == "*" || axum::http::HeaderValue::from_str(origin).is_err())
        {
            return Err(AppError::Configuration(format!(
                "Invalid origin '{}' in CLUB_ALLOWED_ORIGINS",
                bad
            )));
        }

        Ok(Self {
            storage,
            db_path,
            local_storage_path,
            bind_addr,
            log_level,
            admin_code,
            admin_emails,
            seed_data,
            allowed_origins,
        })
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, AppError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(AppError::Configuration(format!(
            "Invalid {} '{}', expected true or false",
            key, other
        ))),
    }
}
