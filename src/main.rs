//! Codivix Club Portal Backend
//!
//! Session, entity and activity stores for the club event portal, served as a JSON API over
//! either a SQLite database or a local key-value file.

mod activity;
mod api;
mod auth;
mod config;
mod db;
mod errors;
mod identity;
mod models;
mod preferences;
mod session;
mod store;

use std::sync::Arc;

use axum::{
    http::{header, HeaderValue, Method},
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use config::{Config, StorageBackend};
use db::{
    init_database, DocumentStore, FileStorage, KeyValueStorage, LocalDocumentStore,
    SqliteDocumentStore,
};
use errors::AppError;
use identity::AccountDirectory;
use preferences::Preferences;
use session::SessionStore;
use store::EntityStore;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub session: Arc<SessionStore>,
    pub entities: Arc<EntityStore>,
    pub preferences: Preferences,
}

impl AppState {
    /// Open storage, seed empty collections if configured, and start both stores.
    pub async fn build(config: &Config) -> Result<Self, AppError> {
        let storage: Arc<dyn KeyValueStorage> =
            Arc::new(FileStorage::open(&config.local_storage_path)?);

        let docs: Arc<dyn DocumentStore> = match config.storage {
            StorageBackend::Remote => {
                let pool = init_database(&config.db_path).await?;
                Arc::new(SqliteDocumentStore::open(pool).await?)
            }
            StorageBackend::Local => Arc::new(LocalDocumentStore::open(storage.clone())?),
        };

        let directory = AccountDirectory::open(storage.clone(), &config.admin_emails)
            .map_err(|e| AppError::Storage(format!("Failed to open account directory: {}", e)))?;

        let entities = EntityStore::start(docs.clone());
        if config.seed_data {
            let report = entities.seed_if_empty().await?;
            if !report.is_empty() {
                tracing::info!(
                    events = report.events,
                    coordinators = report.coordinators,
                    announcements = report.announcements,
                    "Inserted sample data"
                );
            }
        }

        let session = SessionStore::start(Arc::new(directory), docs, config.admin_code.clone());

        Ok(Self {
            config: Arc::new(config.clone()),
            session: Arc::new(session),
            entities: Arc::new(entities),
            preferences: Preferences::new(storage),
        })
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize logging
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Codivix Club Portal Backend");
    tracing::info!("Storage backend: {:?}", config.storage);
    tracing::info!("Database path: {:?}", config.db_path);
    tracing::info!("Local storage path: {:?}", config.local_storage_path);
    tracing::info!("Bind address: {}", config.bind_addr);
    tracing::info!("Allowed origins: {:?}", config.allowed_origins);

    if config.admin_code.is_none() {
        tracing::warn!("No admin code configured (CLUB_ADMIN_CODE). Admin login is disabled!");
    }
    if config.admin_emails.is_empty() {
        tracing::warn!("No admin emails configured (CLUB_ADMIN_EMAILS). New accounts are all students.");
    }

    let state = AppState::build(&config).await?;
    tracing::info!("Entity store ready ({} variant)", state.entities.kind());

    // Build router
    let app = create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    // Only the configured frontend may call the API from a browser
    let allowed_origins = Arc::new(state.config.allowed_origins.clone());
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE]);

    // API routes
    let api_routes = Router::new()
        // Session
        .route("/auth/session", get(api::get_session))
        .route("/auth/login", post(api::login))
        .route("/auth/logout", post(api::logout))
        .route("/auth/register", post(api::register))
        .route("/auth/password-reset", post(api::password_reset))
        // Whole store
        .route("/data", get(api::get_all_data))
        .route("/data/revision", get(api::get_revision))
        // Events
        .route("/events", get(api::list_events))
        .route("/events", post(api::create_event))
        .route("/events/{id}", put(api::update_event))
        .route("/events/{id}", delete(api::delete_event))
        .route("/events/{id}/registrations", get(api::list_event_registrations))
        .route("/events/{id}/registrations", post(api::register_for_event))
        // Announcements
        .route("/announcements", get(api::list_announcements))
        .route("/announcements", post(api::create_announcement))
        .route("/announcements/{id}", put(api::update_announcement))
        .route("/announcements/{id}", delete(api::delete_announcement))
        // Coordinators
        .route("/coordinators", get(api::list_coordinators))
        .route("/coordinators", post(api::create_coordinator))
        .route("/coordinators/{id}", put(api::update_coordinator))
        .route("/coordinators/{id}", delete(api::delete_coordinator))
        // Certificates
        .route("/certificates", get(api::list_certificates))
        .route("/certificates", post(api::issue_certificate))
        // Signed-in user
        .route("/me/registrations", get(api::my_registrations))
        .route("/me/certificates", get(api::my_certificates))
        .route("/me/profile", put(api::update_profile))
        // Admin dashboard
        .route("/activity", get(api::list_activity))
        .route("/analytics", get(api::get_analytics))
        // Preferences
        .route("/preferences/dark-mode", get(api::get_dark_mode))
        .route("/preferences/dark-mode", put(api::set_dark_mode));

    // Health check
    let health_routes = Router::new().route("/health", get(health_check));

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        // Refuse requests from foreign origins
        .layer(middleware::from_fn(move |req, next| {
            auth::origin_guard_layer(allowed_origins.clone(), req, next)
        }))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}
