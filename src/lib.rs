//! fedbox - a federated actor mailbox
//!
//! Actors exchange private messages and public Follow/Accept/Like
//! activities across independently hosted instances.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      API Layer (Axum)                        │
//! │  - Mailbox endpoints (/send, /read, ...)                     │
//! │  - ActivityPub endpoints (inbox, outbox, collections)        │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │        AuthGate  ·  Mailbox service  ·  Activity processor   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Storage Port (SQLite / memory)              │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - `api`: HTTP handlers
//! - `auth`: detached signature verification
//! - `service`: mailbox operations
//! - `federation`: activity state machine, delivery, identity lookups
//! - `data`: Storage Port and its backends
//! - `config`: Configuration management
//! - `error`: Error types

pub mod api;
pub mod auth;
pub mod config;
pub mod data;
pub mod error;
pub mod federation;
pub mod metrics;
pub mod service;

use std::sync::Arc;
use std::time::Duration;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<config::AppConfig>,

    /// Storage Port backend
    pub storage: Arc<dyn data::Storage>,

    /// Identity claim verification
    pub auth: auth::AuthGate,

    pub mailbox: Arc<service::MailboxService>,

    pub activities: Arc<federation::ActivityProcessor>,

    /// Profile lookups
    pub identity: Arc<federation::IdentityClient>,

    /// HTTP client for federation and identity calls
    pub http_client: Arc<reqwest::Client>,
}

impl AppState {
    /// Initialize application state
    ///
    /// # Steps
    /// 1. Connect to the storage backend (bounded retry)
    /// 2. Build the identity client and cached key resolver
    /// 3. Wire services
    ///
    /// # Errors
    /// Returns error if any initialization step fails
    pub async fn new(config: config::AppConfig) -> Result<Self, error::AppError> {
        tracing::info!("Initializing application state...");

        let storage = Self::connect_storage(&config.storage).await?;
        tracing::info!(backend = ?config.storage.backend, "Storage connected");

        let http_client = Arc::new(Self::build_http_client()?);
        let identity = Arc::new(Self::build_identity_client(&config, http_client.clone())?);
        let resolver: Arc<dyn auth::KeyResolver> = Arc::new(auth::CachedKeyResolver::new(
            identity.clone(),
            Duration::from_secs(config.identity.key_cache_ttl),
        ));

        let state = Self::assemble(config, storage, resolver, identity, http_client);
        tracing::info!("Application state initialized successfully");
        Ok(state)
    }

    /// Build state around an existing backend and key resolver
    pub fn with_parts(
        config: config::AppConfig,
        storage: Arc<dyn data::Storage>,
        resolver: Arc<dyn auth::KeyResolver>,
    ) -> Result<Self, error::AppError> {
        let http_client = Arc::new(Self::build_http_client()?);
        let identity = Arc::new(Self::build_identity_client(&config, http_client.clone())?);
        Ok(Self::assemble(config, storage, resolver, identity, http_client))
    }

    fn assemble(
        config: config::AppConfig,
        storage: Arc<dyn data::Storage>,
        resolver: Arc<dyn auth::KeyResolver>,
        identity: Arc<federation::IdentityClient>,
        http_client: Arc<reqwest::Client>,
    ) -> Self {
        let auth = auth::AuthGate::new(resolver, config.auth.signature_header.clone());
        let mailbox = Arc::new(service::MailboxService::new(storage.clone()));

        let delivery = Arc::new(
            federation::ActivityDelivery::new(
                http_client.clone(),
                storage.clone(),
                config.federation.delivery_timeout(),
                config.federation.max_concurrent_deliveries_per_peer,
            )
            .with_local_base_url(&config.server.base_url()),
        );
        let activities = Arc::new(federation::ActivityProcessor::new(
            storage.clone(),
            delivery,
            config.server.base_url(),
        ));

        Self {
            config: Arc::new(config),
            storage,
            auth,
            mailbox,
            activities,
            identity,
            http_client,
        }
    }

    async fn connect_storage(
        storage: &config::StorageConfig,
    ) -> Result<Arc<dyn data::Storage>, error::AppError> {
        match storage.backend {
            config::StorageBackend::Memory => {
                tracing::warn!("Using in-memory storage; data is lost on restart");
                Ok(Arc::new(data::MemoryStorage::new(storage.scan_limit)))
            }
            config::StorageBackend::Sqlite => {
                let db = data::connect_with_retry(
                    storage.connect_attempts,
                    storage.connect_retry_delay(),
                    || data::SqliteStorage::connect(&storage.path, storage.scan_limit),
                )
                .await?;
                Ok(Arc::new(db))
            }
        }
    }

    fn build_http_client() -> Result<reqwest::Client, error::AppError> {
        reqwest::Client::builder()
            .user_agent(concat!("fedbox/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| error::AppError::Internal(e.into()))
    }

    fn build_identity_client(
        config: &config::AppConfig,
        http_client: Arc<reqwest::Client>,
    ) -> Result<federation::IdentityClient, error::AppError> {
        let signing_key = config
            .identity
            .signing_key
            .as_deref()
            .map(auth::signing_key_from_base58)
            .transpose()
            .map_err(|e| error::AppError::Config(format!("identity.signing_key: {}", e)))?;

        Ok(federation::IdentityClient::new(
            http_client,
            config.identity.url.clone(),
            config.auth.signature_header.clone(),
        )
        .with_user(config.identity.user.clone())
        .with_signing_key(signing_key))
    }
}

/// Build the Axum router with all routes.
///
/// This is shared by the binary and integration tests to keep route
/// composition consistent across environments.
pub fn build_router(state: AppState) -> axum::Router {
    use axum::{Router, extract::DefaultBodyLimit, middleware};
    use tower_http::trace::TraceLayer;

    const MAX_BODY_BYTES: usize = 1024 * 1024;

    let cors_layer = build_cors_layer(&state.config.auth);

    Router::new()
        .route("/health", axum::routing::get(health_check))
        .merge(api::mailbox_router())
        .merge(api::activitypub_router())
        .route_layer(middleware::from_fn(api::metrics::track_requests))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
        .with_state(state)
        .merge(api::metrics_router())
}

/// Any origin may call the API; the signature header is exposed to scripts
fn build_cors_layer(auth: &config::AuthConfig) -> tower_http::cors::CorsLayer {
    use axum::http::HeaderName;
    use tower_http::cors::{Any, CorsLayer};

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    match HeaderName::from_bytes(auth.signature_header.as_bytes()) {
        Ok(header) => cors.expose_headers([header]),
        Err(error) => {
            tracing::error!(
                %error,
                header = %auth.signature_header,
                "Invalid signature header name; not exposing it to browsers"
            );
            cors
        }
    }
}

async fn health_check() -> &'static str {
    "OK"
}
