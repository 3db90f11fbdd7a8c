//! Common test utilities for E2E tests

#![allow(dead_code)]

use std::sync::Arc;

use ed25519_dalek::SigningKey;
use fedbox::auth::{StaticKeyResolver, public_key_base58, sign_canonical};
use fedbox::data::{SqliteStorage, Storage};
use fedbox::{AppState, config};
use serde_json::Value;
use tempfile::TempDir;
use tokio::net::TcpListener;

/// Actors known to every test server, with their deterministic keys
pub const ACTORS: [(&str, u8); 3] = [("alice", 1), ("bob", 2), ("carol", 3)];

/// Deterministic signing key of a test actor
pub fn key_of(actor: &str) -> SigningKey {
    let seed = ACTORS
        .iter()
        .find(|(name, _)| *name == actor)
        .map(|(_, seed)| *seed)
        .unwrap_or(99);
    SigningKey::from_bytes(&[seed; 32])
}

/// Test server instance
pub struct TestServer {
    pub addr: String,
    pub state: AppState,
    pub _temp_dir: TempDir,
    pub client: reqwest::Client,
}

impl TestServer {
    /// Create a new test server instance
    pub async fn new() -> Self {
        Self::with_identity("http://127.0.0.1:1/api").await
    }

    /// Create a test server whose identity service lives at `identity_url`
    pub async fn with_identity(identity_url: &str) -> Self {
        Self::build(identity_url, 4).await
    }

    /// Create a test server allowing `limit` concurrent deliveries per peer
    pub async fn with_delivery_limit(limit: usize) -> Self {
        Self::build("http://127.0.0.1:1/api", limit).await
    }

    async fn build(identity_url: &str, per_peer_limit: usize) -> Self {
        // Create temporary directory for test database
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        // Bind first so actor URLs point at this instance
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let config = config::AppConfig {
            server: config::ServerConfig {
                host: "127.0.0.1".to_string(),
                port: addr.port(),
                domain: addr.to_string(),
                protocol: "http".to_string(),
            },
            storage: config::StorageConfig {
                backend: config::StorageBackend::Sqlite,
                path: db_path.clone(),
                scan_limit: 10_000,
                connect_attempts: 1,
                connect_retry_delay_ms: 10,
            },
            identity: config::IdentityConfig {
                url: identity_url.to_string(),
                user: None,
                signing_key: None,
                key_cache_ttl: 300,
            },
            auth: config::AuthConfig::default(),
            federation: config::FederationConfig {
                delivery_timeout_seconds: 5,
                max_concurrent_deliveries_per_peer: per_peer_limit,
            },
            logging: config::LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        };

        let storage: Arc<dyn Storage> = Arc::new(
            SqliteStorage::connect(&db_path, config.storage.scan_limit)
                .await
                .unwrap(),
        );

        let resolver = ACTORS
            .iter()
            .fold(StaticKeyResolver::default(), |resolver, (name, _)| {
                resolver.with_key(*name, public_key_base58(&key_of(name)))
            });

        // Initialize app state
        let state = AppState::with_parts(config, storage, Arc::new(resolver)).unwrap();

        // Create HTTP client
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap();

        let app = fedbox::build_router(state.clone());

        // Spawn server in background
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr: format!("http://{}", addr),
            state,
            _temp_dir: temp_dir,
            client,
        }
    }

    /// Get base URL for API requests
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.addr, path)
    }

    /// URL of a local person
    pub fn person(&self, id: &str) -> String {
        self.url(&format!("/person/{}", id))
    }

    /// POST `body` signed by `signer`
    pub async fn post_signed(&self, path: &str, signer: &SigningKey, body: &Value) -> reqwest::Response {
        let bytes = serde_json::to_vec_pretty(body).unwrap();
        self.client
            .post(self.url(path))
            .header("Content-Type", "application/json")
            .header("zenflows-sign", sign_canonical(signer, &bytes))
            .body(bytes)
            .send()
            .await
            .unwrap()
    }

    /// POST `body` signed by the key of `actor`
    pub async fn post_as(&self, path: &str, actor: &str, body: &Value) -> reqwest::Response {
        self.post_signed(path, &key_of(actor), body).await
    }

    /// POST `body` without a signature header
    pub async fn post_unsigned(&self, path: &str, body: &Value) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .unwrap()
    }
}
