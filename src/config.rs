//! Configuration management
//!
//! Loads configuration from:
//! 1. Default values
//! 2. Configuration files (config/default.toml, config/local.toml)
//! 3. Environment variables (override)

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub identity: IdentityConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub federation: FederationConfig,
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Port number (e.g., 8080)
    pub port: u16,
    /// Public domain (e.g., "inbox.example.com")
    pub domain: String,
    /// Protocol ("http" or "https")
    pub protocol: String,
}

impl ServerConfig {
    /// Get the base URL for the instance
    ///
    /// # Returns
    /// Full URL like "https://inbox.example.com"
    pub fn base_url(&self) -> String {
        format!("{}://{}", self.protocol, self.domain)
    }
}

/// Backend selector for the Storage Port
#[derive(Debug, Clone, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Sqlite,
    Memory,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    /// Path to SQLite database file (sqlite backend only)
    pub path: PathBuf,
    /// Maximum rows visited by a single scan (unread counts, listings)
    pub scan_limit: usize,
    /// Connection attempts before startup is aborted
    pub connect_attempts: u32,
    /// Fixed delay between connection attempts
    pub connect_retry_delay_ms: u64,
}

impl StorageConfig {
    pub fn connect_retry_delay(&self) -> Duration {
        Duration::from_millis(self.connect_retry_delay_ms)
    }
}

/// Identity service (GraphQL) configuration
#[derive(Debug, Clone, Deserialize)]
pub struct IdentityConfig {
    /// GraphQL endpoint resolving actor IDs to profiles and public keys
    pub url: String,
    /// Value of the user header sent along with signed queries
    pub user: Option<String>,
    /// Base58 Ed25519 seed used to sign identity queries
    pub signing_key: Option<String>,
    /// Public key cache TTL in seconds
    pub key_cache_ttl: u64,
}

/// Request authentication configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Header carrying the detached body signature
    #[serde(default = "default_signature_header")]
    pub signature_header: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            signature_header: default_signature_header(),
        }
    }
}

fn default_signature_header() -> String {
    "zenflows-sign".to_string()
}

/// Outbound federation configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FederationConfig {
    /// Timeout for a single inbox POST
    #[serde(default = "default_delivery_timeout_seconds")]
    pub delivery_timeout_seconds: u64,
    /// Concurrent deliveries allowed towards one peer host
    #[serde(default = "default_max_concurrent_deliveries_per_peer")]
    pub max_concurrent_deliveries_per_peer: usize,
}

impl Default for FederationConfig {
    fn default() -> Self {
        Self {
            delivery_timeout_seconds: default_delivery_timeout_seconds(),
            max_concurrent_deliveries_per_peer: default_max_concurrent_deliveries_per_peer(),
        }
    }
}

impl FederationConfig {
    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_secs(self.delivery_timeout_seconds)
    }
}

fn default_delivery_timeout_seconds() -> u64 {
    10
}

fn default_max_concurrent_deliveries_per_peer() -> usize {
    4
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Log format: "pretty" or "json"
    pub format: String,
}

impl AppConfig {
    /// Load configuration from file and environment
    ///
    /// # Loading Order
    /// 1. Default values
    /// 2. config/default.toml (if exists)
    /// 3. config/local.toml (if exists)
    /// 4. Environment variables (FEDBOX__*)
    ///
    /// # Errors
    /// Returns error if configuration is invalid
    pub fn load() -> Result<Self, crate::error::AppError> {
        use config::{Config, Environment, File};

        let config = Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("server.domain", "localhost:8080")?
            .set_default("server.protocol", "http")?
            .set_default("storage.backend", "sqlite")?
            .set_default("storage.path", "data/fedbox.db")?
            .set_default("storage.scan_limit", 10_000)?
            .set_default("storage.connect_attempts", 5)?
            .set_default("storage.connect_retry_delay_ms", 1000)?
            .set_default("identity.url", "http://localhost:4000/api")?
            .set_default("identity.key_cache_ttl", 300)?
            .set_default("auth.signature_header", default_signature_header())?
            .set_default(
                "federation.delivery_timeout_seconds",
                default_delivery_timeout_seconds(),
            )?
            .set_default(
                "federation.max_concurrent_deliveries_per_peer",
                default_max_concurrent_deliveries_per_peer() as u64,
            )?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(
                Environment::with_prefix("FEDBOX")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;

        let app_config: Self = config
            .try_deserialize()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;
        app_config.validate()?;
        Ok(app_config)
    }

    fn validate(&self) -> Result<(), crate::error::AppError> {
        use crate::error::AppError;

        if !matches!(
            self.server.protocol.to_ascii_lowercase().as_str(),
            "http" | "https"
        ) {
            return Err(AppError::Config(format!(
                "server.protocol must be http or https, got {}",
                self.server.protocol
            )));
        }

        if self.storage.scan_limit == 0 {
            return Err(AppError::Config(
                "storage.scan_limit must be greater than 0".to_string(),
            ));
        }

        if self.storage.connect_attempts == 0 {
            return Err(AppError::Config(
                "storage.connect_attempts must be greater than 0".to_string(),
            ));
        }

        if self.federation.delivery_timeout_seconds == 0 {
            return Err(AppError::Config(
                "federation.delivery_timeout_seconds must be greater than 0".to_string(),
            ));
        }

        if self.federation.max_concurrent_deliveries_per_peer == 0 {
            return Err(AppError::Config(
                "federation.max_concurrent_deliveries_per_peer must be greater than 0".to_string(),
            ));
        }

        if !matches!(
            self.logging.level.to_ascii_lowercase().as_str(),
            "trace" | "debug" | "info" | "warn" | "error"
        ) {
            return Err(AppError::Config(format!(
                "logging.level must be trace, debug, info, warn or error, got {}",
                self.logging.level
            )));
        }

        if !matches!(self.logging.format.as_str(), "pretty" | "json") {
            return Err(AppError::Config(format!(
                "logging.format must be pretty or json, got {}",
                self.logging.format
            )));
        }

        if url::Url::parse(&self.identity.url).is_err() {
            return Err(AppError::Config(format!(
                "identity.url is not a valid URL: {}",
                self.identity.url
            )));
        }

        Ok(())
    }
}
