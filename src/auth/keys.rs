//! Public key resolution
//!
//! The gate never knows where keys come from; it asks a [`KeyResolver`].
//! Resolved keys are base58 strings of the raw 32 Ed25519 bytes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::AuthError;

/// Maps an actor ID to its base58 public key
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KeyResolver: Send + Sync {
    async fn resolve(&self, actor_id: &str) -> Result<String, AuthError>;
}

/// Fixed actor -> key table
#[derive(Debug, Clone, Default)]
pub struct StaticKeyResolver {
    keys: HashMap<String, String>,
}

impl StaticKeyResolver {
    pub fn with_key(mut self, actor_id: impl Into<String>, public_key: impl Into<String>) -> Self {
        self.keys.insert(actor_id.into(), public_key.into());
        self
    }
}

#[async_trait]
impl KeyResolver for StaticKeyResolver {
    async fn resolve(&self, actor_id: &str) -> Result<String, AuthError> {
        self.keys
            .get(actor_id)
            .cloned()
            .ok_or_else(|| AuthError::KeyLookupFailed(format!("no key known for {}", actor_id)))
    }
}

/// Cached key entry
#[derive(Debug, Clone)]
struct CachedKey {
    key: String,
    cached_at: Instant,
}

/// TTL cache in front of another resolver.
///
/// Only successful lookups are cached.
pub struct CachedKeyResolver {
    inner: Arc<dyn KeyResolver>,
    cache: RwLock<HashMap<String, CachedKey>>,
    ttl: Duration,
}

impl CachedKeyResolver {
    pub fn new(inner: Arc<dyn KeyResolver>, ttl: Duration) -> Self {
        Self {
            inner,
            cache: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Invalidate a cached key
    pub async fn invalidate(&self, actor_id: &str) {
        self.cache.write().await.remove(actor_id);
        tracing::debug!(actor = %actor_id, "Invalidated cached public key");
    }
}

#[async_trait]
impl KeyResolver for CachedKeyResolver {
    async fn resolve(&self, actor_id: &str) -> Result<String, AuthError> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.get(actor_id) {
                if cached.cached_at.elapsed() < self.ttl {
                    tracing::debug!(actor = %actor_id, "Public key cache hit");
                    return Ok(cached.key.clone());
                }
                tracing::debug!(actor = %actor_id, "Public key cache expired");
            }
        }

        let key = self.inner.resolve(actor_id).await?;

        self.cache.write().await.insert(
            actor_id.to_string(),
            CachedKey {
                key: key.clone(),
                cached_at: Instant::now(),
            },
        );

        Ok(key)
    }
}
