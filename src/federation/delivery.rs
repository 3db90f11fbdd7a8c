//! Activity delivery
//!
//! Sends activities to peer inboxes. Every attempt is recorded in the
//! delivery ledger first (`pending`) and then settled as `delivered` or
//! `failed`. Local follow/like state is never rolled back on failure.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use super::ActivityKind;
use crate::data::{DeliveryStatus, Storage};
use crate::error::AppError;
use crate::metrics::{ACTIVITIES_DELIVERED, DELIVERY_DURATION_SECONDS};

/// Inbox endpoint of a peer actor
pub fn peer_inbox(actor_url: &str) -> String {
    format!("{}/inbox", actor_url.trim_end_matches('/'))
}

/// Peer limiters kept before idle ones are evicted
const DEFAULT_MAX_TRACKED_PEERS: usize = 1_024;

/// Key used to group deliveries per peer host
fn peer_key(inbox_uri: &str) -> String {
    match url::Url::parse(inbox_uri) {
        Ok(url) => match (url.host_str(), url.port_or_known_default()) {
            (Some(host), Some(port)) => format!("{}:{}", host.to_ascii_lowercase(), port),
            (Some(host), None) => host.to_ascii_lowercase(),
            _ => inbox_uri.to_string(),
        },
        Err(_) => inbox_uri.to_string(),
    }
}

/// Activity delivery service
pub struct ActivityDelivery {
    http_client: Arc<reqwest::Client>,
    storage: Arc<dyn Storage>,
    timeout: Duration,
    per_peer_limit: usize,
    max_tracked_peers: usize,
    /// Peer key of this instance; never limited
    local_peer: Option<String>,
    peers: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl ActivityDelivery {
    /// Create new delivery service
    ///
    /// # Arguments
    /// * `timeout` - Upper bound for a single inbox POST
    /// * `per_peer_limit` - Concurrent POSTs allowed towards one peer host
    pub fn new(
        http_client: Arc<reqwest::Client>,
        storage: Arc<dyn Storage>,
        timeout: Duration,
        per_peer_limit: usize,
    ) -> Self {
        Self {
            http_client,
            storage,
            timeout,
            per_peer_limit: per_peer_limit.max(1),
            max_tracked_peers: DEFAULT_MAX_TRACKED_PEERS,
            local_peer: None,
            peers: Mutex::new(HashMap::new()),
        }
    }

    /// Exempt this instance's own host from the per-peer limit.
    ///
    /// A local Follow is answered by an Accept sent back to the same host
    /// while the Follow POST is still in flight.
    pub fn with_local_base_url(mut self, base_url: &str) -> Self {
        self.local_peer = Some(peer_key(base_url));
        self
    }

    /// Cap on tracked peer limiters
    pub fn with_max_tracked_peers(mut self, max_tracked_peers: usize) -> Self {
        self.max_tracked_peers = max_tracked_peers.max(1);
        self
    }

    /// Limiter for the host of `inbox_uri`; `None` for this instance
    fn semaphore_for(&self, inbox_uri: &str) -> Result<Option<Arc<Semaphore>>, AppError> {
        let key = peer_key(inbox_uri);
        if self.local_peer.as_deref() == Some(key.as_str()) {
            return Ok(None);
        }

        let mut peers = self
            .peers
            .lock()
            .map_err(|_| AppError::Internal(anyhow::anyhow!("peer semaphore table poisoned")))?;

        if !peers.contains_key(&key) && peers.len() >= self.max_tracked_peers {
            Self::evict_idle_locked(&mut peers);
        }

        Ok(Some(
            peers
                .entry(key)
                .or_insert_with(|| Arc::new(Semaphore::new(self.per_peer_limit)))
                .clone(),
        ))
    }

    /// Drop limiters no delivery currently holds
    fn evict_idle_locked(peers: &mut HashMap<String, Arc<Semaphore>>) -> usize {
        let before = peers.len();
        peers.retain(|_, semaphore| Arc::strong_count(semaphore) > 1);
        let evicted = before - peers.len();
        if evicted > 0 {
            tracing::debug!(evicted, remaining = peers.len(), "Evicted idle peer limiters");
        }
        evicted
    }

    async fn acquire(&self, inbox_uri: &str) -> Result<Option<OwnedSemaphorePermit>, AppError> {
        match self.semaphore_for(inbox_uri)? {
            Some(semaphore) => semaphore
                .acquire_owned()
                .await
                .map(Some)
                .map_err(|e| AppError::Internal(e.into())),
            None => Ok(None),
        }
    }

    /// Deliver `activity` to the inbox of `target_actor`.
    ///
    /// # Errors
    /// `AppError::Delivery` when the peer is unreachable, times out or
    /// answers with a non-2xx status. The ledger row is marked `failed`.
    pub async fn deliver(
        &self,
        kind: ActivityKind,
        target_actor: &str,
        activity: &Value,
    ) -> Result<(), AppError> {
        let inbox_uri = peer_inbox(target_actor);

        let ledger_id = self
            .storage
            .record_delivery(kind.as_str(), &inbox_uri, activity)
            .await?;

        let start = Instant::now();
        let result = self.deliver_to_inbox(&inbox_uri, activity).await;
        DELIVERY_DURATION_SECONDS
            .with_label_values(&[kind.as_str()])
            .observe(start.elapsed().as_secs_f64());

        let (status, error) = match &result {
            Ok(()) => (DeliveryStatus::Delivered, None),
            Err(e) => (DeliveryStatus::Failed, Some(e.to_string())),
        };

        ACTIVITIES_DELIVERED
            .with_label_values(&[kind.as_str(), status.as_str()])
            .inc();

        if let Err(e) = self
            .storage
            .complete_delivery(ledger_id, status, error)
            .await
        {
            tracing::error!(
                ledger_id,
                target = %inbox_uri,
                error = %e,
                "Failed to settle delivery ledger entry"
            );
        }

        result
    }

    /// POST an activity to a single inbox
    ///
    /// # Errors
    /// Returns error if delivery fails (network, timeout, rejection)
    pub async fn deliver_to_inbox(&self, inbox_uri: &str, activity: &Value) -> Result<(), AppError> {
        let body = serde_json::to_vec(activity)?;

        let _permit = self.acquire(inbox_uri).await?;

        let response = self
            .http_client
            .post(inbox_uri)
            .header("Content-Type", "application/activity+json")
            .timeout(self.timeout)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(target = %inbox_uri, error = %e, "Delivery failed");
                if e.is_timeout() {
                    AppError::Delivery(format!("Timed out delivering to {}", inbox_uri))
                } else {
                    AppError::Delivery(format!("Failed to deliver to {}: {}", inbox_uri, e))
                }
            })?;

        if !response.status().is_success() {
            tracing::warn!(target = %inbox_uri, status = %response.status(), "Inbox rejected activity");
            return Err(AppError::Delivery(format!(
                "Inbox {} rejected activity: HTTP {}",
                inbox_uri,
                response.status()
            )));
        }

        tracing::info!(target = %inbox_uri, "Successfully delivered activity");
        Ok(())
    }
}

/// Activity builders
pub mod builder {
    use serde_json::Value;

    const CONTEXT: &str = "https://www.w3.org/ns/activitystreams";

    /// Build a Follow activity
    ///
    /// # Arguments
    /// * `id` - Activity ID (unique URI)
    /// * `actor` - Actor URI (follower)
    /// * `object` - Object URI (followee)
    pub fn follow(id: &str, actor: &str, object: &str) -> Value {
        serde_json::json!({
            "@context": CONTEXT,
            "type": "Follow",
            "id": id,
            "actor": actor,
            "object": object,
            "published": chrono::Utc::now().to_rfc3339()
        })
    }

    /// Build an Accept activity
    ///
    /// # Arguments
    /// * `id` - Activity ID (unique URI)
    /// * `actor` - Actor URI (accepter)
    /// * `object` - The Follow being accepted
    pub fn accept(id: &str, actor: &str, object: Value) -> Value {
        serde_json::json!({
            "@context": CONTEXT,
            "type": "Accept",
            "id": id,
            "actor": actor,
            "object": object
        })
    }

    /// Build a Like activity
    pub fn like(id: &str, actor: &str, object: &str, summary: Option<&str>) -> Value {
        let mut like = serde_json::json!({
            "@context": CONTEXT,
            "type": "Like",
            "id": id,
            "actor": actor,
            "object": object
        });
        if let Some(summary) = summary {
            like["summary"] = Value::String(summary.to_string());
        }
        like
    }
}
