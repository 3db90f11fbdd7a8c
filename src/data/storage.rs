//! Storage Port
//!
//! The capability set every persistence backend provides. Handlers and
//! services only ever hold an `Arc<dyn Storage>`.
//!
//! Backends must keep (receiver, message) pairs unique, store a Follow
//! for the same (actor, object) pair at most once, and issue numeric ids
//! that grow monotonically and are never reused. Every scan is capped at
//! the backend's configured scan limit; results beyond the cap are not
//! returned and counts saturate at the cap.

use async_trait::async_trait;

use super::models::*;
use crate::error::Result;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Storage: Send + Sync {
    // =========================================================================
    // Mailbox
    // =========================================================================

    /// Persist the message once, then one receiver row per receiver.
    ///
    /// Fan-out is best-effort: a failed receiver insert is reported in
    /// [`SendOutcome::failed`] and earlier writes are kept.
    async fn send(&self, message: &Message) -> Result<SendOutcome>;

    /// Entries for `receiver`, oldest first
    async fn read(&self, receiver: &str, only_unread: bool) -> Result<Vec<MailboxEntry>>;

    /// Set the read flag of one entry. `NotFound` if the entry does not exist.
    async fn set(&self, receiver: &str, message_id: i64, read: bool) -> Result<()>;

    /// Unread entries for `receiver`, saturating at the scan limit
    async fn count_unread(&self, receiver: &str) -> Result<u64>;

    /// Remove one entry. The message itself stays for other receivers.
    async fn delete(&self, receiver: &str, message_id: i64) -> Result<()>;

    // =========================================================================
    // Likes
    // =========================================================================

    /// Record a Like and return its id. Never deduplicated.
    async fn actor_likes(&self, like: &NewLike) -> Result<i64>;

    async fn find_actor_like(&self, id: i64) -> Result<LikedRecord>;

    /// Like ids recorded by `actor`, ascending
    async fn find_actor_likes(&self, actor: &str) -> Result<Vec<i64>>;

    // =========================================================================
    // Follows
    // =========================================================================

    /// Store a pending Follow, or return the existing row for the pair
    async fn store_follower(&self, actor: &str, object: &str) -> Result<StoredFollow>;

    /// Mark a Follow accepted. Accepting twice is not an error.
    async fn accept_follower(&self, id: i64) -> Result<FollowRelationship>;

    async fn find_follow(&self, id: i64) -> Result<FollowRelationship>;

    /// Followers of `actor` when `want_followers`, otherwise the actors it follows
    async fn find_actor_follows(&self, actor: &str, want_followers: bool) -> Result<Vec<String>>;

    // =========================================================================
    // Delivery ledger
    // =========================================================================

    /// Write a pending delivery marker and return its id
    async fn record_delivery(
        &self,
        activity_type: &str,
        target: &str,
        payload: &serde_json::Value,
    ) -> Result<i64>;

    async fn complete_delivery(
        &self,
        id: i64,
        status: DeliveryStatus,
        error: Option<String>,
    ) -> Result<()>;

    async fn find_deliveries(&self, status: DeliveryStatus) -> Result<Vec<DeliveryRecord>>;
}
