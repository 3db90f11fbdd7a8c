//! Data models
//!
//! Rust structs representing persisted entities.
//! All numeric ids are issued by the storage backend.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::AppError;

// =============================================================================
// Messages
// =============================================================================

/// A private message as submitted by its sender
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub sender: String,
    pub receivers: Vec<String>,
    pub content: Map<String, Value>,
}

impl Message {
    /// Reject messages that must never reach storage
    pub fn validate(&self) -> Result<(), AppError> {
        if self.receivers.is_empty() {
            return Err(AppError::Validation(
                "A message needs at least one receiver".to_string(),
            ));
        }
        if self.content.is_empty() {
            return Err(AppError::Validation(
                "A message needs non-empty content".to_string(),
            ));
        }
        Ok(())
    }

    /// Collapse duplicate receivers, keeping the first occurrence
    pub fn dedup_receivers(&mut self) {
        let mut seen = std::collections::HashSet::new();
        self.receivers.retain(|receiver| seen.insert(receiver.clone()));
    }
}

/// Result of a best-effort fan-out
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendOutcome {
    pub message_id: i64,
    /// Receiver rows written
    pub delivered: usize,
    /// Receivers whose row could not be written
    pub failed: Vec<String>,
}

/// One receiver's view of a message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MailboxEntry {
    pub id: i64,
    pub sender: String,
    pub content: Value,
    pub read: bool,
}

// =============================================================================
// Likes
// =============================================================================

/// A Like about to be recorded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLike {
    pub actor: String,
    pub object: String,
    pub summary: Option<String>,
}

/// An append-only Like record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct LikedRecord {
    pub id: i64,
    pub actor: String,
    pub object: String,
    pub summary: Option<String>,
}

// =============================================================================
// Follows
// =============================================================================

/// Follow relationship between a follower (`actor`) and followee (`object`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct FollowRelationship {
    pub id: i64,
    pub actor: String,
    pub object: String,
    pub accepted: bool,
}

/// Result of storing a Follow
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFollow {
    pub follow: FollowRelationship,
    /// False when the pair already existed
    pub created: bool,
}

// =============================================================================
// Delivery ledger
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Pending,
    Delivered,
    Failed,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(DeliveryStatus::Pending),
            "delivered" => Some(DeliveryStatus::Delivered),
            "failed" => Some(DeliveryStatus::Failed),
            _ => None,
        }
    }
}

/// One outbound POST attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub id: i64,
    pub activity_type: String,
    pub target: String,
    pub payload: Value,
    pub status: DeliveryStatus,
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn message(receivers: &[&str], content: Value) -> Message {
        Message {
            sender: "alice".to_string(),
            receivers: receivers.iter().map(|r| r.to_string()).collect(),
            content: content.as_object().cloned().unwrap_or_default(),
        }
    }

    #[test]
    fn validate_rejects_empty_receivers_and_content() {
        assert!(matches!(
            message(&[], json!({"text": "hi"})).validate(),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            message(&["bob"], json!({})).validate(),
            Err(AppError::Validation(_))
        ));
        assert!(message(&["bob"], json!({"text": "hi"})).validate().is_ok());
    }

    #[test]
    fn dedup_keeps_first_occurrence_order() {
        let mut msg = message(&["carol", "bob", "carol", "dave", "bob"], json!({"t": 1}));
        msg.dedup_receivers();
        assert_eq!(msg.receivers, vec!["carol", "bob", "dave"]);
    }

    #[test]
    fn delivery_status_parses_its_own_labels() {
        for status in [
            DeliveryStatus::Pending,
            DeliveryStatus::Delivered,
            DeliveryStatus::Failed,
        ] {
            assert_eq!(DeliveryStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(DeliveryStatus::parse("queued"), None);
    }
}
