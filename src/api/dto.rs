//! Request and response DTOs
//!
//! Every response carries a boolean `success`; failures are rendered by
//! `AppError` with an additional `error` string.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::data::MailboxEntry;

// =============================================================================
// Mailbox requests
// =============================================================================

/// POST /read
#[derive(Debug, Clone, Deserialize)]
pub struct ReadRequest {
    /// Opaque caller token echoed in the response
    #[serde(default)]
    pub request_id: Option<Value>,
    pub receiver: String,
    #[serde(default, alias = "onlyUnread")]
    pub only_unread: bool,
}

/// POST /set-read
#[derive(Debug, Clone, Deserialize)]
pub struct SetReadRequest {
    pub receiver: String,
    #[serde(alias = "messageId")]
    pub message_id: i64,
    pub read: bool,
}

/// POST /count-unread
#[derive(Debug, Clone, Deserialize)]
pub struct CountUnreadRequest {
    pub receiver: String,
}

/// POST /delete
#[derive(Debug, Clone, Deserialize)]
pub struct DeleteRequest {
    pub receiver: String,
    #[serde(alias = "messageId")]
    pub message_id: i64,
}

// =============================================================================
// Responses
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
}

impl SuccessResponse {
    pub fn ok() -> Self {
        Self { success: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendResponse {
    pub success: bool,
    /// Receiver rows written
    pub count: usize,
    /// Receivers whose row could not be written
    pub failed: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<Value>,
    pub messages: Vec<MailboxEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountResponse {
    pub success: bool,
    pub count: u64,
}

/// Outbox result: URI of the stored Follow or Like
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityIdResponse {
    pub success: bool,
    pub id: String,
}

/// ActivityStreams OrderedCollection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderedCollection {
    pub success: bool,
    #[serde(rename = "@context")]
    pub context: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
    #[serde(rename = "totalItems")]
    pub total_items: usize,
    #[serde(rename = "orderedItems")]
    pub ordered_items: Vec<String>,
}

impl OrderedCollection {
    pub fn new(id: String, items: Vec<String>) -> Self {
        Self {
            success: true,
            context: "https://www.w3.org/ns/activitystreams".to_string(),
            kind: "OrderedCollection".to_string(),
            id,
            total_items: items.len(),
            ordered_items: items,
        }
    }
}

/// Actor document for a person or economic resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActorDocument {
    pub success: bool,
    #[serde(rename = "@context")]
    pub context: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
    pub name: String,
    pub summary: String,
    pub inbox: String,
    pub outbox: String,
    pub liked: String,
    pub followers: String,
    pub following: String,
}
