//! In-process storage backend
//!
//! Tuple store with the same indices as the relational schema:
//! `receivers` keyed by (receiver, message), `liked` with an `actors`
//! secondary index and `follow` with `following`/`follower` indices.
//! Contents are lost on restart.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use super::models::*;
use super::storage::Storage;
use crate::error::AppError;

#[derive(Debug)]
struct StoredMessage {
    sender: String,
    content: Value,
}

#[derive(Debug, Default)]
struct Tables {
    last_message_id: i64,
    last_like_id: i64,
    last_follow_id: i64,
    last_delivery_id: i64,

    messages: BTreeMap<i64, StoredMessage>,
    /// (receiver, message) -> read
    receivers: BTreeMap<(String, i64), bool>,

    liked: BTreeMap<i64, LikedRecord>,
    /// actor -> like ids
    actors: HashMap<String, BTreeSet<i64>>,

    follow: BTreeMap<i64, FollowRelationship>,
    /// (actor, object) -> follow id
    follow_pairs: HashMap<(String, String), i64>,
    /// actor -> ids of follows it issued
    following: HashMap<String, BTreeSet<i64>>,
    /// object -> ids of follows targeting it
    follower: HashMap<String, BTreeSet<i64>>,

    deliveries: BTreeMap<i64, DeliveryRecord>,
}

/// Memory-backed Storage Port
pub struct MemoryStorage {
    tables: RwLock<Tables>,
    scan_limit: usize,
}

impl MemoryStorage {
    pub fn new(scan_limit: usize) -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            scan_limit,
        }
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn send(&self, message: &Message) -> Result<SendOutcome, AppError> {
        let mut tables = self.tables.write().await;

        tables.last_message_id += 1;
        let message_id = tables.last_message_id;
        tables.messages.insert(
            message_id,
            StoredMessage {
                sender: message.sender.clone(),
                content: Value::Object(message.content.clone()),
            },
        );

        let mut delivered = 0;
        let mut failed = Vec::new();
        for receiver in &message.receivers {
            let key = (receiver.clone(), message_id);
            if tables.receivers.contains_key(&key) {
                failed.push(receiver.clone());
                continue;
            }
            tables.receivers.insert(key, false);
            delivered += 1;
        }

        Ok(SendOutcome {
            message_id,
            delivered,
            failed,
        })
    }

    async fn read(&self, receiver: &str, only_unread: bool) -> Result<Vec<MailboxEntry>, AppError> {
        let tables = self.tables.read().await;

        let lower = (receiver.to_string(), i64::MIN);
        let upper = (receiver.to_string(), i64::MAX);

        let entries = tables
            .receivers
            .range(lower..=upper)
            .filter(|(_, read)| !only_unread || !**read)
            .take(self.scan_limit)
            .filter_map(|((_, message_id), read)| {
                tables.messages.get(message_id).map(|message| MailboxEntry {
                    id: *message_id,
                    sender: message.sender.clone(),
                    content: message.content.clone(),
                    read: *read,
                })
            })
            .collect();

        Ok(entries)
    }

    async fn set(&self, receiver: &str, message_id: i64, read: bool) -> Result<(), AppError> {
        let mut tables = self.tables.write().await;
        let entry = tables
            .receivers
            .get_mut(&(receiver.to_string(), message_id))
            .ok_or(AppError::NotFound)?;
        *entry = read;
        Ok(())
    }

    async fn count_unread(&self, receiver: &str) -> Result<u64, AppError> {
        let tables = self.tables.read().await;

        let lower = (receiver.to_string(), i64::MIN);
        let upper = (receiver.to_string(), i64::MAX);

        let count = tables
            .receivers
            .range(lower..=upper)
            .filter(|(_, read)| !**read)
            .take(self.scan_limit)
            .count();

        Ok(count as u64)
    }

    async fn delete(&self, receiver: &str, message_id: i64) -> Result<(), AppError> {
        let mut tables = self.tables.write().await;
        tables
            .receivers
            .remove(&(receiver.to_string(), message_id))
            .map(|_| ())
            .ok_or(AppError::NotFound)
    }

    async fn actor_likes(&self, like: &NewLike) -> Result<i64, AppError> {
        let mut tables = self.tables.write().await;

        tables.last_like_id += 1;
        let id = tables.last_like_id;
        tables.liked.insert(
            id,
            LikedRecord {
                id,
                actor: like.actor.clone(),
                object: like.object.clone(),
                summary: like.summary.clone(),
            },
        );
        tables
            .actors
            .entry(like.actor.clone())
            .or_default()
            .insert(id);

        Ok(id)
    }

    async fn find_actor_like(&self, id: i64) -> Result<LikedRecord, AppError> {
        let tables = self.tables.read().await;
        tables.liked.get(&id).cloned().ok_or(AppError::NotFound)
    }

    async fn find_actor_likes(&self, actor: &str) -> Result<Vec<i64>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables
            .actors
            .get(actor)
            .map(|ids| ids.iter().copied().take(self.scan_limit).collect())
            .unwrap_or_default())
    }

    async fn store_follower(&self, actor: &str, object: &str) -> Result<StoredFollow, AppError> {
        let mut tables = self.tables.write().await;

        let pair = (actor.to_string(), object.to_string());
        if let Some(id) = tables.follow_pairs.get(&pair) {
            let follow = tables
                .follow
                .get(id)
                .cloned()
                .ok_or_else(|| AppError::Storage(format!("follow index points at missing row {}", id)))?;
            return Ok(StoredFollow {
                follow,
                created: false,
            });
        }

        tables.last_follow_id += 1;
        let id = tables.last_follow_id;
        let follow = FollowRelationship {
            id,
            actor: actor.to_string(),
            object: object.to_string(),
            accepted: false,
        };

        tables.follow.insert(id, follow.clone());
        tables.follow_pairs.insert(pair, id);
        tables
            .following
            .entry(actor.to_string())
            .or_default()
            .insert(id);
        tables
            .follower
            .entry(object.to_string())
            .or_default()
            .insert(id);

        Ok(StoredFollow {
            follow,
            created: true,
        })
    }

    async fn accept_follower(&self, id: i64) -> Result<FollowRelationship, AppError> {
        let mut tables = self.tables.write().await;
        let follow = tables.follow.get_mut(&id).ok_or(AppError::NotFound)?;
        follow.accepted = true;
        Ok(follow.clone())
    }

    async fn find_follow(&self, id: i64) -> Result<FollowRelationship, AppError> {
        let tables = self.tables.read().await;
        tables.follow.get(&id).cloned().ok_or(AppError::NotFound)
    }

    async fn find_actor_follows(
        &self,
        actor: &str,
        want_followers: bool,
    ) -> Result<Vec<String>, AppError> {
        let tables = self.tables.read().await;

        let index = if want_followers {
            &tables.follower
        } else {
            &tables.following
        };

        let Some(ids) = index.get(actor) else {
            return Ok(Vec::new());
        };

        Ok(ids
            .iter()
            .take(self.scan_limit)
            .filter_map(|id| tables.follow.get(id))
            .map(|follow| {
                if want_followers {
                    follow.actor.clone()
                } else {
                    follow.object.clone()
                }
            })
            .collect())
    }

    async fn record_delivery(
        &self,
        activity_type: &str,
        target: &str,
        payload: &Value,
    ) -> Result<i64, AppError> {
        let mut tables = self.tables.write().await;

        tables.last_delivery_id += 1;
        let id = tables.last_delivery_id;
        tables.deliveries.insert(
            id,
            DeliveryRecord {
                id,
                activity_type: activity_type.to_string(),
                target: target.to_string(),
                payload: payload.clone(),
                status: DeliveryStatus::Pending,
                error: None,
            },
        );

        Ok(id)
    }

    async fn complete_delivery(
        &self,
        id: i64,
        status: DeliveryStatus,
        error: Option<String>,
    ) -> Result<(), AppError> {
        let mut tables = self.tables.write().await;
        let record = tables.deliveries.get_mut(&id).ok_or(AppError::NotFound)?;
        record.status = status;
        record.error = error;
        Ok(())
    }

    async fn find_deliveries(&self, status: DeliveryStatus) -> Result<Vec<DeliveryRecord>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables
            .deliveries
            .values()
            .filter(|record| record.status == status)
            .take(self.scan_limit)
            .cloned()
            .collect())
    }
}
