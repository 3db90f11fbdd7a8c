//! SQLite storage backend
//!
//! Implements the Storage Port on top of a sqlx connection pool.
//! Schema lives in `migrations/`.

use std::path::Path;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::{Pool, Row, Sqlite, SqlitePool};

use super::models::*;
use super::storage::Storage;
use crate::error::AppError;

/// SQLite-backed Storage Port
pub struct SqliteStorage {
    pool: Pool<Sqlite>,
    scan_limit: i64,
}

impl SqliteStorage {
    /// Connect to SQLite database
    ///
    /// Creates the database file and its parent directory if needed,
    /// then runs migrations.
    ///
    /// # Errors
    /// Returns error if connection or migration fails
    pub async fn connect(path: &Path, scan_limit: usize) -> Result<Self, AppError> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| AppError::Database(sqlx::Error::Io(e)))?;
            }
        }

        let connection_string = format!("sqlite:{}?mode=rwc", path.display());
        let pool = SqlitePool::connect(&connection_string).await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| {
                tracing::error!("Migration failed: {}", e);
                AppError::Internal(anyhow::anyhow!("Migration failed: {}", e))
            })?;

        tracing::info!(path = %path.display(), "Database connected and migrated successfully");

        Ok(Self {
            pool,
            scan_limit: i64::try_from(scan_limit).unwrap_or(i64::MAX),
        })
    }

    /// Underlying pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn insert_receiver(&self, message_id: i64, receiver: &str) -> Result<(), sqlx::Error> {
        sqlx::query("INSERT INTO receivers (message, receiver) VALUES (?, ?)")
            .bind(message_id)
            .bind(receiver)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn row_to_delivery(row: &sqlx::sqlite::SqliteRow) -> Result<DeliveryRecord, AppError> {
    let id: i64 = row.try_get("id")?;
    let payload: String = row.try_get("payload")?;
    let status: String = row.try_get("status")?;

    Ok(DeliveryRecord {
        id,
        activity_type: row.try_get("activity_type")?,
        target: row.try_get("target")?,
        payload: serde_json::from_str(&payload)
            .map_err(|e| AppError::Storage(format!("corrupt delivery payload {}: {}", id, e)))?,
        status: DeliveryStatus::parse(&status)
            .ok_or_else(|| AppError::Storage(format!("unknown delivery status {}", status)))?,
        error: row.try_get("error")?,
    })
}

#[async_trait]
impl Storage for SqliteStorage {
    // =========================================================================
    // Mailbox
    // =========================================================================

    async fn send(&self, message: &Message) -> Result<SendOutcome, AppError> {
        let data = serde_json::to_string(&message.content)?;

        let message_id = sqlx::query("INSERT INTO messages (sender, data) VALUES (?, ?)")
            .bind(&message.sender)
            .bind(&data)
            .execute(&self.pool)
            .await?
            .last_insert_rowid();

        let mut delivered = 0;
        let mut failed = Vec::new();

        for receiver in &message.receivers {
            match self.insert_receiver(message_id, receiver).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::warn!(
                        message_id,
                        receiver = %receiver,
                        error = %e,
                        "Receiver insert failed"
                    );
                    failed.push(receiver.clone());
                }
            }
        }

        Ok(SendOutcome {
            message_id,
            delivered,
            failed,
        })
    }

    async fn read(&self, receiver: &str, only_unread: bool) -> Result<Vec<MailboxEntry>, AppError> {
        let sql = if only_unread {
            "SELECT m.pk AS id, m.sender, m.data, r.read FROM receivers r \
             JOIN messages m ON m.pk = r.message \
             WHERE r.receiver = ? AND r.read = 0 ORDER BY m.pk LIMIT ?"
        } else {
            "SELECT m.pk AS id, m.sender, m.data, r.read FROM receivers r \
             JOIN messages m ON m.pk = r.message \
             WHERE r.receiver = ? ORDER BY m.pk LIMIT ?"
        };

        let rows = sqlx::query(sql)
            .bind(receiver)
            .bind(self.scan_limit)
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| -> Result<MailboxEntry, AppError> {
                let id: i64 = row.try_get("id")?;
                let data: String = row.try_get("data")?;
                let content: Value = serde_json::from_str(&data)
                    .map_err(|e| AppError::Storage(format!("corrupt message {}: {}", id, e)))?;

                Ok(MailboxEntry {
                    id,
                    sender: row.try_get("sender")?,
                    content,
                    read: row.try_get("read")?,
                })
            })
            .collect()
    }

    async fn set(&self, receiver: &str, message_id: i64, read: bool) -> Result<(), AppError> {
        let result =
            sqlx::query("UPDATE receivers SET read = ? WHERE receiver = ? AND message = ?")
                .bind(read)
                .bind(receiver)
                .bind(message_id)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }

    async fn count_unread(&self, receiver: &str) -> Result<u64, AppError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM \
             (SELECT 1 FROM receivers WHERE receiver = ? AND read = 0 LIMIT ?)",
        )
        .bind(receiver)
        .bind(self.scan_limit)
        .fetch_one(&self.pool)
        .await?;

        Ok(count.max(0) as u64)
    }

    async fn delete(&self, receiver: &str, message_id: i64) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM receivers WHERE receiver = ? AND message = ?")
            .bind(receiver)
            .bind(message_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }

    // =========================================================================
    // Likes
    // =========================================================================

    async fn actor_likes(&self, like: &NewLike) -> Result<i64, AppError> {
        let id = sqlx::query("INSERT INTO liked (actor, object, summary) VALUES (?, ?, ?)")
            .bind(&like.actor)
            .bind(&like.object)
            .bind(&like.summary)
            .execute(&self.pool)
            .await?
            .last_insert_rowid();

        Ok(id)
    }

    async fn find_actor_like(&self, id: i64) -> Result<LikedRecord, AppError> {
        sqlx::query_as::<_, LikedRecord>(
            "SELECT id, actor, object, summary FROM liked WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AppError::NotFound)
    }

    async fn find_actor_likes(&self, actor: &str) -> Result<Vec<i64>, AppError> {
        let ids =
            sqlx::query_scalar::<_, i64>("SELECT id FROM liked WHERE actor = ? ORDER BY id LIMIT ?")
                .bind(actor)
                .bind(self.scan_limit)
                .fetch_all(&self.pool)
                .await?;

        Ok(ids)
    }

    // =========================================================================
    // Follows
    // =========================================================================

    async fn store_follower(&self, actor: &str, object: &str) -> Result<StoredFollow, AppError> {
        let result = sqlx::query(
            "INSERT INTO follow (actor, object) VALUES (?, ?) \
             ON CONFLICT(actor, object) DO NOTHING",
        )
        .bind(actor)
        .bind(object)
        .execute(&self.pool)
        .await?;

        let follow = sqlx::query_as::<_, FollowRelationship>(
            "SELECT id, actor, object, accepted FROM follow WHERE actor = ? AND object = ?",
        )
        .bind(actor)
        .bind(object)
        .fetch_one(&self.pool)
        .await?;

        Ok(StoredFollow {
            follow,
            created: result.rows_affected() > 0,
        })
    }

    async fn accept_follower(&self, id: i64) -> Result<FollowRelationship, AppError> {
        let result = sqlx::query("UPDATE follow SET accepted = 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound);
        }
        self.find_follow(id).await
    }

    async fn find_follow(&self, id: i64) -> Result<FollowRelationship, AppError> {
        sqlx::query_as::<_, FollowRelationship>(
            "SELECT id, actor, object, accepted FROM follow WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AppError::NotFound)
    }

    async fn find_actor_follows(
        &self,
        actor: &str,
        want_followers: bool,
    ) -> Result<Vec<String>, AppError> {
        let sql = if want_followers {
            "SELECT actor FROM follow WHERE object = ? ORDER BY id LIMIT ?"
        } else {
            "SELECT object FROM follow WHERE actor = ? ORDER BY id LIMIT ?"
        };

        let actors = sqlx::query_scalar::<_, String>(sql)
            .bind(actor)
            .bind(self.scan_limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(actors)
    }

    // =========================================================================
    // Delivery ledger
    // =========================================================================

    async fn record_delivery(
        &self,
        activity_type: &str,
        target: &str,
        payload: &Value,
    ) -> Result<i64, AppError> {
        let id = sqlx::query(
            "INSERT INTO deliveries (activity_type, target, payload, status) VALUES (?, ?, ?, ?)",
        )
        .bind(activity_type)
        .bind(target)
        .bind(payload.to_string())
        .bind(DeliveryStatus::Pending.as_str())
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        Ok(id)
    }

    async fn complete_delivery(
        &self,
        id: i64,
        status: DeliveryStatus,
        error: Option<String>,
    ) -> Result<(), AppError> {
        let result = sqlx::query(
            "UPDATE deliveries SET status = ?, error = ?, \
             updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now') WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(error)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }

    async fn find_deliveries(&self, status: DeliveryStatus) -> Result<Vec<DeliveryRecord>, AppError> {
        let rows = sqlx::query(
            "SELECT id, activity_type, target, payload, status, error FROM deliveries \
             WHERE status = ? ORDER BY id LIMIT ?",
        )
        .bind(status.as_str())
        .bind(self.scan_limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_delivery).collect()
    }
}
