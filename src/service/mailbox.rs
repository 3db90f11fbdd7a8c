//! Mailbox service
//!
//! Private message operations over the Storage Port. Callers must have
//! authenticated the sender or receiver before invoking any of these.

use std::sync::Arc;

use crate::data::{MailboxEntry, Message, SendOutcome, Storage};
use crate::error::AppError;
use crate::metrics::{MESSAGES_SENT_TOTAL, RECEIVER_INSERTS_TOTAL};

/// Mailbox service
pub struct MailboxService {
    storage: Arc<dyn Storage>,
}

impl MailboxService {
    /// Create new mailbox service
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Persist a message and fan it out to its receivers.
    ///
    /// Duplicate receivers are collapsed first. Invalid messages are
    /// rejected before storage is touched. A failed receiver insert does
    /// not undo the message or the receivers already written.
    pub async fn send(&self, mut message: Message) -> Result<SendOutcome, AppError> {
        message.validate()?;
        message.dedup_receivers();

        let outcome = self.storage.send(&message).await?;

        MESSAGES_SENT_TOTAL.inc();
        RECEIVER_INSERTS_TOTAL
            .with_label_values(&["success"])
            .inc_by(outcome.delivered as u64);
        RECEIVER_INSERTS_TOTAL
            .with_label_values(&["failure"])
            .inc_by(outcome.failed.len() as u64);

        if outcome.failed.is_empty() {
            tracing::info!(
                message_id = outcome.message_id,
                sender = %message.sender,
                count = outcome.delivered,
                "Message sent"
            );
        } else {
            tracing::warn!(
                message_id = outcome.message_id,
                sender = %message.sender,
                count = outcome.delivered,
                failed = ?outcome.failed,
                "Message partially delivered"
            );
        }

        Ok(outcome)
    }

    pub async fn read(&self, receiver: &str, only_unread: bool) -> Result<Vec<MailboxEntry>, AppError> {
        self.storage.read(receiver, only_unread).await
    }

    /// Set the read flag. `NotFound` if `receiver` never got `message_id`.
    pub async fn set_read(&self, receiver: &str, message_id: i64, read: bool) -> Result<(), AppError> {
        self.storage.set(receiver, message_id, read).await?;
        tracing::debug!(receiver = %receiver, message_id, read, "Read state updated");
        Ok(())
    }

    /// Unread messages of `receiver`, capped at the storage scan limit
    pub async fn count_unread(&self, receiver: &str) -> Result<u64, AppError> {
        self.storage.count_unread(receiver).await
    }

    pub async fn delete(&self, receiver: &str, message_id: i64) -> Result<(), AppError> {
        self.storage.delete(receiver, message_id).await?;
        tracing::debug!(receiver = %receiver, message_id, "Mailbox entry deleted");
        Ok(())
    }
}
