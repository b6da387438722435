use std::sync::Arc;

use super::models::{Message, ReceivedMessage, Recipient};
use crate::content::ContentRecords;
use crate::models::LocalRef;
use crate::registry::{ContentBinding, MessagingDescriptor};
use crate::remote::MessagingApi;
use crate::{Error, Result};

/// Binds local rows to the remote message bus as recipients and messages.
pub struct Messaging {
    records: Arc<ContentRecords>,
    api: Arc<dyn MessagingApi>,
}

impl Messaging {
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn new(records: Arc<ContentRecords>, api: Arc<dyn MessagingApi>) -> Self {
        Self { records, api }
    }

    fn binding(&self, local: &LocalRef) -> Result<(&ContentBinding, &MessagingDescriptor)> {
        let binding = self.records.registry().require_local_type(&local.local_type)?;
        let messaging = binding.descriptor().messaging.as_ref().ok_or_else(|| {
            Error::Misconfigured(format!(
                "{} does not declare a message bus",
                binding.local_type()
            ))
        })?;
        Ok((binding, messaging))
    }

    // ── recipients ─────────────────────────────────────────────

    /// Create the recipient remotely on first call, update its profile afterwards.
    #[tracing::instrument(level = "info", skip(self))]
    pub async fn push_recipient(&self, local: &LocalRef) -> Result<Recipient> {
        let (binding, messaging) = self.binding(local)?;
        let content = self.records.outbound_fields(local).await?;
        let db = self.records.db();

        if let Some(recipient) = db.recipient_for_local(local).await? {
            self.api
                .update_recipient(&recipient.recipient_key, &content)
                .await?;
            return Ok(recipient);
        }

        let recipient_type = messaging.recipient_type.as_deref().ok_or_else(|| {
            Error::Misconfigured(format!(
                "{} must set a recipient type",
                binding.local_type()
            ))
        })?;
        let key = self
            .api
            .create_recipient(&messaging.message_bus, recipient_type, &content)
            .await?;
        let recipient = Recipient::new(local, key);
        db.insert_recipient(&recipient).await?;
        Ok(recipient)
    }

    /// `NotFound` until the row has been pushed as a recipient.
    pub async fn get_recipient(&self, local: &LocalRef) -> Result<Recipient> {
        self.records
            .db()
            .recipient_for_local(local)
            .await?
            .ok_or_else(|| Error::NotFound(format!("{local} is not a message recipient")))
    }

    #[tracing::instrument(level = "info", skip(self))]
    pub async fn delete_recipient(&self, local: &LocalRef) -> Result<()> {
        let recipient = self.get_recipient(local).await?;
        self.api.delete_recipient(&recipient.recipient_key).await?;
        self.records.db().delete_recipient(recipient.id).await
    }

    /// Fetch the remote inbox and mirror it into local receipts.
    ///
    /// Inbox entries for messages this application never created are ignored.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn inbox(&self, local: &LocalRef, unread_only: bool) -> Result<Vec<ReceivedMessage>> {
        let recipient = self.get_recipient(local).await?;
        let db = self.records.db();

        for entry in self.api.inbox(&recipient.recipient_key, unread_only).await? {
            match db.message_by_key(&entry.message_key).await? {
                Some(message) => {
                    db.ensure_received(message.id, recipient.id, entry.unread)
                        .await?;
                }
                None => {
                    tracing::debug!(message_key = %entry.message_key, "inbox entry for unknown message");
                }
            }
        }

        let received = db.received_for_recipient(recipient.id).await?;
        Ok(received
            .into_iter()
            .filter(|r| !unread_only || r.unread)
            .collect())
    }

    pub async fn mark_all_read(&self, local: &LocalRef) -> Result<()> {
        let recipient = self.get_recipient(local).await?;
        self.api.mark_all_read(&recipient.recipient_key).await?;

        let db = self.records.db();
        for mut received in db.received_for_recipient(recipient.id).await? {
            if received.unread {
                received.unread = false;
                db.update_received(&received).await?;
            }
        }
        Ok(())
    }

    pub async fn subscribe(&self, local: &LocalRef, topic: &str) -> Result<()> {
        let recipient = self.get_recipient(local).await?;
        self.api.subscribe(&recipient.recipient_key, topic).await
    }

    pub async fn unsubscribe(&self, local: &LocalRef, topic: &str) -> Result<()> {
        let recipient = self.get_recipient(local).await?;
        self.api.unsubscribe(&recipient.recipient_key, topic).await
    }

    // ── messages ───────────────────────────────────────────────

    /// Create the message on the bus. The sender is pushed as a recipient first.
    #[tracing::instrument(level = "info", skip(self))]
    pub async fn create_message(&self, local: &LocalRef, sender: &LocalRef) -> Result<Message> {
        let (binding, messaging) = self.binding(local)?;
        let message_type = messaging.message_type.as_deref().ok_or_else(|| {
            Error::Misconfigured(format!(
                "{} must set a message type",
                binding.local_type()
            ))
        })?;
        let db = self.records.db();
        if let Some(existing) = db.message_for_local(local).await? {
            return Err(Error::Conflict(format!(
                "{local} was already sent as message {}",
                existing.message_key
            )));
        }

        let sender = self.push_recipient(sender).await?;
        let content = self.records.outbound_fields(local).await?;
        let key = self
            .api
            .create_message(
                &messaging.message_bus,
                message_type,
                &sender.recipient_key,
                &content,
            )
            .await?;

        let message = Message::new(local, key, sender.recipient_key);
        db.insert_message(&message).await?;
        Ok(message)
    }

    pub async fn message_for(&self, local: &LocalRef) -> Result<Message> {
        self.records
            .db()
            .message_for_local(local)
            .await?
            .ok_or_else(|| Error::NotFound(format!("{local} has not been sent as a message")))
    }

    pub async fn publish_message(&self, local: &LocalRef, topic: &str) -> Result<()> {
        let message = self.message_for(local).await?;
        self.api.publish_message(&message.message_key, topic).await
    }

    pub async fn send_message(&self, local: &LocalRef, recipient: &LocalRef) -> Result<()> {
        let recipient = self.get_recipient(recipient).await?;
        let message = self.message_for(local).await?;
        self.api
            .send_message(&message.message_key, &recipient.recipient_key)
            .await
    }

    /// Mark the message read or unread for one recipient.
    pub async fn mark(&self, local: &LocalRef, recipient: &LocalRef, read: bool) -> Result<()> {
        let recipient = self.get_recipient(recipient).await?;
        let message = self.message_for(local).await?;
        self.api
            .update_received_message(&recipient.recipient_key, &message.message_key, read)
            .await?;
        self.records
            .db()
            .ensure_received(message.id, recipient.id, !read)
            .await?;
        Ok(())
    }

    pub async fn delete_received(&self, local: &LocalRef, recipient: &LocalRef) -> Result<()> {
        let recipient = self.get_recipient(recipient).await?;
        let message = self.message_for(local).await?;
        self.api
            .delete_received_message(&recipient.recipient_key, &message.message_key)
            .await?;
        self.records
            .db()
            .delete_received(message.id, recipient.id)
            .await
    }

    #[tracing::instrument(level = "info", skip(self))]
    pub async fn delete_message(&self, local: &LocalRef) -> Result<()> {
        let message = self.message_for(local).await?;
        self.api.delete_message(&message.message_key).await?;
        self.records.db().delete_message(message.id).await
    }

    pub async fn sender(&self, local: &LocalRef) -> Result<Recipient> {
        let message = self.message_for(local).await?;
        self.records
            .db()
            .recipient_by_key(&message.sender_key)
            .await?
            .ok_or_else(|| Error::NotFound(format!("sender {}", message.sender_key)))
    }
}
