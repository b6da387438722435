use async_trait::async_trait;
use djax_core::Result;
use djax_core::models::Fields;
use djax_core::remote::{InboxEntry, MessagingApi};
use serde_json::json;
use tracing::instrument;

use super::AxilentClient;
use super::connection::App;
use super::wire;

impl AxilentClient {
    async fn messaging(&self, function: &str, body: serde_json::Value) -> Result<()> {
        self.cx.call(App::Messaging, function, body).await?;
        Ok(())
    }
}

#[async_trait]
impl MessagingApi for AxilentClient {
    #[instrument(level = "debug", skip(self, content))]
    async fn create_recipient(
        &self,
        message_bus: &str,
        recipient_type: &str,
        content: &Fields,
    ) -> Result<String> {
        let body = json!({
            "message_bus": message_bus,
            "recipient_type": recipient_type,
            "content": content,
        });
        let resp = self.cx.call(App::Messaging, "createrecipient", body).await?;
        wire::key(resp, "recipient_key")
    }

    #[instrument(level = "debug", skip(self, content))]
    async fn update_recipient(&self, recipient_key: &str, content: &Fields) -> Result<()> {
        self.messaging(
            "updaterecipient",
            json!({"recipient_key": recipient_key, "content": content}),
        )
        .await
    }

    async fn delete_recipient(&self, recipient_key: &str) -> Result<()> {
        self.messaging("deleterecipient", json!({"recipient_key": recipient_key}))
            .await
    }

    #[instrument(level = "debug", skip(self, content))]
    async fn create_message(
        &self,
        message_bus: &str,
        message_type: &str,
        sender_key: &str,
        content: &Fields,
    ) -> Result<String> {
        let body = json!({
            "message_bus": message_bus,
            "message_type": message_type,
            "sender_key": sender_key,
            "content": content,
        });
        let resp = self.cx.call(App::Messaging, "createmessage", body).await?;
        wire::key(resp, "message_key")
    }

    async fn delete_message(&self, message_key: &str) -> Result<()> {
        self.messaging("deletemessage", json!({"message_key": message_key}))
            .await
    }

    async fn publish_message(&self, message_key: &str, topic: &str) -> Result<()> {
        self.messaging(
            "publishmessage",
            json!({"message_key": message_key, "topic": topic}),
        )
        .await
    }

    async fn send_message(&self, message_key: &str, recipient_key: &str) -> Result<()> {
        self.messaging(
            "sendmessage",
            json!({"message_key": message_key, "recipient_key": recipient_key}),
        )
        .await
    }

    #[instrument(level = "debug", skip(self))]
    async fn inbox(&self, recipient_key: &str, unread_only: bool) -> Result<Vec<InboxEntry>> {
        let body = json!({"recipient_key": recipient_key, "unread_only": unread_only});
        wire::inbox(self.cx.call(App::Messaging, "inbox", body).await?)
    }

    async fn update_received_message(
        &self,
        recipient_key: &str,
        message_key: &str,
        read: bool,
    ) -> Result<()> {
        self.messaging(
            "updatereceivedmessage",
            json!({"recipient_key": recipient_key, "message_key": message_key, "read": read}),
        )
        .await
    }

    async fn delete_received_message(
        &self,
        recipient_key: &str,
        message_key: &str,
    ) -> Result<()> {
        self.messaging(
            "deletereceivedmessage",
            json!({"recipient_key": recipient_key, "message_key": message_key}),
        )
        .await
    }

    async fn mark_all_read(&self, recipient_key: &str) -> Result<()> {
        self.messaging("markallread", json!({"recipient_key": recipient_key}))
            .await
    }

    async fn subscribe(&self, recipient_key: &str, topic: &str) -> Result<()> {
        self.messaging(
            "subscribe",
            json!({"recipient_key": recipient_key, "topic": topic}),
        )
        .await
    }

    async fn unsubscribe(&self, recipient_key: &str, topic: &str) -> Result<()> {
        self.messaging(
            "unsubscribe",
            json!({"recipient_key": recipient_key, "topic": topic}),
        )
        .await
    }
}
