use crate::models::LocalRef;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A local row known to the message bus as a sender/receiver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub id: Uuid,
    pub local_type: String,
    pub local_id: i64,
    pub recipient_key: String,
}

impl Recipient {
    pub fn new(local: &LocalRef, recipient_key: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            local_type: local.local_type.clone(),
            local_id: local.local_id,
            recipient_key: recipient_key.into(),
        }
    }

    pub fn local_ref(&self) -> LocalRef {
        LocalRef::new(self.local_type.clone(), self.local_id)
    }
}

/// A local row published on the message bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub local_type: String,
    pub local_id: i64,
    pub message_key: String,
    pub sender_key: String,
}

impl Message {
    pub fn new(
        local: &LocalRef,
        message_key: impl Into<String>,
        sender_key: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            local_type: local.local_type.clone(),
            local_id: local.local_id,
            message_key: message_key.into(),
            sender_key: sender_key.into(),
        }
    }

    pub fn local_ref(&self) -> LocalRef {
        LocalRef::new(self.local_type.clone(), self.local_id)
    }
}

/// Receipt marker of one message in one recipient's inbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceivedMessage {
    pub id: Uuid,
    pub message_id: Uuid,
    pub recipient_id: Uuid,
    pub unread: bool,
}
