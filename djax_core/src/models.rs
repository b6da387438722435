use crate::{Error, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Field values of a local row or a remote content item, keyed by field name.
pub type Fields = serde_json::Map<String, serde_json::Value>;

/// Address of one local row: the model's local type name plus its row id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LocalRef {
    pub local_type: String,
    pub local_id: i64,
}

impl LocalRef {
    pub fn new(local_type: impl Into<String>, local_id: i64) -> Self {
        Self {
            local_type: local_type.into(),
            local_id,
        }
    }
}

impl fmt::Display for LocalRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.local_type, self.local_id)
    }
}

/// A local record as held by a `LocalStore`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalRow {
    pub local_type: String,
    pub local_id: i64,
    pub fields: Fields,
}

impl LocalRow {
    pub fn local_ref(&self) -> LocalRef {
        LocalRef::new(self.local_type.clone(), self.local_id)
    }

    /// Decode the row into its typed model.
    pub fn to_model<T: crate::registry::ContentModel>(&self) -> Result<T> {
        if self.local_type != T::LOCAL_TYPE {
            return Err(Error::InvalidInput(format!(
                "row {} is not a {}",
                self.local_ref(),
                T::LOCAL_TYPE
            )));
        }
        serde_json::from_value(serde_json::Value::Object(self.fields.clone()))
            .map_err(|e| Error::backend("decode local row", e))
    }
}

/// Reconciliation ledger entry: one local row mapped to one remote content item.
///
/// Unique on `(local_type, local_id)` and on `(remote_type, remote_key)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentRecord {
    pub id: Uuid,
    pub local_type: String,
    pub local_id: i64,
    pub remote_type: String,
    pub remote_key: String,
    /// `None` until the first successful pull or push.
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl ContentRecord {
    #[tracing::instrument(level = "debug")]
    pub fn new(
        local: &LocalRef,
        remote_type: impl Into<String> + fmt::Debug,
        remote_key: impl Into<String> + fmt::Debug,
        last_synced_at: Option<DateTime<Utc>>,
    ) -> Result<Self> {
        if local.local_type.trim().is_empty() {
            return Err(Error::InvalidInput("local_type is empty".to_string()));
        }
        let remote_type = remote_type.into();
        if remote_type.trim().is_empty() {
            return Err(Error::InvalidInput("remote_type is empty".to_string()));
        }
        let remote_key = remote_key.into();
        if remote_key.trim().is_empty() {
            return Err(Error::InvalidInput("remote_key is empty".to_string()));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            local_type: local.local_type.clone(),
            local_id: local.local_id,
            remote_type,
            remote_key,
            last_synced_at,
        })
    }

    pub fn local_ref(&self) -> LocalRef {
        LocalRef::new(self.local_type.clone(), self.local_id)
    }

    /// `"Type:key"` form used for link fields on the remote side.
    pub fn link(&self) -> String {
        format!("{}:{}", self.remote_type, self.remote_key)
    }

    pub fn touch(&mut self, at: DateTime<Utc>) {
        self.last_synced_at = Some(at);
    }
}

/// Advisory lock row held for the duration of a sync pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncLock {
    pub token: String,
    pub acquired_at: DateTime<Utc>,
}

impl SyncLock {
    pub fn new(token: impl Into<String>, acquired_at: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            acquired_at,
        }
    }

    /// A lock without TTL never expires. Neither does one whose expiry is out of range.
    pub fn is_expired(&self, ttl: Option<Duration>, now: DateTime<Utc>) -> bool {
        ttl.and_then(|ttl| self.acquired_at.checked_add_signed(ttl))
            .is_some_and(|expires_at| expires_at <= now)
    }
}

/// Stored credential gating the single-record sync endpoint.
///
/// Only the SHA-256 hex digest of the secret is persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthToken {
    pub id: Uuid,
    pub name: String,
    pub token_hash: String,
    /// When set, requests must originate from this host (or a subdomain).
    pub origin_domain: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_record_rejects_blank_keys() {
        let local = LocalRef::new("example.article", 1);
        assert!(ContentRecord::new(&local, "Article", " ", None).is_err());
        assert!(ContentRecord::new(&local, "", "a1", None).is_err());

        let rec = ContentRecord::new(&local, "Article", "a1", None).unwrap();
        assert_eq!(rec.local_ref(), local);
        assert_eq!(rec.link(), "Article:a1");
    }

    #[test]
    fn lock_expiry_requires_ttl() {
        let acquired = Utc::now() - Duration::minutes(10);
        let lock = SyncLock::new("t", acquired);
        assert!(!lock.is_expired(None, Utc::now()));
        assert!(lock.is_expired(Some(Duration::minutes(5)), Utc::now()));
        assert!(!lock.is_expired(Some(Duration::minutes(30)), Utc::now()));
    }

    #[test]
    fn huge_ttl_never_expires() {
        let lock = SyncLock::new("t", Utc::now() - Duration::minutes(10));
        let ttl = Duration::from_std(std::time::Duration::from_secs(9_000_000_000_000)).unwrap();
        assert!(!lock.is_expired(Some(ttl), Utc::now()));
    }
}
