#![cfg(test)]

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::SyncConfig;
use crate::content::{ContentRecords, ContentSync};
use crate::field_map::FieldMapping;
use crate::models::Fields;
use crate::registry::{ContentDescriptor, ContentModel, Registry, RegistryBuilder};
use crate::remote::MemoryAxilent;
use crate::store::MemorySyncDb;

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct Article {
    pub title: String,
    pub body: String,
    pub word_count: i64,
    pub author_id: Option<i64>,
    pub internal_note: String,
}

impl Article {
    pub fn new(title: &str, body: &str) -> Self {
        Self {
            title: title.to_string(),
            body: body.to_string(),
            ..Default::default()
        }
    }
}

impl ContentModel for Article {
    const LOCAL_TYPE: &'static str = "test.article";

    fn descriptor() -> ContentDescriptor {
        ContentDescriptor::new("Article")
            .field(FieldMapping::new("title", "title").required())
            .same("body")
            .same("word_count")
            .field(FieldMapping::new("author", "author_id").link("Author"))
            .exclude("internal_note")
    }
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct Author {
    pub name: String,
}

impl ContentModel for Author {
    const LOCAL_TYPE: &'static str = "test.author";

    fn descriptor() -> ContentDescriptor {
        ContentDescriptor::new("Author")
    }
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct Meeting {
    pub subject: String,
}

impl ContentModel for Meeting {
    const LOCAL_TYPE: &'static str = "test.meeting";

    fn descriptor() -> ContentDescriptor {
        ContentDescriptor::new("Meeting").calendar("office", Some("meeting"))
    }
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct Room {
    pub name: String,
}

impl ContentModel for Room {
    const LOCAL_TYPE: &'static str = "test.room";

    fn descriptor() -> ContentDescriptor {
        ContentDescriptor::new("Room").calendar("office", None)
    }
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct Member {
    pub handle: String,
}

impl ContentModel for Member {
    const LOCAL_TYPE: &'static str = "test.member";

    fn descriptor() -> ContentDescriptor {
        ContentDescriptor::new("Member").messaging("community", Some("member"), None)
    }
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct Note {
    pub text: String,
}

impl ContentModel for Note {
    const LOCAL_TYPE: &'static str = "test.note";

    fn descriptor() -> ContentDescriptor {
        ContentDescriptor::new("Note")
            .field(FieldMapping::new("message", "text"))
            .messaging("community", None, Some("note"))
    }
}

pub(crate) fn registry() -> Arc<Registry> {
    let registry = RegistryBuilder::new()
        .register::<Article>()
        .register::<Author>()
        .register::<Meeting>()
        .register::<Room>()
        .register::<Member>()
        .register::<Note>()
        .build()
        .expect("test registry");
    Arc::new(registry)
}

/// Registry, stores and fake remote wired together.
pub(crate) struct Harness {
    pub db: MemorySyncDb,
    pub remote: MemoryAxilent,
    pub records: Arc<ContentRecords>,
}

impl Harness {
    pub async fn new() -> Self {
        let db = MemorySyncDb::new();
        let remote = MemoryAxilent::new();
        let records = ContentRecords::new(registry(), Arc::new(db.clone()), Arc::new(db.clone()))
            .with_content_api(Arc::new(remote.clone()));
        Self {
            db,
            remote,
            records: Arc::new(records),
        }
    }

    /// No remote content client attached.
    pub async fn unconfigured() -> Self {
        let db = MemorySyncDb::new();
        let records = ContentRecords::new(registry(), Arc::new(db.clone()), Arc::new(db.clone()));
        Self {
            db,
            remote: MemoryAxilent::new(),
            records: Arc::new(records),
        }
    }

    pub fn sync(&self) -> ContentSync {
        ContentSync::new(self.records.clone(), SyncConfig::default())
    }

    pub fn article_payload(&self, title: &str, body: &str) -> Fields {
        json!({"title": title, "body": body})
            .as_object()
            .cloned()
            .unwrap_or_default()
    }
}
