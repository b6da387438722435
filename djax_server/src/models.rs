//! Content models served by the `djax` binary.

use djax_core::field_map::FieldMapping;
use djax_core::{ContentDescriptor, ContentModel, Registry, Result};
use serde::{Deserialize, Serialize};

/// A local article bound to the remote `Article` content type.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    pub body: String,
}

impl ContentModel for Article {
    const LOCAL_TYPE: &'static str = "example.article";

    fn descriptor() -> ContentDescriptor {
        ContentDescriptor::new("Article")
            .field(FieldMapping::new("title", "title").required())
            .same("body")
    }
}

pub fn registry() -> Result<Registry> {
    Registry::builder().register::<Article>().build()
}
