//! Registry of syncable local model types keyed by remote content type.
//!
//! The registry is an explicit object: build it once at startup with
//! `RegistryBuilder`, then share it by `Arc` with the record managers and the sync
//! orchestrator. Tests build isolated registries the same way.

use crate::field_map::FieldMapping;
use crate::models::Fields;
use crate::{Error, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// A local model type that can be synchronized with remote content.
///
/// `Default` provides the blank row new local rows start from; its serialized keys
/// define the model's local fields.
pub trait ContentModel: Serialize + DeserializeOwned + Default + Send + Sync + 'static {
    /// Stable local type name, e.g. `"example.article"`.
    const LOCAL_TYPE: &'static str;

    fn descriptor() -> ContentDescriptor;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarDescriptor {
    pub calendar: String,
    pub event_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessagingDescriptor {
    pub message_bus: String,
    pub recipient_type: Option<String>,
    pub message_type: Option<String>,
}

/// Static declaration of how a local model maps onto remote content.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentDescriptor {
    pub content_type: String,
    /// Empty means identity mapping.
    pub field_map: Vec<FieldMapping>,
    pub exclude: BTreeSet<String>,
    pub calendar: Option<CalendarDescriptor>,
    pub messaging: Option<MessagingDescriptor>,
}

impl ContentDescriptor {
    pub fn new(content_type: impl Into<String>) -> Self {
        Self {
            content_type: content_type.into(),
            ..Default::default()
        }
    }

    pub fn field(mut self, mapping: FieldMapping) -> Self {
        self.field_map.push(mapping);
        self
    }

    /// Shorthand for a same-named optional field.
    pub fn same(self, name: &str) -> Self {
        self.field(FieldMapping::new(name, name))
    }

    pub fn exclude(mut self, local_field: impl Into<String>) -> Self {
        self.exclude.insert(local_field.into());
        self
    }

    pub fn calendar(mut self, calendar: impl Into<String>, event_type: Option<&str>) -> Self {
        self.calendar = Some(CalendarDescriptor {
            calendar: calendar.into(),
            event_type: event_type.map(str::to_string),
        });
        self
    }

    pub fn messaging(
        mut self,
        message_bus: impl Into<String>,
        recipient_type: Option<&str>,
        message_type: Option<&str>,
    ) -> Self {
        self.messaging = Some(MessagingDescriptor {
            message_bus: message_bus.into(),
            recipient_type: recipient_type.map(str::to_string),
            message_type: message_type.map(str::to_string),
        });
        self
    }
}

/// Type-erased registration of one `ContentModel`.
#[derive(Clone)]
pub struct ContentBinding {
    local_type: String,
    descriptor: ContentDescriptor,
    blank: Fields,
    validate: fn(&Fields) -> std::result::Result<(), String>,
}

impl std::fmt::Debug for ContentBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentBinding")
            .field("local_type", &self.local_type)
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

fn validate_as<T: ContentModel>(fields: &Fields) -> std::result::Result<(), String> {
    serde_json::from_value::<T>(serde_json::Value::Object(fields.clone()))
        .map(|_| ())
        .map_err(|e| e.to_string())
}

impl ContentBinding {
    #[tracing::instrument(level = "debug", fields(local_type = T::LOCAL_TYPE))]
    pub fn of<T: ContentModel>() -> Result<Self> {
        let blank = model_fields(&T::default())?;
        let binding = Self {
            local_type: T::LOCAL_TYPE.to_string(),
            descriptor: T::descriptor(),
            blank,
            validate: validate_as::<T>,
        };
        binding.check()?;
        Ok(binding)
    }

    fn check(&self) -> Result<()> {
        if self.local_type.trim().is_empty() {
            return Err(Error::Misconfigured("content model local type is empty".into()));
        }
        if self.descriptor.content_type.trim().is_empty() {
            return Err(Error::Misconfigured(format!(
                "content model {} must declare a remote content type",
                self.local_type
            )));
        }

        let mut seen_local = BTreeSet::new();
        let mut seen_remote = BTreeSet::new();
        for m in &self.descriptor.field_map {
            if m.remote_field.trim().is_empty() || m.local_field.trim().is_empty() {
                return Err(Error::Misconfigured(format!(
                    "{}: field mappings must name both fields",
                    self.local_type
                )));
            }
            if !self.blank.contains_key(&m.local_field) {
                return Err(Error::Misconfigured(format!(
                    "{}: mapped local field '{}' does not exist",
                    self.local_type, m.local_field
                )));
            }
            if !seen_local.insert(m.local_field.as_str()) {
                return Err(Error::Misconfigured(format!(
                    "{}: local field '{}' is mapped more than once",
                    self.local_type, m.local_field
                )));
            }
            if !seen_remote.insert(m.remote_field.as_str()) {
                return Err(Error::Misconfigured(format!(
                    "{}: remote field '{}' is mapped more than once",
                    self.local_type, m.remote_field
                )));
            }
        }
        for ex in &self.descriptor.exclude {
            if !self.blank.contains_key(ex) {
                return Err(Error::Misconfigured(format!(
                    "{}: excluded field '{}' does not exist",
                    self.local_type, ex
                )));
            }
        }
        Ok(())
    }

    pub fn local_type(&self) -> &str {
        &self.local_type
    }

    pub fn content_type(&self) -> &str {
        &self.descriptor.content_type
    }

    pub fn descriptor(&self) -> &ContentDescriptor {
        &self.descriptor
    }

    /// Fields of a freshly defaulted model.
    pub fn blank_row(&self) -> Fields {
        self.blank.clone()
    }

    pub fn has_local_field(&self, name: &str) -> bool {
        self.blank.contains_key(name)
    }

    pub fn is_excluded(&self, local_field: &str) -> bool {
        self.descriptor.exclude.contains(local_field)
    }

    pub fn is_identity(&self) -> bool {
        self.descriptor.field_map.is_empty()
    }

    pub fn validate_row(&self, fields: &Fields) -> std::result::Result<(), String> {
        (self.validate)(fields)
    }

    /// Mappings to apply for an incoming payload. Identity maps follow the payload keys.
    pub fn inbound_mappings(&self, payload: &Fields) -> Vec<FieldMapping> {
        if self.is_identity() {
            return payload
                .keys()
                .map(|k| FieldMapping::new(k.clone(), k.clone()))
                .collect();
        }
        self.descriptor.field_map.clone()
    }

    /// Mappings used to build an outgoing payload. Identity maps follow the local fields.
    pub fn outbound_mappings(&self) -> Vec<FieldMapping> {
        if self.is_identity() {
            return self
                .blank
                .keys()
                .map(|k| FieldMapping::new(k.clone(), k.clone()))
                .collect();
        }
        self.descriptor.field_map.clone()
    }

    pub fn link_mappings(&self) -> impl Iterator<Item = &FieldMapping> {
        self.descriptor.field_map.iter().filter(|m| m.is_link())
    }
}

/// Serialize a model into row fields.
pub fn model_fields<T: ContentModel>(model: &T) -> Result<Fields> {
    match serde_json::to_value(model).map_err(|e| Error::backend("encode content model", e))? {
        serde_json::Value::Object(map) => Ok(map),
        other => Err(Error::Misconfigured(format!(
            "{} must serialize to an object, got {other}",
            T::LOCAL_TYPE
        ))),
    }
}

#[derive(Debug, Clone, Default)]
pub struct Registry {
    by_content_type: BTreeMap<String, ContentBinding>,
    by_local_type: HashMap<String, String>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    pub fn by_content_type(&self, content_type: &str) -> Option<&ContentBinding> {
        self.by_content_type.get(content_type)
    }

    pub fn by_local_type(&self, local_type: &str) -> Option<&ContentBinding> {
        self.by_local_type
            .get(local_type)
            .and_then(|ct| self.by_content_type.get(ct))
    }

    pub fn require_content_type(&self, content_type: &str) -> Result<&ContentBinding> {
        self.by_content_type(content_type).ok_or_else(|| {
            Error::NotFound(format!("content type '{content_type}' is not registered"))
        })
    }

    pub fn require_local_type(&self, local_type: &str) -> Result<&ContentBinding> {
        self.by_local_type(local_type).ok_or_else(|| {
            Error::NotFound(format!("local type '{local_type}' is not a registered content model"))
        })
    }

    /// Registered remote content types, sorted.
    pub fn content_types(&self) -> Vec<String> {
        self.by_content_type.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.by_content_type.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_content_type.is_empty()
    }
}

/// Collects registrations; errors surface from `build()`.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    bindings: Vec<Result<ContentBinding>>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T: ContentModel>(mut self) -> Self {
        self.bindings.push(ContentBinding::of::<T>());
        self
    }

    #[tracing::instrument(level = "info", skip(self))]
    pub fn build(self) -> Result<Registry> {
        let mut registry = Registry::default();
        for binding in self.bindings {
            let binding = binding?;
            let content_type = binding.content_type().to_string();
            if let Some(prev) = registry.by_content_type.get(&content_type) {
                tracing::warn!(
                    content_type = %content_type,
                    previous = %prev.local_type(),
                    replacement = %binding.local_type(),
                    "content type registered twice; last registration wins"
                );
                let prev_local = prev.local_type().to_string();
                registry.by_local_type.remove(&prev_local);
            }
            registry
                .by_local_type
                .insert(binding.local_type().to_string(), content_type.clone());
            registry.by_content_type.insert(content_type, binding);
        }
        tracing::info!(content_types = registry.len(), "content registry built");
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct Note {
        body: String,
    }

    impl ContentModel for Note {
        const LOCAL_TYPE: &'static str = "test.note";

        fn descriptor() -> ContentDescriptor {
            ContentDescriptor::new("Note")
        }
    }

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct Memo {
        body: String,
    }

    impl ContentModel for Memo {
        const LOCAL_TYPE: &'static str = "test.memo";

        fn descriptor() -> ContentDescriptor {
            ContentDescriptor::new("Note")
        }
    }

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct Untyped {
        body: String,
    }

    impl ContentModel for Untyped {
        const LOCAL_TYPE: &'static str = "test.untyped";

        fn descriptor() -> ContentDescriptor {
            ContentDescriptor::new("  ")
        }
    }

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct BadMap {
        body: String,
    }

    impl ContentModel for BadMap {
        const LOCAL_TYPE: &'static str = "test.bad_map";

        fn descriptor() -> ContentDescriptor {
            ContentDescriptor::new("BadMap").field(FieldMapping::new("text", "missing"))
        }
    }

    #[test]
    fn missing_content_type_is_misconfigured() {
        let err = RegistryBuilder::new()
            .register::<Untyped>()
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Misconfigured(_)));
    }

    #[test]
    fn unknown_local_field_is_rejected_at_registration() {
        let err = RegistryBuilder::new()
            .register::<BadMap>()
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Misconfigured(_)));
    }

    #[test]
    fn last_registration_for_a_type_wins() {
        let registry = RegistryBuilder::new()
            .register::<Note>()
            .register::<Memo>()
            .build()
            .unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.by_content_type("Note").unwrap().local_type(),
            "test.memo"
        );
        assert!(registry.by_local_type("test.note").is_none());
        assert!(registry.by_local_type("test.memo").is_some());
    }

    #[test]
    fn identity_binding_follows_model_fields() {
        let registry = RegistryBuilder::new().register::<Note>().build().unwrap();
        let binding = registry.by_content_type("Note").unwrap();
        assert!(binding.is_identity());
        let out: Vec<_> = binding
            .outbound_mappings()
            .into_iter()
            .map(|m| m.remote_field)
            .collect();
        assert_eq!(out, vec!["body".to_string()]);
    }
}
