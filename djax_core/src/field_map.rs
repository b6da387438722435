//! Field correspondence between remote content items and local rows.
//!
//! Inbound application is best-effort: each failing field is reported and skipped,
//! the remaining fields still apply. Outbound payload construction is strict about
//! required fields.

use crate::models::Fields;
use crate::registry::ContentBinding;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldKind {
    Value,
    /// Foreign-key-like field: a local row id locally, `"Type:key"` remotely.
    Link { content_type: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMapping {
    pub remote_field: String,
    pub local_field: String,
    pub required: bool,
    pub kind: FieldKind,
}

impl FieldMapping {
    pub fn new(remote_field: impl Into<String>, local_field: impl Into<String>) -> Self {
        Self {
            remote_field: remote_field.into(),
            local_field: local_field.into(),
            required: false,
            kind: FieldKind::Value,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn link(mut self, content_type: impl Into<String>) -> Self {
        self.kind = FieldKind::Link {
            content_type: content_type.into(),
        };
        self
    }

    pub fn is_link(&self) -> bool {
        matches!(self.kind, FieldKind::Link { .. })
    }
}

/// Per-field failure while applying remote content onto a local row.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "error", rename_all = "snake_case")]
pub enum FieldMappingError {
    #[error("remote content {content_type} has no field '{remote_field}'")]
    MissingRemoteField {
        content_type: String,
        remote_field: String,
    },

    #[error("local model {local_type} has no field '{local_field}'")]
    UnknownLocalField {
        local_type: String,
        local_field: String,
    },

    #[error("value for {local_type}.{local_field} rejected: {reason}")]
    InvalidValue {
        local_type: String,
        local_field: String,
        reason: String,
    },
}

/// Apply `payload` onto `row` using the binding's field map.
///
/// Returns the per-field failures; successfully mapped fields are written into `row`
/// regardless of failures elsewhere.
pub fn apply_inbound(
    binding: &ContentBinding,
    payload: &Fields,
    row: &mut Fields,
) -> Vec<FieldMappingError> {
    let mut errors = Vec::new();

    for mapping in binding.inbound_mappings(payload) {
        if binding.is_excluded(&mapping.local_field) {
            continue;
        }

        let Some(value) = payload.get(&mapping.remote_field) else {
            if mapping.required {
                errors.push(FieldMappingError::MissingRemoteField {
                    content_type: binding.content_type().to_string(),
                    remote_field: mapping.remote_field.clone(),
                });
            }
            continue;
        };

        if !binding.has_local_field(&mapping.local_field) {
            errors.push(FieldMappingError::UnknownLocalField {
                local_type: binding.local_type().to_string(),
                local_field: mapping.local_field.clone(),
            });
            continue;
        }

        let previous = row.insert(mapping.local_field.clone(), value.clone());
        if let Err(reason) = binding.validate_row(row) {
            match previous {
                Some(prev) => row.insert(mapping.local_field.clone(), prev),
                None => row.remove(&mapping.local_field),
            };
            errors.push(FieldMappingError::InvalidValue {
                local_type: binding.local_type().to_string(),
                local_field: mapping.local_field.clone(),
                reason,
            });
        }
    }

    errors
}

/// Build the outgoing remote payload for a local row.
///
/// Excluded fields are dropped. A required field missing from the row is an error.
pub fn build_outbound(binding: &ContentBinding, row: &Fields) -> Result<Fields> {
    let mut out = Fields::new();
    for mapping in binding.outbound_mappings() {
        if binding.is_excluded(&mapping.local_field) {
            continue;
        }
        match row.get(&mapping.local_field) {
            Some(value) => {
                out.insert(mapping.remote_field.clone(), value.clone());
            }
            None if mapping.required => {
                return Err(Error::InvalidInput(format!(
                    "{} row has no value for required field '{}'",
                    binding.local_type(),
                    mapping.local_field
                )));
            }
            None => {
                out.insert(mapping.remote_field.clone(), Value::Null);
            }
        }
    }
    Ok(out)
}

/// Parse a remote link value of the form `"Type:key"`.
pub fn parse_link(value: &Value) -> Option<(&str, &str)> {
    let s = value.as_str()?;
    let (content_type, key) = s.split_once(':')?;
    let (content_type, key) = (content_type.trim(), key.trim());
    if content_type.is_empty() || key.is_empty() {
        return None;
    }
    Some((content_type, key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ContentDescriptor, ContentModel, RegistryBuilder};
    use serde_json::json;

    #[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
    struct Page {
        title: String,
        views: i64,
        slug: String,
    }

    impl ContentModel for Page {
        const LOCAL_TYPE: &'static str = "test.page";

        fn descriptor() -> ContentDescriptor {
            ContentDescriptor::new("Page")
                .field(FieldMapping::new("headline", "title").required())
                .field(FieldMapping::new("view_count", "views"))
                .field(FieldMapping::new("slug", "slug"))
                .exclude("slug")
        }
    }

    fn page_binding() -> ContentBinding {
        let registry = RegistryBuilder::new().register::<Page>().build().unwrap();
        registry.by_content_type("Page").unwrap().clone()
    }

    fn obj(v: serde_json::Value) -> Fields {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn inbound_applies_valid_fields_and_reports_the_rest() {
        let binding = page_binding();
        let mut row = binding.blank_row();
        let payload = obj(json!({"view_count": "many", "slug": "ignored"}));

        let errors = apply_inbound(&binding, &payload, &mut row);

        assert_eq!(errors.len(), 2);
        assert!(matches!(
            errors[0],
            FieldMappingError::MissingRemoteField { ref remote_field, .. } if remote_field == "headline"
        ));
        assert!(matches!(
            errors[1],
            FieldMappingError::InvalidValue { ref local_field, .. } if local_field == "views"
        ));
        assert_eq!(row.get("views"), Some(&json!(0)));
        assert_eq!(row.get("slug"), Some(&json!("")));
    }

    #[test]
    fn inbound_partial_success_keeps_good_fields() {
        let binding = page_binding();
        let mut row = binding.blank_row();
        let payload = obj(json!({"headline": "Hello", "view_count": 12}));

        let errors = apply_inbound(&binding, &payload, &mut row);

        assert!(errors.is_empty());
        assert_eq!(row.get("title"), Some(&json!("Hello")));
        assert_eq!(row.get("views"), Some(&json!(12)));
    }

    #[test]
    fn outbound_drops_excluded_and_renames() {
        let binding = page_binding();
        let row = obj(json!({"title": "Hi", "views": 3, "slug": "hi"}));
        let out = build_outbound(&binding, &row).unwrap();
        assert_eq!(out, obj(json!({"headline": "Hi", "view_count": 3})));
    }

    #[test]
    fn outbound_requires_required_fields() {
        let binding = page_binding();
        let row = obj(json!({"views": 3}));
        assert!(matches!(
            build_outbound(&binding, &row),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn parses_links() {
        assert_eq!(parse_link(&json!("Author:k1")), Some(("Author", "k1")));
        assert_eq!(parse_link(&json!("nocolon")), None);
        assert_eq!(parse_link(&json!(":k1")), None);
        assert_eq!(parse_link(&json!(7)), None);
    }
}
