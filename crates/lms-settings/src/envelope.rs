//! Response envelope normalization
//!
//! The admin endpoints wrap their payloads inconsistently. Collections have been
//! observed as a bare array, `{items}`, `{toggles}`, `{data: [...]}` and
//! `{data: {items | content | toggles}}`, with page metadata under several
//! names. Every collection is normalized into a [`Page`].
//!
//! Shapes are tried in a fixed order and the first structural match wins. A
//! payload matching none of them degrades to an empty page rather than an
//! error, and individual records that fail to parse are dropped.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::domain::{AuditLogEntry, EmailTemplate, FeatureToggle};

/// Page size assumed when the backend does not report one
pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// Canonical collection page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Zero-based page index
    pub page: u32,
    pub page_size: u32,
    pub total: Option<u64>,
    pub has_next: bool,
}

impl<T> Default for Page<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            page: 0,
            page_size: DEFAULT_PAGE_SIZE,
            total: None,
            has_next: false,
        }
    }
}

impl<T> Page<T> {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Index of the following page, if the backend reported one.
    pub fn next_page(&self) -> Option<u32> {
        if self.has_next {
            self.page.checked_add(1)
        } else {
            None
        }
    }

    pub fn map<U, F: FnMut(T) -> U>(self, f: F) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            page: self.page,
            page_size: self.page_size,
            total: self.total,
            has_next: self.has_next,
        }
    }
}

// ============================================================================
// Accepted Shapes
// ============================================================================

/// Pagination fields, under any of the names the backend uses
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageMeta {
    #[serde(default, alias = "number", alias = "pageNumber")]
    page: Option<u32>,

    #[serde(default, alias = "size", alias = "limit")]
    page_size: Option<u32>,

    #[serde(default, alias = "totalElements", alias = "totalItems")]
    total: Option<u64>,

    #[serde(default)]
    has_next: Option<bool>,

    /// Spring-style "this is the final page" flag
    #[serde(default)]
    last: Option<bool>,
}

#[derive(Deserialize)]
struct ItemsEnvelope {
    items: Vec<Value>,
    #[serde(flatten)]
    meta: PageMeta,
}

#[derive(Deserialize)]
struct ContentEnvelope {
    content: Vec<Value>,
    #[serde(flatten)]
    meta: PageMeta,
}

#[derive(Deserialize)]
struct TogglesEnvelope {
    toggles: Vec<Value>,
}

/// Contents of a `data` field
#[derive(Deserialize)]
#[serde(untagged)]
enum DataShape {
    List(Vec<Value>),
    Items(ItemsEnvelope),
    Content(ContentEnvelope),
    Toggles(TogglesEnvelope),
}

#[derive(Deserialize)]
struct DataEnvelope {
    data: DataShape,
}

/// Top-level collection shapes, in match priority order
#[derive(Deserialize)]
#[serde(untagged)]
enum CollectionShape {
    Bare(Vec<Value>),
    Items(ItemsEnvelope),
    Toggles(TogglesEnvelope),
    Data(DataEnvelope),
}

/// Single records arrive bare or as `{data: T}`
#[derive(Deserialize)]
#[serde(untagged)]
enum EntityShape<T> {
    Bare(T),
    Data { data: T },
}

/// Collection records with their page metadata, not yet parsed
#[derive(Debug, Clone, Default)]
pub struct RawCollection {
    pub items: Vec<Value>,
    meta: PageMeta,
}

impl RawCollection {
    fn bare(items: Vec<Value>) -> Self {
        Self {
            items,
            meta: PageMeta::default(),
        }
    }

    fn into_page<T>(self, items: Vec<T>) -> Page<T> {
        let meta = self.meta;
        let page = meta.page.unwrap_or(0);
        let page_size = meta.page_size.filter(|s| *s > 0).unwrap_or(DEFAULT_PAGE_SIZE);
        let total = meta.total;

        let has_next = meta
            .has_next
            .or(meta.last.map(|last| !last))
            .or(total.map(|t| (u64::from(page) + 1) * u64::from(page_size) < t))
            .unwrap_or(false);

        Page {
            items,
            page,
            page_size,
            total,
            has_next,
        }
    }
}

impl From<CollectionShape> for RawCollection {
    fn from(shape: CollectionShape) -> Self {
        match shape {
            CollectionShape::Bare(items) => RawCollection::bare(items),
            CollectionShape::Items(env) => RawCollection {
                items: env.items,
                meta: env.meta,
            },
            CollectionShape::Toggles(env) => RawCollection::bare(env.toggles),
            CollectionShape::Data(env) => match env.data {
                DataShape::List(items) => RawCollection::bare(items),
                DataShape::Items(env) => RawCollection {
                    items: env.items,
                    meta: env.meta,
                },
                DataShape::Content(env) => RawCollection {
                    items: env.content,
                    meta: env.meta,
                },
                DataShape::Toggles(env) => RawCollection::bare(env.toggles),
            },
        }
    }
}

// ============================================================================
// Normalization
// ============================================================================

/// Match a payload against the accepted collection shapes.
pub fn normalize_collection(payload: &Value) -> Option<RawCollection> {
    CollectionShape::deserialize(payload).ok().map(RawCollection::from)
}

fn parse_items<T: DeserializeOwned>(raw: Vec<Value>, kind: &'static str) -> Vec<T> {
    raw.into_iter()
        .enumerate()
        .filter_map(|(index, value)| match serde_json::from_value(value) {
            Ok(item) => Some(item),
            Err(e) => {
                warn!(kind, index, error = %e, "Dropping malformed record");
                None
            }
        })
        .collect()
}

/// Normalize a collection payload into a page of `T`.
pub fn unwrap_page<T: DeserializeOwned>(payload: &Value, kind: &'static str) -> Page<T> {
    match normalize_collection(payload) {
        Some(mut raw) => {
            let items = parse_items(std::mem::take(&mut raw.items), kind);
            raw.into_page(items)
        }
        None => {
            warn!(kind, "Unrecognized collection payload, using empty page");
            Page::default()
        }
    }
}

/// Normalize a collection payload into a list of `T`, ignoring pagination.
pub fn unwrap_list<T: DeserializeOwned>(payload: &Value, kind: &'static str) -> Vec<T> {
    unwrap_page(payload, kind).items
}

/// Extract a single record, bare or wrapped in `{data}`.
pub fn unwrap_entity<T: DeserializeOwned>(payload: &Value) -> Option<T> {
    match EntityShape::<T>::deserialize(payload) {
        Ok(EntityShape::Bare(entity)) | Ok(EntityShape::Data { data: entity }) => Some(entity),
        Err(_) => None,
    }
}

pub fn unwrap_audit_log_payload(payload: &Value) -> Page<AuditLogEntry> {
    unwrap_page(payload, "audit_log")
}

pub fn unwrap_feature_toggles(payload: &Value) -> Vec<FeatureToggle> {
    unwrap_list(payload, "feature_toggle")
}

pub fn unwrap_email_templates(payload: &Value) -> Vec<EmailTemplate> {
    unwrap_list(payload, "email_template")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn audit_items() -> Value {
        json!([
            {"id": "1", "event": "login", "timestamp": "2024-06-01T10:00:00Z"},
            {"id": "2", "event": "logout", "timestamp": "2024-06-01T11:00:00Z"}
        ])
    }

    #[test]
    fn test_audit_log_shapes_are_equivalent() {
        let items = audit_items();

        let flat = json!({"items": items, "page": 1, "pageSize": 2, "total": 6, "hasNext": true});
        let nested_items = json!({
            "data": {"items": items, "page": 1, "pageSize": 2, "total": 6, "hasNext": true},
            "message": "ok",
            "status": 200
        });
        let nested_content = json!({
            "data": {"content": items, "number": 1, "size": 2, "totalElements": 6, "last": false}
        });

        let expected = unwrap_audit_log_payload(&flat);
        assert_eq!(expected.len(), 2);
        assert_eq!(expected.page, 1);
        assert_eq!(expected.page_size, 2);
        assert_eq!(expected.total, Some(6));
        assert!(expected.has_next);

        assert_eq!(unwrap_audit_log_payload(&nested_items), expected);
        assert_eq!(unwrap_audit_log_payload(&nested_content), expected);
    }

    #[test]
    fn test_bare_array_uses_default_meta() {
        let page = unwrap_audit_log_payload(&audit_items());
        assert_eq!(page.len(), 2);
        assert_eq!(page.page, 0);
        assert_eq!(page.page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(page.total, None);
        assert!(!page.has_next);
    }

    #[test]
    fn test_unrecognized_payload_yields_empty_page() {
        let expected = Page::<AuditLogEntry> {
            items: vec![],
            page: 0,
            page_size: 50,
            total: None,
            has_next: false,
        };

        for payload in [
            json!({"results": []}),
            json!("nope"),
            json!(null),
            json!({"data": {"rows": []}}),
            json!({"items": "not-a-list"}),
        ] {
            assert_eq!(unwrap_audit_log_payload(&payload), expected, "payload: {}", payload);
        }
    }

    #[test]
    fn test_has_next_derived_from_total() {
        let page = unwrap_audit_log_payload(&json!({"items": audit_items(), "page": 0, "pageSize": 2, "total": 3}));
        assert!(page.has_next);
        assert_eq!(page.next_page(), Some(1));

        let page = unwrap_audit_log_payload(&json!({"items": audit_items(), "page": 1, "pageSize": 2, "total": 3}));
        assert!(!page.has_next);
        assert_eq!(page.next_page(), None);
    }

    #[test]
    fn test_malformed_records_are_dropped() {
        let page = unwrap_audit_log_payload(&json!({
            "items": [
                {"id": "1", "event": "login", "timestamp": "2024-06-01T10:00:00Z"},
                {"id": "2", "event": "broken"}
            ]
        }));
        assert_eq!(page.len(), 1);
        assert_eq!(page.items[0].id, "1");
    }

    #[test]
    fn test_feature_toggle_shapes() {
        let toggles = json!([{"name": "a", "enabled": true}, {"name": "b", "enabled": false}]);

        for payload in [
            toggles.clone(),
            json!({"items": toggles}),
            json!({"toggles": toggles}),
            json!({"data": toggles}),
            json!({"data": {"items": toggles}}),
            json!({"data": {"content": toggles}}),
            json!({"data": {"toggles": toggles}}),
        ] {
            let parsed = unwrap_feature_toggles(&payload);
            assert_eq!(parsed.len(), 2, "payload: {}", payload);
            assert_eq!(parsed[0].name, "a");
            assert!(!parsed[1].enabled);
        }

        assert!(unwrap_feature_toggles(&json!({"features": toggles})).is_empty());
    }

    #[test]
    fn test_email_template_shapes() {
        let templates = json!([{"id": 1, "name": "Welcome", "subject": "Hi", "body": "Hello"}]);

        assert_eq!(unwrap_email_templates(&templates).len(), 1);
        assert_eq!(unwrap_email_templates(&json!({"data": {"content": templates}})).len(), 1);
        assert!(unwrap_email_templates(&json!({"message": "ok"})).is_empty());
    }

    #[test]
    fn test_unwrap_entity() {
        let bare = json!({"name": "a", "enabled": true});
        let wrapped = json!({"data": {"name": "a", "enabled": true}, "message": "updated"});

        let expected = Some(FeatureToggle::new("a", true));
        assert_eq!(unwrap_entity::<FeatureToggle>(&bare), expected);
        assert_eq!(unwrap_entity::<FeatureToggle>(&wrapped), expected);
        assert_eq!(unwrap_entity::<FeatureToggle>(&json!({"message": "ok"})), None);
        assert_eq!(unwrap_entity::<FeatureToggle>(&Value::Null), None);
    }

    #[test]
    fn test_next_page_at_index_limit() {
        let page = unwrap_audit_log_payload(&json!({"items": [], "page": u32::MAX, "hasNext": true}));
        assert!(page.has_next);
        assert_eq!(page.next_page(), None);
    }

    #[test]
    fn test_zero_page_size_falls_back_to_default() {
        let page = unwrap_audit_log_payload(&json!({"items": [], "pageSize": 0}));
        assert_eq!(page.page_size, DEFAULT_PAGE_SIZE);
    }
}
