//! Feature Toggle
//!
//! Named on/off switches for platform features. The name is the primary key.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureToggle {
    #[serde(alias = "key")]
    pub name: String,

    #[serde(alias = "isEnabled")]
    pub enabled: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<String>,
}

impl FeatureToggle {
    pub fn new(name: impl Into<String>, enabled: bool) -> Self {
        Self {
            name: name.into(),
            enabled,
            description: None,
            category: None,
            updated_at: None,
            updated_by: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }
}

/// Body of `PUT /api/v1/admin/features/{name}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateFeatureToggleRequest {
    pub enabled: bool,
}

/// Set `enabled` on the toggle named `name`, returning whether it was found.
pub fn apply_toggle(toggles: &mut [FeatureToggle], name: &str, enabled: bool) -> bool {
    match toggles.iter_mut().find(|t| t.name == name) {
        Some(toggle) => {
            toggle.enabled = enabled;
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_minimal() {
        let toggle: FeatureToggle =
            serde_json::from_str(r#"{"name": "course_reviews", "enabled": true}"#).unwrap();
        assert_eq!(toggle, FeatureToggle::new("course_reviews", true));
    }

    #[test]
    fn test_deserialize_aliases_and_audit_fields() {
        let toggle: FeatureToggle = serde_json::from_str(
            r#"{
                "key": "beta_dashboard",
                "isEnabled": false,
                "category": "ui",
                "updatedAt": "2024-05-01T08:00:00Z",
                "updatedBy": "admin@lms.test"
            }"#,
        )
        .unwrap();

        assert_eq!(toggle.name, "beta_dashboard");
        assert!(!toggle.enabled);
        assert_eq!(toggle.category.as_deref(), Some("ui"));
        assert!(toggle.updated_at.is_some());
        assert_eq!(toggle.updated_by.as_deref(), Some("admin@lms.test"));
    }

    #[test]
    fn test_apply_toggle() {
        let mut toggles = vec![
            FeatureToggle::new("a", false),
            FeatureToggle::new("b", true),
        ];

        assert!(apply_toggle(&mut toggles, "a", true));
        assert!(toggles[0].enabled);
        assert!(!apply_toggle(&mut toggles, "missing", true));
    }
}
