//! Admin settings records
//!
//! Typed views of the JSON records returned by the admin settings endpoints.

pub mod audit_log;
pub mod email_template;
pub mod feature_toggle;

pub use audit_log::{AuditActor, AuditLogEntry, AuditLogQuery, AuditResource};
pub use email_template::{EmailTemplate, TemplatePreview, TemplateVariable, UpdateEmailTemplateRequest};
pub use feature_toggle::{FeatureToggle, UpdateFeatureToggleRequest};

use serde::{Deserialize, Deserializer};

/// Identifiers arrive as strings from some endpoints and as numbers from others.
#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrNumber {
    String(String),
    Int(i64),
    Float(f64),
}

impl From<StringOrNumber> for String {
    fn from(value: StringOrNumber) -> Self {
        match value {
            StringOrNumber::String(s) => s,
            StringOrNumber::Int(n) => n.to_string(),
            StringOrNumber::Float(n) => n.to_string(),
        }
    }
}

pub(crate) fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    StringOrNumber::deserialize(deserializer).map(String::from)
}

pub(crate) fn opt_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<StringOrNumber>::deserialize(deserializer).map(|v| v.map(String::from))
}
