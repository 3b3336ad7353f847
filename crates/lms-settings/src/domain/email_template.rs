//! Email Template
//!
//! Notification email templates with `{{variable}}` placeholders. Each template
//! carries the variables it expects together with sample values, which are used
//! to render a preview before saving.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::string_or_number;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateVariable {
    #[serde(alias = "name")]
    pub key: String,

    #[serde(default, alias = "sample", alias = "example", skip_serializing_if = "Option::is_none")]
    pub sample_value: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl TemplateVariable {
    pub fn new(key: impl Into<String>, sample_value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            sample_value: Some(sample_value.into()),
            description: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailTemplate {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,

    pub name: String,

    pub subject: String,

    /// HTML or plain text body
    #[serde(alias = "content")]
    pub body: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    #[serde(default)]
    pub variables: Vec<TemplateVariable>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<String>,
}

/// Subject and body with sample values substituted
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplatePreview {
    pub subject: String,
    pub body: String,
    /// Placeholders that have no declared variable, in order of first appearance
    pub unresolved: Vec<String>,
}

impl EmailTemplate {
    /// Render subject and body with each variable's sample value.
    ///
    /// Variables without a sample render as `[key]`. Placeholders with no
    /// declared variable are left untouched and reported in `unresolved`.
    pub fn render_preview(&self) -> TemplatePreview {
        let mut unresolved = Vec::new();
        let subject = substitute(&self.subject, &self.variables, &mut unresolved);
        let body = substitute(&self.body, &self.variables, &mut unresolved);
        TemplatePreview {
            subject,
            body,
            unresolved,
        }
    }

    /// Apply an update request on top of this template.
    pub fn apply_update(&mut self, request: &UpdateEmailTemplateRequest) {
        if let Some(name) = &request.name {
            self.name = name.clone();
        }
        self.subject = request.subject.clone();
        self.body = request.body.clone();
        if request.channel.is_some() {
            self.channel = request.channel.clone();
        }
        if request.category.is_some() {
            self.category = request.category.clone();
        }
        if let Some(variables) = &request.variables {
            self.variables = variables.clone();
        }
    }

    /// Build a template from an update request alone.
    pub fn from_update(id: impl Into<String>, request: &UpdateEmailTemplateRequest) -> Self {
        let mut template = Self {
            id: id.into(),
            name: String::new(),
            subject: String::new(),
            body: String::new(),
            channel: None,
            category: None,
            variables: Vec::new(),
            updated_at: None,
            updated_by: None,
        };
        template.apply_update(request);
        template
    }
}

fn substitute(text: &str, variables: &[TemplateVariable], unresolved: &mut Vec<String>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find("{{") {
        let Some(len) = rest[start + 2..].find("}}") else {
            break;
        };
        let end = start + 2 + len;
        let key = rest[start + 2..end].trim();

        out.push_str(&rest[..start]);
        match variables.iter().find(|v| v.key == key) {
            Some(var) => match &var.sample_value {
                Some(sample) => out.push_str(sample),
                None => {
                    out.push('[');
                    out.push_str(key);
                    out.push(']');
                }
            },
            None => {
                if !unresolved.iter().any(|k| k == key) {
                    unresolved.push(key.to_string());
                }
                out.push_str(&rest[start..end + 2]);
            }
        }
        rest = &rest[end + 2..];
    }

    out.push_str(rest);
    out
}

/// Body of `PUT /api/v1/admin/notifications/templates/{id}`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEmailTemplateRequest {
    #[validate(length(min = 1, message = "Name must not be empty"))]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[validate(length(min = 1, message = "Subject is required"))]
    pub subject: String,

    #[validate(length(min = 1, message = "Body is required"))]
    pub body: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<Vec<TemplateVariable>>,
}

impl UpdateEmailTemplateRequest {
    pub fn new(subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            body: body.into(),
            ..Default::default()
        }
    }
}

impl From<&EmailTemplate> for UpdateEmailTemplateRequest {
    fn from(template: &EmailTemplate) -> Self {
        Self {
            name: Some(template.name.clone()),
            subject: template.subject.clone(),
            body: template.body.clone(),
            channel: template.channel.clone(),
            category: template.category.clone(),
            variables: Some(template.variables.clone()),
        }
    }
}
