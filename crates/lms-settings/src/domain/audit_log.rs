//! Audit Log Entry
//!
//! Read-only records of significant actions, served page by page.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use lms_common::{QueryParams, UserDomain};
use serde::{Deserialize, Serialize};

use super::{opt_string_or_number, string_or_number};

/// Who performed the action
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditActor {
    #[serde(default, deserialize_with = "opt_string_or_number", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<UserDomain>,
}

/// What the action was performed on
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditResource {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,

    #[serde(default, deserialize_with = "opt_string_or_number", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// Audit log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogEntry {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,

    /// Event name (e.g. "feature.toggled", "course.published")
    #[serde(alias = "action", alias = "eventType")]
    pub event: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<AuditActor>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<AuditResource>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    #[serde(alias = "createdAt", alias = "occurredAt")]
    pub timestamp: DateTime<Utc>,

    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl AuditLogEntry {
    pub fn new(id: impl Into<String>, event: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            event: event.into(),
            actor: None,
            resource: None,
            status: None,
            timestamp,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_actor(mut self, actor: AuditActor) -> Self {
        self.actor = Some(actor);
        self
    }

    pub fn with_resource(mut self, resource: AuditResource) -> Self {
        self.resource = Some(resource);
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    /// Display label for the actor: name, then email, then id.
    pub fn actor_label(&self) -> Option<&str> {
        let actor = self.actor.as_ref()?;
        actor
            .name
            .as_deref()
            .or(actor.email.as_deref())
            .or(actor.id.as_deref())
    }
}

/// Filters for `GET /api/v1/admin/audit-logs`
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct AuditLogQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub search: Option<String>,
    pub event: Option<String>,
    pub actor_id: Option<String>,
    pub resource_type: Option<String>,
    pub status: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl AuditLogQuery {
    pub fn with_page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = Some(page_size);
        self
    }

    pub fn with_event(mut self, event: impl Into<String>) -> Self {
        self.event = Some(event.into());
        self
    }

    /// The same filters without pagination, used to group feed pages.
    pub fn filters(&self) -> Self {
        Self {
            page: None,
            page_size: None,
            ..self.clone()
        }
    }

    pub fn to_params(&self) -> QueryParams {
        let mut params = QueryParams::new();
        params
            .push_opt("page", self.page)
            .push_opt("pageSize", self.page_size)
            .push_opt("search", self.search.as_deref())
            .push_opt("event", self.event.as_deref())
            .push_opt("actorId", self.actor_id.as_deref())
            .push_opt("resourceType", self.resource_type.as_deref())
            .push_opt("status", self.status.as_deref())
            .push_datetime("from", self.from)
            .push_datetime("to", self.to);
        params
    }
}
