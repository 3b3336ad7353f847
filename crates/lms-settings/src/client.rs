//! Admin Settings HTTP Client
//!
//! Resource adapters for the admin settings endpoints. Every call issues one
//! request, unwraps the response envelope and parses the records. Non-2xx
//! responses fail with [`SettingsError::Status`]; nothing is retried.

use async_trait::async_trait;
use lms_config::ApiConfig;
use reqwest::{RequestBuilder, StatusCode};
use serde_json::Value;
use tracing::{debug, warn};
use validator::Validate;

use crate::domain::{
    AuditLogEntry, AuditLogQuery, EmailTemplate, FeatureToggle, UpdateEmailTemplateRequest,
    UpdateFeatureToggleRequest,
};
use crate::envelope::{self, Page};
use crate::error::{Result, SettingsError};

pub const FEATURES_PATH: &str = "/api/v1/admin/features";
pub const AUDIT_LOGS_PATH: &str = "/api/v1/admin/audit-logs";
pub const TEMPLATES_PATH: &str = "/api/v1/admin/notifications/templates";

/// Operations the query layer needs from the backend
#[async_trait]
pub trait SettingsApi: Send + Sync {
    async fn list_feature_toggles(&self) -> Result<Vec<FeatureToggle>>;

    /// `Ok(None)` when the toggle does not exist
    async fn get_feature_toggle(&self, name: &str) -> Result<Option<FeatureToggle>>;

    async fn update_feature_toggle(&self, name: &str, enabled: bool) -> Result<FeatureToggle>;

    async fn fetch_audit_logs(&self, query: &AuditLogQuery) -> Result<Page<AuditLogEntry>>;

    async fn list_email_templates(&self) -> Result<Vec<EmailTemplate>>;

    /// `Ok(None)` when the template does not exist
    async fn get_email_template(&self, id: &str) -> Result<Option<EmailTemplate>>;

    async fn update_email_template(
        &self,
        id: &str,
        request: &UpdateEmailTemplateRequest,
    ) -> Result<EmailTemplate>;
}

/// reqwest-backed [`SettingsApi`]
#[derive(Debug, Clone)]
pub struct AdminSettingsClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl AdminSettingsClient {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| SettingsError::configuration(e.to_string()))?;

        Ok(Self::with_client(client, &config.base_url, config.token.clone()))
    }

    /// Use a preconfigured reqwest client.
    pub fn with_client(client: reqwest::Client, base_url: &str, token: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn resource_url(&self, path: &str, id: &str) -> String {
        format!("{}{}/{}", self.base_url, path, urlencoding::encode(id))
    }

    fn add_auth(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Send a request and return the JSON body.
    ///
    /// An empty or non-JSON success body is returned as `Value::Null`.
    async fn execute(&self, request: RequestBuilder, operation: &'static str) -> Result<Value> {
        let response = self.add_auth(request).send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(operation, status = status.as_u16(), "Admin settings request failed");
            return Err(SettingsError::status(status.as_u16(), error_message(status, &body)));
        }

        let bytes = response.bytes().await?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }

        match serde_json::from_slice(&bytes) {
            Ok(value) => Ok(value),
            Err(e) => {
                warn!(operation, error = %e, "Response body is not JSON");
                Ok(Value::Null)
            }
        }
    }

    /// Like [`Self::execute`], mapping 404 to `None`.
    async fn execute_optional(
        &self,
        request: RequestBuilder,
        operation: &'static str,
    ) -> Result<Option<Value>> {
        match self.execute(request, operation).await {
            Ok(value) => Ok(Some(value)),
            Err(SettingsError::Status { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Pull a readable message out of an error body (`{message}` envelope, raw text,
/// or the status reason).
fn error_message(status: StatusCode, body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        for key in ["message", "error", "detail"] {
            if let Some(message) = value.get(key).and_then(Value::as_str) {
                return message.to_string();
            }
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("Request failed")
            .to_string()
    } else {
        trimmed.to_string()
    }
}

fn require_key(kind: &str, key: &str) -> Result<()> {
    if key.trim().is_empty() {
        return Err(SettingsError::validation(format!("{} must not be empty", kind)));
    }
    Ok(())
}

#[async_trait]
impl SettingsApi for AdminSettingsClient {
    async fn list_feature_toggles(&self) -> Result<Vec<FeatureToggle>> {
        let url = self.url(FEATURES_PATH);
        debug!(url = %url, "Listing feature toggles");

        let payload = self.execute(self.client.get(&url), "list_feature_toggles").await?;
        Ok(envelope::unwrap_feature_toggles(&payload))
    }

    async fn get_feature_toggle(&self, name: &str) -> Result<Option<FeatureToggle>> {
        require_key("Feature name", name)?;
        let url = self.resource_url(FEATURES_PATH, name);
        debug!(url = %url, "Fetching feature toggle");

        let payload = self
            .execute_optional(self.client.get(&url), "get_feature_toggle")
            .await?;
        Ok(payload.and_then(|p| envelope::unwrap_entity(&p)))
    }

    async fn update_feature_toggle(&self, name: &str, enabled: bool) -> Result<FeatureToggle> {
        require_key("Feature name", name)?;
        let url = self.resource_url(FEATURES_PATH, name);
        debug!(url = %url, enabled, "Updating feature toggle");

        let body = UpdateFeatureToggleRequest { enabled };
        let payload = self
            .execute(self.client.put(&url).json(&body), "update_feature_toggle")
            .await?;

        Ok(envelope::unwrap_entity(&payload).unwrap_or_else(|| {
            warn!(name, "Toggle update response has no record, using requested state");
            FeatureToggle::new(name, enabled)
        }))
    }

    async fn fetch_audit_logs(&self, query: &AuditLogQuery) -> Result<Page<AuditLogEntry>> {
        let url = self.url(AUDIT_LOGS_PATH);
        let params = query.to_params();
        debug!(url = %url, params = ?params.as_slice(), "Fetching audit logs");

        let payload = self
            .execute(self.client.get(&url).query(params.as_slice()), "fetch_audit_logs")
            .await?;
        Ok(envelope::unwrap_audit_log_payload(&payload))
    }

    async fn list_email_templates(&self) -> Result<Vec<EmailTemplate>> {
        let url = self.url(TEMPLATES_PATH);
        debug!(url = %url, "Listing email templates");

        let payload = self.execute(self.client.get(&url), "list_email_templates").await?;
        Ok(envelope::unwrap_email_templates(&payload))
    }

    async fn get_email_template(&self, id: &str) -> Result<Option<EmailTemplate>> {
        require_key("Template id", id)?;
        let url = self.resource_url(TEMPLATES_PATH, id);
        debug!(url = %url, "Fetching email template");

        let payload = self
            .execute_optional(self.client.get(&url), "get_email_template")
            .await?;
        Ok(payload.and_then(|p| envelope::unwrap_entity(&p)))
    }

    async fn update_email_template(
        &self,
        id: &str,
        request: &UpdateEmailTemplateRequest,
    ) -> Result<EmailTemplate> {
        require_key("Template id", id)?;
        request.validate()?;

        let url = self.resource_url(TEMPLATES_PATH, id);
        debug!(url = %url, "Updating email template");

        let payload = self
            .execute(self.client.put(&url).json(request), "update_email_template")
            .await?;

        Ok(envelope::unwrap_entity(&payload).unwrap_or_else(|| {
            warn!(id, "Template update response has no record, using submitted fields");
            EmailTemplate::from_update(id, request)
        }))
    }
}
