//! Admin Settings Service
//!
//! Cached queries and mutations over a [`SettingsApi`]. Reads go through the
//! [`QueryCache`] with per-resource staleness windows; mutations keep the cache
//! consistent with the server afterwards.

use std::sync::Arc;

use lms_config::CacheConfig;
use tracing::{debug, info, warn};
use validator::Validate;

use crate::cache::{QueryCache, QueryKey, QueryScope};
use crate::client::SettingsApi;
use crate::domain::feature_toggle::apply_toggle;
use crate::domain::{
    AuditLogEntry, AuditLogQuery, EmailTemplate, FeatureToggle, UpdateEmailTemplateRequest,
};
use crate::envelope::Page;
use crate::error::Result;

pub struct AdminSettings {
    api: Arc<dyn SettingsApi>,
    cache: QueryCache,
    config: CacheConfig,
}

impl AdminSettings {
    pub fn new(api: Arc<dyn SettingsApi>, config: CacheConfig) -> Self {
        Self {
            api,
            cache: QueryCache::new(),
            config,
        }
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    // ========================================================================
    // Feature Toggles
    // ========================================================================

    pub async fn feature_toggles(&self) -> Result<Vec<FeatureToggle>> {
        self.cache
            .fetch(QueryKey::FeatureToggles, self.config.feature_toggles_stale(), || {
                self.api.list_feature_toggles()
            })
            .await
    }

    pub async fn feature_toggle(&self, name: &str) -> Result<Option<FeatureToggle>> {
        self.cache
            .fetch(
                QueryKey::FeatureToggle(name.to_string()),
                self.config.feature_toggles_stale(),
                || self.api.get_feature_toggle(name),
            )
            .await
    }

    /// Toggle a feature with an optimistic cache update.
    ///
    /// The cached toggle list shows the new state immediately. If the server
    /// rejects the change the previous list is restored. Either way the toggle
    /// queries are invalidated afterwards so the next read resyncs.
    pub async fn update_feature_toggle(&self, name: &str, enabled: bool) -> Result<FeatureToggle> {
        let key = QueryKey::FeatureToggles;

        self.cache.cancel_queries(&key);
        let previous = self.cache.get_query_data::<Vec<FeatureToggle>>(&key);

        if let Some(previous) = &previous {
            let mut optimistic = previous.clone();
            if apply_toggle(&mut optimistic, name, enabled) {
                self.cache.set_query_data(key.clone(), optimistic);
            }
        }

        let result = self.api.update_feature_toggle(name, enabled).await;

        match &result {
            Ok(toggle) => {
                info!(name = %toggle.name, enabled = toggle.enabled, "Feature toggle updated");
            }
            Err(e) => {
                warn!(name, enabled, error = %e, "Feature toggle update failed, rolling back");
                if let Some(previous) = previous {
                    self.cache.set_query_data(key, previous);
                }
            }
        }

        self.cache.invalidate_scope(QueryScope::FeatureToggles);
        result
    }

    // ========================================================================
    // Audit Logs
    // ========================================================================

    pub async fn audit_logs(&self, query: &AuditLogQuery) -> Result<Page<AuditLogEntry>> {
        self.cache
            .fetch(
                QueryKey::AuditLogs(query.clone()),
                self.config.audit_logs_stale(),
                || self.api.fetch_audit_logs(query),
            )
            .await
    }

    /// Page-by-page view over audit logs matching `query`.
    ///
    /// Starts at `query.page` (default 0) with `query.page_size` (default from
    /// the cache config).
    pub fn audit_log_feed(&self, query: AuditLogQuery) -> AuditLogFeed<'_> {
        let start_page = query.page.unwrap_or(0);
        let page_size = query
            .page_size
            .unwrap_or(self.config.audit_log_page_size);

        AuditLogFeed {
            settings: self,
            filters: query.filters(),
            start_page,
            page_size,
            next_page: Some(start_page),
            pages: Vec::new(),
        }
    }

    // ========================================================================
    // Email Templates
    // ========================================================================

    pub async fn email_templates(&self) -> Result<Vec<EmailTemplate>> {
        self.cache
            .fetch(QueryKey::EmailTemplates, self.config.email_templates_stale(), || {
                self.api.list_email_templates()
            })
            .await
    }

    pub async fn email_template(&self, id: &str) -> Result<Option<EmailTemplate>> {
        self.cache
            .fetch(
                QueryKey::EmailTemplate(id.to_string()),
                self.config.email_templates_stale(),
                || self.api.get_email_template(id),
            )
            .await
    }

    /// Validate and persist a template, then refresh the cached copies.
    pub async fn update_email_template(
        &self,
        id: &str,
        request: &UpdateEmailTemplateRequest,
    ) -> Result<EmailTemplate> {
        request.validate()?;

        let updated = self.api.update_email_template(id, request).await?;
        info!(id, "Email template updated");

        self.cache
            .set_query_data(QueryKey::EmailTemplate(id.to_string()), Some(updated.clone()));

        if let Some(mut templates) = self
            .cache
            .get_query_data::<Vec<EmailTemplate>>(&QueryKey::EmailTemplates)
        {
            if let Some(slot) = templates.iter_mut().find(|t| t.id == id) {
                *slot = updated.clone();
                self.cache.set_query_data(QueryKey::EmailTemplates, templates);
            }
        }

        self.cache.invalidate_scope(QueryScope::EmailTemplates);
        Ok(updated)
    }

    /// Warm the toggle, template and first audit log caches concurrently.
    pub async fn prefetch(&self) -> Result<()> {
        let first_page = AuditLogQuery::default()
            .with_page(0)
            .with_page_size(self.config.audit_log_page_size);

        futures::try_join!(
            self.feature_toggles(),
            self.email_templates(),
            self.audit_logs(&first_page),
        )?;
        Ok(())
    }
}

/// Accumulated audit log pages for one set of filters
pub struct AuditLogFeed<'a> {
    settings: &'a AdminSettings,
    filters: AuditLogQuery,
    start_page: u32,
    page_size: u32,
    /// Page to request next; `None` once the backend reports the end
    next_page: Option<u32>,
    pages: Vec<Page<AuditLogEntry>>,
}

impl<'a> AuditLogFeed<'a> {
    /// Fetch the page after the last one loaded (or the first page).
    ///
    /// Pages are numbered by what the feed requested, not by what the backend
    /// echoes back. Returns `Ok(None)` once the backend reports no further pages.
    pub async fn fetch_next_page(&mut self) -> Result<Option<&Page<AuditLogEntry>>> {
        let requested = match self.next_page {
            Some(requested) => requested,
            None => return Ok(None),
        };

        let query = self
            .filters
            .clone()
            .with_page(requested)
            .with_page_size(self.page_size);
        let mut page = self.settings.audit_logs(&query).await?;

        if page.page != requested {
            debug!(requested, reported = page.page, "Audit log page number differs from request");
            page.page = requested;
        }
        self.next_page = if page.has_next {
            requested.checked_add(1)
        } else {
            None
        };

        self.pages.push(page);
        Ok(self.pages.last())
    }

    /// Load pages until the end or `max_pages` total pages are loaded.
    pub async fn fetch_all(&mut self, max_pages: usize) -> Result<usize> {
        while self.pages.len() < max_pages && self.has_next_page() {
            if self.fetch_next_page().await?.is_none() {
                break;
            }
        }
        Ok(self.pages.len())
    }

    pub fn has_next_page(&self) -> bool {
        self.next_page.is_some()
    }

    pub fn pages(&self) -> &[Page<AuditLogEntry>] {
        &self.pages
    }

    pub fn entries(&self) -> impl Iterator<Item = &AuditLogEntry> + '_ {
        self.pages.iter().flat_map(|page| page.items.iter())
    }

    /// Total reported by the most recent page, if any
    pub fn total(&self) -> Option<u64> {
        self.pages.last().and_then(|page| page.total)
    }

    /// Drop loaded pages; the next fetch starts over.
    pub fn reset(&mut self) {
        self.pages.clear();
        self.next_page = Some(self.start_page);
    }
}
