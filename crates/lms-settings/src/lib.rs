//! LMS Admin Settings
//!
//! Client-side data layer for the LMS admin settings endpoints:
//! - Envelope normalization for inconsistently wrapped collection responses
//! - REST adapters for feature toggles, audit logs and email templates
//! - Query cache with staleness windows and in-flight de-duplication
//! - Optimistic feature toggle updates with rollback
//! - Paged audit log feeds

pub mod cache;
pub mod client;
pub mod domain;
pub mod envelope;
pub mod error;
pub mod service;

pub use cache::{QueryCache, QueryKey, QueryScope};
pub use client::{AdminSettingsClient, SettingsApi};
pub use domain::*;
pub use envelope::{unwrap_audit_log_payload, Page, DEFAULT_PAGE_SIZE};
pub use error::{Result, SettingsError};
pub use service::{AdminSettings, AuditLogFeed};
