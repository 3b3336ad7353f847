//! LMS Admin Configuration
//!
//! TOML configuration for the admin settings client:
//! - `[api]` backend location, credentials and timeouts
//! - `[cache]` staleness windows for the query layer
//! - `[logging]` level and output format
//!
//! Values from the file can be overridden with `LMS_*` environment variables.

use std::path::Path;
use std::time::Duration;

use lms_common::LogFormat;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

pub const ENV_API_BASE_URL: &str = "LMS_API_BASE_URL";
pub const ENV_API_TOKEN: &str = "LMS_API_TOKEN";
pub const ENV_LOG_LEVEL: &str = "LMS_LOG_LEVEL";
pub const ENV_LOG_FORMAT: &str = "LMS_LOG_FORMAT";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

impl ConfigError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid { message: message.into() }
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Backend API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    /// Optional bearer token sent as `Authorization: Bearer <token>`
    pub token: Option<String>,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            token: None,
            connect_timeout_secs: 10,
            request_timeout_secs: 30,
        }
    }
}

impl ApiConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Staleness windows for cached queries
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub feature_toggles_stale_secs: u64,
    pub audit_logs_stale_secs: u64,
    pub email_templates_stale_secs: u64,
    /// Page size requested by audit log feeds
    pub audit_log_page_size: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            feature_toggles_stale_secs: 30,
            audit_logs_stale_secs: 30,
            email_templates_stale_secs: 60,
            audit_log_page_size: 50,
        }
    }
}

impl CacheConfig {
    pub fn feature_toggles_stale(&self) -> Duration {
        Duration::from_secs(self.feature_toggles_stale_secs)
    }

    pub fn audit_logs_stale(&self) -> Duration {
        Duration::from_secs(self.audit_logs_stale_secs)
    }

    pub fn email_templates_stale(&self) -> Duration {
        Duration::from_secs(self.email_templates_stale_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub cache: CacheConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Parse configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load from a TOML file. A missing file yields the defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;

        info!(path = %path.display(), "Loaded configuration file");
        Self::from_toml(&content)
    }

    /// Load from an optional file, apply environment overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `LMS_*` overrides using the given variable lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_API_BASE_URL) {
            self.api.base_url = url;
        }
        if let Some(token) = lookup(ENV_API_TOKEN) {
            self.api.token = Some(token).filter(|t| !t.trim().is_empty());
        }
        if let Some(level) = lookup(ENV_LOG_LEVEL) {
            self.logging.level = level;
        }
        if let Some(format) = lookup(ENV_LOG_FORMAT) {
            self.logging.format = format
                .parse::<LogFormat>()
                .map_err(|e| ConfigError::invalid(e.to_string()))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let url = self.api.base_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::invalid(format!(
                "api.base_url must be an http(s) URL, got '{}'",
                self.api.base_url
            )));
        }
        if self.api.connect_timeout_secs == 0 || self.api.request_timeout_secs == 0 {
            return Err(ConfigError::invalid("api timeouts must be greater than zero"));
        }
        if self.cache.audit_log_page_size == 0 {
            return Err(ConfigError::invalid("cache.audit_log_page_size must be greater than zero"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.api.base_url, "http://localhost:8080");
        assert_eq!(config.cache.feature_toggles_stale(), Duration::from_secs(30));
        assert_eq!(config.cache.email_templates_stale(), Duration::from_secs(60));
        assert_eq!(config.cache.audit_log_page_size, 50);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [api]
            base_url = "https://lms.example.com"
            token = "secret"

            [logging]
            format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(config.api.base_url, "https://lms.example.com");
        assert_eq!(config.api.token.as_deref(), Some("secret"));
        assert_eq!(config.api.request_timeout_secs, 30);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[cache]\naudit_logs_stale_secs = 5").unwrap();

        let config = AppConfig::from_file(file.path()).unwrap();
        assert_eq!(config.cache.audit_logs_stale(), Duration::from_secs(5));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::from_file(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.api.base_url, "http://localhost:8080");
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            (ENV_API_BASE_URL, "https://override.example.com"),
            (ENV_API_TOKEN, "tok"),
            (ENV_LOG_FORMAT, "json"),
        ]);

        let mut config = AppConfig::default();
        config
            .apply_overrides(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.api.base_url, "https://override.example.com");
        assert_eq!(config.api.token.as_deref(), Some("tok"));
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_invalid_log_format_override() {
        let mut config = AppConfig::default();
        let result = config.apply_overrides(|key| {
            (key == ENV_LOG_FORMAT).then(|| "yaml".to_string())
        });
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_validate_rejects_bad_url_and_timeouts() {
        let mut config = AppConfig::default();
        config.api.base_url = "localhost:8080".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.api.request_timeout_secs = 0;
        assert!(config.validate().is_err());
    }
}
