use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

// ============================================================================
// User Domains
// ============================================================================

/// Role concept used across the LMS backend.
///
/// Unknown values are preserved as [`UserDomain::Other`] so that a backend
/// adding a new role does not break deserialization of otherwise valid records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum UserDomain {
    Student,
    Instructor,
    OrganisationUser,
    CourseCreator,
    Other(String),
}

impl UserDomain {
    pub fn as_str(&self) -> &str {
        match self {
            UserDomain::Student => "student",
            UserDomain::Instructor => "instructor",
            UserDomain::OrganisationUser => "organisation_user",
            UserDomain::CourseCreator => "course_creator",
            UserDomain::Other(other) => other,
        }
    }
}

impl From<String> for UserDomain {
    fn from(value: String) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "student" => UserDomain::Student,
            "instructor" => UserDomain::Instructor,
            "organisation_user" | "organization_user" => UserDomain::OrganisationUser,
            "course_creator" => UserDomain::CourseCreator,
            _ => UserDomain::Other(value),
        }
    }
}

impl From<UserDomain> for String {
    fn from(domain: UserDomain) -> Self {
        domain.as_str().to_string()
    }
}

impl fmt::Display for UserDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Query Parameters
// ============================================================================

/// Ordered query string builder that drops absent and blank values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    pairs: Vec<(String, String)>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a value; blank strings are skipped.
    pub fn push(&mut self, key: &str, value: impl ToString) -> &mut Self {
        let value = value.to_string();
        if !value.trim().is_empty() {
            self.pairs.push((key.to_string(), value));
        }
        self
    }

    /// Add an optional value; `None` and blank strings are skipped.
    pub fn push_opt<V: ToString>(&mut self, key: &str, value: Option<V>) -> &mut Self {
        if let Some(value) = value {
            self.push(key, value);
        }
        self
    }

    /// Add an optional timestamp in RFC 3339 with second precision.
    pub fn push_datetime(&mut self, key: &str, value: Option<DateTime<Utc>>) -> &mut Self {
        self.push_opt(key, value.map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true)))
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn as_slice(&self) -> &[(String, String)] {
        &self.pairs
    }
}

// ============================================================================
// Logging
// ============================================================================

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(CommonError::InvalidLogFormat(other.to_string())),
        }
    }
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `level` when set. Logs are written to stderr
/// so that command output on stdout stays machine readable.
pub fn init_tracing(level: &str, format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| CommonError::Logging(e.to_string()))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let result = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };

    result.map_err(|e| CommonError::Logging(e.to_string()))
}

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum CommonError {
    #[error("Invalid log format: {0}")]
    InvalidLogFormat(String),

    #[error("Logging error: {0}")]
    Logging(String),
}

pub type Result<T> = std::result::Result<T, CommonError>;
