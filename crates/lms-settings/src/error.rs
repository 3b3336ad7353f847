//! Settings Client Error Types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Connection error: {0}")]
    Connection(#[from] reqwest::Error),

    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Transport or decoding failure of a fetch shared with concurrent callers
    #[error("{message}")]
    Shared { message: String },
}

impl SettingsError {
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation { message: message.into() }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }

    /// Copy of this error for callers that waited on the same request.
    ///
    /// Status, validation and configuration errors are reproduced exactly;
    /// transport and decoding errors keep their message.
    pub fn share(&self) -> Self {
        match self {
            Self::Status { status, message } => Self::status(*status, message.clone()),
            Self::Validation { message } => Self::validation(message.clone()),
            Self::Configuration { message } => Self::configuration(message.clone()),
            other => Self::Shared {
                message: other.to_string(),
            },
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }

    /// HTTP status code, when the failure came from a non-2xx response
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Connection(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

impl From<validator::ValidationErrors> for SettingsError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut messages: Vec<String> = errors
            .field_errors()
            .iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| match &e.message {
                    Some(message) => message.to_string(),
                    None => format!("{} is invalid", field),
                })
            })
            .collect();
        messages.sort();
        Self::validation(messages.join("; "))
    }
}

pub type Result<T> = std::result::Result<T, SettingsError>;
