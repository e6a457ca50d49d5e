use std::collections::BTreeMap;

use thiserror::Error;

/// Failures surfaced by the Jira accessor.
///
/// Every HTTP outcome is classified into one of these variants before it
/// leaves the client, so callers never see raw status codes.
#[derive(Error, Debug)]
pub enum JiraError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Permission denied: {0}")]
    Permission(String),

    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        /// Per-field messages keyed by field id, as returned by Jira.
        field_errors: BTreeMap<String, String>,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Rate limited or unavailable after {attempts} attempts (last status: {})", .status.map_or_else(|| "network error".to_string(), |s| s.to_string()))]
    RateLimited { attempts: u32, status: Option<u16> },

    #[error("Unexpected API response (status {status}): {message}")]
    UnexpectedStatus { status: u16, message: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl JiraError {
    /// Whether this failure should end a whole run rather than a single sync.
    pub fn is_fatal(&self) -> bool {
        matches!(self, JiraError::Auth(_) | JiraError::Config(_))
    }
}

pub type Result<T> = std::result::Result<T, JiraError>;

/// Why an idea could not be paired with an engineering issue.
#[derive(Error, Debug)]
pub enum LinkError {
    #[error("No '{link_type}' link found on {idea}")]
    NoLinkFound { idea: String, link_type: String },

    #[error("{idea} has {} linked issues ({}); picked {chosen}", .candidates.len(), .candidates.join(", "))]
    AmbiguousLink {
        idea: String,
        chosen: String,
        candidates: Vec<String>,
    },

    #[error(transparent)]
    Jira(#[from] JiraError),
}
