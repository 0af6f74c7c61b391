use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

pub const SETUP_MESSAGE: &str = "Please add a valid NEWS_API_KEY environment variable. \
Get your free API key from https://newsapi.org";

pub const INVALID_KEY_MESSAGE: &str = "Your News API key is invalid. Please get a valid API key \
from https://newsapi.org and update your NEWS_API_KEY environment variable.";

/// Failures of a single upstream news request
#[derive(Debug, Error)]
pub enum NewsError {
    #[error("News API key not configured")]
    MissingApiKey,

    #[error("Invalid API key")]
    InvalidApiKey { details: Value },

    #[error("News API error: {} - {}", .status.as_u16(), .body)]
    Upstream { status: StatusCode, body: Value },

    #[error("{0}")]
    Request(#[from] reqwest::Error),

    #[error("Failed to decode upstream response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl NewsError {
    /// Whether the failure comes from the credential, which retrying cannot fix
    pub fn is_credential(&self) -> bool {
        matches!(self, NewsError::MissingApiKey | NewsError::InvalidApiKey { .. })
    }

    /// Remediation text shown alongside credential failures
    pub fn remediation(&self) -> Option<&'static str> {
        match self {
            NewsError::MissingApiKey => Some(SETUP_MESSAGE),
            NewsError::InvalidApiKey { .. } => Some(INVALID_KEY_MESSAGE),
            _ => None,
        }
    }
}
