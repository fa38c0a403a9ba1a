//! Error types for the Vast marketplace client.

use thiserror::Error;

/// Errors that can occur when querying the Vast marketplace.
#[derive(Debug, Error)]
pub enum VastError {
    /// No API key configured.
    #[error("VAST_API_KEY is not set")]
    MissingApiKey,

    /// API request failed with a non-retryable status.
    #[error("Vast API error (status={status_code}): {message}")]
    Api {
        /// HTTP status code.
        status_code: u16,
        /// Leading part of the response body.
        message: String,
    },

    /// Rate limited or server unavailable on every attempt.
    #[error("Vast API rate-limited or unavailable (status={status_code})")]
    Unavailable {
        /// Status of the last attempt.
        status_code: u16,
    },

    /// Network error.
    #[error("network error contacting Vast: {0}")]
    Network(String),

    /// Request timeout.
    #[error("request timeout: {0}")]
    Timeout(String),

    /// A 200 response that is not JSON.
    #[error("unexpected response content-type {content_type:?} from Vast; body starts with {snippet:?}")]
    UnexpectedContentType {
        content_type: String,
        snippet: String,
    },

    /// A JSON content type whose body does not parse.
    #[error("invalid JSON from Vast: {message}; body starts with {snippet:?}")]
    InvalidJson { message: String, snippet: String },

    /// Parsed body has no list of offers.
    #[error("unexpected response structure from Vast (no list of offers)")]
    MissingOfferList,

    /// Configuration error.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl VastError {
    /// Creates an API error from status code and body.
    pub fn api(status_code: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status_code,
            message: message.into(),
        }
    }

    /// Creates an unavailable error for an exhausted retry loop.
    pub fn unavailable(status_code: u16) -> Self {
        Self::Unavailable { status_code }
    }

    /// HTTP status associated with the error, if any.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status_code, .. } | Self::Unavailable { status_code } => {
                Some(*status_code)
            }
            _ => None,
        }
    }

    /// Returns true if the error indicates the request should be retried later.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) | Self::Unavailable { .. } => true,
            Self::Api { status_code, .. } => *status_code >= 500 || *status_code == 429,
            _ => false,
        }
    }

    /// Returns the suggested retry delay in seconds, if applicable.
    #[must_use]
    pub fn retry_delay_secs(&self) -> Option<u64> {
        match self {
            Self::Network(_) | Self::Timeout(_) => Some(1),
            Self::Unavailable { .. } => Some(60),
            Self::Api { status_code, .. } if *status_code >= 500 => Some(2),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for VastError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_connect() {
            Self::Network(format!("connection failed: {err}"))
        } else {
            Self::Network(err.to_string())
        }
    }
}

/// Result type alias for Vast operations.
pub type Result<T> = std::result::Result<T, VastError>;
