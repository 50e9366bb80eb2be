//! Error taxonomy shared by the token manager, the config layer and the extractor.

use thiserror::Error;

/// Result type for library operations.
pub type Result<T> = std::result::Result<T, RevosError>;

/// Errors surfaced by the library.
///
/// The type is `Clone` because the outcome of one refresh attempt is handed to
/// every caller that waited on it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RevosError {
    /// Transient refresh failure below the fallback threshold. Callers may retry.
    #[error("token refresh failed: {0}")]
    Token(String),

    /// Credentials rejected, or no usable token is available.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Downstream HTTP or network failure.
    #[error("{}", api_message(.status, .message))]
    Api {
        status: Option<u16>,
        message: String,
    },

    /// Invalid or unreadable configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Prompt rendering or model output parsing failed.
    #[error("extraction failed: {0}")]
    Extraction(String),
}

fn api_message(status: &Option<u16>, message: &str) -> String {
    match status {
        Some(status) => format!("API request failed with status {status}: {message}"),
        None => format!("API request failed: {message}"),
    }
}

impl RevosError {
    pub fn token(message: impl Into<String>) -> Self {
        Self::Token(message.into())
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication(message.into())
    }

    pub fn api(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn extraction(message: impl Into<String>) -> Self {
        Self::Extraction(message.into())
    }

    /// Network failures, timeouts and 5xx answers are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Api { status: None, .. } => true,
            Self::Api {
                status: Some(status),
                ..
            } => *status >= 500,
            _ => false,
        }
    }

    /// Short label used for metrics and events.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Token(_) => "token",
            Self::Authentication(_) => "authentication",
            Self::Api { .. } => "api",
            Self::Config(_) => "config",
            Self::Extraction(_) => "extraction",
        }
    }
}

impl From<reqwest::Error> for RevosError {
    fn from(err: reqwest::Error) -> Self {
        let status = err.status().map(|s| s.as_u16());
        let message = if err.is_timeout() {
            format!("request timed out: {err}")
        } else {
            err.to_string()
        };
        Self::Api { status, message }
    }
}
