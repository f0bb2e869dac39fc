//! Error types for the collection engine with context and classification

use thiserror::Error;

use crate::provider::Provider;

/// Errors produced by the engine. These are classified here and recovered
/// into typed per-item outcomes by the resolver; only the controller decides
/// what is surfaced to a user.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Request reached the remote service but came back with a non-success status
    #[error("request to '{url}' failed with status {status}: {reason}")]
    Transport {
        url: String,
        status: u16,
        reason: String,
    },

    /// Request never produced a usable response (connect error, timeout, ...)
    #[error("request to '{url}' failed")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Response body was not the JSON shape the provider promised
    #[error("malformed response while {context}: {reason}")]
    Parse { context: String, reason: String },

    /// A provider could not construct a request URL for an operation.
    /// This fails the whole batch for that provider, before any request is sent.
    #[error("{provider} cannot build a request for {operation}")]
    RequestConstruction {
        provider: Provider,
        operation: &'static str,
    },

    /// Operation was cancelled; distinct from failure and never reported as an error
    #[error("operation aborted")]
    Aborted,

    #[error("invalid configuration: {message}")]
    Configuration { message: String },
}

pub type Result<T> = std::result::Result<T, EngineError>;

impl EngineError {
    /// Provider status code, when the error carries one
    pub fn status(&self) -> Option<u16> {
        match self {
            EngineError::Transport { status, .. } => Some(*status),
            EngineError::Http { source, .. } => source.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            EngineError::Transport { .. } => "transport",
            EngineError::Http { .. } => "http",
            EngineError::Parse { .. } => "parse",
            EngineError::RequestConstruction { .. } => "request_construction",
            EngineError::Aborted => "aborted",
            EngineError::Configuration { .. } => "configuration",
        }
    }

    /// True for cancellation, which must not be reported error-style
    pub fn is_abort(&self) -> bool {
        matches!(self, EngineError::Aborted)
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(error: reqwest::Error) -> Self {
        let url = error
            .url()
            .map(|u| u.to_string())
            .unwrap_or_else(|| "<unknown>".to_string());
        EngineError::Http { url, source: error }
    }
}
