//! Error taxonomy for client operations.

use reqwest::{header::InvalidHeaderValue, Method, StatusCode};

use crate::config::ConfigError;

pub type Result<T, E = ClientError> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ClientError {
    #[error("{method} {url} - request failed: {source}")]
    Transport {
        method: Method,
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{method} {url} - expected a temporary redirect, got status '{status}'")]
    RedirectExpected {
        method: Method,
        url: String,
        status: StatusCode,
    },

    #[error("{method} {url} - malformed redirect: {reason}")]
    RedirectMalformed {
        method: Method,
        url: String,
        reason: String,
    },

    #[error("{method} {url} - unexpected status '{status}'")]
    UnexpectedStatus {
        method: Method,
        url: String,
        status: StatusCode,
    },

    #[error(
        "range read of blob '{blob_id}' returned incorrect amount of bytes: expected {expected}, got {actual}"
    )]
    ShortRead {
        blob_id: String,
        expected: u64,
        actual: u64,
    },

    #[error("failed to serialize {context}: {source}")]
    Serialization {
        context: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("{method} {url} - failed to deserialize response: {source}")]
    InvalidResponse {
        method: Method,
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("blob '{blob_id}' not found")]
    NotFound { blob_id: String },

    #[error("invalid range for read request: {start}-{end}")]
    InvalidRange { start: u64, end: u64 },

    #[error("invalid url '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("invalid value for header '{name}': {source}")]
    InvalidHeader {
        name: &'static str,
        #[source]
        source: InvalidHeaderValue,
    },

    #[error("failed to build http client: {source}")]
    HttpClient {
        #[source]
        source: reqwest::Error,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ClientError {
    /// The HTTP status behind the failure, when the cluster answered at all.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ClientError::RedirectExpected { status, .. }
            | ClientError::UnexpectedStatus { status, .. } => Some(*status),
            ClientError::Transport { source, .. } => source.status(),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound { .. })
            || self.status() == Some(StatusCode::NOT_FOUND)
    }
}
