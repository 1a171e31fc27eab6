use http::StatusCode;
use thiserror::Error;

use crate::classify::{ClassifyError, ResourceKind};

/// Terminal outcomes of the proxy pipeline other than a served response.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("invalid request path: {0}")]
    BadRequest(#[from] ClassifyError),
    #[error("{kind} resource '{identifier}' is not whitelisted")]
    Forbidden {
        kind: ResourceKind,
        identifier: String,
    },
    #[error("upstream request to {url} failed: {message}")]
    Upstream {
        url: String,
        status: Option<StatusCode>,
        message: String,
    },
}

impl ProxyError {
    pub fn upstream(url: impl Into<String>, status: Option<StatusCode>, message: impl Into<String>) -> Self {
        Self::Upstream {
            url: url.into(),
            status,
            message: message.into(),
        }
    }

    /// Status code returned to the client.
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ProxyError::Forbidden { .. } => StatusCode::FORBIDDEN,
            ProxyError::Upstream { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Failures of the content-listing API during the size-limit fallback.
#[derive(Debug, Error)]
pub enum ListingError {
    #[error("content API request to {url} failed: {message}")]
    Transport { url: String, message: String },
    #[error("content API returned {status} for {url}")]
    Status { url: String, status: StatusCode },
    #[error("content API response for {url} could not be decoded: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("{path} is a file, not a directory")]
    NotADirectory { path: String },
}

impl From<ListingError> for ProxyError {
    fn from(err: ListingError) -> Self {
        match err {
            ListingError::Transport { url, message } => ProxyError::upstream(url, None, message),
            ListingError::Status { url, status } => {
                ProxyError::upstream(url, Some(status), "content API error")
            }
            ListingError::Decode { url, source } => {
                ProxyError::upstream(url, None, format!("undecodable content API response: {source}"))
            }
            ListingError::NotADirectory { path } => {
                let message = format!("{path} is a file, not a directory");
                ProxyError::upstream(path, None, message)
            }
        }
    }
}
