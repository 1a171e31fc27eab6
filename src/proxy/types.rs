use std::time::Instant;

use bytes::Bytes;
use rama::http::{Body, Method, Request};

/// How a request was satisfied, reported in `x-cache` and the request log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// Not a cacheable resource request (health, homepage, 405).
    Pass,
    Hit,
    Miss,
    /// Fetched from the CDN with the response cache disabled.
    Bypass,
    /// Rendered by the size-limit directory fallback.
    Listing,
    Error,
}

impl std::fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheStatus::Pass => write!(f, "pass"),
            CacheStatus::Hit => write!(f, "hit"),
            CacheStatus::Miss => write!(f, "miss"),
            CacheStatus::Bypass => write!(f, "bypass"),
            CacheStatus::Listing => write!(f, "listing"),
            CacheStatus::Error => write!(f, "error"),
        }
    }
}

/// Request context for tracking request lifecycle
pub struct RequestContext {
    pub start: Instant,
    pub method: Method,
    pub path: String,
    pub cache: CacheStatus,
}

impl RequestContext {
    pub fn from_request(req: &Request<Body>) -> Self {
        Self {
            start: Instant::now(),
            method: req.method().clone(),
            path: req
                .uri()
                .path_and_query()
                .map(|pq| pq.as_str().to_string())
                .unwrap_or_else(|| req.uri().path().to_string()),
            cache: CacheStatus::Pass,
        }
    }

    pub fn summary(&self) -> String {
        format!("{} {}", self.method.as_str(), self.path)
    }
}

/// A successfully resolved resource request.
#[derive(Debug, Clone)]
pub struct ProxyReply {
    pub body: Bytes,
    pub content_type: String,
    pub cache: CacheStatus,
    /// `max-age` advertised to clients, when the content came through the response cache.
    pub max_age: Option<u64>,
}
