//! In-process stand-in for the outbound HTTP seam.

use std::collections::HashMap;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, HeaderValue, StatusCode, header};
use parking_lot::Mutex;

use crate::upstream::{FetchedResponse, HttpFetch};

/// Canned responses keyed by full URL. Unknown URLs fail as transport errors.
#[derive(Default)]
pub struct FakeHttp {
    routes: Mutex<HashMap<String, FetchedResponse>>,
    calls: Mutex<Vec<(String, HeaderMap)>>,
}

impl FakeHttp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, url: &str, status: StatusCode, content_type: &str, body: impl Into<Bytes>) {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_str(content_type).unwrap(),
        );
        self.respond_with_headers(url, status, headers, body);
    }

    pub fn respond_with_headers(
        &self,
        url: &str,
        status: StatusCode,
        headers: HeaderMap,
        body: impl Into<Bytes>,
    ) {
        self.routes.lock().insert(
            url.to_string(),
            FetchedResponse {
                status,
                headers,
                body: body.into(),
            },
        );
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().iter().map(|(url, _)| url.clone()).collect()
    }

    pub fn call_count(&self, url: &str) -> usize {
        self.calls.lock().iter().filter(|(u, _)| u == url).count()
    }

    pub fn last_headers(&self) -> Option<HeaderMap> {
        self.calls.lock().last().map(|(_, headers)| headers.clone())
    }
}

#[async_trait]
impl HttpFetch for FakeHttp {
    async fn get(&self, url: &str, headers: HeaderMap) -> Result<FetchedResponse> {
        self.calls.lock().push((url.to_string(), headers));
        self.routes
            .lock()
            .get(url)
            .cloned()
            .ok_or_else(|| anyhow!("connection refused: {url}"))
    }
}
