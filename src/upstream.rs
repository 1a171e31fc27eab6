//! CDN fetches, including the fallback for repositories over the CDN size limit.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, StatusCode, header};
use tracing::{info, warn};

use crate::classify::{ClassifiedRequest, ResourceKind};
use crate::config::{GithubConfig, UpstreamConfig};
use crate::error::ProxyError;
use crate::listing::DirectoryLister;
use crate::render::{self, DirectoryView};
use crate::store::ConfigStore;

const UA: &str = concat!("cdn-warden/", env!("CARGO_PKG_VERSION"));
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// A fully-read upstream response.
#[derive(Debug, Clone)]
pub struct FetchedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl FetchedResponse {
    pub fn content_type(&self) -> &str {
        self.headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or(DEFAULT_CONTENT_TYPE)
    }
}

/// Outbound GET. The only suspension point of the request pipeline.
#[async_trait]
pub trait HttpFetch: Send + Sync {
    /// Transport failures are errors; any HTTP status is a successful fetch.
    async fn get(&self, url: &str, headers: HeaderMap) -> Result<FetchedResponse>;
}

/// reqwest-backed [`HttpFetch`].
#[derive(Clone)]
pub struct ReqwestFetch {
    client: reqwest::Client,
}

impl ReqwestFetch {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(UA)
            .timeout(timeout)
            .build()
            .context("building upstream http client")?;
        info!(timeout_secs = timeout.as_secs(), "upstream client initialized");
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpFetch for ReqwestFetch {
    async fn get(&self, url: &str, headers: HeaderMap) -> Result<FetchedResponse> {
        let response = self
            .client
            .get(url)
            .headers(headers)
            .send()
            .await
            .with_context(|| format!("requesting {url}"))?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .with_context(|| format!("reading body of {url}"))?;
        Ok(FetchedResponse {
            status,
            headers,
            body,
        })
    }
}

/// CDN base URL per resource family.
#[derive(Debug, Clone)]
pub struct UpstreamTargets {
    npm: String,
    github: String,
    wordpress: String,
}

impl UpstreamTargets {
    pub fn from_config(config: &UpstreamConfig) -> Self {
        let base = |url: &url::Url| url.as_str().trim_end_matches('/').to_string();
        Self {
            npm: base(&config.npm_url),
            github: base(&config.github_url),
            wordpress: base(&config.wordpress_url),
        }
    }

    pub fn url_for(&self, request: &ClassifiedRequest) -> String {
        let base = match request.kind {
            ResourceKind::Npm => &self.npm,
            ResourceKind::GithubRepo => &self.github,
            ResourceKind::WordpressPlugin | ResourceKind::WordpressTheme => &self.wordpress,
        };
        format!("{base}{}", request.forward_path)
    }
}

#[derive(Debug, Clone)]
pub struct FetchedAsset {
    pub body: Bytes,
    pub content_type: String,
}

/// What the fetcher hands back for a whitelisted request.
#[derive(Debug, Clone)]
pub enum Delivery {
    /// Upstream content, to be cached and served verbatim.
    Asset(FetchedAsset),
    /// Rendered directory page produced by the size-limit fallback.
    Listing(String),
}

/// Location inside a GitHub repository, as derived from a forwarding path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoLocation {
    pub owner: String,
    pub repo: String,
    /// Repository segment as requested, `@version` included.
    pub repo_ref: String,
    /// Path below the repository root with empty segments removed, still percent-encoded.
    pub subpath: String,
}

impl RepoLocation {
    pub fn from_forward_path(identifier: &str, forward_path: &str) -> Option<Self> {
        let (owner, repo) = identifier.split_once('/')?;
        let path = forward_path.split(['?', '#']).next().unwrap_or_default();
        let mut segments = path.split('/').filter(|s| !s.is_empty());
        segments.next()?;
        let repo_ref = segments.next()?.to_string();
        let subpath = segments.collect::<Vec<_>>().join("/");
        Some(Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
            repo_ref,
            subpath,
        })
    }
}

/// The CDN's "repository too large" rejection.
///
/// The marker is the CDN's wording, not a documented contract, so it is configurable.
pub fn is_size_limit_rejection(
    kind: ResourceKind,
    status: StatusCode,
    body: &[u8],
    marker: &str,
) -> bool {
    kind == ResourceKind::GithubRepo
        && status == StatusCode::FORBIDDEN
        && String::from_utf8_lossy(body).contains(marker)
}

pub struct UpstreamFetcher {
    http: Arc<dyn HttpFetch>,
    targets: UpstreamTargets,
    size_limit_marker: String,
    lister: DirectoryLister,
}

impl UpstreamFetcher {
    pub fn new(
        http: Arc<dyn HttpFetch>,
        upstream: &UpstreamConfig,
        github: &GithubConfig,
    ) -> Self {
        Self {
            lister: DirectoryLister::new(http.clone(), github.api_url.clone()),
            http,
            targets: UpstreamTargets::from_config(upstream),
            size_limit_marker: github.size_limit_marker.clone(),
        }
    }

    pub fn lister(&self) -> &DirectoryLister {
        &self.lister
    }

    /// GET the request from the CDN. No retries: one failure is terminal.
    pub async fn fetch(
        &self,
        request: &ClassifiedRequest,
        store: &ConfigStore,
    ) -> Result<Delivery, ProxyError> {
        let url = self.targets.url_for(request);

        let response = match self.http.get(&url, HeaderMap::new()).await {
            Ok(response) => response,
            Err(err) => {
                let message = format!("{err:#}");
                warn!(url = %url, error = %message, "upstream transport failure");
                return Err(ProxyError::upstream(url, None, message));
            }
        };

        if response.status.is_success() {
            return Ok(Delivery::Asset(FetchedAsset {
                content_type: response.content_type().to_string(),
                body: response.body,
            }));
        }

        warn!(url = %url, status = %response.status, "upstream returned error status");
        let failure = ProxyError::upstream(
            url.clone(),
            Some(response.status),
            format!("upstream returned {}", response.status),
        );

        if !is_size_limit_rejection(
            request.kind,
            response.status,
            &response.body,
            &self.size_limit_marker,
        ) {
            return Err(failure);
        }

        info!(url = %url, identifier = %request.identifier, "repository over CDN size limit, listing via content API");
        match self.directory_fallback(request, store).await {
            Ok(html) => Ok(Delivery::Listing(html)),
            Err(err) => {
                warn!(url = %url, error = %err, "directory listing fallback failed");
                Err(failure)
            }
        }
    }

    async fn directory_fallback(
        &self,
        request: &ClassifiedRequest,
        store: &ConfigStore,
    ) -> Result<String, ProxyError> {
        let location = RepoLocation::from_forward_path(&request.identifier, &request.forward_path)
            .ok_or_else(|| {
                ProxyError::upstream(
                    request.forward_path.clone(),
                    None,
                    "cannot derive repository location",
                )
            })?;
        let token = store.github_token();
        let entries = self
            .lister
            .list(
                &location.owner,
                &location.repo,
                &location.subpath,
                token.as_deref(),
                &store.github_api_cache_config(),
            )
            .await?;

        Ok(render::directory_page(&DirectoryView {
            owner: &location.owner,
            repo_ref: &location.repo_ref,
            subpath: &location.subpath,
            entries: &entries,
        }))
    }
}
