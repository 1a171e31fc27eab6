//! Directory listings from the source-control content API.
//!
//! Used when the CDN refuses to serve a repository because it is over its size
//! limit. Results are held in a short-lived cache keyed by
//! `(owner, repo, subpath)`, independent from the response cache.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use http::{HeaderMap, HeaderValue, StatusCode, header};
use parking_lot::RwLock;
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use crate::config::CacheSettings;
use crate::error::ListingError;
use crate::upstream::HttpFetch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Dir,
    /// Symlinks and submodules are listed like files.
    #[serde(other)]
    Other,
}

impl EntryKind {
    pub fn is_dir(&self) -> bool {
        matches!(self, EntryKind::Dir)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub name: String,
    pub kind: EntryKind,
    /// Byte size, files only.
    pub size: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ContentItem {
    name: String,
    #[serde(rename = "type")]
    kind: EntryKind,
    #[serde(default)]
    size: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ContentsResponse {
    Directory(Vec<ContentItem>),
    File(serde_json::Value),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ListingKey {
    owner: String,
    repo: String,
    subpath: String,
}

#[derive(Debug, Clone)]
struct ListingCacheEntry {
    contents: Arc<Vec<DirectoryEntry>>,
    inserted_at: Instant,
}

impl ListingCacheEntry {
    fn is_fresh_at(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.inserted_at) < ttl
    }
}

pub struct DirectoryLister {
    http: Arc<dyn HttpFetch>,
    api_base: Url,
    cache: RwLock<HashMap<ListingKey, ListingCacheEntry>>,
}

impl DirectoryLister {
    pub fn new(http: Arc<dyn HttpFetch>, api_base: Url) -> Self {
        Self {
            http,
            api_base,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// List `subpath` of `owner/repo`, directories first.
    ///
    /// `subpath` is `/`-joined without leading or trailing slashes; empty means the repository root.
    pub async fn list(
        &self,
        owner: &str,
        repo: &str,
        subpath: &str,
        token: Option<&str>,
        settings: &CacheSettings,
    ) -> Result<Arc<Vec<DirectoryEntry>>, ListingError> {
        self.list_at(owner, repo, subpath, token, settings, Instant::now())
            .await
    }

    /// [`list`](Self::list) with an explicit clock, used for both the freshness check and insertion.
    pub async fn list_at(
        &self,
        owner: &str,
        repo: &str,
        subpath: &str,
        token: Option<&str>,
        settings: &CacheSettings,
        now: Instant,
    ) -> Result<Arc<Vec<DirectoryEntry>>, ListingError> {
        let key = ListingKey {
            owner: owner.to_string(),
            repo: repo.to_string(),
            subpath: subpath.to_string(),
        };

        if settings.enabled
            && let Some(entry) = self.cache.read().get(&key)
            && entry.is_fresh_at(now, settings.ttl)
        {
            debug!(owner, repo, subpath, "directory listing cache hit");
            return Ok(entry.contents.clone());
        }

        let contents = Arc::new(self.fetch(owner, repo, subpath, token).await?);

        if settings.enabled {
            self.cache.write().insert(
                key,
                ListingCacheEntry {
                    contents: contents.clone(),
                    inserted_at: now,
                },
            );
        }

        Ok(contents)
    }

    /// Drop every cached listing. Returns how many were removed.
    pub fn clear(&self) -> usize {
        let mut cache = self.cache.write();
        let removed = cache.len();
        cache.clear();
        removed
    }

    pub fn cached_listings(&self) -> usize {
        self.cache.read().len()
    }

    pub fn contents_url(&self, owner: &str, repo: &str, subpath: &str) -> String {
        let base = self.api_base.as_str().trim_end_matches('/');
        if subpath.is_empty() {
            format!("{base}/repos/{owner}/{repo}/contents")
        } else {
            format!("{base}/repos/{owner}/{repo}/contents/{subpath}")
        }
    }

    async fn fetch(
        &self,
        owner: &str,
        repo: &str,
        subpath: &str,
        token: Option<&str>,
    ) -> Result<Vec<DirectoryEntry>, ListingError> {
        let url = self.contents_url(owner, repo, subpath);

        let mut headers = HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        if let Some(token) = token
            && let Ok(value) = HeaderValue::from_str(&format!("Bearer {token}"))
        {
            headers.insert(header::AUTHORIZATION, value);
        }

        let response = self
            .http
            .get(&url, headers)
            .await
            .map_err(|err| ListingError::Transport {
                url: url.clone(),
                message: format!("{err:#}"),
            })?;

        if response.status == StatusCode::FORBIDDEN {
            log_rate_limit(&url, &response.headers);
        }
        if !response.status.is_success() {
            warn!(url = %url, status = %response.status, "content API request failed");
            return Err(ListingError::Status {
                url,
                status: response.status,
            });
        }

        let parsed: ContentsResponse = serde_json::from_slice(&response.body)
            .map_err(|source| ListingError::Decode {
                url: url.clone(),
                source,
            })?;

        match parsed {
            ContentsResponse::Directory(items) => Ok(sort_entries(
                items
                    .into_iter()
                    .map(|item| DirectoryEntry {
                        size: if item.kind.is_dir() { None } else { item.size },
                        name: item.name,
                        kind: item.kind,
                    })
                    .collect(),
            )),
            ContentsResponse::File(_) => Err(ListingError::NotADirectory {
                path: format!("{owner}/{repo}/{subpath}"),
            }),
        }
    }
}

fn sort_entries(mut entries: Vec<DirectoryEntry>) -> Vec<DirectoryEntry> {
    entries.sort_by(|a, b| {
        b.kind
            .is_dir()
            .cmp(&a.kind.is_dir())
            .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
    });
    entries
}

/// Quota diagnostics for a rejected content API call.
fn log_rate_limit(url: &str, headers: &HeaderMap) {
    let read = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<i64>().ok())
    };
    let remaining = read("x-ratelimit-remaining");
    let reset = read("x-ratelimit-reset")
        .and_then(|secs| chrono::DateTime::from_timestamp(secs, 0))
        .map(|at| at.to_rfc3339());
    warn!(
        url,
        remaining = ?remaining,
        reset_at = reset.as_deref().unwrap_or("unknown"),
        "content API refused request; rate limit may be exhausted"
    );
}
