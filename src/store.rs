//! Runtime configuration store.
//!
//! Seeded once from [`Config`] at startup and shared by reference with the
//! request path. Administrative edits go through the mutation methods here;
//! every edit is a single read-modify-write under one lock.

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use crate::classify::ResourceKind;
use crate::config::{CacheSettings, Config};

/// Allowed identifiers per resource family.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WhitelistSet {
    pub npm: BTreeSet<String>,
    pub github: BTreeSet<String>,
    pub wordpress_plugins: BTreeSet<String>,
    pub wordpress_themes: BTreeSet<String>,
}

impl WhitelistSet {
    pub fn from_config(config: &crate::config::WhitelistConfig) -> Self {
        let collect = |items: &[String]| {
            items
                .iter()
                .map(|item| item.trim())
                .filter(|item| !item.is_empty())
                .map(str::to_string)
                .collect::<BTreeSet<_>>()
        };
        Self {
            npm: collect(&config.npm),
            github: collect(&config.github),
            wordpress_plugins: collect(&config.wordpress.plugins),
            wordpress_themes: collect(&config.wordpress.themes),
        }
    }

    /// The set consulted for `kind`.
    pub fn for_kind(&self, kind: ResourceKind) -> &BTreeSet<String> {
        match kind {
            ResourceKind::Npm => &self.npm,
            ResourceKind::GithubRepo => &self.github,
            ResourceKind::WordpressPlugin => &self.wordpress_plugins,
            ResourceKind::WordpressTheme => &self.wordpress_themes,
        }
    }

    fn for_kind_mut(&mut self, kind: ResourceKind) -> &mut BTreeSet<String> {
        match kind {
            ResourceKind::Npm => &mut self.npm,
            ResourceKind::GithubRepo => &mut self.github,
            ResourceKind::WordpressPlugin => &mut self.wordpress_plugins,
            ResourceKind::WordpressTheme => &mut self.wordpress_themes,
        }
    }

    pub fn len(&self) -> usize {
        self.npm.len() + self.github.len() + self.wordpress_plugins.len() + self.wordpress_themes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug)]
struct StoreState {
    whitelist: Arc<WhitelistSet>,
    cache: CacheSettings,
    github_api_cache: CacheSettings,
    github_token: String,
    secret_key: String,
}

/// Shared, lock-protected configuration read by every request.
#[derive(Debug)]
pub struct ConfigStore {
    state: RwLock<StoreState>,
}

impl ConfigStore {
    pub fn from_config(config: &Config) -> Self {
        Self {
            state: RwLock::new(StoreState {
                whitelist: Arc::new(WhitelistSet::from_config(&config.whitelist)),
                cache: config.cache.settings(),
                github_api_cache: config.github_api_cache.settings(),
                github_token: config.github.token.trim().to_string(),
                secret_key: config.admin.secret_key.clone(),
            }),
        }
    }

    /// Snapshot of the whitelist. Later edits do not affect a snapshot already taken.
    pub fn whitelist(&self) -> Arc<WhitelistSet> {
        self.state.read().whitelist.clone()
    }

    pub fn cache_config(&self) -> CacheSettings {
        self.state.read().cache
    }

    pub fn github_api_cache_config(&self) -> CacheSettings {
        self.state.read().github_api_cache
    }

    pub fn github_token(&self) -> Option<String> {
        let state = self.state.read();
        if state.github_token.is_empty() {
            None
        } else {
            Some(state.github_token.clone())
        }
    }

    /// Add `identifier` to the whitelist for `kind`. Returns `true` if it was not already present.
    pub fn allow(&self, kind: ResourceKind, identifier: &str) -> bool {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return false;
        }
        let mut state = self.state.write();
        let mut next = (*state.whitelist).clone();
        let added = next.for_kind_mut(kind).insert(identifier.to_string());
        if added {
            state.whitelist = Arc::new(next);
            info!(%kind, identifier, "whitelist entry added");
        }
        added
    }

    /// Remove `identifier` from the whitelist for `kind`. Returns `true` if it was present.
    pub fn revoke(&self, kind: ResourceKind, identifier: &str) -> bool {
        let identifier = identifier.trim();
        let mut state = self.state.write();
        let mut next = (*state.whitelist).clone();
        let removed = next.for_kind_mut(kind).remove(identifier);
        if removed {
            state.whitelist = Arc::new(next);
            info!(%kind, identifier, "whitelist entry removed");
        }
        removed
    }

    pub fn set_cache_config(&self, settings: CacheSettings) {
        self.state.write().cache = settings;
        info!(
            enabled = settings.enabled,
            ttl_secs = settings.ttl.as_secs(),
            "response cache settings updated"
        );
    }

    pub fn set_github_api_cache_config(&self, settings: CacheSettings) {
        self.state.write().github_api_cache = settings;
        info!(
            enabled = settings.enabled,
            ttl_secs = settings.ttl.as_secs(),
            "github api cache settings updated"
        );
    }

    pub fn set_github_token(&self, token: &str) {
        self.state.write().github_token = token.trim().to_string();
    }

    /// Check a caller-supplied secret. An unset secret never matches.
    pub fn verify_secret(&self, candidate: &str) -> bool {
        let state = self.state.read();
        let expected = state.secret_key.as_bytes();
        if expected.is_empty() || expected.len() != candidate.len() {
            return false;
        }
        expected
            .iter()
            .zip(candidate.as_bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}
