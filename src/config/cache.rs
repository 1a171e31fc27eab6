use std::time::Duration;

use serde::Deserialize;

/// Runtime view of a cache section: whether it is on and how long entries stay trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheSettings {
    pub enabled: bool,
    pub ttl: Duration,
}

impl CacheSettings {
    pub fn new(enabled: bool, ttl_secs: u64) -> Self {
        Self {
            enabled,
            ttl: Duration::from_secs(ttl_secs),
        }
    }

    pub fn disabled() -> Self {
        Self::new(false, 0)
    }
}

/// `[cache]`: the response cache in front of the CDN.
#[derive(Debug, Clone, Deserialize)]
pub struct ResponseCacheConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "ResponseCacheConfig::default_ttl_secs")]
    pub ttl_secs: u64,
}

impl ResponseCacheConfig {
    fn default_ttl_secs() -> u64 {
        // One day
        86_400
    }

    pub fn settings(&self) -> CacheSettings {
        CacheSettings::new(self.enabled, self.ttl_secs)
    }
}

impl Default for ResponseCacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            ttl_secs: Self::default_ttl_secs(),
        }
    }
}

/// `[github_api_cache]`: directory listings fetched from the content API.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiCacheConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "ApiCacheConfig::default_ttl_secs")]
    pub ttl_secs: u64,
}

impl ApiCacheConfig {
    fn default_ttl_secs() -> u64 {
        300
    }

    pub fn settings(&self) -> CacheSettings {
        CacheSettings::new(self.enabled, self.ttl_secs)
    }
}

impl Default for ApiCacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            ttl_secs: Self::default_ttl_secs(),
        }
    }
}

fn default_enabled() -> bool {
    true
}
