use std::{fs, path::PathBuf};

use anyhow::{Context, Result, bail};
use serde::Deserialize;

pub mod cache;
pub mod logging;
pub mod server;
pub mod upstream;
pub mod whitelist;


pub use cache::{ApiCacheConfig, CacheSettings, ResponseCacheConfig};
pub use logging::LoggingConfig;
pub use server::ServerConfig;
pub use upstream::{GithubConfig, UpstreamConfig};
pub use whitelist::{WhitelistConfig, WordpressWhitelistConfig};

pub const DEFAULT_CONFIG_FILE: &str = "warden.toml";

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub github: GithubConfig,
    #[serde(default)]
    pub cache: ResponseCacheConfig,
    #[serde(default)]
    pub github_api_cache: ApiCacheConfig,
    #[serde(default)]
    pub whitelist: WhitelistConfig,
    #[serde(default)]
    pub admin: AdminConfig,
}

/// Settings for the administrative layer that edits the store at runtime.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AdminConfig {
    /// Shared secret required for administrative actions. Empty disables them.
    #[serde(default)]
    pub secret_key: String,
}

impl Config {
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let candidate = path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
        if candidate.exists() {
            let raw = fs::read_to_string(&candidate)
                .with_context(|| format!("failed to read config {}", candidate.display()))?;
            let config: Config = toml::from_str(&raw)
                .with_context(|| format!("invalid config {}", candidate.display()))?;
            Ok(config)
        } else {
            tracing::warn!(
                path = %candidate.display(),
                "configuration file not found, using defaults"
            );
            Ok(Config::default())
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (name, url) in [
            ("upstream.npm_url", &self.upstream.npm_url),
            ("upstream.github_url", &self.upstream.github_url),
            ("upstream.wordpress_url", &self.upstream.wordpress_url),
            ("github.api_url", &self.github.api_url),
        ] {
            if url.scheme() != "https" && url.scheme() != "http" {
                bail!("unsupported scheme for {name}: {url}");
            }
        }
        if self.cache.enabled && self.cache.ttl_secs == 0 {
            bail!("cache.ttl_secs must be greater than zero when the cache is enabled");
        }
        if self.github_api_cache.enabled && self.github_api_cache.ttl_secs == 0 {
            bail!("github_api_cache.ttl_secs must be greater than zero when the cache is enabled");
        }
        if self.github.size_limit_marker.trim().is_empty() {
            bail!("github.size_limit_marker must not be empty");
        }
        Ok(())
    }
}
