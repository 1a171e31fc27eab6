use serde::Deserialize;
use url::Url;

/// CDN base URLs, one per resource family. The forwarding path is appended verbatim.
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_npm_url", with = "serde_url")]
    pub npm_url: Url,
    #[serde(default = "default_github_url", with = "serde_url")]
    pub github_url: Url,
    #[serde(default = "default_wordpress_url", with = "serde_url")]
    pub wordpress_url: Url,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            npm_url: default_npm_url(),
            github_url: default_github_url(),
            wordpress_url: default_wordpress_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Source-control content-listing API used when the CDN refuses an oversized repository.
#[derive(Debug, Clone, Deserialize)]
pub struct GithubConfig {
    #[serde(default = "default_api_url", with = "serde_url")]
    pub api_url: Url,
    /// Bearer token sent to the API to raise rate limits. Empty means anonymous.
    #[serde(default)]
    pub token: String,
    /// Text the CDN puts in a 403 body when a repository exceeds its size limit.
    #[serde(default = "default_size_limit_marker")]
    pub size_limit_marker: String,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            token: String::new(),
            size_limit_marker: default_size_limit_marker(),
        }
    }
}

fn default_npm_url() -> Url {
    Url::parse("https://cdn.jsdelivr.net/npm").expect("static npm url")
}

fn default_github_url() -> Url {
    Url::parse("https://cdn.jsdelivr.net/gh").expect("static github url")
}

fn default_wordpress_url() -> Url {
    Url::parse("https://cdn.jsdelivr.net/wp").expect("static wordpress url")
}

fn default_api_url() -> Url {
    Url::parse("https://api.github.com").expect("static api url")
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_size_limit_marker() -> String {
    "Package size exceeded the configured limit".to_string()
}

mod serde_url {
    use serde::{Deserialize, Deserializer};
    use url::Url;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Url, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Url::parse(s.trim_end_matches('/')).map_err(serde::de::Error::custom)
    }
}
