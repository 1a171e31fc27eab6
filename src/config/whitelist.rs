use serde::Deserialize;

/// `[whitelist]`: identifiers allowed through the proxy, per resource family.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WhitelistConfig {
    /// Package names, scoped ones included (`@scope/name`).
    #[serde(default)]
    pub npm: Vec<String>,
    /// Repositories as `owner/repo`.
    #[serde(default)]
    pub github: Vec<String>,
    #[serde(default)]
    pub wordpress: WordpressWhitelistConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WordpressWhitelistConfig {
    #[serde(default)]
    pub plugins: Vec<String>,
    #[serde(default)]
    pub themes: Vec<String>,
}
