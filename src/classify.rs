//! Inbound path classification.
//!
//! Three grammars are recognised:
//! - `/npm/<name>[@version][/path]` and `/npm/@scope/<name>[@version][/path]`
//! - `/gh/<owner>/<repo>[@version][/path]`
//! - `/wp/<plugins|themes>/<slug>[@version][/path]`
//!
//! The forwarding path is everything after the family prefix, query included,
//! and is handed to the CDN untouched.

use std::fmt;

use percent_encoding::percent_decode_str;
use thiserror::Error;

/// Resource family of a classified request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Npm,
    GithubRepo,
    WordpressPlugin,
    WordpressTheme,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 4] = [
        ResourceKind::Npm,
        ResourceKind::GithubRepo,
        ResourceKind::WordpressPlugin,
        ResourceKind::WordpressTheme,
    ];

    /// Human-readable label used on error pages.
    pub fn label(&self) -> &'static str {
        match self {
            ResourceKind::Npm => "npm package",
            ResourceKind::GithubRepo => "GitHub repository",
            ResourceKind::WordpressPlugin => "WordPress plugin",
            ResourceKind::WordpressTheme => "WordPress theme",
        }
    }

    /// Canonical location of the resource outside the proxy.
    pub fn official_url(&self, identifier: &str) -> String {
        match self {
            ResourceKind::Npm => format!("https://www.npmjs.com/package/{identifier}"),
            ResourceKind::GithubRepo => format!("https://github.com/{identifier}"),
            ResourceKind::WordpressPlugin => format!("https://wordpress.org/plugins/{identifier}/"),
            ResourceKind::WordpressTheme => format!("https://wordpress.org/themes/{identifier}/"),
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Npm => write!(f, "npm"),
            ResourceKind::GithubRepo => write!(f, "github"),
            ResourceKind::WordpressPlugin => write!(f, "wordpress-plugin"),
            ResourceKind::WordpressTheme => write!(f, "wordpress-theme"),
        }
    }
}

/// A request path broken down into what is being asked for and where to forward it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedRequest {
    pub kind: ResourceKind,
    /// Whitelist key: `@scope/name`, `name`, `owner/repo` or a WordPress slug.
    pub identifier: String,
    /// Path appended to the CDN base for this kind, version and query preserved.
    pub forward_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassifyError {
    #[error("path does not match any proxied resource family")]
    UnknownPrefix,
    #[error("npm path is missing a package name")]
    MissingPackage,
    #[error("GitHub path must name both owner and repository")]
    MissingRepository,
    #[error("WordPress path must start with plugins/ or themes/")]
    UnknownWordpressType,
    #[error("WordPress path is missing a slug")]
    MissingSlug,
    #[error("path contains a dot segment or an encoded separator")]
    UnsafeSegment,
}

pub type ClassifyResult = Result<ClassifiedRequest, ClassifyError>;

/// Classify a raw `path[?query]`.
pub fn classify(path_and_query: &str) -> ClassifyResult {
    if let Some(rest) = strip_family(path_and_query, "/npm") {
        classify_npm(rest)
    } else if let Some(rest) = strip_family(path_and_query, "/gh") {
        classify_github(rest)
    } else if let Some(rest) = strip_family(path_and_query, "/wp") {
        classify_wordpress(rest)
    } else {
        Err(ClassifyError::UnknownPrefix)
    }
}

/// `/npm/...` grammar. `forward` is the part after `/npm`, leading slash included.
pub fn classify_npm(forward: &str) -> ClassifyResult {
    let segments = path_segments(forward)?;
    let identifier = match segments.first() {
        Some(first) if first.starts_with('@') => {
            let scope = first.as_str();
            let name = segments
                .get(1)
                .map(|s| strip_version(s))
                .filter(|name| !name.is_empty())
                .ok_or(ClassifyError::MissingPackage)?;
            if scope.len() < 2 {
                return Err(ClassifyError::MissingPackage);
            }
            format!("{scope}/{name}")
        }
        Some(first) => {
            let name = strip_version(first);
            if name.is_empty() {
                return Err(ClassifyError::MissingPackage);
            }
            name.to_string()
        }
        None => return Err(ClassifyError::MissingPackage),
    };

    Ok(ClassifiedRequest {
        kind: ResourceKind::Npm,
        identifier,
        forward_path: forward.to_string(),
    })
}

/// `/gh/...` grammar.
pub fn classify_github(forward: &str) -> ClassifyResult {
    let segments = path_segments(forward)?;
    let (Some(owner), Some(repo)) = (segments.first(), segments.get(1)) else {
        return Err(ClassifyError::MissingRepository);
    };
    let repo = strip_version(repo);
    if owner.is_empty() || repo.is_empty() {
        return Err(ClassifyError::MissingRepository);
    }

    Ok(ClassifiedRequest {
        kind: ResourceKind::GithubRepo,
        identifier: format!("{owner}/{repo}"),
        forward_path: forward.to_string(),
    })
}

/// `/wp/...` grammar.
pub fn classify_wordpress(forward: &str) -> ClassifyResult {
    let segments = path_segments(forward)?;
    let kind = match segments.first().map(String::as_str) {
        Some("plugins") => ResourceKind::WordpressPlugin,
        Some("themes") => ResourceKind::WordpressTheme,
        _ => return Err(ClassifyError::UnknownWordpressType),
    };
    let slug = segments
        .get(1)
        .map(|s| strip_version(s))
        .filter(|slug| !slug.is_empty())
        .ok_or(ClassifyError::MissingSlug)?;

    Ok(ClassifiedRequest {
        kind,
        identifier: slug.to_string(),
        forward_path: forward.to_string(),
    })
}

/// Drop any `@version` suffix from a single path segment.
///
/// Only call this on name segments; an npm scope segment starts with `@`.
pub fn strip_version(segment: &str) -> &str {
    segment.split('@').next().unwrap_or_default()
}

/// Matches `prefix` only on a segment boundary and returns the remainder.
fn strip_family<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    let rest = path.strip_prefix(prefix)?;
    if rest.starts_with('/') { Some(rest) } else { None }
}

/// Non-empty, percent-decoded path segments with the query string removed.
///
/// The forwarding path goes upstream verbatim, so a segment that decodes to `.`
/// or `..`, or hides a separator (`%2f`, `\`), is rejected.
fn path_segments(forward: &str) -> Result<Vec<String>, ClassifyError> {
    let path = forward.split(['?', '#']).next().unwrap_or_default();
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(|raw| {
            let decoded = percent_decode_str(raw).decode_utf8_lossy();
            if decoded == "." || decoded == ".." || decoded.contains(['/', '\\']) {
                Err(ClassifyError::UnsafeSegment)
            } else {
                Ok(decoded.into_owned())
            }
        })
        .collect()
}
