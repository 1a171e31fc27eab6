//! HTML pages: error pages, size-limit directory listings and the homepage.

use std::fmt::Write as _;

use html_escape::{encode_double_quoted_attribute, encode_text};
use percent_encoding::{AsciiSet, CONTROLS, percent_decode_str, utf8_percent_encode};

use crate::cache::CacheStats;
use crate::classify::ResourceKind;
use crate::listing::DirectoryEntry;

/// Characters escaped when a directory entry name becomes a path segment.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

const STYLE: &str = r#"
      :root {
        color-scheme: light dark;
        --bg: #0f1117;
        --fg: #f4f6ff;
        --accent: #3f8cff;
        --muted: #9aa2b2;
      }
      @media (prefers-color-scheme: light) {
        :root {
          --bg: #f9fbff;
          --fg: #1b2130;
          --accent: #2563eb;
          --muted: #525f7a;
        }
      }
      body {
        margin: 0;
        min-height: 100vh;
        background: var(--bg);
        color: var(--fg);
        font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", sans-serif;
      }
      main {
        max-width: 880px;
        margin: 0 auto;
        padding: 3rem 2rem;
      }
      h1 { font-size: 1.75rem; margin: 0 0 1rem; }
      p { line-height: 1.6; }
      a { color: var(--accent); text-decoration: none; font-weight: 600; }
      a:hover { text-decoration: underline; }
      code {
        padding: 0.15rem 0.4rem;
        border-radius: 6px;
        background: color-mix(in srgb, var(--bg) 70%, var(--fg) 30%);
      }
      nav.breadcrumbs { color: var(--muted); margin-bottom: 1.5rem; }
      table { width: 100%; border-collapse: collapse; }
      td { padding: 0.4rem 0.5rem; border-bottom: 1px solid color-mix(in srgb, var(--bg) 80%, var(--fg) 20%); }
      td.size { text-align: right; color: var(--muted); white-space: nowrap; }
      .icon-dir::before { content: "\1F4C1"; margin-right: 0.5rem; }
      .icon-file::before { content: "\1F4C4"; margin-right: 0.5rem; }
"#;

fn layout(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="utf-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1" />
    <title>{title}</title>
    <style>{STYLE}</style>
  </head>
  <body>
    <main>
{body}
    </main>
  </body>
</html>
"#,
        title = encode_text(title),
    )
}

/// Path text as the user named it; the subpath arrives percent-encoded from the request.
fn decode(raw: &str) -> std::borrow::Cow<'_, str> {
    percent_decode_str(raw).decode_utf8_lossy()
}

/// Human-readable byte count: `B`, then `KB`/`MB`/`GB` with one decimal, 1024 steps.
pub fn format_size(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;

    let value = bytes as f64;
    if value < KB {
        format!("{bytes} B")
    } else if value < MB {
        format!("{:.1} KB", value / KB)
    } else if value < GB {
        format!("{:.1} MB", value / MB)
    } else {
        format!("{:.1} GB", value / GB)
    }
}

/// 400 page for paths that match none of the proxied grammars.
pub fn bad_request_page() -> String {
    layout(
        "Invalid request",
        r#"      <h1>Invalid request</h1>
      <p>This proxy only serves paths of the form
        <code>/npm/&lt;package&gt;</code>,
        <code>/gh/&lt;owner&gt;/&lt;repo&gt;</code>,
        <code>/wp/plugins/&lt;slug&gt;</code> or
        <code>/wp/themes/&lt;slug&gt;</code>.</p>"#,
    )
}

/// 403 page naming the refused resource and where to find it upstream.
pub fn forbidden_page(kind: ResourceKind, identifier: &str) -> String {
    let official = kind.official_url(identifier);
    let body = format!(
        r#"      <h1>Resource not allowed</h1>
      <p>The {label} <code>{name}</code> is not on this proxy's whitelist.</p>
      <p>You can find it at its official location:
        <a href="{href}" rel="noopener noreferrer">{link}</a></p>
      <p>Ask an administrator to add it if it should be served here.</p>"#,
        label = kind.label(),
        name = encode_text(identifier),
        href = encode_double_quoted_attribute(&official),
        link = encode_text(&official),
    );
    layout("Resource not allowed", &body)
}

/// Generic 500 page. Upstream details stay in the logs.
pub fn error_page() -> String {
    layout(
        "Upstream error",
        r#"      <h1>Something went wrong</h1>
      <p>The resource could not be fetched from the upstream CDN. Please try again later.</p>"#,
    )
}

/// Input for [`directory_page`].
pub struct DirectoryView<'a> {
    pub owner: &'a str,
    /// Repository segment as requested, `@version` included.
    pub repo_ref: &'a str,
    /// Slash-joined, percent-encoded path below the repository root, empty for the root.
    pub subpath: &'a str,
    pub entries: &'a [DirectoryEntry],
}

impl DirectoryView<'_> {
    fn base(&self) -> String {
        format!("/gh/{}/{}", self.owner, self.repo_ref)
    }

    fn segments(&self) -> Vec<&str> {
        self.subpath.split('/').filter(|s| !s.is_empty()).collect()
    }

    /// Proxy path for the first `depth` subpath segments.
    fn path_to(&self, depth: usize) -> String {
        let segments = self.segments();
        if depth == 0 {
            format!("{}/", self.base())
        } else {
            format!("{}/{}", self.base(), segments[..depth].join("/"))
        }
    }

    fn entry_href(&self, name: &str) -> String {
        let name = utf8_percent_encode(name, SEGMENT).to_string();
        if self.subpath.is_empty() {
            format!("{}/{}", self.base(), name)
        } else {
            format!("{}/{}/{}", self.base(), self.subpath, name)
        }
    }
}

/// Navigable listing for a repository path the CDN refused to serve.
///
/// Every link routes back through `/gh/...`, so nested directories hit the same fallback.
pub fn directory_page(view: &DirectoryView<'_>) -> String {
    let segments = view.segments();
    let display_path = if view.subpath.is_empty() {
        format!("{}/{}", view.owner, view.repo_ref)
    } else {
        format!("{}/{}/{}", view.owner, view.repo_ref, decode(view.subpath))
    };

    let mut body = String::new();
    let _ = writeln!(body, "      <h1>Index of {}</h1>", encode_text(&display_path));

    // breadcrumbs: repository root, then every segment but the last as a link
    let _ = write!(
        body,
        r#"      <nav class="breadcrumbs"><a href="{}">{}/{}</a>"#,
        encode_double_quoted_attribute(&view.path_to(0)),
        encode_text(view.owner),
        encode_text(view.repo_ref),
    );
    for (idx, segment) in segments.iter().enumerate() {
        if idx + 1 == segments.len() {
            let _ = write!(body, " / <span>{}</span>", encode_text(&decode(segment)));
        } else {
            let _ = write!(
                body,
                r#" / <a href="{}">{}</a>"#,
                encode_double_quoted_attribute(&view.path_to(idx + 1)),
                encode_text(&decode(segment)),
            );
        }
    }
    body.push_str("</nav>\n");

    body.push_str("      <table>\n");
    if !segments.is_empty() {
        let _ = writeln!(
            body,
            r#"        <tr><td><a class="icon-dir parent" href="{}">..</a></td><td class="size"></td></tr>"#,
            encode_double_quoted_attribute(&view.path_to(segments.len() - 1)),
        );
    }
    for entry in view.entries {
        let (icon, size) = if entry.kind.is_dir() {
            ("icon-dir", String::new())
        } else {
            ("icon-file", entry.size.map(format_size).unwrap_or_default())
        };
        let _ = writeln!(
            body,
            r#"        <tr><td><a class="{icon}" href="{href}">{name}</a></td><td class="size">{size}</td></tr>"#,
            href = encode_double_quoted_attribute(&view.entry_href(&entry.name)),
            name = encode_text(&entry.name),
        );
    }
    body.push_str("      </table>\n");
    let _ = writeln!(
        body,
        r#"      <p>This repository exceeds the CDN size limit, so its contents are listed from GitHub. Individual files are still served through the proxy.</p>"#
    );

    layout(&format!("Index of {display_path}"), &body)
}

/// Landing page for `/`.
pub fn homepage(stats: &CacheStats, whitelisted: usize, cache_enabled: bool) -> String {
    let body = format!(
        r#"      <h1>cdn-warden is online</h1>
      <p>This node proxies whitelisted resources from the public CDN:</p>
      <ul>
        <li><code>/npm/&lt;package&gt;[@version][/file]</code></li>
        <li><code>/gh/&lt;owner&gt;/&lt;repo&gt;[@version][/file]</code></li>
        <li><code>/wp/plugins/&lt;slug&gt;[@version][/file]</code></li>
        <li><code>/wp/themes/&lt;slug&gt;[@version][/file]</code></li>
      </ul>
      <p>{whitelisted} whitelisted resources. Response cache {state}: {count} entries, {size}.</p>"#,
        state = if cache_enabled { "enabled" } else { "disabled" },
        count = stats.count,
        size = format_size(stats.total_bytes),
    );
    layout("cdn-warden", &body)
}
