mod response;
mod types;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use rama::{
    Service,
    error::BoxError,
    http::{Body, Method, Request, Response, StatusCode},
};
use tracing::{debug, error, info, warn};

use crate::access;
use crate::cache::{CacheEntry, CacheStats, ResponseCache};
use crate::classify::classify;
use crate::config::{CacheSettings, Config};
use crate::error::ProxyError;
use crate::render;
use crate::store::ConfigStore;
use crate::upstream::{Delivery, HttpFetch, ReqwestFetch, UpstreamFetcher};

pub use types::{CacheStatus, ProxyReply, RequestContext};

/// Main proxy service
#[derive(Clone)]
pub struct WardenProxy {
    store: Arc<ConfigStore>,
    cache: ResponseCache,
    fetcher: Arc<UpstreamFetcher>,
}

impl WardenProxy {
    pub fn new(config: Arc<Config>) -> Result<Self> {
        let http = ReqwestFetch::new(Duration::from_secs(config.upstream.timeout_secs))
            .context("building upstream client")?;
        Ok(Self::with_http(&config, Arc::new(http)))
    }

    /// Build the proxy around an arbitrary outbound HTTP implementation.
    pub fn with_http(config: &Config, http: Arc<dyn HttpFetch>) -> Self {
        Self {
            store: Arc::new(ConfigStore::from_config(config)),
            cache: ResponseCache::new(),
            fetcher: Arc::new(UpstreamFetcher::new(http, &config.upstream, &config.github)),
        }
    }

    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    /// Drop every response cache entry. The listing cache is left alone.
    pub fn clear_cache(&self) -> usize {
        let removed = self.cache.clear();
        info!(removed, "response cache cleared");
        removed
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Apply new listing-cache settings. Disabling the cache also empties it.
    pub fn update_github_api_cache(&self, settings: CacheSettings) {
        self.store.set_github_api_cache_config(settings);
        if !settings.enabled {
            let removed = self.fetcher.lister().clear();
            info!(removed, "content API cache disabled and cleared");
        }
    }

    /// Run a resource path through classification, access control, cache and upstream.
    ///
    /// A request that fails classification or the whitelist never reaches the cache.
    pub async fn resolve(&self, path_and_query: &str) -> Result<ProxyReply, ProxyError> {
        let request = classify(path_and_query)?;

        let whitelist = self.store.whitelist();
        if !access::is_allowed(&request, &whitelist) {
            return Err(ProxyError::Forbidden {
                kind: request.kind,
                identifier: request.identifier,
            });
        }

        let settings = self.store.cache_config();
        if let Some(entry) = self.cache.get(path_and_query, &settings) {
            debug!(key = %path_and_query, "response cache hit");
            return Ok(ProxyReply {
                body: entry.payload,
                content_type: entry.content_type,
                cache: CacheStatus::Hit,
                max_age: Some(settings.ttl.as_secs()),
            });
        }

        match self.fetcher.fetch(&request, &self.store).await? {
            Delivery::Asset(asset) => {
                if settings.enabled {
                    self.cache.put(
                        path_and_query,
                        CacheEntry::new(asset.body.clone(), asset.content_type.clone()),
                        &settings,
                    );
                }
                Ok(ProxyReply {
                    body: asset.body,
                    content_type: asset.content_type,
                    cache: if settings.enabled {
                        CacheStatus::Miss
                    } else {
                        CacheStatus::Bypass
                    },
                    max_age: settings.enabled.then(|| settings.ttl.as_secs()),
                })
            }
            Delivery::Listing(html) => Ok(ProxyReply {
                body: html.into(),
                content_type: "text/html; charset=utf-8".to_string(),
                cache: CacheStatus::Listing,
                max_age: None,
            }),
        }
    }

    async fn handle(&self, req: Request<Body>, ctx: &mut RequestContext) -> Result<Response<Body>> {
        if req.method() != Method::GET {
            ctx.cache = CacheStatus::Pass;
            return response::respond_text(StatusCode::METHOD_NOT_ALLOWED, "method not allowed");
        }

        match req.uri().path() {
            "/up" => {
                ctx.cache = CacheStatus::Pass;
                return response::respond_json(StatusCode::OK, r#"{"status":"ok"}"#);
            }
            "/" => {
                ctx.cache = CacheStatus::Pass;
                let settings = self.store.cache_config();
                let page = render::homepage(
                    &self.cache.stats(),
                    self.store.whitelist().len(),
                    settings.enabled,
                );
                return response::respond_html(StatusCode::OK, page);
            }
            _ => {}
        }

        let path_and_query = req
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");

        match self.resolve(path_and_query).await {
            Ok(reply) => {
                ctx.cache = reply.cache;
                response::respond_reply(reply)
            }
            Err(err) => {
                ctx.cache = CacheStatus::Error;
                match &err {
                    ProxyError::Upstream { .. } => {
                        error!(error = %err, summary = %ctx.summary(), "upstream failure")
                    }
                    _ => warn!(error = %err, summary = %ctx.summary(), "request rejected"),
                }
                response::respond_error(&err)
            }
        }
    }
}

impl Service<Request<Body>> for WardenProxy {
    type Output = Response<Body>;
    type Error = BoxError;

    async fn serve(&self, req: Request<Body>) -> Result<Self::Output, Self::Error> {
        let mut ctx = RequestContext::from_request(&req);

        let result = self.handle(req, &mut ctx).await;
        let duration_ms = ctx.start.elapsed().as_millis();

        let result = match result {
            Ok(resp) => Ok(resp),
            Err(err) => {
                // response building failed; degrade to the generic page
                error!(error = %err, summary = %ctx.summary(), "failed to build response");
                ctx.cache = CacheStatus::Error;
                response::respond_html(StatusCode::INTERNAL_SERVER_ERROR, render::error_page())
            }
        };

        match &result {
            Ok(resp) => {
                let response_code = resp.status().as_u16();
                info!(
                    summary = %ctx.summary(),
                    response_code,
                    duration_ms,
                    cache_status = %ctx.cache,
                    "request handled"
                );
            }
            Err(err) => {
                error!(
                    summary = %ctx.summary(),
                    duration_ms,
                    cache_status = %ctx.cache,
                    error = %err,
                    "request failed"
                );
            }
        }

        result.map_err(|e| e.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::ResourceKind;
    use crate::test_support::FakeHttp;
    use rama::http::{body::util::BodyExt, header};

    const LEFT_PAD_URL: &str = "https://cdn.jsdelivr.net/npm/left-pad@1.3.0/index.js";

    fn config() -> Config {
        let mut config = Config::default();
        config.whitelist.npm = vec!["left-pad".into(), "@babel/core".into()];
        config.whitelist.github = vec!["acme/big".into()];
        config.whitelist.wordpress.plugins = vec!["akismet".into()];
        config
    }

    fn proxy_with(http: Arc<FakeHttp>) -> WardenProxy {
        WardenProxy::with_http(&config(), http)
    }

    fn get(path: &str) -> Request<Body> {
        Request::builder()
            .method(Method::GET)
            .uri(path)
            .body(Body::empty())
            .unwrap()
    }

    async fn body_string(resp: Response<Body>) -> String {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    // ============================================================================
    // resolve
    // ============================================================================

    #[tokio::test]
    async fn unknown_prefix_is_bad_request_without_upstream_call() {
        let http = Arc::new(FakeHttp::new());
        let proxy = proxy_with(http.clone());

        let err = proxy.resolve("/foo/bar").await.unwrap_err();
        assert!(matches!(err, ProxyError::BadRequest(_)));
        assert!(http.calls().is_empty());
    }

    #[tokio::test]
    async fn dot_segments_cannot_reach_other_packages() {
        let http = Arc::new(FakeHttp::new());
        http.respond(
            "https://cdn.jsdelivr.net/npm/evil-pkg/index.js",
            StatusCode::OK,
            "text/javascript",
            "evil",
        );
        let proxy = proxy_with(http.clone());

        for path in [
            "/npm/left-pad/../evil-pkg/index.js",
            "/npm/left-pad/%2e%2e/evil-pkg/index.js",
            "/npm/left-pad/%2E%2E/evil-pkg/index.js",
            "/gh/acme/big/../../evil/repo/x.js",
            "/gh/acme/big/%2e%2e/%2e%2e/evil/repo/x.js",
        ] {
            let err = proxy.resolve(path).await.unwrap_err();
            assert!(matches!(err, ProxyError::BadRequest(_)), "{path}");
            assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        }
        assert!(http.calls().is_empty());
        assert_eq!(proxy.cache_stats().count, 0);
    }

    #[tokio::test]
    async fn denied_request_never_touches_cache_or_upstream() {
        let http = Arc::new(FakeHttp::new());
        let proxy = proxy_with(http.clone());

        let err = proxy.resolve("/npm/evil-pkg@1.0.0/index.js").await.unwrap_err();
        match err {
            ProxyError::Forbidden { kind, identifier } => {
                assert_eq!(kind, ResourceKind::Npm);
                assert_eq!(identifier, "evil-pkg");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(http.calls().is_empty());
        assert_eq!(proxy.cache_stats().count, 0);
    }

    #[tokio::test]
    async fn miss_then_hit() {
        let http = Arc::new(FakeHttp::new());
        http.respond(LEFT_PAD_URL, StatusCode::OK, "application/javascript", "module.exports = pad;");
        let proxy = proxy_with(http.clone());

        let first = proxy.resolve("/npm/left-pad@1.3.0/index.js").await.unwrap();
        assert_eq!(first.cache, CacheStatus::Miss);
        assert_eq!(first.content_type, "application/javascript");
        assert_eq!(first.max_age, Some(86_400));

        let second = proxy.resolve("/npm/left-pad@1.3.0/index.js").await.unwrap();
        assert_eq!(second.cache, CacheStatus::Hit);
        assert_eq!(second.body, first.body);
        assert_eq!(http.call_count(LEFT_PAD_URL), 1);

        let stats = proxy.cache_stats();
        assert_eq!(stats.count, 1);
        assert_eq!(stats.total_bytes, "module.exports = pad;".len() as u64);
    }

    #[tokio::test]
    async fn cache_key_is_the_literal_path() {
        let http = Arc::new(FakeHttp::new());
        http.respond(LEFT_PAD_URL, StatusCode::OK, "text/javascript", "a");
        http.respond(&format!("{LEFT_PAD_URL}?v=2"), StatusCode::OK, "text/javascript", "b");
        let proxy = proxy_with(http.clone());

        proxy.resolve("/npm/left-pad@1.3.0/index.js").await.unwrap();
        let other = proxy.resolve("/npm/left-pad@1.3.0/index.js?v=2").await.unwrap();
        assert_eq!(other.cache, CacheStatus::Miss);
        assert_eq!(other.body, "b");
        assert_eq!(proxy.cache_stats().count, 2);
    }

    #[tokio::test]
    async fn disabled_cache_bypasses() {
        let http = Arc::new(FakeHttp::new());
        http.respond(LEFT_PAD_URL, StatusCode::OK, "text/javascript", "x");
        let proxy = proxy_with(http.clone());
        proxy.store().set_cache_config(CacheSettings::disabled());

        for _ in 0..2 {
            let reply = proxy.resolve("/npm/left-pad@1.3.0/index.js").await.unwrap();
            assert_eq!(reply.cache, CacheStatus::Bypass);
            assert_eq!(reply.max_age, None);
        }
        assert_eq!(http.call_count(LEFT_PAD_URL), 2);
        assert_eq!(proxy.cache_stats().count, 0);
    }

    #[tokio::test]
    async fn upstream_error_is_not_cached() {
        let http = Arc::new(FakeHttp::new());
        http.respond(LEFT_PAD_URL, StatusCode::NOT_FOUND, "text/plain", "nope");
        let proxy = proxy_with(http.clone());

        let err = proxy.resolve("/npm/left-pad@1.3.0/index.js").await.unwrap_err();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(proxy.cache_stats().count, 0);
    }

    #[tokio::test]
    async fn wordpress_plugin_routes_to_wordpress_base() {
        let url = "https://cdn.jsdelivr.net/wp/plugins/akismet@5.0/readme.txt";
        let http = Arc::new(FakeHttp::new());
        http.respond(url, StatusCode::OK, "text/plain", "readme");
        let proxy = proxy_with(http.clone());

        let reply = proxy.resolve("/wp/plugins/akismet@5.0/readme.txt").await.unwrap();
        assert_eq!(reply.body, "readme");

        // same slug as a theme is a different whitelist subset
        let err = proxy.resolve("/wp/themes/akismet/style.css").await.unwrap_err();
        assert!(matches!(err, ProxyError::Forbidden { .. }));
    }

    #[tokio::test]
    async fn size_limit_fallback_is_served_as_listing_and_not_cached() {
        let http = Arc::new(FakeHttp::new());
        http.respond(
            "https://cdn.jsdelivr.net/gh/acme/big/",
            StatusCode::FORBIDDEN,
            "text/plain",
            "Package size exceeded the configured limit of 50 MB.",
        );
        http.respond(
            "https://api.github.com/repos/acme/big/contents",
            StatusCode::OK,
            "application/json",
            r#"[{"name":"lib","type":"dir","size":0},{"name":"a.js","type":"file","size":2048}]"#,
        );
        let proxy = proxy_with(http.clone());

        let reply = proxy.resolve("/gh/acme/big/").await.unwrap();
        assert_eq!(reply.cache, CacheStatus::Listing);
        assert!(reply.content_type.starts_with("text/html"));
        let html = String::from_utf8(reply.body.to_vec()).unwrap();
        assert!(html.contains("2.0 KB"));
        assert!(html.contains(r#"href="/gh/acme/big/lib""#));
        assert_eq!(proxy.cache_stats().count, 0);
    }

    #[tokio::test]
    async fn clear_cache_empties_response_cache() {
        let http = Arc::new(FakeHttp::new());
        http.respond(LEFT_PAD_URL, StatusCode::OK, "text/javascript", "x");
        let proxy = proxy_with(http.clone());

        proxy.resolve("/npm/left-pad@1.3.0/index.js").await.unwrap();
        assert_eq!(proxy.clear_cache(), 1);
        let reply = proxy.resolve("/npm/left-pad@1.3.0/index.js").await.unwrap();
        assert_eq!(reply.cache, CacheStatus::Miss);
        assert_eq!(http.call_count(LEFT_PAD_URL), 2);
    }

    #[tokio::test]
    async fn disabling_api_cache_clears_listings() {
        let http = Arc::new(FakeHttp::new());
        http.respond(
            "https://cdn.jsdelivr.net/gh/acme/big/",
            StatusCode::FORBIDDEN,
            "text/plain",
            "Package size exceeded the configured limit",
        );
        http.respond(
            "https://api.github.com/repos/acme/big/contents",
            StatusCode::OK,
            "application/json",
            r#"[{"name":"a.js","type":"file","size":1}]"#,
        );
        let proxy = proxy_with(http.clone());

        proxy.resolve("/gh/acme/big/").await.unwrap();
        assert_eq!(proxy.fetcher.lister().cached_listings(), 1);

        proxy.update_github_api_cache(CacheSettings::disabled());
        assert_eq!(proxy.fetcher.lister().cached_listings(), 0);
        assert!(!proxy.store().github_api_cache_config().enabled);
    }

    #[tokio::test]
    async fn whitelist_edits_apply_to_next_request() {
        let url = "https://cdn.jsdelivr.net/npm/lodash@4.17.21/lodash.min.js";
        let http = Arc::new(FakeHttp::new());
        http.respond(url, StatusCode::OK, "text/javascript", "_");
        let proxy = proxy_with(http.clone());

        assert!(proxy.resolve("/npm/lodash@4.17.21/lodash.min.js").await.is_err());
        assert!(proxy.store().allow(ResourceKind::Npm, "lodash"));
        assert!(proxy.resolve("/npm/lodash@4.17.21/lodash.min.js").await.is_ok());
    }

    // ============================================================================
    // HTTP surface
    // ============================================================================

    #[tokio::test]
    async fn health_endpoint() {
        let proxy = proxy_with(Arc::new(FakeHttp::new()));
        let resp = proxy.serve(get("/up")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_string(resp).await, r#"{"status":"ok"}"#);
    }

    #[tokio::test]
    async fn homepage_renders() {
        let proxy = proxy_with(Arc::new(FakeHttp::new()));
        let resp = proxy.serve(get("/")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(body_string(resp).await.contains("4 whitelisted resources"));
    }

    #[tokio::test]
    async fn non_get_is_rejected() {
        let proxy = proxy_with(Arc::new(FakeHttp::new()));
        let req = Request::builder()
            .method(Method::POST)
            .uri("/npm/left-pad")
            .body(Body::empty())
            .unwrap();
        let resp = proxy.serve(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn served_asset_carries_cache_headers() {
        let http = Arc::new(FakeHttp::new());
        http.respond(LEFT_PAD_URL, StatusCode::OK, "application/javascript", "pad");
        let proxy = proxy_with(http);

        let resp = proxy.serve(get("/npm/left-pad@1.3.0/index.js")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()["x-cache"], "miss");
        assert_eq!(resp.headers()[header::CACHE_CONTROL], "public, max-age=86400");
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "application/javascript");
        assert_eq!(body_string(resp).await, "pad");

        let resp = proxy.serve(get("/npm/left-pad@1.3.0/index.js")).await.unwrap();
        assert_eq!(resp.headers()["x-cache"], "hit");
    }

    #[tokio::test]
    async fn error_pages_carry_status() {
        let proxy = proxy_with(Arc::new(FakeHttp::new()));

        let resp = proxy.serve(get("/foo/bar")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(body_string(resp).await.contains("Invalid request"));

        let resp = proxy.serve(get("/gh/other/repo/file.js")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        let body = body_string(resp).await;
        assert!(body.contains("GitHub repository"));
        assert!(body.contains("https://github.com/other/repo"));

        // whitelisted, but the fake has no route: transport failure
        let resp = proxy.serve(get("/npm/left-pad/index.js")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    // ============================================================================
    // CacheStatus / RequestContext
    // ============================================================================

    #[test]
    fn cache_status_display() {
        assert_eq!(CacheStatus::Pass.to_string(), "pass");
        assert_eq!(CacheStatus::Hit.to_string(), "hit");
        assert_eq!(CacheStatus::Miss.to_string(), "miss");
        assert_eq!(CacheStatus::Bypass.to_string(), "bypass");
        assert_eq!(CacheStatus::Listing.to_string(), "listing");
        assert_eq!(CacheStatus::Error.to_string(), "error");
    }

    #[test]
    fn request_context_keeps_query() {
        let ctx = RequestContext::from_request(&get("/npm/left-pad?meta"));
        assert_eq!(ctx.summary(), "GET /npm/left-pad?meta");
        assert_eq!(ctx.cache, CacheStatus::Pass);
    }
}
