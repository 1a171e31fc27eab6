use anyhow::Result;
use rama::http::{Body, Response, StatusCode, header};

use super::types::ProxyReply;
use crate::error::ProxyError;
use crate::render;

const X_CACHE: &str = "x-cache";

/// Responds with JSON content
pub fn respond_json(status: StatusCode, body: &str) -> Result<Response<Body>> {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json; charset=utf-8")
        .header(header::CACHE_CONTROL, "no-store")
        .header(header::CONTENT_LENGTH, body.len())
        .body(Body::from(body.to_owned()))
        .map_err(Into::into)
}

/// Responds with plain text
pub fn respond_text(status: StatusCode, body: &str) -> Result<Response<Body>> {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(Body::from(body.to_owned()))
        .map_err(Into::into)
}

/// Responds with an HTML page that must not be cached by clients.
pub fn respond_html(status: StatusCode, body: String) -> Result<Response<Body>> {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "text/html; charset=utf-8")
        .header(header::CACHE_CONTROL, "no-cache, no-store, must-revalidate")
        .body(Body::from(body))
        .map_err(Into::into)
}

/// Serves a resolved resource with the upstream content type and body untouched.
pub fn respond_reply(reply: ProxyReply) -> Result<Response<Body>> {
    let cache_control = match reply.max_age {
        Some(secs) => format!("public, max-age={secs}"),
        None => "no-cache".to_string(),
    };
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, reply.content_type)
        .header(header::CONTENT_LENGTH, reply.body.len())
        .header(header::CACHE_CONTROL, cache_control)
        .header(X_CACHE, reply.cache.to_string())
        .body(Body::from(reply.body))
        .map_err(Into::into)
}

/// Error page matching the failure class.
pub fn respond_error(err: &ProxyError) -> Result<Response<Body>> {
    let page = match err {
        ProxyError::BadRequest(_) => render::bad_request_page(),
        ProxyError::Forbidden { kind, identifier } => render::forbidden_page(*kind, identifier),
        ProxyError::Upstream { .. } => render::error_page(),
    };
    respond_html(err.status(), page)
}
