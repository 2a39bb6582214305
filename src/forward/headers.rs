//! Header surgery for forwarded calls.
//!
//! # Rules
//! - Outbound: every inbound header is copied, `Host` is replaced by the
//!   target's hostname
//! - Inbound (upstream → client): every header is copied except
//!   `Content-Length`, which no longer describes the body once it may be
//!   re-chunked or rewritten

use axum::http::header::{CONTENT_LENGTH, HOST};
use axum::http::{HeaderMap, HeaderValue};

/// Copy the inbound request headers for the outbound call, pointing `Host`
/// at the upstream hostname.
pub fn outbound_headers(inbound: &HeaderMap, target_host: Option<&str>) -> HeaderMap {
    let mut headers = inbound.clone();
    headers.remove(HOST);
    if let Some(value) = target_host.and_then(|h| HeaderValue::from_str(h).ok()) {
        headers.insert(HOST, value);
    }
    headers
}

/// Copy upstream response headers onto `destination`, skipping `Content-Length`.
///
/// Multi-valued headers keep every value. Upstream values replace anything
/// already set under the same name. `HeaderName` compares case-insensitively,
/// so `content-length`, `Content-Length` and `CONTENT-LENGTH` are all dropped.
pub fn extend_response_headers(destination: &mut HeaderMap, source: &HeaderMap) {
    let mut previous = None;
    for (name, value) in source {
        if name == CONTENT_LENGTH {
            continue;
        }
        if previous.as_ref() != Some(name) {
            destination.remove(name);
            previous = Some(name.clone());
        }
        destination.append(name.clone(), value.clone());
    }
}

/// Upstream response headers as they are passed downstream.
pub fn response_headers(source: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(source.len());
    extend_response_headers(&mut headers, source);
    headers
}
