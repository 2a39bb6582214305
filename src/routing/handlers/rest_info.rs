//! Forward, then mask the upstream host inside JSON metadata.
//!
//! Upstream services describe themselves with absolute URLs (`soapUrl`,
//! `secureSoapUrl`, ...). A client following those would bypass the gateway,
//! so each configured property that points at the upstream host is rewritten
//! to the `Host` the client used to reach us.
//!
//! The body is buffered in full before it is inspected; metadata payloads
//! are small.

use std::time::Instant;

use axum::body::Body;
use axum::http::header::{CONTENT_ENCODING, HOST};
use axum::http::{Extensions, HeaderMap, Response, StatusCode};
use bytes::Bytes;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde_json::Value;

use crate::forward::ForwardError;
use crate::http::response::forward_error_response;
use crate::observability::metrics;
use crate::routing::handlers::{ForwardHandler, RequestContext, RequestHandler};
use crate::routing::matcher::HostCapture;

/// Response-rewriting pipeline.
#[derive(Debug, Clone)]
pub struct RestInfoHandler {
    base: ForwardHandler,
    capture: Option<HostCapture>,
    properties: Vec<String>,
}

impl RestInfoHandler {
    /// `capture` is derived from the service URL's hostname; without one the
    /// handler forwards without rewriting.
    pub fn new(base: ForwardHandler, capture: Option<HostCapture>, properties: Vec<String>) -> Self {
        Self {
            base,
            capture,
            properties,
        }
    }

    async fn handle(&self, ctx: RequestContext) -> Response<Body> {
        let start = Instant::now();
        let RequestContext {
            router,
            request,
            path_info,
        } = ctx;
        let method = request.method().clone();
        let client_host = request
            .headers()
            .get(HOST)
            .and_then(|h| h.to_str().ok())
            .map(str::to_string);

        let forwarder = self.base.forwarder();
        let result = async {
            let to = self.base.resolve(&path_info)?;
            let mut outcome = forwarder
                .forward(request, to.as_str(), true, None, Some(self.base.options()))
                .await?;
            let body = outcome.body().await.unwrap_or(Err(ForwardError::Abandoned))?;
            Ok::<_, ForwardError>((outcome.status, outcome.headers, outcome.extensions, body))
        }
        .await;

        let (status, mut headers, extensions, body) = match result {
            Ok(parts) => parts,
            Err(err) => {
                tracing::warn!(router = %router, error = %err, "Forwarding failed");
                metrics::record_forward_error(&router, err.kind());
                return forward_error_response(&err);
            }
        };
        metrics::record_forward(&router, method.as_str(), status.as_u16(), start);

        let rewritten = match (&self.capture, client_host.as_deref()) {
            (Some(capture), Some(host)) if status.is_success() => {
                rewrite_body(&body.decoded, &self.properties, capture, host)
            }
            _ => None,
        };

        match rewritten {
            Some(json) => {
                // The body is now decoded; the upstream encoding no longer applies.
                headers.remove(CONTENT_ENCODING);
                build_response(status, headers, extensions, json)
            }
            None => build_response(status, headers, extensions, body.raw),
        }
    }
}

impl RequestHandler for RestInfoHandler {
    fn on_request(&self, ctx: RequestContext) -> BoxFuture<'_, Response<Body>> {
        self.handle(ctx).boxed()
    }
}

fn build_response(
    status: StatusCode,
    headers: HeaderMap,
    extensions: Extensions,
    body: Bytes,
) -> Response<Body> {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    *response.extensions_mut() = extensions;
    response
}

/// Parse `body` as JSON, rewrite the host in each listed top-level property
/// and re-serialize. `None` when the body is not JSON.
pub fn rewrite_body(
    body: &[u8],
    properties: &[String],
    capture: &HostCapture,
    host: &str,
) -> Option<Bytes> {
    let mut value: Value = serde_json::from_slice(body).ok()?;

    if let Value::Object(map) = &mut value {
        for property in properties {
            let Some(Value::String(current)) = map.get_mut(property) else {
                continue;
            };
            if let Some(replaced) = capture.replace_host(current, host) {
                tracing::debug!(property = %property, from = %current, to = %replaced, "Rewrote upstream host");
                *current = replaced;
            }
        }
    }

    serde_json::to_vec(&value).ok().map(Bytes::from)
}
