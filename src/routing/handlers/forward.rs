//! Default pipeline: forward everything.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::Response;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use url::Url;

use crate::forward::{ForwardError, ForwardOptions, Forwarder};
use crate::http::response::forward_error_response;
use crate::observability::metrics;
use crate::routing::handlers::{RequestContext, RequestHandler};
use crate::routing::matcher::RelativePathInfo;

/// Forwards every request to `<service_url><sub-path>` and streams the
/// upstream response back.
#[derive(Debug, Clone)]
pub struct ForwardHandler {
    forwarder: Arc<Forwarder>,
    service_url: Option<Url>,
    options: ForwardOptions,
}

impl ForwardHandler {
    pub fn new(forwarder: Arc<Forwarder>, service_url: Option<Url>, timeout: Duration) -> Self {
        Self {
            forwarder,
            service_url,
            options: ForwardOptions {
                timeout: Some(timeout),
                ..ForwardOptions::default()
            },
        }
    }

    /// Shared Forwarder.
    pub fn forwarder(&self) -> &Forwarder {
        &self.forwarder
    }

    /// Per-router overrides passed on every forward.
    pub fn options(&self) -> &ForwardOptions {
        &self.options
    }

    /// Absolute upstream URL for a sub-path.
    ///
    /// The sub-path is appended to the service URL, never resolved against
    /// it: a result whose origin or path leaves the service is rejected.
    pub fn resolve(&self, info: &RelativePathInfo) -> Result<Url, ForwardError> {
        let base = self
            .service_url
            .as_ref()
            .ok_or_else(|| ForwardError::Build("no service url configured".to_string()))?;

        let mut prefix = base.clone();
        prefix.set_query(None);
        prefix.set_fragment(None);
        let mut target = prefix.to_string();
        if !info.path.is_empty() && !target.ends_with('/') {
            target.push('/');
        }
        target.push_str(&info.path);

        let mut url = Url::parse(&target).map_err(|source| ForwardError::InvalidTarget {
            url: target.clone(),
            source,
        })?;
        let scope = base.path().trim_end_matches('/');
        let inside = url.path() == base.path()
            || url
                .path()
                .strip_prefix(scope)
                .is_some_and(|rest| rest.starts_with('/'));
        if url.origin() != base.origin() || !inside {
            return Err(ForwardError::OutsideService { url: target });
        }
        url.set_query(base.query());
        Ok(url)
    }

    /// The default behavior, callable by wrapping handlers.
    pub async fn forward(&self, ctx: RequestContext) -> Response<Body> {
        let start = Instant::now();
        let method = ctx.request.method().clone();

        let result = match self.resolve(&ctx.path_info) {
            Ok(to) => {
                self.forwarder
                    .auto_forward(ctx.request, to.as_str(), false, Some(&self.options))
                    .await
            }
            Err(err) => Err(err),
        };

        match result {
            Ok((response, _outcome)) => {
                metrics::record_forward(&ctx.router, method.as_str(), response.status().as_u16(), start);
                response
            }
            Err(err) => {
                tracing::warn!(router = %ctx.router, error = %err, "Forwarding failed");
                metrics::record_forward_error(&ctx.router, err.kind());
                forward_error_response(&err)
            }
        }
    }
}

impl RequestHandler for ForwardHandler {
    fn on_request(&self, ctx: RequestContext) -> BoxFuture<'_, Response<Body>> {
        self.forward(ctx).boxed()
    }
}
