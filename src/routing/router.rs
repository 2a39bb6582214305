//! Per-service router: inject, dispatch by method, teardown.
//!
//! # Responsibilities
//! - Register the accepted methods under `<mount>/<serviceType>`
//! - Derive [`RelativePathInfo`] for every request it receives
//! - Add the cross-origin headers to every response
//! - Hand the request to its [`RequestHandler`] variant
//!
//! # Design Decisions
//! - Missing service type, service URL or methods only degrade the router;
//!   the gateway keeps serving its other routers
//! - Mount and service type match case-insensitively: routes are registered
//!   lowercased and request paths are folded by [`fold_path_case`] before
//!   lookup; the original path is kept in [`OriginalUri`] for the sub-path
//! - The sub-path pattern never decides routing on its own
//! - Variants are chosen once at construction from [`RouterKind`]

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::OriginalUri;
use axum::http::uri::PathAndQuery;
use axum::http::{HeaderValue, Request, Response, StatusCode, Uri};
use axum::response::IntoResponse;
use axum::routing::MethodRouter;
use url::Url;

use crate::config::{HttpMethod, RouterConfig, RouterKind, ServiceType};
use crate::forward::Forwarder;
use crate::http::response::{apply_default_headers, cors_headers, routing_error_response};
use crate::routing::handlers::{
    ForwardHandler, RequestContext, RequestHandler, RestInfoHandler, TileHandler,
};
use crate::routing::matcher::{HostCapture, RelativePathInfo, RoutingError, SubPathMatcher};

/// One upstream service mounted under one path prefix.
#[derive(Debug)]
pub struct ProxyRouter {
    name: String,
    mount: String,
    service_type: Option<ServiceType>,
    service_url: Option<Url>,
    methods: Vec<HttpMethod>,
    cors_origins: Vec<HeaderValue>,
    matcher: SubPathMatcher,
    handler: Arc<dyn RequestHandler>,
    destroyed: AtomicBool,
}

impl ProxyRouter {
    /// Build a router around an explicit handler.
    pub fn new(config: &RouterConfig, handler: Arc<dyn RequestHandler>) -> Self {
        if config.service_type.is_none() {
            tracing::warn!(router = %config.name, "No service type configured; router will never match");
        }
        if config.service_url.is_none() {
            tracing::warn!(router = %config.name, "No service url configured; forwards will fail");
        }
        if config.methods.is_empty() {
            tracing::warn!(router = %config.name, "No accepted methods configured; router is unreachable");
        }

        Self {
            name: config.name.clone(),
            mount: config.mount.trim_end_matches('/').to_string(),
            service_type: config.service_type,
            service_url: parse_service_url(config),
            methods: config.methods.clone(),
            cors_origins: parse_cors_origins(config),
            matcher: SubPathMatcher::new(config.service_type),
            handler,
            destroyed: AtomicBool::new(false),
        }
    }

    /// Build a router and the handler variant its kind asks for.
    pub fn from_config(config: &RouterConfig, forwarder: Arc<Forwarder>) -> Self {
        let service_url = parse_service_url(config);
        let base = ForwardHandler::new(
            forwarder,
            service_url.clone(),
            Duration::from_millis(config.timeout_ms),
        );

        let handler: Arc<dyn RequestHandler> = match config.kind {
            RouterKind::Forward => Arc::new(base),
            RouterKind::RestInfo => {
                let capture = service_url
                    .as_ref()
                    .and_then(Url::host_str)
                    .and_then(|host| HostCapture::new(host).ok());
                Arc::new(RestInfoHandler::new(
                    base,
                    capture,
                    config.rewrite_properties.clone(),
                ))
            }
            RouterKind::Tile => {
                let local = config
                    .local_tiles
                    .as_ref()
                    .map(|tiles| (tiles.level.clone(), PathBuf::from(&tiles.file)));
                if local.is_none() {
                    tracing::debug!(router = %config.name, "Tile router without local tiles forwards everything");
                }
                Arc::new(TileHandler::new(base, local))
            }
        };

        Self::new(config, handler)
    }

    /// Router name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Mount prefix without a trailing slash.
    pub fn mount(&self) -> &str {
        &self.mount
    }

    pub fn service_type(&self) -> Option<ServiceType> {
        self.service_type
    }

    pub fn service_url(&self) -> Option<&Url> {
        self.service_url.as_ref()
    }

    /// Sub-path of a full request path.
    pub fn relative_path_info(&self, path: &str) -> Result<RelativePathInfo, RoutingError> {
        self.matcher.relative_path_info(path)
    }

    /// Inject stage: compute the path info from the original request path
    /// and attach it to the request extensions.
    pub fn inject(&self, request: &mut Request<Body>) -> Result<RelativePathInfo, RoutingError> {
        let path = request
            .extensions()
            .get::<OriginalUri>()
            .map(|uri| uri.path().to_string())
            .unwrap_or_else(|| request.uri().path().to_string());

        let info = self.relative_path_info(&path)?;
        request.extensions_mut().insert(info.clone());
        Ok(info)
    }

    /// Run one request through inject and the handler.
    pub async fn dispatch(&self, mut request: Request<Body>) -> Response<Body> {
        let cors = cors_headers(request.headers(), &self.cors_origins);

        let mut response = if self.is_destroyed() {
            tracing::debug!(router = %self.name, "Request for destroyed router");
            StatusCode::SERVICE_UNAVAILABLE.into_response()
        } else {
            match self.inject(&mut request) {
                Ok(path_info) => {
                    let ctx = RequestContext {
                        router: self.name.clone(),
                        request,
                        path_info,
                    };
                    self.handler.on_request(ctx).await
                }
                Err(err) => {
                    tracing::error!(router = %self.name, error = %err, "Router dispatched a request it cannot match");
                    routing_error_response(&err)
                }
            }
        };

        apply_default_headers(&mut response, cors);
        response
    }

    /// Routes for this router: `<mount>/<serviceType>`, with and without a
    /// trailing slash, and everything below it.
    ///
    /// Registered lowercased; serve them behind [`fold_path_case`]. Empty
    /// when the router is degraded.
    pub fn routes(self: &Arc<Self>) -> axum::Router {
        let Some(service_type) = self.service_type else {
            return axum::Router::new();
        };
        if self.methods.is_empty() {
            return axum::Router::new();
        }

        let base = format!("{}/{}", self.mount, service_type.as_str()).to_ascii_lowercase();
        let methods = self.method_router();
        axum::Router::new()
            .route(&base, methods.clone())
            .route(&format!("{base}/"), methods.clone())
            .route(&format!("{base}/{{*rest}}"), methods)
    }

    fn method_router(self: &Arc<Self>) -> MethodRouter {
        let mut seen = HashSet::new();
        let mut methods = MethodRouter::new();

        for method in self.methods.iter().filter(|m| seen.insert(**m)) {
            let router = Arc::clone(self);
            let handler = move |request: Request<Body>| async move { router.dispatch(request).await };
            methods = match method {
                HttpMethod::Get => methods.get(handler),
                HttpMethod::Post => methods.post(handler),
                HttpMethod::Put => methods.put(handler),
                HttpMethod::Delete => methods.delete(handler),
                HttpMethod::All => methods.fallback(handler),
            };
        }
        methods
    }

    /// Release the router. Later requests answer 503.
    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!(router = %self.name, "Router destroyed");
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }
}

/// Lowercase the request path so it meets the lowercased routes.
///
/// The query is left untouched and the path as received stays available
/// through [`OriginalUri`].
pub fn fold_path_case(mut request: Request<Body>) -> Request<Body> {
    if request.extensions().get::<OriginalUri>().is_none() {
        let original = OriginalUri(request.uri().clone());
        request.extensions_mut().insert(original);
    }

    let path = request.uri().path();
    if !path.bytes().any(|b| b.is_ascii_uppercase()) {
        return request;
    }
    let folded = match request.uri().query() {
        Some(query) => format!("{}?{query}", path.to_ascii_lowercase()),
        None => path.to_ascii_lowercase(),
    };

    let mut parts = request.uri().clone().into_parts();
    match PathAndQuery::try_from(folded) {
        Ok(path_and_query) => parts.path_and_query = Some(path_and_query),
        Err(_) => return request,
    }
    if let Ok(uri) = Uri::from_parts(parts) {
        *request.uri_mut() = uri;
    }
    request
}

fn parse_cors_origins(config: &RouterConfig) -> Vec<HeaderValue> {
    config
        .cors_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::warn!(router = %config.name, origin = %origin, error = %err, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect()
}

fn parse_service_url(config: &RouterConfig) -> Option<Url> {
    let raw = config.service_url.as_deref()?;
    match Url::parse(raw) {
        Ok(url) => Some(url),
        Err(err) => {
            tracing::warn!(router = %config.name, url = %raw, error = %err, "Ignoring invalid service url");
            None
        }
    }
}
