//! The gateway server.
//!
//! # Responsibilities
//! - Build one shared Forwarder and every configured ProxyRouter
//! - Create the axum Router from the routers' method routes, matched
//!   case-insensitively
//! - Wire up middleware (tracing, request ID, per-router timeout)
//! - Run the accept loop with idle timeouts and the connection registry
//! - Tear everything down exactly once on `destroy`

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use hyper::server::conn::http1;
use hyper_util::rt::TokioIo;
use hyper_util::service::TowerToHyperService;
use tokio::net::{TcpListener, TcpStream};
use tower::ServiceExt;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::validation::validate_config;
use crate::config::{ConfigError, ProxyConfig};
use crate::error::GatewayError;
use crate::forward::Forwarder;
use crate::lifecycle::Shutdown;
use crate::net::{ConnectionRegistry, IdleIo, IdleTracker};
use crate::routing::{fold_path_case, ProxyRouter};

/// Owns the Forwarder, the routers and every open inbound connection.
pub struct Proxy {
    config: ProxyConfig,
    forwarder: Arc<Forwarder>,
    routers: Vec<Arc<ProxyRouter>>,
    connections: ConnectionRegistry,
    shutdown: Shutdown,
    local_addr: Mutex<Option<SocketAddr>>,
    destroyed: AtomicBool,
}

impl Proxy {
    /// Validate `config` and build the Forwarder and routers. Nothing binds yet.
    pub fn new(config: ProxyConfig) -> Result<Self, GatewayError> {
        validate_config(&config).map_err(ConfigError::Validation)?;

        let forwarder = Arc::new(Forwarder::new(&config.forwarder)?);
        if let Some(proxy) = forwarder.proxy() {
            tracing::info!(proxy = %proxy, "Chaining outbound calls through upstream proxy");
        }

        let routers = config
            .routers
            .iter()
            .map(|router| Arc::new(ProxyRouter::from_config(router, Arc::clone(&forwarder))))
            .collect::<Vec<_>>();

        for router in &routers {
            tracing::info!(
                router = %router.name(),
                mount = %router.mount(),
                service_type = ?router.service_type(),
                service_url = ?router.service_url().map(|u| u.as_str()),
                "Router mounted"
            );
        }

        Ok(Self {
            config,
            forwarder,
            routers,
            connections: ConnectionRegistry::new(),
            shutdown: Shutdown::new(),
            local_addr: Mutex::new(None),
            destroyed: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// The Forwarder shared by every router.
    pub fn forwarder(&self) -> &Arc<Forwarder> {
        &self.forwarder
    }

    pub fn routers(&self) -> &[Arc<ProxyRouter>] {
        &self.routers
    }

    /// Address the accept loop is bound to, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Close handles currently registered, one per open inbound connection.
    pub fn listener_count(&self) -> usize {
        self.connections.len()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    /// Build the axum Router serving every router's routes.
    ///
    /// A router that does not answer within the connect timeout gets a 503.
    pub fn app(&self) -> Router {
        let connect_timeout = Duration::from_millis(self.config.timeouts.connect_ms);

        let mut routes = Router::new();
        for router in &self.routers {
            let mut mounted = router.routes();
            if !connect_timeout.is_zero() {
                mounted = mounted.layer(TimeoutLayer::with_status_code(
                    StatusCode::SERVICE_UNAVAILABLE,
                    connect_timeout,
                ));
            }
            routes = routes.merge(mounted);
        }

        let app = Router::new().fallback_service(routes.map_request(fold_path_case));
        app.layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("unknown");
                tracing::info_span!(
                    "request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id,
                )
            }))
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// Bind the configured address and start accepting in the background.
    pub async fn start(self: &Arc<Self>) -> Result<SocketAddr, GatewayError> {
        let address = self.config.listener.bind_address.clone();
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|source| GatewayError::Bind { address, source })?;
        self.start_with(listener)
    }

    /// Start accepting on an already bound listener in the background.
    pub fn start_with(self: &Arc<Self>, listener: TcpListener) -> Result<SocketAddr, GatewayError> {
        let addr = listener.local_addr()?;
        *self.local_addr.lock().unwrap_or_else(PoisonError::into_inner) = Some(addr);

        let proxy = Arc::clone(self);
        tokio::spawn(async move { proxy.serve(listener).await });
        Ok(addr)
    }

    /// Accept connections until the proxy is destroyed.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) {
        let mut shutdown = self.shutdown.subscribe();
        if self.is_destroyed() {
            return;
        }

        let app = self.app();
        let keep_alive = Duration::from_millis(self.config.timeouts.keep_alive_ms);
        if let Ok(addr) = listener.local_addr() {
            tracing::info!(address = %addr, routers = self.routers.len(), "Gateway listening");
        }

        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => self.spawn_connection(stream, peer, app.clone(), keep_alive),
                    Err(err) => tracing::warn!(error = %err, "Failed to accept connection"),
                },
            }
        }

        tracing::info!("Gateway stopped accepting connections");
    }

    fn spawn_connection(&self, stream: TcpStream, peer: SocketAddr, app: Router, keep_alive: Duration) {
        let Some((guard, closed)) = self.connections.register() else {
            tracing::debug!(peer = %peer, "Refusing connection after teardown");
            return;
        };
        let tracker = IdleTracker::new();
        let io = TokioIo::new(IdleIo::new(stream, Arc::clone(&tracker)));
        let service = TowerToHyperService::new(app);
        tracing::debug!(connection_id = %guard.id(), peer = %peer, "Connection accepted");

        tokio::spawn(async move {
            let connection = http1::Builder::new()
                .preserve_header_case(true)
                .serve_connection(io, service);
            tokio::pin!(connection);

            tokio::select! {
                result = connection.as_mut() => {
                    if let Err(err) = result {
                        tracing::debug!(connection_id = %guard.id(), error = %err, "Connection error");
                    }
                }
                _ = tracker.wait_idle(keep_alive), if !keep_alive.is_zero() => {
                    tracing::debug!(connection_id = %guard.id(), "Closing idle connection");
                }
                _ = closed => {
                    tracing::debug!(connection_id = %guard.id(), "Connection closed by teardown");
                }
            }
            drop(guard);
        });
    }

    /// Stop accepting, close every open connection and destroy every router.
    /// Later calls do nothing.
    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }

        self.shutdown.trigger();
        let closed = self.connections.close_all();
        for router in &self.routers {
            router.destroy();
        }
        tracing::info!(
            closed_connections = closed,
            listener_count = self.connections.len(),
            "Gateway destroyed"
        );
    }
}
