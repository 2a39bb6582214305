//! Request pipelines a [`ProxyRouter`](super::ProxyRouter) can run.
//!
//! Every variant implements [`RequestHandler`]. Specialized variants hold the
//! default [`ForwardHandler`] and call it explicitly before, after or instead
//! of their own logic.

pub mod forward;
pub mod rest_info;
pub mod tile;

use axum::body::Body;
use axum::http::{Request, Response};
use futures_util::future::BoxFuture;

use crate::routing::matcher::RelativePathInfo;

pub use forward::ForwardHandler;
pub use rest_info::RestInfoHandler;
pub use tile::TileHandler;

/// Per-request state produced by the inject stage.
#[derive(Debug)]
pub struct RequestContext {
    /// Router that accepted the request.
    pub router: String,
    /// The inbound request. Its extensions also carry the path info.
    pub request: Request<Body>,
    /// Sub-path below the service-type segment.
    pub path_info: RelativePathInfo,
}

/// The method handler stage of a router.
pub trait RequestHandler: Send + Sync + std::fmt::Debug {
    /// Produce the response for one request.
    fn on_request(&self, ctx: RequestContext) -> BoxFuture<'_, Response<Body>>;
}
