//! Reverse-proxy gateway for geospatial REST services.
//!
//! Each upstream service (map tiles, features, service info) is mounted under
//! a path prefix and forwarded through one shared [`Forwarder`]; JSON
//! metadata is patched so clients only ever see the gateway's address.

pub mod config;
pub mod error;
pub mod forward;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod routing;

pub use config::schema::ProxyConfig;
pub use error::GatewayError;
pub use forward::Forwarder;
pub use http::Proxy;
pub use routing::ProxyRouter;
