//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (hyper HTTP/1 connection, request ID, tracing)
//!     → routing layer (ProxyRouter per mount)
//!     → response.rs (error statuses, CORS defaults)
//!     → Send to client
//! ```

pub mod response;
pub mod server;

pub use server::Proxy;
