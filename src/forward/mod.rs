//! Outbound forwarding subsystem.
//!
//! # Data Flow
//! ```text
//! inbound Request<Body>
//!     → forwarder.rs (build outbound call: method, headers, query, body stream)
//!     → connector.rs (TCP, TLS, or through the upstream proxy)
//!     → upstream service
//!     → headers.rs (drop Content-Length, keep the rest)
//!     → pump: destination stream ─┐
//!                                 ├─ both fed from one upstream read
//!             decode buffer ──────┘→ decode.rs (gunzip) → ForwardOutcome::body
//! ```

pub mod connector;
pub mod decode;
pub mod error;
pub mod forwarder;
pub mod headers;
pub mod tls;

pub use error::ForwardError;
pub use forwarder::{Destination, ForwardOptions, ForwardOutcome, ForwardedBody, Forwarder};
