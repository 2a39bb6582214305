//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request
//!     → fold_path_case (lowercase path, original kept in OriginalUri)
//!     → axum route lookup on <mount>/<serviceType>[/...] (accepted methods only)
//!     → router.rs (inject: RelativePathInfo, CORS headers)
//!     → handlers/ (forward | rest_info | tile)
//!     → Forwarder
//!
//! Router Construction (at startup):
//!     RouterConfig[]
//!     → matcher.rs (compile sub-path and host patterns)
//!     → pick handler variant from RouterKind
//!     → register method routes
//! ```
//!
//! # Design Decisions
//! - Routers are immutable after construction apart from the destroyed flag
//! - A request that reaches a router but fails its sub-path pattern is a
//!   mounting defect, reported as 500

pub mod handlers;
pub mod matcher;
pub mod router;

pub use handlers::{ForwardHandler, RequestContext, RequestHandler, RestInfoHandler, TileHandler};
pub use matcher::{HostCapture, RelativePathInfo, RoutingError, SubPathMatcher};
pub use router::{fold_path_case, ProxyRouter};
