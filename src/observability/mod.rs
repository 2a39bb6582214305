//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Routers, Forwarder, accept loop produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout (plain or JSON lines)
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! # Design Decisions
//! - Request ID (`x-request-id`) is set and propagated by the HTTP layer and
//!   appears on every request span
//! - Metrics are cheap no-ops until a recorder is installed

pub mod logging;
pub mod metrics;
