//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → Validate → Init logging/metrics → Proxy::new → start
//!
//! Shutdown:
//!     signals.rs (Ctrl-C / SIGTERM) → Proxy::destroy
//!         → shutdown.rs broadcast stops the accept loop
//!         → connection registry closes every open socket
//!         → every router is destroyed
//! ```

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::shutdown_signal;
