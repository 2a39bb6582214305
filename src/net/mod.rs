//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → connection.rs (register close handle)
//!     → idle.rs (wrap stream, track inactivity)
//!     → Hand off to HTTP layer
//!
//! Connection ends:
//!     normally       → guard drop deregisters it
//!     idle timeout   → connection task drops the socket
//!     proxy teardown → registry signals it, task drops the socket
//! ```

pub mod connection;
pub mod idle;

pub use connection::{ConnectionGuard, ConnectionId, ConnectionRegistry};
pub use idle::{IdleIo, IdleTracker};
