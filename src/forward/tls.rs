//! Process-wide TLS verification toggle.
//!
//! Intercepting proxies (Fiddler and friends) present certificates that will
//! not verify, so a gateway chained through one usually has to stop checking.
//! The toggle is read when a [`Forwarder`](super::Forwarder) is built.

use std::sync::atomic::{AtomicBool, Ordering};

/// Set to `0` to disable certificate verification for every outbound call.
pub const REJECT_UNAUTHORIZED_ENV: &str = "MAPGATE_TLS_REJECT_UNAUTHORIZED";

static ALLOW_UNAUTHORIZED: AtomicBool = AtomicBool::new(false);

/// Disable upstream certificate verification for every Forwarder built afterwards.
pub fn allow_unauthorized() {
    ALLOW_UNAUTHORIZED.store(true, Ordering::SeqCst);
}

/// Whether upstream certificates are verified process-wide.
pub fn rejects_unauthorized() -> bool {
    if ALLOW_UNAUTHORIZED.load(Ordering::SeqCst) {
        return false;
    }
    std::env::var(REJECT_UNAUTHORIZED_ENV)
        .map(|value| value.trim() != "0")
        .unwrap_or(true)
}

/// Current value of the environment toggle, for diagnostics.
pub fn env_value() -> Option<String> {
    std::env::var(REJECT_UNAUTHORIZED_ENV).ok()
}
