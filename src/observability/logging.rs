//! Structured logging.
//!
//! `RUST_LOG` wins over the configured level when set. JSON lines are meant
//! for log aggregation, the default format for terminals.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::ObservabilityConfig;

/// Default filter for a configured level: the gateway at `level`, HTTP
/// plumbing one step quieter unless tracing everything.
fn default_filter(level: &str) -> String {
    format!("mapgate={level},tower_http={level},hyper=warn,hyper_util=warn")
}

/// Install the global subscriber. A second call is ignored.
pub fn init_logging(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(&config.log_level)));

    let registry = tracing_subscriber::registry().with(filter);
    let result = if config.json {
        registry.with(tracing_subscriber::fmt::layer().json()).try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };

    if result.is_err() {
        tracing::debug!("Logging already initialized");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_scopes_the_gateway() {
        let filter = default_filter("debug");
        assert!(filter.starts_with("mapgate=debug"));
        assert!(filter.parse::<EnvFilter>().is_ok());
    }
}
