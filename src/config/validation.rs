//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate URLs and addresses before anything binds or connects
//! - Detect routers that would collide on the same mount point; mounts
//!   match case-insensitively, so so do collisions
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Missing service type/URL and empty method lists are *not* errors: the
//!   router is built in a degraded mode and warns at construction
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>

use std::collections::HashSet;
use std::net::SocketAddr;

use axum::http::HeaderValue;
use url::Url;

use crate::config::schema::ProxyConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("listener.bind_address '{0}' is not a socket address")]
    BindAddress(String),

    #[error("forwarder.proxy_url '{0}' is not an absolute URL")]
    ProxyUrl(String),

    #[error("router '{router}': service_url '{url}' is not an absolute URL")]
    ServiceUrl { router: String, url: String },

    #[error("router '{0}': mount must start with '/'")]
    Mount(String),

    #[error("router '{0}': duplicate mount and service type")]
    DuplicateMount(String),

    #[error("router '{router}': cors origin '{origin}' is not a valid header value")]
    CorsOrigin { router: String, origin: String },
}

/// Validate a configuration, collecting every problem.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(config.listener.bind_address.clone()));
    }

    if let Some(proxy_url) = &config.forwarder.proxy_url {
        if Url::parse(proxy_url).is_err() {
            errors.push(ValidationError::ProxyUrl(proxy_url.clone()));
        }
    }

    let mut mounts = HashSet::new();
    for router in &config.routers {
        if !router.mount.starts_with('/') {
            errors.push(ValidationError::Mount(router.name.clone()));
        }

        if let Some(service_url) = &router.service_url {
            if Url::parse(service_url).is_err() {
                errors.push(ValidationError::ServiceUrl {
                    router: router.name.clone(),
                    url: service_url.clone(),
                });
            }
        }

        for origin in &router.cors_origins {
            if HeaderValue::from_str(origin).is_err() {
                errors.push(ValidationError::CorsOrigin {
                    router: router.name.clone(),
                    origin: origin.clone(),
                });
            }
        }

        let key = (
            router.mount.trim_end_matches('/').to_ascii_lowercase(),
            router.service_type.map(|t| t.as_str().to_ascii_lowercase()),
        );
        if router.service_type.is_some() && !mounts.insert(key) {
            errors.push(ValidationError::DuplicateMount(router.name.clone()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
