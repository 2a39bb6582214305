//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Outbound forwarding settings shared by every router.
    pub forwarder: ForwarderConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Service routers, one per mounted upstream service.
    pub routers: Vec<RouterConfig>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            listener: ListenerConfig::default(),
            timeouts: TimeoutConfig::default(),
            forwarder: ForwarderConfig::default(),
            observability: ObservabilityConfig::default(),
            routers: vec![
                RouterConfig {
                    name: "map-server".to_string(),
                    mount: "/ArcGIS/rest/services/Banana".to_string(),
                    kind: RouterKind::Tile,
                    service_url: Some(
                        "http://services.arcgisonline.com/ArcGIS/rest/services/World_Street_Map/MapServer/"
                            .to_string(),
                    ),
                    service_type: Some(ServiceType::MapServer),
                    ..RouterConfig::default()
                },
                RouterConfig {
                    name: "rest-info".to_string(),
                    mount: "/ArcGIS/rest".to_string(),
                    kind: RouterKind::RestInfo,
                    service_url: Some("http://services.arcgisonline.com/ArcGIS/rest/info/".to_string()),
                    service_type: Some(ServiceType::Info),
                    ..RouterConfig::default()
                },
                RouterConfig {
                    name: "feature-server".to_string(),
                    mount: "/ArcGIS/rest/services/Pineapple/Shoreline_BirdSightings".to_string(),
                    kind: RouterKind::Forward,
                    service_url: Some(
                        "https://sampleserver6.arcgisonline.com/arcgis/rest/services/LocalGovernment/Recreation/FeatureServer/"
                            .to_string(),
                    ),
                    service_type: Some(ServiceType::FeatureServer),
                    ..RouterConfig::default()
                },
            ],
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:3030").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3030".to_string(),
        }
    }
}

/// Timeout configuration for inbound connections.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Whole-request timeout applied in front of every router, in milliseconds.
    pub connect_ms: u64,

    /// Idle time after which an inbound socket is closed, in milliseconds.
    pub keep_alive_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_ms: 10_000,
            keep_alive_ms: 30_000,
        }
    }
}

/// Outbound call settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ForwarderConfig {
    /// Outbound request timeout in milliseconds.
    pub timeout_ms: u64,

    /// Optional HTTP proxy the outbound calls are tunneled through
    /// (e.g., a debugging proxy such as Fiddler).
    pub proxy_url: Option<String>,

    /// Verify upstream TLS certificates. Also disabled process-wide by
    /// `MAPGATE_TLS_REJECT_UNAUTHORIZED=0`.
    pub tls_reject_unauthorized: bool,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            proxy_url: None,
            tls_reject_unauthorized: true,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit logs as JSON lines.
    pub json: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json: false,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Class of upstream service. Embedded in the mount path and in the
/// sub-path pattern, so the serialized names are significant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum ServiceType {
    MapServer,
    FeatureServer,
    Info,
}

impl ServiceType {
    /// Path segment for this service type.
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceType::MapServer => "MapServer",
            ServiceType::FeatureServer => "FeatureServer",
            ServiceType::Info => "Info",
        }
    }
}

impl std::fmt::Display for ServiceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// HTTP methods a router can accept. `All` is the catch-all fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    All,
}

/// Which request pipeline a router runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RouterKind {
    /// Forward everything verbatim.
    #[default]
    Forward,
    /// Forward, then rewrite self-referencing hosts in JSON bodies.
    RestInfo,
    /// Forward, except for tile requests served from a local file.
    Tile,
}

/// A service router: one upstream service mounted under one path prefix.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Router identifier for logging/metrics.
    pub name: String,

    /// Path prefix the router is mounted under (without the service type).
    pub mount: String,

    /// Request pipeline variant.
    pub kind: RouterKind,

    /// Absolute base URL of the upstream service.
    pub service_url: Option<String>,

    /// Service type segment following the mount prefix.
    pub service_type: Option<ServiceType>,

    /// Outbound timeout for this router's calls, in milliseconds.
    pub timeout_ms: u64,

    /// Accepted HTTP methods.
    pub methods: Vec<HttpMethod>,

    /// JSON properties whose URL values get their host rewritten (`rest_info` only).
    pub rewrite_properties: Vec<String>,

    /// Local tile override (`tile` only).
    pub local_tiles: Option<LocalTileConfig>,

    /// Origins allowed to read responses with credentials. A listed request
    /// `Origin` is echoed back; any other gets the first entry. `"*"` as
    /// first entry allows everyone without credentials being usable.
    pub cors_origins: Vec<String>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            mount: "/".to_string(),
            kind: RouterKind::Forward,
            service_url: None,
            service_type: None,
            timeout_ms: 10_000,
            methods: vec![HttpMethod::All],
            rewrite_properties: vec!["soapUrl".to_string(), "secureSoapUrl".to_string()],
            local_tiles: None,
            cors_origins: vec!["http://www.arcgis.com".to_string()],
        }
    }
}

/// Serve one tile level from a local file instead of the upstream.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LocalTileConfig {
    /// Tile level (the path segment after `tile`).
    pub level: String,

    /// File served for every tile at that level.
    pub file: String,
}
