//! Sub-path extraction and self-referencing host detection.
//!
//! # Responsibilities
//! - Extract the part of a request path below the service-type segment
//! - Split it into ordered, non-decoded segments
//! - Find URLs that point back at the upstream host
//!
//! # Design Decisions
//! - Both patterns are compiled once per router from its configuration
//! - Service type matching is case-insensitive
//! - A path that does not match is a mounting defect, reported as
//!   [`RoutingError`], never as "not found"

use regex::{Captures, Regex};

use crate::config::ServiceType;

/// The part of a request path below the service-type segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelativePathInfo {
    /// Everything after `<serviceType>/`, without the query string.
    pub path: String,
    /// `path` split on `/`; empty trailing segments are kept.
    pub parts: Vec<String>,
}

impl RelativePathInfo {
    fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            parts: path.split('/').map(str::to_string).collect(),
        }
    }

    /// Segment at `index`, if present.
    pub fn part(&self, index: usize) -> Option<&str> {
        self.parts.get(index).map(String::as_str)
    }
}

/// A router was asked to handle a request it was never mounted for.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoutingError {
    #[error("router has no service type and cannot match '{path}'")]
    NoServiceType { path: String },

    #[error("'{path}' did not match the sub-path pattern for '{service_type}'")]
    SubPathMismatch { path: String, service_type: String },
}

/// Extracts [`RelativePathInfo`] from full request paths.
#[derive(Debug, Clone)]
pub struct SubPathMatcher {
    service_type: Option<ServiceType>,
    pattern: Option<Regex>,
}

impl SubPathMatcher {
    /// Build the `<anything>/<serviceType>/<rest>` pattern.
    ///
    /// Without a service type the matcher never matches.
    pub fn new(service_type: Option<ServiceType>) -> Self {
        // The escaped service type cannot produce an invalid pattern.
        let pattern = service_type.and_then(|t| {
            Regex::new(&format!(r"(?i)^.*?/{}(?:/(.*))?$", regex::escape(t.as_str()))).ok()
        });
        Self {
            service_type,
            pattern,
        }
    }

    /// Extract the sub-path from a full request path (mount prefix included,
    /// query string excluded).
    pub fn relative_path_info(&self, path: &str) -> Result<RelativePathInfo, RoutingError> {
        let (Some(pattern), Some(service_type)) = (&self.pattern, self.service_type) else {
            return Err(RoutingError::NoServiceType {
                path: path.to_string(),
            });
        };

        let captures = pattern
            .captures(path)
            .ok_or_else(|| RoutingError::SubPathMismatch {
                path: path.to_string(),
                service_type: service_type.to_string(),
            })?;

        let rest = captures.get(1).map(|m| m.as_str()).unwrap_or("");
        Ok(RelativePathInfo::new(rest))
    }
}

/// Finds `[scheme://]host[:port]` occurrences of the upstream host in a string.
///
/// Captures: 1 = `http://`, `https://` or empty, 2 = host with optional port,
/// 3 = path, query and fragment.
#[derive(Debug, Clone)]
pub struct HostCapture {
    hostname: String,
    pattern: Regex,
}

impl HostCapture {
    /// Build the pattern for an upstream hostname.
    pub fn new(hostname: &str) -> Result<Self, regex::Error> {
        let pattern = Regex::new(&format!(
            r"(?i)(https?://|^)({}(?::\d+)?)([/?#].*|$)",
            regex::escape(hostname)
        ))?;
        Ok(Self {
            hostname: hostname.to_string(),
            pattern,
        })
    }

    /// The upstream hostname this capture looks for.
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Split `value` into its three groups, if it refers to the upstream host.
    pub fn capture<'a>(&self, value: &'a str) -> Option<(&'a str, &'a str, &'a str)> {
        let captures = self.pattern.captures(value)?;
        let group = |i: usize| captures.get(i).map(|m| m.as_str()).unwrap_or("");
        Some((group(1), group(2), group(3)))
    }

    /// Replace the host group with `host`, keeping everything around it.
    /// Returns `None` when `value` does not mention the upstream host.
    pub fn replace_host(&self, value: &str, host: &str) -> Option<String> {
        if !self.pattern.is_match(value) {
            return None;
        }
        let replaced = self.pattern.replace(value, |caps: &Captures<'_>| {
            format!("{}{}{}", &caps[1], host, &caps[3])
        });
        Some(replaced.into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_rest_below_service_type() {
        let matcher = SubPathMatcher::new(Some(ServiceType::MapServer));
        let info = matcher
            .relative_path_info("/ArcGIS/rest/services/World_Street_Map/MapServer/0/tile/5/3/4")
            .unwrap();
        assert_eq!(info.path, "0/tile/5/3/4");
        assert_eq!(info.parts, vec!["0", "tile", "5", "3", "4"]);
    }

    #[test]
    fn match_is_case_insensitive() {
        let matcher = SubPathMatcher::new(Some(ServiceType::Info));
        let info = matcher.relative_path_info("/arcgis/rest/info").unwrap();
        assert_eq!(info.path, "");
        assert_eq!(info.parts, vec![""]);
    }

    #[test]
    fn trailing_slashes_and_encoding_preserved() {
        let matcher = SubPathMatcher::new(Some(ServiceType::FeatureServer));

        let with_slash = matcher.relative_path_info("/svc/FeatureServer/foo/").unwrap();
        assert_eq!(with_slash.path, "foo/");
        assert_eq!(with_slash.parts, vec!["foo", ""]);

        let without = matcher.relative_path_info("/svc/FeatureServer/foo").unwrap();
        assert_eq!(without.parts, vec!["foo"]);

        let encoded = matcher
            .relative_path_info("/svc/FeatureServer/0/query%20all/")
            .unwrap();
        assert_eq!(encoded.path, "0/query%20all/");
    }

    #[test]
    fn service_type_must_be_a_whole_segment() {
        let matcher = SubPathMatcher::new(Some(ServiceType::MapServer));
        let info = matcher
            .relative_path_info("/MapServerCache/MapServer/tile/1")
            .unwrap();
        assert_eq!(info.path, "tile/1");

        assert_eq!(
            matcher.relative_path_info("/services/MapServerX/tile"),
            Err(RoutingError::SubPathMismatch {
                path: "/services/MapServerX/tile".into(),
                service_type: "MapServer".into(),
            })
        );
    }

    #[test]
    fn missing_service_type_never_matches() {
        let matcher = SubPathMatcher::new(None);
        assert!(matches!(
            matcher.relative_path_info("/anything/MapServer/0"),
            Err(RoutingError::NoServiceType { .. })
        ));
    }

    #[test]
    fn host_capture_groups() {
        let capture = HostCapture::new("services.arcgisonline.com").unwrap();
        assert_eq!(
            capture.capture("https://services.arcgisonline.com/arcgis/services?wsdl"),
            Some(("https://", "services.arcgisonline.com", "/arcgis/services?wsdl"))
        );
        assert_eq!(
            capture.capture("services.arcgisonline.com/arcgis"),
            Some(("", "services.arcgisonline.com", "/arcgis"))
        );
    }

    #[test]
    fn replaces_only_the_host() {
        let capture = HostCapture::new("origin-host").unwrap();
        assert_eq!(
            capture.replace_host("http://origin-host/path?q=1", "gateway.example:3030"),
            Some("http://gateway.example:3030/path?q=1".to_string())
        );
        assert_eq!(
            capture.replace_host("http://ORIGIN-HOST:6080/arcgis/services", "gw:3030"),
            Some("http://gw:3030/arcgis/services".to_string())
        );
    }

    #[test]
    fn dots_are_literal_and_hosts_are_whole() {
        let capture = HostCapture::new("a.example.com").unwrap();
        assert_eq!(capture.replace_host("http://aXexample.com/x", "gw"), None);
        assert_eq!(capture.replace_host("http://a.example.com.evil.net/x", "gw"), None);
        assert_eq!(capture.replace_host("http://elsewhere/x", "gw"), None);
    }
}
