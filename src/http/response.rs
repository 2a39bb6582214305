//! Response handling and transformation.
//!
//! # Responsibilities
//! - Map forwarding and routing failures to HTTP status codes
//! - Add the cross-origin headers every gateway response carries
//!
//! # Design Decisions
//! - Upstream timeouts result in 504 Gateway Timeout, a sub-path that leaves
//!   the service in 400 Bad Request, every other forwarding failure in
//!   502 Bad Gateway; bodies stay empty (no error envelope)
//! - A routing mismatch is a mounting defect and answers 500, not 404
//! - Headers already present (e.g. mirrored from the upstream) win over the
//!   defaults

use axum::body::Body;
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_ORIGIN, ORIGIN, VARY,
};
use axum::http::{HeaderMap, HeaderValue, Response, StatusCode};
use axum::response::IntoResponse;

use crate::forward::ForwardError;
use crate::routing::RoutingError;

/// Status the client sees for a failed forward.
pub fn forward_error_status(err: &ForwardError) -> StatusCode {
    match err {
        ForwardError::Timeout => StatusCode::GATEWAY_TIMEOUT,
        ForwardError::OutsideService { .. } => StatusCode::BAD_REQUEST,
        _ => StatusCode::BAD_GATEWAY,
    }
}

/// Empty response for a failed forward.
pub fn forward_error_response(err: &ForwardError) -> Response<Body> {
    forward_error_status(err).into_response()
}

/// Response for a router that was dispatched a request it cannot own.
pub fn routing_error_response(_err: &RoutingError) -> Response<Body> {
    StatusCode::INTERNAL_SERVER_ERROR.into_response()
}

/// Cross-origin headers for a request with the given headers.
///
/// The request `Origin` is echoed only when it is in `allowed`; any other
/// request gets the first allowed entry. No allowed origins, no
/// `Access-Control-Allow-Origin`.
pub fn cors_headers(request_headers: &HeaderMap, allowed: &[HeaderValue]) -> HeaderMap {
    let origin = request_headers
        .get(ORIGIN)
        .filter(|origin| allowed.contains(origin))
        .or_else(|| allowed.first())
        .cloned();

    let mut headers = HeaderMap::with_capacity(3);
    if let Some(origin) = origin {
        headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin);
    }
    headers.insert(ACCESS_CONTROL_ALLOW_CREDENTIALS, HeaderValue::from_static("true"));
    headers.insert(VARY, HeaderValue::from_static("Origin"));
    headers
}

/// Set each header in `defaults` that the response does not already carry.
pub fn apply_default_headers(response: &mut Response<Body>, defaults: HeaderMap) {
    let headers = response.headers_mut();
    for (name, value) in defaults {
        if let Some(name) = name {
            if !headers.contains_key(&name) {
                headers.insert(name, value);
            }
        }
    }
}
