//! Outbound call execution.
//!
//! # Responsibilities
//! - Mirror an inbound request (method, headers, query, body) to a target URL
//! - Stream the inbound body upstream without buffering it
//! - Stream the upstream body to a destination, buffer and decode it for the
//!   caller, or both at once
//! - Chain through an upstream HTTP proxy when one is configured
//!
//! # Design Decisions
//! - One hyper client per Forwarder; the Forwarder holds no per-request
//!   state, so a single instance is shared by every router
//! - The client keeps upstream header-name casing; the casing travels in the
//!   response extensions to the downstream connection
//! - The upstream body is read by a single pump task that tees chunks to the
//!   destination and to the decode buffer; neither consumer can starve the
//!   other of data
//! - The timeout covers the whole call, body included
//! - Errors never cross into the downstream response here: the caller
//!   receives them and decides what the client sees

use std::io;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Extensions, HeaderMap, Method, Request, Response, StatusCode, Uri};
use bytes::{Bytes, BytesMut};
use futures_util::{Stream, StreamExt};
use hyper::body::Incoming;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_native_tls::native_tls;
use url::Url;

use crate::config::ForwarderConfig;
use crate::forward::connector::UpstreamConnector;
use crate::forward::decode::decode_body;
use crate::forward::error::ForwardError;
use crate::forward::headers::{outbound_headers, response_headers};
use crate::forward::tls;

/// Chunks buffered in a body channel before the sending task waits.
const BODY_CHANNEL_CAPACITY: usize = 16;

/// Options that override what the Forwarder derives from the inbound request.
#[derive(Debug, Clone, Default)]
pub struct ForwardOptions {
    /// Replace the inbound method.
    pub method: Option<Method>,
    /// Replace the configured timeout. `Duration::ZERO` disables it.
    pub timeout: Option<Duration>,
    /// Headers set on top of the copied inbound headers.
    pub headers: HeaderMap,
    /// Replace the inbound query string.
    pub query: Option<String>,
}

/// Writable end the upstream body is piped into.
#[derive(Debug)]
pub struct Destination {
    tx: mpsc::Sender<Result<Bytes, io::Error>>,
}

impl Destination {
    /// Create a destination and the response body that reads from it.
    pub fn channel() -> (Self, Body) {
        let (tx, rx) = mpsc::channel(BODY_CHANNEL_CAPACITY);
        let stream = futures_util::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|chunk| (chunk, rx))
        });
        (Self { tx }, Body::from_stream(stream))
    }
}

/// The fully buffered upstream body.
#[derive(Debug, Clone)]
pub struct ForwardedBody {
    /// Bytes exactly as the upstream sent them.
    pub raw: Bytes,
    /// `raw` with gzip removed; identical to `raw` for any other encoding.
    pub decoded: Bytes,
}

impl ForwardedBody {
    /// The decoded body as text.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.decoded).into_owned()
    }
}

/// Result of one outbound call. Consumed once by the request handler.
#[derive(Debug)]
pub struct ForwardOutcome {
    /// Upstream status.
    pub status: StatusCode,
    /// Upstream headers minus `Content-Length`.
    pub headers: HeaderMap,
    /// Unfiltered upstream headers.
    pub upstream_headers: HeaderMap,
    /// Upstream response extensions, including the original header-name
    /// casing. Moved onto the downstream response to keep that casing.
    pub extensions: Extensions,
    body: Option<oneshot::Receiver<Result<ForwardedBody, ForwardError>>>,
}

impl ForwardOutcome {
    /// Wait for the buffered body. `None` when decoding was not requested
    /// or the body was already taken.
    pub async fn body(&mut self) -> Option<Result<ForwardedBody, ForwardError>> {
        let rx = self.body.take()?;
        Some(rx.await.unwrap_or(Err(ForwardError::Abandoned)))
    }
}

/// Performs outbound HTTP(S) calls that mirror inbound requests.
#[derive(Debug, Clone)]
pub struct Forwarder {
    client: Client<UpstreamConnector, Body>,
    timeout: Duration,
    proxy: Option<Url>,
}

impl Forwarder {
    /// Build a Forwarder from configuration.
    pub fn new(config: &ForwarderConfig) -> Result<Self, ForwardError> {
        let proxy = config
            .proxy_url
            .as_deref()
            .map(|raw| {
                Url::parse(raw).map_err(|source| ForwardError::InvalidTarget {
                    url: raw.to_string(),
                    source,
                })
            })
            .transpose()?;

        let verify = config.tls_reject_unauthorized && tls::rejects_unauthorized();
        if proxy.is_some() && verify {
            tracing::warn!(
                env = tls::REJECT_UNAUTHORIZED_ENV,
                value = ?tls::env_value(),
                "Upstream proxy configured with TLS verification enabled"
            );
            tracing::warn!(
                "If you are forwarding calls to services with self-signed certificates, set {}=0 \
                 or call tls::allow_unauthorized()",
                tls::REJECT_UNAUTHORIZED_ENV
            );
        }

        let tls = native_tls::TlsConnector::builder()
            .danger_accept_invalid_certs(!verify)
            .danger_accept_invalid_hostnames(!verify)
            .build()
            .map_err(|err| ForwardError::Build(err.to_string()))?;
        let proxy_uri = proxy
            .as_ref()
            .map(|url| url.as_str().parse::<Uri>())
            .transpose()
            .map_err(|err| ForwardError::Build(err.to_string()))?;

        // Bodies are passed through untouched; decoding happens on demand.
        let client = Client::builder(TokioExecutor::new())
            .http1_preserve_header_case(true)
            .build(UpstreamConnector::new(tls.into(), proxy_uri));

        Ok(Self {
            client,
            timeout: Duration::from_millis(config.timeout_ms),
            proxy,
        })
    }

    /// Configured outbound timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Upstream proxy the calls are chained through, if any.
    pub fn proxy(&self) -> Option<&Url> {
        self.proxy.as_ref()
    }

    /// Forward `request` to `to`.
    ///
    /// The upstream body is piped into `destination` when one is given and
    /// discarded otherwise. When `decode` is set the body is also buffered and
    /// made available, decoded, through [`ForwardOutcome::body`].
    pub async fn forward(
        &self,
        request: Request<Body>,
        to: &str,
        decode: bool,
        destination: Option<Destination>,
        options: Option<&ForwardOptions>,
    ) -> Result<ForwardOutcome, ForwardError> {
        let inbound_path = request.uri().to_string();
        tracing::debug!(from = %inbound_path, to = %to, "Forwarding request");

        let timeout = options.and_then(|o| o.timeout).unwrap_or(self.timeout);
        let deadline = (!timeout.is_zero()).then(|| Instant::now() + timeout);

        let response = match self.send(request, to, options, deadline).await {
            Ok(response) => response,
            Err(err) => {
                tracing::debug!(to = %to, error = %err, "Forwarded request returned an error");
                return Err(err);
            }
        };

        let (parts, upstream) = response.into_parts();
        let headers = response_headers(&parts.headers);

        let (body, collector) = if decode {
            let (tx, rx) = oneshot::channel();
            (Some(rx), Some(tx))
        } else {
            (None, None)
        };

        tokio::spawn(pump(
            Body::new(upstream)
                .into_data_stream()
                .map(|chunk| chunk.map_err(|err| ForwardError::Transport(err.to_string()))),
            destination,
            collector,
            parts.headers.clone(),
            deadline,
            to.to_string(),
        ));

        Ok(ForwardOutcome {
            status: parts.status,
            headers,
            upstream_headers: parts.headers,
            extensions: parts.extensions,
            body,
        })
    }

    /// Forward `request` and answer with the upstream response.
    ///
    /// The returned response streams the identical upstream body; the outcome
    /// carries the decoded copy when `decode` is set.
    pub async fn auto_forward(
        &self,
        request: Request<Body>,
        to: &str,
        decode: bool,
        options: Option<&ForwardOptions>,
    ) -> Result<(Response<Body>, ForwardOutcome), ForwardError> {
        tracing::debug!(from = %request.uri(), to = %to, "Auto-forwarding request");

        let (destination, body) = Destination::channel();
        let mut outcome = self
            .forward(request, to, decode, Some(destination), options)
            .await?;

        let mut response = Response::new(body);
        *response.status_mut() = outcome.status;
        *response.headers_mut() = outcome.headers.clone();
        *response.extensions_mut() = std::mem::take(&mut outcome.extensions);
        Ok((response, outcome))
    }

    async fn send(
        &self,
        request: Request<Body>,
        to: &str,
        options: Option<&ForwardOptions>,
        deadline: Option<Instant>,
    ) -> Result<Response<Incoming>, ForwardError> {
        let mut url = Url::parse(to).map_err(|source| ForwardError::InvalidTarget {
            url: to.to_string(),
            source,
        })?;

        let (parts, body) = request.into_parts();

        let query = options
            .and_then(|o| o.query.clone())
            .or_else(|| parts.uri.query().map(str::to_string));
        if let Some(query) = query.filter(|q| !q.is_empty()) {
            let merged = match url.query() {
                Some(existing) if !existing.is_empty() => format!("{existing}&{query}"),
                _ => query,
            };
            url.set_query(Some(&merged));
        }

        let mut headers = outbound_headers(&parts.headers, url.host_str());
        if let Some(options) = options {
            for name in options.headers.keys() {
                headers.remove(name);
            }
            for (name, value) in &options.headers {
                headers.append(name.clone(), value.clone());
            }
        }
        let method = options
            .and_then(|o| o.method.clone())
            .unwrap_or(parts.method);
        let uri = url
            .as_str()
            .parse::<Uri>()
            .map_err(|err| ForwardError::Build(err.to_string()))?;

        let mut outbound = Request::new(body);
        *outbound.method_mut() = method;
        *outbound.uri_mut() = uri;
        *outbound.headers_mut() = headers;
        // Carries the inbound header-name casing to the outbound call.
        *outbound.extensions_mut() = parts.extensions;

        let call = self.client.request(outbound);
        let response = match deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, call)
                .await
                .map_err(|_| ForwardError::Timeout)?,
            None => call.await,
        };
        Ok(response?)
    }
}

/// Read the upstream body to the end, teeing it to the destination and the
/// decode buffer.
async fn pump<S>(
    mut upstream: S,
    mut destination: Option<Destination>,
    collector: Option<oneshot::Sender<Result<ForwardedBody, ForwardError>>>,
    headers: HeaderMap,
    deadline: Option<Instant>,
    to: String,
) where
    S: Stream<Item = Result<Bytes, ForwardError>> + Unpin,
{
    let mut buffer = collector.as_ref().map(|_| BytesMut::new());

    loop {
        let next = match deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, upstream.next())
                .await
                .unwrap_or(Some(Err(ForwardError::Timeout))),
            None => upstream.next().await,
        };

        match next {
            None => break,
            Some(Ok(chunk)) => {
                if let Some(buffer) = buffer.as_mut() {
                    buffer.extend_from_slice(&chunk);
                }
                if let Some(dest) = destination.as_ref() {
                    if dest.tx.send(Ok(chunk)).await.is_err() {
                        tracing::debug!(to = %to, "Downstream went away mid-body");
                        destination = None;
                    }
                }
            }
            Some(Err(err)) => {
                tracing::debug!(to = %to, error = %err, "Upstream body failed");
                if let Some(dest) = destination.take() {
                    let _ = dest.tx.send(Err(io::Error::other(err.to_string()))).await;
                }
                if let Some(collector) = collector {
                    let _ = collector.send(Err(err));
                }
                return;
            }
        }
    }

    if let (Some(collector), Some(buffer)) = (collector, buffer) {
        let raw = buffer.freeze();
        let result = decode_body(&headers, &raw)
            .map(|decoded| ForwardedBody { raw, decoded })
            .map_err(ForwardError::from);
        let _ = collector.send(result);
    }
}
