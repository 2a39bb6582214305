//! Upstream connections for the outbound client.
//!
//! # Responsibilities
//! - Open TCP (and TLS for `https`) connections to upstream services
//! - Chain through an HTTP proxy: plain calls are sent in absolute form to
//!   the proxy, TLS calls are tunneled with `CONNECT`
//!
//! # Design Decisions
//! - TCP setup is left to hyper-util's `HttpConnector`
//! - Certificate checks follow the process-wide toggle in [`tls`](super::tls),
//!   decided once when the Forwarder is built

use std::fmt;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::http::uri::Scheme;
use axum::http::Uri;
use futures_util::future::BoxFuture;
use hyper::rt::{Read, ReadBufCursor, Write};
use hyper_util::client::legacy::connect::{Connected, Connection, HttpConnector};
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_native_tls::{TlsConnector, TlsStream};
use tower::{Service, ServiceExt};

/// Upper bound for a proxy's answer to `CONNECT`.
const MAX_TUNNEL_RESPONSE: usize = 8 * 1024;

/// Connects the outbound client to upstreams, directly or through a proxy.
#[derive(Clone)]
pub struct UpstreamConnector {
    http: HttpConnector,
    tls: TlsConnector,
    proxy: Option<Uri>,
}

impl fmt::Debug for UpstreamConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamConnector")
            .field("proxy", &self.proxy)
            .finish_non_exhaustive()
    }
}

impl UpstreamConnector {
    pub fn new(tls: TlsConnector, proxy: Option<Uri>) -> Self {
        let mut http = HttpConnector::new();
        http.enforce_http(false);
        http.set_nodelay(true);
        Self { http, tls, proxy }
    }

    async fn connect(self, uri: Uri) -> io::Result<UpstreamStream> {
        let host = uri
            .host()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "upstream uri has no host"))?
            .to_string();
        let https = uri.scheme() == Some(&Scheme::HTTPS);
        let port = uri.port_u16().unwrap_or(if https { 443 } else { 80 });

        match (self.proxy.clone(), https) {
            (None, false) => Ok(UpstreamStream::Plain {
                io: self.tcp(uri).await?,
                proxied: false,
            }),
            (None, true) => {
                let tcp = self.tcp(uri).await?.into_inner();
                self.handshake(&host, tcp).await
            }
            (Some(proxy), false) => Ok(UpstreamStream::Plain {
                io: self.tcp(proxy).await?,
                proxied: true,
            }),
            (Some(proxy), true) => {
                let mut tcp = self.tcp(proxy).await?.into_inner();
                tunnel(&mut tcp, &format!("{host}:{port}")).await?;
                self.handshake(&host, tcp).await
            }
        }
    }

    async fn tcp(&self, uri: Uri) -> io::Result<TokioIo<TcpStream>> {
        self.http.clone().oneshot(uri).await.map_err(io::Error::other)
    }

    async fn handshake(&self, host: &str, tcp: TcpStream) -> io::Result<UpstreamStream> {
        let domain = host.trim_start_matches('[').trim_end_matches(']');
        let stream = self.tls.connect(domain, tcp).await.map_err(io::Error::other)?;
        Ok(UpstreamStream::Tls(TokioIo::new(stream)))
    }
}

impl Service<Uri> for UpstreamConnector {
    type Response = UpstreamStream;
    type Error = io::Error;
    type Future = BoxFuture<'static, io::Result<UpstreamStream>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, uri: Uri) -> Self::Future {
        Box::pin(self.clone().connect(uri))
    }
}

/// Ask an HTTP proxy to open a tunnel to `authority` (`host:port`).
pub async fn tunnel<S>(stream: &mut S, authority: &str) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let request = format!("CONNECT {authority} HTTP/1.1\r\nHost: {authority}\r\n\r\n");
    stream.write_all(request.as_bytes()).await?;

    let mut response = Vec::new();
    let mut chunk = [0u8; 1024];
    while !response.windows(4).any(|w| w == b"\r\n\r\n") {
        if response.len() > MAX_TUNNEL_RESPONSE {
            return Err(io::Error::other("proxy CONNECT response too large"));
        }
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "proxy closed the connection during CONNECT",
            ));
        }
        response.extend_from_slice(&chunk[..n]);
    }

    let status_line = String::from_utf8_lossy(&response);
    let status = status_line
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or_default();
    if status != "200" {
        return Err(io::Error::other(format!(
            "proxy refused CONNECT to {authority}: status {status}"
        )));
    }
    tracing::debug!(authority = %authority, "Tunnel established through upstream proxy");
    Ok(())
}

/// A connection to an upstream or to the proxy in front of it.
pub enum UpstreamStream {
    Plain {
        io: TokioIo<TcpStream>,
        /// Requests on this connection go to an HTTP proxy in absolute form.
        proxied: bool,
    },
    Tls(TokioIo<TlsStream<TcpStream>>),
}

impl Connection for UpstreamStream {
    fn connected(&self) -> Connected {
        match self {
            UpstreamStream::Plain { proxied, .. } => Connected::new().proxy(*proxied),
            UpstreamStream::Tls(_) => Connected::new(),
        }
    }
}

impl Read for UpstreamStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: ReadBufCursor<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            UpstreamStream::Plain { io, .. } => Pin::new(io).poll_read(cx, buf),
            UpstreamStream::Tls(io) => Pin::new(io).poll_read(cx, buf),
        }
    }
}

impl Write for UpstreamStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            UpstreamStream::Plain { io, .. } => Pin::new(io).poll_write(cx, buf),
            UpstreamStream::Tls(io) => Pin::new(io).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            UpstreamStream::Plain { io, .. } => Pin::new(io).poll_flush(cx),
            UpstreamStream::Tls(io) => Pin::new(io).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            UpstreamStream::Plain { io, .. } => Pin::new(io).poll_shutdown(cx),
            UpstreamStream::Tls(io) => Pin::new(io).poll_shutdown(cx),
        }
    }
}
