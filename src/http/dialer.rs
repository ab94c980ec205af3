// src/http/dialer.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! Connection establishment pinned to one address.
//!
//! Whatever host the HTTP layer thinks it is talking to, every dial goes to
//! `ConnectionConfig::address`. That lets an S3-compatible endpoint behind a
//! load balancer or a test harness be reached without touching DNS.
//!
//! No read/write deadlines are ever placed on the socket: large objects over
//! slow links may legitimately stall for a long time. The only bound is the
//! optional connect deadline around dial + handshake.

use std::fmt;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::future::BoxFuture;
use hyper::rt::{Read, ReadBufCursor, Write};
use hyper_util::client::legacy::connect::{Connected, Connection};
use hyper_util::rt::TokioIo;
use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tracing::debug;

use crate::config::ConnectionConfig;
use crate::error::{ConfigError, ConnectError};
use crate::http::tls;

/// Opens a fresh connection to a fixed address.
pub trait Dialer: Send + Sync + fmt::Debug {
    /// The address every connection goes to.
    fn address(&self) -> &str;

    fn dial(&self) -> BoxFuture<'static, Result<PinnedStream, ConnectError>>;
}

/// Pick the dialer variant `cfg` calls for.
pub fn dialer_for(cfg: &ConnectionConfig) -> Result<Arc<dyn Dialer>, ConfigError> {
    if cfg.use_tls {
        Ok(Arc::new(TlsDialer::new(cfg)?))
    } else {
        Ok(Arc::new(PlainDialer::new(cfg)))
    }
}

/// Raw TCP.
#[derive(Debug, Clone)]
pub struct PlainDialer {
    address: Arc<str>,
    connect_timeout: Option<Duration>,
}

impl PlainDialer {
    pub fn new(cfg: &ConnectionConfig) -> Self {
        Self {
            address: cfg.address.as_str().into(),
            connect_timeout: cfg.connect_timeout,
        }
    }
}

impl Dialer for PlainDialer {
    fn address(&self) -> &str {
        &self.address
    }

    fn dial(&self) -> BoxFuture<'static, Result<PinnedStream, ConnectError>> {
        let address = self.address.clone();
        let timeout = self.connect_timeout;
        Box::pin(with_deadline(address.clone(), timeout, async move {
            let tcp = connect_tcp(&address).await?;
            debug!(%address, "connected (plain)");
            Ok(PinnedStream::Plain(tcp))
        }))
    }
}

/// TCP followed by a rustls handshake using the pinned client config.
#[derive(Clone)]
pub struct TlsDialer {
    address: Arc<str>,
    server_name: ServerName<'static>,
    connector: TlsConnector,
    connect_timeout: Option<Duration>,
}

impl TlsDialer {
    pub fn new(cfg: &ConnectionConfig) -> Result<Self, ConfigError> {
        if cfg.address.is_empty() {
            return Err(ConfigError::MissingAddress);
        }
        let client_config = tls::client_config(cfg)?;
        Ok(Self {
            address: cfg.address.as_str().into(),
            server_name: tls::server_name(&cfg.server_name)?,
            connector: TlsConnector::from(Arc::new(client_config)),
            connect_timeout: cfg.connect_timeout,
        })
    }
}

impl fmt::Debug for TlsDialer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsDialer")
            .field("address", &self.address)
            .field("server_name", &self.server_name)
            .field("connect_timeout", &self.connect_timeout)
            .finish_non_exhaustive()
    }
}

impl Dialer for TlsDialer {
    fn address(&self) -> &str {
        &self.address
    }

    fn dial(&self) -> BoxFuture<'static, Result<PinnedStream, ConnectError>> {
        let this = self.clone();
        Box::pin(with_deadline(this.address.clone(), this.connect_timeout, async move {
            let tcp = connect_tcp(&this.address).await?;
            let stream = this
                .connector
                .connect(this.server_name.clone(), tcp)
                .await
                .map_err(|source| ConnectError::Handshake {
                    address: this.address.to_string(),
                    server_name: this.server_name.to_str().into_owned(),
                    source,
                })?;

            let (_, session) = stream.get_ref();
            debug!(
                address = %this.address,
                server_name = %this.server_name.to_str(),
                protocol = ?session.protocol_version(),
                cipher = ?session.negotiated_cipher_suite().map(|s| s.suite()),
                alpn = ?session.alpn_protocol().map(String::from_utf8_lossy),
                "TLS handshake complete"
            );
            Ok(PinnedStream::Tls(Box::new(stream)))
        }))
    }
}

async fn connect_tcp(address: &str) -> Result<TcpStream, ConnectError> {
    let dial_err = |source| ConnectError::Dial {
        address: address.to_string(),
        source,
    };
    let tcp = TcpStream::connect(address).await.map_err(dial_err)?;
    tcp.set_nodelay(true).map_err(dial_err)?;
    Ok(tcp)
}

async fn with_deadline<F>(
    address: Arc<str>,
    timeout: Option<Duration>,
    fut: F,
) -> Result<PinnedStream, ConnectError>
where
    F: Future<Output = Result<PinnedStream, ConnectError>>,
{
    match timeout {
        None => fut.await,
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| ConnectError::Timeout {
                address: address.to_string(),
                timeout: limit,
            })?,
    }
}

/// A dialed connection, plain or TLS.
pub enum PinnedStream {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl PinnedStream {
    pub fn is_tls(&self) -> bool {
        matches!(self, PinnedStream::Tls(_))
    }

    /// True when ALPN settled on HTTP/2.
    pub fn negotiated_h2(&self) -> bool {
        match self {
            PinnedStream::Plain(_) => false,
            PinnedStream::Tls(tls) => tls.get_ref().1.alpn_protocol() == Some(&b"h2"[..]),
        }
    }
}

impl fmt::Debug for PinnedStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PinnedStream::Plain(tcp) => f.debug_tuple("Plain").field(&tcp.peer_addr().ok()).finish(),
            PinnedStream::Tls(tls) => f.debug_tuple("Tls").field(&tls.get_ref().0.peer_addr().ok()).finish(),
        }
    }
}

impl AsyncRead for PinnedStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            PinnedStream::Plain(s) => Pin::new(s).poll_read(cx, buf),
            PinnedStream::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for PinnedStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            PinnedStream::Plain(s) => Pin::new(s).poll_write(cx, buf),
            PinnedStream::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            PinnedStream::Plain(s) => Pin::new(s).poll_flush(cx),
            PinnedStream::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            PinnedStream::Plain(s) => Pin::new(s).poll_shutdown(cx),
            PinnedStream::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

/// What the hyper client pool holds: a [`PinnedStream`] adapted to hyper's I/O traits.
#[derive(Debug)]
pub struct DialedConnection {
    io: TokioIo<PinnedStream>,
    h2: bool,
}

impl From<PinnedStream> for DialedConnection {
    fn from(stream: PinnedStream) -> Self {
        let h2 = stream.negotiated_h2();
        Self {
            io: TokioIo::new(stream),
            h2,
        }
    }
}

impl Connection for DialedConnection {
    fn connected(&self) -> Connected {
        let connected = Connected::new();
        if self.h2 {
            connected.negotiated_h2()
        } else {
            connected
        }
    }
}

impl Read for DialedConnection {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: ReadBufCursor<'_>,
    ) -> Poll<io::Result<()>> {
        Read::poll_read(Pin::new(&mut self.io), cx, buf)
    }
}

impl Write for DialedConnection {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Write::poll_write(Pin::new(&mut self.io), cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Write::poll_flush(Pin::new(&mut self.io), cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Write::poll_shutdown(Pin::new(&mut self.io), cx)
    }
}

/// `tower::Service<Uri>` adapter handed to the hyper-util client.
///
/// The requested URI is logged and otherwise ignored.
#[derive(Debug, Clone)]
pub struct PinnedConnector {
    dialer: Arc<dyn Dialer>,
}

impl PinnedConnector {
    pub fn new(dialer: Arc<dyn Dialer>) -> Self {
        Self { dialer }
    }
}

impl tower_service::Service<http::Uri> for PinnedConnector {
    type Response = DialedConnection;
    type Error = ConnectError;
    type Future = BoxFuture<'static, Result<DialedConnection, ConnectError>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, requested: http::Uri) -> Self::Future {
        debug!(requested = %requested, pinned = self.dialer.address(), "dialing pinned address");
        let dial = self.dialer.dial();
        Box::pin(async move { dial.await.map(DialedConnection::from) })
    }
}
