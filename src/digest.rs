// src/digest.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! Pass-through MD5 decorators.
//!
//! `DigestReader` wraps a byte source and `DigestWriter` wraps a byte sink.
//! Both forward every call unchanged and hash exactly the bytes that actually
//! crossed the boundary: what the inner reader filled, or what the inner
//! writer accepted. A read that returns end-of-data hashes nothing, so reading
//! past EOF can never double-count.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use md5::{Digest as _, Md5};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// Running hash plus the count of bytes fed into it.
#[derive(Clone, Default)]
pub struct StreamingDigest {
    hasher: Md5,
    bytes_observed: u64,
}

/// Final value of a [`StreamingDigest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Digest {
    pub bytes: u64,
    pub hex: String,
}

impl StreamingDigest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
        self.bytes_observed += data.len() as u64;
    }

    pub fn bytes_observed(&self) -> u64 {
        self.bytes_observed
    }

    /// Consume the state and produce the hex digest.
    pub fn finalize(self) -> Digest {
        Digest {
            bytes: self.bytes_observed,
            hex: format!("{:x}", self.hasher.finalize()),
        }
    }
}

impl std::fmt::Debug for StreamingDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingDigest")
            .field("bytes_observed", &self.bytes_observed)
            .finish_non_exhaustive()
    }
}

/// Hashes everything read through it.
#[derive(Debug)]
pub struct DigestReader<R> {
    inner: R,
    state: StreamingDigest,
    eof: bool,
}

impl<R> DigestReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            state: StreamingDigest::new(),
            eof: false,
        }
    }

    pub fn bytes_observed(&self) -> u64 {
        self.state.bytes_observed()
    }

    /// True once the inner source has reported end-of-data.
    pub fn reached_eof(&self) -> bool {
        self.eof
    }

    pub fn finalize(self) -> Digest {
        self.state.finalize()
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for DigestReader<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = &mut *self;
        let before = buf.filled().len();
        match Pin::new(&mut this.inner).poll_read(cx, buf) {
            Poll::Ready(Ok(())) => {
                let fresh = &buf.filled()[before..];
                if fresh.is_empty() && buf.remaining() > 0 {
                    this.eof = true;
                }
                this.state.update(fresh);
                Poll::Ready(Ok(()))
            }
            other => other,
        }
    }
}

impl<R: io::Read> io::Read for DigestReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n == 0 && !buf.is_empty() {
            self.eof = true;
        }
        self.state.update(&buf[..n]);
        Ok(n)
    }
}

/// Hashes everything the inner sink accepted.
#[derive(Debug)]
pub struct DigestWriter<W> {
    inner: W,
    state: StreamingDigest,
}

impl<W> DigestWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            state: StreamingDigest::new(),
        }
    }

    pub fn bytes_observed(&self) -> u64 {
        self.state.bytes_observed()
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn finalize(self) -> Digest {
        self.state.finalize()
    }
}

impl<W: AsyncWrite + Unpin> AsyncWrite for DigestWriter<W> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = &mut *self;
        match Pin::new(&mut this.inner).poll_write(cx, buf) {
            Poll::Ready(Ok(n)) => {
                // a short write only commits the prefix
                this.state.update(&buf[..n]);
                Poll::Ready(Ok(n))
            }
            other => other,
        }
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

impl<W: io::Write> io::Write for DigestWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.state.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// One-shot MD5 of an in-memory buffer.
pub fn md5_hex(data: &[u8]) -> String {
    format!("{:x}", Md5::digest(data))
}
