// src/data_gen.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! Upload sources: a bounded pseudo-random stream or a local file.

use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use tokio::io::{AsyncRead, ReadBuf};
use tracing::debug;

/// Where the bytes of an upload come from.
#[derive(Debug, Clone)]
pub enum UploadSource {
    /// Exactly `size` pseudo-random bytes. A seed makes the stream reproducible.
    Random { size: u64, seed: Option<u64> },
    /// The full contents of a local file.
    File(PathBuf),
}

/// Exactly `size` pseudo-random bytes, then end-of-data.
///
/// Generated on demand into the caller's buffer, so memory use does not grow
/// with the requested size.
pub struct RandomSource {
    rng: StdRng,
    remaining: u64,
}

impl RandomSource {
    /// Seeded from the OS; every run differs.
    pub fn new(size: u64) -> Self {
        Self {
            rng: StdRng::from_os_rng(),
            remaining: size,
        }
    }

    pub fn with_seed(size: u64, seed: u64) -> Self {
        debug!(size, seed, "seeded random source");
        Self {
            rng: StdRng::seed_from_u64(seed),
            remaining: size,
        }
    }

    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    fn fill(&mut self, out: &mut [u8]) -> usize {
        let n = (out.len() as u64).min(self.remaining) as usize;
        self.rng.fill_bytes(&mut out[..n]);
        self.remaining -= n as u64;
        n
    }
}

impl io::Read for RandomSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.fill(buf))
    }
}

impl AsyncRead for RandomSource {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let n = self.fill(buf.initialize_unfilled());
        buf.advance(n);
        Poll::Ready(Ok(()))
    }
}

/// An opened source plus the number of bytes it will yield.
pub struct OpenedSource {
    pub reader: Box<dyn AsyncRead + Send + Unpin>,
    pub size: u64,
}

impl UploadSource {
    /// Open the source for a single sequential pass.
    pub async fn open(&self) -> io::Result<OpenedSource> {
        match self {
            UploadSource::Random { size, seed } => {
                let source = match seed {
                    Some(seed) => RandomSource::with_seed(*size, *seed),
                    None => RandomSource::new(*size),
                };
                Ok(OpenedSource {
                    reader: Box::new(source),
                    size: *size,
                })
            }
            UploadSource::File(path) => open_file(path).await,
        }
    }
}

async fn open_file(path: &Path) -> io::Result<OpenedSource> {
    let file = tokio::fs::File::open(path).await?;
    let size = file.metadata().await?.len();
    debug!(path = %path.display(), size, "opened upload file");
    Ok(OpenedSource {
        reader: Box::new(file),
        size,
    })
}
