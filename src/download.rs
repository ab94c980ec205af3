// src/download.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
// Single-object download over the pinned transport, digesting the body as it streams

use std::time::Instant;

use aws_sdk_s3::Client;
use tokio::io::AsyncReadExt;
use tracing::{debug, info};

use crate::config::{ConnectionConfig, TransferRequest};
use crate::digest::DigestReader;
use crate::error::{Result, TransferError, classify_sdk_error};
use crate::progress::TransferProgress;
use crate::s3_client::StaticCredentials;
use crate::transfer::{PhaseTracker, TransferPhase, TransferResult, open_client};

/// Fetch `request.key` from `request.bucket` and return its size and MD5.
///
/// The body is read in `request.buffer_size` chunks; nothing is kept beyond
/// the digest state.
pub async fn download_object(
    config: &ConnectionConfig,
    credentials: &StaticCredentials,
    request: &TransferRequest,
    progress: &TransferProgress,
) -> Result<TransferResult> {
    let mut phase = PhaseTracker::new("download");
    let started = Instant::now();

    let outcome = match open_client(config, credentials).await {
        Ok(client) => {
            phase.advance(TransferPhase::TransportReady);
            stream_object(&client, request, progress, &mut phase).await
        }
        Err(err) => Err(err),
    };
    phase.settle(&outcome);

    match &outcome {
        Ok(result) => {
            progress.finish("download", result.bytes_transferred, started.elapsed());
            info!(
                bucket = %request.bucket,
                key = %request.key,
                bytes = result.bytes_transferred,
                md5 = %result.digest_hex,
                "download complete"
            );
        }
        Err(_) => progress.abandon(),
    }
    outcome
}

/// GetObject, then drain the body through the digest.
pub async fn stream_object(
    client: &Client,
    request: &TransferRequest,
    progress: &TransferProgress,
    phase: &mut PhaseTracker,
) -> Result<TransferResult> {
    let response = client
        .get_object()
        .bucket(&request.bucket)
        .key(&request.key)
        .send()
        .await
        .map_err(|err| classify_sdk_error("GetObject", err))?;
    phase.advance(TransferPhase::TransferInFlight);

    if let Some(len) = response.content_length().filter(|len| *len >= 0) {
        debug!(content_length = len, "GetObject response");
        progress.set_total_bytes(len as u64);
    }

    let mut reader = DigestReader::new(Box::pin(response.body.into_async_read()));
    let mut buf = vec![0u8; request.buffer_size];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                progress.inc(n as u64);
                debug!(read = n, total = reader.bytes_observed(), "read bytes");
            }
            Err(source) => {
                return Err(TransferError::Stream {
                    bytes_transferred: reader.bytes_observed(),
                    source,
                });
            }
        }
    }

    let digest = reader.finalize();
    Ok(TransferResult {
        bytes_transferred: digest.bytes,
        digest_hex: digest.hex,
        warning: None,
    })
}
