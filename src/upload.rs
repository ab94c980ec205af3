// src/upload.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! Single-object upload over the pinned transport.
//!
//! The source is digested in order as the part uploader consumes it. Once
//! the store acknowledges the write, the object is polled with HeadObject
//! until it is visible; failing to see it in time is reported as a warning
//! on a successful result.

use std::time::{Duration, Instant};

use aws_sdk_s3::Client;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::operation::head_object::HeadObjectError;
use tracing::{debug, info, warn};

use crate::config::{ConnectionConfig, TransferRequest};
use crate::constants::{EXISTENCE_POLL_INTERVAL, EXISTENCE_WAIT_CEILING};
use crate::data_gen::UploadSource;
use crate::digest::DigestReader;
use crate::error::{Result, TransferError, TransferWarning, classify_sdk_error};
use crate::multipart::{PartUploadConfig, PartUploader};
use crate::progress::TransferProgress;
use crate::s3_client::StaticCredentials;
use crate::transfer::{PhaseTracker, TransferPhase, TransferResult, open_client};

/// Knobs for the upload path. `Default` gives the fixed production values.
#[derive(Debug, Clone)]
pub struct UploadOptions {
    pub parts: PartUploadConfig,
    /// How long to wait for the object to become visible.
    pub existence_wait: Duration,
    pub poll_interval: Duration,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            parts: PartUploadConfig::default(),
            existence_wait: EXISTENCE_WAIT_CEILING,
            poll_interval: EXISTENCE_POLL_INTERVAL,
        }
    }
}

/// Upload `source` to `request.bucket`/`request.key` and report size and MD5.
pub async fn upload_object(
    config: &ConnectionConfig,
    credentials: &StaticCredentials,
    request: &TransferRequest,
    source: &UploadSource,
    options: &UploadOptions,
    progress: &TransferProgress,
) -> Result<TransferResult> {
    let mut phase = PhaseTracker::new("upload");
    let started = Instant::now();

    let outcome = match open_client(config, credentials).await {
        Ok(client) => {
            phase.advance(TransferPhase::TransportReady);
            send_source(&client, request, source, options, progress, &mut phase).await
        }
        Err(err) => Err(err),
    };
    phase.settle(&outcome);

    match &outcome {
        Ok(result) => {
            progress.finish("upload", result.bytes_transferred, started.elapsed());
            info!(
                bucket = %request.bucket,
                key = %request.key,
                bytes = result.bytes_transferred,
                md5 = %result.digest_hex,
                "upload complete"
            );
        }
        Err(_) => progress.abandon(),
    }
    outcome
}

async fn send_source(
    client: &Client,
    request: &TransferRequest,
    source: &UploadSource,
    options: &UploadOptions,
    progress: &TransferProgress,
    phase: &mut PhaseTracker,
) -> Result<TransferResult> {
    let opened = source.open().await.map_err(TransferError::Source)?;
    progress.set_total_bytes(opened.size);
    phase.advance(TransferPhase::TransferInFlight);

    let mut reader = DigestReader::new(opened.reader);
    let uploader = PartUploader::new(client.clone(), &request.bucket, &request.key, options.parts.clone());
    let sent = uploader.upload(&mut reader, progress).await?;

    let digest = reader.finalize();
    if digest.bytes != opened.size {
        warn!(expected = opened.size, actual = digest.bytes, "source length changed while uploading");
    }
    debug!(parts = sent.parts, e_tag = ?sent.e_tag, "object stored");

    let warning = wait_for_object(
        client,
        &request.bucket,
        &request.key,
        options.existence_wait,
        options.poll_interval,
    )
    .await?;

    Ok(TransferResult {
        bytes_transferred: digest.bytes,
        digest_hex: digest.hex,
        warning,
    })
}

/// Poll HeadObject until the object is visible or `ceiling` has passed.
///
/// Not-found answers keep the poll going; any other failure ends it with an
/// error. Running out of time is not an error: it yields
/// [`TransferWarning::ExistenceUnconfirmed`].
pub async fn wait_for_object(
    client: &Client,
    bucket: &str,
    key: &str,
    ceiling: Duration,
    interval: Duration,
) -> Result<Option<TransferWarning>> {
    let started = Instant::now();
    let mut attempts = 0u32;
    loop {
        attempts += 1;
        match client.head_object().bucket(bucket).key(key).send().await {
            Ok(_) => {
                debug!(attempts, "object is visible");
                return Ok(None);
            }
            Err(err) if is_not_found(&err) => {
                debug!(attempts, "object not visible yet");
            }
            Err(err) => return Err(classify_sdk_error("HeadObject", err)),
        }

        let elapsed = started.elapsed();
        if elapsed >= ceiling {
            warn!(bucket, key, waited = ?ceiling, "uploaded object not confirmed");
            return Ok(Some(TransferWarning::ExistenceUnconfirmed { waited: ceiling }));
        }
        tokio::time::sleep(interval.min(ceiling - elapsed)).await;
    }
}

fn is_not_found<R>(err: &SdkError<HeadObjectError, R>) -> bool
where
    R: std::fmt::Debug,
{
    err.as_service_error().is_some_and(|e| e.is_not_found())
}
