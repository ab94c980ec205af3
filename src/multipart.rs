// src/multipart.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
// Part uploader: cuts a sequential source into fixed-size parts.
//
// Design:
// - A source shorter than one part goes out as a single PutObject.
// - Anything longer uses CreateMultipartUpload, concurrent UploadPart calls
//   bounded by a semaphore, then CompleteMultipartUpload.
// - Any failure after the MPU is created aborts it (best effort).
// - The source is read strictly in order, so a digest wrapped around it sees
//   the bytes in object order regardless of part completion order.

use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use futures::future::BoxFuture;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use std::sync::Arc;

use crate::constants::{DEFAULT_UPLOAD_CONCURRENCY, UPLOAD_PART_SIZE};
use crate::error::{Result, TransferError, classify_sdk_error};
use crate::progress::TransferProgress;

#[derive(Clone, Debug)]
pub struct PartUploadConfig {
    /// Size of every part but the last.
    pub part_size: usize,
    /// Maximum number of concurrent in-flight part uploads.
    pub max_in_flight: usize,
}

impl Default for PartUploadConfig {
    fn default() -> Self {
        Self {
            part_size: UPLOAD_PART_SIZE,
            max_in_flight: DEFAULT_UPLOAD_CONCURRENCY,
        }
    }
}

/// What the uploader sent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadOutcome {
    pub total_bytes: u64,
    /// 0 for a single PutObject.
    pub parts: usize,
    pub e_tag: Option<String>,
}

pub struct PartUploader {
    client: Client,
    bucket: String,
    key: String,
    cfg: PartUploadConfig,
}

impl PartUploader {
    pub fn new(client: Client, bucket: &str, key: &str, cfg: PartUploadConfig) -> Self {
        Self {
            client,
            bucket: bucket.to_string(),
            key: key.to_string(),
            cfg: PartUploadConfig {
                part_size: cfg.part_size.max(1),
                max_in_flight: cfg.max_in_flight.max(1),
            },
        }
    }

    /// Read `source` to end and store it under the uploader's key.
    pub async fn upload<R>(&self, source: &mut R, progress: &TransferProgress) -> Result<UploadOutcome>
    where
        R: AsyncRead + Unpin,
    {
        let first = read_part(source, self.cfg.part_size).await?;
        if first.len() < self.cfg.part_size {
            return self.put_single(first, progress).await;
        }
        self.upload_multipart(first, source, progress).await
    }

    async fn put_single(&self, body: Vec<u8>, progress: &TransferProgress) -> Result<UploadOutcome> {
        let len = body.len() as u64;
        debug!(bucket = %self.bucket, key = %self.key, len, "single PutObject");
        let resp = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(&self.key)
            .content_length(len as i64)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|err| classify_sdk_error("PutObject", err))?;
        progress.inc(len);
        Ok(UploadOutcome {
            total_bytes: len,
            parts: 0,
            e_tag: resp.e_tag().map(str::to_string),
        })
    }

    async fn upload_multipart<R>(
        &self,
        first: Vec<u8>,
        source: &mut R,
        progress: &TransferProgress,
    ) -> Result<UploadOutcome>
    where
        R: AsyncRead + Unpin,
    {
        let resp = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(&self.key)
            .send()
            .await
            .map_err(|err| classify_sdk_error("CreateMultipartUpload", err))?;
        let upload_id = resp.upload_id().unwrap_or_default().to_string();
        if upload_id.is_empty() {
            return Err(TransferError::Sdk {
                operation: "CreateMultipartUpload",
                message: "response carried an empty upload id".to_string(),
            });
        }
        debug!(bucket = %self.bucket, key = %self.key, %upload_id, "multipart upload started");

        match self.send_parts(&upload_id, first, source, progress).await {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                self.abort(&upload_id).await;
                Err(err)
            }
        }
    }

    async fn send_parts<R>(
        &self,
        upload_id: &str,
        first: Vec<u8>,
        source: &mut R,
        progress: &TransferProgress,
    ) -> Result<UploadOutcome>
    where
        R: AsyncRead + Unpin,
    {
        let semaphore = Arc::new(Semaphore::new(self.cfg.max_in_flight));
        let mut tasks: Vec<JoinHandle<Result<CompletedPart>>> = Vec::new();
        let mut total_bytes = 0u64;
        let mut next = Some(first);

        let scheduled = async {
            let mut part_number = 1i32;
            while let Some(chunk) = next.take() {
                if chunk.is_empty() {
                    break;
                }
                let full = chunk.len() == self.cfg.part_size;
                total_bytes += chunk.len() as u64;

                // Take the permit before reading the next part so buffered parts stay bounded.
                let permit = semaphore.clone().acquire_owned().await.map_err(|_| TransferError::Sdk {
                    operation: "UploadPart",
                    message: "part scheduler closed".to_string(),
                })?;
                let task = self.part_task(upload_id, part_number, chunk, progress.clone());
                tasks.push(tokio::spawn(async move {
                    let _permit = permit;
                    task.await
                }));
                part_number += 1;

                if full {
                    next = Some(read_part(source, self.cfg.part_size).await?);
                }
            }
            Ok::<(), TransferError>(())
        }
        .await;

        if let Err(err) = scheduled {
            for task in &tasks {
                task.abort();
            }
            return Err(err);
        }

        let mut completed = Vec::with_capacity(tasks.len());
        let mut failure = None;
        for task in tasks {
            match task.await {
                Ok(Ok(part)) => completed.push(part),
                Ok(Err(err)) => {
                    failure.get_or_insert(err);
                }
                Err(join) => {
                    failure.get_or_insert(TransferError::Sdk {
                        operation: "UploadPart",
                        message: format!("part task failed: {join}"),
                    });
                }
            }
        }
        if let Some(err) = failure {
            return Err(err);
        }

        completed.sort_by_key(|part| part.part_number());
        let parts = completed.len();
        let resp = self
            .client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(&self.key)
            .upload_id(upload_id)
            .multipart_upload(CompletedMultipartUpload::builder().set_parts(Some(completed)).build())
            .send()
            .await
            .map_err(|err| classify_sdk_error("CompleteMultipartUpload", err))?;

        debug!(parts, total_bytes, "multipart upload completed");
        Ok(UploadOutcome {
            total_bytes,
            parts,
            e_tag: resp.e_tag().map(str::to_string),
        })
    }

    fn part_task(
        &self,
        upload_id: &str,
        part_number: i32,
        bytes: Vec<u8>,
        progress: TransferProgress,
    ) -> BoxFuture<'static, Result<CompletedPart>> {
        let client = self.client.clone();
        let bucket = self.bucket.clone();
        let key = self.key.clone();
        let upload_id = upload_id.to_string();
        Box::pin(async move {
            let len = bytes.len() as u64;
            let resp = client
                .upload_part()
                .bucket(bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(part_number)
                .content_length(len as i64)
                .body(ByteStream::from(bytes))
                .send()
                .await
                .map_err(|err| classify_sdk_error("UploadPart", err))?;

            let etag = resp.e_tag().unwrap_or_default().to_string();
            if etag.is_empty() {
                return Err(TransferError::Sdk {
                    operation: "UploadPart",
                    message: format!("part {part_number} returned an empty ETag"),
                });
            }
            progress.inc(len);
            Ok(CompletedPart::builder()
                .e_tag(etag)
                .part_number(part_number)
                .build())
        })
    }

    async fn abort(&self, upload_id: &str) {
        let result = self
            .client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(&self.key)
            .upload_id(upload_id)
            .send()
            .await;
        match result {
            Ok(_) => debug!(%upload_id, "multipart upload aborted"),
            Err(err) => warn!(%upload_id, error = %err, "failed to abort multipart upload"),
        }
    }
}

/// Read up to `part_size` bytes; shorter only at end of source.
async fn read_part<R>(source: &mut R, part_size: usize) -> Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::with_capacity(part_size);
    (&mut *source)
        .take(part_size as u64)
        .read_to_end(&mut buf)
        .await
        .map_err(TransferError::Source)?;
    Ok(buf)
}
