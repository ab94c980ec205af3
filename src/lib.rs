// src/lib.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
// Crate root: single-object S3 transfers over a pinned TCP/TLS transport.

pub mod constants;
pub mod config;
pub mod error;
pub mod digest;
pub mod data_gen;
pub mod endpoint;
pub mod http;
pub mod s3_client;
pub mod progress;
pub mod transfer;
pub mod multipart;
pub mod download;
pub mod upload;

// ===== Convenience re-exports =====
pub use config::{ConnectionConfig, RawConnectionSettings, SettingsFile, TransferRequest};
pub use data_gen::UploadSource;
pub use digest::{Digest, DigestReader, DigestWriter, StreamingDigest};
pub use download::download_object;
pub use error::{ConfigError, ConnectError, EndpointError, Result, TransferError, TransferWarning};
pub use progress::TransferProgress;
pub use s3_client::StaticCredentials;
pub use transfer::{TransferPhase, TransferResult};
pub use upload::{UploadOptions, upload_object};
