// src/constants.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
// Centralized constants for s3pin to avoid hardcoded values throughout the codebase

use std::time::Duration;

/// Default port appended to an `https://` address that carries none
pub const DEFAULT_TLS_PORT: u16 = 443;

/// Default port appended to an `http://` address that carries none
pub const DEFAULT_PLAIN_PORT: u16 = 80;

/// Signing region used when the caller supplies none.
/// S3-compatible stores rarely care, but SigV4 needs a value.
pub const DEFAULT_REGION: &str = "us-east-1";

/// The only service the fixed endpoint resolver answers for
pub const S3_SERVICE_ID: &str = "s3";

/// Default read/copy buffer size (16 KiB)
pub const DEFAULT_BUFFER_SIZE: usize = 16 * 1024;

/// Smallest read buffer hyper accepts for its HTTP/1 connection buffer
pub const MIN_HTTP1_READ_BUFFER: usize = 8 * 1024;

/// Fixed part size for uploads (5 MiB, the S3 multipart minimum)
pub const UPLOAD_PART_SIZE: usize = 5 * 1024 * 1024;

/// Maximum number of concurrent in-flight part uploads
pub const DEFAULT_UPLOAD_CONCURRENCY: usize = 5;

/// Default size of a random upload (1 MiB)
pub const DEFAULT_UPLOAD_SIZE: u64 = 1024 * 1024;

/// Upper bound on waiting for an uploaded object to become visible
pub const EXISTENCE_WAIT_CEILING: Duration = Duration::from_secs(60);

/// Delay between HeadObject polls while waiting for existence
pub const EXISTENCE_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// MD5 of zero bytes
pub const EMPTY_MD5_HEX: &str = "d41d8cd98f00b204e9800998ecf8427e";

/// Settings file looked up in the home directory when `--config` is not given
pub const DEFAULT_SETTINGS_FILE: &str = ".s3pin.yaml";
