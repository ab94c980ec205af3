// src/s3_client.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! S3 client construction over the pinned transport.
//!
//! No global client here: each run builds one from an explicit
//! `ConnectionConfig` and credential pair, and owns it for the transfer.

use std::fmt;

use aws_config::BehaviorVersion;
use aws_config::stalled_stream_protection::StalledStreamProtectionConfig;
use aws_config::timeout::TimeoutConfig;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::{Credentials, Region, RequestChecksumCalculation, ResponseChecksumValidation};
use tracing::debug;

use crate::constants::DEFAULT_REGION;
use crate::http::TransportFactory;

/// Static access-key pair, passed through to the SDK untouched.
#[derive(Clone)]
pub struct StaticCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl StaticCredentials {
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
        }
    }
}

impl fmt::Debug for StaticCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"** redacted **")
            .finish()
    }
}

/// Timeouts the SDK enforces on our behalf. Disabled unless the caller opted in.
fn timeout_config(factory: &TransportFactory) -> TimeoutConfig {
    match factory.config().operation_timeout {
        Some(limit) => TimeoutConfig::builder().operation_timeout(limit).build(),
        None => TimeoutConfig::disabled(),
    }
}

/// Build an S3 client whose every request goes through `factory`'s dialer and resolver.
pub async fn build_s3_client(factory: &TransportFactory, credentials: &StaticCredentials) -> Client {
    let cfg = factory.config();
    let region = cfg
        .signing_region
        .clone()
        .unwrap_or_else(|| DEFAULT_REGION.to_string());

    let sdk_config = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(region.clone()))
        .credentials_provider(Credentials::new(
            credentials.access_key_id.clone(),
            credentials.secret_access_key.clone(),
            None,
            None,
            "s3pin-static",
        ))
        .http_client(factory.http_client())
        .timeout_config(timeout_config(factory))
        // slow links may stall far longer than the SDK's grace period
        .stalled_stream_protection(StalledStreamProtectionConfig::disabled())
        .load()
        .await;

    let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
        .endpoint_resolver(factory.endpoint_resolver())
        .force_path_style(true)
        .request_checksum_calculation(RequestChecksumCalculation::WhenRequired)
        .response_checksum_validation(ResponseChecksumValidation::WhenRequired)
        .build();

    debug!(
        endpoint = %cfg.endpoint_url,
        address = %cfg.address,
        %region,
        "S3 client ready"
    );
    Client::from_conf(s3_config)
}
