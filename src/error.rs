// src/error.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! Error taxonomy for a single transfer.
//!
//! Configuration problems abort before any network I/O. Dial and handshake
//! failures are fatal to the transfer and keep their cause. A stream failure
//! carries the byte count reached before it broke. Failing to confirm that an
//! uploaded object exists is *not* an error, see [`TransferWarning`].

use std::time::Duration;
use thiserror::Error;

/// Raw input could not be turned into a usable `ConnectionConfig`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("malformed host URL `{url}`: {source}")]
    MalformedUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("unsupported URL scheme `{0}` (expected http or https)")]
    UnsupportedScheme(String),

    #[error("no address: supply a host URL or an explicit host:port address")]
    MissingAddress,

    #[error("TLS requested but no server name could be derived")]
    MissingServerName,

    #[error("invalid address `{0}`")]
    InvalidAddress(String),

    #[error("buffer size must be greater than zero")]
    ZeroBufferSize,

    #[error("failed to load CA bundle {path}: {reason}")]
    CaBundle { path: String, reason: String },

    #[error("TLS configuration rejected: {0}")]
    Tls(#[from] rustls::Error),

    #[error("failed to read settings file {path}: {reason}")]
    SettingsFile { path: String, reason: String },
}

/// Failure while opening the pinned connection.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("dial {address} failed: {source}")]
    Dial {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("TLS handshake with {address} (server name `{server_name}`) failed: {source}")]
    Handshake {
        address: String,
        server_name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("connecting to {address} exceeded {timeout:?}")]
    Timeout { address: String, timeout: Duration },
}

/// The endpoint resolver was asked for something it does not serve.
#[derive(Debug, Error)]
pub enum EndpointError {
    #[error("unknown endpoint requested for service `{0}`")]
    UnknownEndpoint(String),

    #[error("invalid endpoint URL `{0}`")]
    InvalidUrl(String),
}

/// Everything that can end a transfer unsuccessfully.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("{0}")]
    Dial(ConnectError),

    #[error("{0}")]
    Handshake(ConnectError),

    #[error("transfer aborted after {bytes_transferred} bytes: {source}")]
    Stream {
        bytes_transferred: u64,
        #[source]
        source: std::io::Error,
    },

    #[error("storage request `{operation}` failed: {message}")]
    Sdk {
        operation: &'static str,
        message: String,
    },

    #[error("reading upload source failed: {0}")]
    Source(#[source] std::io::Error),
}

impl TransferError {
    /// Bytes moved before the failure, when the transfer got that far.
    pub fn bytes_transferred(&self) -> Option<u64> {
        match self {
            TransferError::Stream { bytes_transferred, .. } => Some(*bytes_transferred),
            _ => None,
        }
    }
}

impl From<ConnectError> for TransferError {
    fn from(err: ConnectError) -> Self {
        match err {
            ConnectError::Handshake { .. } => TransferError::Handshake(err),
            _ => TransferError::Dial(err),
        }
    }
}

/// Non-fatal outcome attached to an otherwise successful transfer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransferWarning {
    #[error("object upload succeeded but existence was not confirmed within {waited:?}")]
    ExistenceUnconfirmed { waited: Duration },
}

pub type Result<T, E = TransferError> = std::result::Result<T, E>;

/// Walk an SDK error's source chain and pull out a pinned-connection failure, if any.
///
/// The SDK boxes connector errors several layers deep; surfacing the dial or
/// handshake cause keeps the taxonomy intact for callers.
pub(crate) fn find_connect_error<'a>(
    err: &'a (dyn std::error::Error + 'static),
) -> Option<&'a ConnectError> {
    let mut current: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(e) = current {
        if let Some(found) = e.downcast_ref::<ConnectError>() {
            return Some(found);
        }
        current = e.source();
    }
    None
}

/// Convert a failed SDK call into the transfer taxonomy.
pub(crate) fn classify_sdk_error<E>(operation: &'static str, err: E) -> TransferError
where
    E: std::error::Error + 'static,
{
    if let Some(connect) = find_connect_error(&err) {
        return match connect {
            ConnectError::Dial { address, source } => TransferError::Dial(ConnectError::Dial {
                address: address.clone(),
                source: std::io::Error::new(source.kind(), source.to_string()),
            }),
            ConnectError::Handshake {
                address,
                server_name,
                source,
            } => TransferError::Handshake(ConnectError::Handshake {
                address: address.clone(),
                server_name: server_name.clone(),
                source: std::io::Error::new(source.kind(), source.to_string()),
            }),
            ConnectError::Timeout { address, timeout } => TransferError::Dial(ConnectError::Timeout {
                address: address.clone(),
                timeout: *timeout,
            }),
        };
    }
    TransferError::Sdk {
        operation,
        message: error_chain(&err),
    }
}

/// Render an error and its sources on one line.
pub(crate) fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut out = err.to_string();
    let mut current = err.source();
    while let Some(e) = current {
        let msg = e.to_string();
        if !out.contains(&msg) {
            out.push_str(": ");
            out.push_str(&msg);
        }
        current = e.source();
    }
    out
}
