// src/transfer.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! Shared pieces of a single transfer: its result, its lifecycle phases, and
//! the step that turns a `ConnectionConfig` into a ready S3 client.

use std::fmt;

use aws_sdk_s3::Client;
use tracing::debug;

use crate::config::ConnectionConfig;
use crate::error::{Result, TransferWarning};
use crate::http::TransportFactory;
use crate::s3_client::{StaticCredentials, build_s3_client};

/// What a finished transfer reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferResult {
    /// Bytes that passed through the digest.
    pub bytes_transferred: u64,
    /// Lowercase hex MD5 of exactly those bytes.
    pub digest_hex: String,
    pub warning: Option<TransferWarning>,
}

/// Lifecycle of one transfer. Phases only ever move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferPhase {
    Configuring,
    TransportReady,
    TransferInFlight,
    Completed,
    Failed,
}

impl TransferPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, TransferPhase::Completed | TransferPhase::Failed)
    }

    /// Whether `next` is a legal successor of `self`.
    pub fn can_advance_to(self, next: TransferPhase) -> bool {
        use TransferPhase::*;
        matches!(
            (self, next),
            (Configuring, TransportReady)
                | (TransportReady, TransferInFlight)
                | (TransferInFlight, Completed)
                | (Configuring | TransportReady | TransferInFlight, Failed)
        )
    }
}

impl fmt::Display for TransferPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransferPhase::Configuring => "configuring",
            TransferPhase::TransportReady => "transport-ready",
            TransferPhase::TransferInFlight => "in-flight",
            TransferPhase::Completed => "completed",
            TransferPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Tracks the current phase of one named operation and logs every move.
#[derive(Debug)]
pub struct PhaseTracker {
    operation: &'static str,
    phase: TransferPhase,
}

impl PhaseTracker {
    pub fn new(operation: &'static str) -> Self {
        debug!(operation, phase = %TransferPhase::Configuring, "transfer phase");
        Self {
            operation,
            phase: TransferPhase::Configuring,
        }
    }

    pub fn phase(&self) -> TransferPhase {
        self.phase
    }

    /// Move to `next`. Illegal moves are ignored and reported as `false`.
    pub fn advance(&mut self, next: TransferPhase) -> bool {
        if !self.phase.can_advance_to(next) {
            debug!(
                operation = self.operation,
                from = %self.phase,
                to = %next,
                "ignoring backwards phase transition"
            );
            return false;
        }
        debug!(operation = self.operation, from = %self.phase, to = %next, "transfer phase");
        self.phase = next;
        true
    }

    /// Settle into the terminal phase matching `outcome`.
    pub fn settle<T>(&mut self, outcome: &Result<T>) {
        let next = match outcome {
            Ok(_) => TransferPhase::Completed,
            Err(_) => TransferPhase::Failed,
        };
        self.advance(next);
    }
}

/// Build the pinned transport and an S3 client on top of it.
pub async fn open_client(config: &ConnectionConfig, credentials: &StaticCredentials) -> Result<Client> {
    let factory = TransportFactory::new(config)?;
    Ok(build_s3_client(&factory, credentials).await)
}
