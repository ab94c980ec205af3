// src/http/mod.rs
//
// Pinned transport: dialer, TLS parameters, and the SDK-facing HTTP client

pub mod client;
pub mod dialer;
pub mod tls;

pub use client::TransportFactory;
pub use dialer::{Dialer, DialedConnection, PinnedConnector, PinnedStream, PlainDialer, TlsDialer};
