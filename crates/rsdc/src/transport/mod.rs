// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 rsdc contributors

//! HTTP/1.1 transport: a keep-alive client pool with bounded per-host
//! concurrency, and a thread-per-connection server with per-path dispatch.
//! TLS (rustls) is layered underneath either side; in mutual mode the
//! configured trust predicate is applied to the validated peer identity.
//!
//! The transport never retries SOAP-layer operations - a failed exchange
//! surfaces as [`TransportError`] and retry policy stays with the caller.

mod client;
mod codec;
mod endpoint;
mod server;
mod tls;

pub use client::HttpClientPool;
pub use codec::{read_request, read_response, write_request, write_response, HttpRequest, HttpResponse};
pub use endpoint::{Endpoint, Scheme};
pub use server::{Handler, HttpServer};
pub use tls::{
    build_client_context, build_server_context, PeerIdentity, TlsClientContext, TlsServerContext,
};

use std::fmt;
use std::io;
use std::sync::Arc;

/// Pluggable predicate over a validated TLS peer (SDC trust lists pin
/// subjects or SAN entries on top of chain validation).
pub type TrustPredicate = Arc<dyn Fn(&PeerIdentity) -> bool + Send + Sync>;

/// Transport-layer failure. Not retried by the core.
#[derive(Debug)]
pub enum TransportError {
    /// The endpoint URL could not be parsed.
    InvalidEndpoint(String),
    /// TCP connect failed.
    ConnectFailed { endpoint: String, source: io::Error },
    /// I/O failed mid-exchange.
    Io(io::Error),
    /// The deadline expired.
    Timeout,
    /// TLS handshake or peer validation failed.
    Tls(String),
    /// The peer answered with something that is not usable HTTP.
    BadResponse(String),
    /// The peer answered with a non-success status.
    Status(u16),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::InvalidEndpoint(url) => write!(f, "invalid endpoint \"{}\"", url),
            TransportError::ConnectFailed { endpoint, source } => {
                write!(f, "connect to {} failed: {}", endpoint, source)
            }
            TransportError::Io(e) => write!(f, "transport I/O: {}", e),
            TransportError::Timeout => write!(f, "deadline expired"),
            TransportError::Tls(detail) => write!(f, "TLS: {}", detail),
            TransportError::BadResponse(detail) => write!(f, "bad response: {}", detail),
            TransportError::Status(code) => write!(f, "HTTP status {}", code),
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TransportError::ConnectFailed { source, .. } | TransportError::Io(source) => {
                Some(source)
            }
            _ => None,
        }
    }
}

impl From<io::Error> for TransportError {
    fn from(e: io::Error) -> Self {
        if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) {
            TransportError::Timeout
        } else {
            TransportError::Io(e)
        }
    }
}
