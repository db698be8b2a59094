//! WebSocket transport for DAGA nodes
//!
//! One request is one connection: dial, send a single binary envelope,
//! await a single binary envelope, close. There is no session state to keep
//! consistent across requests, which keeps server restarts and client
//! retries trivial. [`fan_out`] runs that exchange against a whole roster in
//! parallel and reports per-server results so callers can aggregate
//! whatever arrived before their deadline.

#![forbid(unsafe_code)]

pub mod address;
pub mod websocket;

pub use address::endpoint_url;
pub use websocket::{exchange, fan_out, request, serve};

use std::time::Duration;

/// Timeouts applied to every exchange
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Deadline for establishing a connection
    pub connect_timeout: Duration,
    /// Deadline for one full request/reply exchange after connecting
    pub request_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Transport-layer failures, distinct from protocol failures
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The roster address cannot be turned into an endpoint
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Dial, read, or write failed
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// A timeout elapsed
    #[error("timeout: {0}")]
    Timeout(String),

    /// The peer spoke the wrong protocol
    #[error(transparent)]
    Protocol(#[from] daga_core::DagaError),
}

/// Convenience alias for transport operations
pub type TransportResult<T> = Result<T, TransportError>;
