//! DAGA client
//!
//! Drives complete protocol exchanges against a server roster: the
//! commit/challenge/respond/aggregate flow of one authentication attempt,
//! the two-round context creation a service runs once per campaign, and the
//! loopback daemon that builds authentication requests for local
//! applications without ever exposing the subscriber key to them.

#![forbid(unsafe_code)]

pub mod authenticate;
pub mod create;
pub mod daemon;

pub use authenticate::Authenticator;
pub use create::ContextCreator;

use daga_core::DagaError;
use daga_transport::TransportError;

/// Client-side failures: protocol or transport
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Protocol(#[from] DagaError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Convenience alias for client operations
pub type ClientResult<T> = Result<T, ClientError>;
