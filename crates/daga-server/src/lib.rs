//! DAGA server node
//!
//! Hosts the server side of the protocol behind the websocket transport:
//! context creation rounds, challenge signatures, authentication
//! contributions, and traffic counters. All protocol decisions live in
//! `daga-core`; this crate only stores state and dispatches frames.

#![forbid(unsafe_code)]

pub mod config;
pub mod node;

pub use config::{ConfigError, ServerConfig};
pub use node::Node;
