//! DAGA - Deniable Anonymous Group Authentication
//!
//! Core protocol engine: pure cryptographic state machines with no I/O.
//! A subscriber proves membership in a group of public keys to a collective
//! of independent servers without revealing which member it is; the servers
//! jointly derive a linkage tag that is stable for one subscriber within one
//! authentication context and unlinkable across contexts.
//!
//! # Protocol phases
//!
//! - **Context creation**: servers commit to per-round secrets, derive one
//!   generator per subscriber, and endorse the parameter set ([`context`]).
//! - **Commit**: the client derives a DH shared secret with every server and
//!   builds an OR-proof over the whole subscriber set ([`client`]).
//! - **Challenge**: every server signs the proof commitments; the signatures
//!   deterministically seed the Fiat-Shamir challenge ([`challenge`]).
//! - **Respond**: the client closes its real proof branch and fans the
//!   request out to the roster.
//! - **Contribute**: each server verifies the proof and returns its tag
//!   share, or a proof that the client cheated ([`server`]).
//! - **Aggregate**: the client collects a threshold of verified shares into
//!   the final linkage tag ([`aggregator`]).
//!
//! Transport, wire encoding, and the long-running daemons live in the
//! sibling crates; everything here is deterministic given an RNG.

#![forbid(unsafe_code)]

pub mod errors;
pub mod suite;

/// Server identities and the ordered roster
pub mod roster;

/// Signed per-campaign parameter sets
pub mod context;

/// Distributed challenge generation
pub mod challenge;

/// Client proof engine
pub mod client;

/// Server-side contribution engine
pub mod server;

/// Threshold aggregation and linkage tags
pub mod aggregator;

/// In-memory fixtures for tests across the workspace
#[allow(clippy::unwrap_used)]
pub mod testing;

pub use aggregator::{Aggregator, AuthOutcome, AuthReply, LinkageTag};
pub use challenge::{Challenge, ServerSignature};
pub use client::{verify_auth_request, AuthRequest, ClientCredentials, ClientProof, ProofSession};
pub use context::{Context, ContextId, ServiceId};
pub use errors::{DagaError, DagaResult};
pub use roster::{Roster, ServerIdentity};
pub use server::{verify_contribution, Contribution, Server, ServerProof};
pub use suite::KeyPair;
