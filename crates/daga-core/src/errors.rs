//! Error taxonomy for DAGA protocol operations
//!
//! One enum covers the whole protocol surface so that callers can match on
//! the failure kind without digging through nested error chains. Transport
//! and service crates wrap this type rather than redefining the taxonomy.

use crate::context::ContextId;

/// Unified error type for all DAGA operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum DagaError {
    /// Unknown message type or malformed wire payload. Fatal to the single
    /// message, not necessarily to the attempt.
    #[error("schema error: {message}")]
    Schema {
        /// What could not be encoded or decoded
        message: String,
    },

    /// Malformed Roster or Context input; the attempt never starts.
    #[error("validation error: {message}")]
    Validation {
        /// Which invariant was violated
        message: String,
    },

    /// Fewer than threshold servers participated in an exchange.
    #[error("quorum error: {message}")]
    Quorum {
        /// Which exchange fell short, and by how much
        message: String,
    },

    /// The attempt deadline elapsed below threshold.
    #[error("timeout: {message}")]
    Timeout {
        /// Which phase timed out
        message: String,
    },

    /// A challenge signature failed verification or too few were present.
    /// Fatal to the attempt; a retry must restart with fresh randomness.
    #[error("challenge verification failed: {message}")]
    ChallengeVerification {
        /// Which signature or count check failed
        message: String,
    },

    /// A server contribution failed the client-side verification equations.
    #[error("server contribution rejected: {message}")]
    ProofRejected {
        /// Which contribution was inconsistent
        message: String,
    },

    /// The client proof does not satisfy the verification equations.
    /// Servers reject without revealing any partial tag material.
    #[error("invalid client proof: {message}")]
    InvalidProof {
        /// Which equation failed
        message: String,
    },

    /// The server does not know the context the request refers to.
    /// Requires re-running context creation.
    #[error("unknown context {0}")]
    UnknownContext(ContextId),
}

impl DagaError {
    /// Create a schema error
    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema {
            message: message.into(),
        }
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a quorum error
    pub fn quorum(message: impl Into<String>) -> Self {
        Self::Quorum {
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout {
            message: message.into(),
        }
    }

    /// Create a challenge verification error
    pub fn challenge(message: impl Into<String>) -> Self {
        Self::ChallengeVerification {
            message: message.into(),
        }
    }

    /// Create a proof rejection error
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::ProofRejected {
            message: message.into(),
        }
    }

    /// Create an invalid proof error
    pub fn invalid_proof(message: impl Into<String>) -> Self {
        Self::InvalidProof {
            message: message.into(),
        }
    }
}

/// Convenience alias used throughout the workspace
pub type DagaResult<T> = Result<T, DagaError>;
