//! Distributed challenge generation
//!
//! Every roster server contributes one signature over the client's proof
//! commitments; the Fiat-Shamir seed is the sum of scalars hashed from those
//! signatures. Each share is unpredictable to the client before receipt
//! (the signature carries a fresh nonce) and the seed is recomputable from
//! the signatures alone, so a `Challenge` is self-verifying given the
//! context it belongs to.

use curve25519_dalek::ristretto::RistrettoPoint;
use curve25519_dalek::scalar::Scalar;
use rand_core::{CryptoRng, RngCore};

use crate::context::{Context, ContextId};
use crate::errors::{DagaError, DagaResult};
use crate::suite;

/// A signature bound to the roster index of the server that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSignature {
    /// Canonical roster index of the signer
    pub index: usize,
    /// Schnorr signature bytes
    pub sig: Vec<u8>,
}

/// The message a server signs when contributing to a challenge:
/// the context id plus a digest of the client's proof commitments
pub fn commitment_message(context_id: &ContextId, commitments: &[RistrettoPoint]) -> Vec<u8> {
    let commitment_bytes: Vec<[u8; 32]> = commitments.iter().map(suite::point_bytes).collect();
    let parts: Vec<&[u8]> = commitment_bytes.iter().map(|b| b.as_slice()).collect();
    let digest = suite::digest32(suite::DOMAIN_CHALLENGE_SHARE, &parts);
    let mut message = Vec::with_capacity(64);
    message.extend_from_slice(&context_id.0);
    message.extend_from_slice(&digest);
    message
}

/// A server's challenge contribution: sign the commitment transcript
pub fn sign_commitments<R: RngCore + CryptoRng>(
    keypair: &suite::KeyPair,
    index: usize,
    context_id: &ContextId,
    commitments: &[RistrettoPoint],
    rng: &mut R,
) -> ServerSignature {
    let message = commitment_message(context_id, commitments);
    ServerSignature {
        index,
        sig: suite::schnorr_sign(keypair, &message, rng),
    }
}

/// The scalar share one signature contributes to the seed
fn challenge_share(sig: &[u8]) -> Scalar {
    suite::hash_to_scalar(suite::DOMAIN_CHALLENGE_SHARE, &[sig])
}

/// The assembled challenge: seed plus the signatures it derives from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    /// Fiat-Shamir seed: sum of the per-signature shares
    pub seed: Scalar,
    /// Contributing signatures, ascending by roster index
    pub signatures: Vec<ServerSignature>,
}

impl Challenge {
    /// Assemble and verify a challenge from collected signatures
    pub fn assemble(
        mut signatures: Vec<ServerSignature>,
        context: &Context,
        commitments: &[RistrettoPoint],
        threshold: usize,
    ) -> DagaResult<Self> {
        signatures.sort_by_key(|s| s.index);
        let seed = signatures
            .iter()
            .map(|s| challenge_share(&s.sig))
            .sum::<Scalar>();
        let challenge = Self { seed, signatures };
        challenge.verify(context, commitments, threshold)?;
        Ok(challenge)
    }

    /// Verify every contribution and the seed derivation
    ///
    /// Checks index bounds and uniqueness, each signature against the
    /// matching roster key over the commitment transcript, the threshold
    /// count, and that the seed equals the sum of the signature shares.
    pub fn verify(
        &self,
        context: &Context,
        commitments: &[RistrettoPoint],
        threshold: usize,
    ) -> DagaResult<()> {
        let servers = context.server_count();
        if self.signatures.len() < threshold {
            return Err(DagaError::challenge(format!(
                "{} challenge signatures, need at least {threshold}",
                self.signatures.len()
            )));
        }
        if self.signatures.len() > servers {
            return Err(DagaError::challenge(format!(
                "{} challenge signatures for a roster of {servers}",
                self.signatures.len()
            )));
        }

        let message = commitment_message(&context.context_id, commitments);
        let mut seen = vec![false; servers];
        let mut seed = Scalar::ZERO;
        for signature in &self.signatures {
            let index = signature.index;
            if index >= servers {
                return Err(DagaError::challenge(format!(
                    "challenge signature index {index} out of range"
                )));
            }
            if seen[index] {
                return Err(DagaError::challenge(format!(
                    "duplicate challenge signature from server {index}"
                )));
            }
            seen[index] = true;
            suite::schnorr_verify(&context.server_keys[index], &message, &signature.sig)
                .map_err(|_| {
                    DagaError::challenge(format!(
                        "challenge signature of server {index} does not verify"
                    ))
                })?;
            seed += challenge_share(&signature.sig);
        }
        if seed != self.seed {
            return Err(DagaError::challenge(
                "challenge seed does not match its signatures",
            ));
        }
        Ok(())
    }

    /// Derive the final Fiat-Shamir challenge from the seed and the
    /// commitments it covers
    pub fn derive(&self, commitments: &[RistrettoPoint]) -> Scalar {
        let commitment_bytes: Vec<[u8; 32]> = commitments.iter().map(suite::point_bytes).collect();
        let mut parts: Vec<&[u8]> = Vec::with_capacity(commitments.len() + 1);
        let seed_bytes = suite::scalar_bytes(&self.seed);
        parts.push(&seed_bytes);
        parts.extend(commitment_bytes.iter().map(|b| b.as_slice()));
        suite::hash_to_scalar(suite::DOMAIN_CLIENT_CHALLENGE, &parts)
    }
}
