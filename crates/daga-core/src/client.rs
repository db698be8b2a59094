//! Client proof engine
//!
//! One [`ProofSession`] per authentication attempt. The session is a
//! consuming state machine: `start` performs the Init and Commit phases and
//! yields the proof commitments to send out; `respond` consumes the session
//! with the servers' challenge and yields the final [`AuthRequest`]. A
//! session can never be replayed, and its per-attempt secrets (ephemeral
//! key, shared secrets, proof randomness) are zeroized on drop; reusing
//! round randomness across attempts breaks anonymity and soundness.
//!
//! The proof is an OR-composition over every subscriber in the context: for
//! the claimed subscriber the prover knows the private key and all shared
//! secrets; every other branch is simulated with a random sub-challenge.
//! Verifiers check that the sub-challenges sum to the Fiat-Shamir challenge
//! derived from the servers' seed.

use curve25519_dalek::ristretto::RistrettoPoint;
use curve25519_dalek::scalar::Scalar;
use rand_core::{CryptoRng, RngCore};
use zeroize::Zeroize;

use crate::challenge::Challenge;
use crate::context::Context;
use crate::errors::{DagaError, DagaResult};
use crate::suite;

/// A subscriber's private credential: group index plus secret key
pub struct ClientCredentials {
    /// Index into the context's subscriber list
    pub index: usize,
    secret: Scalar,
}

impl ClientCredentials {
    /// Wrap an existing secret key
    pub fn new(index: usize, secret: Scalar) -> Self {
        Self { index, secret }
    }

    /// Generate a fresh credential, returning it with its public key
    pub fn generate<R: RngCore + CryptoRng>(index: usize, rng: &mut R) -> (Self, RistrettoPoint) {
        let secret = Scalar::random(rng);
        let public = secret * suite::basepoint();
        (Self { index, secret }, public)
    }

    /// The public key matching this credential
    pub fn public(&self) -> RistrettoPoint {
        self.secret * suite::basepoint()
    }
}

impl Drop for ClientCredentials {
    fn drop(&mut self) {
        self.secret.zeroize();
    }
}

impl std::fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

/// The client's zero-knowledge proof transcript
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientProof {
    /// The server-contributed challenge the proof answers
    pub challenge: Challenge,
    /// Proof commitments, [`commitments_per_candidate`] per subscriber
    pub t: Vec<RistrettoPoint>,
    /// Per-subscriber sub-challenges, summing to the derived challenge
    pub c: Vec<Scalar>,
    /// Responses, [`responses_per_candidate`] per subscriber
    pub r: Vec<Scalar>,
}

/// The full authentication request fanned out to every roster server
#[derive(Debug, Clone)]
pub struct AuthRequest {
    /// The context the request authenticates against
    pub context: Context,
    /// `[Z, S_1..S_n, B_1..B_n]`: ephemeral key, per-server secret
    /// commitments, per-server tag bases
    pub scommits: Vec<RistrettoPoint>,
    /// `T0 = h_i^{sum s_j}`, the subscriber's tag base
    pub tag_base: RistrettoPoint,
    /// The OR-proof over all subscribers
    pub proof: ClientProof,
}

/// Proof commitments per subscriber branch: identity-key relation, tag-base
/// pair, and one `(S_j, B_j)` pair per server
pub fn commitments_per_candidate(servers: usize) -> usize {
    3 + 2 * servers
}

/// Responses per subscriber branch
pub fn responses_per_candidate(servers: usize) -> usize {
    2 + servers
}

/// Derive the per-server shared secrets `s_j = H(Y_j^z)` from an ephemeral
/// secret
pub(crate) fn derive_shared_secrets(context: &Context, ephemeral: &Scalar) -> Vec<Scalar> {
    context
        .server_keys
        .iter()
        .map(|server_key| {
            suite::hash_to_scalar(
                suite::DOMAIN_SHARED_SECRET,
                &[&suite::point_bytes(&(ephemeral * server_key))],
            )
        })
        .collect()
}

/// In-flight authentication attempt between Commit and Respond
pub struct ProofSession {
    context: Context,
    client_index: usize,
    secret: Scalar,
    shared: Vec<Scalar>,
    total: Scalar,
    scommits: Vec<RistrettoPoint>,
    tag_base: RistrettoPoint,
    /// Simulated sub-challenges; zero placeholder at the real branch
    sub_challenges: Vec<Scalar>,
    /// Simulated responses, with the real branch still holding its
    /// commitment randomness until the challenge arrives
    responses: Vec<Scalar>,
    commitments: Vec<RistrettoPoint>,
}

impl ProofSession {
    /// Init and Commit: derive shared secrets, tag material, and the proof
    /// commitments. Returns the session plus the commitments to send to the
    /// roster for challenge generation.
    pub fn start<R: RngCore + CryptoRng>(
        context: &Context,
        credentials: &ClientCredentials,
        rng: &mut R,
    ) -> DagaResult<(Self, Vec<RistrettoPoint>)> {
        let mut ephemeral = Scalar::random(rng);
        let ephemeral_public = ephemeral * suite::basepoint();
        let shared = derive_shared_secrets(context, &ephemeral);
        ephemeral.zeroize();
        Self::start_with_secrets(context, credentials, ephemeral_public, shared, rng)
    }

    /// Commit with externally supplied shared secrets; lets tests exercise
    /// the misbehaving-client path
    pub(crate) fn start_with_secrets<R: RngCore + CryptoRng>(
        context: &Context,
        credentials: &ClientCredentials,
        ephemeral_public: RistrettoPoint,
        shared: Vec<Scalar>,
        rng: &mut R,
    ) -> DagaResult<(Self, Vec<RistrettoPoint>)> {
        context.validate()?;
        let index = credentials.index;
        if index >= context.subscriber_count() {
            return Err(DagaError::validation(format!(
                "subscriber index {index} out of range"
            )));
        }
        if credentials.public() != context.subscribers[index] {
            return Err(DagaError::validation(
                "credential does not match the context's subscriber key",
            ));
        }

        let servers = context.server_count();
        if shared.len() != servers {
            return Err(DagaError::validation(
                "one shared secret per roster server required",
            ));
        }
        let generator = context.generators[index];
        let total: Scalar = shared.iter().sum();

        // scommits = [Z, S_1..S_n, B_1..B_n], tag base T0 = h_i^total
        let mut scommits = Vec::with_capacity(1 + 2 * servers);
        scommits.push(ephemeral_public);
        scommits.extend(shared.iter().map(|s_j| s_j * suite::basepoint()));
        scommits.extend(shared.iter().map(|s_j| s_j * generator));
        let tag_base = total * generator;
        let secret_commitment_sum: RistrettoPoint = scommits[1..=servers].iter().sum();

        // OR-proof commitments: real branch from fresh randomness, every
        // other branch simulated under a random sub-challenge
        let candidates = context.subscriber_count();
        let t_len = commitments_per_candidate(servers);
        let r_len = responses_per_candidate(servers);
        let mut sub_challenges = vec![Scalar::ZERO; candidates];
        let mut responses = vec![Scalar::ZERO; candidates * r_len];
        let mut commitments = Vec::with_capacity(candidates * t_len);

        for k in 0..candidates {
            let h_k = context.generators[k];
            let block = &mut responses[k * r_len..(k + 1) * r_len];
            for slot in block.iter_mut() {
                *slot = Scalar::random(rng);
            }
            if k == index {
                // block currently holds the commitment randomness v
                commitments.push(block[0] * suite::basepoint());
                commitments.push(block[1] * h_k);
                commitments.push(block[1] * suite::basepoint());
                for j in 0..servers {
                    commitments.push(block[2 + j] * suite::basepoint());
                    commitments.push(block[2 + j] * h_k);
                }
            } else {
                let c_k = Scalar::random(rng);
                sub_challenges[k] = c_k;
                commitments.push(block[0] * suite::basepoint() + c_k * context.subscribers[k]);
                commitments.push(block[1] * h_k + c_k * tag_base);
                commitments.push(block[1] * suite::basepoint() + c_k * secret_commitment_sum);
                for j in 0..servers {
                    commitments.push(block[2 + j] * suite::basepoint() + c_k * scommits[1 + j]);
                    commitments.push(block[2 + j] * h_k + c_k * scommits[1 + servers + j]);
                }
            }
        }

        tracing::debug!(
            context = %context.context_id,
            subscribers = candidates,
            servers,
            "proof session committed"
        );

        let session = Self {
            context: context.clone(),
            client_index: index,
            secret: credentials.secret,
            shared,
            total,
            scommits,
            tag_base,
            sub_challenges,
            responses,
            commitments,
        };
        let commitments = session.commitments.clone();
        Ok((session, commitments))
    }

    /// AwaitChallenge and Respond: verify the servers' challenge, close the
    /// real proof branch, and assemble the final request. Consumes the
    /// session; a retry must start over with fresh randomness.
    pub fn respond(mut self, challenge: Challenge, threshold: usize) -> DagaResult<AuthRequest> {
        challenge
            .verify(&self.context, &self.commitments, threshold)
            .map_err(|e| DagaError::challenge(format!("challenge rejected by client: {e}")))?;

        let derived = challenge.derive(&self.commitments);
        let simulated_sum: Scalar = self.sub_challenges.iter().sum();
        let real = derived - simulated_sum;
        self.sub_challenges[self.client_index] = real;

        let servers = self.context.server_count();
        let r_len = responses_per_candidate(servers);
        let block = &mut self.responses[self.client_index * r_len..(self.client_index + 1) * r_len];
        block[0] -= real * self.secret;
        block[1] -= real * self.total;
        for j in 0..servers {
            block[2 + j] -= real * self.shared[j];
        }

        let proof = ClientProof {
            challenge,
            t: std::mem::take(&mut self.commitments),
            c: std::mem::take(&mut self.sub_challenges),
            r: std::mem::take(&mut self.responses),
        };
        Ok(AuthRequest {
            context: self.context.clone(),
            scommits: std::mem::take(&mut self.scommits),
            tag_base: self.tag_base,
            proof,
        })
    }
}

impl Drop for ProofSession {
    fn drop(&mut self) {
        self.secret.zeroize();
        self.total.zeroize();
        for s in &mut self.shared {
            s.zeroize();
        }
        for r in &mut self.responses {
            r.zeroize();
        }
    }
}

impl AuthRequest {
    /// Structural validity: sequence lengths consistent with the context
    pub fn validate_shape(&self) -> DagaResult<()> {
        let servers = self.context.server_count();
        let candidates = self.context.subscriber_count();
        if self.scommits.len() != 1 + 2 * servers {
            return Err(DagaError::validation(format!(
                "expected {} scommits, got {}",
                1 + 2 * servers,
                self.scommits.len()
            )));
        }
        if self.proof.c.len() != candidates
            || self.proof.t.len() != candidates * commitments_per_candidate(servers)
            || self.proof.r.len() != candidates * responses_per_candidate(servers)
        {
            return Err(DagaError::validation("client proof has inconsistent shape"));
        }
        Ok(())
    }

    /// The ephemeral public key `Z`
    pub fn ephemeral_key(&self) -> &RistrettoPoint {
        &self.scommits[0]
    }

    /// Server `j`'s secret commitment `S_j = G^{s_j}`
    pub fn secret_commitment(&self, j: usize) -> &RistrettoPoint {
        &self.scommits[1 + j]
    }

    /// Server `j`'s tag base `B_j = h_i^{s_j}`
    pub fn tag_base_share(&self, j: usize) -> &RistrettoPoint {
        &self.scommits[1 + self.context.server_count() + j]
    }

    /// Canonical transcript digest; the message servers sign their
    /// contributions over
    pub fn transcript_digest(&self) -> [u8; 32] {
        let mut data = Vec::new();
        data.extend_from_slice(&self.context.context_id.0);
        for point in &self.scommits {
            data.extend_from_slice(&suite::point_bytes(point));
        }
        data.extend_from_slice(&suite::point_bytes(&self.tag_base));
        data.extend_from_slice(&suite::scalar_bytes(&self.proof.challenge.seed));
        for signature in &self.proof.challenge.signatures {
            data.extend_from_slice(&(signature.index as u32).to_be_bytes());
            data.extend_from_slice(&signature.sig);
        }
        for point in &self.proof.t {
            data.extend_from_slice(&suite::point_bytes(point));
        }
        for scalar in &self.proof.c {
            data.extend_from_slice(&suite::scalar_bytes(scalar));
        }
        for scalar in &self.proof.r {
            data.extend_from_slice(&suite::scalar_bytes(scalar));
        }
        suite::digest32(suite::DOMAIN_SERVER_PROOF, &[&data])
    }
}

/// Verify the client's OR-proof against its context
///
/// Used by every server before contributing, and by tests. Checks the
/// challenge (signatures, threshold, seed), the sub-challenge sum, and the
/// commitment equations of every subscriber branch.
pub fn verify_auth_request(auth: &AuthRequest, threshold: usize) -> DagaResult<()> {
    auth.validate_shape()
        .map_err(|e| DagaError::invalid_proof(e.to_string()))?;
    auth.proof
        .challenge
        .verify(&auth.context, &auth.proof.t, threshold)?;

    let derived = auth.proof.challenge.derive(&auth.proof.t);
    let sum: Scalar = auth.proof.c.iter().sum();
    if sum != derived {
        return Err(DagaError::invalid_proof(
            "sub-challenges do not sum to the derived challenge",
        ));
    }

    let servers = auth.context.server_count();
    let t_len = commitments_per_candidate(servers);
    let r_len = responses_per_candidate(servers);
    let secret_commitment_sum: RistrettoPoint = auth.scommits[1..=servers].iter().sum();

    for (k, &c_k) in auth.proof.c.iter().enumerate() {
        let h_k = auth.context.generators[k];
        let t = &auth.proof.t[k * t_len..(k + 1) * t_len];
        let r = &auth.proof.r[k * r_len..(k + 1) * r_len];

        if t[0] != r[0] * suite::basepoint() + c_k * auth.context.subscribers[k] {
            return Err(DagaError::invalid_proof(format!(
                "identity relation failed for branch {k}"
            )));
        }
        if t[1] != r[1] * h_k + c_k * auth.tag_base {
            return Err(DagaError::invalid_proof(format!(
                "tag-base relation failed for branch {k}"
            )));
        }
        if t[2] != r[1] * suite::basepoint() + c_k * secret_commitment_sum {
            return Err(DagaError::invalid_proof(format!(
                "secret-sum relation failed for branch {k}"
            )));
        }
        for j in 0..servers {
            if t[3 + 2 * j] != r[2 + j] * suite::basepoint() + c_k * auth.scommits[1 + j] {
                return Err(DagaError::invalid_proof(format!(
                    "secret-commitment relation failed for branch {k}, server {j}"
                )));
            }
            if t[4 + 2 * j] != r[2 + j] * h_k + c_k * auth.scommits[1 + servers + j] {
                return Err(DagaError::invalid_proof(format!(
                    "tag-base-share relation failed for branch {k}, server {j}"
                )));
            }
        }
    }
    Ok(())
}
