//! Server-side protocol engine
//!
//! A [`Server`] holds one roster member's long-term key pair plus its
//! per-context round secret `r_j`. For each authentication request it
//! independently re-derives the shared secret from the client's ephemeral
//! key, checks it against the client's commitment, and emits a
//! [`Contribution`]: its deterministic linkage-tag share together with a
//! proof that the share was computed honestly, or a misbehaving-client
//! proof exposing the shared secret when the client lied about it.
//!
//! The tag share is `T_j = B_j^{r_j / s_j} = h_i^{r_j}`: it depends only on
//! the subscriber's generator and the server's round secret, so repeated
//! authentications by the same subscriber in the same context produce the
//! same share while revealing nothing about which subscriber it was.

use curve25519_dalek::ristretto::RistrettoPoint;
use curve25519_dalek::scalar::Scalar;
use curve25519_dalek::traits::Identity;
use rand_core::{CryptoRng, RngCore};
use zeroize::Zeroize;

use crate::challenge::{self, ServerSignature};
use crate::client::{verify_auth_request, AuthRequest};
use crate::context::Context;
use crate::errors::{DagaError, DagaResult};
use crate::roster::ServerIdentity;
use crate::suite;

/// Proof that a server computed its tag share honestly, or that the client
/// misbehaved
///
/// `r2` is `Some` for an honest-share proof and `None` for a
/// misbehaving-client proof; the two variants prove different relations over
/// the same transcript fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerProof {
    pub t1: RistrettoPoint,
    pub t2: RistrettoPoint,
    pub t3: RistrettoPoint,
    pub c: Scalar,
    pub r1: Scalar,
    pub r2: Option<Scalar>,
}

impl ServerProof {
    /// Canonical byte encoding, used in contribution signatures
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(6 * 32 + 1);
        for point in [&self.t1, &self.t2, &self.t3] {
            data.extend_from_slice(&suite::point_bytes(point));
        }
        data.extend_from_slice(&suite::scalar_bytes(&self.c));
        data.extend_from_slice(&suite::scalar_bytes(&self.r1));
        match &self.r2 {
            Some(r2) => {
                data.push(1);
                data.extend_from_slice(&suite::scalar_bytes(r2));
            }
            None => data.push(0),
        }
        data
    }
}

/// One server's signed answer to an authentication request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contribution {
    /// Roster index of the contributing server
    pub index: usize,
    /// Linkage-tag share; the identity element marks a misbehaving client
    pub tag: RistrettoPoint,
    /// Correctness proof for the share
    pub proof: ServerProof,
    /// Schnorr signature over the request transcript, tag, and proof
    pub signature: Vec<u8>,
}

/// The message a server signs over its contribution
fn contribution_message(
    transcript_digest: &[u8; 32],
    index: usize,
    tag: &RistrettoPoint,
    proof: &ServerProof,
) -> Vec<u8> {
    let mut message = Vec::with_capacity(32 + 4 + 32 + 6 * 32 + 1);
    message.extend_from_slice(transcript_digest);
    message.extend_from_slice(&(index as u32).to_be_bytes());
    message.extend_from_slice(&suite::point_bytes(tag));
    message.extend_from_slice(&proof.to_bytes());
    message
}

/// One roster member's protocol state for a single context
pub struct Server {
    /// Canonical roster index
    pub index: usize,
    keypair: suite::KeyPair,
    round_secret: suite::KeyPair,
}

impl Server {
    /// Build a server from its long-term key pair, generating a fresh round
    /// secret for the context being created
    pub fn new<R: RngCore + CryptoRng>(index: usize, keypair: suite::KeyPair, rng: &mut R) -> Self {
        Self {
            index,
            keypair,
            round_secret: suite::KeyPair::generate(rng),
        }
    }

    /// Generate a server with a fresh long-term key, for tests and tooling
    pub fn generate<R: RngCore + CryptoRng>(index: usize, rng: &mut R) -> Self {
        let keypair = suite::KeyPair::generate(rng);
        Self::new(index, keypair, rng)
    }

    /// The long-term public key
    pub fn public_key(&self) -> RistrettoPoint {
        self.keypair.public
    }

    /// The commitment `R_j = G^{r_j}` to this context's round secret
    pub fn round_commitment(&self) -> RistrettoPoint {
        self.round_secret.public
    }

    /// This server's roster identity at the given address
    pub fn identity(&self, address: impl Into<String>, description: impl Into<String>) -> ServerIdentity {
        ServerIdentity::new(self.keypair.public, address, description)
    }

    /// Endorse a context's canonical parameter encoding
    pub fn endorse<R: RngCore + CryptoRng>(&self, parameters: &[u8], rng: &mut R) -> Vec<u8> {
        suite::schnorr_sign(&self.keypair, parameters, rng)
    }

    /// Contribute a signature to challenge generation
    pub fn sign_commitments<R: RngCore + CryptoRng>(
        &self,
        context: &Context,
        commitments: &[RistrettoPoint],
        rng: &mut R,
    ) -> ServerSignature {
        challenge::sign_commitments(&self.keypair, self.index, &context.context_id, commitments, rng)
    }

    /// Process an authentication request: verify the client proof and emit
    /// this server's contribution
    ///
    /// A client whose committed `S_j` does not match the DH-derived shared
    /// secret gets a misbehaving-client proof (identity tag) instead of a
    /// rejection, so the misbehavior is publicly attributable.
    pub fn process_auth<R: RngCore + CryptoRng>(
        &self,
        auth: &AuthRequest,
        threshold: usize,
        rng: &mut R,
    ) -> DagaResult<Contribution> {
        verify_auth_request(auth, threshold)?;
        let digest = auth.transcript_digest();

        let ephemeral = auth.ephemeral_key();
        let dh = self.keypair.secret() * ephemeral;
        let mut shared = suite::hash_to_scalar(
            suite::DOMAIN_SHARED_SECRET,
            &[&suite::point_bytes(&dh)],
        );

        if shared * suite::basepoint() != *auth.secret_commitment(self.index) {
            shared.zeroize();
            tracing::warn!(
                context = %auth.context.context_id,
                server = self.index,
                "client secret commitment does not match the shared secret"
            );
            return Ok(self.misbehaving_contribution(auth, &digest, &dh, rng));
        }

        // T_j = B_j^{r_j / s_j} = h_i^{r_j}
        let mut exponent = self.round_secret.secret() * shared.invert();
        let base = *auth.tag_base_share(self.index);
        let tag = exponent * base;
        exponent.zeroize();
        let proof = self.share_proof(auth, &digest, &base, &tag, &mut shared, rng);

        let message = contribution_message(&digest, self.index, &tag, &proof);
        let signature = suite::schnorr_sign(&self.keypair, &message, rng);
        tracing::debug!(
            context = %auth.context.context_id,
            server = self.index,
            "authentication contribution produced"
        );
        Ok(Contribution {
            index: self.index,
            tag,
            proof,
            signature,
        })
    }

    /// Prove `tag = base^{r_j / s_j}` given the public `R_j` and `S_j`,
    /// equivalently `base^{r_j} = tag^{s_j}`
    fn share_proof<R: RngCore + CryptoRng>(
        &self,
        auth: &AuthRequest,
        transcript_digest: &[u8; 32],
        base: &RistrettoPoint,
        tag: &RistrettoPoint,
        shared: &mut Scalar,
        rng: &mut R,
    ) -> ServerProof {
        let mut v1 = Scalar::random(rng);
        let mut v2 = Scalar::random(rng);
        let t1 = v1 * base - v2 * tag;
        let t2 = v1 * suite::basepoint();
        let t3 = v2 * suite::basepoint();
        let c = share_proof_challenge(
            transcript_digest,
            self.index,
            base,
            tag,
            &self.round_secret.public,
            auth.secret_commitment(self.index),
            &t1,
            &t2,
            &t3,
        );
        let r1 = v1 - c * self.round_secret.secret();
        let r2 = v2 - c * *shared;
        v1.zeroize();
        v2.zeroize();
        shared.zeroize();
        ServerProof {
            t1,
            t2,
            t3,
            c,
            r1,
            r2: Some(r2),
        }
    }

    /// Expose `Z^{y_j}` and prove it was computed with this server's key,
    /// making the mismatch between `S_j` and the true shared secret publicly
    /// checkable
    fn misbehaving_contribution<R: RngCore + CryptoRng>(
        &self,
        auth: &AuthRequest,
        transcript_digest: &[u8; 32],
        dh: &RistrettoPoint,
        rng: &mut R,
    ) -> Contribution {
        let ephemeral = auth.ephemeral_key();
        let mut v = Scalar::random(rng);
        let t1 = v * ephemeral;
        let t2 = v * suite::basepoint();
        let t3 = *dh;
        let c = misbehaving_proof_challenge(
            transcript_digest,
            self.index,
            ephemeral,
            &self.keypair.public,
            &t1,
            &t2,
            &t3,
        );
        let r1 = v - c * self.keypair.secret();
        v.zeroize();

        let tag = RistrettoPoint::identity();
        let proof = ServerProof {
            t1,
            t2,
            t3,
            c,
            r1,
            r2: None,
        };
        let message = contribution_message(transcript_digest, self.index, &tag, &proof);
        let signature = suite::schnorr_sign(&self.keypair, &message, rng);
        Contribution {
            index: self.index,
            tag,
            proof,
            signature,
        }
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("index", &self.index)
            .field("public", &hex::encode(suite::point_bytes(&self.keypair.public)))
            .finish_non_exhaustive()
    }
}

#[allow(clippy::too_many_arguments)]
fn share_proof_challenge(
    transcript_digest: &[u8; 32],
    index: usize,
    base: &RistrettoPoint,
    tag: &RistrettoPoint,
    round_commitment: &RistrettoPoint,
    secret_commitment: &RistrettoPoint,
    t1: &RistrettoPoint,
    t2: &RistrettoPoint,
    t3: &RistrettoPoint,
) -> Scalar {
    let index_bytes = (index as u32).to_be_bytes();
    let points: Vec<[u8; 32]> = [base, tag, round_commitment, secret_commitment, t1, t2, t3]
        .into_iter()
        .map(suite::point_bytes)
        .collect();
    let mut parts: Vec<&[u8]> = vec![transcript_digest, &index_bytes];
    parts.extend(points.iter().map(|b| b.as_slice()));
    suite::hash_to_scalar(suite::DOMAIN_SERVER_PROOF, &parts)
}

fn misbehaving_proof_challenge(
    transcript_digest: &[u8; 32],
    index: usize,
    ephemeral: &RistrettoPoint,
    server_key: &RistrettoPoint,
    t1: &RistrettoPoint,
    t2: &RistrettoPoint,
    t3: &RistrettoPoint,
) -> Scalar {
    let index_bytes = (index as u32).to_be_bytes();
    let points: Vec<[u8; 32]> = [ephemeral, server_key, t1, t2, t3]
        .into_iter()
        .map(suite::point_bytes)
        .collect();
    let mut parts: Vec<&[u8]> = vec![transcript_digest, &index_bytes];
    parts.extend(points.iter().map(|b| b.as_slice()));
    suite::hash_to_scalar(suite::DOMAIN_MISBEHAVING_PROOF, &parts)
}

/// Verify another server's contribution against the request it answers
///
/// Checks the signature, then the proof: an honest-share proof ties the tag
/// to the contributing server's round commitment and the client's committed
/// secret; a misbehaving proof additionally confirms that the exposed shared
/// secret really contradicts the client's commitment.
pub fn verify_contribution(
    context: &Context,
    auth: &AuthRequest,
    contribution: &Contribution,
) -> DagaResult<()> {
    let index = contribution.index;
    if index >= context.server_count() {
        return Err(DagaError::rejected(format!(
            "contribution index {index} out of range"
        )));
    }
    let digest = auth.transcript_digest();
    let message = contribution_message(&digest, index, &contribution.tag, &contribution.proof);
    suite::schnorr_verify(&context.server_keys[index], &message, &contribution.signature)
        .map_err(|_| DagaError::rejected(format!("contribution of server {index} is not signed")))?;

    let proof = &contribution.proof;
    match proof.r2 {
        Some(r2) => {
            if contribution.tag == RistrettoPoint::identity() {
                return Err(DagaError::rejected(
                    "honest-share proof with an identity tag",
                ));
            }
            let base = auth.tag_base_share(index);
            let secret_commitment = auth.secret_commitment(index);
            let round_commitment = &context.round_commitments[index];
            if proof.t1 != proof.r1 * base - r2 * contribution.tag
                || proof.t2 != proof.r1 * suite::basepoint() + proof.c * round_commitment
                || proof.t3 != r2 * suite::basepoint() + proof.c * secret_commitment
            {
                return Err(DagaError::rejected(format!(
                    "tag-share proof of server {index} does not verify"
                )));
            }
            let expected = share_proof_challenge(
                &digest,
                index,
                base,
                &contribution.tag,
                round_commitment,
                secret_commitment,
                &proof.t1,
                &proof.t2,
                &proof.t3,
            );
            if proof.c != expected {
                return Err(DagaError::rejected(format!(
                    "tag-share proof of server {index} has a stale challenge"
                )));
            }
        }
        None => {
            if contribution.tag != RistrettoPoint::identity() {
                return Err(DagaError::rejected(
                    "misbehaving-client proof must carry the identity tag",
                ));
            }
            let ephemeral = auth.ephemeral_key();
            if proof.t1 != proof.r1 * ephemeral + proof.c * proof.t3
                || proof.t2 != proof.r1 * suite::basepoint() + proof.c * context.server_keys[index]
            {
                return Err(DagaError::rejected(format!(
                    "misbehaving-client proof of server {index} does not verify"
                )));
            }
            let expected = misbehaving_proof_challenge(
                &digest,
                index,
                ephemeral,
                &context.server_keys[index],
                &proof.t1,
                &proof.t2,
                &proof.t3,
            );
            if proof.c != expected {
                return Err(DagaError::rejected(format!(
                    "misbehaving-client proof of server {index} has a stale challenge"
                )));
            }
            // the exposed DH value must actually contradict the commitment
            let shared = suite::hash_to_scalar(
                suite::DOMAIN_SHARED_SECRET,
                &[&suite::point_bytes(&proof.t3)],
            );
            if shared * suite::basepoint() == *auth.secret_commitment(index) {
                return Err(DagaError::rejected(format!(
                    "server {index} accused an honest client"
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use rand::rngs::OsRng;

    #[test]
    fn honest_request_yields_verifiable_contribution() {
        let fixture = testing::fixture(3, 2);
        let auth = testing::authenticate(&fixture, 1);
        for server in &fixture.servers {
            let contribution = server
                .process_auth(&auth, fixture.threshold, &mut OsRng)
                .unwrap();
            assert!(contribution.proof.r2.is_some());
            assert_ne!(contribution.tag, RistrettoPoint::identity());
            assert!(verify_contribution(&fixture.context, &auth, &contribution).is_ok());
        }
    }

    #[test]
    fn tag_share_is_deterministic_per_subscriber() {
        let fixture = testing::fixture(2, 2);
        let first = testing::authenticate(&fixture, 0);
        let second = testing::authenticate(&fixture, 0);
        let a = fixture.servers[0]
            .process_auth(&first, fixture.threshold, &mut OsRng)
            .unwrap();
        let b = fixture.servers[0]
            .process_auth(&second, fixture.threshold, &mut OsRng)
            .unwrap();
        assert_eq!(a.tag, b.tag);
    }

    #[test]
    fn tag_shares_differ_across_subscribers() {
        let fixture = testing::fixture(2, 2);
        let first = testing::authenticate(&fixture, 0);
        let second = testing::authenticate(&fixture, 1);
        let a = fixture.servers[0]
            .process_auth(&first, fixture.threshold, &mut OsRng)
            .unwrap();
        let b = fixture.servers[0]
            .process_auth(&second, fixture.threshold, &mut OsRng)
            .unwrap();
        assert_ne!(a.tag, b.tag);
    }

    #[test]
    fn invalid_proof_is_rejected_before_contributing() {
        let fixture = testing::fixture(3, 2);
        let mut auth = testing::authenticate(&fixture, 0);
        auth.proof.c[0] += curve25519_dalek::scalar::Scalar::ONE;
        assert!(fixture.servers[0]
            .process_auth(&auth, fixture.threshold, &mut OsRng)
            .is_err());
    }

    #[test]
    fn lying_about_a_shared_secret_is_exposed() {
        let fixture = testing::fixture(3, 2);
        let auth = testing::misbehaving_authenticate(&fixture, 0, 1);
        // the cheated-on server exposes the client
        let contribution = fixture.servers[1]
            .process_auth(&auth, fixture.threshold, &mut OsRng)
            .unwrap();
        assert!(contribution.proof.r2.is_none());
        assert_eq!(contribution.tag, RistrettoPoint::identity());
        assert!(verify_contribution(&fixture.context, &auth, &contribution).is_ok());
    }

    #[test]
    fn false_accusation_is_rejected() {
        let fixture = testing::fixture(2, 2);
        let auth = testing::authenticate(&fixture, 0);
        let honest = fixture.servers[0]
            .process_auth(&auth, fixture.threshold, &mut OsRng)
            .unwrap();
        // forge a misbehaving contribution against an honest request
        let mut forged = honest.clone();
        forged.tag = RistrettoPoint::identity();
        forged.proof.r2 = None;
        assert!(verify_contribution(&fixture.context, &auth, &forged).is_err());
    }

    #[test]
    fn contribution_is_bound_to_its_request() {
        let fixture = testing::fixture(2, 2);
        let auth = testing::authenticate(&fixture, 0);
        let other = testing::authenticate(&fixture, 0);
        let contribution = fixture.servers[0]
            .process_auth(&auth, fixture.threshold, &mut OsRng)
            .unwrap();
        assert!(verify_contribution(&fixture.context, &other, &contribution).is_err());
    }
}
