//! Concrete group suite: Ristretto over Curve25519
//!
//! DAGA is specified against any prime-order group where DDH holds; this
//! module pins the implementation to the Ristretto group and SHA-512 and
//! provides the few primitives the rest of the crate builds on: hashing to
//! scalars and points, key pairs, and a Schnorr signature over the same
//! group (server identity keys double as DH and signing keys, so the
//! signature scheme must live in the group).

use curve25519_dalek::constants::RISTRETTO_BASEPOINT_POINT;
use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use curve25519_dalek::scalar::Scalar;
use rand_core::{CryptoRng, RngCore};
use sha2::{Digest, Sha512};
use zeroize::Zeroize;

use crate::errors::{DagaError, DagaResult};

/// Domain separation tag for Schnorr signatures
pub(crate) const DOMAIN_SIGNATURE: &[u8] = b"daga-schnorr-v1";
/// Domain separation tag for challenge shares derived from signatures
pub(crate) const DOMAIN_CHALLENGE_SHARE: &[u8] = b"daga-challenge-share-v1";
/// Domain separation tag for the final Fiat-Shamir challenge
pub(crate) const DOMAIN_CLIENT_CHALLENGE: &[u8] = b"daga-client-challenge-v1";
/// Domain separation tag for server proof challenges
pub(crate) const DOMAIN_SERVER_PROOF: &[u8] = b"daga-server-proof-v1";
/// Domain separation tag for misbehaving-client proof challenges
pub(crate) const DOMAIN_MISBEHAVING_PROOF: &[u8] = b"daga-misbehaving-proof-v1";
/// Domain separation tag for per-subscriber generators
pub(crate) const DOMAIN_GENERATOR: &[u8] = b"daga-generator-v1";
/// Domain separation tag for client/server shared secrets
pub(crate) const DOMAIN_SHARED_SECRET: &[u8] = b"daga-shared-secret-v1";
/// Domain separation tag for identifier digests
pub(crate) const DOMAIN_IDENTIFIER: &[u8] = b"daga-id-v1";

/// The group generator
pub fn basepoint() -> RistrettoPoint {
    RISTRETTO_BASEPOINT_POINT
}

/// Hash arbitrary byte parts into a scalar (wide reduction, uniform mod l)
pub fn hash_to_scalar(domain: &[u8], parts: &[&[u8]]) -> Scalar {
    let mut hasher = Sha512::new();
    hasher.update(domain);
    for part in parts {
        hasher.update((part.len() as u64).to_be_bytes());
        hasher.update(part);
    }
    Scalar::from_hash(hasher)
}

/// Hash arbitrary byte parts onto the group
pub fn hash_to_point(domain: &[u8], parts: &[&[u8]]) -> RistrettoPoint {
    let mut hasher = Sha512::new();
    hasher.update(domain);
    for part in parts {
        hasher.update((part.len() as u64).to_be_bytes());
        hasher.update(part);
    }
    RistrettoPoint::from_hash(hasher)
}

/// SHA-512 digest truncated to 32 bytes, used for identifiers and transcripts
pub fn digest32(domain: &[u8], parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha512::new();
    hasher.update(domain);
    for part in parts {
        hasher.update((part.len() as u64).to_be_bytes());
        hasher.update(part);
    }
    let wide = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&wide[..32]);
    out
}

/// Canonical 32-byte encoding of a group element
pub fn point_bytes(point: &RistrettoPoint) -> [u8; 32] {
    point.compress().to_bytes()
}

/// Decode a group element, rejecting non-canonical encodings
pub fn point_from_bytes(bytes: &[u8]) -> DagaResult<RistrettoPoint> {
    let compressed = CompressedRistretto::from_slice(bytes)
        .map_err(|_| DagaError::validation("group element must be 32 bytes"))?;
    compressed
        .decompress()
        .ok_or_else(|| DagaError::validation("invalid group element encoding"))
}

/// Canonical 32-byte encoding of a scalar
pub fn scalar_bytes(scalar: &Scalar) -> [u8; 32] {
    scalar.to_bytes()
}

/// Decode a scalar, rejecting non-canonical encodings
pub fn scalar_from_bytes(bytes: &[u8]) -> DagaResult<Scalar> {
    let array: [u8; 32] = bytes
        .try_into()
        .map_err(|_| DagaError::validation("scalar must be 32 bytes"))?;
    Option::<Scalar>::from(Scalar::from_canonical_bytes(array))
        .ok_or_else(|| DagaError::validation("non-canonical scalar encoding"))
}

/// A long-term or per-round key pair over the suite group
#[derive(Clone)]
pub struct KeyPair {
    secret: Scalar,
    /// The public half, `G^secret`
    pub public: RistrettoPoint,
}

impl KeyPair {
    /// Generate a fresh key pair
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let secret = Scalar::random(rng);
        Self::from_secret(secret)
    }

    /// Build the pair from an existing secret scalar
    pub fn from_secret(secret: Scalar) -> Self {
        let public = secret * basepoint();
        Self { secret, public }
    }

    /// Borrow the secret scalar
    pub fn secret(&self) -> &Scalar {
        &self.secret
    }
}

impl Drop for KeyPair {
    fn drop(&mut self) {
        self.secret.zeroize();
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &hex::encode(point_bytes(&self.public)))
            .finish_non_exhaustive()
    }
}

/// Length in bytes of a Schnorr signature (nonce point plus response scalar)
pub const SIGNATURE_LENGTH: usize = 64;

/// Schnorr-sign a message under the suite group
pub fn schnorr_sign<R: RngCore + CryptoRng>(
    keypair: &KeyPair,
    message: &[u8],
    rng: &mut R,
) -> Vec<u8> {
    let mut nonce = Scalar::random(rng);
    let commitment = nonce * basepoint();
    let challenge = hash_to_scalar(
        DOMAIN_SIGNATURE,
        &[
            &point_bytes(&commitment),
            &point_bytes(&keypair.public),
            message,
        ],
    );
    let response = nonce + challenge * keypair.secret;
    nonce.zeroize();

    let mut sig = Vec::with_capacity(SIGNATURE_LENGTH);
    sig.extend_from_slice(&point_bytes(&commitment));
    sig.extend_from_slice(&scalar_bytes(&response));
    sig
}

/// Verify a Schnorr signature produced by [`schnorr_sign`]
pub fn schnorr_verify(public: &RistrettoPoint, message: &[u8], sig: &[u8]) -> DagaResult<()> {
    if sig.len() != SIGNATURE_LENGTH {
        return Err(DagaError::validation(format!(
            "signature must be {SIGNATURE_LENGTH} bytes, got {}",
            sig.len()
        )));
    }
    let commitment = point_from_bytes(&sig[..32])?;
    let response = scalar_from_bytes(&sig[32..])?;
    let challenge = hash_to_scalar(
        DOMAIN_SIGNATURE,
        &[&sig[..32], &point_bytes(public), message],
    );
    if response * basepoint() == commitment + challenge * public {
        Ok(())
    } else {
        Err(DagaError::validation("signature verification failed"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn schnorr_roundtrip() {
        let mut rng = OsRng;
        let keypair = KeyPair::generate(&mut rng);
        let sig = schnorr_sign(&keypair, b"hello daga", &mut rng);
        assert!(schnorr_verify(&keypair.public, b"hello daga", &sig).is_ok());
    }

    #[test]
    fn schnorr_rejects_wrong_message() {
        let mut rng = OsRng;
        let keypair = KeyPair::generate(&mut rng);
        let sig = schnorr_sign(&keypair, b"hello daga", &mut rng);
        assert!(schnorr_verify(&keypair.public, b"hello dgaa", &sig).is_err());
    }

    #[test]
    fn schnorr_rejects_wrong_key() {
        let mut rng = OsRng;
        let keypair = KeyPair::generate(&mut rng);
        let other = KeyPair::generate(&mut rng);
        let sig = schnorr_sign(&keypair, b"hello daga", &mut rng);
        assert!(schnorr_verify(&other.public, b"hello daga", &sig).is_err());
    }

    #[test]
    fn schnorr_rejects_truncated_signature() {
        let mut rng = OsRng;
        let keypair = KeyPair::generate(&mut rng);
        let sig = schnorr_sign(&keypair, b"hello daga", &mut rng);
        assert!(schnorr_verify(&keypair.public, b"hello daga", &sig[..63]).is_err());
    }

    #[test]
    fn point_codec_rejects_garbage() {
        assert!(point_from_bytes(&[0xffu8; 32]).is_err());
        assert!(point_from_bytes(&[1u8; 7]).is_err());
    }

    #[test]
    fn hash_to_scalar_is_domain_separated() {
        let a = hash_to_scalar(b"domain-a", &[b"data"]);
        let b = hash_to_scalar(b"domain-b", &[b"data"]);
        assert_ne!(a, b);
    }

    #[test]
    fn hash_to_scalar_length_prefix_disambiguates() {
        // ("ab", "c") and ("a", "bc") must not collide
        let a = hash_to_scalar(b"d", &[b"ab", b"c"]);
        let b = hash_to_scalar(b"d", &[b"a", b"bc"]);
        assert_ne!(a, b);
    }
}
