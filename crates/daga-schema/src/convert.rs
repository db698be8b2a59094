//! Conversions between protocol types and their wire messages
//!
//! Encoding is infallible; decoding validates lengths and group-element
//! canonicity and fails with a schema error. Structural and cryptographic
//! validity beyond that (endorsements, proof equations) stays with the core
//! types; decoding a context does not mean trusting it.

use curve25519_dalek::ristretto::RistrettoPoint;
use curve25519_dalek::scalar::Scalar;

use daga_core::aggregator::AuthReply;
use daga_core::challenge::{Challenge, ServerSignature};
use daga_core::client::{AuthRequest, ClientProof};
use daga_core::context::{Context, ContextId, ServiceId};
use daga_core::errors::{DagaError, DagaResult};
use daga_core::roster::{Roster, ServerIdentity};
use daga_core::server::{Contribution, ServerProof};
use daga_core::suite;

use crate::proto;

fn decode_point(bytes: &[u8], what: &str) -> DagaResult<RistrettoPoint> {
    suite::point_from_bytes(bytes).map_err(|_| DagaError::schema(format!("invalid {what}")))
}

fn decode_points(seq: &[Vec<u8>], what: &str) -> DagaResult<Vec<RistrettoPoint>> {
    seq.iter().map(|b| decode_point(b, what)).collect()
}

fn decode_scalar(bytes: &[u8], what: &str) -> DagaResult<Scalar> {
    suite::scalar_from_bytes(bytes).map_err(|_| DagaError::schema(format!("invalid {what}")))
}

fn decode_scalars(seq: &[Vec<u8>], what: &str) -> DagaResult<Vec<Scalar>> {
    seq.iter().map(|b| decode_scalar(b, what)).collect()
}

fn encode_points(seq: &[RistrettoPoint]) -> Vec<Vec<u8>> {
    seq.iter().map(|p| suite::point_bytes(p).to_vec()).collect()
}

fn encode_scalars(seq: &[Scalar]) -> Vec<Vec<u8>> {
    seq.iter().map(|s| suite::scalar_bytes(s).to_vec()).collect()
}

fn decode_id(bytes: &[u8], what: &str) -> DagaResult<[u8; 32]> {
    bytes
        .try_into()
        .map_err(|_| DagaError::schema(format!("{what} must be 32 bytes")))
}

fn decode_index(index: i32) -> DagaResult<usize> {
    usize::try_from(index).map_err(|_| DagaError::schema("negative roster index"))
}

impl From<&Context> for proto::Context {
    fn from(context: &Context) -> Self {
        Self {
            context_id: context.context_id.0.to_vec(),
            service_id: context.service_id.0.to_vec(),
            signatures: context.signatures.clone(),
            subscriber_keys: encode_points(&context.subscribers),
            server_keys: encode_points(&context.server_keys),
            round_commitments: encode_points(&context.round_commitments),
            generators: encode_points(&context.generators),
            roster: context
                .roster
                .iter()
                .map(|member| proto::RosterEntry {
                    public_key: suite::point_bytes(&member.public_key).to_vec(),
                    address: member.address.clone(),
                    description: member.description.clone(),
                })
                .collect(),
        }
    }
}

/// Decode wire roster entries into an ordered roster
pub fn roster_from_entries(entries: &[proto::RosterEntry]) -> DagaResult<Roster> {
    Roster::new(
        entries
            .iter()
            .map(|entry| {
                Ok(ServerIdentity::new(
                    decode_point(&entry.public_key, "roster key")?,
                    entry.address.clone(),
                    entry.description.clone(),
                ))
            })
            .collect::<DagaResult<Vec<_>>>()?,
    )
    .map_err(|e| DagaError::schema(e.to_string()))
}

impl TryFrom<proto::Context> for Context {
    type Error = DagaError;

    fn try_from(wire: proto::Context) -> DagaResult<Self> {
        let roster = roster_from_entries(&wire.roster)?;
        Ok(Self {
            context_id: ContextId(decode_id(&wire.context_id, "context id")?),
            service_id: ServiceId(decode_id(&wire.service_id, "service id")?),
            signatures: wire.signatures,
            subscribers: decode_points(&wire.subscriber_keys, "subscriber key")?,
            server_keys: decode_points(&wire.server_keys, "server key")?,
            round_commitments: decode_points(&wire.round_commitments, "round commitment")?,
            generators: decode_points(&wire.generators, "generator")?,
            roster,
        })
    }
}

impl From<&ServerSignature> for proto::ServerSignature {
    fn from(signature: &ServerSignature) -> Self {
        Self {
            index: signature.index as i32,
            sig: signature.sig.clone(),
        }
    }
}

impl TryFrom<proto::ServerSignature> for ServerSignature {
    type Error = DagaError;

    fn try_from(wire: proto::ServerSignature) -> DagaResult<Self> {
        Ok(Self {
            index: decode_index(wire.index)?,
            sig: wire.sig,
        })
    }
}

impl From<&Challenge> for proto::PkClientChallenge {
    fn from(challenge: &Challenge) -> Self {
        Self {
            cs: suite::scalar_bytes(&challenge.seed).to_vec(),
            signatures: challenge.signatures.iter().map(Into::into).collect(),
        }
    }
}

impl TryFrom<proto::PkClientChallenge> for Challenge {
    type Error = DagaError;

    fn try_from(wire: proto::PkClientChallenge) -> DagaResult<Self> {
        Ok(Self {
            seed: decode_scalar(&wire.cs, "challenge seed")?,
            signatures: wire
                .signatures
                .into_iter()
                .map(TryInto::try_into)
                .collect::<DagaResult<Vec<_>>>()?,
        })
    }
}

impl From<&AuthRequest> for proto::Auth {
    fn from(auth: &AuthRequest) -> Self {
        Self {
            context: Some((&auth.context).into()),
            s_commits: encode_points(&auth.scommits),
            t0: suite::point_bytes(&auth.tag_base).to_vec(),
            proof: Some(proto::ClientProof {
                cs: Some((&auth.proof.challenge).into()),
                t: encode_points(&auth.proof.t),
                c: encode_scalars(&auth.proof.c),
                r: encode_scalars(&auth.proof.r),
            }),
        }
    }
}

impl TryFrom<proto::Auth> for AuthRequest {
    type Error = DagaError;

    fn try_from(wire: proto::Auth) -> DagaResult<Self> {
        let context = wire
            .context
            .ok_or_else(|| DagaError::schema("auth without context"))?
            .try_into()?;
        let proof = wire
            .proof
            .ok_or_else(|| DagaError::schema("auth without proof"))?;
        let challenge = proof
            .cs
            .ok_or_else(|| DagaError::schema("client proof without challenge"))?
            .try_into()?;
        Ok(Self {
            context,
            scommits: decode_points(&wire.s_commits, "secret commitment")?,
            tag_base: decode_point(&wire.t0, "tag base")?,
            proof: ClientProof {
                challenge,
                t: decode_points(&proof.t, "proof commitment")?,
                c: decode_scalars(&proof.c, "sub-challenge")?,
                r: decode_scalars(&proof.r, "proof response")?,
            },
        })
    }
}

impl From<&ServerProof> for proto::ServerProof {
    fn from(proof: &ServerProof) -> Self {
        Self {
            t1: suite::point_bytes(&proof.t1).to_vec(),
            t2: suite::point_bytes(&proof.t2).to_vec(),
            t3: suite::point_bytes(&proof.t3).to_vec(),
            c: suite::scalar_bytes(&proof.c).to_vec(),
            r1: suite::scalar_bytes(&proof.r1).to_vec(),
            r2: proof.r2.as_ref().map(|r2| suite::scalar_bytes(r2).to_vec()),
        }
    }
}

impl TryFrom<proto::ServerProof> for ServerProof {
    type Error = DagaError;

    fn try_from(wire: proto::ServerProof) -> DagaResult<Self> {
        Ok(Self {
            t1: decode_point(&wire.t1, "proof commitment t1")?,
            t2: decode_point(&wire.t2, "proof commitment t2")?,
            t3: decode_point(&wire.t3, "proof commitment t3")?,
            c: decode_scalar(&wire.c, "proof challenge")?,
            r1: decode_scalar(&wire.r1, "proof response r1")?,
            r2: wire
                .r2
                .as_deref()
                .map(|r2| decode_scalar(r2, "proof response r2"))
                .transpose()?,
        })
    }
}

/// A single server's contribution as a one-element reply
impl From<&Contribution> for proto::AuthReply {
    fn from(contribution: &Contribution) -> Self {
        Self {
            request: None,
            tags: vec![suite::point_bytes(&contribution.tag).to_vec()],
            proofs: vec![(&contribution.proof).into()],
            indexes: vec![contribution.index as i32],
            sigs: vec![contribution.signature.clone()],
        }
    }
}

/// Encode the frozen aggregate of one authentication, installing the
/// request it answers
///
/// Contributions are already index-sorted by the aggregator, so the encoded
/// frame is bit-identical regardless of arrival order.
pub fn encode_auth_reply(auth: &AuthRequest, reply: &AuthReply) -> proto::AuthReply {
    let mut wire = proto::AuthReply {
        request: Some(auth.into()),
        ..Default::default()
    };
    for contribution in &reply.contributions {
        wire.indexes.push(contribution.index as i32);
        wire.tags
            .push(suite::point_bytes(&contribution.tag).to_vec());
        wire.proofs.push((&contribution.proof).into());
        wire.sigs.push(contribution.signature.clone());
    }
    wire
}

/// Unpack a reply into its contributions, requiring consistent sequences
pub fn contributions_from_reply(wire: proto::AuthReply) -> DagaResult<Vec<Contribution>> {
    let count = wire.indexes.len();
    if wire.tags.len() != count || wire.proofs.len() != count || wire.sigs.len() != count {
        return Err(DagaError::schema(
            "auth reply sequences have inconsistent lengths",
        ));
    }
    wire.indexes
        .into_iter()
        .zip(wire.tags)
        .zip(wire.proofs)
        .zip(wire.sigs)
        .map(|(((index, tag), proof), signature)| {
            Ok(Contribution {
                index: decode_index(index)?,
                tag: decode_point(&tag, "tag share")?,
                proof: proof.try_into()?,
                signature,
            })
        })
        .collect()
}

impl From<&DagaError> for proto::ErrorReply {
    fn from(error: &DagaError) -> Self {
        let (kind, message, context_id) = match error {
            DagaError::Schema { message } => ("schema", message.clone(), Vec::new()),
            DagaError::Validation { message } => ("validation", message.clone(), Vec::new()),
            DagaError::Quorum { message } => ("quorum", message.clone(), Vec::new()),
            DagaError::Timeout { message } => ("timeout", message.clone(), Vec::new()),
            DagaError::ChallengeVerification { message } => {
                ("challenge", message.clone(), Vec::new())
            }
            DagaError::ProofRejected { message } => ("rejected", message.clone(), Vec::new()),
            DagaError::InvalidProof { message } => ("invalid-proof", message.clone(), Vec::new()),
            DagaError::UnknownContext(id) => ("unknown-context", id.to_string(), id.0.to_vec()),
        };
        Self {
            kind: kind.to_string(),
            message,
            context_id,
        }
    }
}

impl From<proto::ErrorReply> for DagaError {
    fn from(wire: proto::ErrorReply) -> Self {
        match wire.kind.as_str() {
            "schema" => DagaError::schema(wire.message),
            "validation" => DagaError::validation(wire.message),
            "quorum" => DagaError::quorum(wire.message),
            "timeout" => DagaError::timeout(wire.message),
            "challenge" => DagaError::challenge(wire.message),
            "rejected" => DagaError::rejected(wire.message),
            "invalid-proof" => DagaError::invalid_proof(wire.message),
            "unknown-context" => match decode_id(&wire.context_id, "context id") {
                Ok(id) => DagaError::UnknownContext(ContextId(id)),
                Err(e) => e,
            },
            other => DagaError::schema(format!("unknown error kind {other}: {}", wire.message)),
        }
    }
}
