//! Context creation, driven by the subscribing service
//!
//! Two rounds against the full roster: collect one round-secret commitment
//! from every node, then send the assembled parameters back for
//! endorsement, and finally distribute the signed context. Creation is not
//! threshold-tolerant: a context missing any node's round secret could
//! never produce that node's tag share, so every gap is a quorum failure.

use curve25519_dalek::ristretto::RistrettoPoint;
use rand::rngs::OsRng;

use daga_core::context::{derive_generators, Context, ContextId, ServiceId};
use daga_core::roster::Roster;
use daga_core::suite::{self, KeyPair};
use daga_core::DagaError;
use daga_schema::{admission, proto};
use daga_transport::{fan_out, TransportConfig};

use crate::ClientResult;

/// Runs the context creation rounds for a service
#[derive(Debug, Clone, Default)]
pub struct ContextCreator {
    transport: TransportConfig,
}

impl ContextCreator {
    pub fn new(transport: TransportConfig) -> Self {
        Self { transport }
    }

    /// Create and activate a context over the given subscriber set
    ///
    /// `service` signs the request; nodes enforcing admission must know its
    /// public key. Returns the fully endorsed context after every roster
    /// node has acknowledged activation.
    pub async fn create_context(
        &self,
        service: &KeyPair,
        service_id: ServiceId,
        subscribers: Vec<RistrettoPoint>,
        roster: Roster,
    ) -> ClientResult<Context> {
        let addresses: Vec<String> = roster.iter().map(|m| m.address.clone()).collect();
        let nodes: Vec<proto::RosterEntry> = roster
            .iter()
            .map(|member| proto::RosterEntry {
                public_key: suite::point_bytes(&member.public_key).to_vec(),
                address: member.address.clone(),
                description: member.description.clone(),
            })
            .collect();
        let subscriber_keys: Vec<Vec<u8>> = subscribers
            .iter()
            .map(|key| suite::point_bytes(key).to_vec())
            .collect();
        let signature = suite::schnorr_sign(
            service,
            &admission::create_context_message(&service_id.0, &subscriber_keys),
            &mut OsRng,
        );

        // round one: every node commits to a round secret
        let request = proto::CreateContext {
            service_id: service_id.0.to_vec(),
            signature,
            subscriber_keys,
            nodes,
        };
        let replies: Vec<_> =
            fan_out::<_, proto::CreateContextCommit>(&self.transport, &addresses, &request).await;
        let mut round_commitments: Vec<Option<RistrettoPoint>> = vec![None; roster.len()];
        for (position, reply) in replies.into_iter().enumerate() {
            let reply = reply.map_err(|e| {
                DagaError::quorum(format!("node {position} did not commit: {e}"))
            })?;
            let index = usize::try_from(reply.index)
                .map_err(|_| DagaError::schema("negative roster index"))?;
            if index != position {
                return Err(DagaError::validation(format!(
                    "node at position {position} claims index {index}"
                ))
                .into());
            }
            let commitment = suite::point_from_bytes(&reply.round_commitment)
                .map_err(|_| DagaError::schema("invalid round commitment"))?;
            round_commitments[index] = Some(commitment);
        }
        let round_commitments: Vec<RistrettoPoint> =
            round_commitments.into_iter().flatten().collect();

        // assemble the unsigned parameters
        let generators = derive_generators(&service_id, subscribers.len(), &round_commitments);
        let mut context = Context {
            context_id: ContextId([0; 32]),
            service_id,
            signatures: vec![Vec::new(); roster.len()],
            subscribers,
            server_keys: roster.public_keys(),
            round_commitments,
            generators,
            roster,
        };
        context.context_id = context.derived_id();
        let parameters = context.parameter_bytes();

        // round two: every node endorses
        let request = proto::EndorseContext {
            context: Some((&context).into()),
        };
        let replies: Vec<_> =
            fan_out::<_, proto::EndorseContextReply>(&self.transport, &addresses, &request).await;
        for (position, reply) in replies.into_iter().enumerate() {
            let reply = reply.map_err(|e| {
                DagaError::quorum(format!("node {position} did not endorse: {e}"))
            })?;
            let index = usize::try_from(reply.index)
                .map_err(|_| DagaError::schema("negative roster index"))?;
            if index != position {
                return Err(DagaError::validation(format!(
                    "node at position {position} claims index {index}"
                ))
                .into());
            }
            suite::schnorr_verify(&context.server_keys[index], &parameters, &reply.signature)
                .map_err(|_| {
                    DagaError::validation(format!("node {index} returned a bad endorsement"))
                })?;
            context.signatures[index] = reply.signature;
        }
        context.validate()?;

        // distribute the final context; every node must activate it
        let request: proto::Context = (&context).into();
        let replies: Vec<_> =
            fan_out::<_, proto::CreateContextReply>(&self.transport, &addresses, &request).await;
        for (position, reply) in replies.into_iter().enumerate() {
            reply.map_err(|e| {
                DagaError::quorum(format!("node {position} did not activate the context: {e}"))
            })?;
        }
        tracing::info!(context = %context.context_id, "context created and activated");
        Ok(context)
    }
}
