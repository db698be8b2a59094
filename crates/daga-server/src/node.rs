//! Node state and request dispatch
//!
//! A [`Node`] owns one long-term key pair and every context it serves.
//! Context creation is a two-round exchange driven by the requesting
//! service: `CreateContext` makes the node commit to a fresh round secret,
//! `EndorseContext` makes it check and sign the assembled parameters, and a
//! final `Context` frame activates the fully endorsed context. Pending
//! round secrets are keyed by service and roster so concurrent creations
//! for different campaigns cannot collide.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use curve25519_dalek::ristretto::RistrettoPoint;
use rand::rngs::OsRng;
use tokio::sync::RwLock;

use daga_core::client::commitments_per_candidate;
use daga_core::context::{derive_generators, Context, ContextId};
use daga_core::errors::{DagaError, DagaResult};
use daga_core::server::Server;
use daga_core::suite::{self, KeyPair};
use daga_schema::{admission, envelope, proto, WireMessage};

/// Round secrets awaiting context finalization, keyed by service and roster
type PendingKey = ([u8; 32], [u8; 32]);

struct ContextState {
    context: Context,
    server: Server,
    threshold: usize,
}

/// One running server node
pub struct Node {
    keypair: KeyPair,
    configured_threshold: Option<usize>,
    authorized_services: Vec<RistrettoPoint>,
    pending: RwLock<HashMap<PendingKey, Server>>,
    active: RwLock<HashMap<ContextId, ContextState>>,
    rx: AtomicU64,
    tx: AtomicU64,
}

impl Node {
    /// Build a node from its key material and admission policy
    pub fn new(
        keypair: KeyPair,
        configured_threshold: Option<usize>,
        authorized_services: Vec<RistrettoPoint>,
    ) -> Self {
        Self {
            keypair,
            configured_threshold,
            authorized_services,
            pending: RwLock::new(HashMap::new()),
            active: RwLock::new(HashMap::new()),
            rx: AtomicU64::new(0),
            tx: AtomicU64::new(0),
        }
    }

    /// The node's long-term public key
    pub fn public_key(&self) -> RistrettoPoint {
        self.keypair.public
    }

    /// Handle one request frame and produce the reply frame
    pub async fn handle(&self, frame: Vec<u8>) -> DagaResult<Vec<u8>> {
        self.rx.fetch_add(frame.len() as u64, Ordering::Relaxed);
        let request = envelope::open(&frame)?;
        let name = request.type_name.clone();

        let reply = if name == proto::CreateContext::NAME {
            envelope::seal(&self.handle_create(request.payload_as()?).await?)
        } else if name == proto::EndorseContext::NAME {
            envelope::seal(&self.handle_endorse(request.payload_as()?).await?)
        } else if name == proto::Context::NAME {
            envelope::seal(&self.handle_finalize(request.payload_as()?).await?)
        } else if name == proto::PkClientCommitments::NAME {
            envelope::seal(&self.handle_commitments(request.payload_as()?).await?)
        } else if name == proto::Auth::NAME {
            envelope::seal(&self.handle_auth(request.payload_as()?).await?)
        } else if name == proto::Traffic::NAME {
            envelope::seal(&proto::TrafficReply {
                rx: self.rx.load(Ordering::Relaxed),
                tx: self.tx.load(Ordering::Relaxed),
            })
        } else {
            return Err(DagaError::schema(format!("unhandled {name} frame")));
        };

        self.tx.fetch_add(reply.len() as u64, Ordering::Relaxed);
        tracing::debug!(frame = %name, rx = frame.len(), tx = reply.len(), "handled");
        Ok(reply)
    }

    /// Our position in a roster, or a validation error if we are not in it
    fn own_index(&self, context: &Context) -> DagaResult<usize> {
        context
            .roster
            .iter()
            .position(|member| member.public_key == self.keypair.public)
            .ok_or_else(|| DagaError::validation("this node is not in the roster"))
    }

    fn threshold_for(&self, context: &Context) -> usize {
        self.configured_threshold
            .unwrap_or(context.server_count() / 2 + 1)
            .min(context.server_count())
    }

    /// Round one: authorize the service, commit to a fresh round secret
    async fn handle_create(
        &self,
        request: proto::CreateContext,
    ) -> DagaResult<proto::CreateContextCommit> {
        if !self.authorized_services.is_empty() {
            let message =
                admission::create_context_message(&request.service_id, &request.subscriber_keys);
            let authorized = self.authorized_services.iter().any(|service| {
                suite::schnorr_verify(service, &message, &request.signature).is_ok()
            });
            if !authorized {
                return Err(DagaError::validation(
                    "context creation not signed by an authorized service",
                ));
            }
        }

        let roster = daga_schema::roster_from_entries(&request.nodes)?;
        let index = roster
            .iter()
            .position(|member| member.public_key == self.keypair.public)
            .ok_or_else(|| DagaError::validation("this node is not in the requested roster"))?;

        let service_id: [u8; 32] = request
            .service_id
            .as_slice()
            .try_into()
            .map_err(|_| DagaError::schema("service id must be 32 bytes"))?;
        let server = Server::new(index, self.keypair.clone(), &mut OsRng);
        let commitment = server.round_commitment();
        self.pending
            .write()
            .await
            .insert((service_id, roster.id), server);
        tracing::info!(
            service = %hex::encode(service_id),
            index,
            "committed a round secret for a new context"
        );
        Ok(proto::CreateContextCommit {
            index: index as i32,
            round_commitment: suite::point_bytes(&commitment).to_vec(),
        })
    }

    /// Round two: check the assembled parameters and endorse them
    async fn handle_endorse(
        &self,
        request: proto::EndorseContext,
    ) -> DagaResult<proto::EndorseContextReply> {
        let context: Context = request
            .context
            .ok_or_else(|| DagaError::schema("endorse request without context"))?
            .try_into()?;
        let index = self.own_index(&context)?;

        let pending = self.pending.read().await;
        let server = pending
            .get(&(context.service_id.0, context.roster.id))
            .ok_or_else(|| {
                DagaError::validation("no pending round secret for this service and roster")
            })?;
        if context.round_commitments[index] != server.round_commitment() {
            return Err(DagaError::validation(
                "assembled context does not carry our round commitment",
            ));
        }
        let expected_generators = derive_generators(
            &context.service_id,
            context.subscriber_count(),
            &context.round_commitments,
        );
        if context.generators != expected_generators {
            return Err(DagaError::validation(
                "assembled context has forged generators",
            ));
        }
        if context.context_id != context.derived_id() {
            return Err(DagaError::validation(
                "assembled context id does not match its parameters",
            ));
        }

        let signature = server.endorse(&context.parameter_bytes(), &mut OsRng);
        Ok(proto::EndorseContextReply {
            index: index as i32,
            signature,
        })
    }

    /// Final frame: validate the fully endorsed context and start serving it
    async fn handle_finalize(
        &self,
        request: proto::Context,
    ) -> DagaResult<proto::CreateContextReply> {
        let context: Context = request.clone().try_into()?;
        context.validate()?;
        let index = self.own_index(&context)?;

        let server = self
            .pending
            .write()
            .await
            .remove(&(context.service_id.0, context.roster.id))
            .ok_or_else(|| {
                DagaError::validation("no pending round secret for this service and roster")
            })?;
        if context.round_commitments[index] != server.round_commitment() {
            return Err(DagaError::validation(
                "final context does not carry our round commitment",
            ));
        }

        let threshold = self.threshold_for(&context);
        let context_id = context.context_id;
        self.active.write().await.insert(
            context_id,
            ContextState {
                context,
                server,
                threshold,
            },
        );
        tracing::info!(context = %context_id, threshold, "context activated");
        Ok(proto::CreateContextReply {
            context: Some(request),
        })
    }

    /// Challenge round: sign the client's proof commitments
    async fn handle_commitments(
        &self,
        request: proto::PkClientCommitments,
    ) -> DagaResult<proto::PkClientChallenge> {
        let context_id = ContextId(
            request
                .context_id
                .as_slice()
                .try_into()
                .map_err(|_| DagaError::schema("context id must be 32 bytes"))?,
        );
        let active = self.active.read().await;
        let state = active
            .get(&context_id)
            .ok_or(DagaError::UnknownContext(context_id))?;

        let expected = state.context.subscriber_count()
            * commitments_per_candidate(state.context.server_count());
        if request.commitments.len() != expected {
            return Err(DagaError::validation(format!(
                "expected {expected} proof commitments, got {}",
                request.commitments.len()
            )));
        }
        let commitments = request
            .commitments
            .iter()
            .map(|bytes| {
                suite::point_from_bytes(bytes)
                    .map_err(|_| DagaError::schema("invalid proof commitment"))
            })
            .collect::<DagaResult<Vec<_>>>()?;

        let signature = state
            .server
            .sign_commitments(&state.context, &commitments, &mut OsRng);
        Ok(proto::PkClientChallenge {
            cs: Vec::new(),
            signatures: vec![(&signature).into()],
        })
    }

    /// Authentication: verify the proof and contribute our tag share
    async fn handle_auth(&self, request: proto::Auth) -> DagaResult<proto::AuthReply> {
        let auth: daga_core::AuthRequest = request.try_into()?;
        let active = self.active.read().await;
        let state = active
            .get(&auth.context.context_id)
            .ok_or(DagaError::UnknownContext(auth.context.context_id))?;

        let contribution = state.server.process_auth(&auth, state.threshold, &mut OsRng)?;
        Ok((&contribution).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node() -> Node {
        Node::new(KeyPair::generate(&mut OsRng), None, Vec::new())
    }

    #[tokio::test]
    async fn traffic_counters_track_frames() {
        let node = node();
        let request = envelope::seal(&proto::Traffic {});
        let reply = node.handle(request.clone()).await.unwrap();
        let traffic = envelope::open(&reply)
            .unwrap()
            .payload_as::<proto::TrafficReply>()
            .unwrap();
        assert_eq!(traffic.rx, request.len() as u64);
        // tx is counted after the reply is sealed
        assert_eq!(traffic.tx, 0);

        let reply = node.handle(envelope::seal(&proto::Traffic {})).await.unwrap();
        let traffic = envelope::open(&reply)
            .unwrap()
            .payload_as::<proto::TrafficReply>()
            .unwrap();
        assert!(traffic.tx > 0);
    }

    #[tokio::test]
    async fn unhandled_frame_is_a_schema_error() {
        let node = node();
        let frame = envelope::seal(&proto::TrafficReply { rx: 0, tx: 0 });
        assert!(matches!(
            node.handle(frame).await,
            Err(DagaError::Schema { .. })
        ));
    }

    #[tokio::test]
    async fn unknown_context_is_reported_as_such() {
        let node = node();
        let frame = envelope::seal(&proto::PkClientCommitments {
            context_id: vec![9; 32],
            commitments: Vec::new(),
        });
        assert!(matches!(
            node.handle(frame).await,
            Err(DagaError::UnknownContext(_))
        ));
    }

    #[tokio::test]
    async fn unauthorized_service_cannot_create_contexts() {
        let gatekeeper = Node::new(
            KeyPair::generate(&mut OsRng),
            None,
            vec![KeyPair::generate(&mut OsRng).public],
        );
        let frame = envelope::seal(&proto::CreateContext {
            service_id: vec![1; 32],
            signature: vec![0; 64],
            subscriber_keys: Vec::new(),
            nodes: Vec::new(),
        });
        assert!(matches!(
            gatekeeper.handle(frame).await,
            Err(DagaError::Validation { .. })
        ));
    }

    #[tokio::test]
    async fn node_outside_the_roster_refuses_to_commit() {
        let node = node();
        let stranger = KeyPair::generate(&mut OsRng);
        let frame = envelope::seal(&proto::CreateContext {
            service_id: vec![1; 32],
            signature: Vec::new(),
            subscriber_keys: Vec::new(),
            nodes: vec![proto::RosterEntry {
                public_key: suite::point_bytes(&stranger.public).to_vec(),
                address: "ws://127.0.0.1:1".to_string(),
                description: String::new(),
            }],
        });
        assert!(matches!(
            node.handle(frame).await,
            Err(DagaError::Validation { .. })
        ));
    }
}
