//! One authentication attempt, end to end
//!
//! The attempt is a straight-line state machine: commit, solicit the
//! distributed challenge, respond, fan the request out, aggregate. Every
//! server exchange is fault-tolerant down to the threshold; any failure
//! past that aborts the attempt and a retry starts from fresh randomness.

use rand::rngs::OsRng;

use daga_core::challenge::{Challenge, ServerSignature};
use daga_core::client::{AuthRequest, ClientCredentials, ProofSession};
use daga_core::context::Context;
use daga_core::suite;
use daga_core::{Aggregator, AuthOutcome, DagaError};
use daga_schema::{contributions_from_reply, proto};
use daga_transport::{fan_out, TransportConfig, TransportError, TransportResult};

use crate::ClientResult;

/// Runs authentication attempts against a context's roster
#[derive(Debug, Clone, Default)]
pub struct Authenticator {
    transport: TransportConfig,
    /// Contributions required; roster majority when unset
    threshold: Option<usize>,
}

impl Authenticator {
    pub fn new(transport: TransportConfig) -> Self {
        Self {
            transport,
            threshold: None,
        }
    }

    /// Require a specific contribution count instead of a roster majority
    pub fn with_threshold(mut self, threshold: usize) -> Self {
        self.threshold = Some(threshold);
        self
    }

    fn threshold_for(&self, context: &Context) -> usize {
        self.threshold
            .unwrap_or(context.server_count() / 2 + 1)
            .min(context.server_count())
    }

    /// Build a complete authentication request: commit, collect the
    /// challenge, respond
    ///
    /// Split from [`Authenticator::authenticate`] so the daemon can hand the
    /// finished request to a service without submitting it itself.
    pub async fn build_request(
        &self,
        context: &Context,
        credentials: &ClientCredentials,
    ) -> ClientResult<AuthRequest> {
        let threshold = self.threshold_for(context);
        let addresses = roster_addresses(context);

        let (session, commitments) = ProofSession::start(context, credentials, &mut OsRng)?;
        tracing::debug!(context = %context.context_id, "soliciting challenge signatures");

        let request = proto::PkClientCommitments {
            context_id: context.context_id.0.to_vec(),
            commitments: commitments
                .iter()
                .map(|point| suite::point_bytes(point).to_vec())
                .collect(),
        };
        let replies: Vec<_> =
            fan_out::<_, proto::PkClientChallenge>(&self.transport, &addresses, &request).await;
        let mut signatures: Vec<ServerSignature> = Vec::new();
        for reply in replies {
            let Some(reply) = surface_rejection(reply)? else {
                continue;
            };
            for signature in reply.signatures {
                signatures.push(signature.try_into()?);
            }
        }
        if signatures.len() < threshold {
            return Err(DagaError::quorum(format!(
                "{} of {threshold} challenge signatures collected",
                signatures.len()
            ))
            .into());
        }

        let challenge = Challenge::assemble(signatures, context, &commitments, threshold)?;
        Ok(session.respond(challenge, threshold)?)
    }

    /// Fan a finished request out and aggregate the contributions
    pub async fn submit(
        &self,
        context: &Context,
        auth: &AuthRequest,
    ) -> ClientResult<AuthOutcome> {
        let threshold = self.threshold_for(context);
        let addresses = roster_addresses(context);
        let wire: proto::Auth = auth.into();

        let replies: Vec<_> =
            fan_out::<_, proto::AuthReply>(&self.transport, &addresses, &wire).await;
        let mut aggregator = Aggregator::new(context, auth, threshold)?;
        for reply in replies {
            let Some(reply) = surface_rejection(reply)? else {
                continue;
            };
            // a malformed or unverifiable contribution is a protocol
            // failure, never downgraded to a missing server
            for contribution in contributions_from_reply(reply)? {
                aggregator.accept(contribution)?;
            }
            if aggregator.is_complete() {
                break;
            }
        }
        let reply = aggregator.finalize()?;
        Ok(reply.outcome())
    }

    /// Run one full attempt and interpret the result
    pub async fn authenticate(
        &self,
        context: &Context,
        credentials: &ClientCredentials,
    ) -> ClientResult<AuthOutcome> {
        let auth = self.build_request(context, credentials).await?;
        self.submit(context, &auth).await
    }
}

pub(crate) fn roster_addresses(context: &Context) -> Vec<String> {
    context
        .roster
        .iter()
        .map(|member| member.address.clone())
        .collect()
}

/// Sort a fan-out result into the two failure classes
///
/// Connection failures and timeouts are tolerated down to the threshold and
/// come back as `None`; a protocol error is a server actively rejecting the
/// attempt and aborts it immediately.
fn surface_rejection<T>(reply: TransportResult<T>) -> ClientResult<Option<T>> {
    match reply {
        Ok(reply) => Ok(Some(reply)),
        Err(TransportError::Protocol(error)) => Err(error.into()),
        Err(_) => Ok(None),
    }
}
