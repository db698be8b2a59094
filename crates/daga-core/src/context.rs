//! Authentication context: the signed per-campaign parameter set
//!
//! A context binds a third-party service to a subscriber group and to the
//! per-round material the roster servers generated for it: one round-secret
//! commitment per server and one generator per subscriber. It is created
//! once per authentication campaign, endorsed by every roster member, and
//! immutable afterwards; any mutation invalidates the endorsements and
//! requires re-creation.

use curve25519_dalek::ristretto::RistrettoPoint;

use crate::errors::{DagaError, DagaResult};
use crate::roster::Roster;
use crate::suite;

/// Identifier of an authentication context, derived from its parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(pub [u8; 32]);

/// Identifier of the third-party service a context belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServiceId(pub [u8; 32]);

impl std::fmt::Display for ContextId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl std::fmt::Display for ServiceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl ServiceId {
    /// Derive a service id from a stable service name
    pub fn from_name(name: &str) -> Self {
        Self(suite::digest32(
            suite::DOMAIN_IDENTIFIER,
            &[name.as_bytes()],
        ))
    }
}

/// The signed parameter set of one authentication campaign
#[derive(Debug, Clone)]
pub struct Context {
    /// Digest of the parameter encoding below; self-authenticating
    pub context_id: ContextId,
    /// The service this context authenticates for
    pub service_id: ServiceId,
    /// One endorsement per roster member over [`Context::parameter_bytes`]
    pub signatures: Vec<Vec<u8>>,
    /// Subscriber (client) public keys; the anonymity set
    pub subscribers: Vec<RistrettoPoint>,
    /// Server public keys in roster order
    pub server_keys: Vec<RistrettoPoint>,
    /// Per-server commitments `R_j = G^{r_j}` to the round secrets
    pub round_commitments: Vec<RistrettoPoint>,
    /// Per-subscriber per-round generators `h_i`
    pub generators: Vec<RistrettoPoint>,
    /// How to reach the servers
    pub roster: Roster,
}

/// Derive the per-subscriber generators from the collected round commitments
///
/// Generators are hashed onto the group so no participant knows their
/// discrete logs relative to the basepoint or to each other.
pub fn derive_generators(
    service_id: &ServiceId,
    subscriber_count: usize,
    round_commitments: &[RistrettoPoint],
) -> Vec<RistrettoPoint> {
    let commitment_bytes: Vec<[u8; 32]> =
        round_commitments.iter().map(suite::point_bytes).collect();
    (0..subscriber_count)
        .map(|i| {
            let index = (i as u32).to_be_bytes();
            let mut parts: Vec<&[u8]> = vec![&service_id.0, &index];
            parts.extend(commitment_bytes.iter().map(|b| b.as_slice()));
            suite::hash_to_point(suite::DOMAIN_GENERATOR, &parts)
        })
        .collect()
}

/// Canonical encoding of `(service_id, x, y, r, h)`; the message every
/// roster member endorses
pub fn parameter_bytes(
    service_id: &ServiceId,
    subscribers: &[RistrettoPoint],
    server_keys: &[RistrettoPoint],
    round_commitments: &[RistrettoPoint],
    generators: &[RistrettoPoint],
) -> Vec<u8> {
    let mut data = Vec::with_capacity(
        32 + 32
            * (subscribers.len()
                + server_keys.len()
                + round_commitments.len()
                + generators.len()),
    );
    data.extend_from_slice(&service_id.0);
    for group in [subscribers, server_keys, round_commitments, generators] {
        data.extend_from_slice(&(group.len() as u32).to_be_bytes());
        for point in group {
            data.extend_from_slice(&suite::point_bytes(point));
        }
    }
    data
}

impl Context {
    /// Assemble a context from collected creation-round material
    ///
    /// `signatures[j]` must be roster member `j`'s endorsement over the
    /// canonical parameter encoding. Validates before returning.
    pub fn assemble(
        service_id: ServiceId,
        subscribers: Vec<RistrettoPoint>,
        round_commitments: Vec<RistrettoPoint>,
        signatures: Vec<Vec<u8>>,
        roster: Roster,
    ) -> DagaResult<Self> {
        let server_keys = roster.public_keys();
        let generators = derive_generators(&service_id, subscribers.len(), &round_commitments);
        let context_id = ContextId(suite::digest32(
            suite::DOMAIN_IDENTIFIER,
            &[&parameter_bytes(
                &service_id,
                &subscribers,
                &server_keys,
                &round_commitments,
                &generators,
            )],
        ));
        let context = Self {
            context_id,
            service_id,
            signatures,
            subscribers,
            server_keys,
            round_commitments,
            generators,
            roster,
        };
        context.validate()?;
        Ok(context)
    }

    /// The id this context's parameters actually derive to
    ///
    /// Equal to `context_id` on any well-formed context; servers compare the
    /// two before endorsing assembled parameters.
    pub fn derived_id(&self) -> ContextId {
        ContextId(suite::digest32(
            suite::DOMAIN_IDENTIFIER,
            &[&self.parameter_bytes()],
        ))
    }

    /// The canonical parameter encoding of this context
    pub fn parameter_bytes(&self) -> Vec<u8> {
        parameter_bytes(
            &self.service_id,
            &self.subscribers,
            &self.server_keys,
            &self.round_commitments,
            &self.generators,
        )
    }

    /// Check every structural invariant and endorsement
    ///
    /// Per-server sequences (`y`, `r`, signatures) must parallel the roster;
    /// per-subscriber sequences (`x`, `h`) must parallel each other and be
    /// non-empty; every endorsement must verify under the matching roster
    /// key; the context id must match the parameters.
    pub fn validate(&self) -> DagaResult<()> {
        let servers = self.roster.len();
        if self.server_keys.len() != servers
            || self.round_commitments.len() != servers
            || self.signatures.len() != servers
        {
            return Err(DagaError::validation(format!(
                "per-server sequences must parallel the roster: got y={}, r={}, sigs={}, roster={servers}",
                self.server_keys.len(),
                self.round_commitments.len(),
                self.signatures.len(),
            )));
        }
        if self.subscribers.is_empty() || self.subscribers.len() != self.generators.len() {
            return Err(DagaError::validation(format!(
                "per-subscriber sequences must be non-empty and parallel: got x={}, h={}",
                self.subscribers.len(),
                self.generators.len(),
            )));
        }
        for (j, member) in self.roster.iter().enumerate() {
            if self.server_keys[j] != member.public_key {
                return Err(DagaError::validation(format!(
                    "server key {j} does not match the roster"
                )));
            }
        }

        let params = self.parameter_bytes();
        if self.context_id != self.derived_id() {
            return Err(DagaError::validation(
                "context id does not match its parameters",
            ));
        }
        for (j, sig) in self.signatures.iter().enumerate() {
            suite::schnorr_verify(&self.server_keys[j], &params, sig).map_err(|_| {
                DagaError::validation(format!("context endorsement of server {j} is invalid"))
            })?;
        }
        Ok(())
    }

    /// Number of subscribers in the anonymity set
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Number of servers in the roster
    pub fn server_count(&self) -> usize {
        self.roster.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[test]
    fn assembled_context_validates() {
        let fixture = testing::fixture(3, 2);
        assert!(fixture.context.validate().is_ok());
    }

    #[test]
    fn truncated_round_commitments_are_rejected() {
        let fixture = testing::fixture(3, 2);
        let mut context = fixture.context.clone();
        context.round_commitments.pop();
        assert!(matches!(
            context.validate(),
            Err(DagaError::Validation { .. })
        ));
    }

    #[test]
    fn subscriber_generator_mismatch_is_rejected() {
        let fixture = testing::fixture(3, 2);
        let mut context = fixture.context.clone();
        context.generators.pop();
        assert!(matches!(
            context.validate(),
            Err(DagaError::Validation { .. })
        ));
    }

    #[test]
    fn tampered_parameters_break_the_id() {
        let fixture = testing::fixture(3, 2);
        let mut context = fixture.context.clone();
        context.subscribers.swap(0, 1);
        assert!(context.validate().is_err());
    }

    #[test]
    fn bad_endorsement_is_rejected() {
        let fixture = testing::fixture(3, 2);
        let mut context = fixture.context.clone();
        context.signatures[1][10] ^= 0x01;
        assert!(context.validate().is_err());
    }

    #[test]
    fn generators_differ_per_subscriber() {
        let fixture = testing::fixture(2, 3);
        assert_ne!(fixture.context.generators[0], fixture.context.generators[1]);
    }
}
