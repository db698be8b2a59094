//! Contribution aggregation and linkage tags
//!
//! The client fans its request out to every roster server in parallel and
//! feeds whatever comes back into an [`Aggregator`]. Contributions are
//! verified on arrival, keyed by roster index, and frozen once the threshold
//! is reached; anything arriving later is discarded so the outcome does not
//! depend on arrival order. The final [`LinkageTag`] is the index-keyed map
//! of tag shares: two authentications belong to the same subscriber exactly
//! when their shares agree on every roster index they have in common.

use std::collections::BTreeMap;

use curve25519_dalek::ristretto::RistrettoPoint;
use curve25519_dalek::traits::Identity;

use crate::client::AuthRequest;
use crate::context::Context;
use crate::errors::{DagaError, DagaResult};
use crate::server::{verify_contribution, Contribution};

/// Collects per-server contributions for one authentication attempt
pub struct Aggregator<'a> {
    context: &'a Context,
    auth: &'a AuthRequest,
    threshold: usize,
    contributions: BTreeMap<usize, Contribution>,
}

impl<'a> Aggregator<'a> {
    /// Start aggregating for a request; the threshold must be satisfiable by
    /// the roster
    pub fn new(context: &'a Context, auth: &'a AuthRequest, threshold: usize) -> DagaResult<Self> {
        if threshold == 0 || threshold > context.server_count() {
            return Err(DagaError::validation(format!(
                "threshold {threshold} not satisfiable by a roster of {}",
                context.server_count()
            )));
        }
        Ok(Self {
            context,
            auth,
            threshold,
            contributions: BTreeMap::new(),
        })
    }

    /// Feed one contribution in
    ///
    /// Returns `Ok(true)` if it was accepted, `Ok(false)` if it was
    /// discarded as a duplicate or because the set is already frozen, and an
    /// error if verification failed.
    pub fn accept(&mut self, contribution: Contribution) -> DagaResult<bool> {
        if self.is_complete() {
            tracing::debug!(
                server = contribution.index,
                "discarding late contribution, threshold already met"
            );
            return Ok(false);
        }
        if self.contributions.contains_key(&contribution.index) {
            return Ok(false);
        }
        verify_contribution(self.context, self.auth, &contribution)?;
        self.contributions.insert(contribution.index, contribution);
        Ok(true)
    }

    /// Whether the threshold has been reached
    pub fn is_complete(&self) -> bool {
        self.contributions.len() >= self.threshold
    }

    /// Number of contributions collected so far
    pub fn len(&self) -> usize {
        self.contributions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contributions.is_empty()
    }

    /// Close the set, in roster-index order
    ///
    /// Fails with a timeout error when called below threshold; the caller
    /// decides the deadline, the aggregator only reports the shortfall.
    pub fn finalize(self) -> DagaResult<AuthReply> {
        if !self.is_complete() {
            return Err(DagaError::timeout(format!(
                "{} of {} required contributions",
                self.contributions.len(),
                self.threshold
            )));
        }
        Ok(AuthReply {
            contributions: self.contributions.into_values().collect(),
        })
    }
}

/// The verified, index-ordered contribution set of one authentication
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthReply {
    /// Contributions in ascending roster-index order
    pub contributions: Vec<Contribution>,
}

/// Result of a completed authentication
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    /// The client proved membership; the tag links its attempts
    Accepted(LinkageTag),
    /// One or more servers proved the client lied about a shared secret
    Denied {
        /// Roster indexes of the servers that exposed the client
        accusers: Vec<usize>,
    },
}

impl AuthReply {
    /// Interpret the contribution set
    pub fn outcome(&self) -> AuthOutcome {
        let accusers: Vec<usize> = self
            .contributions
            .iter()
            .filter(|c| c.tag == RistrettoPoint::identity())
            .map(|c| c.index)
            .collect();
        if !accusers.is_empty() {
            return AuthOutcome::Denied { accusers };
        }
        AuthOutcome::Accepted(LinkageTag {
            shares: self
                .contributions
                .iter()
                .map(|c| (c.index, c.tag))
                .collect(),
        })
    }
}

/// Pseudonymous per-context identity: one tag share per contributing server
///
/// Deterministic for a given subscriber and context, unlinkable across
/// contexts. Because different attempts may be answered by different server
/// subsets, equality is judged on the overlapping indexes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkageTag {
    shares: BTreeMap<usize, RistrettoPoint>,
}

impl LinkageTag {
    /// The share contributed by a given server, if it participated
    pub fn share(&self, index: usize) -> Option<&RistrettoPoint> {
        self.shares.get(&index)
    }

    /// Participating roster indexes, ascending
    pub fn indexes(&self) -> impl Iterator<Item = usize> + '_ {
        self.shares.keys().copied()
    }

    /// Compare two tags on their common indexes
    ///
    /// `Some(true)` if every overlapping share agrees, `Some(false)` on any
    /// disagreement, `None` when the server sets are disjoint and nothing
    /// can be concluded.
    pub fn matches(&self, other: &LinkageTag) -> Option<bool> {
        let mut overlap = false;
        for (index, share) in &self.shares {
            if let Some(theirs) = other.shares.get(index) {
                overlap = true;
                if theirs != share {
                    return Some(false);
                }
            }
        }
        overlap.then_some(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use rand::rngs::OsRng;

    fn contributions(
        fixture: &testing::Fixture,
        auth: &AuthRequest,
    ) -> Vec<Contribution> {
        fixture
            .servers
            .iter()
            .map(|s| s.process_auth(auth, fixture.threshold, &mut OsRng).unwrap())
            .collect()
    }

    #[test]
    fn threshold_subset_suffices() {
        // three servers, threshold two, one offline
        let fixture = testing::fixture(3, 2);
        let auth = testing::authenticate(&fixture, 0);
        let all = contributions(&fixture, &auth);
        let mut aggregator = Aggregator::new(&fixture.context, &auth, 2).unwrap();
        assert!(aggregator.accept(all[0].clone()).unwrap());
        assert!(!aggregator.is_complete());
        assert!(aggregator.accept(all[2].clone()).unwrap());
        assert!(aggregator.is_complete());
        let reply = aggregator.finalize().unwrap();
        assert_eq!(reply.contributions.len(), 2);
        assert!(matches!(reply.outcome(), AuthOutcome::Accepted(_)));
    }

    #[test]
    fn late_and_duplicate_contributions_are_discarded() {
        let fixture = testing::fixture(3, 2);
        let auth = testing::authenticate(&fixture, 0);
        let all = contributions(&fixture, &auth);
        let mut aggregator = Aggregator::new(&fixture.context, &auth, 2).unwrap();
        assert!(aggregator.accept(all[0].clone()).unwrap());
        assert!(!aggregator.accept(all[0].clone()).unwrap());
        assert!(aggregator.accept(all[1].clone()).unwrap());
        // frozen at threshold
        assert!(!aggregator.accept(all[2].clone()).unwrap());
        assert_eq!(aggregator.finalize().unwrap().contributions.len(), 2);
    }

    #[test]
    fn below_threshold_finalize_is_a_timeout() {
        let fixture = testing::fixture(3, 2);
        let auth = testing::authenticate(&fixture, 0);
        let all = contributions(&fixture, &auth);
        let mut aggregator = Aggregator::new(&fixture.context, &auth, 3).unwrap();
        aggregator.accept(all[0].clone()).unwrap();
        assert!(matches!(
            aggregator.finalize(),
            Err(DagaError::Timeout { .. })
        ));
    }

    #[test]
    fn tampered_contribution_is_rejected() {
        let fixture = testing::fixture(2, 2);
        let auth = testing::authenticate(&fixture, 0);
        let mut bad = contributions(&fixture, &auth).remove(0);
        bad.tag += crate::suite::basepoint();
        let mut aggregator = Aggregator::new(&fixture.context, &auth, 2).unwrap();
        assert!(matches!(
            aggregator.accept(bad),
            Err(DagaError::ProofRejected { .. })
        ));
    }

    #[test]
    fn outcome_is_order_independent() {
        let fixture = testing::fixture(3, 2);
        let auth = testing::authenticate(&fixture, 1);
        let all = contributions(&fixture, &auth);

        let mut forward = Aggregator::new(&fixture.context, &auth, 3).unwrap();
        for c in all.iter().cloned() {
            forward.accept(c).unwrap();
        }
        let mut reverse = Aggregator::new(&fixture.context, &auth, 3).unwrap();
        for c in all.iter().rev().cloned() {
            reverse.accept(c).unwrap();
        }
        let a = forward.finalize().unwrap();
        let b = reverse.finalize().unwrap();
        assert_eq!(a, b);
        let indexes: Vec<usize> = b.contributions.iter().map(|c| c.index).collect();
        assert_eq!(indexes, vec![0, 1, 2]);
    }

    #[test]
    fn tags_link_attempts_of_one_subscriber() {
        let fixture = testing::fixture(3, 2);
        let first = testing::authenticate(&fixture, 0);
        let second = testing::authenticate(&fixture, 0);
        let other = testing::authenticate(&fixture, 1);
        let tag = |auth: &AuthRequest| {
            let mut agg = Aggregator::new(&fixture.context, auth, 3).unwrap();
            for c in contributions(&fixture, auth) {
                agg.accept(c).unwrap();
            }
            match agg.finalize().unwrap().outcome() {
                AuthOutcome::Accepted(tag) => tag,
                AuthOutcome::Denied { .. } => panic!("honest client denied"),
            }
        };
        assert_eq!(tag(&first).matches(&tag(&second)), Some(true));
        assert_eq!(tag(&first).matches(&tag(&other)), Some(false));
    }

    #[test]
    fn disjoint_server_sets_are_inconclusive() {
        let fixture = testing::fixture(2, 2);
        let first = testing::authenticate(&fixture, 0);
        let second = testing::authenticate(&fixture, 0);
        let tag = |auth: &AuthRequest, server: usize| {
            let mut agg = Aggregator::new(&fixture.context, auth, 1).unwrap();
            agg.accept(
                fixture.servers[server]
                    .process_auth(auth, fixture.threshold, &mut OsRng)
                    .unwrap(),
            )
            .unwrap();
            match agg.finalize().unwrap().outcome() {
                AuthOutcome::Accepted(tag) => tag,
                AuthOutcome::Denied { .. } => panic!("honest client denied"),
            }
        };
        assert_eq!(tag(&first, 0).matches(&tag(&second, 1)), None);
    }

    #[test]
    fn misbehaving_client_is_denied() {
        let fixture = testing::fixture(3, 2);
        let auth = testing::misbehaving_authenticate(&fixture, 0, 2);
        let mut aggregator = Aggregator::new(&fixture.context, &auth, 3).unwrap();
        for server in &fixture.servers {
            aggregator
                .accept(server.process_auth(&auth, fixture.threshold, &mut OsRng).unwrap())
                .unwrap();
        }
        match aggregator.finalize().unwrap().outcome() {
            AuthOutcome::Denied { accusers } => assert_eq!(accusers, vec![2]),
            AuthOutcome::Accepted(_) => panic!("misbehaving client accepted"),
        }
    }
}
