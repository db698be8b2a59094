//! Roster: the ordered list of authenticating server identities
//!
//! The roster is agreed out-of-band (a signed configuration file in the
//! observed deployments) and shared read-only by every participant. A
//! server's position in the list is its canonical protocol index; it is the
//! key used by challenge signatures, auth contributions, and the aggregator.

use curve25519_dalek::ristretto::RistrettoPoint;

use crate::errors::{DagaError, DagaResult};
use crate::suite;

/// One authenticating server node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerIdentity {
    /// Long-term public key, used for DH shared secrets and signatures
    pub public_key: RistrettoPoint,
    /// Content-derived identifier: digest of public key and address
    pub id: [u8; 32],
    /// Dial address, e.g. `tls://daga0.example.org:7000`
    pub address: String,
    /// Free-form operator label
    pub description: String,
}

impl ServerIdentity {
    /// Build an identity; the id is derived from the key and address
    pub fn new(
        public_key: RistrettoPoint,
        address: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        let address = address.into();
        let id = suite::digest32(
            suite::DOMAIN_IDENTIFIER,
            &[&suite::point_bytes(&public_key), address.as_bytes()],
        );
        Self {
            public_key,
            id,
            address,
            description: description.into(),
        }
    }
}

/// Ordered, immutable list of server identities
///
/// Order is significant: `list[i]` owns protocol index `i` everywhere else
/// in the protocol. `aggregate` is the group-sum of all member keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Roster {
    /// Content-derived roster identifier
    pub id: [u8; 32],
    list: Vec<ServerIdentity>,
    /// Sum of all member public keys
    pub aggregate: RistrettoPoint,
}

impl Roster {
    /// Build a roster from an ordered server list
    pub fn new(list: Vec<ServerIdentity>) -> DagaResult<Self> {
        if list.is_empty() {
            return Err(DagaError::validation("roster must not be empty"));
        }
        let aggregate: RistrettoPoint = list.iter().map(|s| s.public_key).sum();
        let member_ids: Vec<&[u8]> = list.iter().map(|s| s.id.as_slice()).collect();
        let id = suite::digest32(suite::DOMAIN_IDENTIFIER, &member_ids);
        Ok(Self {
            id,
            list,
            aggregate,
        })
    }

    /// Number of servers in the roster
    pub fn len(&self) -> usize {
        self.list.len()
    }

    /// A roster is never empty; kept for clippy symmetry
    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    /// The member at a protocol index
    pub fn server(&self, index: usize) -> DagaResult<&ServerIdentity> {
        self.list.get(index).ok_or_else(|| {
            DagaError::validation(format!(
                "server index {index} out of range for roster of {}",
                self.list.len()
            ))
        })
    }

    /// Iterate members in protocol-index order
    pub fn iter(&self) -> impl Iterator<Item = &ServerIdentity> {
        self.list.iter()
    }

    /// The member public keys in protocol-index order
    pub fn public_keys(&self) -> Vec<RistrettoPoint> {
        self.list.iter().map(|s| s.public_key).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::suite::KeyPair;
    use rand::rngs::OsRng;

    fn identity(i: usize) -> ServerIdentity {
        let keypair = KeyPair::generate(&mut OsRng);
        ServerIdentity::new(
            keypair.public,
            format!("tls://node{i}.test:7000"),
            format!("node {i}"),
        )
    }

    #[test]
    fn empty_roster_is_rejected() {
        assert!(matches!(
            Roster::new(Vec::new()),
            Err(DagaError::Validation { .. })
        ));
    }

    #[test]
    fn aggregate_is_sum_of_member_keys() {
        let members: Vec<_> = (0..3).map(identity).collect();
        let expected: RistrettoPoint = members.iter().map(|m| m.public_key).sum();
        let roster = Roster::new(members).unwrap();
        assert_eq!(roster.aggregate, expected);
        assert_eq!(roster.len(), 3);
    }

    #[test]
    fn index_lookup_bounds() {
        let roster = Roster::new(vec![identity(0), identity(1)]).unwrap();
        assert!(roster.server(1).is_ok());
        assert!(roster.server(2).is_err());
    }

    #[test]
    fn identity_id_depends_on_address() {
        let keypair = KeyPair::generate(&mut OsRng);
        let a = ServerIdentity::new(keypair.public, "tls://a:7000", "");
        let b = ServerIdentity::new(keypair.public, "tls://b:7000", "");
        assert_ne!(a.id, b.id);
    }
}
