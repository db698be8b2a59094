//! Shared test fixtures
//!
//! Builds a fully endorsed context with in-memory servers and subscriber
//! credentials, and drives complete authentication rounds without any
//! transport. Used by this crate's unit tests and by the client and server
//! crates' integration tests.

use curve25519_dalek::scalar::Scalar;
use rand::rngs::OsRng;
use zeroize::Zeroize;

use crate::challenge::Challenge;
use crate::client::{self, AuthRequest, ClientCredentials, ProofSession};
use crate::context::{self, Context, ServiceId};
use crate::roster::Roster;
use crate::server::Server;
use crate::suite;

/// A complete in-memory deployment: servers, subscribers, endorsed context
pub struct Fixture {
    pub servers: Vec<Server>,
    pub clients: Vec<ClientCredentials>,
    pub context: Context,
    /// Majority threshold over the roster
    pub threshold: usize,
}

/// Build a deployment with the given roster and anonymity-set sizes
pub fn fixture(server_count: usize, subscriber_count: usize) -> Fixture {
    let mut rng = OsRng;
    let servers: Vec<Server> = (0..server_count)
        .map(|j| Server::generate(j, &mut rng))
        .collect();
    let roster = Roster::new(
        servers
            .iter()
            .enumerate()
            .map(|(j, s)| s.identity(format!("tls://daga{j}.test:7000"), format!("test node {j}")))
            .collect(),
    )
    .unwrap();

    let (clients, subscriber_keys): (Vec<_>, Vec<_>) = (0..subscriber_count)
        .map(|i| ClientCredentials::generate(i, &mut rng))
        .unzip();
    let round_commitments: Vec<_> = servers.iter().map(Server::round_commitment).collect();

    let service_id = ServiceId::from_name("fixture-service");
    let generators = context::derive_generators(&service_id, subscriber_count, &round_commitments);
    let parameters = context::parameter_bytes(
        &service_id,
        &subscriber_keys,
        &roster.public_keys(),
        &round_commitments,
        &generators,
    );
    let signatures: Vec<_> = servers.iter().map(|s| s.endorse(&parameters, &mut rng)).collect();
    let context = Context::assemble(
        service_id,
        subscriber_keys,
        round_commitments,
        signatures,
        roster,
    )
    .unwrap();

    Fixture {
        servers,
        clients,
        context,
        threshold: server_count / 2 + 1,
    }
}

/// Run the commit/challenge/respond exchange for one subscriber against the
/// full roster
pub fn authenticate(fixture: &Fixture, client_index: usize) -> AuthRequest {
    let mut rng = OsRng;
    let (session, commitments) =
        ProofSession::start(&fixture.context, &fixture.clients[client_index], &mut rng).unwrap();
    let challenge = collect_challenge(fixture, &commitments);
    session.respond(challenge, fixture.threshold).unwrap()
}

/// Like [`authenticate`], but the client lies to one server about their
/// shared secret; every other server still sees an honest request
pub fn misbehaving_authenticate(
    fixture: &Fixture,
    client_index: usize,
    cheated_server: usize,
) -> AuthRequest {
    let mut rng = OsRng;
    let mut ephemeral = Scalar::random(&mut rng);
    let ephemeral_public = ephemeral * suite::basepoint();
    let mut shared = client::derive_shared_secrets(&fixture.context, &ephemeral);
    ephemeral.zeroize();
    shared[cheated_server] = Scalar::random(&mut rng);

    let (session, commitments) = ProofSession::start_with_secrets(
        &fixture.context,
        &fixture.clients[client_index],
        ephemeral_public,
        shared,
        &mut rng,
    )
    .unwrap();
    let challenge = collect_challenge(fixture, &commitments);
    session.respond(challenge, fixture.threshold).unwrap()
}

/// Gather challenge signatures from the whole roster and assemble them
pub fn collect_challenge(
    fixture: &Fixture,
    commitments: &[curve25519_dalek::ristretto::RistrettoPoint],
) -> Challenge {
    let mut rng = OsRng;
    let signatures: Vec<_> = fixture
        .servers
        .iter()
        .map(|s| s.sign_commitments(&fixture.context, commitments, &mut rng))
        .collect();
    Challenge::assemble(signatures, &fixture.context, commitments, fixture.threshold).unwrap()
}
