//! Full protocol rounds over in-memory fixtures

use daga_core::testing;
use daga_core::{Aggregator, AuthOutcome, AuthRequest};
use proptest::prelude::*;
use rand::rngs::OsRng;

fn run_round(fixture: &testing::Fixture, auth: &AuthRequest) -> AuthOutcome {
    let mut aggregator = Aggregator::new(&fixture.context, auth, fixture.threshold).unwrap();
    for server in &fixture.servers {
        let contribution = server
            .process_auth(auth, fixture.threshold, &mut OsRng)
            .unwrap();
        aggregator.accept(contribution).unwrap();
        if aggregator.is_complete() {
            break;
        }
    }
    aggregator.finalize().unwrap().outcome()
}

#[test]
fn honest_round_links_repeat_attempts() {
    let fixture = testing::fixture(3, 4);
    let first = run_round(&fixture, &testing::authenticate(&fixture, 2));
    let second = run_round(&fixture, &testing::authenticate(&fixture, 2));
    let third = run_round(&fixture, &testing::authenticate(&fixture, 0));
    let (AuthOutcome::Accepted(a), AuthOutcome::Accepted(b), AuthOutcome::Accepted(c)) =
        (first, second, third)
    else {
        panic!("honest clients must be accepted");
    };
    assert_eq!(a.matches(&b), Some(true));
    assert_eq!(a.matches(&c), Some(false));
}

#[test]
fn same_subscriber_unlinkable_across_contexts() {
    // same subscriber index in two independently created contexts; the
    // round material differs, so the tags must too
    let first = testing::fixture(2, 2);
    let second = testing::fixture(2, 2);
    let a = run_round(&first, &testing::authenticate(&first, 0));
    let b = run_round(&second, &testing::authenticate(&second, 0));
    let (AuthOutcome::Accepted(a), AuthOutcome::Accepted(b)) = (a, b) else {
        panic!("honest clients must be accepted");
    };
    assert_eq!(a.matches(&b), Some(false));
}

#[test]
fn misbehaving_client_is_denied_end_to_end() {
    let fixture = testing::fixture(3, 2);
    let auth = testing::misbehaving_authenticate(&fixture, 1, 0);
    // aggregate from everyone so the accusation is in the set
    let mut aggregator = Aggregator::new(&fixture.context, &auth, 3).unwrap();
    for server in &fixture.servers {
        aggregator
            .accept(server.process_auth(&auth, fixture.threshold, &mut OsRng).unwrap())
            .unwrap();
    }
    match aggregator.finalize().unwrap().outcome() {
        AuthOutcome::Denied { accusers } => assert_eq!(accusers, vec![0]),
        AuthOutcome::Accepted(_) => panic!("misbehaving client accepted"),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(6))]

    #[test]
    fn any_shape_round_accepts_honest_clients(
        servers in 1usize..4,
        subscribers in 1usize..4,
        prover in 0usize..4,
    ) {
        let prover = prover % subscribers;
        let fixture = testing::fixture(servers, subscribers);
        let auth = testing::authenticate(&fixture, prover);
        prop_assert!(matches!(
            run_round(&fixture, &auth),
            AuthOutcome::Accepted(_)
        ));
    }
}
