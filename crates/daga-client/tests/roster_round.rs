//! End-to-end rounds over real websockets and in-process server nodes

use std::sync::Arc;

use curve25519_dalek::ristretto::RistrettoPoint;
use curve25519_dalek::scalar::Scalar;
use futures_util::{SinkExt, StreamExt};
use rand::rngs::OsRng;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

use daga_client::{Authenticator, ClientError, ContextCreator};
use daga_core::client::ClientCredentials;
use daga_core::context::{Context, ServiceId};
use daga_core::roster::{Roster, ServerIdentity};
use daga_core::suite::{self, KeyPair};
use daga_core::{AuthOutcome, DagaError};
use daga_schema::{envelope, proto, WireMessage};
use daga_server::Node;
use daga_transport::{TransportConfig, TransportError};

struct TestNode {
    keypair: KeyPair,
    address: String,
    task: JoinHandle<()>,
}

async fn spawn_nodes(count: usize) -> Vec<TestNode> {
    let mut nodes = Vec::with_capacity(count);
    for _ in 0..count {
        let keypair = KeyPair::generate(&mut OsRng);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = format!("ws://{}", listener.local_addr().unwrap());
        let node = Arc::new(Node::new(keypair.clone(), None, Vec::new()));
        let task = tokio::spawn(async move {
            let _ = daga_transport::serve(listener, move |frame| {
                let node = Arc::clone(&node);
                async move { node.handle(frame).await.map_err(TransportError::Protocol) }
            })
            .await;
        });
        nodes.push(TestNode {
            keypair,
            address,
            task,
        });
    }
    nodes
}

/// A roster member that answers correctly except for swapping its tag share
async fn spawn_tampering_node() -> TestNode {
    let keypair = KeyPair::generate(&mut OsRng);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = format!("ws://{}", listener.local_addr().unwrap());
    let node = Arc::new(Node::new(keypair.clone(), None, Vec::new()));
    let task = tokio::spawn(async move {
        let _ = daga_transport::serve(listener, move |frame| {
            let node = Arc::clone(&node);
            async move {
                let reply = node.handle(frame).await.map_err(TransportError::Protocol)?;
                let envelope = envelope::open(&reply)?;
                if envelope.type_name != proto::AuthReply::NAME {
                    return Ok(reply);
                }
                let mut tampered = envelope.payload_as::<proto::AuthReply>()?;
                tampered.tags[0] = suite::point_bytes(&suite::basepoint()).to_vec();
                Ok(envelope::seal(&tampered))
            }
        })
        .await;
    });
    TestNode {
        keypair,
        address,
        task,
    }
}

fn roster_of(nodes: &[TestNode]) -> Roster {
    Roster::new(
        nodes
            .iter()
            .map(|node| ServerIdentity::new(node.keypair.public, node.address.clone(), "itest"))
            .collect(),
    )
    .unwrap()
}

async fn create_context(nodes: &[TestNode], subscribers: &[(Scalar, RistrettoPoint)]) -> Context {
    let service = KeyPair::generate(&mut OsRng);
    ContextCreator::new(TransportConfig::default())
        .create_context(
            &service,
            ServiceId::from_name("itest-service"),
            subscribers.iter().map(|(_, key)| *key).collect(),
            roster_of(nodes),
        )
        .await
        .unwrap()
}

fn subscribers(count: usize) -> Vec<(Scalar, RistrettoPoint)> {
    (0..count)
        .map(|_| {
            let secret = Scalar::random(&mut OsRng);
            (secret, secret * suite::basepoint())
        })
        .collect()
}

fn credentials(subscribers: &[(Scalar, RistrettoPoint)], index: usize) -> ClientCredentials {
    ClientCredentials::new(index, subscribers[index].0)
}

#[tokio::test]
async fn full_round_links_and_separates_subscribers() {
    let nodes = spawn_nodes(3).await;
    let subs = subscribers(2);
    let context = create_context(&nodes, &subs).await;

    let authenticator = Authenticator::new(TransportConfig::default());
    let first = authenticator
        .authenticate(&context, &credentials(&subs, 0))
        .await
        .unwrap();
    let second = authenticator
        .authenticate(&context, &credentials(&subs, 0))
        .await
        .unwrap();
    let other = authenticator
        .authenticate(&context, &credentials(&subs, 1))
        .await
        .unwrap();

    let (AuthOutcome::Accepted(a), AuthOutcome::Accepted(b), AuthOutcome::Accepted(c)) =
        (first, second, other)
    else {
        panic!("honest subscribers must be accepted");
    };
    assert_eq!(a.matches(&b), Some(true));
    assert_eq!(a.matches(&c), Some(false));
}

#[tokio::test]
async fn majority_survives_an_offline_node() {
    let nodes = spawn_nodes(3).await;
    let subs = subscribers(2);
    let context = create_context(&nodes, &subs).await;

    nodes[2].task.abort();
    // give the abort a moment to drop the listener
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let config = TransportConfig {
        connect_timeout: std::time::Duration::from_millis(500),
        request_timeout: std::time::Duration::from_secs(5),
    };
    let outcome = Authenticator::new(config)
        .authenticate(&context, &credentials(&subs, 1))
        .await
        .unwrap();
    assert!(matches!(outcome, AuthOutcome::Accepted(_)));
}

#[tokio::test]
async fn unknown_context_is_refused() {
    let nodes = spawn_nodes(2).await;
    let request = proto::PkClientCommitments {
        context_id: vec![7; 32],
        commitments: Vec::new(),
    };
    let result: Result<proto::PkClientChallenge, _> = daga_transport::exchange(
        &TransportConfig::default(),
        &nodes[0].address,
        &request,
    )
    .await;
    assert!(matches!(
        result,
        Err(TransportError::Protocol(DagaError::UnknownContext(_)))
    ));
}

#[tokio::test]
async fn flipped_response_is_rejected_by_every_server() {
    let nodes = spawn_nodes(3).await;
    let subs = subscribers(2);
    let context = create_context(&nodes, &subs).await;

    let authenticator = Authenticator::new(TransportConfig::default());
    let mut auth = authenticator
        .build_request(&context, &credentials(&subs, 0))
        .await
        .unwrap();
    auth.proof.r[0] += Scalar::ONE;
    let wire: proto::Auth = (&auth).into();

    for node in &nodes {
        let result: Result<proto::AuthReply, _> =
            daga_transport::exchange(&TransportConfig::default(), &node.address, &wire).await;
        assert!(matches!(
            result,
            Err(TransportError::Protocol(DagaError::InvalidProof { .. }))
        ));
    }
    // the full attempt surfaces the rejection, not a quorum shortfall
    let outcome = authenticator.submit(&context, &auth).await;
    assert!(matches!(
        outcome,
        Err(ClientError::Protocol(DagaError::InvalidProof { .. }))
    ));
}

#[tokio::test]
async fn corrupted_contribution_fails_the_attempt() {
    // two honest nodes plus one that swaps its tag share after the fact
    let mut nodes = spawn_nodes(2).await;
    nodes.push(spawn_tampering_node().await);
    let subs = subscribers(2);
    let context = create_context(&nodes, &subs).await;

    let outcome = Authenticator::new(TransportConfig::default())
        .with_threshold(3)
        .authenticate(&context, &credentials(&subs, 0))
        .await;
    assert!(matches!(
        outcome,
        Err(ClientError::Protocol(DagaError::ProofRejected { .. }))
    ));
}

#[tokio::test]
async fn daemon_builds_a_submittable_request() {
    let nodes = spawn_nodes(3).await;
    let subs = subscribers(2);
    let context = create_context(&nodes, &subs).await;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let daemon_addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = daga_client::daemon::run(listener, TransportConfig::default()).await;
    });

    let (mut stream, _) = tokio_tungstenite::connect_async(format!("ws://{daemon_addr}"))
        .await
        .unwrap();
    let wire_context: proto::Context = (&context).into();
    stream
        .send(Message::Binary(envelope::seal(&wire_context)))
        .await
        .unwrap();
    stream
        .send(Message::Binary(envelope::seal(&proto::ClientCredentials {
            index: 1,
            private_key: suite::scalar_bytes(&subs[1].0).to_vec(),
        })))
        .await
        .unwrap();

    let reply = loop {
        match stream.next().await.unwrap().unwrap() {
            Message::Binary(bytes) => break bytes,
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected frame: {other:?}"),
        }
    };
    let auth: daga_core::AuthRequest = envelope::open(&reply)
        .unwrap()
        .payload_as::<proto::Auth>()
        .unwrap()
        .try_into()
        .unwrap();

    let outcome = Authenticator::new(TransportConfig::default())
        .submit(&context, &auth)
        .await
        .unwrap();
    assert!(matches!(outcome, AuthOutcome::Accepted(_)));
}
