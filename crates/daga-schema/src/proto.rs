//! Protobuf message definitions
//!
//! Hand-derived prost messages; the field numbers are the wire contract and
//! must never be renumbered. Group elements and scalars travel as their
//! canonical 32-byte encodings, signatures as opaque bytes.

/// A signed authentication context as distributed to clients and servers
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Context {
    #[prost(bytes = "vec", tag = "1")]
    pub context_id: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub service_id: Vec<u8>,
    /// One endorsement per roster member, roster order
    #[prost(bytes = "vec", repeated, tag = "3")]
    pub signatures: Vec<Vec<u8>>,
    /// Subscriber public keys `X`
    #[prost(bytes = "vec", repeated, tag = "4")]
    pub subscriber_keys: Vec<Vec<u8>>,
    /// Server public keys `Y`
    #[prost(bytes = "vec", repeated, tag = "5")]
    pub server_keys: Vec<Vec<u8>>,
    /// Round-secret commitments `R`
    #[prost(bytes = "vec", repeated, tag = "6")]
    pub round_commitments: Vec<Vec<u8>>,
    /// Per-subscriber generators `H`
    #[prost(bytes = "vec", repeated, tag = "7")]
    pub generators: Vec<Vec<u8>>,
    #[prost(message, repeated, tag = "8")]
    pub roster: Vec<RosterEntry>,
}

/// One roster member: key plus dial address
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RosterEntry {
    #[prost(bytes = "vec", tag = "1")]
    pub public_key: Vec<u8>,
    #[prost(string, tag = "2")]
    pub address: String,
    #[prost(string, tag = "3")]
    pub description: String,
}

/// Client's proof commitments, sent to servers for challenge generation
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PkClientCommitments {
    #[prost(bytes = "vec", tag = "1")]
    pub context_id: Vec<u8>,
    #[prost(bytes = "vec", repeated, tag = "2")]
    pub commitments: Vec<Vec<u8>>,
}

/// A server's answer: its challenge signature share
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PkClientChallenge {
    /// Fiat-Shamir seed scalar
    #[prost(bytes = "vec", tag = "1")]
    pub cs: Vec<u8>,
    #[prost(message, repeated, tag = "2")]
    pub signatures: Vec<ServerSignature>,
}

/// An index-bound Schnorr signature
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ServerSignature {
    #[prost(sint32, tag = "1")]
    pub index: i32,
    #[prost(bytes = "vec", tag = "2")]
    pub sig: Vec<u8>,
}

/// The full authentication request
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Auth {
    #[prost(message, optional, tag = "1")]
    pub context: Option<Context>,
    /// `[Z, S_1..S_n, B_1..B_n]`
    #[prost(bytes = "vec", repeated, tag = "2")]
    pub s_commits: Vec<Vec<u8>>,
    #[prost(bytes = "vec", tag = "3")]
    pub t0: Vec<u8>,
    #[prost(message, optional, tag = "4")]
    pub proof: Option<ClientProof>,
}

/// The client's OR-proof transcript
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ClientProof {
    #[prost(message, optional, tag = "1")]
    pub cs: Option<PkClientChallenge>,
    #[prost(bytes = "vec", repeated, tag = "2")]
    pub t: Vec<Vec<u8>>,
    #[prost(bytes = "vec", repeated, tag = "3")]
    pub c: Vec<Vec<u8>>,
    #[prost(bytes = "vec", repeated, tag = "4")]
    pub r: Vec<Vec<u8>>,
}

/// A server's tag-share proof, honest or accusing
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ServerProof {
    #[prost(bytes = "vec", tag = "1")]
    pub t1: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub t2: Vec<u8>,
    #[prost(bytes = "vec", tag = "3")]
    pub t3: Vec<u8>,
    #[prost(bytes = "vec", tag = "4")]
    pub c: Vec<u8>,
    #[prost(bytes = "vec", tag = "5")]
    pub r1: Vec<u8>,
    /// Absent in a misbehaving-client proof
    #[prost(bytes = "vec", optional, tag = "6")]
    pub r2: Option<Vec<u8>>,
}

/// One or more server contributions to an authentication
///
/// Parallel sequences keyed by `indexes`; a single server replies with
/// one-element sequences and leaves `request` unset.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AuthReply {
    #[prost(message, optional, tag = "1")]
    pub request: Option<Auth>,
    #[prost(bytes = "vec", repeated, tag = "2")]
    pub tags: Vec<Vec<u8>>,
    #[prost(message, repeated, tag = "3")]
    pub proofs: Vec<ServerProof>,
    #[prost(sint32, repeated, tag = "4")]
    pub indexes: Vec<i32>,
    #[prost(bytes = "vec", repeated, tag = "5")]
    pub sigs: Vec<Vec<u8>>,
}

/// First round of context creation: the service asks the roster for a
/// context over its subscriber set
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CreateContext {
    #[prost(bytes = "vec", tag = "1")]
    pub service_id: Vec<u8>,
    /// Service authorization over `service_id` and the subscriber keys
    #[prost(bytes = "vec", tag = "2")]
    pub signature: Vec<u8>,
    #[prost(bytes = "vec", repeated, tag = "3")]
    pub subscriber_keys: Vec<Vec<u8>>,
    #[prost(message, repeated, tag = "4")]
    pub nodes: Vec<RosterEntry>,
}

/// A node's first-round answer: its round-secret commitment
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CreateContextCommit {
    #[prost(sint32, tag = "1")]
    pub index: i32,
    #[prost(bytes = "vec", tag = "2")]
    pub round_commitment: Vec<u8>,
}

/// Second round: the assembled parameters, sent back for endorsement
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EndorseContext {
    #[prost(message, optional, tag = "1")]
    pub context: Option<Context>,
}

/// A node's endorsement over the assembled parameters
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EndorseContextReply {
    #[prost(sint32, tag = "1")]
    pub index: i32,
    #[prost(bytes = "vec", tag = "2")]
    pub signature: Vec<u8>,
}

/// The final, fully endorsed context
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CreateContextReply {
    #[prost(message, optional, tag = "1")]
    pub context: Option<Context>,
}

/// A subscriber credential handed to the local authentication daemon
///
/// Only ever travels over the loopback daemon socket, never between nodes.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ClientCredentials {
    #[prost(sint32, tag = "1")]
    pub index: i32,
    #[prost(bytes = "vec", tag = "2")]
    pub private_key: Vec<u8>,
}

/// A node's answer when handling a request failed
///
/// Carries the protocol error kind so clients can tell a cryptographic
/// rejection apart from an unreachable server. `context_id` is set only for
/// unknown-context errors.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ErrorReply {
    #[prost(string, tag = "1")]
    pub kind: String,
    #[prost(string, tag = "2")]
    pub message: String,
    #[prost(bytes = "vec", tag = "3")]
    pub context_id: Vec<u8>,
}

/// Request for a node's traffic counters
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Traffic {}

/// Bytes received and sent by a node since startup
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TrafficReply {
    #[prost(uint64, tag = "1")]
    pub rx: u64,
    #[prost(uint64, tag = "2")]
    pub tx: u64,
}
