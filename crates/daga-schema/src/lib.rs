//! Wire schema for the DAGA protocol
//!
//! Protobuf message definitions with stable field numbers, the envelope
//! framing used to dispatch them, and lossless conversions to and from the
//! core protocol types. Decoding enforces canonical group encodings and
//! shape consistency; everything cryptographic stays in `daga-core`.

#![forbid(unsafe_code)]

pub mod admission;
pub mod convert;
pub mod envelope;
pub mod proto;

pub use convert::{contributions_from_reply, encode_auth_reply, roster_from_entries};
pub use envelope::{open, seal, Envelope, WireMessage};
