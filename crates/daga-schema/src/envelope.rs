//! Type-tagged message framing
//!
//! Every frame on the wire is an [`Envelope`]: a message name plus the
//! encoded payload. Receivers dispatch on the name, so one connection can
//! carry any request/reply pair without per-endpoint routing.

use prost::Message;

use daga_core::errors::{DagaError, DagaResult};

use crate::proto;

/// The outer frame carried in every transport message
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Envelope {
    #[prost(string, tag = "1")]
    pub type_name: String,
    #[prost(bytes = "vec", tag = "2")]
    pub payload: Vec<u8>,
}

/// A message that can travel inside an [`Envelope`]
pub trait WireMessage: Message + Default {
    /// Stable dispatch name; part of the wire contract
    const NAME: &'static str;
}

macro_rules! wire_message {
    ($type:ty, $name:literal) => {
        impl WireMessage for $type {
            const NAME: &'static str = $name;
        }
    };
}

wire_message!(proto::Context, "Context");
wire_message!(proto::PkClientCommitments, "PKclientCommitments");
wire_message!(proto::PkClientChallenge, "PKclientChallenge");
wire_message!(proto::Auth, "Auth");
wire_message!(proto::AuthReply, "AuthReply");
wire_message!(proto::CreateContext, "CreateContext");
wire_message!(proto::CreateContextCommit, "CreateContextCommit");
wire_message!(proto::EndorseContext, "EndorseContext");
wire_message!(proto::EndorseContextReply, "EndorseContextReply");
wire_message!(proto::CreateContextReply, "CreateContextReply");
wire_message!(proto::ClientCredentials, "ClientCredentials");
wire_message!(proto::ErrorReply, "Error");
wire_message!(proto::Traffic, "Traffic");
wire_message!(proto::TrafficReply, "TrafficReply");

/// Frame a message for the wire
pub fn seal<M: WireMessage>(message: &M) -> Vec<u8> {
    Envelope {
        type_name: M::NAME.to_string(),
        payload: message.encode_to_vec(),
    }
    .encode_to_vec()
}

/// Decode the outer frame of a received message
pub fn open(bytes: &[u8]) -> DagaResult<Envelope> {
    Envelope::decode(bytes)
        .map_err(|e| DagaError::schema(format!("undecodable envelope: {e}")))
}

impl Envelope {
    /// Decode the payload as a specific message, checking the name tag
    pub fn payload_as<M: WireMessage>(&self) -> DagaResult<M> {
        if self.type_name != M::NAME {
            return Err(DagaError::schema(format!(
                "expected {} frame, got {}",
                M::NAME,
                self.type_name
            )));
        }
        M::decode(self.payload.as_slice())
            .map_err(|e| DagaError::schema(format!("undecodable {} payload: {e}", M::NAME)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_open_roundtrip() {
        let message = proto::TrafficReply { rx: 7, tx: 9 };
        let envelope = open(&seal(&message)).unwrap();
        assert_eq!(envelope.type_name, "TrafficReply");
        assert_eq!(envelope.payload_as::<proto::TrafficReply>().unwrap(), message);
    }

    #[test]
    fn name_mismatch_is_a_schema_error() {
        let envelope = open(&seal(&proto::Traffic {})).unwrap();
        assert!(matches!(
            envelope.payload_as::<proto::TrafficReply>(),
            Err(DagaError::Schema { .. })
        ));
    }

    #[test]
    fn garbage_frame_is_a_schema_error() {
        assert!(open(&[0xde, 0xad, 0xbe, 0xef, 0x01]).is_err());
    }
}
