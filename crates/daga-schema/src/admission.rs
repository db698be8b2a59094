//! Service admission message
//!
//! Context creation is authorized by the requesting service: its signature
//! covers the service id and the exact subscriber set. Both sides build the
//! message from the wire-level bytes so the check runs before any group
//! decoding.

use daga_core::suite;

const DOMAIN_CREATE_CONTEXT: &[u8] = b"daga-create-context-v1";

/// The message a service signs to authorize a [`crate::proto::CreateContext`]
pub fn create_context_message(service_id: &[u8], subscriber_keys: &[Vec<u8>]) -> Vec<u8> {
    let parts: Vec<&[u8]> = std::iter::once(service_id)
        .chain(subscriber_keys.iter().map(|k| k.as_slice()))
        .collect();
    suite::digest32(DOMAIN_CREATE_CONTEXT, &parts).to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_is_bound_to_the_subscriber_set() {
        let a = create_context_message(b"svc", &[vec![1; 32], vec![2; 32]]);
        let b = create_context_message(b"svc", &[vec![1; 32]]);
        let c = create_context_message(b"svd", &[vec![1; 32], vec![2; 32]]);
        assert_ne!(a, b);
        assert_ne!(a, c);
    }
}
