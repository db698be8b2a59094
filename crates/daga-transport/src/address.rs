//! Roster address to websocket endpoint derivation
//!
//! Roster files declare node addresses as `tls://host:port` (or `tcp://`
//! for plaintext deployments). The websocket listener of a node sits one
//! port above its declared inter-node port, so `tls://a:7000` dials
//! `ws://a:7001/daga`. Explicit `ws://`/`wss://` addresses are used as
//! given.

use url::Url;

use crate::{TransportError, TransportResult};

/// Request path every node serves under
pub const WS_PATH: &str = "/daga";

/// Derive the websocket endpoint for a roster address
pub fn endpoint_url(address: &str) -> TransportResult<Url> {
    let parsed = Url::parse(address)
        .map_err(|e| TransportError::InvalidAddress(format!("{address}: {e}")))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| TransportError::InvalidAddress(format!("{address}: no host")))?;

    let endpoint = match parsed.scheme() {
        "ws" | "wss" => {
            let mut url = parsed.clone();
            if url.path() == "/" || url.path().is_empty() {
                url.set_path(WS_PATH);
            }
            return Ok(url);
        }
        "tls" | "tcp" => {
            let port = parsed
                .port()
                .ok_or_else(|| TransportError::InvalidAddress(format!("{address}: no port")))?;
            let port = port.checked_add(1).ok_or_else(|| {
                TransportError::InvalidAddress(format!("{address}: port out of range"))
            })?;
            format!("ws://{host}:{port}{WS_PATH}")
        }
        other => {
            return Err(TransportError::InvalidAddress(format!(
                "{address}: unsupported scheme {other}"
            )))
        }
    };
    Url::parse(&endpoint).map_err(|e| TransportError::InvalidAddress(format!("{endpoint}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tls_address_maps_to_next_port() {
        let url = endpoint_url("tls://daga0.example.org:7000").unwrap();
        assert_eq!(url.as_str(), "ws://daga0.example.org:7001/daga");
    }

    #[test]
    fn explicit_ws_address_is_kept() {
        let url = endpoint_url("ws://127.0.0.1:9001/daga").unwrap();
        assert_eq!(url.as_str(), "ws://127.0.0.1:9001/daga");
    }

    #[test]
    fn bare_ws_address_gets_the_path() {
        let url = endpoint_url("ws://127.0.0.1:9001").unwrap();
        assert_eq!(url.path(), WS_PATH);
    }

    #[test]
    fn junk_is_rejected() {
        assert!(endpoint_url("daga0.example.org").is_err());
        assert!(endpoint_url("http://daga0.example.org:80").is_err());
        assert!(endpoint_url("tls://daga0.example.org").is_err());
        assert!(endpoint_url("tls://daga0.example.org:65535").is_err());
    }
}
