//! One-shot websocket exchanges and the accept loop

use futures_util::{SinkExt, StreamExt};
use std::future::Future;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::{accept_async, client_async, tungstenite::Message, WebSocketStream};

use daga_schema::{envelope, proto, WireMessage};

use crate::address::endpoint_url;
use crate::{TransportConfig, TransportError, TransportResult};

/// Send one binary frame to a roster address and await one binary frame back
pub async fn request(
    config: &TransportConfig,
    address: &str,
    frame: Vec<u8>,
) -> TransportResult<Vec<u8>> {
    let url = endpoint_url(address)?;
    let host = url
        .socket_addrs(|| None)
        .map_err(|e| TransportError::InvalidAddress(format!("{url}: {e}")))?
        .into_iter()
        .next()
        .ok_or_else(|| TransportError::InvalidAddress(format!("{url}: unresolvable")))?;

    let (mut stream, _response) = timeout(config.connect_timeout, async {
        let tcp = TcpStream::connect(host)
            .await
            .map_err(|e| TransportError::ConnectionFailed(format!("dial {url}: {e}")))?;
        client_async(url.as_str(), tcp)
            .await
            .map_err(|e| TransportError::ConnectionFailed(format!("handshake {url}: {e}")))
    })
    .await
    .map_err(|_| TransportError::Timeout(format!("connecting to {url}")))??;

    let reply = timeout(config.request_timeout, async {
        stream
            .send(Message::Binary(frame))
            .await
            .map_err(|e| TransportError::ConnectionFailed(format!("send to {url}: {e}")))?;
        loop {
            let message = stream
                .next()
                .await
                .ok_or_else(|| {
                    TransportError::ConnectionFailed(format!("{url} closed without replying"))
                })?
                .map_err(|e| TransportError::ConnectionFailed(format!("receive from {url}: {e}")))?;
            match message {
                Message::Binary(bytes) => return Ok(bytes),
                Message::Ping(_) | Message::Pong(_) => continue,
                other => {
                    return Err(TransportError::ConnectionFailed(format!(
                        "unexpected {} frame from {url}",
                        frame_kind(&other)
                    )))
                }
            }
        }
    })
    .await
    .map_err(|_| TransportError::Timeout(format!("waiting on {url}")))??;

    let _ = stream.close(None).await;
    Ok(reply)
}

fn frame_kind(message: &Message) -> &'static str {
    match message {
        Message::Text(_) => "text",
        Message::Binary(_) => "binary",
        Message::Ping(_) => "ping",
        Message::Pong(_) => "pong",
        Message::Close(_) => "close",
        Message::Frame(_) => "raw",
    }
}

/// Typed request/reply: seal, exchange, open, decode
///
/// A peer that failed to handle the request answers with an error frame;
/// that comes back as [`TransportError::Protocol`] carrying the peer's
/// error kind, distinct from the connection failures of an unreachable peer.
pub async fn exchange<Req, Resp>(
    config: &TransportConfig,
    address: &str,
    message: &Req,
) -> TransportResult<Resp>
where
    Req: WireMessage,
    Resp: WireMessage,
{
    let reply = request(config, address, envelope::seal(message)).await?;
    let envelope = envelope::open(&reply)?;
    if envelope.type_name == proto::ErrorReply::NAME {
        let error = envelope.payload_as::<proto::ErrorReply>()?;
        return Err(TransportError::Protocol(error.into()));
    }
    Ok(envelope.payload_as::<Resp>()?)
}

/// Run the same exchange against every address in parallel
///
/// Never short-circuits: each address gets its own result, in input order,
/// so the caller can count successes against its threshold and log the
/// failures.
pub async fn fan_out<Req, Resp>(
    config: &TransportConfig,
    addresses: &[String],
    message: &Req,
) -> Vec<TransportResult<Resp>>
where
    Req: WireMessage,
    Resp: WireMessage,
{
    let exchanges = addresses
        .iter()
        .map(|address| exchange::<Req, Resp>(config, address, message));
    let results = futures::future::join_all(exchanges).await;
    for (address, result) in addresses.iter().zip(&results) {
        if let Err(e) = result {
            tracing::warn!(%address, error = %e, "roster exchange failed");
        }
    }
    results
}

/// Accept loop: serve binary request/reply exchanges on a bound listener
///
/// Each connection is handled on its own task; each binary frame is passed
/// to the handler and the returned frame sent back. Handler errors close
/// the connection but never the listener.
pub async fn serve<F, Fut>(listener: TcpListener, handler: F) -> TransportResult<()>
where
    F: Fn(Vec<u8>) -> Fut + Clone + Send + 'static,
    Fut: Future<Output = TransportResult<Vec<u8>>> + Send,
{
    loop {
        let (tcp, peer) = listener
            .accept()
            .await
            .map_err(|e| TransportError::ConnectionFailed(format!("accept: {e}")))?;
        let handler = handler.clone();
        tokio::spawn(async move {
            match accept_async(tcp).await {
                Ok(stream) => {
                    if let Err(e) = serve_connection(stream, handler).await {
                        tracing::debug!(%peer, error = %e, "connection ended with error");
                    }
                }
                Err(e) => tracing::debug!(%peer, error = %e, "websocket handshake failed"),
            }
        });
    }
}

async fn serve_connection<F, Fut>(
    mut stream: WebSocketStream<TcpStream>,
    handler: F,
) -> TransportResult<()>
where
    F: Fn(Vec<u8>) -> Fut,
    Fut: Future<Output = TransportResult<Vec<u8>>>,
{
    while let Some(message) = stream.next().await {
        let message =
            message.map_err(|e| TransportError::ConnectionFailed(format!("receive: {e}")))?;
        match message {
            Message::Binary(bytes) => {
                // protocol failures are answered, not dropped: the peer must
                // be able to tell a rejection from an unreachable node
                let reply = match handler(bytes).await {
                    Ok(reply) => reply,
                    Err(TransportError::Protocol(error)) => {
                        tracing::debug!(error = %error, "answering with an error frame");
                        envelope::seal(&proto::ErrorReply::from(&error))
                    }
                    Err(other) => return Err(other),
                };
                stream
                    .send(Message::Binary(reply))
                    .await
                    .map_err(|e| TransportError::ConnectionFailed(format!("send: {e}")))?;
            }
            Message::Close(_) => break,
            Message::Ping(_) | Message::Pong(_) => continue,
            other => {
                return Err(TransportError::ConnectionFailed(format!(
                    "unexpected {} frame",
                    frame_kind(&other)
                )))
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use daga_schema::proto;

    async fn echo_server() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = format!("ws://{}", listener.local_addr().unwrap());
        tokio::spawn(serve(listener, |frame| async move {
            let envelope = envelope::open(&frame)?;
            envelope.payload_as::<proto::Traffic>()?;
            Ok(envelope::seal(&proto::TrafficReply {
                rx: frame.len() as u64,
                tx: 0,
            }))
        }));
        address
    }

    #[tokio::test]
    async fn typed_exchange_roundtrip() {
        let address = echo_server().await;
        let config = TransportConfig::default();
        let reply: proto::TrafficReply =
            exchange(&config, &address, &proto::Traffic {}).await.unwrap();
        assert!(reply.rx > 0);
    }

    #[tokio::test]
    async fn wrong_reply_type_is_a_protocol_error() {
        let address = echo_server().await;
        let config = TransportConfig::default();
        let result: TransportResult<proto::Traffic> =
            exchange(&config, &address, &proto::Traffic {}).await;
        assert!(matches!(result, Err(TransportError::Protocol(_))));
    }

    #[tokio::test]
    async fn handler_rejection_travels_back_as_its_error_kind() {
        use daga_core::DagaError;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = format!("ws://{}", listener.local_addr().unwrap());
        tokio::spawn(serve(listener, |_frame| async {
            Err(TransportError::Protocol(DagaError::invalid_proof(
                "identity relation failed",
            )))
        }));

        let config = TransportConfig::default();
        let result: TransportResult<proto::TrafficReply> =
            exchange(&config, &address, &proto::Traffic {}).await;
        assert!(matches!(
            result,
            Err(TransportError::Protocol(DagaError::InvalidProof { .. }))
        ));
    }

    #[tokio::test]
    async fn fan_out_reports_per_address_results() {
        let up = echo_server().await;
        let down = "ws://127.0.0.1:1".to_string();
        let config = TransportConfig {
            connect_timeout: std::time::Duration::from_millis(500),
            request_timeout: std::time::Duration::from_millis(500),
        };
        let results: Vec<TransportResult<proto::TrafficReply>> =
            fan_out(&config, &[up, down], &proto::Traffic {}).await;
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
    }
}
