//! Loopback authentication daemon
//!
//! Local applications talk to the daemon over a websocket on the loopback
//! interface: they send the context frame and the subscriber credential,
//! and receive the finished authentication request to hand to their
//! service. The daemon runs the commit and challenge rounds against the
//! roster; the credential never has to live inside the application.

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{accept_async, tungstenite::Message, WebSocketStream};

use daga_core::client::ClientCredentials;
use daga_core::context::Context;
use daga_core::suite;
use daga_core::DagaError;
use daga_schema::{envelope, proto};
use daga_transport::{TransportConfig, TransportError};

use crate::authenticate::Authenticator;
use crate::{ClientError, ClientResult};

/// Where local applications expect the daemon
pub const DEFAULT_LISTEN: &str = "127.0.0.1:9999";

/// Accept loop: one authentication request per connection
pub async fn run(listener: TcpListener, transport: TransportConfig) -> ClientResult<()> {
    loop {
        let (tcp, peer) = listener
            .accept()
            .await
            .map_err(|e| TransportError::ConnectionFailed(format!("accept: {e}")))?;
        let transport = transport.clone();
        tokio::spawn(async move {
            if let Err(e) = serve_request(tcp, transport).await {
                tracing::warn!(%peer, error = %e, "daemon request failed");
            }
        });
    }
}

/// Two frames in (context, credential), one frame out (the request)
async fn serve_request(tcp: TcpStream, transport: TransportConfig) -> ClientResult<()> {
    let mut stream = accept_async(tcp)
        .await
        .map_err(|e| TransportError::ConnectionFailed(format!("handshake: {e}")))?;

    let context: Context = envelope::open(&next_binary(&mut stream).await?)?
        .payload_as::<proto::Context>()?
        .try_into()?;
    context.validate()?;

    let wire = envelope::open(&next_binary(&mut stream).await?)?
        .payload_as::<proto::ClientCredentials>()?;
    let index = usize::try_from(wire.index)
        .map_err(|_| DagaError::schema("negative subscriber index"))?;
    let secret = suite::scalar_from_bytes(&wire.private_key)
        .map_err(|_| DagaError::schema("invalid subscriber key"))?;
    let credentials = ClientCredentials::new(index, secret);

    tracing::info!(context = %context.context_id, "building authentication request");
    let auth = Authenticator::new(transport)
        .build_request(&context, &credentials)
        .await?;

    stream
        .send(Message::Binary(envelope::seal(&proto::Auth::from(&auth))))
        .await
        .map_err(|e| TransportError::ConnectionFailed(format!("send: {e}")))?;
    let _ = stream.close(None).await;
    Ok(())
}

async fn next_binary(stream: &mut WebSocketStream<TcpStream>) -> ClientResult<Vec<u8>> {
    loop {
        let message = stream
            .next()
            .await
            .ok_or_else(|| {
                ClientError::Transport(TransportError::ConnectionFailed(
                    "connection closed mid-request".to_string(),
                ))
            })?
            .map_err(|e| TransportError::ConnectionFailed(format!("receive: {e}")))?;
        match message {
            Message::Binary(bytes) => return Ok(bytes),
            Message::Ping(_) | Message::Pong(_) => continue,
            _ => {
                return Err(TransportError::ConnectionFailed(
                    "unexpected non-binary frame".to_string(),
                )
                .into())
            }
        }
    }
}
