//! DAGA server node binary

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use clap::Parser;
use tokio::net::TcpListener;

use daga_server::{Node, ServerConfig};

#[derive(Debug, Parser)]
#[command(name = "daga-server", about = "DAGA authentication server node")]
struct Args {
    /// Path to the node's TOML config file
    #[arg(long, default_value = "daga-server.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    let config = ServerConfig::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    let keypair = config.keypair()?;
    let services = config.authorized_services()?;

    let node = Arc::new(Node::new(keypair, config.threshold, services));
    let listener = TcpListener::bind(&config.listen)
        .await
        .with_context(|| format!("binding {}", config.listen))?;
    tracing::info!(
        listen = %config.listen,
        public_key = %hex::encode(daga_core::suite::point_bytes(&node.public_key())),
        "daga server node up"
    );

    daga_transport::serve(listener, move |frame| {
        let node = Arc::clone(&node);
        async move {
            node.handle(frame)
                .await
                .map_err(daga_transport::TransportError::Protocol)
        }
    })
    .await?;
    Ok(())
}
