//! Loopback authentication daemon binary

use std::time::Duration;

use anyhow::Context as _;
use clap::Parser;
use tokio::net::TcpListener;

use daga_client::daemon;
use daga_transport::TransportConfig;

#[derive(Debug, Parser)]
#[command(name = "daga-daemon", about = "Local DAGA authentication daemon")]
struct Args {
    /// Loopback listen address
    #[arg(long, default_value = daemon::DEFAULT_LISTEN)]
    listen: String,

    /// Seconds to wait for each server connection
    #[arg(long, default_value_t = 5)]
    connect_timeout: u64,

    /// Seconds to wait for each server reply
    #[arg(long, default_value_t = 10)]
    request_timeout: u64,
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
    let transport = TransportConfig {
        connect_timeout: Duration::from_secs(args.connect_timeout),
        request_timeout: Duration::from_secs(args.request_timeout),
    };

    let listener = TcpListener::bind(&args.listen)
        .await
        .with_context(|| format!("binding {}", args.listen))?;
    tracing::info!(listen = %args.listen, "daga daemon up");
    daemon::run(listener, transport).await?;
    Ok(())
}
