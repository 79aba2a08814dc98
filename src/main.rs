use clap::Parser;
use rawdhcp::{network, Args, ClientConfig, DhcpClient, DhcpV6Client};
use std::error::Error as StdError;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Cancels `token` on Ctrl-C so the exchange in flight stops promptly.
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, cancelling");
            token.cancel();
        }
    });
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn StdError>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mac = match args.mac {
        Some(mac) => mac,
        None => network::interface_mac(&args.interface).await?,
    };
    tracing::info!("Using interface '{}' with MAC address {}", args.interface, mac);
    let config = ClientConfig::from_args(&args, mac);

    if args.v6 {
        let client = DhcpV6Client::new(&config)?;
        cancel_on_ctrl_c(client.cancellation_token());
        let reply = client.run().await?;
        println!("{reply}");
    } else {
        let client = DhcpClient::new(config).await?;
        cancel_on_ctrl_c(client.cancellation_token());
        let lease = client.run().await?;
        println!("Obtained lease: {lease:?}");
    }

    Ok(())
}
