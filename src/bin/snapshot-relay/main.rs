//! snapshot-relay CLI entry point.

mod cli;

use clap::Parser;
use cli::Cli;
use snapshot_relay::RelayNodeBuilder;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    // Initialize error handling
    color_eyre::install()?;

    // Parse CLI arguments and build configuration
    let cli = Cli::parse();
    let log_json = cli.log_json;
    let config = cli.into_config()?;

    // Initialize tracing. Stdout carries responses, so logs go to stderr.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    if log_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr))
            .with(filter)
            .init();
    }

    info!("snapshot-relay v{}", env!("CARGO_PKG_VERSION"));

    // Build and run the relay
    let mut relay = RelayNodeBuilder::new(config).build().await?;

    // Serve until EOF or shutdown
    relay.run().await?;

    info!("Goodbye!");
    Ok(())
}
