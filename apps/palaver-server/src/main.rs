//! # Palaver server
//!
//! One process per group member. Reads the shared server list, binds its
//! own UDP address, and runs the receive loop under the ordering mode
//! chosen at startup. Stops cleanly on Ctrl-C.
//!
//! ```text
//! palaver-server --order total servers.txt 2
//! ```

use clap::Parser;
use rmc_order::OrderingMode;
use rmc_server::{Server, ServerConfig, ServerError, UdpTransport};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "palaver-server")]
#[command(about = "Replicated multicast chat server")]
#[command(version)]
struct Cli {
    /// Delivery ordering: unordered, fifo, causal or total
    #[arg(short, long, default_value = "unordered")]
    order: OrderingMode,

    /// Log frame-level detail to stderr
    #[arg(short, long)]
    verbose: bool,

    /// Path to the shared server list, one address per line
    config: PathBuf,

    /// This server's 1-based position in the list
    index: usize,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            error!(%error, "server exited");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), ServerError> {
    let config = ServerConfig::load(&cli.config, cli.index)?;
    let transport = Arc::new(UdpTransport::bind(config.bind).await?);
    let mut server = Server::new(&config, cli.order, transport)?;

    let (shutdown, receiver) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, shutting down");
            let _ = shutdown.send(true);
        }
    });

    server.run(receiver).await
}
