//! Relay Server - Entry Point
//!
//! Parses arguments, starts the WebSocket transport and runs the poll loop
//! until Ctrl-C.

use std::env;
use std::process::ExitCode;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use relay_server::config::USAGE;
use relay_server::{RelayServer, ServerConfig, WebSocketTransport};

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=relay_server=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("relay_server=info")),
        )
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    if args.is_empty() {
        info!("No arguments passed, using default values...");
    }
    let config = match ServerConfig::from_args(args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            eprintln!("{}", USAGE);
            return Ok(ExitCode::from(2));
        }
    };

    let mut server = RelayServer::new(WebSocketTransport::new(), config.poll_interval);
    let addr = server.listen(&config.listen_config())?;
    info!("Relay server listening on ws://{}", addr);
    if config.connection_key.is_some() {
        info!("Clients must present the connection key");
    }

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await;

    info!("Server stopped");
    Ok(ExitCode::SUCCESS)
}
