//! wsgate endpoint host
//!
//! Serves configured web-service endpoints over HTTP. Every request becomes
//! an exchange that runs through the endpoint's handler chain around the
//! endpoint operation.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ http server ──▶ Exchange ──▶ Endpoint::serve
//!                                                     │
//!                                    HandlerChain inbound (1..N)
//!                                                     │
//!                                                 operation
//!                                                     │
//!                                    HandlerChain outbound (N..1)
//!                                                     │
//!     Client Response                                 ▼
//!     ◀────────────── streaming body ◀── ChannelTransport
//!
//!     Cross-cutting: config, observability (logs + metrics), lifecycle
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use wsgate::config::{load_config, WsgateConfig};
use wsgate::endpoint::{handlers::register_builtin_handlers, Echo};
use wsgate::lifecycle::{signals, Shutdown};
use wsgate::observability::{logging, metrics};
use wsgate::{ChainRegistry, HttpServer};

#[derive(Debug, Parser)]
#[command(name = "wsgate", version, about = "Web-service endpoint host")]
struct Cli {
    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => WsgateConfig::default(),
    };

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "wsgate starting");

    tracing::info!(
        bind_address = %config.listener.bind_address,
        endpoints = config.endpoints.len(),
        handler_chains = config.handler_chains.len(),
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let mut registry = ChainRegistry::new();
    register_builtin_handlers(&mut registry);
    registry.add_rules(&config.handler_chains)?;

    let bind_address = config.listener.bind_address.clone();
    let server = HttpServer::from_config(config, &registry, Arc::new(Echo))?;

    // Bind TCP listener
    let listener = TcpListener::bind(&bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    signals::spawn_signal_listener(shutdown.clone());

    server.run(listener, server_shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
