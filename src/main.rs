//! Authenticated API Gateway
//!
//! # Architecture Overview
//!
//! ```text
//!                          ┌──────────────────────────────────────────────────────┐
//!                          │                     API GATEWAY                      │
//!                          │                                                      │
//!     Client Request       │  ┌─────────┐   ┌─────────┐   ┌──────────┐            │
//!     ─────────────────────┼─▶│  http   │──▶│ routing │──▶│   auth   │            │
//!                          │  │ server  │   │  table  │   │ verifier │◀── JWKS ───┼── Identity
//!                          │  └─────────┘   └─────────┘   └────┬─────┘            │   Provider
//!                          │                                    │                  │
//!                          │                                    ▼                  │
//!     Client Response      │  ┌─────────┐   ┌─────────┐   ┌──────────┐            │
//!     ◀────────────────────┼──│ relay   │◀──│  proxy  │◀──│ filters  │            │
//!                          │  │verbatim │   │ client  │   │ X-User-* │            │
//!                          │  └─────────┘   └────┬────┘   └──────────┘            │
//!                          │                     │                                │
//!                          └─────────────────────┼────────────────────────────────┘
//!                                                ▼
//!                                         Upstream service
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use api_gateway::config::load_config;
use api_gateway::config::validation::route_warnings;
use api_gateway::lifecycle::{spawn_signal_handler, Shutdown};
use api_gateway::observability::{logging, metrics};
use api_gateway::GatewayServer;

#[derive(Parser)]
#[command(name = "api-gateway")]
#[command(version, about = "Authenticated reverse-proxy API gateway", long_about = None)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, env = "GATEWAY_CONFIG", default_value = "gateway.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = load_config(&args.config)?;
    logging::init(&config.observability)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %args.config.display(),
        routes = config.routes.len(),
        "api-gateway starting"
    );
    for shadowed in route_warnings(&config) {
        tracing::warn!(
            route = %shadowed.route,
            pattern = %shadowed.pattern,
            by_route = %shadowed.by_route,
            by_pattern = %shadowed.by_pattern,
            "Route pattern is unreachable, an earlier route matches every path it does"
        );
    }

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr)?;
    }

    let server = GatewayServer::new(config.clone())?;
    server.warm_up().await;

    let shutdown = Shutdown::new();
    spawn_signal_handler(shutdown.clone());

    match &config.listener.tls {
        Some(tls) => {
            let addr: SocketAddr = config.listener.bind_address.parse()?;
            server.run_tls(addr, tls, shutdown.subscribe()).await?;
        }
        None => {
            let listener = TcpListener::bind(&config.listener.bind_address).await?;
            server.run(listener, shutdown.subscribe()).await?;
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
