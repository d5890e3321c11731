//! Burrow — a reverse-tunnel relay.
//!
//! Remote clients behind NAT open a long-lived multiplexed session to
//! this relay; the relay assigns each session a public hostname and
//! proxies inbound HTTP requests for that hostname onto fresh streams of
//! the client's session.
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌────────────────────────────────────────────────┐
//!                 │                    RELAY                        │
//!   tunnel client │  ┌──────────┐   ┌─────────┐   ┌─────────────┐  │
//!   ──────────────┼─▶│ upgrader │──▶│ control │──▶│  registry   │  │
//!   (via external │  │(external)│   │negotiate│   │ Store+Record│  │
//!    transport)   │  └──────────┘   └─────────┘   └──────┬──────┘  │
//!                 │                                      │         │
//!                 │                  ┌────────────┐      │         │
//!                 │                  │ supervisor │◀─────┘         │
//!                 │                  │ ping/scan  │  per session   │
//!                 │                  └────────────┘                │
//!                 │                                                │
//!   HTTP request  │  ┌──────────┐   ┌──────────┐   ┌───────────┐  │
//!   ──────────────┼─▶│   http   │──▶│ registry │──▶│   proxy   │──┼─▶ stream on
//!   Host: x.root  │  │ dispatch │   │  lookup  │   │ 1 stream/ │  │   client session
//!                 │  └──────────┘   └──────────┘   │  request  │  │
//!                 │                                └───────────┘  │
//!                 └────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use burrow::config::loader::load_config;
use burrow::registry::Store;
use burrow::{RelayConfig, RelayServer};

#[derive(Parser, Debug)]
#[command(name = "burrow", about = "Reverse-tunnel relay")]
struct Args {
    /// Path to a TOML config file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listener bind address.
    #[arg(long)]
    bind: Option<String>,

    /// Override the relay root domain.
    #[arg(long)]
    root: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "burrow=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => RelayConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.listener.bind_address = bind;
    }
    if let Some(root) = args.root {
        config.relay.root = root;
    }

    tracing::info!(
        bind_address = %config.listener.bind_address,
        root = %config.relay.root,
        ping_interval_secs = config.relay.ping_interval_secs,
        "configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => burrow::observability::metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "failed to parse metrics address"
            ),
        }
    }

    let store = Arc::new(
        Store::new(config.relay.ping_interval()).with_verbose(config.relay.verbose),
    );

    // Transport upgraders are external collaborators: embedders call
    // burrow::subscribe(store, upgrader) for each wire protocol they
    // terminate. The binary itself serves the public HTTP side.
    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let server = RelayServer::new(&config, store);
    server.run(listener).await?;

    tracing::info!("shutdown complete");
    Ok(())
}
