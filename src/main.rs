//! Faultline relay.
//!
//! An HTTP relay that records every upstream call as paired request/response
//! log lines and turns every failure into a structured JSON fault response.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request           ┌──────────────────────────────────────────────┐
//!     ─────────────────────────┼─▶ http::server ──▶ traffic::recorder ───────┼──▶ Upstream
//!                              │        │                  │                   │
//!                              │        ▼                  ▼                   │
//!     Fault Response           │  fault::middleware   http-req / http-res     │
//!     ◀────────────────────────┼── fault::response      (tracing lines)       │
//!                              │        │                                     │
//!                              │        ▼                                     │
//!                              │  fault::chain ──▶ fault::resolver           │
//!                              └──────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use faultline::config::{load_config, validate_config, ConfigError, ServiceConfig};
use faultline::http::RelayServer;
use faultline::lifecycle::{shutdown_on_ctrl_c, Shutdown};
use faultline::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "faultline")]
#[command(about = "Recording HTTP relay with structured fault responses", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override `listener.bind_address`
    #[arg(short, long)]
    bind: Option<String>,

    /// Override `upstream.base_url`
    #[arg(short, long)]
    upstream: Option<String>,
}

impl Cli {
    fn load(&self) -> Result<ServiceConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => ServiceConfig::default(),
        };
        if let Some(bind) = &self.bind {
            config.listener.bind_address = bind.clone();
        }
        if let Some(upstream) = &self.upstream {
            config.upstream.base_url = Some(upstream.clone());
        }
        validate_config(&config).map_err(ConfigError::Validation)?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = cli.load()?;

    logging::init_logging(&config.observability);
    tracing::info!("faultline v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        upstream = config.upstream.base_url.as_deref().unwrap_or("-"),
        traffic = config.traffic.enabled,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config.observability.metrics_address.parse()?;
        if let Err(e) = metrics::init_metrics(addr) {
            tracing::error!(error = %e, "Failed to start metrics endpoint");
        }
    }

    let server = RelayServer::new(&config)?;

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    shutdown_on_ctrl_c(shutdown.clone());
    server.run(listener, shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
