//! `rest-server` binary.
//!
//! Serves the built-in probe pipeline (`/ping`, `/liveness`, `/readiness`)
//! with request logging. On SIGINT/SIGTERM the readiness gate flips to
//! not-ready and the listeners are drained.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use rest_server::config::{load_config, ServiceConfig};
use rest_server::http::{access_log, default_pipeline};
use rest_server::lifecycle::signals;
use rest_server::observability::logging;
use rest_server::Server;

#[derive(Parser)]
#[command(name = "rest-server")]
#[command(about = "HTTP/HTTPS REST server with graceful shutdown", long_about = None)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind address, overrides the config file.
    #[arg(short, long)]
    address: Option<String>,

    /// Plaintext port, overrides the config file.
    #[arg(short, long)]
    port: Option<u16>,

    /// Log level, overrides the config file.
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    fn service_config(&self) -> Result<ServiceConfig, Box<dyn std::error::Error>> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => ServiceConfig::default(),
        };
        if let Some(address) = &self.address {
            config.server.address = address.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(level) = &self.log_level {
            config.observability.log_level = level.clone();
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = cli.service_config()?;
    logging::init(&config.observability);

    tracing::info!(
        address = %config.server.normalized().http_address(),
        tls = config.server.tls.is_some(),
        "rest-server v{} starting",
        env!("CARGO_PKG_VERSION")
    );

    let server = Arc::new(Server::new(config.server));
    let app = default_pipeline(server.readiness().clone()).layer(axum::middleware::from_fn(access_log));

    let stopper = Arc::clone(&server);
    tokio::spawn(async move {
        match signals::termination().await {
            Ok(signal) => tracing::info!(signal, "Termination signal received"),
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for signals");
                return;
            }
        }
        stopper.readiness().set_ready(false);
        if let Err(e) = stopper.shutdown().await {
            tracing::error!(error = %e, "Shutdown did not complete cleanly");
        }
    });

    server.run(Some(app)).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
