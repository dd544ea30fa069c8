//! Hello-world SOAP endpoint binary.
//!
//! Run with: `hello-soap-server --config config.yaml`
//!
//! Serves the WSDL at `http://<bind>/?wsdl` and accepts envelopes at `/`.

use anyhow::{Context, Result};
use clap::Parser;
use hello_soap::{HelloConfig, HelloWorldService, SoapServer};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// SOAP endpoint exposing `say_hello(name) -> "Hello, {name}!"`.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (YAML)
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Listen address, overriding `server.bind_address` (e.g. "127.0.0.1:8000")
    #[arg(short, long)]
    bind: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = args.log_level.parse().unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    info!("Starting hello-soap server v{}", env!("CARGO_PKG_VERSION"));
    info!("Config file: {}", args.config.display());

    let mut config = HelloConfig::load(&args.config)
        .await
        .context("Failed to load config file")?;
    if let Some(bind) = args.bind {
        config.server.bind_address = bind;
    }

    info!(
        bind_address = %config.server.bind_address,
        max_body_size = config.server.max_body_size,
        "Configuration loaded"
    );

    let server = SoapServer::bind(config.server, Arc::new(HelloWorldService::new()))
        .await
        .context("Failed to bind SOAP endpoint")?;
    let addr = server.local_addr()?;
    info!("SOAP server running on http://{}", addr);
    info!("WSDL available at http://{}/?wsdl", addr);

    server
        .run_until(shutdown_signal())
        .await
        .context("SOAP server error")?;

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, stopping server");
}
