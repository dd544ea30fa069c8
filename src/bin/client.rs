//! Hello-world SOAP caller binary.
//!
//! Run with: `hello-soap-client --wsdl http://localhost:8000/?wsdl --name Jonathan`
//!
//! Prints the greeting on stdout; logs go to stderr.

use anyhow::{Context, Result};
use clap::Parser;
use hello_soap::{HelloConfig, SoapClient};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Fetch the service WSDL and call `say_hello`.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (YAML)
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// WSDL URL, overriding `client.wsdl_url`
    #[arg(short, long)]
    wsdl: Option<String>,

    /// Name to greet
    #[arg(short, long, default_value = "Jonathan")]
    name: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "warn")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = args.log_level.parse().unwrap_or(Level::WARN);
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    let mut config = HelloConfig::load(&args.config)
        .await
        .context("Failed to load config file")?;
    if let Some(wsdl) = args.wsdl {
        config.client.wsdl_url = wsdl;
    }

    info!(wsdl_url = %config.client.wsdl_url, "Loading service description");
    let client = SoapClient::with_settings(&config.client)
        .await
        .with_context(|| format!("Failed to load WSDL from {}", config.client.wsdl_url))?;

    let greeting = client
        .service()
        .say_hello(&args.name)
        .await
        .context("say_hello failed")?;

    println!("{}", greeting);
    Ok(())
}
