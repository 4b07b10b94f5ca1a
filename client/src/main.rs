//! evergreen-client: Jenkins Evergreen update agent
//!
//! Runs beside a Jenkins instance and keeps it current:
//! - Generates and persists a device keypair on first run
//! - Registers with the backend for a UUID, then authenticates by
//!   signing that UUID
//! - Forwards Jenkins error-log entries to the backend
//! - Periodically checks the backend for a new update level

mod api;
mod error;
mod keys;
mod registration;
mod telemetry;

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, warn};

use api::BackendClient;
use keys::KeyStore;
use registration::Registration;
use telemetry::ErrorTelemetry;

#[derive(Parser)]
#[command(name = "evergreen-client")]
#[command(about = "Jenkins Evergreen update agent")]
struct Cli {
    /// Backend services endpoint
    #[arg(
        long,
        env = "EVERGREEN_ENDPOINT",
        default_value = "http://127.0.0.1:3030"
    )]
    endpoint: String,

    /// Evergreen home directory (keys, Jenkins state)
    #[arg(long, env = "EVERGREEN_HOME")]
    home: Option<PathBuf>,

    /// Error log file to watch (overrides the default under the home)
    #[arg(long, env = "ESSENTIALS_LOG_FILE")]
    log_file: Option<PathBuf>,

    /// Seconds between update-level checks
    #[arg(long, default_value_t = 3600)]
    update_interval_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("evergreen_client=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let home = cli.home.unwrap_or_else(KeyStore::default_home);

    info!("Starting evergreen-client");
    info!("Endpoint: {}", cli.endpoint);
    info!("Home: {}", home.display());

    let mut registration = Registration::new(KeyStore::new(&home), BackendClient::new(&cli.endpoint));
    registration.register().await?;

    let uuid = registration
        .uuid()
        .ok_or_else(|| anyhow::anyhow!("registered but no UUID loaded"))?
        .to_string();
    let token = registration
        .token()
        .ok_or_else(|| anyhow::anyhow!("authenticated but no session token"))?
        .to_string();
    info!(%uuid, "Device is registered and authenticated");

    let log_file = cli
        .log_file
        .unwrap_or_else(|| ErrorTelemetry::file_to_watch(&home));
    let forwarder = ErrorTelemetry::new(BackendClient::new(&cli.endpoint), log_file, &uuid, &token);
    tokio::spawn(async move { forwarder.run().await });

    // Update-level polling stays in the foreground; it is the agent's
    // reason to exist.
    let api = BackendClient::new(&cli.endpoint);
    let mut interval = tokio::time::interval(Duration::from_secs(cli.update_interval_secs));
    loop {
        interval.tick().await;

        match api.fetch_update_level(&token).await {
            Ok(level) => {
                info!("Current update level: {}", level);
            }
            Err(error::ClientError::Network(reason)) => {
                warn!(%reason, "Update-level check failed, will retry");
            }
            Err(e) => {
                error!(error = %e, "Update-level check failed");
            }
        }
    }
}
