//! evergreen-services: backend for the Evergreen auto-update system.
//!
//! Serves device registration/authentication, the update level, and an
//! error-telemetry sink over HTTP. See the `evergreen-cli` binary for
//! manifest tooling.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};

use evergreen_services::auth::JwtValidator;
use evergreen_services::config::Config;
use evergreen_services::manifest::Manifest;
use evergreen_services::registration::{RegistrationService, SqliteStore};
use evergreen_services::routes::{create_router, AppState};
use evergreen_services::update::UpdateLevel;

#[derive(Parser)]
#[command(name = "evergreen-services")]
#[command(about = "Backend services for the Evergreen auto-update system")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "evergreen.toml")]
    config: String,

    /// Session token signing secret
    #[arg(long, env = "EVERGREEN_JWT_SECRET", hide_env_values = true)]
    jwt_secret: Option<String>,

    /// Registration database path (overrides config file)
    #[arg(long, env = "EVERGREEN_DB_PATH")]
    db_path: Option<PathBuf>,

    /// Distribution manifest to serve at /update (overrides config file)
    #[arg(long, env = "EVERGREEN_MANIFEST_FILE")]
    manifest_file: Option<PathBuf>,

    /// HTTP port (overrides config file)
    #[arg(long, env = "EVERGREEN_HTTP_PORT")]
    http_port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("evergreen_services=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    info!("Starting evergreen-services");
    info!("Config file: {}", cli.config);

    let mut config = if std::path::Path::new(&cli.config).exists() {
        let content = std::fs::read_to_string(&cli.config)?;
        toml::from_str(&content)?
    } else {
        info!("Config file not found, using defaults");
        Config::default()
    };

    // Apply CLI overrides
    if let Some(secret) = cli.jwt_secret {
        config.auth.secret = Some(secret);
    }
    if let Some(db_path) = cli.db_path {
        config.storage.db_path = db_path;
    }
    if let Some(manifest_file) = cli.manifest_file {
        config.update.manifest_file = manifest_file;
    }
    if let Some(http_port) = cli.http_port {
        config.api.http_port = http_port;
    }

    let secret = config
        .auth
        .secret
        .clone()
        .ok_or_else(|| anyhow::anyhow!("EVERGREEN_JWT_SECRET must be set"))?;
    let jwt = JwtValidator::new(secret, config.auth.expiry_secs)?;

    info!("Registration database: {}", config.storage.db_path.display());
    let store = Arc::new(SqliteStore::open(&config.storage.db_path)?);
    let registration = Arc::new(RegistrationService::new(store, jwt.clone()));

    let update_level = match Manifest::load(Some(config.update.manifest_file.as_path())) {
        Ok(manifest) => {
            info!(
                "Serving update level from {}",
                config.update.manifest_file.display()
            );
            Some(UpdateLevel::from_manifest(&manifest))
        }
        Err(e) => {
            warn!(error = %e, "No distribution manifest loaded, /update will return 404");
            None
        }
    };

    let state = AppState {
        registration,
        jwt,
        update_level: Arc::new(update_level),
    };
    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.api.http_port));
    info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
