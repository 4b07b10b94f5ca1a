//! evergreen-cli: manifest and artifact URL tooling.
//!
//! Operates on an `essentials.yaml` distribution manifest: stamping its
//! status during a release, and resolving the download URLs a given update
//! level implies.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use evergreen_services::manifest::Manifest;
use evergreen_services::resolver;

#[derive(Parser)]
#[command(name = "evergreen-cli")]
#[command(about = "Manifest and artifact URL tooling for Evergreen")]
struct Cli {
    /// Path to the essentials.yaml manifest
    #[arg(short, long, env = "EVERGREEN_MANIFEST_FILE")]
    file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Set the status field in the manifest
    SetStatus {
        /// New status value, e.g. "released"
        status: String,
    },
    /// Print resolved download URLs for everything in the manifest
    Urls,
    /// Print the evergreen distribution package URL for a flavor
    Release {
        /// Distribution flavor, e.g. "docker-cloud"
        flavor: String,
        /// Release version; defaults to the manifest's evergreen version
        version: Option<String>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut manifest = Manifest::load(cli.file.as_deref())?;

    match cli.command {
        Commands::SetStatus { status } => {
            manifest.set_status(status);
            manifest.save()?;
            println!("Updated {}", manifest.path().display());
        }
        Commands::Urls => {
            println!("core: {}", resolver::artifact_for_core(manifest.core()));
            for plugin in manifest.plugins() {
                println!(
                    "plugin {}: {}",
                    plugin.artifact_id,
                    resolver::artifact_for_plugin(plugin)
                );
            }
            for environment in manifest.environments() {
                for plugin in &environment.plugins {
                    println!(
                        "plugin {} ({}): {}",
                        plugin.artifact_id,
                        environment.name,
                        resolver::artifact_for_plugin(plugin)
                    );
                }
            }
        }
        Commands::Release { flavor, version } => {
            let version = version
                .or_else(|| manifest.evergreen().map(|e| e.version.clone()))
                .ok_or_else(|| {
                    anyhow::anyhow!("no version given and the manifest pins no evergreen version")
                })?;
            println!("{}", resolver::evergreen_release(&flavor, &version));
        }
    }

    Ok(())
}
