//! Service configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub update: UpdateConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// HTTP API port
    #[serde(default = "default_http_port")]
    pub http_port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Session token signing secret. Normally supplied via
    /// EVERGREEN_JWT_SECRET rather than the config file.
    #[serde(default)]
    pub secret: Option<String>,

    /// Session token lifetime in seconds
    #[serde(default = "default_expiry_secs")]
    pub expiry_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path to the registration database
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateConfig {
    /// Path to the distribution manifest served at /update
    #[serde(default = "default_manifest_file")]
    pub manifest_file: PathBuf,
}

fn default_http_port() -> u16 {
    3030
}
fn default_expiry_secs() -> u64 {
    3600
}
fn default_db_path() -> PathBuf {
    PathBuf::from("evergreen.db")
}
fn default_manifest_file() -> PathBuf {
    PathBuf::from("essentials.yaml")
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            http_port: default_http_port(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret: None,
            expiry_secs: default_expiry_secs(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            manifest_file: default_manifest_file(),
        }
    }
}
