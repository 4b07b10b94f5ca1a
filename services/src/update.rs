//! Update level served to registered clients.
//!
//! The manifest on disk pins versions; clients need resolved download URLs.
//! This module flattens an `essentials.yaml` into the JSON document the
//! `/update` endpoint serves.

use serde::{Deserialize, Serialize};

use crate::manifest::Manifest;
use crate::resolver;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateLevel {
    pub schema_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    pub core: CoreDownload,
    pub plugins: Vec<PluginDownload>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub environments: Vec<EnvironmentDownloads>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreDownload {
    pub version: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginDownload {
    pub artifact_id: String,
    pub version: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentDownloads {
    pub name: String,
    pub plugins: Vec<PluginDownload>,
}

impl UpdateLevel {
    pub fn from_manifest(manifest: &Manifest) -> Self {
        let plugin_download = |p: &crate::manifest::PluginArtifact| PluginDownload {
            artifact_id: p.artifact_id.clone(),
            version: p.version.clone(),
            url: resolver::artifact_for_plugin(p),
        };

        Self {
            schema_version: 1,
            status: manifest.status().map(str::to_string),
            core: CoreDownload {
                version: manifest.core().version.clone(),
                url: resolver::artifact_for_core(manifest.core()),
            },
            plugins: manifest.plugins().iter().map(plugin_download).collect(),
            environments: manifest
                .environments()
                .iter()
                .map(|env| EnvironmentDownloads {
                    name: env.name.clone(),
                    plugins: env.plugins.iter().map(plugin_download).collect(),
                })
                .collect(),
        }
    }
}
