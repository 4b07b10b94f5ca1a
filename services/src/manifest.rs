//! Wrapper for the distribution manifest (`essentials.yaml`).
//!
//! The manifest pins the Jenkins core, plugin set, and evergreen package
//! versions that make up one update level, per environment flavor.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub const DEFAULT_FILENAME: &str = "essentials.yaml";

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid manifest: {0}")]
    Parse(#[from] serde_yaml::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    pub spec: ManifestSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestSpec {
    pub core: CoreArtifact,
    #[serde(default)]
    pub plugins: Vec<PluginArtifact>,
    #[serde(default)]
    pub environments: Vec<Environment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evergreen: Option<EvergreenArtifact>,
}

/// The Jenkins core WAR pinned by this manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreArtifact {
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginArtifact {
    #[serde(rename = "groupId")]
    pub group_id: String,
    #[serde(rename = "artifactId")]
    pub artifact_id: String,
    pub version: String,
}

/// A distribution flavor with its extra plugins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Environment {
    pub name: String,
    #[serde(default)]
    pub plugins: Vec<PluginArtifact>,
}

/// The evergreen support package version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvergreenArtifact {
    pub version: String,
}

/// An `essentials.yaml` loaded from disk, remembering where it came from.
#[derive(Debug)]
pub struct Manifest {
    data: ManifestData,
    path: PathBuf,
}

impl Manifest {
    /// Read an `essentials.yaml` and build a `Manifest`.
    pub fn load(path: Option<&Path>) -> Result<Self, ManifestError> {
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_FILENAME));
        let content = fs::read_to_string(&path).map_err(|source| ManifestError::Read {
            path: path.clone(),
            source,
        })?;
        let data: ManifestData = serde_yaml::from_str(&content)?;
        Ok(Self { data, path })
    }

    /// Write the manifest back to the file it was loaded from.
    pub fn save(&self) -> Result<(), ManifestError> {
        let content = serde_yaml::to_string(&self.data)?;
        fs::write(&self.path, content).map_err(|source| ManifestError::Write {
            path: self.path.clone(),
            source,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn data(&self) -> &ManifestData {
        &self.data
    }

    pub fn core(&self) -> &CoreArtifact {
        &self.data.spec.core
    }

    pub fn plugins(&self) -> &[PluginArtifact] {
        &self.data.spec.plugins
    }

    pub fn environments(&self) -> &[Environment] {
        &self.data.spec.environments
    }

    pub fn evergreen(&self) -> Option<&EvergreenArtifact> {
        self.data.spec.evergreen.as_ref()
    }

    pub fn status(&self) -> Option<&str> {
        self.data.status.as_deref()
    }

    pub fn set_status(&mut self, status: impl Into<String>) {
        self.data.status = Some(status.into());
    }
}
