//! Backend services for the Evergreen auto-update and telemetry system.
//!
//! Exposes the registration/authentication protocol (device public keys in,
//! UUIDs and session tokens out), the update-level endpoint clients poll for
//! new distributions, and an error-telemetry sink. Manifest and artifact-URL
//! tooling used by the `evergreen-cli` binary lives here as well.

pub mod auth;
pub mod config;
pub mod error;
pub mod manifest;
pub mod registration;
pub mod resolver;
pub mod routes;
pub mod telemetry;
pub mod update;
