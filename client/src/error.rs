//! Client error taxonomy.
//!
//! Mirrors the protocol stages: key generation and persistence failures are
//! fatal for the current attempt, registration and authentication failures
//! are retryable on a later run, and a diverged identity needs an
//! operator's attention before anything is retried.

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Key generation failed: {0}")]
    KeyGeneration(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Registration failed: {0}")]
    Registration(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Non-protocol backend traffic (telemetry forwarding, update checks).
    #[error("Network error: {0}")]
    Network(String),

    /// The backend minted a UUID that could not be recorded locally. The
    /// server now knows this device under an identity the client cannot
    /// recall; surfaced loudly instead of being retried blindly.
    #[error("Identity diverged: server minted UUID {uuid} but it could not be persisted locally: {reason}")]
    IdentityDiverged { uuid: String, reason: String },
}
