//! HTTP client for the Evergreen backend services.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ClientError;
use crate::telemetry::LogEntry;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
struct RegistrationRequest<'a> {
    #[serde(rename = "pubKey")]
    pub_key: &'a str,
    curve: &'a str,
}

#[derive(Debug, Deserialize)]
struct RegistrationResponse {
    uuid: String,
}

#[derive(Debug, Serialize)]
struct AuthenticationRequest<'a> {
    uuid: &'a str,
    signature: &'a str,
}

#[derive(Debug, Deserialize)]
struct AuthenticationResponse {
    token: String,
}

#[derive(Debug, Serialize)]
struct ErrorTelemetryRequest<'a> {
    uuid: &'a str,
    log: &'a LogEntry,
}

pub struct BackendClient {
    base_url: String,
    http: reqwest::Client,
}

impl BackendClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            http: reqwest::Client::new(),
        }
    }

    /// Submit a public key to the registration endpoint; returns the minted
    /// UUID.
    pub async fn create_registration(
        &self,
        pub_key: &str,
        curve: &str,
    ) -> Result<String, ClientError> {
        let response = self
            .http
            .post(format!("{}/registration", self.base_url))
            .json(&RegistrationRequest { pub_key, curve })
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| ClientError::Registration(format!("network error: {}", e)))?;

        if !response.status().is_success() {
            return Err(ClientError::Registration(error_context(response).await));
        }

        let body: RegistrationResponse = response
            .json()
            .await
            .map_err(|e| ClientError::Registration(format!("invalid response: {}", e)))?;
        Ok(body.uuid)
    }

    /// Exchange a signature over the UUID for a session token.
    pub async fn create_session(
        &self,
        uuid: &str,
        signature: &str,
    ) -> Result<String, ClientError> {
        let response = self
            .http
            .post(format!("{}/authentication", self.base_url))
            .json(&AuthenticationRequest { uuid, signature })
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| ClientError::Authentication(format!("network error: {}", e)))?;

        if !response.status().is_success() {
            return Err(ClientError::Authentication(error_context(response).await));
        }

        let body: AuthenticationResponse = response
            .json()
            .await
            .map_err(|e| ClientError::Authentication(format!("invalid response: {}", e)))?;
        Ok(body.token)
    }

    /// Forward one error-log entry, authenticated as `uuid`.
    pub async fn send_error_telemetry(
        &self,
        token: &str,
        uuid: &str,
        log: &LogEntry,
    ) -> Result<(), ClientError> {
        let response = self
            .http
            .post(format!("{}/error-telemetry", self.base_url))
            .bearer_auth(token)
            .json(&ErrorTelemetryRequest { uuid, log })
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| ClientError::Network(format!("network error: {}", e)))?;

        if !response.status().is_success() {
            return Err(ClientError::Network(error_context(response).await));
        }
        Ok(())
    }

    /// Fetch the current update level.
    pub async fn fetch_update_level(
        &self,
        token: &str,
    ) -> Result<serde_json::Value, ClientError> {
        let response = self
            .http
            .get(format!("{}/update", self.base_url))
            .bearer_auth(token)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| ClientError::Network(format!("network error: {}", e)))?;

        if !response.status().is_success() {
            return Err(ClientError::Network(error_context(response).await));
        }

        response
            .json()
            .await
            .map_err(|e| ClientError::Network(format!("invalid response: {}", e)))
    }
}

/// Status line plus response body, for diagnostics. Never contains key
/// material: only public requests pass through here.
async fn error_context(response: reqwest::Response) -> String {
    let status = response.status();
    match response.text().await {
        Ok(body) if !body.is_empty() => format!("HTTP {}: {}", status, body),
        _ => format!("HTTP {}", status),
    }
}
