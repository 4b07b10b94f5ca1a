//! HTTP routes for the backend service.
//!
//! Registration and authentication are unauthenticated by nature (they are
//! how a device obtains credentials); everything else requires a bearer
//! session token, and identity-scoped writes additionally pass the
//! ensure-uuid hook.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::auth::jwt::JwtValidator;
use crate::auth::{ensure_uuid, Session};
use crate::error::ServiceError;
use crate::registration::RegistrationService;
use crate::telemetry::{self, LogEntry};
use crate::update::UpdateLevel;

#[derive(Clone)]
pub struct AppState {
    pub registration: Arc<RegistrationService>,
    pub jwt: JwtValidator,
    pub update_level: Arc<Option<UpdateLevel>>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/registration", post(create_registration))
        .route("/authentication", post(create_authentication))
        .route("/update", get(get_update))
        .route("/error-telemetry", post(post_error_telemetry))
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

#[derive(Debug, Deserialize)]
pub struct RegistrationRequest {
    #[serde(rename = "pubKey")]
    pub pub_key: String,
    pub curve: String,
}

#[derive(Debug, Serialize)]
pub struct RegistrationResponse {
    pub uuid: String,
}

/// POST /registration
async fn create_registration(
    State(state): State<AppState>,
    Json(request): Json<RegistrationRequest>,
) -> Result<(StatusCode, Json<RegistrationResponse>), ServiceError> {
    let uuid = state
        .registration
        .create_registration(&request.pub_key, &request.curve)?;
    Ok((StatusCode::CREATED, Json(RegistrationResponse { uuid })))
}

#[derive(Debug, Deserialize)]
pub struct AuthenticationRequest {
    pub uuid: String,
    pub signature: String,
}

#[derive(Debug, Serialize)]
pub struct AuthenticationResponse {
    pub token: String,
}

/// POST /authentication
async fn create_authentication(
    State(state): State<AppState>,
    Json(request): Json<AuthenticationRequest>,
) -> Result<Json<AuthenticationResponse>, ServiceError> {
    let token = state
        .registration
        .create_session(&request.uuid, &request.signature)?;
    Ok(Json(AuthenticationResponse { token }))
}

/// GET /update
async fn get_update(
    Session(_claims): Session,
    State(state): State<AppState>,
) -> Result<Json<UpdateLevel>, ServiceError> {
    match state.update_level.as_ref() {
        Some(level) => Ok(Json(level.clone())),
        None => Err(ServiceError::NotFound(
            "No update level published".to_string(),
        )),
    }
}

#[derive(Debug, Deserialize)]
pub struct ErrorTelemetryRequest {
    // Optional so that a missing UUID maps to BadRequest instead of a
    // deserialization rejection.
    pub uuid: Option<String>,
    pub log: LogEntry,
}

/// POST /error-telemetry (identity-scoped write)
async fn post_error_telemetry(
    Session(claims): Session,
    Json(request): Json<ErrorTelemetryRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ServiceError> {
    ensure_uuid(&claims, request.uuid.as_deref())?;
    telemetry::record(&claims.uuid, &request.log);
    Ok((StatusCode::CREATED, Json(json!({ "status": "OK" }))))
}
