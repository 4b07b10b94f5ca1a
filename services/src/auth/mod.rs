//! Authentication and authorization.
//!
//! Provides:
//! - Session token (JWT) generation and validation
//! - Bearer-token extraction for incoming requests
//! - The ensure-uuid hook guarding identity-scoped writes

pub mod hooks;
pub mod jwt;

pub use hooks::ensure_uuid;
pub use jwt::{extract_token_from_header, Claims, JwtValidator};

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

use crate::error::ServiceError;
use crate::routes::AppState;

/// Verified session of an authenticated device.
///
/// Extracting this from a request fails with `NotAuthenticated` unless the
/// request carries a valid bearer token.
pub struct Session(pub Claims);

#[async_trait]
impl FromRequestParts<AppState> for Session {
    type Rejection = ServiceError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok());

        let token = extract_token_from_header(header).ok_or_else(|| {
            ServiceError::NotAuthenticated("Missing bearer token".to_string())
        })?;

        let claims = state.jwt.verify_token(token)?;
        Ok(Session(claims))
    }
}
