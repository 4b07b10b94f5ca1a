//! Session token handling for registered devices.
//!
//! Tokens are signed with HS256 and embed the device UUID as their only
//! identity claim. They are minted by the authentication endpoint after a
//! successful signature check and expire after a bounded interval; clients
//! re-derive them on every process start rather than persisting them.

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::ServiceError;

/// Payload stored in a session token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Device UUID, as minted at registration
    pub uuid: String,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

/// Session token generator and validator.
#[derive(Clone)]
pub struct JwtValidator {
    secret: String,
    expiry_seconds: u64,
}

impl JwtValidator {
    /// Create a new validator.
    ///
    /// Returns an error if the secret is empty or too short.
    pub fn new(secret: String, expiry_seconds: u64) -> Result<Self, ServiceError> {
        if secret.is_empty() {
            return Err(ServiceError::Config(
                "EVERGREEN_JWT_SECRET is required".to_string(),
            ));
        }

        if secret.len() < 32 {
            return Err(ServiceError::Config(
                "EVERGREEN_JWT_SECRET must be at least 32 characters".to_string(),
            ));
        }

        Ok(Self {
            secret,
            expiry_seconds,
        })
    }

    /// Mint a session token for an authenticated device.
    pub fn generate_token(&self, uuid: &str) -> Result<String, ServiceError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| ServiceError::Internal(format!("System time error: {}", e)))?
            .as_secs();

        let claims = Claims {
            uuid: uuid.to_string(),
            iat: now,
            exp: now + self.expiry_seconds,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| ServiceError::Internal(format!("Failed to generate token: {}", e)))
    }

    /// Verify and decode a session token.
    pub fn verify_token(&self, token: &str) -> Result<Claims, ServiceError> {
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )
        .map(|data| data.claims)
        .map_err(|err| {
            use jsonwebtoken::errors::ErrorKind;
            let message = match err.kind() {
                ErrorKind::ExpiredSignature => "Token expired",
                ErrorKind::InvalidToken => "Invalid token",
                ErrorKind::InvalidSignature => "Invalid signature",
                _ => "Token validation failed",
            };
            ServiceError::NotAuthenticated(message.to_string())
        })
    }
}

/// Extract token from an Authorization header.
/// Supports "Bearer <token>" format and raw tokens.
pub fn extract_token_from_header(auth_header: Option<&str>) -> Option<&str> {
    let header = auth_header?;

    if let Some(token) = header.strip_prefix("Bearer ") {
        let token = token.trim();
        if !token.is_empty() {
            return Some(token);
        }
    }

    if !header.contains(' ') {
        let token = header.trim();
        if !token.is_empty() {
            return Some(token);
        }
    }

    None
}
