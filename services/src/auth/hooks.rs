//! Request authorization hook for identity-scoped writes.
//!
//! Any write touching a device-scoped resource that arrives over HTTP must
//! declare the device UUID in its body, and that UUID must match the one in
//! the caller's session token. Internal call paths (code invoking the
//! service layer directly, e.g. the CLI) never pass through this hook and
//! are pre-authorized by their own trust boundary.

use tracing::error;

use crate::auth::jwt::Claims;
use crate::error::ServiceError;

/// Ensure that the UUID declared in a request body matches the UUID inside
/// the caller's session token.
pub fn ensure_uuid(claims: &Claims, body_uuid: Option<&str>) -> Result<(), ServiceError> {
    let uuid = match body_uuid {
        Some(uuid) if !uuid.is_empty() => uuid,
        _ => {
            error!("Received an identity-scoped request without a UUID");
            return Err(ServiceError::BadRequest("Invalid UUID".to_string()));
        }
    };

    if uuid != claims.uuid {
        error!(
            declared = %uuid,
            token = %claims.uuid,
            "Request UUID does not match the session token"
        );
        return Err(ServiceError::NotAuthenticated("Invalid UUID".to_string()));
    }

    Ok(())
}
