//! Device registration and session issuance.
//!
//! A device registers its secp256k1 public key and receives a UUID; it then
//! proves possession of the matching private key by signing that UUID and
//! exchanges the signature for a session token (JWT) carrying the UUID
//! claim. Unknown UUIDs and bad signatures fail identically so callers
//! cannot probe which UUIDs exist.

pub mod store;

pub use store::{RegistrationRecord, RegistrationStore, SqliteStore, StoreError};

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use k256::ecdsa::signature::Verifier;
use k256::ecdsa::{Signature, VerifyingKey};
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::jwt::JwtValidator;
use crate::error::ServiceError;

/// The only curve accepted for device identity keys.
pub const SUPPORTED_CURVE: &str = "secp256k1";

pub struct RegistrationService {
    store: Arc<dyn RegistrationStore>,
    jwt: JwtValidator,
}

impl RegistrationService {
    pub fn new(store: Arc<dyn RegistrationStore>, jwt: JwtValidator) -> Self {
        Self { store, jwt }
    }

    /// Register a device public key and mint a UUID for it.
    ///
    /// Registration is idempotent per public key: a key that is already
    /// registered gets its previously minted UUID back instead of a
    /// duplicate record. A device that lost its local UUID file can
    /// therefore re-register with the same key and recover its identity.
    pub fn create_registration(&self, pub_key: &str, curve: &str) -> Result<String, ServiceError> {
        if curve != SUPPORTED_CURVE {
            return Err(ServiceError::BadRequest(format!(
                "Unsupported curve: {}",
                curve
            )));
        }
        parse_public_key(pub_key)?;

        if let Some(existing) = self.store.find_by_pub_key(pub_key)? {
            info!(uuid = %existing.uuid, "Public key already registered, returning existing UUID");
            return Ok(existing.uuid);
        }

        let uuid = Uuid::new_v4().to_string();
        let record = RegistrationRecord {
            uuid: uuid.clone(),
            pub_key: pub_key.to_string(),
            curve: curve.to_string(),
            created_at: unix_now()?,
        };

        match self.store.insert(&record) {
            Ok(()) => {
                info!(%uuid, "Registered new device");
                Ok(uuid)
            }
            // Lost a race with a concurrent registration of the same key;
            // the store's uniqueness guarantee kept a single UUID, return it.
            Err(StoreError::Duplicate) => {
                let existing = self.store.find_by_pub_key(pub_key)?.ok_or_else(|| {
                    ServiceError::Internal("registration disappeared after conflict".to_string())
                })?;
                Ok(existing.uuid)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Verify a signature over the device UUID and mint a session token.
    pub fn create_session(&self, uuid: &str, signature: &str) -> Result<String, ServiceError> {
        let record = self.store.find_by_uuid(uuid)?.ok_or_else(|| {
            warn!(%uuid, "Authentication attempt for unknown UUID");
            authentication_failed()
        })?;

        let key = parse_public_key(&record.pub_key)
            .map_err(|_| ServiceError::Internal("stored public key is invalid".to_string()))?;

        let signature_bytes = hex::decode(signature).map_err(|_| authentication_failed())?;
        let signature =
            Signature::from_der(&signature_bytes).map_err(|_| authentication_failed())?;

        key.verify(uuid.as_bytes(), &signature).map_err(|_| {
            warn!(%uuid, "Signature verification failed");
            authentication_failed()
        })?;

        self.jwt.generate_token(uuid)
    }
}

/// Uniform failure for unknown UUIDs and bad signatures.
fn authentication_failed() -> ServiceError {
    ServiceError::NotAuthenticated("Invalid UUID or signature".to_string())
}

fn parse_public_key(pub_key: &str) -> Result<VerifyingKey, ServiceError> {
    let bytes = hex::decode(pub_key)
        .map_err(|e| ServiceError::BadRequest(format!("Public key is not valid hex: {}", e)))?;
    VerifyingKey::from_sec1_bytes(&bytes).map_err(|e| {
        ServiceError::BadRequest(format!("Public key is not a valid secp256k1 point: {}", e))
    })
}

fn unix_now() -> Result<u64, ServiceError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|e| ServiceError::Internal(format!("System time error: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use k256::ecdsa::signature::Signer;
    use k256::ecdsa::SigningKey;
    use k256::elliptic_curve::sec1::ToEncodedPoint;

    fn test_service() -> RegistrationService {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let jwt = JwtValidator::new(
            "test-secret-that-is-at-least-32-characters-long".into(),
            3600,
        )
        .unwrap();
        RegistrationService::new(store, jwt)
    }

    fn generate_device_key() -> (SigningKey, String) {
        let signing = SigningKey::random(&mut rand::rngs::OsRng);
        let pub_hex = hex::encode(signing.verifying_key().to_encoded_point(false).as_bytes());
        (signing, pub_hex)
    }

    fn sign_uuid(key: &SigningKey, uuid: &str) -> String {
        let signature: Signature = key.sign(uuid.as_bytes());
        hex::encode(signature.to_der().as_bytes())
    }

    #[test]
    fn test_register_and_authenticate() {
        let service = test_service();
        let (signing, pub_hex) = generate_device_key();

        let uuid = service
            .create_registration(&pub_hex, SUPPORTED_CURVE)
            .unwrap();
        assert!(!uuid.is_empty());

        let token = service
            .create_session(&uuid, &sign_uuid(&signing, &uuid))
            .unwrap();
        assert!(!token.is_empty());
    }

    #[test]
    fn test_registration_is_idempotent_per_key() {
        let service = test_service();
        let (_, pub_hex) = generate_device_key();

        let first = service
            .create_registration(&pub_hex, SUPPORTED_CURVE)
            .unwrap();
        let second = service
            .create_registration(&pub_hex, SUPPORTED_CURVE)
            .unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_unknown_curve_rejected() {
        let service = test_service();
        let (_, pub_hex) = generate_device_key();

        let err = service.create_registration(&pub_hex, "ed25519").unwrap_err();
        assert!(matches!(err, ServiceError::BadRequest(_)));
    }

    #[test]
    fn test_malformed_public_key_rejected() {
        let service = test_service();

        assert!(matches!(
            service
                .create_registration("not-hex", SUPPORTED_CURVE)
                .unwrap_err(),
            ServiceError::BadRequest(_)
        ));
        assert!(matches!(
            service
                .create_registration("deadbeef", SUPPORTED_CURVE)
                .unwrap_err(),
            ServiceError::BadRequest(_)
        ));
    }

    #[test]
    fn test_unknown_uuid_is_authentication_failure() {
        let service = test_service();
        let (signing, _) = generate_device_key();

        let err = service
            .create_session("no-such-uuid", &sign_uuid(&signing, "no-such-uuid"))
            .unwrap_err();
        // NotAuthenticated rather than NotFound: must not leak which UUIDs exist
        assert!(matches!(err, ServiceError::NotAuthenticated(_)));
    }

    #[test]
    fn test_signature_from_other_key_rejected() {
        let service = test_service();
        let (_, pub_hex) = generate_device_key();
        let (other_key, _) = generate_device_key();

        let uuid = service
            .create_registration(&pub_hex, SUPPORTED_CURVE)
            .unwrap();

        let err = service
            .create_session(&uuid, &sign_uuid(&other_key, &uuid))
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotAuthenticated(_)));
    }

    #[test]
    fn test_garbage_signature_rejected() {
        let service = test_service();
        let (_, pub_hex) = generate_device_key();
        let uuid = service
            .create_registration(&pub_hex, SUPPORTED_CURVE)
            .unwrap();

        assert!(service.create_session(&uuid, "zzzz").is_err());
        assert!(service.create_session(&uuid, "deadbeef").is_err());
    }
}
