//! Client-side registration and authentication protocol.
//!
//! Drives the identity bootstrap as a strictly sequential pipeline:
//!
//! ```text
//! Unregistered -> KeysGenerated -> KeysPersisted -> Registered -> Authenticated
//! ```
//!
//! Keys are made durable before the backend ever sees the public key, so a
//! failed run is always retryable from scratch. Once the backend has minted
//! a UUID, the local record must be written or the identity has diverged
//! (see [`ClientError::IdentityDiverged`]).

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::error::ClientError;
use crate::keys::{KeyStore, Keypair, CURVE};

/// Protocol stage this device has reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationState {
    Unregistered,
    KeysGenerated,
    KeysPersisted,
    Registered,
    Authenticated,
}

/// The two backend operations the protocol depends on.
#[async_trait]
pub trait RegistrationApi: Send + Sync {
    async fn create_registration(&self, pub_key: &str, curve: &str)
        -> Result<String, ClientError>;
    async fn create_session(&self, uuid: &str, signature: &str) -> Result<String, ClientError>;
}

#[async_trait]
impl RegistrationApi for crate::api::BackendClient {
    async fn create_registration(
        &self,
        pub_key: &str,
        curve: &str,
    ) -> Result<String, ClientError> {
        // Inherent method; qualified call avoids recursing into this impl.
        crate::api::BackendClient::create_registration(self, pub_key, curve).await
    }

    async fn create_session(&self, uuid: &str, signature: &str) -> Result<String, ClientError> {
        crate::api::BackendClient::create_session(self, uuid, signature).await
    }
}

/// Registration/authentication state machine for one device.
pub struct Registration<A: RegistrationApi> {
    keys: KeyStore,
    api: A,
    state: RegistrationState,
    token: Option<String>,
}

impl<A: RegistrationApi> Registration<A> {
    pub fn new(keys: KeyStore, api: A) -> Self {
        Self {
            keys,
            api,
            state: RegistrationState::Unregistered,
            token: None,
        }
    }

    pub fn state(&self) -> RegistrationState {
        self.state
    }

    /// Session token obtained by the last successful `login`.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn uuid(&self) -> Option<&str> {
        self.keys.uuid()
    }

    /// Run the registration pipeline, ending authenticated.
    ///
    /// A device with keys and a UUID on disk skips the registration
    /// endpoint entirely and goes straight to login.
    pub async fn register(&mut self) -> Result<(), ClientError> {
        info!("Checking registration status");

        if self.keys.has_keys()? {
            // Existing keys are never regenerated.
            self.keys.load_keys()?;

            if self.keys.has_identity()? {
                info!("We have keys and a UUID already");
                self.keys.load_identity()?;
                self.state = RegistrationState::Registered;
                return self.login().await;
            }

            // A previous run persisted keys but never obtained (or never
            // recorded) a UUID. Registration is idempotent per key on the
            // backend, so re-registering recovers the same identity.
            warn!("Keys present without a UUID record, re-registering with the existing key");
            self.state = RegistrationState::KeysPersisted;
        } else {
            self.keys.generate_keypair()?;
            self.state = RegistrationState::KeysGenerated;

            // Keys must be durable before the backend sees the public key;
            // an unsaved key that is later lost orphans the server record.
            self.keys.persist_keys()?;
            self.state = RegistrationState::KeysPersisted;
        }

        info!("Creating registration");
        let pub_key = self.keypair()?.public_key_hex();
        let uuid = self.api.create_registration(&pub_key, CURVE).await?;

        if let Err(e) = self.keys.persist_identity(&uuid) {
            error!(%uuid, error = %e, "UUID minted by the backend could not be persisted locally");
            return Err(ClientError::IdentityDiverged {
                uuid,
                reason: e.to_string(),
            });
        }
        self.state = RegistrationState::Registered;

        self.login().await
    }

    /// Sign our UUID and exchange the signature for a session token.
    pub async fn login(&mut self) -> Result<(), ClientError> {
        let uuid = self
            .keys
            .uuid()
            .ok_or_else(|| ClientError::Authentication("no UUID loaded".to_string()))?
            .to_string();

        let signature = self.keypair()?.sign_hex(&uuid);
        let token = self.api.create_session(&uuid, &signature).await?;

        info!(%uuid, "Logged in and received a session token");
        self.token = Some(token);
        self.state = RegistrationState::Authenticated;
        Ok(())
    }

    fn keypair(&self) -> Result<&Keypair, ClientError> {
        self.keys
            .keypair()
            .ok_or_else(|| ClientError::KeyGeneration("no keypair loaded".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use k256::ecdsa::signature::Verifier;
    use k256::ecdsa::{Signature, VerifyingKey};

    /// In-memory backend that counts endpoint calls and performs real
    /// signature verification against the registered key.
    #[derive(Clone)]
    struct FakeBackend {
        uuid: String,
        reg_calls: Arc<AtomicUsize>,
        auth_calls: Arc<AtomicUsize>,
        registered_key: Arc<Mutex<Option<String>>>,
    }

    impl FakeBackend {
        fn new(uuid: &str) -> Self {
            Self {
                uuid: uuid.to_string(),
                reg_calls: Arc::new(AtomicUsize::new(0)),
                auth_calls: Arc::new(AtomicUsize::new(0)),
                registered_key: Arc::new(Mutex::new(None)),
            }
        }

        fn reg_calls(&self) -> usize {
            self.reg_calls.load(Ordering::SeqCst)
        }

        fn auth_calls(&self) -> usize {
            self.auth_calls.load(Ordering::SeqCst)
        }

        fn seed_key(&self, pub_key_hex: &str) {
            *self.registered_key.lock().unwrap() = Some(pub_key_hex.to_string());
        }
    }

    #[async_trait]
    impl RegistrationApi for FakeBackend {
        async fn create_registration(
            &self,
            pub_key: &str,
            _curve: &str,
        ) -> Result<String, ClientError> {
            self.reg_calls.fetch_add(1, Ordering::SeqCst);
            *self.registered_key.lock().unwrap() = Some(pub_key.to_string());
            Ok(self.uuid.clone())
        }

        async fn create_session(
            &self,
            uuid: &str,
            signature: &str,
        ) -> Result<String, ClientError> {
            self.auth_calls.fetch_add(1, Ordering::SeqCst);

            let registered = self.registered_key.lock().unwrap().clone().ok_or_else(
                || ClientError::Authentication("unknown uuid".to_string()),
            )?;
            let key = VerifyingKey::from_sec1_bytes(&hex::decode(registered).unwrap()).unwrap();
            let signature = Signature::from_der(&hex::decode(signature).unwrap())
                .map_err(|e| ClientError::Authentication(e.to_string()))?;
            key.verify(uuid.as_bytes(), &signature)
                .map_err(|_| ClientError::Authentication("bad signature".to_string()))?;

            Ok(format!("token-for-{}", uuid))
        }
    }

    #[tokio::test]
    async fn test_fresh_device_full_flow() {
        let home = tempfile::tempdir().unwrap();
        let backend = FakeBackend::new("abc-123");

        let mut registration = Registration::new(KeyStore::new(home.path()), backend.clone());
        registration.register().await.unwrap();

        assert_eq!(registration.state(), RegistrationState::Authenticated);
        assert_eq!(registration.uuid(), Some("abc-123"));
        assert_eq!(registration.token(), Some("token-for-abc-123"));
        assert_eq!(backend.reg_calls(), 1);
        assert_eq!(backend.auth_calls(), 1);

        // All three files are on disk afterwards
        let keys = KeyStore::new(home.path());
        assert!(keys.public_key_path().exists());
        assert!(keys.private_key_path().exists());
        assert!(keys.uuid_path().exists());
    }

    #[tokio::test]
    async fn test_existing_identity_skips_registration_endpoint() {
        let home = tempfile::tempdir().unwrap();
        let backend = FakeBackend::new("abc-123");

        // Seed disk state: keys plus UUID record from an earlier run
        let mut seed = KeyStore::new(home.path());
        seed.generate_keypair().unwrap();
        seed.persist_keys().unwrap();
        seed.persist_identity("abc-123").unwrap();
        backend.seed_key(&seed.keypair().unwrap().public_key_hex());

        let mut registration = Registration::new(KeyStore::new(home.path()), backend.clone());
        registration.register().await.unwrap();

        assert_eq!(registration.state(), RegistrationState::Authenticated);
        assert_eq!(backend.reg_calls(), 0);
        assert_eq!(backend.auth_calls(), 1);
    }

    #[tokio::test]
    async fn test_keys_without_uuid_reregisters_with_same_key() {
        let home = tempfile::tempdir().unwrap();
        let backend = FakeBackend::new("abc-123");

        let mut seed = KeyStore::new(home.path());
        seed.generate_keypair().unwrap();
        seed.persist_keys().unwrap();
        let original_key = seed.keypair().unwrap().public_key_hex();

        let mut registration = Registration::new(KeyStore::new(home.path()), backend.clone());
        registration.register().await.unwrap();

        // Registered with the persisted key, not a regenerated one
        assert_eq!(backend.reg_calls(), 1);
        assert_eq!(
            backend.registered_key.lock().unwrap().as_deref(),
            Some(original_key.as_str())
        );
        assert_eq!(registration.state(), RegistrationState::Authenticated);
    }

    #[tokio::test]
    async fn test_persistence_failure_prevents_registration_call() {
        let home = tempfile::tempdir().unwrap();
        // A file where the key directory should be makes every disk step fail
        std::fs::write(home.path().join("keys"), "not a directory").unwrap();

        let backend = FakeBackend::new("abc-123");
        let mut registration = Registration::new(KeyStore::new(home.path()), backend.clone());

        let err = registration.register().await.unwrap_err();
        assert!(matches!(err, ClientError::Persistence(_)));
        assert_eq!(backend.reg_calls(), 0);
        assert_eq!(backend.auth_calls(), 0);
    }

    #[tokio::test]
    async fn test_uuid_persist_failure_is_identity_diverged() {
        let home = tempfile::tempdir().unwrap();
        // uuid.json cannot be written if a directory sits at its path
        std::fs::create_dir_all(home.path().join("keys").join("uuid.json")).unwrap();

        let backend = FakeBackend::new("abc-123");
        let mut registration = Registration::new(KeyStore::new(home.path()), backend.clone());

        let err = registration.register().await.unwrap_err();
        match err {
            ClientError::IdentityDiverged { uuid, .. } => assert_eq!(uuid, "abc-123"),
            other => panic!("expected IdentityDiverged, got {:?}", other),
        }
        assert_eq!(backend.reg_calls(), 1);
        // Login never happens once the identity has diverged
        assert_eq!(backend.auth_calls(), 0);
    }

    #[tokio::test]
    async fn test_login_without_identity_fails() {
        let home = tempfile::tempdir().unwrap();
        let backend = FakeBackend::new("abc-123");

        let mut registration = Registration::new(KeyStore::new(home.path()), backend);
        let err = registration.login().await.unwrap_err();
        assert!(matches!(err, ClientError::Authentication(_)));
    }
}
