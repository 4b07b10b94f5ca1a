//! Device identity key store.
//!
//! Owns the secp256k1 keypair and the server-assigned UUID on local durable
//! storage under `<home>/keys/`. All other components borrow access through
//! this interface; the private key never leaves this module except as
//! signatures, and key material is never logged, only key presence.
//!
//! "Not found" is the one filesystem condition treated as normal (meaning
//! "not yet initialized"); every other I/O error propagates.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use k256::ecdsa::signature::Signer;
use k256::ecdsa::{Signature, SigningKey, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::ClientError;

/// Curve identifier sent alongside the public key at registration.
pub const CURVE: &str = "secp256k1";

const PUBLIC_KEY_FILE: &str = "evergreen.pub";
const PRIVATE_KEY_FILE: &str = "evergreen-private-key";
const UUID_FILE: &str = "uuid.json";

/// Contents of `uuid.json`.
#[derive(Serialize, Deserialize)]
struct IdentityRecord {
    uuid: String,
}

/// An in-memory secp256k1 keypair.
#[derive(Debug)]
pub struct Keypair {
    signing: SigningKey,
}

impl Keypair {
    pub fn generate() -> Result<Self, ClientError> {
        let signing = SigningKey::random(&mut rand::rngs::OsRng);
        Ok(Self { signing })
    }

    /// Uncompressed SEC1 point, hex encoded. Safe to share.
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.signing.verifying_key().to_encoded_point(false).as_bytes())
    }

    fn private_key_hex(&self) -> String {
        hex::encode(self.signing.to_bytes())
    }

    /// ECDSA signature over `message`, DER encoded then hex encoded.
    pub fn sign_hex(&self, message: &str) -> String {
        let signature: Signature = self.signing.sign(message.as_bytes());
        hex::encode(signature.to_der().as_bytes())
    }

    fn from_hex(public: &str, private: &str) -> Result<Self, ClientError> {
        let private_bytes = hex::decode(private.trim())
            .map_err(|e| ClientError::Persistence(format!("private key is not valid hex: {}", e)))?;
        let signing = SigningKey::from_slice(&private_bytes)
            .map_err(|e| ClientError::Persistence(format!("invalid private key: {}", e)))?;

        let public_bytes = hex::decode(public.trim())
            .map_err(|e| ClientError::Persistence(format!("public key is not valid hex: {}", e)))?;
        let verifying = VerifyingKey::from_sec1_bytes(&public_bytes)
            .map_err(|e| ClientError::Persistence(format!("invalid public key: {}", e)))?;

        // The two files must describe the same identity.
        if signing.verifying_key().to_encoded_point(false) != verifying.to_encoded_point(false) {
            return Err(ClientError::Persistence(
                "public key on disk does not match the private key".to_string(),
            ));
        }

        Ok(Self { signing })
    }
}

/// Durable storage for the keypair and UUID record.
pub struct KeyStore {
    key_dir: PathBuf,
    keypair: Option<Keypair>,
    uuid: Option<String>,
}

impl KeyStore {
    pub fn new(home: &Path) -> Self {
        Self {
            key_dir: home.join("keys"),
            keypair: None,
            uuid: None,
        }
    }

    /// Resolve the evergreen home directory from `EVERGREEN_HOME`.
    pub fn default_home() -> PathBuf {
        std::env::var("EVERGREEN_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/evergreen"))
    }

    /// Whether a public-key file exists on disk. Does not validate contents.
    pub fn has_keys(&self) -> Result<bool, ClientError> {
        file_exists(&self.public_key_path())
    }

    /// Whether a UUID record exists on disk.
    pub fn has_identity(&self) -> Result<bool, ClientError> {
        file_exists(&self.uuid_path())
    }

    pub fn generate_keypair(&mut self) -> Result<(), ClientError> {
        if self.keypair.is_some() {
            return Err(ClientError::KeyGeneration(
                "a keypair is already loaded".to_string(),
            ));
        }
        self.keypair = Some(Keypair::generate()?);
        info!("Generated new {} keypair", CURVE);
        Ok(())
    }

    /// Write both key files, creating the key directory if absent. The
    /// private key file is restricted to owner read/write.
    pub fn persist_keys(&self) -> Result<(), ClientError> {
        let keypair = self
            .keypair
            .as_ref()
            .ok_or_else(|| ClientError::KeyGeneration("no keypair to persist".to_string()))?;

        self.ensure_key_dir()?;

        let public_path = self.public_key_path();
        fs::write(&public_path, keypair.public_key_hex())
            .map_err(|e| write_error(&public_path, e))?;
        debug!("Wrote public key to {}", public_path.display());

        let private_path = self.private_key_path();
        fs::write(&private_path, keypair.private_key_hex())
            .map_err(|e| write_error(&private_path, e))?;
        restrict_permissions(&private_path)?;
        debug!("Wrote private key to {}", private_path.display());

        Ok(())
    }

    /// Read both key files back. Refuses to overwrite an in-memory keypair.
    pub fn load_keys(&mut self) -> Result<(), ClientError> {
        if self.keypair.is_some() {
            return Err(ClientError::Persistence(
                "keys are already loaded, refusing to overwrite them".to_string(),
            ));
        }

        let public = read_file(&self.public_key_path())?;
        let private = read_file(&self.private_key_path())?;
        self.keypair = Some(Keypair::from_hex(&public, &private)?);
        debug!("Loaded keypair from {}", self.key_dir.display());
        Ok(())
    }

    /// Persist the UUID assigned by the registration service.
    pub fn persist_identity(&mut self, uuid: &str) -> Result<(), ClientError> {
        self.ensure_key_dir()?;
        let record = IdentityRecord {
            uuid: uuid.to_string(),
        };
        let content = serde_json::to_string(&record)
            .map_err(|e| ClientError::Persistence(format!("serializing uuid record: {}", e)))?;

        let path = self.uuid_path();
        fs::write(&path, content).map_err(|e| write_error(&path, e))?;
        info!("Saved UUID record to {}", path.display());

        self.uuid = Some(uuid.to_string());
        Ok(())
    }

    pub fn load_identity(&mut self) -> Result<String, ClientError> {
        let content = read_file(&self.uuid_path())?;
        let record: IdentityRecord = serde_json::from_str(&content)
            .map_err(|e| ClientError::Persistence(format!("invalid uuid record: {}", e)))?;
        self.uuid = Some(record.uuid.clone());
        Ok(record.uuid)
    }

    pub fn uuid(&self) -> Option<&str> {
        self.uuid.as_deref()
    }

    pub fn keypair(&self) -> Option<&Keypair> {
        self.keypair.as_ref()
    }

    fn ensure_key_dir(&self) -> Result<(), ClientError> {
        fs::create_dir_all(&self.key_dir).map_err(|e| {
            ClientError::Persistence(format!(
                "creating key directory {}: {}",
                self.key_dir.display(),
                e
            ))
        })
    }

    pub fn public_key_path(&self) -> PathBuf {
        self.key_dir.join(PUBLIC_KEY_FILE)
    }

    pub fn private_key_path(&self) -> PathBuf {
        self.key_dir.join(PRIVATE_KEY_FILE)
    }

    pub fn uuid_path(&self) -> PathBuf {
        self.key_dir.join(UUID_FILE)
    }
}

fn file_exists(path: &Path) -> Result<bool, ClientError> {
    match fs::metadata(path) {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(ClientError::Persistence(format!(
            "checking {}: {}",
            path.display(),
            e
        ))),
    }
}

fn read_file(path: &Path) -> Result<String, ClientError> {
    fs::read_to_string(path).map_err(|e| {
        ClientError::Persistence(format!("reading {}: {}", path.display(), e))
    })
}

fn write_error(path: &Path, e: io::Error) -> ClientError {
    ClientError::Persistence(format!("writing {}: {}", path.display(), e))
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<(), ClientError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| {
        ClientError::Persistence(format!(
            "restricting permissions on {}: {}",
            path.display(),
            e
        ))
    })
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<(), ClientError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use k256::ecdsa::signature::Verifier;

    #[test]
    fn test_fresh_store_has_nothing() {
        let home = tempfile::tempdir().unwrap();
        let store = KeyStore::new(home.path());
        assert!(!store.has_keys().unwrap());
        assert!(!store.has_identity().unwrap());
    }

    #[test]
    fn test_generate_persist_load_roundtrip() {
        let home = tempfile::tempdir().unwrap();

        let mut store = KeyStore::new(home.path());
        store.generate_keypair().unwrap();
        store.persist_keys().unwrap();
        let public_hex = store.keypair().unwrap().public_key_hex();

        let mut reloaded = KeyStore::new(home.path());
        assert!(reloaded.has_keys().unwrap());
        reloaded.load_keys().unwrap();
        assert_eq!(reloaded.keypair().unwrap().public_key_hex(), public_hex);
    }

    #[test]
    fn test_load_refuses_to_overwrite_loaded_keys() {
        let home = tempfile::tempdir().unwrap();

        let mut store = KeyStore::new(home.path());
        store.generate_keypair().unwrap();
        store.persist_keys().unwrap();

        let err = store.load_keys().unwrap_err();
        assert!(matches!(err, ClientError::Persistence(_)));
    }

    #[test]
    fn test_load_missing_keys_fails() {
        let home = tempfile::tempdir().unwrap();
        let mut store = KeyStore::new(home.path());
        assert!(store.load_keys().is_err());
    }

    #[test]
    fn test_identity_roundtrip() {
        let home = tempfile::tempdir().unwrap();

        let mut store = KeyStore::new(home.path());
        store.persist_identity("abc-123").unwrap();
        assert_eq!(store.uuid(), Some("abc-123"));

        let mut reloaded = KeyStore::new(home.path());
        assert!(reloaded.has_identity().unwrap());
        assert_eq!(reloaded.load_identity().unwrap(), "abc-123");

        // File contents are the documented JSON shape
        let raw = fs::read_to_string(store.uuid_path()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["uuid"], "abc-123");
    }

    #[cfg(unix)]
    #[test]
    fn test_private_key_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let home = tempfile::tempdir().unwrap();
        let mut store = KeyStore::new(home.path());
        store.generate_keypair().unwrap();
        store.persist_keys().unwrap();

        let mode = fs::metadata(store.private_key_path())
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_sign_verify_roundtrip() {
        let keypair = Keypair::generate().unwrap();
        let signature_hex = keypair.sign_hex("abc-123");

        let public = VerifyingKey::from_sec1_bytes(
            &hex::decode(keypair.public_key_hex()).unwrap(),
        )
        .unwrap();
        let signature =
            Signature::from_der(&hex::decode(signature_hex).unwrap()).unwrap();
        assert!(public.verify("abc-123".as_bytes(), &signature).is_ok());

        // A signature from a different key must not verify
        let other = Keypair::generate().unwrap();
        let forged =
            Signature::from_der(&hex::decode(other.sign_hex("abc-123")).unwrap()).unwrap();
        assert!(public.verify("abc-123".as_bytes(), &forged).is_err());
    }

    #[test]
    fn test_mismatched_key_files_rejected() {
        let a = Keypair::generate().unwrap();
        let b = Keypair::generate().unwrap();

        let err = Keypair::from_hex(&a.public_key_hex(), &b.private_key_hex()).unwrap_err();
        assert!(matches!(err, ClientError::Persistence(_)));
    }
}
