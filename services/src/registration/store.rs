//! Persistence for device registrations.
//!
//! One row per registered device: the server-minted UUID keyed against the
//! public key the device registered with. UUID uniqueness is enforced by
//! the store, not by in-process locking, so concurrent registrations of
//! different keys never collide.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};

/// A stored `(uuid, public key, curve)` association.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationRecord {
    pub uuid: String,
    pub pub_key: String,
    pub curve: String,
    pub created_at: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),

    #[error("a registration already exists for this key")]
    Duplicate,
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        match e.sqlite_error_code() {
            Some(rusqlite::ErrorCode::ConstraintViolation) => StoreError::Duplicate,
            _ => StoreError::Database(e.to_string()),
        }
    }
}

/// Persistence collaborator for the registration service.
pub trait RegistrationStore: Send + Sync {
    fn insert(&self, record: &RegistrationRecord) -> Result<(), StoreError>;
    fn find_by_uuid(&self, uuid: &str) -> Result<Option<RegistrationRecord>, StoreError>;
    fn find_by_pub_key(&self, pub_key: &str) -> Result<Option<RegistrationRecord>, StoreError>;
}

/// SQLite-backed registration store.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        Self::init(Connection::open(path).map_err(|e| StoreError::Database(e.to_string()))?)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory().map_err(|e| StoreError::Database(e.to_string()))?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS registrations (
                uuid       TEXT PRIMARY KEY,
                pub_key    TEXT NOT NULL UNIQUE,
                curve      TEXT NOT NULL,
                created_at INTEGER NOT NULL
            )",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<RegistrationRecord> {
        Ok(RegistrationRecord {
            uuid: row.get(0)?,
            pub_key: row.get(1)?,
            curve: row.get(2)?,
            created_at: row.get(3)?,
        })
    }
}

impl RegistrationStore for SqliteStore {
    fn insert(&self, record: &RegistrationRecord) -> Result<(), StoreError> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        conn.execute(
            "INSERT INTO registrations (uuid, pub_key, curve, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                record.uuid,
                record.pub_key,
                record.curve,
                record.created_at
            ],
        )?;
        Ok(())
    }

    fn find_by_uuid(&self, uuid: &str) -> Result<Option<RegistrationRecord>, StoreError> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let record = conn
            .query_row(
                "SELECT uuid, pub_key, curve, created_at FROM registrations WHERE uuid = ?1",
                params![uuid],
                Self::row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    fn find_by_pub_key(&self, pub_key: &str) -> Result<Option<RegistrationRecord>, StoreError> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let record = conn
            .query_row(
                "SELECT uuid, pub_key, curve, created_at FROM registrations WHERE pub_key = ?1",
                params![pub_key],
                Self::row_to_record,
            )
            .optional()?;
        Ok(record)
    }
}
