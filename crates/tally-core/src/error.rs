use thiserror::Error;

use crate::storage::StorageKey;

/// Failures raised by a storage backend. None of these are fatal: the
/// repository keeps its in-memory state authoritative and retries later.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage quota exceeded writing '{key}': {needed} bytes needed, {limit} allowed")]
    QuotaExceeded {
        key: StorageKey,
        needed: usize,
        limit: usize,
    },

    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Database error")]
    Database(#[from] sqlx::Error),

    #[error("Migration error")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("IO error")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("JSON error")]
    Json(#[from] serde_json::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unknown preset: {0}")]
    PresetNotFound(String),

    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),
}
