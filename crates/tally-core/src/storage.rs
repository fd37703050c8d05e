//! String-keyed blob storage.
//!
//! Every piece of persisted state lives under one [`StorageKey`] as a single
//! JSON document. Keys are written independently; there is no transaction
//! spanning two keys. Backends broadcast a [`StorageEvent`] for every write
//! so that other repositories sharing the backend can reload.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use crate::db::DbPool;
use crate::error::StorageError;

const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StorageKey {
    Roster,
    Tasks,
    EnabledTasks,
    TaskPresets,
    CollapsedSections,
    HiddenCharacters,
    ExpandedLists,
    CharacterOrder,
}

impl StorageKey {
    pub const ALL: [StorageKey; 8] = [
        StorageKey::Roster,
        StorageKey::Tasks,
        StorageKey::EnabledTasks,
        StorageKey::TaskPresets,
        StorageKey::CollapsedSections,
        StorageKey::HiddenCharacters,
        StorageKey::ExpandedLists,
        StorageKey::CharacterOrder,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StorageKey::Roster => "roster",
            StorageKey::Tasks => "tasks",
            StorageKey::EnabledTasks => "enabledTasks",
            StorageKey::TaskPresets => "taskPresets",
            StorageKey::CollapsedSections => "collapsedSections",
            StorageKey::HiddenCharacters => "hiddenCharacters",
            StorageKey::ExpandedLists => "expandedLists",
            StorageKey::CharacterOrder => "characterOrder",
        }
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, PartialEq)]
#[error("Invalid storage key: {0}")]
pub struct ParseStorageKeyError(String);

impl FromStr for StorageKey {
    type Err = ParseStorageKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StorageKey::ALL
            .into_iter()
            .find(|key| key.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParseStorageKeyError(s.to_string()))
    }
}

/// A write (or removal) observed on a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    pub key: StorageKey,
    /// Identity of the writer, so a repository can ignore its own writes
    pub origin: Uuid,
}

#[async_trait]
pub trait StorageBackend: Send + Sync {
    async fn get(&self, key: StorageKey) -> Result<Option<String>, StorageError>;
    async fn set(&self, key: StorageKey, value: String, origin: Uuid) -> Result<(), StorageError>;
    async fn remove(&self, key: StorageKey, origin: Uuid) -> Result<(), StorageError>;
    /// Keys currently holding a value.
    async fn keys(&self) -> Result<Vec<StorageKey>, StorageError>;
    fn subscribe(&self) -> broadcast::Receiver<StorageEvent>;
}

/// In-process storage with an optional total byte quota, mirroring the
/// limits of browser local storage. Shared (via `Arc`) between several
/// repositories it behaves like one origin open in several tabs.
#[derive(Debug)]
pub struct MemoryStorage {
    entries: RwLock<HashMap<StorageKey, String>>,
    quota: Option<usize>,
    events: broadcast::Sender<StorageEvent>,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            entries: RwLock::new(HashMap::new()),
            quota: None,
            events,
        }
    }

    /// Storage that rejects writes once the summed value sizes would exceed `limit` bytes.
    pub fn with_quota(limit: usize) -> Self {
        Self {
            quota: Some(limit),
            ..Self::new()
        }
    }

    pub async fn used_bytes(&self) -> usize {
        self.entries.read().await.values().map(String::len).sum()
    }
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    async fn get(&self, key: StorageKey) -> Result<Option<String>, StorageError> {
        Ok(self.entries.read().await.get(&key).cloned())
    }

    async fn set(&self, key: StorageKey, value: String, origin: Uuid) -> Result<(), StorageError> {
        {
            let mut entries = self.entries.write().await;
            if let Some(limit) = self.quota {
                let others: usize = entries
                    .iter()
                    .filter(|(k, _)| **k != key)
                    .map(|(_, v)| v.len())
                    .sum();
                let needed = others + value.len();
                if needed > limit {
                    return Err(StorageError::QuotaExceeded { key, needed, limit });
                }
            }
            entries.insert(key, value);
        }
        // No receivers is fine.
        let _ = self.events.send(StorageEvent { key, origin });
        Ok(())
    }

    async fn remove(&self, key: StorageKey, origin: Uuid) -> Result<(), StorageError> {
        let removed = self.entries.write().await.remove(&key).is_some();
        if removed {
            let _ = self.events.send(StorageEvent { key, origin });
        }
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<StorageKey>, StorageError> {
        let mut keys: Vec<StorageKey> = self.entries.read().await.keys().copied().collect();
        keys.sort();
        Ok(keys)
    }

    fn subscribe(&self) -> broadcast::Receiver<StorageEvent> {
        self.events.subscribe()
    }
}

/// Durable storage in a single SQLite key/value table.
///
/// Change events are delivered to repositories in this process only.
#[derive(Debug, Clone)]
pub struct SqliteStorage {
    pool: DbPool,
    events: broadcast::Sender<StorageEvent>,
}

impl SqliteStorage {
    pub fn new(pool: DbPool) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { pool, events }
    }

    /// Opens (creating if needed) the database at `db_path` and runs migrations.
    pub async fn open(db_path: &str) -> Result<Self, StorageError> {
        let pool = crate::db::establish_connection(db_path).await?;
        Ok(Self::new(pool))
    }
}

#[async_trait]
impl StorageBackend for SqliteStorage {
    async fn get(&self, key: StorageKey) -> Result<Option<String>, StorageError> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM kv_store WHERE key = $1")
            .bind(key.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    async fn set(&self, key: StorageKey, value: String, origin: Uuid) -> Result<(), StorageError> {
        sqlx::query(
            r#"INSERT INTO kv_store (key, value, updated_at)
            VALUES ($1, $2, $3)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(key.as_str())
        .bind(&value)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        let _ = self.events.send(StorageEvent { key, origin });
        Ok(())
    }

    async fn remove(&self, key: StorageKey, origin: Uuid) -> Result<(), StorageError> {
        let result = sqlx::query("DELETE FROM kv_store WHERE key = $1")
            .bind(key.as_str())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() > 0 {
            let _ = self.events.send(StorageEvent { key, origin });
        }
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<StorageKey>, StorageError> {
        let raw: Vec<String> = sqlx::query_scalar("SELECT key FROM kv_store ORDER BY key")
            .fetch_all(&self.pool)
            .await?;
        // Rows written by something else are ignored.
        let mut keys: Vec<StorageKey> = raw.iter().filter_map(|k| k.parse().ok()).collect();
        keys.sort();
        Ok(keys)
    }

    fn subscribe(&self) -> broadcast::Receiver<StorageEvent> {
        self.events.subscribe()
    }
}
