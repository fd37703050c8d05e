//! Whole-state export and import.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::error::CoreError;
use crate::repository::LocalRepository;
use crate::storage::StorageKey;

pub const SNAPSHOT_VERSION: u32 = 1;

/// Every storage key's value as plain JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub version: u32,
    pub exported_at: DateTime<Utc>,
    pub data: BTreeMap<StorageKey, Value>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportReport {
    /// Records coerced or dropped while importing
    pub issues: usize,
    /// Records that received a fresh id
    pub reidentified: usize,
}

impl Snapshot {
    /// Parses an exported document. A bare object of storage keys (without
    /// the `data` wrapper) is accepted too. Unknown keys are skipped.
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        let value: Value = serde_json::from_str(raw)?;
        let Value::Object(mut root) = value else {
            return Err(CoreError::InvalidInput("Snapshot must be a JSON object".to_string()));
        };

        let version = match root.get("version").and_then(Value::as_u64) {
            Some(v) => u32::try_from(v).unwrap_or(u32::MAX),
            None => SNAPSHOT_VERSION,
        };
        if version > SNAPSHOT_VERSION {
            return Err(CoreError::InvalidInput(format!(
                "Snapshot version {} is newer than supported version {}",
                version, SNAPSHOT_VERSION
            )));
        }
        let exported_at = root
            .get("exportedAt")
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        let entries = match root.remove("data") {
            Some(Value::Object(data)) => data,
            Some(_) => return Err(CoreError::InvalidInput("Snapshot 'data' must be an object".to_string())),
            None => root,
        };

        let mut data = BTreeMap::new();
        for (name, value) in entries {
            match name.parse::<StorageKey>() {
                Ok(key) => {
                    data.insert(key, value);
                }
                Err(_) if matches!(name.as_str(), "version" | "exportedAt") => {}
                Err(_) => warn!(key = %name, "skipping unknown key in snapshot"),
            }
        }

        Ok(Self {
            version,
            exported_at,
            data,
        })
    }
}

impl LocalRepository {
    pub async fn export_snapshot(&self) -> Result<Snapshot, CoreError> {
        let state = self.lock().await;
        let mut data = BTreeMap::new();
        for key in StorageKey::ALL {
            data.insert(key, state.to_value(key)?);
        }
        Ok(Snapshot {
            version: SNAPSHOT_VERSION,
            exported_at: Utc::now(),
            data,
        })
    }

    /// Replaces the whole state with the snapshot's. Keys absent from the
    /// snapshot become empty. Every key is written even if one write fails;
    /// the first failure is returned.
    pub async fn import_snapshot(&self, snapshot: &Snapshot) -> Result<ImportReport, CoreError> {
        let mut state = self.lock().await;
        let mut report = ImportReport::default();
        let now = Utc::now();

        for key in StorageKey::ALL {
            let value = snapshot.data.get(&key).unwrap_or(&Value::Null);
            let (issues, reidentified) = state.apply(key, value, now);
            report.issues += issues.len();
            report.reidentified += reidentified;
        }

        let mut first_error = None;
        for key in StorageKey::ALL {
            if let Err(e) = self.persist(&mut state, key).await {
                first_error.get_or_insert(e);
            }
        }
        info!(issues = report.issues, reidentified = report.reidentified, "imported snapshot");
        first_error.map_or(Ok(report), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Frequency, NewCharacterData, NewTaskData};
    use crate::repository::{CharacterRepository, PresetRepository, TaskRepository, ViewStateRepository};
    use crate::storage::MemoryStorage;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_export_clear_import_is_lossless() {
        let repo = LocalRepository::open(Arc::new(MemoryStorage::new())).await;
        repo.add_character(NewCharacterData {
            name: "Aria".to_string(),
            is_main: true,
            ..Default::default()
        })
        .await
        .unwrap();
        let task = repo.add_task(NewTaskData::new("Aria", "Farm", Frequency::Daily)).await.unwrap();
        repo.set_completed(&task.id, true, Utc::now()).await.unwrap();
        repo.set_task_enabled("Aria", "Guild raid", true).await.unwrap();
        repo.save_preset("raider", "Aria").await.unwrap();
        repo.set_hidden("Aria", true).await.unwrap();
        repo.toggle_section("weekly").await.unwrap();

        let exported = repo.export_snapshot().await.unwrap();
        let text = serde_json::to_string_pretty(&exported).unwrap();

        repo.clear_all().await.unwrap();
        assert!(repo.tasks().await.is_empty());

        let report = repo.import_snapshot(&Snapshot::parse(&text).unwrap()).await.unwrap();
        assert_eq!(report, ImportReport::default());
        assert_eq!(repo.export_snapshot().await.unwrap().data, exported.data);
    }

    #[test]
    fn test_parse_bare_object_and_unknown_keys() {
        let snapshot = Snapshot::parse(r#"{"tasks": [], "hiddenCharacters": ["Aria"], "theme": "dark"}"#).unwrap();
        assert_eq!(snapshot.version, SNAPSHOT_VERSION);
        assert_eq!(snapshot.data.len(), 2);
        assert!(snapshot.data.contains_key(&StorageKey::HiddenCharacters));
    }

    #[test]
    fn test_parse_rejects_newer_version() {
        assert!(Snapshot::parse(r#"{"version": 99, "data": {}}"#).is_err());
        assert!(Snapshot::parse("[1, 2]").is_err());
    }

    #[tokio::test]
    async fn test_import_missing_keys_become_empty() {
        let repo = LocalRepository::open(Arc::new(MemoryStorage::new())).await;
        repo.set_hidden("Aria", true).await.unwrap();

        let snapshot = Snapshot::parse(r#"{"data": {"roster": [{"id": "c1", "name": "Bram"}]}}"#).unwrap();
        repo.import_snapshot(&snapshot).await.unwrap();

        assert_eq!(repo.characters().await[0].name, "Bram");
        assert!(repo.view_state().await.hidden_characters.is_empty());
    }
}
