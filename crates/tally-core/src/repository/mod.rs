use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::CoreError;
use crate::ids::assign_ids;
use crate::models::{
    Character, EnabledTasks, NewCharacterData, NewTaskData, PresetScope, Task, TaskPreset,
    UpdateCharacterData, UpdateTaskData, ViewState,
};
use crate::schema::{self, SchemaIssue};
use crate::storage::{StorageBackend, StorageEvent, StorageKey};

// Domain implementations
pub mod characters;
pub mod presets;
pub mod tasks;
pub mod view_state;

const NOTICE_CHANNEL_CAPACITY: usize = 32;

/// Domain-specific trait for task operations
#[async_trait]
pub trait TaskRepository {
    /// Re-reads the task collection from storage, replacing the in-memory copy.
    async fn load_tasks(&self) -> Vec<Task>;
    async fn save_tasks(&self) -> Result<(), CoreError>;
    async fn tasks(&self) -> Vec<Task>;
    async fn find_task(&self, id: &str) -> Option<Task>;
    /// Tasks whose id starts or ends with `short`. Time-ordered ids share
    /// their leading digits, so short forms are usually taken from the end.
    async fn find_tasks_by_short_id(&self, short: &str) -> Vec<Task>;
    async fn add_task(&self, data: NewTaskData) -> Result<Task, CoreError>;
    async fn add_tasks(&self, data: Vec<NewTaskData>) -> Result<Vec<Task>, CoreError>;
    async fn update_task(&self, id: &str, data: UpdateTaskData) -> Result<Task, CoreError>;
    async fn remove_task(&self, id: &str) -> Result<Task, CoreError>;
    async fn set_completed(&self, id: &str, completed: bool, now: DateTime<Utc>) -> Result<Task, CoreError>;
    async fn replace_tasks(&self, tasks: Vec<Task>) -> Result<(), CoreError>;
}

/// Domain-specific trait for roster operations
#[async_trait]
pub trait CharacterRepository {
    async fn characters(&self) -> Vec<Character>;
    /// Looks a character up by id first, then by name.
    async fn find_character(&self, id_or_name: &str) -> Option<Character>;
    async fn add_character(&self, data: NewCharacterData) -> Result<Character, CoreError>;
    async fn update_character(&self, id: &str, data: UpdateCharacterData) -> Result<Character, CoreError>;
    async fn remove_character(&self, id: &str) -> Result<Character, CoreError>;
    async fn set_main(&self, id: &str) -> Result<Character, CoreError>;
}

/// Domain-specific trait for enabled-task and preset operations
#[async_trait]
pub trait PresetRepository {
    async fn enabled_tasks(&self) -> EnabledTasks;
    async fn set_task_enabled(&self, character: &str, template: &str, enabled: bool) -> Result<(), CoreError>;
    async fn presets(&self) -> Vec<TaskPreset>;
    async fn save_preset(&self, name: &str, from_character: &str) -> Result<TaskPreset, CoreError>;
    async fn delete_preset(&self, name: &str) -> Result<TaskPreset, CoreError>;
    async fn apply_preset(&self, name: &str, scope: PresetScope) -> Result<(), CoreError>;
}

/// Domain-specific trait for UI continuity state
#[async_trait]
pub trait ViewStateRepository {
    async fn view_state(&self) -> ViewState;
    async fn set_hidden(&self, character: &str, hidden: bool) -> Result<bool, CoreError>;
    async fn set_character_order(&self, order: Vec<String>) -> Result<(), CoreError>;
    async fn toggle_section(&self, section: &str) -> Result<bool, CoreError>;
    async fn toggle_expanded(&self, list: &str) -> Result<bool, CoreError>;
}

/// Main repository trait that composes all domain traits
pub trait Repository: TaskRepository + CharacterRepository + PresetRepository + ViewStateRepository {}

impl Repository for LocalRepository {}

/// Soft notifications surfaced to whoever displays them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// A write failed; the in-memory state is kept and the write retried later.
    SaveFailed { key: StorageKey, message: String },
    /// A previously failed write went through.
    Recovered { key: StorageKey },
    /// A stored value could not be read and the default was used instead.
    LoadFallback { key: StorageKey, message: String },
    /// Records were coerced or re-identified while loading.
    Repaired { key: StorageKey, issues: usize },
    /// Another writer changed the key and it was reloaded.
    ExternalReload { key: StorageKey },
}

#[derive(Debug, Default)]
pub(crate) struct RepositoryState {
    pub(crate) characters: Vec<Character>,
    pub(crate) tasks: Vec<Task>,
    pub(crate) enabled: EnabledTasks,
    pub(crate) presets: Vec<TaskPreset>,
    pub(crate) view: ViewState,
    /// Keys whose latest in-memory value has not reached storage
    pub(crate) dirty: BTreeSet<StorageKey>,
}

impl RepositoryState {
    pub(crate) fn to_value(&self, key: StorageKey) -> Result<Value, serde_json::Error> {
        match key {
            StorageKey::Roster => serde_json::to_value(&self.characters),
            StorageKey::Tasks => serde_json::to_value(&self.tasks),
            StorageKey::EnabledTasks => serde_json::to_value(&self.enabled),
            StorageKey::TaskPresets => serde_json::to_value(&self.presets),
            StorageKey::CollapsedSections => serde_json::to_value(&self.view.collapsed_sections),
            StorageKey::HiddenCharacters => serde_json::to_value(&self.view.hidden_characters),
            StorageKey::ExpandedLists => serde_json::to_value(&self.view.expanded_lists),
            StorageKey::CharacterOrder => serde_json::to_value(&self.view.character_order),
        }
    }

    /// Replaces the value behind `key` with the coerced form of `value`.
    /// Returns the schema issues found and the number of re-identified records.
    pub(crate) fn apply(&mut self, key: StorageKey, value: &Value, now: DateTime<Utc>) -> (Vec<SchemaIssue>, usize) {
        match key {
            StorageKey::Roster => {
                let mut coerced = schema::coerce_characters(value);
                let repaired = assign_ids(&mut coerced.value);
                self.characters = coerced.value;
                (coerced.issues, repaired)
            }
            StorageKey::Tasks => {
                let mut coerced = schema::coerce_tasks(value, now);
                let repaired = assign_ids(&mut coerced.value);
                self.tasks = coerced.value;
                (coerced.issues, repaired)
            }
            StorageKey::EnabledTasks => {
                let coerced = schema::coerce_enabled_tasks(value);
                self.enabled = coerced.value;
                (coerced.issues, 0)
            }
            StorageKey::TaskPresets => {
                let coerced = schema::coerce_presets(value, now);
                self.presets = coerced.value;
                (coerced.issues, 0)
            }
            StorageKey::CollapsedSections => {
                let coerced = schema::coerce_bool_map(value);
                self.view.collapsed_sections = coerced.value;
                (coerced.issues, 0)
            }
            StorageKey::HiddenCharacters => {
                let coerced = schema::coerce_string_list(value);
                self.view.hidden_characters = coerced.value.into_iter().collect();
                (coerced.issues, 0)
            }
            StorageKey::ExpandedLists => {
                let coerced = schema::coerce_bool_map(value);
                self.view.expanded_lists = coerced.value;
                (coerced.issues, 0)
            }
            StorageKey::CharacterOrder => {
                let coerced = schema::coerce_string_list(value);
                self.view.character_order = coerced.value;
                (coerced.issues, 0)
            }
        }
    }
}

/// A change made to the backend by some other writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExternalChange {
    Key(StorageKey),
    /// Events were dropped; every key should be considered changed.
    Lagged(u64),
}

/// Stream of storage events written by other repositories.
pub struct ExternalChanges {
    rx: broadcast::Receiver<StorageEvent>,
    origin: Uuid,
}

impl ExternalChanges {
    /// Waits for the next foreign write. `None` once the backend is gone.
    pub async fn next(&mut self) -> Option<ExternalChange> {
        loop {
            match self.rx.recv().await {
                Ok(event) if event.origin == self.origin => continue,
                Ok(event) => return Some(ExternalChange::Key(event.key)),
                Err(RecvError::Lagged(missed)) => return Some(ExternalChange::Lagged(missed)),
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

/// Repository over a [`StorageBackend`], holding the whole state in memory.
///
/// Reads are served from memory. Every mutation rewrites the affected key in
/// full before returning. When that write fails the mutation stays applied
/// in memory, the key is marked pending, a [`Notice::SaveFailed`] is sent and
/// the write is retried by [`LocalRepository::flush`] or the next reconciler
/// tick.
pub struct LocalRepository {
    backend: Arc<dyn StorageBackend>,
    origin: Uuid,
    state: Mutex<RepositoryState>,
    notices: broadcast::Sender<Notice>,
}

impl LocalRepository {
    /// Creates a repository and loads every key from `backend`.
    /// Unreadable keys load as empty; this never fails.
    pub async fn open(backend: Arc<dyn StorageBackend>) -> Self {
        let (notices, _) = broadcast::channel(NOTICE_CHANNEL_CAPACITY);
        let repo = Self {
            backend,
            origin: Uuid::new_v4(),
            state: Mutex::new(RepositoryState::default()),
            notices,
        };
        repo.reload_all().await;
        repo
    }

    /// Identity used to tag this repository's writes.
    pub fn origin(&self) -> Uuid {
        self.origin
    }

    pub fn subscribe_notices(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }

    pub fn external_changes(&self) -> ExternalChanges {
        ExternalChanges {
            rx: self.backend.subscribe(),
            origin: self.origin,
        }
    }

    /// Reloads keys written by other repositories and calls `callback` for
    /// each one. The listener stops when the returned handle is aborted.
    pub fn on_external_change<F>(self: &Arc<Self>, callback: F) -> JoinHandle<()>
    where
        F: Fn(StorageKey) + Send + 'static,
    {
        let repo = Arc::clone(self);
        let mut changes = self.external_changes();
        tokio::spawn(async move {
            while let Some(change) = changes.next().await {
                repo.apply_external(change).await.into_iter().for_each(&callback);
            }
        })
    }

    pub(crate) async fn lock(&self) -> MutexGuard<'_, RepositoryState> {
        self.state.lock().await
    }

    fn notify(&self, notice: Notice) {
        // Nobody listening is fine.
        let _ = self.notices.send(notice);
    }

    async fn read_value(&self, key: StorageKey) -> Value {
        match self.backend.get(key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => value,
                Err(e) => {
                    warn!(key = %key, error = %e, "stored value is not valid JSON; using default");
                    self.notify(Notice::LoadFallback {
                        key,
                        message: e.to_string(),
                    });
                    Value::Null
                }
            },
            Ok(None) => Value::Null,
            Err(e) => {
                warn!(key = %key, error = %e, "could not read storage; using default");
                self.notify(Notice::LoadFallback {
                    key,
                    message: e.to_string(),
                });
                Value::Null
            }
        }
    }

    async fn load_into(&self, state: &mut RepositoryState, key: StorageKey) {
        let value = self.read_value(key).await;
        let (issues, reidentified) = state.apply(key, &value, Utc::now());
        state.dirty.remove(&key);

        if !issues.is_empty() {
            warn!(key = %key, count = issues.len(), "repaired malformed stored records");
            for issue in &issues {
                debug!(key = %key, %issue, "schema issue");
            }
        }
        if reidentified > 0 {
            info!(key = %key, count = reidentified, "assigned fresh ids to records with missing or duplicate ids");
        }
        if !issues.is_empty() || reidentified > 0 {
            self.notify(Notice::Repaired {
                key,
                issues: issues.len() + reidentified,
            });
        }
        // Regenerated ids are random, so they must be written back to stay stable.
        if reidentified > 0 {
            let _ = self.persist(state, key).await;
        }
    }

    /// Replaces the in-memory value of `key` with what storage holds,
    /// discarding any unsaved local change to that key.
    pub async fn reload_key(&self, key: StorageKey) {
        let mut state = self.lock().await;
        self.load_into(&mut state, key).await;
        debug!(key = %key, "reloaded from storage");
    }

    /// Reloads whatever another writer touched and returns the affected keys.
    pub async fn apply_external(&self, change: ExternalChange) -> Vec<StorageKey> {
        let keys = match change {
            ExternalChange::Key(key) => {
                self.reload_key(key).await;
                vec![key]
            }
            ExternalChange::Lagged(missed) => {
                debug!(missed, "storage events dropped; reloading everything");
                self.reload_all().await;
                StorageKey::ALL.to_vec()
            }
        };
        for &key in &keys {
            self.notify(Notice::ExternalReload { key });
        }
        keys
    }

    pub async fn reload_all(&self) {
        let mut state = self.lock().await;
        for key in StorageKey::ALL {
            self.load_into(&mut state, key).await;
        }
    }

    /// Writes the in-memory value of `key` to storage.
    pub(crate) async fn persist(&self, state: &mut RepositoryState, key: StorageKey) -> Result<(), CoreError> {
        let encoded = serde_json::to_string(&state.to_value(key)?)?;
        match self.backend.set(key, encoded, self.origin).await {
            Ok(()) => {
                if state.dirty.remove(&key) {
                    info!(key = %key, "pending write persisted");
                    self.notify(Notice::Recovered { key });
                }
                Ok(())
            }
            Err(e) => {
                warn!(key = %key, error = %e, "write failed; keeping in-memory state");
                state.dirty.insert(key);
                self.notify(Notice::SaveFailed {
                    key,
                    message: e.to_string(),
                });
                Err(e.into())
            }
        }
    }

    /// Persists after a mutation. A failure has already been logged, noticed
    /// and queued for retry, so the mutation itself still succeeds.
    pub(crate) async fn commit(&self, state: &mut RepositoryState, keys: &[StorageKey]) {
        for &key in keys {
            let _ = self.persist(state, key).await;
        }
    }

    /// Retries every pending write in `state`. Returns the first failure.
    pub(crate) async fn retry_pending(&self, state: &mut RepositoryState) -> Result<(), CoreError> {
        let pending: Vec<StorageKey> = state.dirty.iter().copied().collect();
        let mut first_error = None;
        for key in pending {
            if let Err(e) = self.persist(state, key).await {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Keys whose latest value has not been written yet.
    pub async fn pending_writes(&self) -> Vec<StorageKey> {
        self.lock().await.dirty.iter().copied().collect()
    }

    pub async fn flush(&self) -> Result<(), CoreError> {
        let mut state = self.lock().await;
        self.retry_pending(&mut state).await
    }

    /// Removes every key from storage and empties the in-memory state.
    pub async fn clear_all(&self) -> Result<(), CoreError> {
        let mut state = self.lock().await;
        *state = RepositoryState::default();
        for key in StorageKey::ALL {
            self.backend.remove(key, self.origin).await?;
        }
        info!("cleared all stored state");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Frequency;
    use crate::storage::MemoryStorage;
    use std::collections::HashSet;

    async fn seeded(entries: &[(StorageKey, &str)]) -> Arc<MemoryStorage> {
        let storage = Arc::new(MemoryStorage::new());
        for (key, raw) in entries {
            storage.set(*key, raw.to_string(), Uuid::new_v4()).await.unwrap();
        }
        storage
    }

    #[tokio::test]
    async fn test_open_with_garbage_falls_back_to_empty() {
        let storage = seeded(&[
            (StorageKey::Tasks, "{not json"),
            (StorageKey::Roster, r#"[{"id":"a","name":"Aria"}]"#),
        ])
        .await;

        let repo = LocalRepository::open(storage).await;
        assert!(repo.tasks().await.is_empty());
        assert_eq!(repo.characters().await.len(), 1);
        assert!(repo.view_state().await.character_order.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_ids_repaired_and_written_back() {
        let raw = r#"[
            {"id":"dup","character":"Aria","name":"one","frequency":"daily","createdAt":"2024-01-01T00:00:00Z"},
            {"id":"dup","character":"Aria","name":"two","frequency":"daily","createdAt":"2024-01-01T00:00:00Z"},
            {"id":"solo","character":"Aria","name":"three","frequency":"weekly","createdAt":"2024-01-01T00:00:00Z"}
        ]"#;
        let storage = seeded(&[(StorageKey::Tasks, raw)]).await;
        let repo = LocalRepository::open(storage.clone()).await;

        let tasks = repo.tasks().await;
        let ids: HashSet<&str> = tasks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids.len(), 3);
        assert_eq!(tasks[0].id, "dup");
        assert_eq!(tasks[2].id, "solo");

        // A second reader sees the same repaired ids.
        let again = LocalRepository::open(storage).await;
        assert_eq!(again.tasks().await, tasks);
    }

    #[tokio::test]
    async fn test_failed_write_keeps_memory_and_retries() {
        let storage = Arc::new(MemoryStorage::with_quota(400));
        let repo = LocalRepository::open(storage.clone()).await;
        let mut notices = repo.subscribe_notices();

        let big_note = "x".repeat(500);
        let mut data = NewTaskData::new("Aria", "Farm", Frequency::Daily);
        data.note = Some(big_note);
        let task = repo.add_task(data).await.unwrap();

        assert_eq!(repo.find_task(&task.id).await.map(|t| t.id), Some(task.id.clone()));
        assert_eq!(repo.pending_writes().await, vec![StorageKey::Tasks]);
        assert!(matches!(notices.recv().await.unwrap(), Notice::SaveFailed { key: StorageKey::Tasks, .. }));
        assert!(repo.flush().await.is_err());

        repo.update_task(
            &task.id,
            UpdateTaskData {
                note: Some(None),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert!(repo.pending_writes().await.is_empty());
        assert!(storage.get(StorageKey::Tasks).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_external_change_reloads_other_tab() {
        let storage = Arc::new(MemoryStorage::new());
        let tab_a = Arc::new(LocalRepository::open(storage.clone()).await);
        let tab_b = LocalRepository::open(storage.clone()).await;

        let mut notices = tab_a.subscribe_notices();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let listener = tab_a.on_external_change(move |key| {
            let _ = tx.send(key);
        });

        tab_b
            .add_character(NewCharacterData {
                name: "Bram".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        let key = tokio::time::timeout(std::time::Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(key, StorageKey::Roster);
        assert_eq!(tab_a.characters().await.len(), 1);
        assert_eq!(
            notices.recv().await.unwrap(),
            Notice::ExternalReload { key: StorageKey::Roster }
        );
        listener.abort();
    }

    #[tokio::test]
    async fn test_own_writes_are_not_external() {
        let storage = Arc::new(MemoryStorage::new());
        let repo = LocalRepository::open(storage.clone()).await;
        let mut changes = repo.external_changes();

        repo.set_hidden("Aria", true).await.unwrap();
        storage
            .set(StorageKey::Tasks, "[]".to_string(), Uuid::new_v4())
            .await
            .unwrap();

        assert_eq!(changes.next().await, Some(ExternalChange::Key(StorageKey::Tasks)));
    }

    #[tokio::test]
    async fn test_clear_all() {
        let storage = Arc::new(MemoryStorage::new());
        let repo = LocalRepository::open(storage.clone()).await;
        repo.add_task(NewTaskData::new("Aria", "Farm", Frequency::Daily)).await.unwrap();
        repo.clear_all().await.unwrap();

        assert!(repo.tasks().await.is_empty());
        assert_eq!(storage.get(StorageKey::Tasks).await.unwrap(), None);
    }
}
