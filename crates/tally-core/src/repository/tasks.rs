use crate::error::CoreError;
use crate::ids::{assign_ids, fresh_id};
use crate::models::{NewTaskData, StoredInstant, Task, UpdateTaskData};
use crate::repository::{LocalRepository, RepositoryState};
use crate::storage::StorageKey;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use tracing::debug;

fn validate_new_task(data: &NewTaskData) -> Result<(), CoreError> {
    if data.name.trim().is_empty() {
        return Err(CoreError::InvalidInput("Task name cannot be empty".to_string()));
    }
    if data.character.trim().is_empty() {
        return Err(CoreError::InvalidInput("Task must belong to a character".to_string()));
    }
    Ok(())
}

impl RepositoryState {
    fn task_ids(&self) -> HashSet<String> {
        self.tasks.iter().map(|t| t.id.clone()).collect()
    }

    fn task_mut(&mut self, id: &str) -> Result<&mut Task, CoreError> {
        self.tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| CoreError::NotFound(format!("Task with id {} not found", id)))
    }

    fn push_task(&mut self, data: NewTaskData, taken: &mut HashSet<String>, now: DateTime<Utc>) -> Task {
        let id = fresh_id(taken);
        taken.insert(id.clone());
        let task = Task {
            id,
            character: data.character.trim().to_string(),
            name: data.name.trim().to_string(),
            frequency: data.frequency,
            completed: false,
            category: data.category,
            due_date: data.due_date.map(StoredInstant::Valid),
            last_completed_at: None,
            priority: data.priority,
            note: data.note,
            created_at: StoredInstant::Valid(now),
        };
        self.tasks.push(task.clone());
        task
    }
}

#[async_trait]
impl super::TaskRepository for LocalRepository {
    async fn load_tasks(&self) -> Vec<Task> {
        self.reload_key(StorageKey::Tasks).await;
        self.tasks().await
    }

    async fn save_tasks(&self) -> Result<(), CoreError> {
        let mut state = self.lock().await;
        self.persist(&mut state, StorageKey::Tasks).await
    }

    async fn tasks(&self) -> Vec<Task> {
        self.lock().await.tasks.clone()
    }

    async fn find_task(&self, id: &str) -> Option<Task> {
        self.lock().await.tasks.iter().find(|t| t.id == id).cloned()
    }

    async fn find_tasks_by_short_id(&self, short: &str) -> Vec<Task> {
        if short.is_empty() {
            return Vec::new();
        }
        self.lock()
            .await
            .tasks
            .iter()
            .filter(|t| t.id.starts_with(short) || t.id.ends_with(short))
            .cloned()
            .collect()
    }

    async fn add_task(&self, data: NewTaskData) -> Result<Task, CoreError> {
        validate_new_task(&data)?;
        let mut state = self.lock().await;
        let mut taken = state.task_ids();
        let task = state.push_task(data, &mut taken, Utc::now());
        debug!(id = %task.id, character = %task.character, "added task");
        self.commit(&mut state, &[StorageKey::Tasks]).await;
        Ok(task)
    }

    async fn add_tasks(&self, data: Vec<NewTaskData>) -> Result<Vec<Task>, CoreError> {
        for item in &data {
            validate_new_task(item)?;
        }
        if data.is_empty() {
            return Ok(Vec::new());
        }

        let mut state = self.lock().await;
        let mut taken = state.task_ids();
        let now = Utc::now();
        let added: Vec<Task> = data
            .into_iter()
            .map(|item| state.push_task(item, &mut taken, now))
            .collect();
        debug!(count = added.len(), "added tasks");
        self.commit(&mut state, &[StorageKey::Tasks]).await;
        Ok(added)
    }

    async fn update_task(&self, id: &str, data: UpdateTaskData) -> Result<Task, CoreError> {
        if let Some(name) = &data.name {
            if name.trim().is_empty() {
                return Err(CoreError::InvalidInput("Task name cannot be empty".to_string()));
            }
        }
        if let Some(character) = &data.character {
            if character.trim().is_empty() {
                return Err(CoreError::InvalidInput("Task must belong to a character".to_string()));
            }
        }

        let mut state = self.lock().await;
        let task = state.task_mut(id)?;

        if let Some(name) = data.name {
            task.name = name.trim().to_string();
        }
        if let Some(character) = data.character {
            task.character = character.trim().to_string();
        }
        if let Some(frequency) = data.frequency {
            task.frequency = frequency;
        }
        if let Some(category) = data.category {
            task.category = category;
        }
        if let Some(due_date) = data.due_date {
            task.due_date = due_date.map(StoredInstant::Valid);
        }
        if let Some(priority) = data.priority {
            task.priority = priority;
        }
        if let Some(note) = data.note {
            task.note = note;
        }

        let updated = task.clone();
        self.commit(&mut state, &[StorageKey::Tasks]).await;
        Ok(updated)
    }

    async fn remove_task(&self, id: &str) -> Result<Task, CoreError> {
        let mut state = self.lock().await;
        let index = state
            .tasks
            .iter()
            .position(|t| t.id == id)
            .ok_or_else(|| CoreError::NotFound(format!("Task with id {} not found", id)))?;
        let removed = state.tasks.remove(index);
        self.commit(&mut state, &[StorageKey::Tasks]).await;
        Ok(removed)
    }

    async fn set_completed(&self, id: &str, completed: bool, now: DateTime<Utc>) -> Result<Task, CoreError> {
        let mut state = self.lock().await;
        let task = state.task_mut(id)?;
        task.completed = completed;
        if completed {
            task.last_completed_at = Some(StoredInstant::Valid(now));
        }
        let updated = task.clone();
        self.commit(&mut state, &[StorageKey::Tasks]).await;
        Ok(updated)
    }

    async fn replace_tasks(&self, mut tasks: Vec<Task>) -> Result<(), CoreError> {
        assign_ids(&mut tasks);
        let mut state = self.lock().await;
        state.tasks = tasks;
        self.persist(&mut state, StorageKey::Tasks).await
    }
}

#[cfg(test)]
mod tests {
    use crate::models::{Frequency, NewTaskData, StoredInstant, TaskPriority, UpdateTaskData};
    use crate::repository::{LocalRepository, TaskRepository};
    use crate::storage::{MemoryStorage, StorageBackend, StorageKey};
    use chrono::{TimeZone, Utc};
    use rstest::rstest;
    use std::sync::Arc;

    async fn repo() -> (Arc<MemoryStorage>, LocalRepository) {
        let storage = Arc::new(MemoryStorage::new());
        let repo = LocalRepository::open(storage.clone()).await;
        (storage, repo)
    }

    #[tokio::test]
    async fn test_add_task_persists_whole_collection() {
        let (storage, repo) = repo().await;
        let mut data = NewTaskData::new("Aria", "  Boss run ", Frequency::Weekly);
        data.priority = Some(TaskPriority::High);
        let task = repo.add_task(data).await.unwrap();

        assert_eq!(task.name, "Boss run");
        assert!(!task.completed);

        let raw = storage.get(StorageKey::Tasks).await.unwrap().unwrap();
        let stored: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(stored[0]["id"], task.id.as_str());
        assert_eq!(stored[0]["frequency"], "weekly");
        assert_eq!(stored[0]["priority"], "high");
    }

    #[rstest]
    #[case("", "Aria")]
    #[case("Farm", "   ")]
    #[tokio::test]
    async fn test_add_task_rejects_blank_fields(#[case] name: &str, #[case] character: &str) {
        let (_, repo) = repo().await;
        let result = repo.add_task(NewTaskData::new(character, name, Frequency::Daily)).await;
        assert!(result.is_err());
        assert!(repo.tasks().await.is_empty());
    }

    #[tokio::test]
    async fn test_set_completed_stamps_completion_time() {
        let (_, repo) = repo().await;
        let task = repo.add_task(NewTaskData::new("Aria", "Farm", Frequency::Daily)).await.unwrap();
        let at = Utc.with_ymd_and_hms(2024, 3, 6, 12, 0, 0).unwrap();

        let done = repo.set_completed(&task.id, true, at).await.unwrap();
        assert!(done.completed);
        assert_eq!(done.last_completed_at, Some(StoredInstant::Valid(at)));

        let undone = repo.set_completed(&task.id, false, at).await.unwrap();
        assert!(!undone.completed);
    }

    #[tokio::test]
    async fn test_update_and_remove_task() {
        let (_, repo) = repo().await;
        let task = repo.add_task(NewTaskData::new("Aria", "Farm", Frequency::Daily)).await.unwrap();

        let updated = repo
            .update_task(
                &task.id,
                UpdateTaskData {
                    frequency: Some(Frequency::Monthly),
                    note: Some(Some("bring potions".to_string())),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.frequency, Frequency::Monthly);
        assert_eq!(updated.note.as_deref(), Some("bring potions"));

        repo.remove_task(&task.id).await.unwrap();
        assert!(repo.find_task(&task.id).await.is_none());
        assert!(repo.remove_task(&task.id).await.is_err());
    }

    #[tokio::test]
    async fn test_find_by_short_id() {
        let (_, repo) = repo().await;
        let task = repo.add_task(NewTaskData::new("Aria", "Farm", Frequency::Daily)).await.unwrap();
        let tail = &task.id[task.id.len() - 8..];
        assert_eq!(repo.find_tasks_by_short_id(tail).await.len(), 1);
        let head = repo.find_tasks_by_short_id(&task.id[..8]).await;
        assert!(head.iter().any(|t| t.id == task.id));
        assert!(repo.find_tasks_by_short_id("").await.is_empty());
    }

    #[tokio::test]
    async fn test_add_tasks_gives_distinct_ids() {
        let (_, repo) = repo().await;
        let added = repo
            .add_tasks(vec![
                NewTaskData::new("Aria", "One", Frequency::Daily),
                NewTaskData::new("Aria", "Two", Frequency::Daily),
            ])
            .await
            .unwrap();
        assert_eq!(added.len(), 2);
        assert_ne!(added[0].id, added[1].id);
    }
}
