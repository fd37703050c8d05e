use crate::error::CoreError;
use crate::ids::fresh_id;
use crate::models::{Character, NewCharacterData, UpdateCharacterData};
use crate::repository::{LocalRepository, RepositoryState};
use crate::storage::StorageKey;
use async_trait::async_trait;
use std::collections::HashSet;
use tracing::info;

impl RepositoryState {
    fn character_index(&self, id: &str) -> Result<usize, CoreError> {
        self.characters
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| CoreError::NotFound(format!("Character with id {} not found", id)))
    }

    /// Fails when no roster character has this name.
    pub(crate) fn roster_member(&self, name: &str) -> Result<(), CoreError> {
        if self.characters.iter().any(|c| c.name == name) {
            Ok(())
        } else {
            Err(CoreError::NotFound(format!("No character named '{}'", name)))
        }
    }

    fn name_taken(&self, name: &str, except_id: Option<&str>) -> bool {
        self.characters
            .iter()
            .any(|c| c.name == name && Some(c.id.as_str()) != except_id)
    }

    /// Moves every name-keyed reference from `old` to `new`.
    /// Returns the keys that changed.
    fn rename_references(&mut self, old: &str, new: &str) -> Vec<StorageKey> {
        let mut changed = Vec::new();

        let mut tasks_changed = false;
        for task in self.tasks.iter_mut().filter(|t| t.character == old) {
            task.character = new.to_string();
            tasks_changed = true;
        }
        if tasks_changed {
            changed.push(StorageKey::Tasks);
        }

        if let Some(flags) = self.enabled.remove(old) {
            self.enabled.insert(new.to_string(), flags);
            changed.push(StorageKey::EnabledTasks);
        }

        if self.view.hidden_characters.remove(old) {
            self.view.hidden_characters.insert(new.to_string());
            changed.push(StorageKey::HiddenCharacters);
        }

        let mut order_changed = false;
        for entry in self.view.character_order.iter_mut().filter(|n| n.as_str() == old) {
            *entry = new.to_string();
            order_changed = true;
        }
        if order_changed {
            changed.push(StorageKey::CharacterOrder);
        }

        changed
    }
}

fn clean_name(name: &str) -> Result<String, CoreError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(CoreError::InvalidInput("Character name cannot be empty".to_string()));
    }
    Ok(name.to_string())
}

#[async_trait]
impl super::CharacterRepository for LocalRepository {
    async fn characters(&self) -> Vec<Character> {
        self.lock().await.characters.clone()
    }

    async fn find_character(&self, id_or_name: &str) -> Option<Character> {
        let state = self.lock().await;
        state
            .characters
            .iter()
            .find(|c| c.id == id_or_name)
            .or_else(|| state.characters.iter().find(|c| c.name == id_or_name))
            .cloned()
    }

    async fn add_character(&self, data: NewCharacterData) -> Result<Character, CoreError> {
        let name = clean_name(&data.name)?;
        let mut state = self.lock().await;
        if state.name_taken(&name, None) {
            return Err(CoreError::InvalidInput(format!("A character named '{}' already exists", name)));
        }

        let taken: HashSet<String> = state.characters.iter().map(|c| c.id.clone()).collect();
        let order = state.characters.iter().map(|c| c.order.saturating_add(1)).max().unwrap_or(0);
        if data.is_main {
            state.characters.iter_mut().for_each(|c| c.is_main = false);
        }

        let character = Character {
            id: fresh_id(&taken),
            name,
            level: data.level.unwrap_or(1),
            exp: data.exp.unwrap_or(0),
            is_main: data.is_main,
            order,
        };
        state.characters.push(character.clone());
        self.commit(&mut state, &[StorageKey::Roster]).await;
        Ok(character)
    }

    async fn update_character(&self, id: &str, data: UpdateCharacterData) -> Result<Character, CoreError> {
        let new_name = data.name.as_deref().map(clean_name).transpose()?;
        let mut state = self.lock().await;
        let index = state.character_index(id)?;

        let mut keys = vec![StorageKey::Roster];
        if let Some(new_name) = new_name {
            let old_name = state.characters[index].name.clone();
            if new_name != old_name {
                if state.name_taken(&new_name, Some(id)) {
                    return Err(CoreError::InvalidInput(format!(
                        "A character named '{}' already exists",
                        new_name
                    )));
                }
                keys.extend(state.rename_references(&old_name, &new_name));
                info!(from = %old_name, to = %new_name, "renamed character");
                state.characters[index].name = new_name;
            }
        }

        let character = &mut state.characters[index];
        if let Some(level) = data.level {
            character.level = level;
        }
        if let Some(exp) = data.exp {
            character.exp = exp;
        }
        let updated = character.clone();

        self.commit(&mut state, &keys).await;
        Ok(updated)
    }

    async fn remove_character(&self, id: &str) -> Result<Character, CoreError> {
        let mut state = self.lock().await;
        let index = state.character_index(id)?;
        let removed = state.characters.remove(index);

        // Tasks and enabled flags stay; they are reachable again if the name returns.
        let mut keys = vec![StorageKey::Roster];
        if state.view.hidden_characters.remove(&removed.name) {
            keys.push(StorageKey::HiddenCharacters);
        }
        let before = state.view.character_order.len();
        state.view.character_order.retain(|n| n != &removed.name);
        if state.view.character_order.len() != before {
            keys.push(StorageKey::CharacterOrder);
        }

        self.commit(&mut state, &keys).await;
        Ok(removed)
    }

    async fn set_main(&self, id: &str) -> Result<Character, CoreError> {
        let mut state = self.lock().await;
        let index = state.character_index(id)?;
        for (i, character) in state.characters.iter_mut().enumerate() {
            character.is_main = i == index;
        }
        let main = state.characters[index].clone();
        self.commit(&mut state, &[StorageKey::Roster]).await;
        Ok(main)
    }
}

#[cfg(test)]
mod tests {
    use crate::models::{Frequency, NewCharacterData, NewTaskData, PresetScope, UpdateCharacterData};
    use crate::repository::{CharacterRepository, LocalRepository, PresetRepository, TaskRepository, ViewStateRepository};
    use crate::storage::{MemoryStorage, StorageBackend, StorageKey};
    use std::sync::Arc;
    use uuid::Uuid;

    fn named(name: &str) -> NewCharacterData {
        NewCharacterData {
            name: name.to_string(),
            ..Default::default()
        }
    }

    async fn repo() -> LocalRepository {
        LocalRepository::open(Arc::new(MemoryStorage::new())).await
    }

    #[tokio::test]
    async fn test_add_character_defaults_and_order() {
        let repo = repo().await;
        let aria = repo.add_character(named("Aria")).await.unwrap();
        let bram = repo.add_character(named("Bram")).await.unwrap();

        assert_eq!(aria.level, 1);
        assert_eq!(aria.order, 0);
        assert_eq!(bram.order, 1);
        assert!(repo.add_character(named("Aria")).await.is_err());
        assert!(repo.add_character(named("  ")).await.is_err());
    }

    #[tokio::test]
    async fn test_add_after_largest_stored_order() {
        let storage = Arc::new(MemoryStorage::new());
        storage
            .set(
                StorageKey::Roster,
                r#"[{"id":"a","name":"Aria","order":4294967295}]"#.to_string(),
                Uuid::nil(),
            )
            .await
            .unwrap();
        let repo = LocalRepository::open(storage).await;

        let bram = repo.add_character(named("Bram")).await.unwrap();
        assert_eq!(bram.order, u32::MAX);
        assert_eq!(repo.characters().await.len(), 2);
    }

    #[tokio::test]
    async fn test_at_most_one_main() {
        let repo = repo().await;
        let aria = repo
            .add_character(NewCharacterData {
                is_main: true,
                ..named("Aria")
            })
            .await
            .unwrap();
        let bram = repo
            .add_character(NewCharacterData {
                is_main: true,
                ..named("Bram")
            })
            .await
            .unwrap();
        assert_eq!(repo.characters().await.iter().filter(|c| c.is_main).count(), 1);

        repo.set_main(&aria.id).await.unwrap();
        let roster = repo.characters().await;
        assert!(roster.iter().find(|c| c.id == aria.id).unwrap().is_main);
        assert!(!roster.iter().find(|c| c.id == bram.id).unwrap().is_main);
    }

    #[tokio::test]
    async fn test_rename_cascades_to_name_keyed_state() {
        let repo = repo().await;
        let aria = repo.add_character(named("Aria")).await.unwrap();
        repo.add_task(NewTaskData::new("Aria", "Farm", Frequency::Daily)).await.unwrap();
        repo.set_task_enabled("Aria", "Guild raid", true).await.unwrap();
        repo.set_hidden("Aria", true).await.unwrap();
        repo.set_character_order(vec!["Aria".to_string()]).await.unwrap();

        repo.update_character(
            &aria.id,
            UpdateCharacterData {
                name: Some("Aurora".to_string()),
                level: Some(60),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(repo.tasks().await[0].character, "Aurora");
        let enabled = repo.enabled_tasks().await;
        assert!(enabled.contains_key("Aurora"));
        assert!(!enabled.contains_key("Aria"));
        let view = repo.view_state().await;
        assert!(view.hidden_characters.contains("Aurora"));
        assert_eq!(view.character_order, vec!["Aurora".to_string()]);
        assert_eq!(repo.find_character("Aurora").await.unwrap().level, 60);
    }

    #[tokio::test]
    async fn test_remove_character_keeps_tasks() {
        let repo = repo().await;
        let aria = repo.add_character(named("Aria")).await.unwrap();
        repo.add_task(NewTaskData::new("Aria", "Farm", Frequency::Daily)).await.unwrap();
        repo.save_preset("solo", "Aria").await.unwrap();
        repo.apply_preset("solo", PresetScope::Roster).await.unwrap();

        repo.remove_character(&aria.id).await.unwrap();
        assert!(repo.characters().await.is_empty());
        assert_eq!(repo.tasks().await.len(), 1);
        assert!(repo.remove_character(&aria.id).await.is_err());
    }
}
