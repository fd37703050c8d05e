use crate::error::CoreError;
use crate::models::{EnabledTasks, PresetScope, StoredInstant, TaskPreset};
use crate::repository::LocalRepository;
use crate::storage::StorageKey;
use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, warn};

#[async_trait]
impl super::PresetRepository for LocalRepository {
    async fn enabled_tasks(&self) -> EnabledTasks {
        self.lock().await.enabled.clone()
    }

    async fn set_task_enabled(&self, character: &str, template: &str, enabled: bool) -> Result<(), CoreError> {
        if character.trim().is_empty() || template.trim().is_empty() {
            return Err(CoreError::InvalidInput(
                "Character and task name are required".to_string(),
            ));
        }
        let mut state = self.lock().await;
        state
            .enabled
            .entry(character.to_string())
            .or_default()
            .insert(template.to_string(), enabled);
        self.commit(&mut state, &[StorageKey::EnabledTasks]).await;
        Ok(())
    }

    async fn presets(&self) -> Vec<TaskPreset> {
        self.lock().await.presets.clone()
    }

    async fn save_preset(&self, name: &str, from_character: &str) -> Result<TaskPreset, CoreError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CoreError::InvalidInput("Preset name cannot be empty".to_string()));
        }

        let mut state = self.lock().await;
        state.roster_member(from_character)?;
        let preset = TaskPreset {
            name: name.to_string(),
            enabled: state.enabled.get(from_character).cloned().unwrap_or_default(),
            created_at: StoredInstant::Valid(Utc::now()),
        };
        match state.presets.iter_mut().find(|p| p.name == name) {
            Some(existing) => *existing = preset.clone(),
            None => state.presets.push(preset.clone()),
        }
        info!(preset = %name, from = %from_character, "saved preset");
        self.commit(&mut state, &[StorageKey::TaskPresets]).await;
        Ok(preset)
    }

    async fn delete_preset(&self, name: &str) -> Result<TaskPreset, CoreError> {
        let mut state = self.lock().await;
        let index = state
            .presets
            .iter()
            .position(|p| p.name == name)
            .ok_or_else(|| CoreError::PresetNotFound(name.to_string()))?;
        let removed = state.presets.remove(index);
        self.commit(&mut state, &[StorageKey::TaskPresets]).await;
        Ok(removed)
    }

    async fn apply_preset(&self, name: &str, scope: PresetScope) -> Result<(), CoreError> {
        let mut state = self.lock().await;
        let Some(preset) = state.presets.iter().find(|p| p.name == name).cloned() else {
            warn!(preset = %name, "preset not found; nothing applied");
            return Err(CoreError::PresetNotFound(name.to_string()));
        };

        let targets: Vec<String> = match scope {
            PresetScope::Character(character) => {
                state.roster_member(&character)?;
                vec![character]
            }
            PresetScope::Roster => state.characters.iter().map(|c| c.name.clone()).collect(),
        };
        for character in &targets {
            state.enabled.insert(character.clone(), preset.enabled.clone());
        }

        info!(preset = %name, characters = targets.len(), "applied preset");
        self.commit(&mut state, &[StorageKey::EnabledTasks]).await;
        Ok(())
    }
}
