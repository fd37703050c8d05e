use crate::error::CoreError;
use crate::models::ViewState;
use crate::repository::LocalRepository;
use crate::storage::StorageKey;
use async_trait::async_trait;

#[async_trait]
impl super::ViewStateRepository for LocalRepository {
    async fn view_state(&self) -> ViewState {
        self.lock().await.view.clone()
    }

    async fn set_hidden(&self, character: &str, hidden: bool) -> Result<bool, CoreError> {
        let mut state = self.lock().await;
        let changed = if hidden {
            state.view.hidden_characters.insert(character.to_string())
        } else {
            state.view.hidden_characters.remove(character)
        };
        if changed {
            self.commit(&mut state, &[StorageKey::HiddenCharacters]).await;
        }
        Ok(changed)
    }

    async fn set_character_order(&self, order: Vec<String>) -> Result<(), CoreError> {
        let mut seen = std::collections::HashSet::new();
        let order: Vec<String> = order.into_iter().filter(|name| seen.insert(name.clone())).collect();

        let mut state = self.lock().await;
        state.view.character_order = order;
        self.commit(&mut state, &[StorageKey::CharacterOrder]).await;
        Ok(())
    }

    async fn toggle_section(&self, section: &str) -> Result<bool, CoreError> {
        let mut state = self.lock().await;
        let flag = state.view.collapsed_sections.entry(section.to_string()).or_insert(false);
        *flag = !*flag;
        let collapsed = *flag;
        self.commit(&mut state, &[StorageKey::CollapsedSections]).await;
        Ok(collapsed)
    }

    async fn toggle_expanded(&self, list: &str) -> Result<bool, CoreError> {
        let mut state = self.lock().await;
        let flag = state.view.expanded_lists.entry(list.to_string()).or_insert(false);
        *flag = !*flag;
        let expanded = *flag;
        self.commit(&mut state, &[StorageKey::ExpandedLists]).await;
        Ok(expanded)
    }
}
