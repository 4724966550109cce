use super::{paginate, required_text};
use crate::access::{Action, Actor};
use crate::error::{DomainError, DomainResult};
use crate::storage::{Store, StoreState};
use crate::types::{Page, Prompt, RefPrefix};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewPrompt {
    pub name: String,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Stored prompt templates; at most one is active at a time
#[derive(Clone)]
pub struct PromptService {
    store: Store,
}

impl PromptService {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// By UUID, reference id or unique name
    pub async fn get(&self, key: &str) -> DomainResult<Prompt> {
        self.store.read().await.prompt(key).cloned()
    }

    pub async fn list(&self, page: Page) -> (Vec<Prompt>, usize) {
        let state = self.store.read().await;
        let mut prompts: Vec<Prompt> = state.prompts.values().cloned().collect();
        prompts.sort_by_key(|p| (p.created_at, p.id));
        paginate(prompts, page)
    }

    pub async fn active(&self) -> Option<Prompt> {
        self.store.read().await.active_prompt().cloned()
    }

    pub async fn create(&self, new: NewPrompt, actor: &Actor) -> DomainResult<Prompt> {
        actor.authorize(Action::Create, "create prompt")?;
        let name = required_text("name", &new.name)?;
        let title = required_text("title", &new.title)?;
        let content = required_text("content", &new.content)?;

        let prompt = self
            .store
            .within_transaction(|state| {
                ensure_unique_name(state, &name)?;
                let now = Utc::now();
                let prompt = Prompt {
                    id: Uuid::new_v4(),
                    reference_id: state.next_reference(RefPrefix::Prompt),
                    name,
                    title,
                    content,
                    description: new.description,
                    active: false,
                    creator_id: actor.user_id,
                    created_at: now,
                    updated_at: now,
                };
                state.prompts.insert(prompt.id, prompt.clone());
                Ok(prompt)
            })
            .await?;

        tracing::info!(reference_id = %prompt.reference_id, name = %prompt.name, "Created prompt");
        Ok(prompt)
    }

    /// Activate one prompt, deactivating every other
    pub async fn activate(&self, key: &str, actor: &Actor) -> DomainResult<Prompt> {
        actor.authorize(Action::Update, "activate prompt")?;
        let prompt = self
            .store
            .within_transaction(|state| {
                let id = state.prompt(key)?.id;
                let now = Utc::now();
                for prompt in state.prompts.values_mut() {
                    let active = prompt.id == id;
                    if prompt.active != active {
                        prompt.active = active;
                        prompt.updated_at = now;
                    }
                }
                state
                    .prompts
                    .get(&id)
                    .cloned()
                    .ok_or_else(|| DomainError::Internal("activated prompt vanished".into()))
            })
            .await?;

        tracing::info!(reference_id = %prompt.reference_id, "Activated prompt");
        Ok(prompt)
    }

    pub async fn delete(&self, key: &str, actor: &Actor) -> DomainResult<Prompt> {
        actor.authorize(Action::Delete, "delete prompt")?;
        self.store
            .within_transaction(|state| {
                let id = state.prompt(key)?.id;
                state
                    .prompts
                    .remove(&id)
                    .ok_or_else(|| DomainError::Internal("prompt vanished".into()))
            })
            .await
    }
}

fn ensure_unique_name(state: &StoreState, name: &str) -> DomainResult<()> {
    if state.prompts.values().any(|p| p.name == name) {
        return Err(DomainError::conflict_with_hint(
            format!("prompt '{}' already exists", name),
            "choose a different name or update the existing prompt",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::UserRole;

    fn new_prompt(name: &str) -> NewPrompt {
        NewPrompt {
            name: name.into(),
            title: format!("{} prompt", name),
            content: "You are a requirements analyst.".into(),
            description: None,
        }
    }

    #[tokio::test]
    async fn test_names_are_unique() {
        let prompts = PromptService::new(Store::in_memory());
        let actor = Actor::new(Uuid::new_v4(), "pm", UserRole::User);

        let created = prompts.create(new_prompt("triage"), &actor).await.unwrap();
        assert_eq!(created.reference_id.to_string(), "PROMPT-001");
        assert!(!created.active);

        let err = prompts.create(new_prompt("triage"), &actor).await.unwrap_err();
        assert!(matches!(err, DomainError::Conflict { hint: Some(_), .. }));
        assert_eq!(prompts.get("triage").await.unwrap().id, created.id);
    }

    #[tokio::test]
    async fn test_single_active_prompt() {
        let prompts = PromptService::new(Store::in_memory());
        let actor = Actor::new(Uuid::new_v4(), "pm", UserRole::User);
        prompts.create(new_prompt("first"), &actor).await.unwrap();
        prompts.create(new_prompt("second"), &actor).await.unwrap();
        assert!(prompts.active().await.is_none());

        prompts.activate("PROMPT-001", &actor).await.unwrap();
        prompts.activate("second", &actor).await.unwrap();

        let (all, _) = prompts.list(Page::default()).await;
        assert_eq!(all.iter().filter(|p| p.active).count(), 1);
        assert_eq!(prompts.active().await.unwrap().name, "second");

        prompts.delete("second", &actor).await.unwrap();
        assert!(prompts.active().await.is_none());
    }
}
