use super::{paginate, required_text};
use crate::access::{Action, Actor};
use crate::deletion::{DeletionEngine, DeletionResult};
use crate::error::DomainResult;
use crate::storage::Store;
use crate::types::{AcceptanceCriteria, EntityKind, Page, RefPrefix};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAcceptanceCriteria {
    pub user_story_id: String,
    pub description: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AcceptanceCriteriaUpdate {
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Clone)]
pub struct AcceptanceCriteriaService {
    store: Store,
    deletion: DeletionEngine,
}

impl AcceptanceCriteriaService {
    pub fn new(store: Store, deletion: DeletionEngine) -> Self {
        Self { store, deletion }
    }

    pub async fn get(&self, key: &str) -> DomainResult<AcceptanceCriteria> {
        self.store.read().await.criteria(key).cloned()
    }

    /// Criteria, optionally restricted to one story, in creation order
    pub async fn list(
        &self,
        user_story: Option<&str>,
        page: Page,
    ) -> DomainResult<(Vec<AcceptanceCriteria>, usize)> {
        let state = self.store.read().await;
        let criteria: Vec<AcceptanceCriteria> = match user_story {
            Some(key) => {
                let story_id = state.user_story(key)?.id;
                state.criteria_of_story(story_id).into_iter().cloned().collect()
            }
            None => {
                let mut all: Vec<_> = state.acceptance_criteria.values().cloned().collect();
                all.sort_by_key(|c| (c.created_at, c.id));
                all
            }
        };
        Ok(paginate(criteria, page))
    }

    pub async fn create(
        &self,
        new: NewAcceptanceCriteria,
        actor: &Actor,
    ) -> DomainResult<AcceptanceCriteria> {
        actor.authorize(Action::Create, "create acceptance criteria")?;
        let description = required_text("description", &new.description)?;

        let criteria = self
            .store
            .within_transaction(|state| {
                let user_story_id = state.user_story(&new.user_story_id)?.id;
                let now = Utc::now();
                let criteria = AcceptanceCriteria {
                    id: Uuid::new_v4(),
                    reference_id: state.next_reference(RefPrefix::Ac),
                    user_story_id,
                    description,
                    author_id: actor.user_id,
                    created_at: now,
                    updated_at: now,
                };
                state.acceptance_criteria.insert(criteria.id, criteria.clone());
                Ok(criteria)
            })
            .await?;

        tracing::info!(reference_id = %criteria.reference_id, "Created acceptance criteria");
        Ok(criteria)
    }

    pub async fn update(
        &self,
        key: &str,
        update: AcceptanceCriteriaUpdate,
        actor: &Actor,
    ) -> DomainResult<AcceptanceCriteria> {
        actor.authorize(Action::Update, "update acceptance criteria")?;
        let description = update
            .description
            .as_deref()
            .map(|d| required_text("description", d))
            .transpose()?;

        self.store
            .within_transaction(|state| {
                let mut criteria = state.criteria(key)?.clone();
                if let Some(description) = description {
                    criteria.description = description;
                }
                criteria.updated_at = Utc::now();
                state.acceptance_criteria.insert(criteria.id, criteria.clone());
                Ok(criteria)
            })
            .await
    }

    /// Delete through the dependency engine; the last criteria of a story needs `force`
    pub async fn delete(&self, key: &str, actor: &Actor, force: bool) -> DomainResult<DeletionResult> {
        self.deletion
            .delete(EntityKind::AcceptanceCriteria, key, actor, force)
            .await
    }
}
