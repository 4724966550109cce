//! Entity services: the CRUD surface the protocol layer consumes.
//!
//! Every service is a cheap clone over the shared [`Store`]. Reads take the
//! store's read lock; every mutation runs inside one transaction.

mod criteria;
mod epics;
mod prompts;
mod requirements;
mod search;
mod status_models;
mod steering;
mod user_stories;

pub use criteria::{AcceptanceCriteriaService, AcceptanceCriteriaUpdate, NewAcceptanceCriteria};
pub use epics::{EpicFilter, EpicHierarchy, EpicService, EpicUpdate, NewEpic, StoryNode};
pub use prompts::{NewPrompt, PromptService};
pub use requirements::{
    NewRelationship, NewRequirement, RequirementFilter, RequirementRelationships,
    RequirementService, RequirementUpdate,
};
pub use search::{SearchFilters, SearchHit, SearchResults, SearchService};
pub use status_models::StatusModelService;
pub use steering::{NewSteeringDocument, SteeringDocumentUpdate, SteeringService};
pub use user_stories::{NewUserStory, UserStoryFilter, UserStoryService, UserStoryUpdate};

use crate::deletion::DeletionEngine;
use crate::error::{DomainError, DomainResult};
use crate::status::StatusRegistry;
use crate::storage::Store;
use crate::types::{EntityKind, Priority};

/// All entity services over one store
#[derive(Clone)]
pub struct Services {
    store: Store,
    pub epics: EpicService,
    pub user_stories: UserStoryService,
    pub acceptance_criteria: AcceptanceCriteriaService,
    pub requirements: RequirementService,
    pub prompts: PromptService,
    pub steering: SteeringService,
    pub search: SearchService,
    pub status_models: StatusModelService,
    pub deletion: DeletionEngine,
}

impl Services {
    pub fn new(store: Store) -> Self {
        let deletion = DeletionEngine::new(store.clone());
        Self {
            epics: EpicService::new(store.clone()),
            user_stories: UserStoryService::new(store.clone()),
            acceptance_criteria: AcceptanceCriteriaService::new(store.clone(), deletion.clone()),
            requirements: RequirementService::new(store.clone()),
            prompts: PromptService::new(store.clone()),
            steering: SteeringService::new(store.clone()),
            search: SearchService::new(store.clone()),
            status_models: StatusModelService::new(store.clone()),
            deletion,
            store,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }
}

pub(crate) fn required_text(field: &str, value: &str) -> DomainResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DomainError::ValidationFailed(format!("{} must not be empty", field)));
    }
    Ok(trimmed.to_string())
}

pub(crate) fn priority_or_default(value: Option<i64>) -> DomainResult<Priority> {
    value.map(Priority::new).transpose().map(Option::unwrap_or_default)
}

/// Apply a requested status change through the default model's edge set
pub(crate) fn transition(
    registry: &StatusRegistry,
    kind: EntityKind,
    current: &mut String,
    requested: Option<String>,
) -> DomainResult<()> {
    if let Some(next) = requested {
        registry.validate_transition(kind, current, &next)?;
        *current = next;
    }
    Ok(())
}

/// Filter-then-paginate helper returning (page, total)
pub(crate) fn paginate<T: Clone>(items: Vec<T>, page: crate::types::Page) -> (Vec<T>, usize) {
    let total = items.len();
    (page.apply(&items), total)
}
