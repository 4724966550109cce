use super::{paginate, priority_or_default, required_text, transition};
use crate::access::{Action, Actor};
use crate::error::DomainResult;
use crate::storage::Store;
use crate::types::{AcceptanceCriteria, EntityKind, Epic, Page, RefPrefix, Requirement, UserStory};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewEpic {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Option<i64>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub assignee_id: Option<Uuid>,
}

impl NewEpic {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EpicUpdate {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Option<i64>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub assignee_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default)]
pub struct EpicFilter {
    pub status: Option<String>,
    pub assignee_id: Option<Uuid>,
}

/// Epic with its stories, each carrying criteria and requirements
#[derive(Debug, Clone, Serialize)]
pub struct EpicHierarchy {
    #[serde(flatten)]
    pub epic: Epic,
    pub user_stories: Vec<StoryNode>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoryNode {
    #[serde(flatten)]
    pub story: UserStory,
    pub acceptance_criteria: Vec<AcceptanceCriteria>,
    pub requirements: Vec<Requirement>,
}

#[derive(Clone)]
pub struct EpicService {
    store: Store,
}

impl EpicService {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub async fn get(&self, key: &str) -> DomainResult<Epic> {
        self.store.read().await.epic(key).cloned()
    }

    pub async fn list(&self, filter: &EpicFilter, page: Page) -> DomainResult<(Vec<Epic>, usize)> {
        let state = self.store.read().await;
        let mut epics: Vec<Epic> = state
            .epics
            .values()
            .filter(|e| filter.status.as_ref().map_or(true, |s| &e.status == s))
            .filter(|e| filter.assignee_id.map_or(true, |a| e.assignee_id == Some(a)))
            .cloned()
            .collect();
        epics.sort_by_key(|e| (e.created_at, e.id));
        Ok(paginate(epics, page))
    }

    pub async fn create(&self, new: NewEpic, actor: &Actor) -> DomainResult<Epic> {
        actor.authorize(Action::Create, "create epic")?;
        let title = required_text("title", &new.title)?;
        let priority = priority_or_default(new.priority)?;

        let epic = self
            .store
            .within_transaction(|state| {
                let status = state
                    .status_models
                    .resolve_initial(EntityKind::Epic, new.status.as_deref())?;
                let now = Utc::now();
                let epic = Epic {
                    id: Uuid::new_v4(),
                    reference_id: state.next_reference(RefPrefix::Ep),
                    title,
                    description: new.description,
                    status,
                    priority,
                    creator_id: actor.user_id,
                    assignee_id: new.assignee_id,
                    created_at: now,
                    updated_at: now,
                };
                state.epics.insert(epic.id, epic.clone());
                Ok(epic)
            })
            .await?;

        tracing::info!(reference_id = %epic.reference_id, "Created epic");
        Ok(epic)
    }

    pub async fn update(&self, key: &str, update: EpicUpdate, actor: &Actor) -> DomainResult<Epic> {
        actor.authorize(Action::Update, "update epic")?;
        let title = update.title.as_deref().map(|t| required_text("title", t)).transpose()?;
        let priority = update.priority.map(crate::types::Priority::new).transpose()?;

        self.store
            .within_transaction(|state| {
                let id = state.epic(key)?.id;
                let mut epic = state.epic(key)?.clone();
                transition(&state.status_models, EntityKind::Epic, &mut epic.status, update.status)?;
                if let Some(title) = title {
                    epic.title = title;
                }
                if let Some(description) = update.description {
                    epic.description = Some(description);
                }
                if let Some(priority) = priority {
                    epic.priority = priority;
                }
                if let Some(assignee) = update.assignee_id {
                    epic.assignee_id = Some(assignee);
                }
                epic.updated_at = Utc::now();
                state.epics.insert(id, epic.clone());
                Ok(epic)
            })
            .await
    }

    pub async fn hierarchy(&self, key: &str) -> DomainResult<EpicHierarchy> {
        let state = self.store.read().await;
        let epic = state.epic(key)?.clone();
        let user_stories = state
            .stories_of_epic(epic.id)
            .into_iter()
            .map(|story| StoryNode {
                acceptance_criteria: state.criteria_of_story(story.id).into_iter().cloned().collect(),
                requirements: state.requirements_of_story(story.id).into_iter().cloned().collect(),
                story: story.clone(),
            })
            .collect();
        Ok(EpicHierarchy { epic, user_stories })
    }
}
