use super::{paginate, priority_or_default, required_text, transition};
use crate::access::{Action, Actor};
use crate::error::DomainResult;
use crate::storage::Store;
use crate::types::{EntityKind, Page, Priority, RefPrefix, UserStory};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewUserStory {
    /// UUID or reference id of the owning epic
    pub epic_id: String,
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

impl NewUserStory {
    pub fn titled(epic_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            epic_id: epic_id.into(),
            title: title.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserStoryUpdate {
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
pub struct UserStoryFilter {
    pub epic_id: Option<String>,
    pub status: Option<String>,
}

#[derive(Clone)]
pub struct UserStoryService {
    store: Store,
}

impl UserStoryService {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub async fn get(&self, key: &str) -> DomainResult<UserStory> {
        self.store.read().await.user_story(key).cloned()
    }

    pub async fn list(
        &self,
        filter: &UserStoryFilter,
        page: Page,
    ) -> DomainResult<(Vec<UserStory>, usize)> {
        let state = self.store.read().await;
        let epic_id = filter
            .epic_id
            .as_deref()
            .map(|key| state.epic(key).map(|e| e.id))
            .transpose()?;

        let mut stories: Vec<UserStory> = state
            .user_stories
            .values()
            .filter(|s| epic_id.map_or(true, |id| s.epic_id == id))
            .filter(|s| filter.status.as_ref().map_or(true, |st| &s.status == st))
            .cloned()
            .collect();
        stories.sort_by_key(|s| (s.created_at, s.id));
        Ok(paginate(stories, page))
    }

    pub async fn create(&self, new: NewUserStory, actor: &Actor) -> DomainResult<UserStory> {
        actor.authorize(Action::Create, "create user story")?;
        let title = required_text("title", &new.title)?;
        let priority = priority_or_default(new.priority)?;

        let story = self
            .store
            .within_transaction(|state| {
                let epic_id = state.epic(&new.epic_id)?.id;
                let status = state
                    .status_models
                    .resolve_initial(EntityKind::UserStory, new.status.as_deref())?;
                let now = Utc::now();
                let story = UserStory {
                    id: Uuid::new_v4(),
                    reference_id: state.next_reference(RefPrefix::Us),
                    epic_id,
                    title,
                    description: new.description,
                    status,
                    priority,
                    creator_id: actor.user_id,
                    assignee_id: new.assignee_id,
                    created_at: now,
                    updated_at: now,
                };
                state.user_stories.insert(story.id, story.clone());
                Ok(story)
            })
            .await?;

        tracing::info!(reference_id = %story.reference_id, epic_id = %story.epic_id, "Created user story");
        Ok(story)
    }

    pub async fn update(
        &self,
        key: &str,
        update: UserStoryUpdate,
        actor: &Actor,
    ) -> DomainResult<UserStory> {
        actor.authorize(Action::Update, "update user story")?;
        let title = update.title.as_deref().map(|t| required_text("title", t)).transpose()?;
        let priority = update.priority.map(Priority::new).transpose()?;

        self.store
            .within_transaction(|state| {
                let mut story = state.user_story(key)?.clone();
                transition(
                    &state.status_models,
                    EntityKind::UserStory,
                    &mut story.status,
                    update.status,
                )?;
                if let Some(title) = title {
                    story.title = title;
                }
                if let Some(description) = update.description {
                    story.description = Some(description);
                }
                if let Some(priority) = priority {
                    story.priority = priority;
                }
                if let Some(assignee) = update.assignee_id {
                    story.assignee_id = Some(assignee);
                }
                story.updated_at = Utc::now();
                state.user_stories.insert(story.id, story.clone());
                Ok(story)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::UserRole;
    use crate::error::DomainError;
    use crate::services::{EpicService, NewEpic};

    #[tokio::test]
    async fn test_story_requires_existing_epic() {
        let store = Store::in_memory();
        let stories = UserStoryService::new(store.clone());
        let actor = Actor::new(Uuid::new_v4(), "dev", UserRole::User);

        let err = stories
            .create(NewUserStory::titled("EP-404", "Orphan"), &actor)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound { .. }));

        EpicService::new(store)
            .create(NewEpic::titled("Payments"), &actor)
            .await
            .unwrap();
        let story = stories
            .create(NewUserStory::titled("EP-001", "Pay by card"), &actor)
            .await
            .unwrap();
        assert_eq!(story.reference_id.to_string(), "US-001");
        assert_eq!(story.status, "Backlog");

        let (by_epic, total) = stories
            .list(
                &UserStoryFilter {
                    epic_id: Some("EP-001".into()),
                    ..Default::default()
                },
                Page::default(),
            )
            .await
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(by_epic[0].id, story.id);
    }

    #[tokio::test]
    async fn test_commenter_cannot_create() {
        let store = Store::in_memory();
        let commenter = Actor::new(Uuid::new_v4(), "viewer", UserRole::Commenter);
        let err = UserStoryService::new(store)
            .create(NewUserStory::titled("EP-001", "Nope"), &commenter)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_same_status_update_is_a_transition() {
        let store = Store::in_memory();
        let actor = Actor::new(Uuid::new_v4(), "dev", UserRole::User);
        EpicService::new(store.clone())
            .create(NewEpic::titled("Search"), &actor)
            .await
            .unwrap();
        let stories = UserStoryService::new(store);
        stories
            .create(NewUserStory::titled("EP-001", "Facets"), &actor)
            .await
            .unwrap();

        let err = stories
            .update(
                "US-001",
                UserStoryUpdate {
                    status: Some("Backlog".into()),
                    ..Default::default()
                },
                &actor,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidTransition { .. }));
    }
}
