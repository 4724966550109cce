use super::{paginate, priority_or_default, required_text, transition};
use crate::access::{Action, Actor};
use crate::error::{DomainError, DomainResult};
use crate::storage::{Store, StoreState};
use crate::types::{
    EntityKind, Page, Priority, RefPrefix, RelationshipType, Requirement, RequirementRelationship,
    RequirementType,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const DEFAULT_REQUIREMENT_TYPE: &str = "functional";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewRequirement {
    pub user_story_id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub acceptance_criteria_id: Option<String>,
    /// Type name or UUID; `functional` when omitted
    #[serde(default)]
    pub requirement_type: Option<String>,
    #[serde(default)]
    pub priority: Option<i64>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub assignee_id: Option<Uuid>,
}

impl NewRequirement {
    pub fn titled(user_story_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            user_story_id: user_story_id.into(),
            title: title.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequirementUpdate {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub acceptance_criteria_id: Option<String>,
    #[serde(default)]
    pub requirement_type: Option<String>,
    #[serde(default)]
    pub priority: Option<i64>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub assignee_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default)]
pub struct RequirementFilter {
    pub user_story_id: Option<String>,
    pub status: Option<String>,
    pub requirement_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRelationship {
    pub source_requirement_id: String,
    pub target_requirement_id: String,
    /// Relationship type name or UUID
    pub relationship_type: String,
}

/// Both directions of a requirement's relationships
#[derive(Debug, Clone, Serialize)]
pub struct RequirementRelationships {
    pub source_relationships: Vec<RequirementRelationship>,
    pub target_relationships: Vec<RequirementRelationship>,
}

#[derive(Clone)]
pub struct RequirementService {
    store: Store,
}

impl RequirementService {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub async fn get(&self, key: &str) -> DomainResult<Requirement> {
        self.store.read().await.requirement(key).cloned()
    }

    pub async fn list(
        &self,
        filter: &RequirementFilter,
        page: Page,
    ) -> DomainResult<(Vec<Requirement>, usize)> {
        let state = self.store.read().await;
        let story_id = filter
            .user_story_id
            .as_deref()
            .map(|key| state.user_story(key).map(|s| s.id))
            .transpose()?;
        let type_id = filter
            .requirement_type
            .as_deref()
            .map(|key| state.requirement_type(key).map(|t| t.id))
            .transpose()?;

        let mut requirements: Vec<Requirement> = state
            .requirements
            .values()
            .filter(|r| story_id.map_or(true, |id| r.user_story_id == id))
            .filter(|r| type_id.map_or(true, |id| r.type_id == id))
            .filter(|r| filter.status.as_ref().map_or(true, |s| &r.status == s))
            .cloned()
            .collect();
        requirements.sort_by_key(|r| (r.created_at, r.id));
        Ok(paginate(requirements, page))
    }

    pub async fn create(&self, new: NewRequirement, actor: &Actor) -> DomainResult<Requirement> {
        actor.authorize(Action::Create, "create requirement")?;
        let title = required_text("title", &new.title)?;
        let priority = priority_or_default(new.priority)?;

        let requirement = self
            .store
            .within_transaction(|state| {
                let user_story_id = state.user_story(&new.user_story_id)?.id;
                let acceptance_criteria_id = new
                    .acceptance_criteria_id
                    .as_deref()
                    .map(|key| criteria_of(state, key, user_story_id))
                    .transpose()?;
                let type_id = state
                    .requirement_type(
                        new.requirement_type
                            .as_deref()
                            .unwrap_or(DEFAULT_REQUIREMENT_TYPE),
                    )?
                    .id;
                let status = state
                    .status_models
                    .resolve_initial(EntityKind::Requirement, new.status.as_deref())?;

                let now = Utc::now();
                let requirement = Requirement {
                    id: Uuid::new_v4(),
                    reference_id: state.next_reference(RefPrefix::Req),
                    user_story_id,
                    acceptance_criteria_id,
                    type_id,
                    title,
                    description: new.description,
                    status,
                    priority,
                    creator_id: actor.user_id,
                    assignee_id: new.assignee_id,
                    created_at: now,
                    updated_at: now,
                };
                state.requirements.insert(requirement.id, requirement.clone());
                Ok(requirement)
            })
            .await?;

        tracing::info!(reference_id = %requirement.reference_id, "Created requirement");
        Ok(requirement)
    }

    pub async fn update(
        &self,
        key: &str,
        update: RequirementUpdate,
        actor: &Actor,
    ) -> DomainResult<Requirement> {
        actor.authorize(Action::Update, "update requirement")?;
        let title = update.title.as_deref().map(|t| required_text("title", t)).transpose()?;
        let priority = update.priority.map(Priority::new).transpose()?;

        self.store
            .within_transaction(|state| {
                let mut requirement = state.requirement(key)?.clone();
                transition(
                    &state.status_models,
                    EntityKind::Requirement,
                    &mut requirement.status,
                    update.status,
                )?;
                if let Some(key) = update.acceptance_criteria_id.as_deref() {
                    requirement.acceptance_criteria_id =
                        Some(criteria_of(state, key, requirement.user_story_id)?);
                }
                if let Some(key) = update.requirement_type.as_deref() {
                    requirement.type_id = state.requirement_type(key)?.id;
                }
                if let Some(title) = title {
                    requirement.title = title;
                }
                if let Some(description) = update.description {
                    requirement.description = Some(description);
                }
                if let Some(priority) = priority {
                    requirement.priority = priority;
                }
                if let Some(assignee) = update.assignee_id {
                    requirement.assignee_id = Some(assignee);
                }
                requirement.updated_at = Utc::now();
                state.requirements.insert(requirement.id, requirement.clone());
                Ok(requirement)
            })
            .await
    }

    /// Link two requirements; self-links and exact duplicates are rejected
    pub async fn create_relationship(
        &self,
        new: NewRelationship,
        actor: &Actor,
    ) -> DomainResult<RequirementRelationship> {
        actor.authorize(Action::Create, "create relationship")?;

        let relationship = self
            .store
            .within_transaction(|state| {
                let source = state.requirement(&new.source_requirement_id)?.id;
                let target = state.requirement(&new.target_requirement_id)?.id;
                if source == target {
                    return Err(DomainError::ValidationFailed(
                        "a requirement cannot be related to itself".into(),
                    ));
                }
                let type_id = state.relationship_type(&new.relationship_type)?.id;
                let duplicate = state.relationships.values().any(|r| {
                    r.source_requirement_id == source
                        && r.target_requirement_id == target
                        && r.relationship_type_id == type_id
                });
                if duplicate {
                    return Err(DomainError::conflict(format!(
                        "{} -> {} ({}) already exists",
                        new.source_requirement_id, new.target_requirement_id, new.relationship_type
                    )));
                }

                let relationship = RequirementRelationship {
                    id: Uuid::new_v4(),
                    source_requirement_id: source,
                    target_requirement_id: target,
                    relationship_type_id: type_id,
                    created_by: actor.user_id,
                    created_at: Utc::now(),
                };
                state.relationships.insert(relationship.id, relationship.clone());
                Ok(relationship)
            })
            .await?;

        tracing::info!(relationship_id = %relationship.id, "Created requirement relationship");
        Ok(relationship)
    }

    pub async fn relationships(&self, key: &str) -> DomainResult<RequirementRelationships> {
        let state = self.store.read().await;
        let id = state.requirement(key)?.id;
        let (source, target) = state.relationships_of(id);
        Ok(RequirementRelationships {
            source_relationships: source.into_iter().cloned().collect(),
            target_relationships: target.into_iter().cloned().collect(),
        })
    }

    pub async fn requirement_types(&self) -> Vec<RequirementType> {
        self.store.read().await.requirement_types.values().cloned().collect()
    }

    pub async fn relationship_types(&self) -> Vec<RelationshipType> {
        self.store.read().await.relationship_types.values().cloned().collect()
    }

    pub async fn create_requirement_type(
        &self,
        name: &str,
        description: Option<String>,
        actor: &Actor,
    ) -> DomainResult<RequirementType> {
        actor.authorize(Action::Administer, "create requirement type")?;
        let name = required_text("name", name)?;
        self.store
            .within_transaction(|state| {
                if state.requirement_types.values().any(|t| t.name == name) {
                    return Err(DomainError::conflict(format!(
                        "requirement type '{}' already exists",
                        name
                    )));
                }
                let created = RequirementType {
                    id: Uuid::new_v4(),
                    name,
                    description,
                };
                state.requirement_types.insert(created.id, created.clone());
                Ok(created)
            })
            .await
    }

    pub async fn create_relationship_type(
        &self,
        name: &str,
        description: Option<String>,
        actor: &Actor,
    ) -> DomainResult<RelationshipType> {
        actor.authorize(Action::Administer, "create relationship type")?;
        let name = required_text("name", name)?;
        self.store
            .within_transaction(|state| {
                if state.relationship_types.values().any(|t| t.name == name) {
                    return Err(DomainError::conflict(format!(
                        "relationship type '{}' already exists",
                        name
                    )));
                }
                let created = RelationshipType {
                    id: Uuid::new_v4(),
                    name,
                    description,
                };
                state.relationship_types.insert(created.id, created.clone());
                Ok(created)
            })
            .await
    }

    /// Delete a requirement type. Referenced types are never removed, even
    /// when `force` is requested.
    pub async fn delete_requirement_type(
        &self,
        key: &str,
        actor: &Actor,
        force: bool,
    ) -> DomainResult<RequirementType> {
        actor.authorize(Action::Administer, "delete requirement type")?;
        self.store
            .within_transaction(|state| {
                let found = state.requirement_type(key)?.clone();
                let count = state
                    .requirements
                    .values()
                    .filter(|r| r.type_id == found.id)
                    .count();
                if count > 0 {
                    if force {
                        tracing::warn!(type_name = %found.name, "Force has no effect on referenced types");
                    }
                    return Err(DomainError::TypeInUse {
                        name: found.name,
                        count,
                    });
                }
                state.requirement_types.remove(&found.id);
                Ok(found)
            })
            .await
    }

    pub async fn delete_relationship_type(
        &self,
        key: &str,
        actor: &Actor,
    ) -> DomainResult<RelationshipType> {
        actor.authorize(Action::Administer, "delete relationship type")?;
        self.store
            .within_transaction(|state| {
                let found = state.relationship_type(key)?.clone();
                let count = state
                    .relationships
                    .values()
                    .filter(|r| r.relationship_type_id == found.id)
                    .count();
                if count > 0 {
                    return Err(DomainError::TypeInUse {
                        name: found.name,
                        count,
                    });
                }
                state.relationship_types.remove(&found.id);
                Ok(found)
            })
            .await
    }
}

/// Criteria id, checked to belong to the requirement's story
fn criteria_of(state: &StoreState, key: &str, user_story_id: Uuid) -> DomainResult<Uuid> {
    let criteria = state.criteria(key)?;
    if criteria.user_story_id != user_story_id {
        return Err(DomainError::ValidationFailed(format!(
            "{} belongs to a different user story",
            criteria.reference_id
        )));
    }
    Ok(criteria.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::UserRole;
    use crate::services::{NewAcceptanceCriteria, NewEpic, NewUserStory, Services};

    async fn seeded() -> (Services, Actor) {
        let services = Services::new(Store::in_memory());
        let actor = Actor::new(Uuid::new_v4(), "analyst", UserRole::User);
        services.epics.create(NewEpic::titled("Reports"), &actor).await.unwrap();
        for title in ["Export", "Schedule"] {
            services
                .user_stories
                .create(NewUserStory::titled("EP-001", title), &actor)
                .await
                .unwrap();
        }
        services
            .acceptance_criteria
            .create(
                NewAcceptanceCriteria {
                    user_story_id: "US-002".into(),
                    description: "Runs nightly".into(),
                },
                &actor,
            )
            .await
            .unwrap();
        (services, actor)
    }

    #[tokio::test]
    async fn test_create_defaults() {
        let (services, actor) = seeded().await;
        let requirement = services
            .requirements
            .create(NewRequirement::titled("US-001", "CSV export"), &actor)
            .await
            .unwrap();

        assert_eq!(requirement.reference_id.to_string(), "REQ-001");
        assert_eq!(requirement.status, "Draft");
        let state = services.store().read().await;
        assert_eq!(state.requirement_types[&requirement.type_id].name, "functional");
    }

    #[tokio::test]
    async fn test_criteria_must_share_story() {
        let (services, actor) = seeded().await;
        let mut new = NewRequirement::titled("US-001", "Cron syntax");
        new.acceptance_criteria_id = Some("AC-001".into());

        let err = services.requirements.create(new, &actor).await.unwrap_err();
        assert!(matches!(err, DomainError::ValidationFailed(_)));
    }

    #[tokio::test]
    async fn test_relationship_rules() {
        let (services, actor) = seeded().await;
        let requirements = &services.requirements;
        requirements
            .create(NewRequirement::titled("US-001", "A"), &actor)
            .await
            .unwrap();
        requirements
            .create(NewRequirement::titled("US-001", "B"), &actor)
            .await
            .unwrap();

        let link = |source: &str, target: &str| NewRelationship {
            source_requirement_id: source.into(),
            target_requirement_id: target.into(),
            relationship_type: "blocks".into(),
        };

        let err = requirements
            .create_relationship(link("REQ-001", "REQ-001"), &actor)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::ValidationFailed(_)));

        requirements
            .create_relationship(link("REQ-001", "REQ-002"), &actor)
            .await
            .unwrap();
        let err = requirements
            .create_relationship(link("REQ-001", "REQ-002"), &actor)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict { .. }));

        let both = requirements.relationships("REQ-002").await.unwrap();
        assert!(both.source_relationships.is_empty());
        assert_eq!(both.target_relationships.len(), 1);
    }

    #[tokio::test]
    async fn test_type_in_use_ignores_force() {
        let (services, actor) = seeded().await;
        let admin = Actor::new(Uuid::new_v4(), "root", UserRole::Administrator);
        services
            .requirements
            .create(NewRequirement::titled("US-001", "Audit trail"), &actor)
            .await
            .unwrap();

        let err = services
            .requirements
            .delete_requirement_type("functional", &actor, false)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Forbidden(_)));

        let err = services
            .requirements
            .delete_requirement_type("functional", &admin, true)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            DomainError::TypeInUse {
                name: "functional".into(),
                count: 1
            }
        );

        services
            .requirements
            .delete_requirement_type("business", &admin, false)
            .await
            .unwrap();
        assert_eq!(services.requirements.requirement_types().await.len(), 3);
    }
}
