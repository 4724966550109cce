use crate::error::{DomainError, DomainResult};
use crate::status::StatusRegistry;
use crate::types::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// Every persisted collection. A transaction works on a clone of this
/// value and swaps it in on commit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreState {
    pub epics: BTreeMap<Uuid, Epic>,
    pub user_stories: BTreeMap<Uuid, UserStory>,
    pub acceptance_criteria: BTreeMap<Uuid, AcceptanceCriteria>,
    pub requirements: BTreeMap<Uuid, Requirement>,
    pub relationships: BTreeMap<Uuid, RequirementRelationship>,
    pub requirement_types: BTreeMap<Uuid, RequirementType>,
    pub relationship_types: BTreeMap<Uuid, RelationshipType>,
    pub prompts: BTreeMap<Uuid, Prompt>,
    pub steering_documents: BTreeMap<Uuid, SteeringDocument>,
    /// (epic id, steering document id)
    pub epic_steering_links: BTreeSet<(Uuid, Uuid)>,
    pub status_models: StatusRegistry,
    #[serde(default)]
    sequences: BTreeMap<RefPrefix, u64>,
}

const REQUIREMENT_TYPES: &[&str] = &["functional", "non-functional", "business", "technical"];
const RELATIONSHIP_TYPES: &[&str] = &["depends_on", "blocks", "relates_to", "duplicates", "implements"];

impl StoreState {
    /// Empty state with default status models and types
    pub fn seeded() -> Self {
        let mut state = Self {
            status_models: StatusRegistry::seeded(),
            ..Default::default()
        };
        for name in REQUIREMENT_TYPES {
            let id = Uuid::new_v4();
            state.requirement_types.insert(
                id,
                RequirementType {
                    id,
                    name: name.to_string(),
                    description: None,
                },
            );
        }
        for name in RELATIONSHIP_TYPES {
            let id = Uuid::new_v4();
            state.relationship_types.insert(
                id,
                RelationshipType {
                    id,
                    name: name.to_string(),
                    description: None,
                },
            );
        }
        state
    }

    /// Allocate the next reference id for a prefix
    pub fn next_reference(&mut self, prefix: RefPrefix) -> ReferenceId {
        let counter = self.sequences.entry(prefix).or_insert(0);
        *counter += 1;
        ReferenceId::numbered(prefix, *counter)
    }

    pub fn epic(&self, key: &str) -> DomainResult<&Epic> {
        lookup(&self.epics, key).ok_or_else(|| DomainError::not_found(EntityKind::Epic, key))
    }

    pub fn user_story(&self, key: &str) -> DomainResult<&UserStory> {
        lookup(&self.user_stories, key)
            .ok_or_else(|| DomainError::not_found(EntityKind::UserStory, key))
    }

    pub fn criteria(&self, key: &str) -> DomainResult<&AcceptanceCriteria> {
        lookup(&self.acceptance_criteria, key)
            .ok_or_else(|| DomainError::not_found(EntityKind::AcceptanceCriteria, key))
    }

    pub fn requirement(&self, key: &str) -> DomainResult<&Requirement> {
        lookup(&self.requirements, key)
            .ok_or_else(|| DomainError::not_found(EntityKind::Requirement, key))
    }

    pub fn prompt(&self, key: &str) -> DomainResult<&Prompt> {
        lookup(&self.prompts, key)
            .or_else(|| self.prompts.values().find(|p| p.name == key))
            .ok_or_else(|| DomainError::not_found(ResourceKind::Prompt, key))
    }

    pub fn steering_document(&self, key: &str) -> DomainResult<&SteeringDocument> {
        lookup(&self.steering_documents, key)
            .ok_or_else(|| DomainError::not_found(ResourceKind::SteeringDocument, key))
    }

    /// Reference id of any hierarchy entity
    pub fn reference_of(&self, kind: EntityKind, id: Uuid) -> Option<&ReferenceId> {
        match kind {
            EntityKind::Epic => self.epics.get(&id).map(|e| &e.reference_id),
            EntityKind::UserStory => self.user_stories.get(&id).map(|e| &e.reference_id),
            EntityKind::AcceptanceCriteria => {
                self.acceptance_criteria.get(&id).map(|e| &e.reference_id)
            }
            EntityKind::Requirement => self.requirements.get(&id).map(|e| &e.reference_id),
        }
    }

    /// Resolve a UUID or reference id of a hierarchy entity to its UUID
    pub fn resolve(&self, kind: EntityKind, key: &str) -> DomainResult<Uuid> {
        match kind {
            EntityKind::Epic => self.epic(key).map(|e| e.id),
            EntityKind::UserStory => self.user_story(key).map(|e| e.id),
            EntityKind::AcceptanceCriteria => self.criteria(key).map(|e| e.id),
            EntityKind::Requirement => self.requirement(key).map(|e| e.id),
        }
    }

    /// Remove a hierarchy entity; true when it existed
    pub fn remove(&mut self, kind: EntityKind, id: Uuid) -> bool {
        match kind {
            EntityKind::Epic => {
                self.epic_steering_links.retain(|(epic, _)| *epic != id);
                self.epics.remove(&id).is_some()
            }
            EntityKind::UserStory => self.user_stories.remove(&id).is_some(),
            EntityKind::AcceptanceCriteria => self.acceptance_criteria.remove(&id).is_some(),
            EntityKind::Requirement => self.requirements.remove(&id).is_some(),
        }
    }

    /// Direct children of a hierarchy entity, by kind
    pub fn children(&self, kind: EntityKind, id: Uuid) -> Vec<(EntityKind, Uuid)> {
        match kind {
            EntityKind::Epic => self
                .stories_of_epic(id)
                .into_iter()
                .map(|s| (EntityKind::UserStory, s.id))
                .collect(),
            EntityKind::UserStory => self
                .criteria_of_story(id)
                .into_iter()
                .map(|c| (EntityKind::AcceptanceCriteria, c.id))
                .chain(
                    self.requirements_of_story(id)
                        .into_iter()
                        .map(|r| (EntityKind::Requirement, r.id)),
                )
                .collect(),
            // Requirements linked to a criteria are owned by the story
            EntityKind::AcceptanceCriteria | EntityKind::Requirement => Vec::new(),
        }
    }

    pub fn stories_of_epic(&self, epic_id: Uuid) -> Vec<&UserStory> {
        let mut stories: Vec<_> = self
            .user_stories
            .values()
            .filter(|s| s.epic_id == epic_id)
            .collect();
        stories.sort_by_key(|s| (s.created_at, s.id));
        stories
    }

    pub fn criteria_of_story(&self, story_id: Uuid) -> Vec<&AcceptanceCriteria> {
        let mut criteria: Vec<_> = self
            .acceptance_criteria
            .values()
            .filter(|c| c.user_story_id == story_id)
            .collect();
        criteria.sort_by_key(|c| (c.created_at, c.id));
        criteria
    }

    pub fn requirements_of_story(&self, story_id: Uuid) -> Vec<&Requirement> {
        let mut requirements: Vec<_> = self
            .requirements
            .values()
            .filter(|r| r.user_story_id == story_id)
            .collect();
        requirements.sort_by_key(|r| (r.created_at, r.id));
        requirements
    }

    /// Relationships where the requirement is (source, target)
    pub fn relationships_of(
        &self,
        requirement_id: Uuid,
    ) -> (Vec<&RequirementRelationship>, Vec<&RequirementRelationship>) {
        self.relationships
            .values()
            .filter(|r| {
                r.source_requirement_id == requirement_id
                    || r.target_requirement_id == requirement_id
            })
            .partition(|r| r.source_requirement_id == requirement_id)
    }

    pub fn documents_of_epic(&self, epic_id: Uuid) -> Vec<&SteeringDocument> {
        self.epic_steering_links
            .iter()
            .filter(|(epic, _)| *epic == epic_id)
            .filter_map(|(_, doc)| self.steering_documents.get(doc))
            .collect()
    }

    /// Whether any entity of `kind` currently holds `status`
    pub fn status_in_use(&self, kind: EntityKind, status: &str) -> bool {
        match kind {
            EntityKind::Epic => self.epics.values().any(|e| e.status == status),
            EntityKind::UserStory => self.user_stories.values().any(|e| e.status == status),
            EntityKind::Requirement => self.requirements.values().any(|e| e.status == status),
            EntityKind::AcceptanceCriteria => false,
        }
    }

    pub fn requirement_type(&self, key: &str) -> DomainResult<&RequirementType> {
        let found = match Uuid::parse_str(key) {
            Ok(id) => self.requirement_types.get(&id),
            Err(_) => self.requirement_types.values().find(|t| t.name == key),
        };
        found.ok_or_else(|| DomainError::not_found(ResourceKind::RequirementType, key))
    }

    pub fn relationship_type(&self, key: &str) -> DomainResult<&RelationshipType> {
        let found = match Uuid::parse_str(key) {
            Ok(id) => self.relationship_types.get(&id),
            Err(_) => self.relationship_types.values().find(|t| t.name == key),
        };
        found.ok_or_else(|| DomainError::not_found(ResourceKind::RelationshipType, key))
    }

    pub fn active_prompt(&self) -> Option<&Prompt> {
        self.prompts.values().find(|p| p.active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_reference_is_sequential_per_prefix() {
        let mut state = StoreState::seeded();
        assert_eq!(state.next_reference(RefPrefix::Ep).to_string(), "EP-001");
        assert_eq!(state.next_reference(RefPrefix::Ep).to_string(), "EP-002");
        assert_eq!(state.next_reference(RefPrefix::Us).to_string(), "US-001");
    }

    #[test]
    fn test_seeded_types() {
        let state = StoreState::seeded();
        assert!(state.requirement_type("functional").is_ok());
        assert!(state.relationship_type("depends_on").is_ok());
        assert!(matches!(
            state.requirement_type("nope"),
            Err(DomainError::NotFound { .. })
        ));
    }

    #[test]
    fn test_state_round_trips_through_json() {
        let mut state = StoreState::seeded();
        state.next_reference(RefPrefix::Req);
        let json = serde_json::to_vec(&state).unwrap();
        let back: StoreState = serde_json::from_slice(&json).unwrap();
        assert_eq!(back, state);
    }
}
