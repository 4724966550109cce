//! Deletion with dependencies for the Epic → User Story → {Acceptance
//! Criteria, Requirement} hierarchy.
//!
//! Containment between kinds is static data ([`CONTAINMENT`]); the cascade
//! order sorts kinds by depth in that graph, so the deepest dependents are
//! removed first. Relationships touching a removed requirement are pruned
//! before any entity is removed.

use crate::access::{Action, Actor};
use crate::error::{DomainError, DomainResult};
use crate::storage::{Store, StoreState};
use crate::types::EntityKind;
use petgraph::graph::DiGraph;
use petgraph::visit::Topo;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::LazyLock;
use uuid::Uuid;

/// Parent kind → child kind
const CONTAINMENT: &[(EntityKind, EntityKind)] = &[
    (EntityKind::Epic, EntityKind::UserStory),
    (EntityKind::UserStory, EntityKind::AcceptanceCriteria),
    (EntityKind::UserStory, EntityKind::Requirement),
];

/// Kinds ordered children-before-parents
static CASCADE_ORDER: LazyLock<Vec<EntityKind>> = LazyLock::new(|| {
    let mut graph = DiGraph::<EntityKind, ()>::new();
    let nodes: HashMap<EntityKind, _> = EntityKind::ALL
        .iter()
        .map(|kind| (*kind, graph.add_node(*kind)))
        .collect();
    for (parent, child) in CONTAINMENT {
        graph.add_edge(nodes[parent], nodes[child], ());
    }

    // Depth from the root; siblings fall back to declaration order, later first
    let mut depth: HashMap<EntityKind, usize> = HashMap::new();
    let mut topo = Topo::new(&graph);
    while let Some(node) = topo.next(&graph) {
        let kind = graph[node];
        let level = depth.get(&kind).copied().unwrap_or(0);
        for child in graph.neighbors(node) {
            let entry = depth.entry(graph[child]).or_insert(0);
            *entry = (*entry).max(level + 1);
        }
        depth.entry(kind).or_insert(level);
    }

    let mut order: Vec<EntityKind> = EntityKind::ALL.to_vec();
    order.sort_by_key(|kind| {
        let declared = EntityKind::ALL.iter().position(|k| k == kind).unwrap_or(0);
        std::cmp::Reverse((depth.get(kind).copied().unwrap_or(0), declared))
    });
    order
});

/// Position of a kind in the cascade; lower is deleted earlier
pub fn cascade_rank(kind: EntityKind) -> usize {
    CASCADE_ORDER
        .iter()
        .position(|k| *k == kind)
        .unwrap_or(usize::MAX)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyReason {
    /// A descendant would be removed with the target
    ChildExists,
    /// The removed requirement is the source of a relationship to this one
    RelationshipSource,
    /// The removed requirement is the target of a relationship from this one
    RelationshipTarget,
    /// The user story would be left without acceptance criteria
    MinCardinality,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub entity_kind: EntityKind,
    pub entity_id: Uuid,
    pub reference_id: String,
    pub reason: DependencyReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyInfo {
    pub entity_kind: EntityKind,
    pub entity_id: Uuid,
    pub reference_id: String,
    pub can_delete: bool,
    pub dependencies: Vec<Dependency>,
    pub cascade_delete_count: usize,
    pub requires_confirmation: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletedEntity {
    pub entity_kind: EntityKind,
    pub entity_id: Uuid,
    pub reference_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionResult {
    pub entity_kind: EntityKind,
    pub entity_id: Uuid,
    pub reference_id: String,
    pub deleted_by: Uuid,
    pub cascade_deleted: Vec<DeletedEntity>,
    pub relationships_removed: usize,
    pub transaction_id: Uuid,
}

/// Everything a deletion would touch, computed against one state snapshot
#[derive(Debug)]
struct DeletionPlan {
    kind: EntityKind,
    id: Uuid,
    reference_id: String,
    /// Descendants, deepest kind first
    cascade: Vec<(EntityKind, Uuid)>,
    relationships: Vec<Uuid>,
    dependencies: Vec<Dependency>,
}

impl DeletionPlan {
    fn build(state: &StoreState, kind: EntityKind, id: Uuid) -> DomainResult<Self> {
        let reference_id = state
            .reference_of(kind, id)
            .map(|r| r.to_string())
            .ok_or_else(|| DomainError::not_found(kind, id.to_string()))?;

        // Walk the containment tree
        let mut seen = BTreeSet::new();
        let mut frontier = state.children(kind, id);
        let mut cascade = Vec::new();
        while let Some((child_kind, child_id)) = frontier.pop() {
            if seen.insert((child_kind, child_id)) {
                cascade.push((child_kind, child_id));
                frontier.extend(state.children(child_kind, child_id));
            }
        }
        cascade.sort_by_key(|(k, id)| {
            (
                cascade_rank(*k),
                state.reference_of(*k, *id).map(|r| r.to_string()),
            )
        });

        let mut dependencies: Vec<Dependency> = cascade
            .iter()
            .map(|(k, child_id)| Dependency {
                entity_kind: *k,
                entity_id: *child_id,
                reference_id: reference_string(state, *k, *child_id),
                reason: DependencyReason::ChildExists,
            })
            .collect();

        // Relationships of every requirement that goes away
        let removed_requirements: BTreeSet<Uuid> = cascade
            .iter()
            .chain(std::iter::once(&(kind, id)))
            .filter(|(k, _)| *k == EntityKind::Requirement)
            .map(|(_, rid)| *rid)
            .collect();

        let mut relationships = Vec::new();
        let mut external = BTreeSet::new();
        for relationship in state.relationships.values() {
            let source = relationship.source_requirement_id;
            let target = relationship.target_requirement_id;
            let source_removed = removed_requirements.contains(&source);
            let target_removed = removed_requirements.contains(&target);
            if !source_removed && !target_removed {
                continue;
            }
            relationships.push(relationship.id);
            if source_removed && !target_removed {
                external.insert((target, DependencyReason::RelationshipSource));
            } else if target_removed && !source_removed {
                external.insert((source, DependencyReason::RelationshipTarget));
            }
        }
        for (other, reason) in external {
            dependencies.push(Dependency {
                entity_kind: EntityKind::Requirement,
                entity_id: other,
                reference_id: reference_string(state, EntityKind::Requirement, other),
                reason,
            });
        }

        if kind == EntityKind::AcceptanceCriteria {
            if let Some(criteria) = state.acceptance_criteria.get(&id) {
                let story_id = criteria.user_story_id;
                if state.criteria_of_story(story_id).len() <= 1 {
                    dependencies.push(Dependency {
                        entity_kind: EntityKind::UserStory,
                        entity_id: story_id,
                        reference_id: reference_string(state, EntityKind::UserStory, story_id),
                        reason: DependencyReason::MinCardinality,
                    });
                }
            }
        }

        Ok(Self {
            kind,
            id,
            reference_id,
            cascade,
            relationships,
            dependencies,
        })
    }

    fn info(&self) -> DependencyInfo {
        let has_min_cardinality = self
            .dependencies
            .iter()
            .any(|d| d.reason == DependencyReason::MinCardinality);
        DependencyInfo {
            entity_kind: self.kind,
            entity_id: self.id,
            reference_id: self.reference_id.clone(),
            can_delete: self.dependencies.is_empty() || force_permitted(self.kind),
            dependencies: self.dependencies.clone(),
            cascade_delete_count: self.cascade.len(),
            requires_confirmation: !self.cascade.is_empty() || has_min_cardinality,
        }
    }

    fn blocking_error(&self) -> DomainError {
        match self
            .dependencies
            .iter()
            .find(|d| d.reason == DependencyReason::MinCardinality)
        {
            Some(story) => DomainError::MinCardinality {
                reference_id: self.reference_id.clone(),
                user_story: story.reference_id.clone(),
            },
            None => DomainError::DeletionBlocked {
                reference_id: self.reference_id.clone(),
                count: self.dependencies.len(),
            },
        }
    }
}

fn reference_string(state: &StoreState, kind: EntityKind, id: Uuid) -> String {
    state
        .reference_of(kind, id)
        .map(|r| r.to_string())
        .unwrap_or_default()
}

/// Every hierarchy kind may be force-deleted; dependents are cascaded or pruned
fn force_permitted(kind: EntityKind) -> bool {
    matches!(
        kind,
        EntityKind::Epic
            | EntityKind::UserStory
            | EntityKind::AcceptanceCriteria
            | EntityKind::Requirement
    )
}

/// Validates and executes cascading deletes against the store
#[derive(Clone)]
pub struct DeletionEngine {
    store: Store,
}

impl DeletionEngine {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Pure read: what deleting `key` would involve
    pub async fn describe_dependencies(&self, kind: EntityKind, key: &str) -> DomainResult<DependencyInfo> {
        let state = self.store.read().await;
        let id = state.resolve(kind, key)?;
        Ok(DeletionPlan::build(&state, kind, id)?.info())
    }

    /// `describe_dependencies` addressed by wire-level kind name
    pub async fn confirm(&self, kind_name: &str, key: &str) -> DomainResult<DependencyInfo> {
        let kind: EntityKind = kind_name.parse()?;
        self.describe_dependencies(kind, key).await
    }

    /// Delete an entity and, with `force`, everything that depends on it.
    ///
    /// The plan is computed inside the transaction. Any failure before
    /// commit drops the transaction, leaving the store unchanged.
    pub async fn delete(
        &self,
        kind: EntityKind,
        key: &str,
        actor: &Actor,
        force: bool,
    ) -> DomainResult<DeletionResult> {
        actor.authorize(Action::Delete, &format!("delete {}", kind))?;

        let mut tx = self.store.begin().await;
        let id = tx.resolve(kind, key)?;
        let plan = DeletionPlan::build(&tx, kind, id)?;

        if !plan.dependencies.is_empty() && !force {
            let err = plan.blocking_error();
            tracing::info!(
                entity_kind = %kind,
                reference_id = %plan.reference_id,
                dependencies = plan.dependencies.len(),
                "Deletion blocked"
            );
            return Err(err);
        }

        for relationship_id in &plan.relationships {
            tx.relationships.remove(relationship_id);
        }

        let mut cascade_deleted = Vec::with_capacity(plan.cascade.len());
        for (child_kind, child_id) in &plan.cascade {
            let reference_id = reference_string(&tx, *child_kind, *child_id);
            if !tx.remove(*child_kind, *child_id) {
                return Err(DomainError::TransactionFailed {
                    cause: crate::error::TransactionFailure::Conflict,
                    message: format!("{} {} vanished during cascade", child_kind, child_id),
                });
            }
            cascade_deleted.push(DeletedEntity {
                entity_kind: *child_kind,
                entity_id: *child_id,
                reference_id,
            });
        }
        tx.remove(kind, id);

        // Requirements belong to their story; a removed criteria only unlinks them
        let removed_criteria: BTreeSet<Uuid> = plan
            .cascade
            .iter()
            .chain(std::iter::once(&(kind, id)))
            .filter(|(k, _)| *k == EntityKind::AcceptanceCriteria)
            .map(|(_, cid)| *cid)
            .collect();
        let mut unlinked = 0;
        for requirement in tx.requirements.values_mut() {
            if requirement
                .acceptance_criteria_id
                .is_some_and(|cid| removed_criteria.contains(&cid))
            {
                requirement.acceptance_criteria_id = None;
                unlinked += 1;
            }
        }

        let transaction_id = tx.id();
        tx.commit().await?;

        tracing::info!(
            entity_kind = %kind,
            reference_id = %plan.reference_id,
            cascade_count = cascade_deleted.len(),
            relationships_removed = plan.relationships.len(),
            requirements_unlinked = unlinked,
            force,
            %transaction_id,
            "Entity deleted"
        );

        Ok(DeletionResult {
            entity_kind: kind,
            entity_id: id,
            reference_id: plan.reference_id,
            deleted_by: actor.user_id,
            cascade_deleted,
            relationships_removed: plan.relationships.len(),
            transaction_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::UserRole;
    use crate::services::{
        NewAcceptanceCriteria, NewEpic, NewRelationship, NewRequirement, NewUserStory, Services,
    };

    fn actor() -> Actor {
        Actor::new(Uuid::new_v4(), "pm", UserRole::User)
    }

    struct Fixture {
        services: Services,
        engine: DeletionEngine,
        actor: Actor,
    }

    /// EP-001 owns US-001; US-001 owns AC-001 and REQ-001
    async fn fixture() -> Fixture {
        let store = Store::in_memory();
        let services = Services::new(store.clone());
        let actor = actor();

        let epic = services
            .epics
            .create(NewEpic::titled("Auth"), &actor)
            .await
            .unwrap();
        let story = services
            .user_stories
            .create(NewUserStory::titled(epic.id.to_string(), "Login"), &actor)
            .await
            .unwrap();
        services
            .acceptance_criteria
            .create(
                NewAcceptanceCriteria {
                    user_story_id: story.id.to_string(),
                    description: "Given valid credentials, login succeeds".into(),
                },
                &actor,
            )
            .await
            .unwrap();
        services
            .requirements
            .create(NewRequirement::titled(story.id.to_string(), "Hash passwords"), &actor)
            .await
            .unwrap();

        Fixture {
            engine: DeletionEngine::new(store),
            services,
            actor,
        }
    }

    #[test]
    fn test_cascade_order_is_children_first() {
        assert_eq!(
            *CASCADE_ORDER,
            vec![
                EntityKind::Requirement,
                EntityKind::AcceptanceCriteria,
                EntityKind::UserStory,
                EntityKind::Epic,
            ]
        );
        assert!(cascade_rank(EntityKind::Requirement) < cascade_rank(EntityKind::UserStory));
    }

    #[tokio::test]
    async fn test_force_delete_epic_cascades() {
        let f = fixture().await;

        let result = f
            .engine
            .delete(EntityKind::Epic, "EP-001", &f.actor, true)
            .await
            .unwrap();

        assert_eq!(result.entity_kind, EntityKind::Epic);
        let refs: BTreeSet<_> = result
            .cascade_deleted
            .iter()
            .map(|d| d.reference_id.as_str())
            .collect();
        assert_eq!(refs, BTreeSet::from(["US-001", "AC-001", "REQ-001"]));
        assert_eq!(result.cascade_deleted[2].entity_kind, EntityKind::UserStory);

        for (kind, key) in [
            (EntityKind::Epic, "EP-001"),
            (EntityKind::UserStory, "US-001"),
            (EntityKind::AcceptanceCriteria, "AC-001"),
            (EntityKind::Requirement, "REQ-001"),
        ] {
            let state = f.services.store().read().await;
            assert!(matches!(state.resolve(kind, key), Err(DomainError::NotFound { .. })));
        }
    }

    #[tokio::test]
    async fn test_non_force_delete_blocked_and_state_unchanged() {
        let f = fixture().await;
        let before = f.services.store().read().await.clone();

        let err = f
            .engine
            .delete(EntityKind::Epic, "EP-001", &f.actor, false)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::DeletionBlocked { count: 3, .. }));
        assert_eq!(*f.services.store().read().await, before);
    }

    #[tokio::test]
    async fn test_min_cardinality() {
        let f = fixture().await;

        let err = f
            .engine
            .delete(EntityKind::AcceptanceCriteria, "AC-001", &f.actor, false)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::MinCardinality { .. }));
        assert!(f.services.store().read().await.criteria("AC-001").is_ok());

        let info = f
            .engine
            .describe_dependencies(EntityKind::AcceptanceCriteria, "AC-001")
            .await
            .unwrap();
        assert!(info.requires_confirmation);
        assert_eq!(info.cascade_delete_count, 0);
        assert_eq!(info.dependencies[0].reason, DependencyReason::MinCardinality);

        let result = f
            .engine
            .delete(EntityKind::AcceptanceCriteria, "AC-001", &f.actor, true)
            .await
            .unwrap();
        assert!(result.cascade_deleted.is_empty());
        assert!(f.services.store().read().await.user_story("US-001").is_ok());
    }

    #[tokio::test]
    async fn test_force_delete_criteria_unlinks_requirements() {
        let f = fixture().await;
        let mut new = NewRequirement::titled("US-001", "Rate limit logins");
        new.acceptance_criteria_id = Some("AC-001".into());
        f.services.requirements.create(new, &f.actor).await.unwrap();

        let info = f
            .engine
            .describe_dependencies(EntityKind::AcceptanceCriteria, "AC-001")
            .await
            .unwrap();
        assert_eq!(info.cascade_delete_count, 0);
        assert_eq!(info.dependencies.len(), 1);

        let result = f
            .engine
            .delete(EntityKind::AcceptanceCriteria, "AC-001", &f.actor, true)
            .await
            .unwrap();
        assert!(result.cascade_deleted.is_empty());

        let state = f.services.store().read().await;
        let linked = state.requirement("REQ-002").unwrap();
        assert_eq!(linked.acceptance_criteria_id, None);
        assert!(state.requirement("REQ-001").is_ok());
        assert!(state.user_story("US-001").is_ok());
    }

    #[tokio::test]
    async fn test_second_criteria_deletes_freely() {
        let f = fixture().await;
        f.services
            .acceptance_criteria
            .create(
                NewAcceptanceCriteria {
                    user_story_id: "US-001".into(),
                    description: "Lockout after 5 failures".into(),
                },
                &f.actor,
            )
            .await
            .unwrap();

        let info = f.engine.confirm("acceptance_criteria", "AC-002").await.unwrap();
        assert!(info.dependencies.is_empty());
        assert!(!info.requires_confirmation);
        assert!(info.can_delete);

        f.engine
            .delete(EntityKind::AcceptanceCriteria, "AC-002", &f.actor, false)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_requirement_relationships_reported_and_pruned() {
        let f = fixture().await;
        f.services
            .requirements
            .create(NewRequirement::titled("US-001", "Salt storage"), &f.actor)
            .await
            .unwrap();
        f.services
            .requirements
            .create_relationship(
                NewRelationship {
                    source_requirement_id: "REQ-001".into(),
                    target_requirement_id: "REQ-002".into(),
                    relationship_type: "depends_on".into(),
                },
                &f.actor,
            )
            .await
            .unwrap();

        let info = f
            .engine
            .describe_dependencies(EntityKind::Requirement, "REQ-001")
            .await
            .unwrap();
        assert_eq!(info.dependencies.len(), 1);
        assert_eq!(info.dependencies[0].reference_id, "REQ-002");
        assert_eq!(info.dependencies[0].reason, DependencyReason::RelationshipSource);
        assert!(!info.requires_confirmation);

        let result = f
            .engine
            .delete(EntityKind::Requirement, "REQ-001", &f.actor, true)
            .await
            .unwrap();
        assert_eq!(result.relationships_removed, 1);
        assert!(f.services.store().read().await.relationships.is_empty());
    }

    #[tokio::test]
    async fn test_describe_is_pure() {
        let f = fixture().await;
        let first = f.engine.describe_dependencies(EntityKind::Epic, "EP-001").await.unwrap();
        let second = f.engine.describe_dependencies(EntityKind::Epic, "EP-001").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.cascade_delete_count, 3);
        assert!(first.requires_confirmation);
    }

    #[tokio::test]
    async fn test_delete_twice_is_not_found() {
        let f = fixture().await;
        f.engine
            .delete(EntityKind::Epic, "EP-001", &f.actor, true)
            .await
            .unwrap();
        let err = f
            .engine
            .delete(EntityKind::Epic, "EP-001", &f.actor, true)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_confirm_unknown_kind() {
        let f = fixture().await;
        assert!(matches!(
            f.engine.confirm("prompt", "PROMPT-001").await,
            Err(DomainError::InvalidArguments(_))
        ));
    }

    #[tokio::test]
    async fn test_commenter_cannot_delete() {
        let f = fixture().await;
        let viewer = Actor::new(Uuid::new_v4(), "viewer", UserRole::Commenter);
        assert!(matches!(
            f.engine.delete(EntityKind::Epic, "EP-001", &viewer, true).await,
            Err(DomainError::Forbidden(_))
        ));
    }
}
