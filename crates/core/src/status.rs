//! Configurable status models and transition enforcement.
//!
//! Every entity kind has exactly one default model. Only the default model
//! is consulted at runtime; other models are stored configuration.

use crate::error::{DomainError, DomainResult};
use crate::types::{EntityKind, ResourceKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Status {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
        }
    }
}

/// Legal edge `from -> to`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StatusTransition {
    pub from: String,
    pub to: String,
}

impl StatusTransition {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusModel {
    pub id: Uuid,
    pub entity_kind: EntityKind,
    pub name: String,
    pub description: Option<String>,
    pub is_default: bool,
    /// Ordered; the first status is the initial one
    pub statuses: Vec<Status>,
    pub transitions: Vec<StatusTransition>,
}

impl StatusModel {
    pub fn has_status(&self, name: &str) -> bool {
        self.statuses.iter().any(|s| s.name == name)
    }

    pub fn allows(&self, from: &str, to: &str) -> bool {
        self.transitions.iter().any(|t| t.from == from && t.to == to)
    }

    pub fn initial_status(&self) -> Option<&str> {
        self.statuses.first().map(|s| s.name.as_str())
    }
}

/// Definition used when creating a model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewStatusModel {
    pub entity_kind: EntityKind,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub statuses: Vec<String>,
    #[serde(default)]
    pub transitions: Vec<StatusTransition>,
}

/// All status models, keyed by id
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusRegistry {
    models: BTreeMap<Uuid, StatusModel>,
}

impl StatusRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in default model of every kind
    pub fn seeded() -> Self {
        let mut registry = Self::new();
        for kind in EntityKind::ALL {
            let (statuses, transitions) = default_workflow(kind);
            let model = StatusModel {
                id: Uuid::new_v4(),
                entity_kind: kind,
                name: format!("Default {} workflow", kind.label().to_lowercase()),
                description: None,
                is_default: true,
                statuses: statuses.iter().map(|s| Status::new(*s)).collect(),
                transitions: transitions
                    .iter()
                    .map(|(from, to)| StatusTransition::new(*from, *to))
                    .collect(),
            };
            registry.models.insert(model.id, model);
        }
        registry
    }

    pub fn get(&self, id: Uuid) -> DomainResult<&StatusModel> {
        self.models
            .get(&id)
            .ok_or_else(|| DomainError::not_found(ResourceKind::StatusModel, id.to_string()))
    }

    fn get_mut(&mut self, id: Uuid) -> DomainResult<&mut StatusModel> {
        self.models
            .get_mut(&id)
            .ok_or_else(|| DomainError::not_found(ResourceKind::StatusModel, id.to_string()))
    }

    pub fn list(&self, kind: Option<EntityKind>) -> Vec<StatusModel> {
        self.models
            .values()
            .filter(|m| kind.map_or(true, |k| m.entity_kind == k))
            .cloned()
            .collect()
    }

    pub fn default_model(&self, kind: EntityKind) -> DomainResult<&StatusModel> {
        self.models
            .values()
            .find(|m| m.entity_kind == kind && m.is_default)
            .ok_or_else(|| {
                DomainError::Internal(format!("no default status model for {}", kind))
            })
    }

    pub fn validate_status(&self, kind: EntityKind, name: &str) -> DomainResult<()> {
        if self.default_model(kind)?.has_status(name) {
            Ok(())
        } else {
            Err(DomainError::InvalidStatus {
                kind: kind.to_string(),
                status: name.to_string(),
            })
        }
    }

    pub fn validate_transition(&self, kind: EntityKind, from: &str, to: &str) -> DomainResult<()> {
        let model = self.default_model(kind)?;
        // Unknown targets are just missing edges
        if !model.has_status(from) {
            return Err(DomainError::InvalidStatus {
                kind: kind.to_string(),
                status: from.to_string(),
            });
        }
        if model.allows(from, to) {
            Ok(())
        } else {
            Err(DomainError::InvalidTransition {
                kind: kind.to_string(),
                from: from.to_string(),
                to: to.to_string(),
            })
        }
    }

    /// Status given to new entities when none is requested
    pub fn initial_status(&self, kind: EntityKind) -> DomainResult<String> {
        self.default_model(kind)?
            .initial_status()
            .map(str::to_string)
            .ok_or_else(|| DomainError::Internal(format!("status model for {} is empty", kind)))
    }

    /// Resolve the status for a new entity: requested (validated) or initial
    pub fn resolve_initial(&self, kind: EntityKind, requested: Option<&str>) -> DomainResult<String> {
        match requested {
            Some(status) => {
                self.validate_status(kind, status)?;
                Ok(status.to_string())
            }
            None => self.initial_status(kind),
        }
    }

    pub fn create_model(&mut self, new: NewStatusModel) -> DomainResult<StatusModel> {
        if new.name.trim().is_empty() {
            return Err(DomainError::ValidationFailed("status model name is required".into()));
        }
        if new.statuses.is_empty() {
            return Err(DomainError::ValidationFailed(
                "a status model needs at least one status".into(),
            ));
        }
        self.ensure_unique_name(new.entity_kind, &new.name, None)?;

        let mut statuses: Vec<Status> = Vec::with_capacity(new.statuses.len());
        for name in &new.statuses {
            if statuses.iter().any(|s| &s.name == name) {
                return Err(DomainError::ValidationFailed(format!(
                    "duplicate status '{}'",
                    name
                )));
            }
            statuses.push(Status::new(name.clone()));
        }

        let mut model = StatusModel {
            id: Uuid::new_v4(),
            entity_kind: new.entity_kind,
            name: new.name,
            description: new.description,
            is_default: !self.models.values().any(|m| m.entity_kind == new.entity_kind),
            statuses,
            transitions: Vec::new(),
        };
        for transition in new.transitions {
            push_transition(&mut model, transition)?;
        }

        self.models.insert(model.id, model.clone());
        Ok(model)
    }

    pub fn rename_model(&mut self, id: Uuid, name: String) -> DomainResult<()> {
        let kind = self.get(id)?.entity_kind;
        self.ensure_unique_name(kind, &name, Some(id))?;
        self.get_mut(id)?.name = name;
        Ok(())
    }

    pub fn add_status(&mut self, id: Uuid, name: String) -> DomainResult<()> {
        let model = self.get_mut(id)?;
        if model.has_status(&name) {
            return Err(DomainError::conflict(format!(
                "status '{}' already exists in '{}'",
                name, model.name
            )));
        }
        model.statuses.push(Status::new(name));
        Ok(())
    }

    /// Remove a status and every transition touching it.
    ///
    /// `in_use` tells whether any entity of the model's kind currently holds the status.
    pub fn remove_status(&mut self, id: Uuid, name: &str, in_use: bool) -> DomainResult<()> {
        let model = self.get_mut(id)?;
        if !model.has_status(name) {
            return Err(DomainError::InvalidStatus {
                kind: model.entity_kind.to_string(),
                status: name.to_string(),
            });
        }
        if model.is_default && in_use {
            return Err(DomainError::conflict_with_hint(
                format!("status '{}' is in use", name),
                "move the affected items to another status first",
            ));
        }
        if model.statuses.len() == 1 {
            return Err(DomainError::ValidationFailed(
                "a status model needs at least one status".into(),
            ));
        }
        model.statuses.retain(|s| s.name != name);
        model.transitions.retain(|t| t.from != name && t.to != name);
        Ok(())
    }

    pub fn add_transition(&mut self, id: Uuid, transition: StatusTransition) -> DomainResult<()> {
        push_transition(self.get_mut(id)?, transition)
    }

    pub fn remove_transition(&mut self, id: Uuid, transition: &StatusTransition) -> DomainResult<()> {
        let model = self.get_mut(id)?;
        let before = model.transitions.len();
        model.transitions.retain(|t| t != transition);
        if model.transitions.len() == before {
            return Err(DomainError::InvalidTransition {
                kind: model.entity_kind.to_string(),
                from: transition.from.clone(),
                to: transition.to.clone(),
            });
        }
        Ok(())
    }

    /// Make a model the default of its kind, clearing the previous default
    pub fn set_default(&mut self, id: Uuid) -> DomainResult<()> {
        let kind = self.get(id)?.entity_kind;
        for model in self.models.values_mut().filter(|m| m.entity_kind == kind) {
            model.is_default = model.id == id;
        }
        Ok(())
    }

    pub fn delete_model(&mut self, id: Uuid) -> DomainResult<StatusModel> {
        let model = self.get(id)?;
        if model.is_default {
            return Err(DomainError::conflict_with_hint(
                format!("'{}' is the default {} model", model.name, model.entity_kind),
                "make another model the default before deleting this one",
            ));
        }
        self.models
            .remove(&id)
            .ok_or_else(|| DomainError::not_found(ResourceKind::StatusModel, id.to_string()))
    }

    fn ensure_unique_name(&self, kind: EntityKind, name: &str, except: Option<Uuid>) -> DomainResult<()> {
        let taken = self
            .models
            .values()
            .any(|m| m.entity_kind == kind && m.name == name && Some(m.id) != except);
        if taken {
            return Err(DomainError::conflict_with_hint(
                format!("a {} status model named '{}' already exists", kind, name),
                "choose a different name",
            ));
        }
        Ok(())
    }
}

fn push_transition(model: &mut StatusModel, transition: StatusTransition) -> DomainResult<()> {
    for status in [&transition.from, &transition.to] {
        if !model.has_status(status) {
            return Err(DomainError::InvalidStatus {
                kind: model.entity_kind.to_string(),
                status: status.clone(),
            });
        }
    }
    if !model.transitions.contains(&transition) {
        model.transitions.push(transition);
    }
    Ok(())
}

fn default_workflow(kind: EntityKind) -> (&'static [&'static str], &'static [(&'static str, &'static str)]) {
    match kind {
        EntityKind::Epic | EntityKind::UserStory => (
            &["Backlog", "Draft", "In Progress", "Done", "Cancelled"],
            &[
                ("Backlog", "Draft"),
                ("Draft", "Backlog"),
                ("Draft", "In Progress"),
                ("In Progress", "Draft"),
                ("In Progress", "Done"),
                ("Done", "In Progress"),
                ("Backlog", "Cancelled"),
                ("Draft", "Cancelled"),
                ("In Progress", "Cancelled"),
                ("Cancelled", "Backlog"),
            ],
        ),
        EntityKind::AcceptanceCriteria => (
            &["Draft", "Approved"],
            &[("Draft", "Approved"), ("Approved", "Draft")],
        ),
        EntityKind::Requirement => (
            &["Draft", "Active", "Obsolete"],
            &[
                ("Draft", "Active"),
                ("Active", "Obsolete"),
                ("Draft", "Obsolete"),
                ("Obsolete", "Draft"),
            ],
        ),
    }
}
