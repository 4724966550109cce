use crate::access::{Action, Actor};
use crate::error::DomainResult;
use crate::status::{NewStatusModel, StatusModel, StatusTransition};
use crate::storage::{Store, StoreState};
use crate::types::EntityKind;
use uuid::Uuid;

/// Administrative edits to status models. Every operation requires the
/// administrator role and returns the model as stored after the change.
#[derive(Clone)]
pub struct StatusModelService {
    store: Store,
}

impl StatusModelService {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub async fn list(&self, kind: Option<EntityKind>) -> Vec<StatusModel> {
        self.store.read().await.status_models.list(kind)
    }

    pub async fn get(&self, id: Uuid) -> DomainResult<StatusModel> {
        self.store.read().await.status_models.get(id).cloned()
    }

    pub async fn create(&self, new: NewStatusModel, actor: &Actor) -> DomainResult<StatusModel> {
        actor.authorize(Action::Administer, "create status model")?;
        let model = self
            .store
            .within_transaction(|state| state.status_models.create_model(new))
            .await?;
        tracing::info!(model_id = %model.id, kind = %model.entity_kind, "Created status model");
        Ok(model)
    }

    pub async fn rename(&self, id: Uuid, name: String, actor: &Actor) -> DomainResult<StatusModel> {
        self.edit(actor, "rename status model", id, |state| {
            state.status_models.rename_model(id, name)
        })
        .await
    }

    pub async fn add_status(&self, id: Uuid, name: String, actor: &Actor) -> DomainResult<StatusModel> {
        self.edit(actor, "add status", id, |state| state.status_models.add_status(id, name))
            .await
    }

    pub async fn remove_status(&self, id: Uuid, name: &str, actor: &Actor) -> DomainResult<StatusModel> {
        self.edit(actor, "remove status", id, |state| {
            let kind = state.status_models.get(id)?.entity_kind;
            let in_use = state.status_in_use(kind, name);
            state.status_models.remove_status(id, name, in_use)
        })
        .await
    }

    pub async fn add_transition(
        &self,
        id: Uuid,
        transition: StatusTransition,
        actor: &Actor,
    ) -> DomainResult<StatusModel> {
        self.edit(actor, "add transition", id, |state| {
            state.status_models.add_transition(id, transition)
        })
        .await
    }

    pub async fn remove_transition(
        &self,
        id: Uuid,
        transition: &StatusTransition,
        actor: &Actor,
    ) -> DomainResult<StatusModel> {
        self.edit(actor, "remove transition", id, |state| {
            state.status_models.remove_transition(id, transition)
        })
        .await
    }

    pub async fn set_default(&self, id: Uuid, actor: &Actor) -> DomainResult<StatusModel> {
        self.edit(actor, "set default status model", id, |state| {
            state.status_models.set_default(id)
        })
        .await
    }

    pub async fn delete(&self, id: Uuid, actor: &Actor) -> DomainResult<StatusModel> {
        actor.authorize(Action::Administer, "delete status model")?;
        let model = self
            .store
            .within_transaction(|state| state.status_models.delete_model(id))
            .await?;
        tracing::info!(model_id = %id, "Deleted status model");
        Ok(model)
    }

    async fn edit<F>(&self, actor: &Actor, operation: &str, id: Uuid, f: F) -> DomainResult<StatusModel>
    where
        F: FnOnce(&mut StoreState) -> DomainResult<()>,
    {
        actor.authorize(Action::Administer, operation)?;
        let model = self
            .store
            .within_transaction(|state| {
                f(state)?;
                state.status_models.get(id).cloned()
            })
            .await?;
        tracing::info!(model_id = %id, operation, "Status model changed");
        Ok(model)
    }
}
