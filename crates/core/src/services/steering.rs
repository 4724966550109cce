use super::{paginate, required_text};
use crate::access::{Action, Actor};
use crate::error::{DomainError, DomainResult};
use crate::storage::Store;
use crate::types::{Page, RefPrefix, SteeringDocument};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewSteeringDocument {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SteeringDocumentUpdate {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Clone)]
pub struct SteeringService {
    store: Store,
}

impl SteeringService {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub async fn get(&self, key: &str) -> DomainResult<SteeringDocument> {
        self.store.read().await.steering_document(key).cloned()
    }

    /// All documents, or only those linked to `epic`
    pub async fn list(
        &self,
        epic: Option<&str>,
        page: Page,
    ) -> DomainResult<(Vec<SteeringDocument>, usize)> {
        let state = self.store.read().await;
        let mut documents: Vec<SteeringDocument> = match epic {
            Some(key) => {
                let epic_id = state.epic(key)?.id;
                state.documents_of_epic(epic_id).into_iter().cloned().collect()
            }
            None => state.steering_documents.values().cloned().collect(),
        };
        documents.sort_by_key(|d| (d.created_at, d.id));
        Ok(paginate(documents, page))
    }

    pub async fn create(
        &self,
        new: NewSteeringDocument,
        actor: &Actor,
    ) -> DomainResult<SteeringDocument> {
        actor.authorize(Action::Create, "create steering document")?;
        let title = required_text("title", &new.title)?;
        let content = required_text("content", &new.content)?;

        let document = self
            .store
            .within_transaction(|state| {
                let now = Utc::now();
                let document = SteeringDocument {
                    id: Uuid::new_v4(),
                    reference_id: state.next_reference(RefPrefix::Std),
                    title,
                    description: new.description,
                    content,
                    creator_id: actor.user_id,
                    created_at: now,
                    updated_at: now,
                };
                state.steering_documents.insert(document.id, document.clone());
                Ok(document)
            })
            .await?;

        tracing::info!(reference_id = %document.reference_id, "Created steering document");
        Ok(document)
    }

    pub async fn update(
        &self,
        key: &str,
        update: SteeringDocumentUpdate,
        actor: &Actor,
    ) -> DomainResult<SteeringDocument> {
        actor.authorize(Action::Update, "update steering document")?;
        self.store
            .within_transaction(|state| {
                let mut document = state.steering_document(key)?.clone();
                if let Some(title) = update.title.as_deref() {
                    document.title = required_text("title", title)?;
                }
                if let Some(content) = update.content.as_deref() {
                    document.content = required_text("content", content)?;
                }
                if let Some(description) = update.description {
                    document.description = Some(description);
                }
                document.updated_at = Utc::now();
                state.steering_documents.insert(document.id, document.clone());
                Ok(document)
            })
            .await
    }

    /// Link a document to an epic; linking twice is a conflict
    pub async fn link(&self, document: &str, epic: &str, actor: &Actor) -> DomainResult<(Uuid, Uuid)> {
        actor.authorize(Action::Update, "link steering document")?;
        self.store
            .within_transaction(|state| {
                let doc_id = state.steering_document(document)?.id;
                let epic_id = state.epic(epic)?.id;
                if !state.epic_steering_links.insert((epic_id, doc_id)) {
                    return Err(DomainError::conflict(format!(
                        "{} is already linked to {}",
                        document, epic
                    )));
                }
                Ok((doc_id, epic_id))
            })
            .await
    }

    pub async fn unlink(&self, document: &str, epic: &str, actor: &Actor) -> DomainResult<(Uuid, Uuid)> {
        actor.authorize(Action::Update, "unlink steering document")?;
        self.store
            .within_transaction(|state| {
                let doc_id = state.steering_document(document)?.id;
                let epic_id = state.epic(epic)?.id;
                if !state.epic_steering_links.remove(&(epic_id, doc_id)) {
                    return Err(DomainError::ValidationFailed(format!(
                        "{} is not linked to {}",
                        document, epic
                    )));
                }
                Ok((doc_id, epic_id))
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::UserRole;
    use crate::services::{EpicService, NewEpic};

    #[tokio::test]
    async fn test_link_lifecycle() {
        let store = Store::in_memory();
        let actor = Actor::new(Uuid::new_v4(), "lead", UserRole::User);
        EpicService::new(store.clone())
            .create(NewEpic::titled("Mobile"), &actor)
            .await
            .unwrap();
        let steering = SteeringService::new(store);

        let document = steering
            .create(
                NewSteeringDocument {
                    title: "Style guide".into(),
                    content: "Use plain language.".into(),
                    description: None,
                },
                &actor,
            )
            .await
            .unwrap();
        assert_eq!(document.reference_id.to_string(), "STD-001");

        steering.link("STD-001", "EP-001", &actor).await.unwrap();
        let err = steering.link("STD-001", "EP-001", &actor).await.unwrap_err();
        assert!(matches!(err, DomainError::Conflict { .. }));

        let (linked, total) = steering.list(Some("EP-001"), Page::default()).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(linked[0].id, document.id);

        steering.unlink("STD-001", "EP-001", &actor).await.unwrap();
        let (linked, _) = steering.list(Some("EP-001"), Page::default()).await.unwrap();
        assert!(linked.is_empty());
        assert!(steering.unlink("STD-001", "EP-001", &actor).await.is_err());
    }
}
