//! Resource reader: turns parsed resource URIs into JSON documents.

use crate::context::RequestContext;
use crate::error::{McpError, McpResult};
use crate::logging::McpLogger;
use crate::protocol::{ReadResourceResult, Resource, ResourceContents, JSON_MIME_TYPE};
use crate::uri::{CollectionKind, EntityUri, ResourceUri, SubPath, UriScheme};
use reqhub_core::services::{EpicFilter, RequirementFilter, Services, UserStoryFilter};
use reqhub_core::types::{Page, ReferenceId};
use serde_json::{json, Map, Value};
use std::time::Instant;

/// Upper bound on items returned by a collection read
pub const COLLECTION_LIMIT: usize = 1000;
/// Page size for `user-story://…/acceptance-criteria`
pub const CRITERIA_PAGE: usize = 100;

#[derive(Clone)]
pub struct ResourceReader {
    services: Services,
    logger: McpLogger,
}

impl ResourceReader {
    pub fn new(services: Services, logger: McpLogger) -> Self {
        Self { services, logger }
    }

    /// Static listing for `resources/list`
    pub fn list(&self) -> Vec<Resource> {
        let mut resources: Vec<Resource> = CollectionKind::ALL
            .iter()
            .map(|kind| Resource {
                uri: kind.uri(),
                name: kind.plural().to_string(),
                description: Some(format!(
                    "All {} (up to {})",
                    kind.plural().replace('_', " "),
                    COLLECTION_LIMIT
                )),
                mime_type: JSON_MIME_TYPE.to_string(),
            })
            .collect();
        resources.push(Resource {
            uri: ResourceUri::ACTIVE_PROMPT.to_string(),
            name: "active_prompt".to_string(),
            description: Some("The currently active prompt, if any".to_string()),
            mime_type: JSON_MIME_TYPE.to_string(),
        });
        resources
    }

    pub async fn read(&self, ctx: &RequestContext, uri: &str) -> McpResult<ReadResourceResult> {
        let started = Instant::now();
        let parsed = ResourceUri::parse(uri)?;

        let (canonical, body) = match parsed {
            ResourceUri::Entity(entity) => {
                let body = self.read_entity(&entity).await?;
                (entity.to_string(), body)
            }
            ResourceUri::CollectionItem { kind, id } => {
                let reference_id = self.reference_of(kind, &id.to_string()).await?;
                let entity = EntityUri::item(kind.scheme(), reference_id);
                let body = self.read_entity(&entity).await?;
                (entity.to_string(), body)
            }
            ResourceUri::Collection(kind) => (kind.uri(), self.read_collection(kind).await?),
            ResourceUri::ActivePrompt => {
                (ResourceUri::ACTIVE_PROMPT.to_string(), self.read_active_prompt().await?)
            }
        };

        let elapsed = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.logger
            .performance(ctx, "resources/read", elapsed, &json!({ "uri": canonical }));

        Ok(ReadResourceResult {
            contents: vec![ResourceContents {
                uri: canonical,
                mime_type: JSON_MIME_TYPE.to_string(),
                text: serde_json::to_string(&body)?,
            }],
        })
    }

    async fn reference_of(&self, kind: CollectionKind, key: &str) -> McpResult<ReferenceId> {
        let services = &self.services;
        let reference_id = match kind {
            CollectionKind::Epics => services.epics.get(key).await?.reference_id,
            CollectionKind::UserStories => services.user_stories.get(key).await?.reference_id,
            CollectionKind::Requirements => services.requirements.get(key).await?.reference_id,
            CollectionKind::AcceptanceCriteria => {
                services.acceptance_criteria.get(key).await?.reference_id
            }
            CollectionKind::Prompts => services.prompts.get(key).await?.reference_id,
        };
        Ok(reference_id)
    }

    async fn read_entity(&self, uri: &EntityUri) -> McpResult<Value> {
        let services = &self.services;
        let key = uri.reference_id.to_string();
        let status = uri.parameter("status").map(str::to_string);
        let everything = Page::new(COLLECTION_LIMIT, 0);

        let body = match (uri.scheme, uri.sub_path) {
            (UriScheme::Epic, None) => serde_json::to_value(services.epics.get(&key).await?)?,
            (UriScheme::Epic, Some(SubPath::Hierarchy)) => {
                serde_json::to_value(services.epics.hierarchy(&key).await?)?
            }
            (UriScheme::Epic, Some(SubPath::UserStories)) => {
                let filter = UserStoryFilter {
                    epic_id: Some(key.clone()),
                    status,
                };
                let (stories, _) = services.user_stories.list(&filter, everything).await?;
                json!({ "epic_id": key, "user_stories": stories, "count": stories.len() })
            }
            (UriScheme::UserStory, None) => {
                serde_json::to_value(services.user_stories.get(&key).await?)?
            }
            (UriScheme::UserStory, Some(SubPath::Requirements)) => {
                let filter = RequirementFilter {
                    user_story_id: Some(key.clone()),
                    status,
                    requirement_type: uri.parameter("type").map(str::to_string),
                };
                let (requirements, _) = services.requirements.list(&filter, everything).await?;
                json!({
                    "user_story_id": key,
                    "requirements": requirements,
                    "count": requirements.len()
                })
            }
            (UriScheme::UserStory, Some(SubPath::AcceptanceCriteria)) => {
                let (criteria, total) = services
                    .acceptance_criteria
                    .list(Some(&key), Page::new(CRITERIA_PAGE, 0))
                    .await?;
                json!({
                    "user_story_id": key,
                    "acceptance_criteria": criteria,
                    "count": criteria.len(),
                    "total": total
                })
            }
            (UriScheme::Requirement, None) => {
                serde_json::to_value(services.requirements.get(&key).await?)?
            }
            (UriScheme::Requirement, Some(SubPath::Relationships)) => {
                let mut body = serde_json::to_value(services.requirements.get(&key).await?)?;
                let relationships = services.requirements.relationships(&key).await?;
                body["source_relationships"] = serde_json::to_value(relationships.source_relationships)?;
                body["target_relationships"] = serde_json::to_value(relationships.target_relationships)?;
                body
            }
            (UriScheme::AcceptanceCriteria, None) => {
                serde_json::to_value(services.acceptance_criteria.get(&key).await?)?
            }
            (UriScheme::Prompt, None) => serde_json::to_value(services.prompts.get(&key).await?)?,
            (scheme, Some(sub_path)) => {
                return Err(McpError::InvalidUri(format!(
                    "'{}' has no '{}' view",
                    scheme,
                    sub_path.as_str()
                )));
            }
        };
        Ok(body)
    }

    async fn read_collection(&self, kind: CollectionKind) -> McpResult<Value> {
        let services = &self.services;
        let page = Page::new(COLLECTION_LIMIT, 0);
        let items = match kind {
            CollectionKind::Epics => {
                serde_json::to_value(services.epics.list(&EpicFilter::default(), page).await?.0)?
            }
            CollectionKind::UserStories => serde_json::to_value(
                services
                    .user_stories
                    .list(&UserStoryFilter::default(), page)
                    .await?
                    .0,
            )?,
            CollectionKind::Requirements => serde_json::to_value(
                services
                    .requirements
                    .list(&RequirementFilter::default(), page)
                    .await?
                    .0,
            )?,
            CollectionKind::AcceptanceCriteria => {
                serde_json::to_value(services.acceptance_criteria.list(None, page).await?.0)?
            }
            CollectionKind::Prompts => serde_json::to_value(services.prompts.list(page).await.0)?,
        };
        let count = items.as_array().map_or(0, Vec::len);
        let mut body = Map::new();
        body.insert(kind.plural().to_string(), items);
        body.insert("count".to_string(), json!(count));
        Ok(Value::Object(body))
    }

    async fn read_active_prompt(&self) -> McpResult<Value> {
        let active = self.services.prompts.active().await;
        let description = match &active {
            Some(prompt) => format!("Active prompt '{}'", prompt.name),
            None => "No prompt is currently active".to_string(),
        };
        Ok(json!({
            "type": "active_prompt",
            "active": active.is_some(),
            "prompt": active,
            "description": description
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqhub_core::access::{Actor, UserRole};
    use reqhub_core::services::{
        NewAcceptanceCriteria, NewEpic, NewPrompt, NewRelationship, NewRequirement, NewUserStory,
    };
    use reqhub_core::storage::Store;
    use reqhub_core::DomainError;
    use uuid::Uuid;

    struct Fixture {
        reader: ResourceReader,
        services: Services,
        actor: Actor,
        ctx: RequestContext,
    }

    fn fixture() -> Fixture {
        let services = Services::new(Store::in_memory());
        let actor = Actor::new(Uuid::new_v4(), "pm", UserRole::User);
        Fixture {
            reader: ResourceReader::new(services.clone(), McpLogger::default()),
            services,
            ctx: RequestContext::new(None, Some(actor.clone())),
            actor,
        }
    }

    fn body(result: &ReadResourceResult) -> Value {
        serde_json::from_str(&result.contents[0].text).unwrap()
    }

    #[tokio::test]
    async fn test_epic_hierarchy() {
        let f = fixture();
        f.services.epics.create(NewEpic::titled("Accounts"), &f.actor).await.unwrap();
        f.services
            .user_stories
            .create(NewUserStory::titled("EP-001", "Login"), &f.actor)
            .await
            .unwrap();

        let result = f.reader.read(&f.ctx, "epic://EP-001/hierarchy").await.unwrap();
        assert_eq!(result.contents[0].mime_type, "application/json");
        let body = body(&result);
        assert_eq!(body["reference_id"], "EP-001");
        let stories = body["user_stories"].as_array().unwrap();
        assert_eq!(stories.len(), 1);
        assert_eq!(stories[0]["reference_id"], "US-001");
        assert_eq!(stories[0]["title"], "Login");
    }

    #[tokio::test]
    async fn test_sub_path_views_and_status_filter() {
        let f = fixture();
        f.services.epics.create(NewEpic::titled("E"), &f.actor).await.unwrap();
        f.services
            .user_stories
            .create(NewUserStory::titled("EP-001", "S"), &f.actor)
            .await
            .unwrap();
        f.services
            .acceptance_criteria
            .create(
                NewAcceptanceCriteria {
                    user_story_id: "US-001".into(),
                    description: "works".into(),
                },
                &f.actor,
            )
            .await
            .unwrap();
        f.services
            .requirements
            .create(NewRequirement::titled("US-001", "R1"), &f.actor)
            .await
            .unwrap();

        let stories = body(&f.reader.read(&f.ctx, "epic://EP-001/user-stories").await.unwrap());
        assert_eq!(stories["count"], 1);

        let criteria =
            body(&f.reader.read(&f.ctx, "user-story://US-001/acceptance-criteria").await.unwrap());
        assert_eq!(criteria["acceptance_criteria"][0]["reference_id"], "AC-001");

        let drafts =
            body(&f.reader.read(&f.ctx, "user-story://US-001/requirements?status=Draft").await.unwrap());
        assert_eq!(drafts["count"], 1);
        let active =
            body(&f.reader.read(&f.ctx, "user-story://US-001/requirements?status=Active").await.unwrap());
        assert_eq!(active["count"], 0);
    }

    #[tokio::test]
    async fn test_relationships_view() {
        let f = fixture();
        f.services.epics.create(NewEpic::titled("E"), &f.actor).await.unwrap();
        f.services
            .user_stories
            .create(NewUserStory::titled("EP-001", "S"), &f.actor)
            .await
            .unwrap();
        for title in ["A", "B"] {
            f.services
                .requirements
                .create(NewRequirement::titled("US-001", title), &f.actor)
                .await
                .unwrap();
        }
        f.services
            .requirements
            .create_relationship(
                NewRelationship {
                    source_requirement_id: "REQ-001".into(),
                    target_requirement_id: "REQ-002".into(),
                    relationship_type: "blocks".into(),
                },
                &f.actor,
            )
            .await
            .unwrap();

        let source = body(&f.reader.read(&f.ctx, "requirement://REQ-001/relationships").await.unwrap());
        assert_eq!(source["reference_id"], "REQ-001");
        assert_eq!(source["source_relationships"].as_array().unwrap().len(), 1);
        assert!(source["target_relationships"].as_array().unwrap().is_empty());

        let target = body(&f.reader.read(&f.ctx, "requirement://REQ-002/relationships").await.unwrap());
        assert_eq!(target["target_relationships"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_collections_and_items() {
        let f = fixture();
        let epic = f.services.epics.create(NewEpic::titled("E"), &f.actor).await.unwrap();

        let all = body(&f.reader.read(&f.ctx, "requirements://epics").await.unwrap());
        assert_eq!(all["count"], 1);
        assert_eq!(all["epics"][0]["reference_id"], "EP-001");

        let by_uuid = f
            .reader
            .read(&f.ctx, &format!("requirements://epics/{}", epic.id))
            .await
            .unwrap();
        assert_eq!(by_uuid.contents[0].uri, "epic://EP-001");

        let by_ref = f.reader.read(&f.ctx, "requirements://epics/EP-001").await.unwrap();
        assert_eq!(body(&by_ref)["title"], "E");

        let empty = body(&f.reader.read(&f.ctx, "requirements://user-stories").await.unwrap());
        assert_eq!(empty["count"], 0);
        assert!(empty["user_stories"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_active_prompt() {
        let f = fixture();
        let none = body(&f.reader.read(&f.ctx, "requirements://prompts/active").await.unwrap());
        assert_eq!(none["type"], "active_prompt");
        assert_eq!(none["active"], false);
        assert!(none["prompt"].is_null());

        f.services
            .prompts
            .create(
                NewPrompt {
                    name: "triage".into(),
                    title: "Triage".into(),
                    content: "Sort it".into(),
                    description: None,
                },
                &f.actor,
            )
            .await
            .unwrap();
        f.services.prompts.activate("triage", &f.actor).await.unwrap();

        let some = body(&f.reader.read(&f.ctx, "requirements://prompts/active").await.unwrap());
        assert_eq!(some["active"], true);
        assert_eq!(some["prompt"]["name"], "triage");

        let prompt = body(&f.reader.read(&f.ctx, "prompt://PROMPT-001").await.unwrap());
        assert_eq!(prompt["active"], true);
    }

    #[tokio::test]
    async fn test_not_found_and_bad_uri() {
        let f = fixture();
        let err = f.reader.read(&f.ctx, "epic://EP-404").await.unwrap_err();
        assert!(matches!(err, McpError::Domain(DomainError::NotFound { .. })));
        assert_eq!(err.code(), crate::error::RESOURCE_NOT_FOUND);

        let err = f.reader.read(&f.ctx, "epic://US-001").await.unwrap_err();
        assert_eq!(err.code(), crate::error::INVALID_PARAMS);
    }

    #[test]
    fn test_static_listing() {
        let f = fixture();
        let uris: Vec<String> = f.reader.list().into_iter().map(|r| r.uri).collect();
        assert_eq!(uris.len(), 6);
        assert!(uris.contains(&"requirements://epics".to_string()));
        assert!(uris.contains(&"requirements://prompts/active".to_string()));
    }
}
