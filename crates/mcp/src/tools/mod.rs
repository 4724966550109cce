pub mod hierarchy;
pub mod prompts;
pub mod search;
pub mod steering;
mod registry;
mod validate;

pub use hierarchy::{
    CreateAcceptanceCriteriaTool, CreateEpicTool, CreateRelationshipTool, CreateRequirementTool,
    CreateUserStoryTool, DeleteAcceptanceCriteriaTool, UpdateAcceptanceCriteriaTool,
    UpdateEpicTool, UpdateRequirementTool, UpdateUserStoryTool,
};
pub use prompts::{ActivatePromptTool, CreatePromptTool, DeletePromptTool, GetActivePromptTool};
pub use registry::{
    actor_of, entity_result, json_schema_array, json_schema_boolean, json_schema_enum,
    json_schema_integer, json_schema_object, json_schema_string, parse_args, Tool, ToolEnv,
    ToolRegistry,
};
pub use search::{SearchGlobalTool, SearchRequirementsTool};
pub use steering::{
    CreateSteeringDocumentTool, GetSteeringDocumentTool, LinkSteeringToEpicTool,
    ListSteeringDocumentsTool, UnlinkSteeringFromEpicTool, UpdateSteeringDocumentTool,
};
pub use validate::validate_arguments;

use std::sync::Arc;

/// Register the full catalog in its published order
pub fn register_catalog(registry: &mut ToolRegistry, env: &ToolEnv) {
    let tools: Vec<Arc<dyn Tool>> = vec![
        Arc::new(CreateEpicTool::new(env.clone())),
        Arc::new(UpdateEpicTool::new(env.clone())),
        Arc::new(CreateUserStoryTool::new(env.clone())),
        Arc::new(UpdateUserStoryTool::new(env.clone())),
        Arc::new(CreateRequirementTool::new(env.clone())),
        Arc::new(UpdateRequirementTool::new(env.clone())),
        Arc::new(CreateRelationshipTool::new(env.clone())),
        Arc::new(CreateAcceptanceCriteriaTool::new(env.clone())),
        Arc::new(UpdateAcceptanceCriteriaTool::new(env.clone())),
        Arc::new(DeleteAcceptanceCriteriaTool::new(env.clone())),
        Arc::new(SearchGlobalTool::new(env.clone())),
        Arc::new(SearchRequirementsTool::new(env.clone())),
        Arc::new(ListSteeringDocumentsTool::new(env.clone())),
        Arc::new(CreateSteeringDocumentTool::new(env.clone())),
        Arc::new(GetSteeringDocumentTool::new(env.clone())),
        Arc::new(UpdateSteeringDocumentTool::new(env.clone())),
        Arc::new(LinkSteeringToEpicTool::new(env.clone())),
        Arc::new(UnlinkSteeringFromEpicTool::new(env.clone())),
        Arc::new(CreatePromptTool::new(env.clone())),
        Arc::new(ActivatePromptTool::new(env.clone())),
        Arc::new(DeletePromptTool::new(env.clone())),
        Arc::new(GetActivePromptTool::new(env.clone())),
    ];
    for tool in tools {
        registry.register(tool);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RequestContext;
    use crate::error::McpError;
    use crate::logging::McpLogger;
    use crate::protocol::CallToolParams;
    use reqhub_core::access::{Actor, UserRole};
    use reqhub_core::services::Services;
    use reqhub_core::storage::Store;
    use reqhub_core::DomainError;
    use serde_json::json;
    use uuid::Uuid;

    fn registry() -> ToolRegistry {
        let logger = McpLogger::default();
        let env = ToolEnv::new(Services::new(Store::in_memory()), logger.clone());
        let mut registry = ToolRegistry::new(logger);
        register_catalog(&mut registry, &env);
        registry
    }

    #[test]
    fn test_catalog_is_complete_and_ordered() {
        let names: Vec<String> = registry().list_schemas().into_iter().map(|s| s.name).collect();
        assert_eq!(names.len(), 22);
        assert_eq!(names[0], "create_epic");
        assert_eq!(names[9], "delete_acceptance_criteria");
        assert_eq!(names[10], "search_global");
        assert_eq!(names[12], "list_steering_documents");
        assert_eq!(names[21], "get_active_prompt");
    }

    #[test]
    fn test_every_schema_is_described() {
        for schema in registry().list_schemas() {
            assert_eq!(schema.input_schema["type"], "object", "{}", schema.name);
            assert!(!schema.title.is_empty());
            let properties = schema.input_schema["properties"].as_object().unwrap();
            for (field, property) in properties {
                assert!(property["type"].is_string(), "{}.{}", schema.name, field);
                assert!(property["description"].is_string(), "{}.{}", schema.name, field);
            }
            for required in schema.input_schema["required"].as_array().unwrap() {
                assert!(properties.contains_key(required.as_str().unwrap()));
            }
        }
    }

    #[tokio::test]
    async fn test_call_enforces_schema_and_role() {
        let registry = registry();
        let commenter = RequestContext::new(
            None,
            Some(Actor::new(Uuid::new_v4(), "viewer", UserRole::Commenter)),
        );

        let err = registry
            .call(
                &commenter,
                CallToolParams {
                    name: "create_epic".into(),
                    arguments: json!({}),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::InvalidParams { ref field, .. } if field == "title"));

        let err = registry
            .call(
                &commenter,
                CallToolParams {
                    name: "create_epic".into(),
                    arguments: json!({"title": "t"}),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::Domain(DomainError::Forbidden(_))));

        let read = registry
            .call(
                &commenter,
                CallToolParams {
                    name: "get_active_prompt".into(),
                    arguments: serde_json::Value::Null,
                },
            )
            .await;
        assert!(read.is_ok());

        let err = registry
            .call(
                &commenter,
                CallToolParams {
                    name: "drop_database".into(),
                    arguments: json!({}),
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), crate::error::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_call_requires_actor() {
        let err = registry()
            .call(
                &RequestContext::new(None, None),
                CallToolParams {
                    name: "get_active_prompt".into(),
                    arguments: json!({}),
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), crate::error::UNAUTHORIZED);
    }
}
