// Prompt lifecycle tools

use super::registry::{actor_of, entity_result, parse_args, Tool, ToolEnv};
use super::{json_schema_object, json_schema_string};
use crate::context::RequestContext;
use crate::error::McpResult;
use crate::protocol::{CallToolResult, ToolSchema};
use reqhub_core::access::Action;
use reqhub_core::audit::AuditAction;
use reqhub_core::services::NewPrompt;
use serde::Deserialize;
use serde_json::{json, Value};

fn prompt_id_schema(name: &str, title: &str, description: &str) -> ToolSchema {
    ToolSchema {
        name: name.to_string(),
        title: title.to_string(),
        description: description.to_string(),
        input_schema: json_schema_object(
            json!({
                "prompt_id": json_schema_string("Prompt UUID, reference id (PROMPT-001) or name")
            }),
            vec!["prompt_id"],
        ),
    }
}

#[derive(Debug, Deserialize)]
struct PromptArgs {
    prompt_id: String,
}

pub struct CreatePromptTool {
    env: ToolEnv,
}

impl CreatePromptTool {
    pub fn new(env: ToolEnv) -> Self {
        Self { env }
    }
}

#[async_trait::async_trait]
impl Tool for CreatePromptTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "create_prompt".to_string(),
            title: "Create prompt".to_string(),
            description: "Store a new prompt template. Names are unique; new prompts start inactive.".to_string(),
            input_schema: json_schema_object(
                json!({
                    "name": json_schema_string("Unique prompt name"),
                    "title": json_schema_string("Display title"),
                    "content": json_schema_string("Prompt text"),
                    "description": json_schema_string("What the prompt is for")
                }),
                vec!["name", "title", "content"],
            ),
        }
    }

    fn action(&self) -> Action {
        Action::Create
    }

    async fn execute(&self, ctx: &RequestContext, arguments: Value) -> McpResult<CallToolResult> {
        let new: NewPrompt = parse_args(arguments.clone())?;
        let prompt = self.env.services.prompts.create(new, actor_of(ctx)?).await?;
        self.env.audit(
            ctx,
            AuditAction::Created {
                resource_kind: "prompt".into(),
                resource_id: prompt.reference_id.to_string(),
            },
            &arguments,
        );
        entity_result(format!("Created prompt {} ({})", prompt.reference_id, prompt.name), &prompt)
    }
}

/// Tool to make one prompt the active one
pub struct ActivatePromptTool {
    env: ToolEnv,
}

impl ActivatePromptTool {
    pub fn new(env: ToolEnv) -> Self {
        Self { env }
    }
}

#[async_trait::async_trait]
impl Tool for ActivatePromptTool {
    fn schema(&self) -> ToolSchema {
        prompt_id_schema(
            "activate_prompt",
            "Activate prompt",
            "Make a prompt the active one. Every other prompt is deactivated.",
        )
    }

    fn action(&self) -> Action {
        Action::Update
    }

    async fn execute(&self, ctx: &RequestContext, arguments: Value) -> McpResult<CallToolResult> {
        let args: PromptArgs = parse_args(arguments.clone())?;
        let prompt = self
            .env
            .services
            .prompts
            .activate(&args.prompt_id, actor_of(ctx)?)
            .await?;
        self.env.audit(
            ctx,
            AuditAction::Activated {
                resource_kind: "prompt".into(),
                resource_id: prompt.reference_id.to_string(),
            },
            &arguments,
        );
        entity_result(format!("Activated prompt {}", prompt.reference_id), &prompt)
    }
}

pub struct DeletePromptTool {
    env: ToolEnv,
}

impl DeletePromptTool {
    pub fn new(env: ToolEnv) -> Self {
        Self { env }
    }
}

#[async_trait::async_trait]
impl Tool for DeletePromptTool {
    fn schema(&self) -> ToolSchema {
        prompt_id_schema("delete_prompt", "Delete prompt", "Delete a prompt template.")
    }

    fn action(&self) -> Action {
        Action::Delete
    }

    async fn execute(&self, ctx: &RequestContext, arguments: Value) -> McpResult<CallToolResult> {
        let args: PromptArgs = parse_args(arguments.clone())?;
        let prompt = self
            .env
            .services
            .prompts
            .delete(&args.prompt_id, actor_of(ctx)?)
            .await?;
        self.env.audit(
            ctx,
            AuditAction::Deleted {
                resource_kind: "prompt".into(),
                resource_id: prompt.reference_id.to_string(),
                cascade_count: 0,
            },
            &arguments,
        );
        Ok(CallToolResult::with_data(
            format!("Deleted prompt {}", prompt.reference_id),
            json!({
                "entity_kind": "prompt",
                "entity_id": prompt.id,
                "reference_id": prompt.reference_id.to_string(),
                "deleted": true
            }),
        ))
    }
}

pub struct GetActivePromptTool {
    env: ToolEnv,
}

impl GetActivePromptTool {
    pub fn new(env: ToolEnv) -> Self {
        Self { env }
    }
}

#[async_trait::async_trait]
impl Tool for GetActivePromptTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "get_active_prompt".to_string(),
            title: "Get active prompt".to_string(),
            description: "Return the currently active prompt, if any".to_string(),
            input_schema: json_schema_object(json!({}), vec![]),
        }
    }

    async fn execute(&self, _ctx: &RequestContext, _arguments: Value) -> McpResult<CallToolResult> {
        let active = self.env.services.prompts.active().await;
        let summary = match &active {
            Some(prompt) => format!("Active prompt: {} ({})", prompt.reference_id, prompt.name),
            None => "No prompt is active".to_string(),
        };
        Ok(CallToolResult::with_data(
            summary,
            json!({ "active": active.is_some(), "prompt": active }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::McpLogger;
    use crate::protocol::ToolContent;
    use reqhub_core::access::{Actor, UserRole};
    use reqhub_core::services::Services;
    use reqhub_core::storage::Store;
    use uuid::Uuid;

    fn data(result: &CallToolResult) -> &Value {
        match &result.content[1] {
            ToolContent::Data { data } => data,
            other => panic!("expected data content, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_single_active_prompt() {
        let env = ToolEnv::new(Services::new(Store::in_memory()), McpLogger::default());
        let ctx = RequestContext::new(
            None,
            Some(Actor::new(Uuid::new_v4(), "pm", UserRole::User)),
        );
        let create = CreatePromptTool::new(env.clone());
        create
            .execute(&ctx, json!({"name": "triage", "title": "Triage", "content": "Sort the backlog"}))
            .await
            .unwrap();
        create
            .execute(&ctx, json!({"name": "review", "title": "Review", "content": "Review REQs"}))
            .await
            .unwrap();

        let get_active = GetActivePromptTool::new(env.clone());
        let none = get_active.execute(&ctx, Value::Null).await.unwrap();
        assert_eq!(data(&none)["active"], false);

        let activate = ActivatePromptTool::new(env.clone());
        activate.execute(&ctx, json!({"prompt_id": "triage"})).await.unwrap();
        activate.execute(&ctx, json!({"prompt_id": "PROMPT-002"})).await.unwrap();

        let active = get_active.execute(&ctx, Value::Null).await.unwrap();
        assert_eq!(data(&active)["prompt"]["name"], "review");
        let (prompts, _) = env.services.prompts.list(Default::default()).await;
        assert_eq!(prompts.iter().filter(|p| p.active).count(), 1);

        DeletePromptTool::new(env.clone())
            .execute(&ctx, json!({"prompt_id": "review"}))
            .await
            .unwrap();
        let none = get_active.execute(&ctx, Value::Null).await.unwrap();
        assert_eq!(data(&none)["active"], false);
    }

    #[tokio::test]
    async fn test_duplicate_name_conflicts() {
        let env = ToolEnv::new(Services::new(Store::in_memory()), McpLogger::default());
        let ctx = RequestContext::new(
            None,
            Some(Actor::new(Uuid::new_v4(), "pm", UserRole::User)),
        );
        let args = json!({"name": "triage", "title": "Triage", "content": "x"});
        CreatePromptTool::new(env.clone()).execute(&ctx, args.clone()).await.unwrap();
        let err = CreatePromptTool::new(env).execute(&ctx, args).await.unwrap_err();
        let rpc = err.to_rpc_error("c");
        assert_eq!(rpc.code, crate::error::CONFLICT);
        assert!(rpc.data.unwrap()["hint"].is_string());
    }
}
