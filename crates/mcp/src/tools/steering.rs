// Steering document tools

use super::registry::{actor_of, entity_result, parse_args, Tool, ToolEnv};
use super::{json_schema_integer, json_schema_object, json_schema_string};
use crate::context::RequestContext;
use crate::error::McpResult;
use crate::protocol::{CallToolResult, ToolSchema};
use reqhub_core::access::Action;
use reqhub_core::audit::AuditAction;
use reqhub_core::services::{NewSteeringDocument, SteeringDocumentUpdate};
use reqhub_core::types::Page;
use serde::Deserialize;
use serde_json::{json, Value};

const DEFAULT_LIMIT: usize = 50;
const MAX_LIMIT: usize = 1000;

fn schema(name: &str, title: &str, description: &str, properties: Value, required: Vec<&str>) -> ToolSchema {
    ToolSchema {
        name: name.to_string(),
        title: title.to_string(),
        description: description.to_string(),
        input_schema: json_schema_object(properties, required),
    }
}

#[derive(Debug, Deserialize)]
struct ListArgs {
    #[serde(default)]
    epic_id: Option<String>,
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    offset: Option<usize>,
}

/// Tool to list steering documents, optionally those linked to one epic
pub struct ListSteeringDocumentsTool {
    env: ToolEnv,
}

impl ListSteeringDocumentsTool {
    pub fn new(env: ToolEnv) -> Self {
        Self { env }
    }
}

#[async_trait::async_trait]
impl Tool for ListSteeringDocumentsTool {
    fn schema(&self) -> ToolSchema {
        schema(
            "list_steering_documents",
            "List steering documents",
            "List steering documents. Pass epic_id to list only the documents linked to that epic.",
            json!({
                "epic_id": json_schema_string("Epic UUID or reference id"),
                "limit": json_schema_integer("Page size (default: 50, max: 1000)"),
                "offset": json_schema_integer("Number of documents to skip")
            }),
            vec![],
        )
    }

    async fn execute(&self, _ctx: &RequestContext, arguments: Value) -> McpResult<CallToolResult> {
        let args: ListArgs = parse_args(arguments)?;
        let page = Page::new(
            args.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT),
            args.offset.unwrap_or(0),
        );
        let (documents, total) = self
            .env
            .services
            .steering
            .list(args.epic_id.as_deref(), page)
            .await?;

        let summary = match &args.epic_id {
            Some(epic) => format!("{} steering document(s) linked to {}", total, epic),
            None => format!("{} steering document(s)", total),
        };
        Ok(CallToolResult::with_data(
            summary,
            json!({ "steering_documents": documents, "total": total }),
        ))
    }
}

pub struct CreateSteeringDocumentTool {
    env: ToolEnv,
}

impl CreateSteeringDocumentTool {
    pub fn new(env: ToolEnv) -> Self {
        Self { env }
    }
}

#[async_trait::async_trait]
impl Tool for CreateSteeringDocumentTool {
    fn schema(&self) -> ToolSchema {
        schema(
            "create_steering_document",
            "Create steering document",
            "Create a steering document (STD-001) holding guidance that can be linked to epics.",
            json!({
                "title": json_schema_string("Document title"),
                "content": json_schema_string("Markdown content"),
                "description": json_schema_string("Short description")
            }),
            vec!["title", "content"],
        )
    }

    fn action(&self) -> Action {
        Action::Create
    }

    async fn execute(&self, ctx: &RequestContext, arguments: Value) -> McpResult<CallToolResult> {
        let new: NewSteeringDocument = parse_args(arguments.clone())?;
        let document = self.env.services.steering.create(new, actor_of(ctx)?).await?;
        self.env.audit(
            ctx,
            AuditAction::Created {
                resource_kind: "steering_document".into(),
                resource_id: document.reference_id.to_string(),
            },
            &arguments,
        );
        entity_result(
            format!("Created steering document {}: {}", document.reference_id, document.title),
            &document,
        )
    }
}

#[derive(Debug, Deserialize)]
struct DocumentArgs {
    steering_document_id: String,
}

pub struct GetSteeringDocumentTool {
    env: ToolEnv,
}

impl GetSteeringDocumentTool {
    pub fn new(env: ToolEnv) -> Self {
        Self { env }
    }
}

#[async_trait::async_trait]
impl Tool for GetSteeringDocumentTool {
    fn schema(&self) -> ToolSchema {
        schema(
            "get_steering_document",
            "Get steering document",
            "Get a steering document by UUID or reference id (STD-001).",
            json!({
                "steering_document_id": json_schema_string("Steering document UUID or reference id")
            }),
            vec!["steering_document_id"],
        )
    }

    async fn execute(&self, _ctx: &RequestContext, arguments: Value) -> McpResult<CallToolResult> {
        let args: DocumentArgs = parse_args(arguments)?;
        let document = self.env.services.steering.get(&args.steering_document_id).await?;
        entity_result(
            format!("{}: {}", document.reference_id, document.title),
            &document,
        )
    }
}

#[derive(Debug, Deserialize)]
struct UpdateArgs {
    steering_document_id: String,
    #[serde(flatten)]
    update: SteeringDocumentUpdate,
}

pub struct UpdateSteeringDocumentTool {
    env: ToolEnv,
}

impl UpdateSteeringDocumentTool {
    pub fn new(env: ToolEnv) -> Self {
        Self { env }
    }
}

#[async_trait::async_trait]
impl Tool for UpdateSteeringDocumentTool {
    fn schema(&self) -> ToolSchema {
        schema(
            "update_steering_document",
            "Update steering document",
            "Update the title, content or description of a steering document.",
            json!({
                "steering_document_id": json_schema_string("Steering document UUID or reference id"),
                "title": json_schema_string("New title"),
                "content": json_schema_string("New markdown content"),
                "description": json_schema_string("New description")
            }),
            vec!["steering_document_id"],
        )
    }

    fn action(&self) -> Action {
        Action::Update
    }

    async fn execute(&self, ctx: &RequestContext, arguments: Value) -> McpResult<CallToolResult> {
        let args: UpdateArgs = parse_args(arguments.clone())?;
        let document = self
            .env
            .services
            .steering
            .update(&args.steering_document_id, args.update, actor_of(ctx)?)
            .await?;
        self.env.audit(
            ctx,
            AuditAction::Updated {
                resource_kind: "steering_document".into(),
                resource_id: document.reference_id.to_string(),
            },
            &arguments,
        );
        entity_result(format!("Updated steering document {}", document.reference_id), &document)
    }
}

#[derive(Debug, Deserialize)]
struct LinkArgs {
    steering_document_id: String,
    epic_id: String,
}

fn link_schema(name: &str, title: &str, description: &str) -> ToolSchema {
    schema(
        name,
        title,
        description,
        json!({
            "steering_document_id": json_schema_string("Steering document UUID or reference id"),
            "epic_id": json_schema_string("Epic UUID or reference id")
        }),
        vec!["steering_document_id", "epic_id"],
    )
}

pub struct LinkSteeringToEpicTool {
    env: ToolEnv,
}

impl LinkSteeringToEpicTool {
    pub fn new(env: ToolEnv) -> Self {
        Self { env }
    }
}

#[async_trait::async_trait]
impl Tool for LinkSteeringToEpicTool {
    fn schema(&self) -> ToolSchema {
        link_schema(
            "link_steering_to_epic",
            "Link steering document to epic",
            "Attach a steering document to an epic.",
        )
    }

    fn action(&self) -> Action {
        Action::Update
    }

    async fn execute(&self, ctx: &RequestContext, arguments: Value) -> McpResult<CallToolResult> {
        let args: LinkArgs = parse_args(arguments.clone())?;
        let (document_id, epic_id) = self
            .env
            .services
            .steering
            .link(&args.steering_document_id, &args.epic_id, actor_of(ctx)?)
            .await?;
        self.env.audit(
            ctx,
            AuditAction::Linked {
                resource_kind: "steering_document".into(),
                resource_id: args.steering_document_id.clone(),
                target_id: args.epic_id.clone(),
            },
            &arguments,
        );
        Ok(CallToolResult::with_data(
            format!("Linked {} to {}", args.steering_document_id, args.epic_id),
            json!({ "steering_document_id": document_id, "epic_id": epic_id, "linked": true }),
        ))
    }
}

pub struct UnlinkSteeringFromEpicTool {
    env: ToolEnv,
}

impl UnlinkSteeringFromEpicTool {
    pub fn new(env: ToolEnv) -> Self {
        Self { env }
    }
}

#[async_trait::async_trait]
impl Tool for UnlinkSteeringFromEpicTool {
    fn schema(&self) -> ToolSchema {
        link_schema(
            "unlink_steering_from_epic",
            "Unlink steering document from epic",
            "Detach a steering document from an epic.",
        )
    }

    fn action(&self) -> Action {
        Action::Update
    }

    async fn execute(&self, ctx: &RequestContext, arguments: Value) -> McpResult<CallToolResult> {
        let args: LinkArgs = parse_args(arguments.clone())?;
        let (document_id, epic_id) = self
            .env
            .services
            .steering
            .unlink(&args.steering_document_id, &args.epic_id, actor_of(ctx)?)
            .await?;
        self.env.audit(
            ctx,
            AuditAction::Unlinked {
                resource_kind: "steering_document".into(),
                resource_id: args.steering_document_id.clone(),
                target_id: args.epic_id.clone(),
            },
            &arguments,
        );
        Ok(CallToolResult::with_data(
            format!("Unlinked {} from {}", args.steering_document_id, args.epic_id),
            json!({ "steering_document_id": document_id, "epic_id": epic_id, "linked": false }),
        ))
    }
}
