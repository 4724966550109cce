// Tools that create and edit the Epic → User Story → AC → Requirement hierarchy

use super::registry::{actor_of, entity_result, parse_args, Tool, ToolEnv};
use super::{json_schema_boolean, json_schema_integer, json_schema_object, json_schema_string};
use crate::context::RequestContext;
use crate::error::McpResult;
use crate::protocol::{CallToolResult, ToolSchema};
use reqhub_core::access::Action;
use reqhub_core::audit::AuditAction;
use reqhub_core::services::{
    AcceptanceCriteriaUpdate, EpicUpdate, NewAcceptanceCriteria, NewEpic, NewRelationship,
    NewRequirement, NewUserStory, RequirementUpdate, UserStoryUpdate,
};
use reqhub_core::types::EntityKind;
use serde::Deserialize;
use serde_json::{json, Map, Value};

fn created(kind: &str, id: impl ToString) -> AuditAction {
    AuditAction::Created {
        resource_kind: kind.to_string(),
        resource_id: id.to_string(),
    }
}

fn updated(kind: &str, id: impl ToString) -> AuditAction {
    AuditAction::Updated {
        resource_kind: kind.to_string(),
        resource_id: id.to_string(),
    }
}

/// Properties shared by epics, user stories and requirements
fn work_item_properties(extra: Value) -> Value {
    let mut properties = json!({
        "title": json_schema_string("Short title"),
        "description": json_schema_string("Longer description"),
        "priority": json_schema_integer("1 (critical) to 4 (low); defaults to 3"),
        "status": json_schema_string("Status name from the kind's default status model"),
        "assignee_id": json_schema_string("UUID of the assigned user")
    });
    if let (Some(base), Value::Object(more)) = (properties.as_object_mut(), extra) {
        base.extend(more);
    }
    properties
}

fn schema(name: &str, title: &str, description: &str, properties: Value, required: Vec<&str>) -> ToolSchema {
    ToolSchema {
        name: name.to_string(),
        title: title.to_string(),
        description: description.to_string(),
        input_schema: json_schema_object(properties, required),
    }
}

/// Tool to create an epic
pub struct CreateEpicTool {
    env: ToolEnv,
}

impl CreateEpicTool {
    pub fn new(env: ToolEnv) -> Self {
        Self { env }
    }
}

#[async_trait::async_trait]
impl Tool for CreateEpicTool {
    fn schema(&self) -> ToolSchema {
        schema(
            "create_epic",
            "Create epic",
            "Create a new epic. Status defaults to the first status of the epic workflow.",
            work_item_properties(json!({})),
            vec!["title"],
        )
    }

    fn action(&self) -> Action {
        Action::Create
    }

    async fn execute(&self, ctx: &RequestContext, arguments: Value) -> McpResult<CallToolResult> {
        let new: NewEpic = parse_args(arguments.clone())?;
        let epic = self.env.services.epics.create(new, actor_of(ctx)?).await?;
        self.env.audit(ctx, created("epic", &epic.reference_id), &arguments);
        entity_result(format!("Created epic {}: {}", epic.reference_id, epic.title), &epic)
    }
}

#[derive(Debug, Deserialize)]
struct UpdateEpicArgs {
    epic_id: String,
    #[serde(flatten)]
    update: EpicUpdate,
}

/// Tool to update an epic, including status transitions
pub struct UpdateEpicTool {
    env: ToolEnv,
}

impl UpdateEpicTool {
    pub fn new(env: ToolEnv) -> Self {
        Self { env }
    }
}

#[async_trait::async_trait]
impl Tool for UpdateEpicTool {
    fn schema(&self) -> ToolSchema {
        schema(
            "update_epic",
            "Update epic",
            "Update an epic by UUID or reference id (EP-001). A status change must follow the epic workflow.",
            work_item_properties(json!({
                "epic_id": json_schema_string("Epic UUID or reference id")
            })),
            vec!["epic_id"],
        )
    }

    fn action(&self) -> Action {
        Action::Update
    }

    async fn execute(&self, ctx: &RequestContext, arguments: Value) -> McpResult<CallToolResult> {
        let args: UpdateEpicArgs = parse_args(arguments.clone())?;
        let epic = self
            .env
            .services
            .epics
            .update(&args.epic_id, args.update, actor_of(ctx)?)
            .await?;
        self.env.audit(ctx, updated("epic", &epic.reference_id), &arguments);
        entity_result(format!("Updated epic {}", epic.reference_id), &epic)
    }
}

/// Tool to create a user story under an epic
pub struct CreateUserStoryTool {
    env: ToolEnv,
}

impl CreateUserStoryTool {
    pub fn new(env: ToolEnv) -> Self {
        Self { env }
    }
}

#[async_trait::async_trait]
impl Tool for CreateUserStoryTool {
    fn schema(&self) -> ToolSchema {
        schema(
            "create_user_story",
            "Create user story",
            "Create a user story under an existing epic.",
            work_item_properties(json!({
                "epic_id": json_schema_string("Parent epic UUID or reference id")
            })),
            vec!["epic_id", "title"],
        )
    }

    fn action(&self) -> Action {
        Action::Create
    }

    async fn execute(&self, ctx: &RequestContext, arguments: Value) -> McpResult<CallToolResult> {
        let new: NewUserStory = parse_args(arguments.clone())?;
        let story = self.env.services.user_stories.create(new, actor_of(ctx)?).await?;
        self.env.audit(ctx, created("user_story", &story.reference_id), &arguments);
        entity_result(
            format!("Created user story {}: {}", story.reference_id, story.title),
            &story,
        )
    }
}

#[derive(Debug, Deserialize)]
struct UpdateUserStoryArgs {
    user_story_id: String,
    #[serde(flatten)]
    update: UserStoryUpdate,
}

pub struct UpdateUserStoryTool {
    env: ToolEnv,
}

impl UpdateUserStoryTool {
    pub fn new(env: ToolEnv) -> Self {
        Self { env }
    }
}

#[async_trait::async_trait]
impl Tool for UpdateUserStoryTool {
    fn schema(&self) -> ToolSchema {
        schema(
            "update_user_story",
            "Update user story",
            "Update a user story by UUID or reference id (US-001). A status change must follow the user story workflow.",
            work_item_properties(json!({
                "user_story_id": json_schema_string("User story UUID or reference id")
            })),
            vec!["user_story_id"],
        )
    }

    fn action(&self) -> Action {
        Action::Update
    }

    async fn execute(&self, ctx: &RequestContext, arguments: Value) -> McpResult<CallToolResult> {
        let args: UpdateUserStoryArgs = parse_args(arguments.clone())?;
        let story = self
            .env
            .services
            .user_stories
            .update(&args.user_story_id, args.update, actor_of(ctx)?)
            .await?;
        self.env.audit(ctx, updated("user_story", &story.reference_id), &arguments);
        entity_result(format!("Updated user story {}", story.reference_id), &story)
    }
}

fn requirement_properties(id_field: &str, id_description: &str) -> Value {
    let mut extra = Map::new();
    extra.insert(id_field.to_string(), json_schema_string(id_description));
    extra.insert(
        "acceptance_criteria_id".to_string(),
        json_schema_string("Acceptance criteria of the same user story this requirement satisfies"),
    );
    extra.insert(
        "requirement_type".to_string(),
        json_schema_string("Requirement type name or UUID; defaults to functional"),
    );
    work_item_properties(Value::Object(extra))
}

/// Tool to create a requirement under a user story
pub struct CreateRequirementTool {
    env: ToolEnv,
}

impl CreateRequirementTool {
    pub fn new(env: ToolEnv) -> Self {
        Self { env }
    }
}

#[async_trait::async_trait]
impl Tool for CreateRequirementTool {
    fn schema(&self) -> ToolSchema {
        schema(
            "create_requirement",
            "Create requirement",
            "Create a requirement under a user story, optionally tied to one of its acceptance criteria.",
            requirement_properties("user_story_id", "Parent user story UUID or reference id"),
            vec!["user_story_id", "title"],
        )
    }

    fn action(&self) -> Action {
        Action::Create
    }

    async fn execute(&self, ctx: &RequestContext, arguments: Value) -> McpResult<CallToolResult> {
        let new: NewRequirement = parse_args(arguments.clone())?;
        let requirement = self.env.services.requirements.create(new, actor_of(ctx)?).await?;
        self.env
            .audit(ctx, created("requirement", &requirement.reference_id), &arguments);
        entity_result(
            format!("Created requirement {}: {}", requirement.reference_id, requirement.title),
            &requirement,
        )
    }
}

#[derive(Debug, Deserialize)]
struct UpdateRequirementArgs {
    requirement_id: String,
    #[serde(flatten)]
    update: RequirementUpdate,
}

pub struct UpdateRequirementTool {
    env: ToolEnv,
}

impl UpdateRequirementTool {
    pub fn new(env: ToolEnv) -> Self {
        Self { env }
    }
}

#[async_trait::async_trait]
impl Tool for UpdateRequirementTool {
    fn schema(&self) -> ToolSchema {
        schema(
            "update_requirement",
            "Update requirement",
            "Update a requirement by UUID or reference id (REQ-001). A status change must follow the requirement workflow.",
            requirement_properties("requirement_id", "Requirement UUID or reference id"),
            vec!["requirement_id"],
        )
    }

    fn action(&self) -> Action {
        Action::Update
    }

    async fn execute(&self, ctx: &RequestContext, arguments: Value) -> McpResult<CallToolResult> {
        let args: UpdateRequirementArgs = parse_args(arguments.clone())?;
        let requirement = self
            .env
            .services
            .requirements
            .update(&args.requirement_id, args.update, actor_of(ctx)?)
            .await?;
        self.env
            .audit(ctx, updated("requirement", &requirement.reference_id), &arguments);
        entity_result(format!("Updated requirement {}", requirement.reference_id), &requirement)
    }
}

/// Tool to relate two requirements
pub struct CreateRelationshipTool {
    env: ToolEnv,
}

impl CreateRelationshipTool {
    pub fn new(env: ToolEnv) -> Self {
        Self { env }
    }
}

#[async_trait::async_trait]
impl Tool for CreateRelationshipTool {
    fn schema(&self) -> ToolSchema {
        schema(
            "create_relationship",
            "Create requirement relationship",
            "Create a directed relationship (for example depends_on) from one requirement to another.",
            json!({
                "source_requirement_id": json_schema_string("Source requirement UUID or reference id"),
                "target_requirement_id": json_schema_string("Target requirement UUID or reference id"),
                "relationship_type": json_schema_string("Relationship type name or UUID")
            }),
            vec!["source_requirement_id", "target_requirement_id", "relationship_type"],
        )
    }

    fn action(&self) -> Action {
        Action::Create
    }

    async fn execute(&self, ctx: &RequestContext, arguments: Value) -> McpResult<CallToolResult> {
        let new: NewRelationship = parse_args(arguments.clone())?;
        let summary = format!(
            "Linked {} -> {} ({})",
            new.source_requirement_id, new.target_requirement_id, new.relationship_type
        );
        let relationship = self
            .env
            .services
            .requirements
            .create_relationship(new, actor_of(ctx)?)
            .await?;
        self.env.audit(
            ctx,
            AuditAction::Linked {
                resource_kind: "requirement".into(),
                resource_id: relationship.source_requirement_id.to_string(),
                target_id: relationship.target_requirement_id.to_string(),
            },
            &arguments,
        );
        entity_result(summary, &relationship)
    }
}

/// Tool to add acceptance criteria to a user story
pub struct CreateAcceptanceCriteriaTool {
    env: ToolEnv,
}

impl CreateAcceptanceCriteriaTool {
    pub fn new(env: ToolEnv) -> Self {
        Self { env }
    }
}

#[async_trait::async_trait]
impl Tool for CreateAcceptanceCriteriaTool {
    fn schema(&self) -> ToolSchema {
        schema(
            "create_acceptance_criteria",
            "Create acceptance criteria",
            "Add acceptance criteria to a user story.",
            json!({
                "user_story_id": json_schema_string("User story UUID or reference id"),
                "description": json_schema_string("Testable condition the story must satisfy")
            }),
            vec!["user_story_id", "description"],
        )
    }

    fn action(&self) -> Action {
        Action::Create
    }

    async fn execute(&self, ctx: &RequestContext, arguments: Value) -> McpResult<CallToolResult> {
        let new: NewAcceptanceCriteria = parse_args(arguments.clone())?;
        let criteria = self
            .env
            .services
            .acceptance_criteria
            .create(new, actor_of(ctx)?)
            .await?;
        self.env
            .audit(ctx, created("acceptance_criteria", &criteria.reference_id), &arguments);
        entity_result(format!("Created acceptance criteria {}", criteria.reference_id), &criteria)
    }
}

#[derive(Debug, Deserialize)]
struct UpdateAcceptanceCriteriaArgs {
    acceptance_criteria_id: String,
    #[serde(flatten)]
    update: AcceptanceCriteriaUpdate,
}

pub struct UpdateAcceptanceCriteriaTool {
    env: ToolEnv,
}

impl UpdateAcceptanceCriteriaTool {
    pub fn new(env: ToolEnv) -> Self {
        Self { env }
    }
}

#[async_trait::async_trait]
impl Tool for UpdateAcceptanceCriteriaTool {
    fn schema(&self) -> ToolSchema {
        schema(
            "update_acceptance_criteria",
            "Update acceptance criteria",
            "Update the description of acceptance criteria by UUID or reference id (AC-001).",
            json!({
                "acceptance_criteria_id": json_schema_string("Acceptance criteria UUID or reference id"),
                "description": json_schema_string("New description")
            }),
            vec!["acceptance_criteria_id"],
        )
    }

    fn action(&self) -> Action {
        Action::Update
    }

    async fn execute(&self, ctx: &RequestContext, arguments: Value) -> McpResult<CallToolResult> {
        let args: UpdateAcceptanceCriteriaArgs = parse_args(arguments.clone())?;
        let criteria = self
            .env
            .services
            .acceptance_criteria
            .update(&args.acceptance_criteria_id, args.update, actor_of(ctx)?)
            .await?;
        self.env
            .audit(ctx, updated("acceptance_criteria", &criteria.reference_id), &arguments);
        entity_result(format!("Updated acceptance criteria {}", criteria.reference_id), &criteria)
    }
}

#[derive(Debug, Deserialize)]
struct DeleteAcceptanceCriteriaArgs {
    acceptance_criteria_id: String,
    #[serde(default)]
    force: bool,
}

/// Tool to delete acceptance criteria through the deletion engine
pub struct DeleteAcceptanceCriteriaTool {
    env: ToolEnv,
}

impl DeleteAcceptanceCriteriaTool {
    pub fn new(env: ToolEnv) -> Self {
        Self { env }
    }
}

#[async_trait::async_trait]
impl Tool for DeleteAcceptanceCriteriaTool {
    fn schema(&self) -> ToolSchema {
        schema(
            "delete_acceptance_criteria",
            "Delete acceptance criteria",
            "Delete acceptance criteria. Deleting the last criteria of a user story needs force=true. Requirements linked to the criteria are kept and unlinked.",
            json!({
                "acceptance_criteria_id": json_schema_string("Acceptance criteria UUID or reference id"),
                "force": json_schema_boolean("Delete even when the story would be left without criteria")
            }),
            vec!["acceptance_criteria_id"],
        )
    }

    fn action(&self) -> Action {
        Action::Delete
    }

    async fn execute(&self, ctx: &RequestContext, arguments: Value) -> McpResult<CallToolResult> {
        let args: DeleteAcceptanceCriteriaArgs = parse_args(arguments.clone())?;
        let result = self
            .env
            .services
            .acceptance_criteria
            .delete(&args.acceptance_criteria_id, actor_of(ctx)?, args.force)
            .await?;
        self.env.audit(
            ctx,
            AuditAction::Deleted {
                resource_kind: EntityKind::AcceptanceCriteria.as_str().into(),
                resource_id: result.reference_id.clone(),
                cascade_count: result.cascade_deleted.len(),
            },
            &arguments,
        );
        entity_result(format!("Deleted acceptance criteria {}", result.reference_id), &result)
    }
}
