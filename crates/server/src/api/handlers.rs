use super::ApiResult;
use crate::config::AppState;
use axum::{
    body::Bytes,
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use reqhub_core::{
    audit::AuditAction,
    deletion::{DeletionResult, DependencyInfo},
    status::{NewStatusModel, StatusModel, StatusTransition},
    types::{RelationshipType, RequirementType},
    Actor, DomainError, EntityKind,
};
use reqhub_mcp::RequestContext;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

/// Accepts `epic`, `epics`, `user_story`, `user-stories` and so on
fn parse_kind(raw: &str) -> Result<EntityKind, DomainError> {
    let normalized = raw.to_ascii_lowercase().replace('-', "_");
    let singular = match normalized.as_str() {
        "epics" => "epic",
        "user_stories" | "stories" => "user_story",
        "requirements" => "requirement",
        other => other,
    };
    singular.parse()
}

fn require_actor(ctx: &RequestContext) -> Result<&Actor, DomainError> {
    ctx.actor.as_ref().ok_or(DomainError::Unauthorized)
}

#[derive(Debug, Default, Deserialize)]
pub struct ForceQuery {
    #[serde(default)]
    pub force: bool,
}

/// MCP channel. Notification-only payloads get `202 Accepted`.
pub async fn mcp(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    body: Bytes,
) -> Response {
    match state.mcp.handle_payload(&ctx, &body).await {
        Some(response) => (StatusCode::OK, Json(response)).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}

pub async fn get_dependencies(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Path((kind, id)): Path<(String, String)>,
) -> ApiResult<Json<DependencyInfo>> {
    require_actor(&ctx)?;
    let kind = parse_kind(&kind)?;
    let info = state.services.deletion.describe_dependencies(kind, &id).await?;
    Ok(Json(info))
}

pub async fn confirm_deletion(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Path((entity_type, id)): Path<(String, String)>,
) -> ApiResult<Json<DependencyInfo>> {
    require_actor(&ctx)?;
    let info = state.services.deletion.confirm(&entity_type, &id).await?;
    Ok(Json(info))
}

/// Delete an entity; `force=true` cascades through its dependents
pub async fn delete_entity(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Path((kind, id)): Path<(String, String)>,
    Query(query): Query<ForceQuery>,
) -> ApiResult<Json<DeletionResult>> {
    let actor = require_actor(&ctx)?;
    let kind = parse_kind(&kind)?;
    let result = state
        .services
        .deletion
        .delete(kind, &id, actor, query.force)
        .await?;

    state.logger.audit(
        &ctx,
        AuditAction::Deleted {
            resource_kind: kind.to_string(),
            resource_id: result.reference_id.clone(),
            cascade_count: result.cascade_deleted.len(),
        },
        &json!({
            "force": query.force,
            "relationships_removed": result.relationships_removed,
            "transaction_id": result.transaction_id,
        }),
    );
    Ok(Json(result))
}

#[derive(Debug, Default, Deserialize)]
pub struct StatusModelQuery {
    pub kind: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListStatusModelsResponse {
    pub status_models: Vec<StatusModel>,
}

pub async fn list_status_models(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Query(query): Query<StatusModelQuery>,
) -> ApiResult<Json<ListStatusModelsResponse>> {
    let actor = require_actor(&ctx)?;
    actor.authorize(reqhub_core::Action::Administer, "list status models")?;
    let kind = query.kind.as_deref().map(parse_kind).transpose()?;
    let status_models = state.services.status_models.list(kind).await;
    Ok(Json(ListStatusModelsResponse { status_models }))
}

fn audit_model_change(state: &AppState, ctx: &RequestContext, model: &StatusModel, change: String) {
    state.logger.audit(
        ctx,
        AuditAction::StatusModelChanged {
            model_id: model.id.to_string(),
            change,
        },
        &json!({ "name": model.name, "entity_kind": model.entity_kind }),
    );
}

pub async fn create_status_model(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Json(new): Json<NewStatusModel>,
) -> ApiResult<(StatusCode, Json<StatusModel>)> {
    let actor = require_actor(&ctx)?;
    let model = state.services.status_models.create(new, actor).await?;
    audit_model_change(&state, &ctx, &model, "create".to_string());
    Ok((StatusCode::CREATED, Json(model)))
}

pub async fn get_status_model(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<StatusModel>> {
    let actor = require_actor(&ctx)?;
    actor.authorize(reqhub_core::Action::Administer, "read status model")?;
    Ok(Json(state.services.status_models.get(id).await?))
}

#[derive(Debug, Deserialize)]
pub struct NameRequest {
    pub name: String,
}

pub async fn rename_status_model(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<Uuid>,
    Json(req): Json<NameRequest>,
) -> ApiResult<Json<StatusModel>> {
    let actor = require_actor(&ctx)?;
    let change = format!("rename to {}", req.name);
    let model = state.services.status_models.rename(id, req.name, actor).await?;
    audit_model_change(&state, &ctx, &model, change);
    Ok(Json(model))
}

pub async fn set_default_status_model(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<StatusModel>> {
    let actor = require_actor(&ctx)?;
    let model = state.services.status_models.set_default(id, actor).await?;
    audit_model_change(&state, &ctx, &model, "set default".to_string());
    Ok(Json(model))
}

pub async fn add_status(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<Uuid>,
    Json(req): Json<NameRequest>,
) -> ApiResult<Json<StatusModel>> {
    let actor = require_actor(&ctx)?;
    let change = format!("add status {}", req.name);
    let model = state.services.status_models.add_status(id, req.name, actor).await?;
    audit_model_change(&state, &ctx, &model, change);
    Ok(Json(model))
}

pub async fn remove_status(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Path((id, name)): Path<(Uuid, String)>,
) -> ApiResult<Json<StatusModel>> {
    let actor = require_actor(&ctx)?;
    let model = state
        .services
        .status_models
        .remove_status(id, &name, actor)
        .await?;
    audit_model_change(&state, &ctx, &model, format!("remove status {}", name));
    Ok(Json(model))
}

pub async fn add_status_transition(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<Uuid>,
    Json(transition): Json<StatusTransition>,
) -> ApiResult<Json<StatusModel>> {
    let actor = require_actor(&ctx)?;
    let change = format!("add transition {} -> {}", transition.from, transition.to);
    let model = state
        .services
        .status_models
        .add_transition(id, transition, actor)
        .await?;
    audit_model_change(&state, &ctx, &model, change);
    Ok(Json(model))
}

pub async fn remove_status_transition(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<Uuid>,
    Json(transition): Json<StatusTransition>,
) -> ApiResult<Json<StatusModel>> {
    let actor = require_actor(&ctx)?;
    let model = state
        .services
        .status_models
        .remove_transition(id, &transition, actor)
        .await?;
    let change = format!("remove transition {} -> {}", transition.from, transition.to);
    audit_model_change(&state, &ctx, &model, change);
    Ok(Json(model))
}

pub async fn delete_status_model(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<StatusModel>> {
    let actor = require_actor(&ctx)?;
    let model = state.services.status_models.delete(id, actor).await?;
    audit_model_change(&state, &ctx, &model, "delete".to_string());
    Ok(Json(model))
}

#[derive(Debug, Deserialize)]
pub struct NewTypeRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

pub async fn list_requirement_types(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
) -> ApiResult<Json<serde_json::Value>> {
    let actor = require_actor(&ctx)?;
    actor.authorize(reqhub_core::Action::Administer, "list requirement types")?;
    let types = state.services.requirements.requirement_types().await;
    Ok(Json(json!({ "requirement_types": types })))
}

pub async fn create_requirement_type(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Json(req): Json<NewTypeRequest>,
) -> ApiResult<(StatusCode, Json<RequirementType>)> {
    let actor = require_actor(&ctx)?;
    let created = state
        .services
        .requirements
        .create_requirement_type(&req.name, req.description, actor)
        .await?;
    state.logger.audit(
        &ctx,
        AuditAction::Created {
            resource_kind: "requirement_type".to_string(),
            resource_id: created.name.clone(),
        },
        &json!({ "id": created.id }),
    );
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn list_relationship_types(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
) -> ApiResult<Json<serde_json::Value>> {
    let actor = require_actor(&ctx)?;
    actor.authorize(reqhub_core::Action::Administer, "list relationship types")?;
    let types = state.services.requirements.relationship_types().await;
    Ok(Json(json!({ "relationship_types": types })))
}

pub async fn create_relationship_type(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Json(req): Json<NewTypeRequest>,
) -> ApiResult<(StatusCode, Json<RelationshipType>)> {
    let actor = require_actor(&ctx)?;
    let created = state
        .services
        .requirements
        .create_relationship_type(&req.name, req.description, actor)
        .await?;
    state.logger.audit(
        &ctx,
        AuditAction::Created {
            resource_kind: "relationship_type".to_string(),
            resource_id: created.name.clone(),
        },
        &json!({ "id": created.id }),
    );
    Ok((StatusCode::CREATED, Json(created)))
}

/// Referenced types are never removed; `force` only affects logging
pub async fn delete_requirement_type(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
    Query(query): Query<ForceQuery>,
) -> ApiResult<Json<RequirementType>> {
    let actor = require_actor(&ctx)?;
    let removed = state
        .services
        .requirements
        .delete_requirement_type(&id, actor, query.force)
        .await?;

    state.logger.audit(
        &ctx,
        AuditAction::Deleted {
            resource_kind: "requirement_type".to_string(),
            resource_id: removed.name.clone(),
            cascade_count: 0,
        },
        &json!({ "id": removed.id, "force": query.force }),
    );
    Ok(Json(removed))
}

pub async fn delete_relationship_type(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<RelationshipType>> {
    let actor = require_actor(&ctx)?;
    let removed = state
        .services
        .requirements
        .delete_relationship_type(&id, actor)
        .await?;

    state.logger.audit(
        &ctx,
        AuditAction::Deleted {
            resource_kind: "relationship_type".to_string(),
            resource_id: removed.name.clone(),
            cascade_count: 0,
        },
        &json!({ "id": removed.id }),
    );
    Ok(Json(removed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_kind_aliases() {
        assert_eq!(parse_kind("epic").unwrap(), EntityKind::Epic);
        assert_eq!(parse_kind("Epics").unwrap(), EntityKind::Epic);
        assert_eq!(parse_kind("user-stories").unwrap(), EntityKind::UserStory);
        assert_eq!(parse_kind("user_story").unwrap(), EntityKind::UserStory);
        assert_eq!(
            parse_kind("acceptance-criteria").unwrap(),
            EntityKind::AcceptanceCriteria
        );
        assert_eq!(parse_kind("requirements").unwrap(), EntityKind::Requirement);
        assert!(matches!(
            parse_kind("widgets"),
            Err(DomainError::InvalidArguments(_))
        ));
    }
}
