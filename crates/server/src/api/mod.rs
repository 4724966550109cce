use crate::config::{AppState, ServerConfig};
use crate::middleware::auth;
use anyhow::Result;
use axum::{
    http::StatusCode,
    middleware::from_fn_with_state,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use reqhub_core::{DomainError, TransactionFailure};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};

mod handlers;

/// Start the API server
pub async fn serve(addr: &str, config: ServerConfig) -> Result<()> {
    let state = AppState::new(&config)?;

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("API server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Create the API router
fn create_router(state: AppState) -> Router {
    let state = Arc::new(state);
    Router::new()
        .route("/api/health", get(health_check))
        // MCP channel
        .route("/api/v1/mcp", post(handlers::mcp))
        // Deletion
        .route(
            "/api/v1/{kind}/{id}/dependencies",
            get(handlers::get_dependencies),
        )
        .route("/api/v1/{kind}/{id}", delete(handlers::delete_entity))
        .route(
            "/api/v1/deletion/confirm/{entity_type}/{id}",
            get(handlers::confirm_deletion),
        )
        // Administration
        .route(
            "/api/v1/admin/status-models",
            get(handlers::list_status_models).post(handlers::create_status_model),
        )
        .route(
            "/api/v1/admin/status-models/{id}",
            get(handlers::get_status_model)
                .patch(handlers::rename_status_model)
                .delete(handlers::delete_status_model),
        )
        .route(
            "/api/v1/admin/status-models/{id}/default",
            post(handlers::set_default_status_model),
        )
        .route(
            "/api/v1/admin/status-models/{id}/statuses",
            post(handlers::add_status),
        )
        .route(
            "/api/v1/admin/status-models/{id}/statuses/{name}",
            delete(handlers::remove_status),
        )
        .route(
            "/api/v1/admin/status-models/{id}/transitions",
            post(handlers::add_status_transition).delete(handlers::remove_status_transition),
        )
        .route(
            "/api/v1/admin/requirement-types",
            get(handlers::list_requirement_types).post(handlers::create_requirement_type),
        )
        .route(
            "/api/v1/admin/requirement-types/{id}",
            delete(handlers::delete_requirement_type),
        )
        .route(
            "/api/v1/admin/relationship-types",
            get(handlers::list_relationship_types).post(handlers::create_relationship_type),
        )
        .route(
            "/api/v1/admin/relationship-types/{id}",
            delete(handlers::delete_relationship_type),
        )
        // Middleware
        .layer(from_fn_with_state(state.clone(), auth::authenticate))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().include_headers(false))
                .on_response(DefaultOnResponse::new().include_headers(true)),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "reqhub",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// API error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            reason: None,
            details: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Custom error type for API handlers
pub struct ApiError(anyhow::Error);

fn domain_status(err: &DomainError) -> StatusCode {
    match err {
        DomainError::NotFound { .. } => StatusCode::NOT_FOUND,
        DomainError::InvalidArguments(_) => StatusCode::BAD_REQUEST,
        DomainError::InvalidStatus { .. }
        | DomainError::InvalidTransition { .. }
        | DomainError::ValidationFailed(_)
        | DomainError::MinCardinality { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        DomainError::DeletionBlocked { .. }
        | DomainError::TypeInUse { .. }
        | DomainError::Conflict { .. }
        | DomainError::TransactionFailed {
            cause: TransactionFailure::Conflict,
            ..
        } => StatusCode::CONFLICT,
        DomainError::Unauthorized => StatusCode::UNAUTHORIZED,
        DomainError::Forbidden(_) => StatusCode::FORBIDDEN,
        DomainError::TransactionFailed {
            cause: TransactionFailure::Storage,
            ..
        }
        | DomainError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, response) = match self.0.downcast_ref::<DomainError>() {
            Some(err) => {
                let status = domain_status(err);
                let response = if status == StatusCode::INTERNAL_SERVER_ERROR {
                    tracing::error!(error = %err, "Internal error");
                    ErrorResponse::new("Internal server error")
                } else {
                    let mut response = ErrorResponse::new(err.to_string());
                    if let DomainError::Conflict {
                        hint: Some(hint), ..
                    } = err
                    {
                        response = response.with_details(hint.clone());
                    }
                    response
                };
                (status, response.with_reason(err.reason()))
            }
            None => {
                let details = self
                    .0
                    .chain()
                    .skip(1)
                    .map(|e| e.to_string())
                    .collect::<Vec<_>>()
                    .join(": ");
                tracing::error!(error = %self.0, details = %details, "Unhandled API error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::new("Internal server error"),
                )
            }
        };

        (status, Json(response)).into_response()
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
