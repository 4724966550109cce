//! Protocol error type and the mapping from domain failures to JSON-RPC codes.

use crate::protocol::JsonRpcError;
use reqhub_core::error::{DomainError, TransactionFailure};
use serde_json::{json, Value};
use thiserror::Error;

pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;
pub const RESOURCE_NOT_FOUND: i32 = -32002;
pub const UNAUTHORIZED: i32 = -32003;
pub const FORBIDDEN: i32 = -32004;
pub const CONFLICT: i32 = -32009;
pub const VALIDATION_FAILED: i32 = -32010;

/// MCP server error type.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum McpError {
    /// Failure reported by the core.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Malformed JSON.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Well-formed JSON that is not a JSON-RPC frame.
    #[error("Invalid Request: {0}")]
    InvalidRequest(String),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    /// Argument failed schema validation.
    #[error("Invalid params: {field}: {message}")]
    InvalidParams { field: String, message: String },

    #[error("Invalid URI: {0}")]
    InvalidUri(String),
}

/// Result type for MCP operations.
pub type McpResult<T> = Result<T, McpError>;

impl From<serde_json::Error> for McpError {
    fn from(err: serde_json::Error) -> Self {
        Self::Domain(DomainError::from(err))
    }
}

impl McpError {
    pub fn invalid_params(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParams {
            field: field.into(),
            message: message.into(),
        }
    }

    /// JSON-RPC error code for this failure
    pub fn code(&self) -> i32 {
        match self {
            Self::Parse(_) => PARSE_ERROR,
            Self::InvalidRequest(_) => INVALID_REQUEST,
            Self::MethodNotFound(_) => METHOD_NOT_FOUND,
            Self::InvalidParams { .. } | Self::InvalidUri(_) => INVALID_PARAMS,
            Self::Domain(err) => match err {
                DomainError::NotFound { .. } => RESOURCE_NOT_FOUND,
                DomainError::InvalidArguments(_) => INVALID_PARAMS,
                DomainError::InvalidStatus { .. }
                | DomainError::InvalidTransition { .. }
                | DomainError::ValidationFailed(_)
                | DomainError::DeletionBlocked { .. }
                | DomainError::MinCardinality { .. } => VALIDATION_FAILED,
                DomainError::TypeInUse { .. } | DomainError::Conflict { .. } => CONFLICT,
                DomainError::TransactionFailed { cause, .. } => match cause {
                    TransactionFailure::Conflict => CONFLICT,
                    TransactionFailure::Storage => INTERNAL_ERROR,
                },
                DomainError::Unauthorized => UNAUTHORIZED,
                DomainError::Forbidden(_) => FORBIDDEN,
                DomainError::Internal(_) => INTERNAL_ERROR,
            },
        }
    }

    /// Build the wire error. Internal failures keep their details in the
    /// logs only; the client sees the correlation id.
    pub fn to_rpc_error(&self, correlation_id: &str) -> JsonRpcError {
        let code = self.code();
        let mut data = json!({ "correlation_id": correlation_id });

        let message = match self {
            _ if code == INTERNAL_ERROR => "Internal error".to_string(),
            Self::Parse(_) => "Parse error".to_string(),
            Self::Domain(DomainError::NotFound { kind, key }) => {
                data["entity_kind"] = json!(kind.as_str());
                data["key"] = json!(key);
                format!("Resource not found: {} {}", kind.label(), key)
            }
            other => other.to_string(),
        };

        match self {
            Self::InvalidParams { field, .. } => {
                data["field"] = json!(field);
            }
            Self::Domain(err) if code != INTERNAL_ERROR => {
                data["reason"] = json!(err.reason());
                if let DomainError::Conflict { hint: Some(hint), .. } = err {
                    data["hint"] = json!(hint);
                }
                if let DomainError::TypeInUse { .. } = err {
                    data["hint"] = json!("reassign the referencing items first; force has no effect");
                }
            }
            _ => {}
        }

        JsonRpcError::new(code, message).with_data(data)
    }
}

/// Correlation id carried by an error object, if any
pub fn correlation_of(error: &JsonRpcError) -> Option<&str> {
    error
        .data
        .as_ref()
        .and_then(|d| d.get("correlation_id"))
        .and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqhub_core::types::{EntityKind, ResourceKind};

    #[test]
    fn test_not_found_carries_kind() {
        let err = McpError::from(DomainError::not_found(EntityKind::Epic, "EP-404"));
        let rpc = err.to_rpc_error("corr-1");
        assert_eq!(rpc.code, -32002);
        assert!(rpc.message.contains("Epic"));
        assert_eq!(correlation_of(&rpc), Some("corr-1"));
        assert_eq!(rpc.data.unwrap()["entity_kind"], "epic");
    }

    #[test]
    fn test_domain_codes() {
        let cases = [
            (DomainError::InvalidArguments("x".into()), -32602),
            (DomainError::ValidationFailed("x".into()), -32010),
            (
                DomainError::MinCardinality {
                    reference_id: "AC-9".into(),
                    user_story: "US-7".into(),
                },
                -32010,
            ),
            (DomainError::Unauthorized, -32003),
            (DomainError::Forbidden("x".into()), -32004),
            (DomainError::conflict_with_hint("dup", "rename"), -32009),
            (
                DomainError::TypeInUse {
                    name: "functional".into(),
                    count: 2,
                },
                -32009,
            ),
            (DomainError::storage("disk full"), -32603),
            (
                DomainError::not_found(ResourceKind::Prompt, "PROMPT-1"),
                -32002,
            ),
        ];
        for (err, code) in cases {
            assert_eq!(McpError::from(err).code(), code);
        }
    }

    #[test]
    fn test_internal_details_are_stripped() {
        let rpc = McpError::from(DomainError::storage("/var/lib/reqhub/db locked")).to_rpc_error("c");
        assert_eq!(rpc.message, "Internal error");
        assert!(!rpc.data.unwrap().to_string().contains("/var/lib"));
    }

    #[test]
    fn test_validation_reason_and_hint() {
        let rpc = McpError::from(DomainError::MinCardinality {
            reference_id: "AC-009".into(),
            user_story: "US-007".into(),
        })
        .to_rpc_error("c");
        assert_eq!(rpc.data.as_ref().unwrap()["reason"], "MIN_CARDINALITY");

        let rpc = McpError::from(DomainError::conflict_with_hint("exists", "pick another name"))
            .to_rpc_error("c");
        assert_eq!(rpc.data.unwrap()["hint"], "pick another name");
    }

    #[test]
    fn test_protocol_codes() {
        assert_eq!(McpError::Parse("eof".into()).code(), -32700);
        assert_eq!(McpError::InvalidRequest("no method".into()).code(), -32600);
        assert_eq!(McpError::MethodNotFound("nope".into()).code(), -32601);
        assert_eq!(McpError::InvalidUri("bad".into()).code(), -32602);
        let rpc = McpError::invalid_params("title", "required").to_rpc_error("c");
        assert_eq!(rpc.data.unwrap()["field"], "title");
    }
}
