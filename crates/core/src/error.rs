//! Domain error taxonomy shared by every core operation.

use crate::types::ResourceKind;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for core operations.
pub type DomainResult<T> = Result<T, DomainError>;

/// Why a store transaction was aborted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionFailure {
    /// A concurrent writer or constraint made the commit impossible
    Conflict,
    /// The persistence backend failed
    Storage,
}

/// Closed set of failures the core reports.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    /// Lookup by id or reference id failed.
    #[error("{} not found: {key}", .kind.label())]
    NotFound { kind: ResourceKind, key: String },

    /// Request shape is wrong (missing field, unknown kind, malformed id).
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// Status name is not part of the status model.
    #[error("Invalid status '{status}' for {kind}")]
    InvalidStatus { kind: String, status: String },

    /// No edge from -> to in the default status model.
    #[error("Invalid status transition for {kind}: '{from}' -> '{to}'")]
    InvalidTransition {
        kind: String,
        from: String,
        to: String,
    },

    /// A domain rule was broken.
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// Dependencies exist and force was not requested.
    #[error("Deletion blocked: {reference_id} has {count} dependent item(s); retry with force=true")]
    DeletionBlocked { reference_id: String, count: usize },

    /// Deleting would leave a user story without acceptance criteria.
    #[error("Cannot delete {reference_id}: user story {user_story} must keep at least one acceptance criteria")]
    MinCardinality {
        reference_id: String,
        user_story: String,
    },

    /// Requirement or relationship type is still referenced.
    #[error("{name} is referenced by {count} item(s) and cannot be deleted")]
    TypeInUse { name: String, count: usize },

    /// Uniqueness or dependency conflict.
    #[error("Conflict: {message}")]
    Conflict { message: String, hint: Option<String> },

    /// Store aborted the transaction.
    #[error("Transaction failed: {message}")]
    TransactionFailed {
        cause: TransactionFailure,
        message: String,
    },

    /// No authenticated actor.
    #[error("Authentication required")]
    Unauthorized,

    /// Actor lacks the required role.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Anything else.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DomainError {
    pub fn not_found(kind: impl Into<ResourceKind>, key: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            key: key.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
            hint: None,
        }
    }

    pub fn conflict_with_hint(message: impl Into<String>, hint: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
            hint: Some(hint.into()),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::TransactionFailed {
            cause: TransactionFailure::Storage,
            message: message.into(),
        }
    }

    /// Stable machine-readable tag for the wire boundary
    pub fn reason(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::InvalidArguments(_) => "INVALID_ARGUMENTS",
            Self::InvalidStatus { .. } => "INVALID_STATUS",
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::ValidationFailed(_) => "VALIDATION_FAILED",
            Self::DeletionBlocked { .. } => "DELETION_BLOCKED",
            Self::MinCardinality { .. } => "MIN_CARDINALITY",
            Self::TypeInUse { .. } => "TYPE_IN_USE",
            Self::Conflict { .. } => "CONFLICT",
            Self::TransactionFailed { .. } => "TRANSACTION_FAILED",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::Internal(_) => "INTERNAL",
        }
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("serialization failed: {}", err))
    }
}
