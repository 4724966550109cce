use crate::access::Actor;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

/// Unique identifier for an audit log entry
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AuditId(pub String);

impl AuditId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

/// Audit event category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuditCategory {
    Authentication,
    Authorization,
    DataModification,
    ConfigChange,
}

/// Audit event action types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditAction {
    // Authentication / authorization
    AuthenticationFailed { reason: String },
    AccessDenied { operation: String },

    // Artifact changes
    Created { resource_kind: String, resource_id: String },
    Updated { resource_kind: String, resource_id: String },
    Deleted {
        resource_kind: String,
        resource_id: String,
        cascade_count: usize,
    },
    Linked { resource_kind: String, resource_id: String, target_id: String },
    Unlinked { resource_kind: String, resource_id: String, target_id: String },
    Activated { resource_kind: String, resource_id: String },

    // Status model administration
    StatusModelChanged { model_id: String, change: String },
}

impl AuditAction {
    pub fn name(&self) -> &'static str {
        match self {
            Self::AuthenticationFailed { .. } => "authentication_failed",
            Self::AccessDenied { .. } => "access_denied",
            Self::Created { .. } => "create",
            Self::Updated { .. } => "update",
            Self::Deleted { .. } => "delete",
            Self::Linked { .. } => "link",
            Self::Unlinked { .. } => "unlink",
            Self::Activated { .. } => "activate",
            Self::StatusModelChanged { .. } => "status_model_change",
        }
    }

    pub fn category(&self) -> AuditCategory {
        match self {
            Self::AuthenticationFailed { .. } => AuditCategory::Authentication,
            Self::AccessDenied { .. } => AuditCategory::Authorization,
            Self::StatusModelChanged { .. } => AuditCategory::ConfigChange,
            _ => AuditCategory::DataModification,
        }
    }
}

/// Tamper-evident audit log entry with chain verification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: AuditId,
    pub timestamp: DateTime<Utc>,
    pub category: AuditCategory,
    pub action: AuditAction,
    pub correlation_id: String,
    pub user_id: Option<String>,
    pub username: Option<String>,
    pub metadata: HashMap<String, String>,
    /// Hash of previous entry
    pub previous_hash: Option<String>,
    /// Hash of this entry's content
    pub entry_hash: String,
}

impl AuditEntry {
    fn new(
        action: AuditAction,
        correlation_id: String,
        actor: Option<&Actor>,
        metadata: HashMap<String, String>,
        previous_hash: Option<String>,
    ) -> Self {
        let mut entry = Self {
            id: AuditId::generate(),
            timestamp: Utc::now(),
            category: action.category(),
            action,
            correlation_id,
            user_id: actor.map(|a| a.user_id.to_string()),
            username: actor.map(|a| a.username.clone()),
            metadata,
            previous_hash,
            entry_hash: String::new(),
        };
        entry.entry_hash = entry.calculate_hash();
        entry
    }

    fn calculate_hash(&self) -> String {
        let mut hasher = Sha256::new();

        hasher.update(self.id.0.as_bytes());
        hasher.update(self.timestamp.to_rfc3339().as_bytes());
        hasher.update(format!("{:?}", self.category).as_bytes());
        hasher.update(serde_json::to_string(&self.action).unwrap_or_default().as_bytes());
        hasher.update(self.correlation_id.as_bytes());

        if let Some(uid) = &self.user_id {
            hasher.update(uid.as_bytes());
        }
        if let Some(prev) = &self.previous_hash {
            hasher.update(prev.as_bytes());
        }

        hex::encode(hasher.finalize())
    }

    /// Verify entry integrity
    pub fn verify_hash(&self) -> bool {
        self.calculate_hash() == self.entry_hash
    }
}

/// In-process audit trail. Oldest entries are evicted past `capacity`;
/// the chain stays verifiable because each entry keeps its predecessor's hash.
#[derive(Clone)]
pub struct AuditLog {
    inner: Arc<Mutex<AuditState>>,
    capacity: usize,
}

struct AuditState {
    entries: VecDeque<AuditEntry>,
    last_hash: Option<String>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::with_capacity(10_000)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(AuditState {
                entries: VecDeque::new(),
                last_hash: None,
            })),
            capacity: capacity.max(1),
        }
    }

    /// Record an audit event
    pub fn record(
        &self,
        action: AuditAction,
        correlation_id: &str,
        actor: Option<&Actor>,
        metadata: HashMap<String, String>,
    ) -> AuditEntry {
        let mut state = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let entry = AuditEntry::new(
            action,
            correlation_id.to_string(),
            actor,
            metadata,
            state.last_hash.clone(),
        );

        state.last_hash = Some(entry.entry_hash.clone());
        state.entries.push_back(entry.clone());
        while state.entries.len() > self.capacity {
            state.entries.pop_front();
        }

        tracing::info!(
            audit_id = %entry.id.0,
            correlation_id = %entry.correlation_id,
            category = ?entry.category,
            action = entry.action.name(),
            "Audit event recorded"
        );

        entry
    }

    /// Get all retained audit entries
    pub fn list_entries(&self) -> Vec<AuditEntry> {
        self.with_state(|state| state.entries.iter().cloned().collect())
    }

    /// Get entries recorded under one correlation id
    pub fn list_by_correlation(&self, correlation_id: &str) -> Vec<AuditEntry> {
        self.with_state(|state| {
            state
                .entries
                .iter()
                .filter(|e| e.correlation_id == correlation_id)
                .cloned()
                .collect()
        })
    }

    /// Get audit entries by user
    pub fn list_by_user(&self, user_id: &str) -> Vec<AuditEntry> {
        self.with_state(|state| {
            state
                .entries
                .iter()
                .filter(|e| e.user_id.as_deref() == Some(user_id))
                .cloned()
                .collect()
        })
    }

    /// Verify chain integrity
    pub fn verify_chain(&self) -> bool {
        self.with_state(|state| {
            let mut previous: Option<&AuditEntry> = None;
            for entry in &state.entries {
                if !entry.verify_hash() {
                    return false;
                }
                if let Some(prev) = previous {
                    if entry.previous_hash.as_ref() != Some(&prev.entry_hash) {
                        return false;
                    }
                }
                previous = Some(entry);
            }
            true
        })
    }

    fn with_state<T>(&self, f: impl FnOnce(&AuditState) -> T) -> T {
        match self.inner.lock() {
            Ok(guard) => f(&guard),
            Err(poisoned) => f(&poisoned.into_inner()),
        }
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::UserRole;

    fn actor() -> Actor {
        Actor::new(uuid::Uuid::new_v4(), "alice", UserRole::User)
    }

    fn created(id: &str) -> AuditAction {
        AuditAction::Created {
            resource_kind: "epic".into(),
            resource_id: id.into(),
        }
    }

    #[test]
    fn test_audit_log_record() {
        let log = AuditLog::new();
        let actor = actor();

        let entry = log.record(created("EP-001"), "corr-1", Some(&actor), HashMap::new());

        assert!(entry.verify_hash());
        assert_eq!(entry.category, AuditCategory::DataModification);
        assert_eq!(entry.username.as_deref(), Some("alice"));
        assert_eq!(log.list_entries().len(), 1);
        assert_eq!(log.list_by_correlation("corr-1").len(), 1);
    }

    #[test]
    fn test_audit_chain_integrity() {
        let log = AuditLog::new();
        for i in 0..5 {
            log.record(created(&format!("EP-00{}", i)), "corr", None, HashMap::new());
        }
        assert!(log.verify_chain());
    }

    #[test]
    fn test_tamper_detection() {
        let log = AuditLog::new();
        log.record(created("EP-001"), "corr", None, HashMap::new());
        log.record(created("EP-002"), "corr", None, HashMap::new());

        {
            let mut state = log.inner.lock().unwrap();
            state.entries[0].correlation_id = "tampered".to_string();
        }

        assert!(!log.verify_chain());
    }

    #[test]
    fn test_capacity_eviction_keeps_chain_valid() {
        let log = AuditLog::with_capacity(3);
        for i in 0..10 {
            log.record(created(&format!("EP-{}", i)), "corr", None, HashMap::new());
        }
        assert_eq!(log.list_entries().len(), 3);
        assert!(log.verify_chain());
    }

    #[test]
    fn test_filter_by_user() {
        let log = AuditLog::new();
        let alice = actor();
        log.record(created("EP-001"), "c1", Some(&alice), HashMap::new());
        log.record(created("EP-002"), "c2", None, HashMap::new());

        let entries = log.list_by_user(&alice.user_id.to_string());
        assert_eq!(entries.len(), 1);
    }
}
