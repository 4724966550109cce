//! Structured MCP logging with secret redaction.
//!
//! Every event carries the request's correlation id, the component and
//! operation, and the caller identity when known. Logged payloads pass
//! through [`redact_value`] first.

use crate::context::RequestContext;
use crate::error::McpError;
use regex::{Captures, Regex};
use reqhub_core::audit::{AuditAction, AuditLog};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::LazyLock;
use std::time::Instant;

pub const REDACTED: &str = "[REDACTED]";
pub const PAT_PREFIX: &str = "mcp_pat_";

const COMPONENT: &str = "mcp";

const SENSITIVE_KEY_PARTS: &[&str] = &[
    "token",
    "password",
    "secret",
    "key",
    "authorization",
    "auth",
    "credential",
    "pat",
    "jwt",
    "bearer",
];

macro_rules! static_regex {
    ($name:ident, $pattern:expr) => {
        static $name: LazyLock<Regex> = LazyLock::new(|| match Regex::new($pattern) {
            Ok(re) => re,
            Err(_) => unreachable!("static regex pattern"),
        });
    };
}

static_regex!(BEARER, r"Bearer\s+(\S+)");
static_regex!(STANDALONE_PAT, r#"mcp_pat_[^\s"']+"#);
static_regex!(KEY_VALUE, r"(?i)(token|key|secret|password)\s*[:=]\s*\S+");

/// Redact bearer credentials, personal access tokens and `key=value` secrets
pub fn redact_string(input: &str) -> String {
    let bearer = BEARER.replace_all(input, |caps: &Captures| {
        if caps[1].starts_with(PAT_PREFIX) {
            format!("Bearer {}{}", PAT_PREFIX, REDACTED)
        } else {
            format!("Bearer {}", REDACTED)
        }
    });
    // Token runs to whitespace or a quote; re-redacting a redacted value is a no-op
    let pat = STANDALONE_PAT.replace_all(&bearer, format!("{}{}", PAT_PREFIX, REDACTED).as_str());
    KEY_VALUE
        .replace_all(&pat, |caps: &Captures| format!("{}: {}", &caps[1], REDACTED))
        .into_owned()
}

/// Whether a map key names a secret
pub fn is_sensitive_key(key: &str) -> bool {
    let lower = key.to_lowercase();
    SENSITIVE_KEY_PARTS.iter().any(|part| lower.contains(part))
}

/// Deep redaction: sensitive keys lose their value, strings are scrubbed
pub fn redact_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, inner)| {
                    let redacted = if is_sensitive_key(key) {
                        Value::String(REDACTED.to_string())
                    } else {
                        redact_value(inner)
                    };
                    (key.clone(), redacted)
                })
                .collect::<Map<String, Value>>(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact_value).collect()),
        Value::String(s) => Value::String(redact_string(s)),
        other => other.clone(),
    }
}

struct Caller {
    user_id: String,
    username: String,
    user_role: &'static str,
}

fn caller(ctx: &RequestContext) -> Caller {
    match &ctx.actor {
        Some(actor) => Caller {
            user_id: actor.user_id.to_string(),
            username: actor.username.clone(),
            user_role: actor.role.as_str(),
        },
        None => Caller {
            user_id: String::new(),
            username: String::new(),
            user_role: "",
        },
    }
}

/// Cloneable logging handle shared by the processor, tools and reader
#[derive(Clone, Default)]
pub struct McpLogger {
    audit: AuditLog,
}

impl McpLogger {
    pub fn new(audit: AuditLog) -> Self {
        Self { audit }
    }

    pub fn audit_log(&self) -> &AuditLog {
        &self.audit
    }

    pub fn request(&self, ctx: &RequestContext, operation: &str, details: &Value) {
        let who = caller(ctx);
        tracing::info!(
            correlation_id = %ctx.correlation_id,
            component = COMPONENT,
            operation,
            user_id = %who.user_id,
            username = %who.username,
            user_role = who.user_role,
            details = %redact_value(details),
            "MCP request"
        );
    }

    /// Log the outcome and return the elapsed whole milliseconds
    pub fn response(
        &self,
        ctx: &RequestContext,
        operation: &str,
        started: Instant,
        outcome: Result<(), &McpError>,
    ) -> u64 {
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let who = caller(ctx);
        match outcome {
            Ok(()) => tracing::info!(
                correlation_id = %ctx.correlation_id,
                component = COMPONENT,
                operation,
                user_id = %who.user_id,
                username = %who.username,
                user_role = who.user_role,
                duration_ms,
                status = "success",
                "MCP response"
            ),
            Err(err) => tracing::warn!(
                correlation_id = %ctx.correlation_id,
                component = COMPONENT,
                operation,
                user_id = %who.user_id,
                username = %who.username,
                user_role = who.user_role,
                duration_ms,
                status = "error",
                code = err.code(),
                "MCP response"
            ),
        }
        duration_ms
    }

    pub fn error(&self, ctx: &RequestContext, operation: &str, err: &McpError) {
        let who = caller(ctx);
        tracing::error!(
            correlation_id = %ctx.correlation_id,
            component = COMPONENT,
            operation,
            user_id = %who.user_id,
            username = %who.username,
            user_role = who.user_role,
            code = err.code(),
            error = %redact_string(&err.to_string()),
            "MCP error"
        );
    }

    /// Access attempts and authentication outcomes
    pub fn security(&self, ctx: &RequestContext, event: &str, details: &Value) {
        let who = caller(ctx);
        tracing::warn!(
            correlation_id = %ctx.correlation_id,
            component = COMPONENT,
            operation = event,
            user_id = %who.user_id,
            username = %who.username,
            user_role = who.user_role,
            client_address = ctx.client_address.as_deref().unwrap_or(""),
            user_agent = ctx.user_agent.as_deref().unwrap_or(""),
            details = %redact_value(details),
            "MCP security event"
        );
        if event == "authentication_failed" {
            self.audit.record(
                AuditAction::AuthenticationFailed {
                    reason: "missing or rejected token".to_string(),
                },
                &ctx.correlation_id,
                ctx.actor.as_ref(),
                client_metadata(ctx),
            );
        }
    }

    /// Record a mutating operation in the audit trail
    pub fn audit(&self, ctx: &RequestContext, action: AuditAction, details: &Value) {
        let who = caller(ctx);
        let redacted = redact_value(details);
        tracing::info!(
            correlation_id = %ctx.correlation_id,
            component = COMPONENT,
            operation = action.name(),
            user_id = %who.user_id,
            username = %who.username,
            user_role = who.user_role,
            details = %redacted,
            "MCP audit"
        );
        let mut metadata = client_metadata(ctx);
        metadata.insert("details".to_string(), redacted.to_string());
        self.audit
            .record(action, &ctx.correlation_id, ctx.actor.as_ref(), metadata);
    }

    pub fn performance(&self, ctx: &RequestContext, operation: &str, duration_ms: u64, details: &Value) {
        tracing::debug!(
            correlation_id = %ctx.correlation_id,
            component = COMPONENT,
            operation,
            duration_ms,
            details = %redact_value(details),
            "MCP performance"
        );
    }
}

fn client_metadata(ctx: &RequestContext) -> HashMap<String, String> {
    let mut metadata = HashMap::new();
    if let Some(address) = &ctx.client_address {
        metadata.insert("client_address".to_string(), address.clone());
    }
    if let Some(agent) = &ctx.user_agent {
        metadata.insert("user_agent".to_string(), redact_string(agent));
    }
    metadata
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqhub_core::access::{Actor, UserRole};
    use serde_json::json;
    use uuid::Uuid;

    #[test]
    fn test_bearer_pat_keeps_prefix() {
        let out = redact_string("Authorization: Bearer mcp_pat_abc123XYZ");
        assert!(out.contains("Bearer mcp_pat_[REDACTED]"));
        assert!(!out.contains("abc123XYZ"));
    }

    #[test]
    fn test_opaque_bearer() {
        let out = redact_string("sent Bearer eyJhbGciOi.payload.sig upstream");
        assert_eq!(out, "sent Bearer [REDACTED] upstream");
    }

    #[test]
    fn test_standalone_pat() {
        let out = redact_string("leaked mcp_pat_abc123 in a title");
        assert_eq!(out, "leaked mcp_pat_[REDACTED] in a title");
    }

    #[test]
    fn test_standalone_pat_with_punctuation() {
        let out = redact_string("token mcp_pat_abc.def end");
        assert_eq!(out, "token mcp_pat_[REDACTED] end");

        let out = redact_string(r#"{"note":"mcp_pat_a/b+c=d"}"#);
        assert_eq!(out, r#"{"note":"mcp_pat_[REDACTED]"}"#);

        let out = redact_string("Bearer mcp_pat_x.y");
        assert_eq!(out, "Bearer mcp_pat_[REDACTED]");
    }

    #[test]
    fn test_key_value_secrets() {
        assert_eq!(redact_string("password=hunter2"), "password: [REDACTED]");
        assert_eq!(redact_string("API Key: abc"), "API Key: [REDACTED]");
        assert_eq!(redact_string("nothing secret here"), "nothing secret here");
    }

    #[test]
    fn test_redact_value_by_key() {
        let input = json!({
            "arguments": {
                "title": "t",
                "token": "mcp_pat_abc123",
                "nested": [{"Authorization": 42}, {"note": "Bearer mcp_pat_zzz"}]
            },
            "api_key": {"inner": "x"},
            "count": 3
        });
        let out = redact_value(&input);

        assert_eq!(out["arguments"]["title"], "t");
        assert_eq!(out["arguments"]["token"], REDACTED);
        assert_eq!(out["arguments"]["nested"][0]["Authorization"], REDACTED);
        assert_eq!(out["arguments"]["nested"][1]["note"], "Bearer mcp_pat_[REDACTED]");
        assert_eq!(out["api_key"], REDACTED);
        assert_eq!(out["count"], 3);
        assert!(!out.to_string().contains("abc123"));
    }

    #[test]
    fn test_audit_appends_to_chain() {
        let logger = McpLogger::default();
        let actor = Actor::new(Uuid::new_v4(), "pm", UserRole::User);
        let ctx = RequestContext::new(Some("corr-9".into()), Some(actor.clone()));

        logger.audit(
            &ctx,
            AuditAction::Created {
                resource_kind: "epic".into(),
                resource_id: "EP-001".into(),
            },
            &json!({"password": "x"}),
        );

        let entries = logger.audit_log().list_by_correlation("corr-9");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].username.as_deref(), Some("pm"));
        assert!(!entries[0].metadata["details"].contains("\"x\""));
        assert!(logger.audit_log().verify_chain());
    }
}
