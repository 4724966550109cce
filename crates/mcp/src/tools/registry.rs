// MCP tool trait, shared tool environment and the ordered registry

use super::validate::validate_arguments;
use crate::capabilities::ToolProvider;
use crate::context::RequestContext;
use crate::error::{McpError, McpResult};
use crate::logging::McpLogger;
use crate::protocol::{CallToolParams, CallToolResult, ToolSchema};
use reqhub_core::access::{Action, Actor};
use reqhub_core::audit::AuditAction;
use reqhub_core::services::Services;
use reqhub_core::DomainError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

/// Tool executor trait
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool schema for MCP
    fn schema(&self) -> ToolSchema;

    /// Permission the caller needs before the tool runs
    fn action(&self) -> Action {
        Action::Read
    }

    /// Execute the tool with validated arguments
    async fn execute(&self, ctx: &RequestContext, arguments: Value) -> McpResult<CallToolResult>;
}

/// Collaborators every tool is built from
#[derive(Clone)]
pub struct ToolEnv {
    pub services: Services,
    pub logger: McpLogger,
}

impl ToolEnv {
    pub fn new(services: Services, logger: McpLogger) -> Self {
        Self { services, logger }
    }

    /// Audit a mutation, logging the arguments it was called with
    pub fn audit(&self, ctx: &RequestContext, action: AuditAction, arguments: &Value) {
        self.logger.audit(ctx, action, arguments);
    }
}

/// The authenticated caller; tools never run anonymously
pub fn actor_of(ctx: &RequestContext) -> McpResult<&Actor> {
    ctx.actor.as_ref().ok_or(McpError::Domain(DomainError::Unauthorized))
}

/// Deserialize validated arguments into a tool's argument struct
pub fn parse_args<T: DeserializeOwned>(arguments: Value) -> McpResult<T> {
    let arguments = if arguments.is_null() {
        Value::Object(Default::default())
    } else {
        arguments
    };
    serde_json::from_value(arguments).map_err(|e| McpError::invalid_params("arguments", e.to_string()))
}

/// Summary text plus the serialized entity
pub fn entity_result<T: Serialize>(summary: impl Into<String>, entity: &T) -> McpResult<CallToolResult> {
    Ok(CallToolResult::with_data(summary, serde_json::to_value(entity)?))
}

/// Ordered tool catalog; `tools/list` reports registration order
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    index: HashMap<String, usize>,
    list_changed: bool,
    logger: McpLogger,
}

impl ToolRegistry {
    pub fn new(logger: McpLogger) -> Self {
        Self {
            tools: Vec::new(),
            index: HashMap::new(),
            list_changed: false,
            logger,
        }
    }

    /// Advertise `tools.listChanged` during capability negotiation
    pub fn with_list_changed(mut self, list_changed: bool) -> Self {
        self.list_changed = list_changed;
        self
    }

    /// Register a tool; a later tool with the same name replaces the earlier one in place
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.schema().name;
        match self.index.get(&name) {
            Some(&slot) => self.tools[slot] = tool,
            None => {
                self.index.insert(name, self.tools.len());
                self.tools.push(tool);
            }
        }
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.index.get(name).map(|&slot| self.tools[slot].clone())
    }

    /// List all tool schemas
    pub fn list_schemas(&self) -> Vec<ToolSchema> {
        self.tools.iter().map(|t| t.schema()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Check if a tool exists
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Look up, validate, authorize and run one `tools/call`
    pub async fn call(&self, ctx: &RequestContext, params: CallToolParams) -> McpResult<CallToolResult> {
        let tool = self
            .get(&params.name)
            .ok_or_else(|| McpError::invalid_params("name", format!("unknown tool '{}'", params.name)))?;
        let schema = tool.schema();
        validate_arguments(&schema.input_schema, &params.arguments)?;

        let actor = actor_of(ctx)?;
        if let Err(err) = actor.authorize(tool.action(), &params.name) {
            self.logger.audit(
                ctx,
                AuditAction::AccessDenied {
                    operation: params.name.clone(),
                },
                &params.arguments,
            );
            return Err(err.into());
        }

        let started = Instant::now();
        let result = tool.execute(ctx, params.arguments.clone()).await;
        let elapsed = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.logger
            .performance(ctx, &params.name, elapsed, &params.arguments);
        result
    }
}

impl ToolProvider for ToolRegistry {
    fn has_tools(&self) -> bool {
        !self.is_empty()
    }

    fn supports_list_changed(&self) -> bool {
        self.list_changed
    }
}

// Helper functions for creating tool schemas

pub fn json_schema_object(properties: Value, required: Vec<&str>) -> Value {
    serde_json::json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false
    })
}

pub fn json_schema_string(description: &str) -> Value {
    serde_json::json!({
        "type": "string",
        "description": description
    })
}

pub fn json_schema_integer(description: &str) -> Value {
    serde_json::json!({
        "type": "integer",
        "description": description
    })
}

pub fn json_schema_boolean(description: &str) -> Value {
    serde_json::json!({
        "type": "boolean",
        "description": description
    })
}

pub fn json_schema_array(items: Value, description: &str) -> Value {
    serde_json::json!({
        "type": "array",
        "items": items,
        "description": description
    })
}

pub fn json_schema_enum(values: &[&str], description: &str) -> Value {
    serde_json::json!({
        "type": "string",
        "enum": values,
        "description": description
    })
}
