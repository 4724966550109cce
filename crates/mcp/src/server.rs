//! JSON-RPC processor for the MCP channel.
//!
//! One inbound payload is a single frame or a batch. Responses keep batch
//! order and notifications never get a response slot.

use crate::capabilities::CapabilitiesManager;
use crate::context::RequestContext;
use crate::error::{McpError, McpResult};
use crate::logging::McpLogger;
use crate::prompts::PromptCatalog;
use crate::protocol::*;
use crate::resources::ResourceReader;
use crate::tools::{register_catalog, ToolEnv, ToolRegistry};
use reqhub_core::services::Services;
use reqhub_core::DomainError;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;

/// Values reported during the handshake
#[derive(Debug, Clone)]
pub struct McpServerConfig {
    pub name: String,
    pub version: String,
    pub tools_list_changed: bool,
    pub prompts_list_changed: bool,
}

impl Default for McpServerConfig {
    fn default() -> Self {
        Self {
            name: "reqhub".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            tools_list_changed: false,
            prompts_list_changed: false,
        }
    }
}

#[derive(Clone)]
pub struct McpServer {
    config: McpServerConfig,
    tools: Arc<ToolRegistry>,
    prompts: Arc<PromptCatalog>,
    resources: ResourceReader,
    capabilities: CapabilitiesManager,
    logger: McpLogger,
}

impl McpServer {
    pub fn new(config: McpServerConfig, services: Services, logger: McpLogger) -> Self {
        let env = ToolEnv::new(services.clone(), logger.clone());
        let mut registry =
            ToolRegistry::new(logger.clone()).with_list_changed(config.tools_list_changed);
        register_catalog(&mut registry, &env);
        let tools = Arc::new(registry);
        let prompts = Arc::new(PromptCatalog::new(services.clone(), config.prompts_list_changed));

        Self {
            capabilities: CapabilitiesManager::new(tools.clone(), prompts.clone()),
            resources: ResourceReader::new(services, logger.clone()),
            config,
            tools,
            prompts,
            logger,
        }
    }

    pub fn logger(&self) -> &McpLogger {
        &self.logger
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Process one raw payload. `None` means nothing to send back.
    pub async fn handle_payload(&self, ctx: &RequestContext, payload: &[u8]) -> Option<Value> {
        let value: Value = match serde_json::from_slice(payload) {
            Ok(value) => value,
            Err(e) => {
                let err = McpError::Parse(e.to_string());
                self.logger.error(ctx, "parse", &err);
                return Some(error_value(Value::Null, &err, ctx));
            }
        };

        match value {
            Value::Array(frames) if frames.is_empty() => {
                let err = McpError::InvalidRequest("empty batch".into());
                Some(error_value(Value::Null, &err, ctx))
            }
            Value::Array(frames) => {
                let mut responses = Vec::with_capacity(frames.len());
                for frame in frames {
                    if let Some(response) = self.handle_frame(ctx, frame).await {
                        responses.push(response);
                    }
                }
                if responses.is_empty() {
                    None
                } else {
                    Some(Value::Array(responses))
                }
            }
            frame => self.handle_frame(ctx, frame).await,
        }
    }

    async fn handle_frame(&self, ctx: &RequestContext, frame: Value) -> Option<Value> {
        let fallback_id = frame.get("id").cloned().unwrap_or(Value::Null);
        let request: JsonRpcRequest = match serde_json::from_value(frame) {
            Ok(request) => request,
            Err(e) => {
                let err = McpError::InvalidRequest(e.to_string());
                return Some(error_value(fallback_id, &err, ctx));
            }
        };
        if request.jsonrpc != "2.0" {
            let err = McpError::InvalidRequest(format!("unsupported jsonrpc version '{}'", request.jsonrpc));
            return Some(error_value(fallback_id, &err, ctx));
        }

        let Some(id) = request.id.clone() else {
            tracing::debug!(
                correlation_id = %ctx.correlation_id,
                method = %request.method,
                "Dropping notification"
            );
            return None;
        };

        let response = match self.handle_request(ctx, request).await {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(err) => JsonRpcResponse::error(id, err.to_rpc_error(&ctx.correlation_id)),
        };
        serde_json::to_value(response).ok()
    }

    /// Dispatch one request frame behind the auth gate
    pub async fn handle_request(&self, ctx: &RequestContext, request: JsonRpcRequest) -> McpResult<Value> {
        let started = Instant::now();
        let method = request.method.clone();
        self.logger.request(
            ctx,
            &method,
            &json!({ "params": request.params.clone().unwrap_or(Value::Null) }),
        );

        let result = if ctx.is_authenticated() {
            self.dispatch(ctx, &method, request.params).await
        } else {
            self.logger
                .security(ctx, "authentication_failed", &json!({ "method": method }));
            Err(McpError::Domain(DomainError::Unauthorized))
        };

        if let Err(err) = &result {
            self.logger.error(ctx, &method, err);
        }
        self.logger
            .response(ctx, &method, started, result.as_ref().map(|_| ()));
        result
    }

    async fn dispatch(&self, ctx: &RequestContext, method: &str, params: Option<Value>) -> McpResult<Value> {
        match method {
            "initialize" => self.handle_initialize(params),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(serde_json::to_value(ListToolsResult {
                tools: self.tools.list_schemas(),
            })?),
            "tools/call" => {
                let params: CallToolParams = params_as(params)?;
                Ok(serde_json::to_value(self.tools.call(ctx, params).await?)?)
            }
            "resources/list" => Ok(serde_json::to_value(ListResourcesResult {
                resources: self.resources.list(),
            })?),
            "resources/read" => {
                let params: ReadResourceParams = params_as(params)?;
                Ok(serde_json::to_value(self.resources.read(ctx, &params.uri).await?)?)
            }
            "prompts/list" => Ok(serde_json::to_value(ListPromptsResult {
                prompts: self.prompts.list().await,
            })?),
            "prompts/get" => {
                let params: GetPromptParams = params_as(params)?;
                let result = self.prompts.get(&params.name, params.arguments.as_ref()).await?;
                Ok(serde_json::to_value(result)?)
            }
            other => Err(McpError::MethodNotFound(other.to_string())),
        }
    }

    fn handle_initialize(&self, params: Option<Value>) -> McpResult<Value> {
        let params: InitializeParams = match params {
            Some(Value::Null) | None => InitializeParams::default(),
            Some(value) => serde_json::from_value(value)
                .map_err(|e| McpError::invalid_params("params", e.to_string()))?,
        };
        if let Some(requested) = params.protocol_version.as_deref() {
            if requested != PROTOCOL_VERSION {
                tracing::info!(
                    requested,
                    supported = PROTOCOL_VERSION,
                    "Client requested a different protocol version"
                );
            }
        }
        if let Some(client) = &params.client_info {
            tracing::info!(client = %client.name, version = %client.version, "MCP client initialized");
        }

        Ok(serde_json::to_value(InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: self.capabilities.server_capabilities(),
            server_info: ServerInfo {
                name: self.config.name.clone(),
                version: self.config.version.clone(),
            },
        })?)
    }
}

fn params_as<T: DeserializeOwned>(params: Option<Value>) -> McpResult<T> {
    let params = params.ok_or_else(|| McpError::invalid_params("params", "missing"))?;
    serde_json::from_value(params).map_err(|e| McpError::invalid_params("params", e.to_string()))
}

fn error_value(id: Value, err: &McpError, ctx: &RequestContext) -> Value {
    let response = JsonRpcResponse::error(id, err.to_rpc_error(&ctx.correlation_id));
    serde_json::to_value(response).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqhub_core::access::{Actor, UserRole};
    use reqhub_core::storage::Store;
    use uuid::Uuid;

    fn server() -> McpServer {
        McpServer::new(
            McpServerConfig::default(),
            Services::new(Store::in_memory()),
            McpLogger::default(),
        )
    }

    fn authed() -> RequestContext {
        RequestContext::new(
            Some("corr-test".into()),
            Some(Actor::new(Uuid::new_v4(), "pm", UserRole::User)),
        )
    }

    async fn call(server: &McpServer, ctx: &RequestContext, payload: Value) -> Option<Value> {
        server.handle_payload(ctx, payload.to_string().as_bytes()).await
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let response = call(&server(), &authed(), json!({"jsonrpc": "2.0", "id": 1, "method": "nope"}))
            .await
            .unwrap();
        assert_eq!(response["jsonrpc"], "2.0");
        assert_eq!(response["id"], 1);
        assert_eq!(response["error"]["code"], -32601);
        assert_eq!(response["error"]["data"]["correlation_id"], "corr-test");
    }

    #[tokio::test]
    async fn test_initialize_and_ping() {
        let server = server();
        let ctx = authed();
        let init = call(
            &server,
            &ctx,
            json!({"jsonrpc": "2.0", "id": "a", "method": "initialize",
                   "params": {"protocolVersion": "2024-11-05", "clientInfo": {"name": "cli"}}}),
        )
        .await
        .unwrap();
        assert_eq!(init["result"]["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(init["result"]["serverInfo"]["name"], "reqhub");
        assert_eq!(init["result"]["capabilities"]["resources"]["subscribe"], true);
        assert_eq!(init["result"]["capabilities"]["tools"]["listChanged"], false);

        for params in [Value::Null, json!({"anything": [1, 2]})] {
            let pong = call(
                &server,
                &ctx,
                json!({"jsonrpc": "2.0", "id": 2, "method": "ping", "params": params}),
            )
            .await
            .unwrap();
            assert_eq!(pong["result"], json!({}));
        }
    }

    #[tokio::test]
    async fn test_parse_error_and_invalid_frames() {
        let server = server();
        let ctx = authed();

        let response = server.handle_payload(&ctx, b"{not json").await.unwrap();
        assert_eq!(response["error"]["code"], -32700);
        assert!(response["id"].is_null());

        let response = call(&server, &ctx, json!([])).await.unwrap();
        assert_eq!(response["error"]["code"], -32600);

        let response = call(&server, &ctx, json!({"jsonrpc": "2.0", "id": 9})).await.unwrap();
        assert_eq!(response["error"]["code"], -32600);
        assert_eq!(response["id"], 9);

        let response = call(&server, &ctx, json!({"jsonrpc": "1.0", "id": 3, "method": "ping"}))
            .await
            .unwrap();
        assert_eq!(response["error"]["code"], -32600);
    }

    #[tokio::test]
    async fn test_batch_order_and_notifications() {
        let server = server();
        let ctx = authed();
        let response = call(
            &server,
            &ctx,
            json!([
                {"jsonrpc": "2.0", "id": 1, "method": "ping"},
                {"jsonrpc": "2.0", "method": "notifications/initialized"},
                {"jsonrpc": "2.0", "id": 2, "method": "nope"},
                {"jsonrpc": "2.0", "id": 3, "method": "tools/list"}
            ]),
        )
        .await
        .unwrap();
        let responses = response.as_array().unwrap();
        assert_eq!(responses.len(), 3);
        assert_eq!(responses[0]["id"], 1);
        assert_eq!(responses[1]["id"], 2);
        assert_eq!(responses[2]["result"]["tools"].as_array().unwrap().len(), 22);

        let none = call(
            &server,
            &ctx,
            json!([{"jsonrpc": "2.0", "method": "ping"}, {"jsonrpc": "2.0", "method": "tools/list"}]),
        )
        .await;
        assert!(none.is_none());
        assert!(call(&server, &ctx, json!({"jsonrpc": "2.0", "method": "ping"})).await.is_none());
    }

    #[tokio::test]
    async fn test_auth_gate() {
        let server = server();
        let anonymous = RequestContext::new(None, None);
        let response = call(
            &server,
            &anonymous,
            json!([
                {"jsonrpc": "2.0", "id": 1, "method": "ping"},
                {"jsonrpc": "2.0", "id": 2, "method": "tools/list"}
            ]),
        )
        .await
        .unwrap();
        for item in response.as_array().unwrap() {
            assert_eq!(item["error"]["code"], -32003);
        }
        let failures = server.logger().audit_log().list_by_correlation(&anonymous.correlation_id);
        assert_eq!(failures.len(), 2);
    }

    #[tokio::test]
    async fn test_tool_call_and_resource_read() {
        let server = server();
        let ctx = authed();
        let created = call(
            &server,
            &ctx,
            json!({"jsonrpc": "2.0", "id": 1, "method": "tools/call",
                   "params": {"name": "create_epic", "arguments": {"title": "Onboarding"}}}),
        )
        .await
        .unwrap();
        assert_eq!(created["result"]["content"][0]["type"], "text");
        assert_eq!(created["result"]["content"][1]["data"]["reference_id"], "EP-001");

        let read = call(
            &server,
            &ctx,
            json!({"jsonrpc": "2.0", "id": 2, "method": "resources/read",
                   "params": {"uri": "epic://EP-001"}}),
        )
        .await
        .unwrap();
        let text = read["result"]["contents"][0]["text"].as_str().unwrap();
        let epic: Value = serde_json::from_str(text).unwrap();
        assert_eq!(epic["title"], "Onboarding");

        let missing = call(
            &server,
            &ctx,
            json!({"jsonrpc": "2.0", "id": 3, "method": "resources/read",
                   "params": {"uri": "epic://EP-404"}}),
        )
        .await
        .unwrap();
        assert_eq!(missing["error"]["code"], -32002);

        let bad = call(
            &server,
            &ctx,
            json!({"jsonrpc": "2.0", "id": 4, "method": "tools/call",
                   "params": {"name": "update_epic", "arguments": {"epic_id": "EP-001", "status": "Done"}}}),
        )
        .await
        .unwrap();
        assert_eq!(bad["error"]["code"], -32010);
        assert_eq!(bad["error"]["data"]["reason"], "INVALID_TRANSITION");

        let missing_params = call(
            &server,
            &ctx,
            json!({"jsonrpc": "2.0", "id": 5, "method": "resources/read"}),
        )
        .await
        .unwrap();
        assert_eq!(missing_params["error"]["code"], -32602);
    }
}
