// Search tools over the requirements hierarchy

use super::registry::{parse_args, Tool, ToolEnv};
use super::{json_schema_array, json_schema_enum, json_schema_integer, json_schema_object, json_schema_string};
use crate::context::RequestContext;
use crate::error::McpResult;
use crate::protocol::{CallToolResult, ToolSchema};
use reqhub_core::services::{SearchFilters, SearchResults};
use reqhub_core::types::EntityKind;
use serde::Deserialize;
use serde_json::{json, Value};

const SUGGESTION_LIMIT: usize = 5;

#[derive(Debug, Deserialize)]
struct SearchArgs {
    query: String,
    #[serde(default)]
    entity_types: Vec<EntityKind>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    limit: Option<usize>,
}

impl SearchArgs {
    fn filters(&self) -> SearchFilters {
        SearchFilters {
            kinds: self.entity_types.clone(),
            status: self.status.clone(),
            limit: self.limit,
        }
    }
}

/// Render hits; an empty result carries title suggestions instead
async fn render(env: &ToolEnv, results: SearchResults) -> McpResult<CallToolResult> {
    let mut data = serde_json::to_value(&results)?;
    let summary = if results.items.is_empty() {
        let suggestions = env.services.search.suggest(&results.query, SUGGESTION_LIMIT).await;
        data["suggestions"] = json!(suggestions);
        format!("No matches for '{}'", results.query)
    } else {
        let refs: Vec<String> = results.items.iter().map(|h| h.reference_id.to_string()).collect();
        format!(
            "{} match(es) for '{}': {}",
            results.total,
            results.query,
            refs.join(", ")
        )
    };
    Ok(CallToolResult::with_data(summary, data))
}

/// Tool to search every kind of artifact
pub struct SearchGlobalTool {
    env: ToolEnv,
}

impl SearchGlobalTool {
    pub fn new(env: ToolEnv) -> Self {
        Self { env }
    }
}

#[async_trait::async_trait]
impl Tool for SearchGlobalTool {
    fn schema(&self) -> ToolSchema {
        let kinds: Vec<&str> = EntityKind::ALL.iter().map(|k| k.as_str()).collect();
        ToolSchema {
            name: "search_global".to_string(),
            title: "Search everything".to_string(),
            description: "Case-insensitive text search across epics, user stories, acceptance criteria and requirements".to_string(),
            input_schema: json_schema_object(
                json!({
                    "query": json_schema_string("Text to look for in titles and descriptions"),
                    "entity_types": json_schema_array(
                        json_schema_enum(&kinds, "Entity kind"),
                        "Restrict results to these kinds"
                    ),
                    "status": json_schema_string("Only items in this status"),
                    "limit": json_schema_integer("Maximum number of results (default: 50)")
                }),
                vec!["query"],
            ),
        }
    }

    async fn execute(&self, _ctx: &RequestContext, arguments: Value) -> McpResult<CallToolResult> {
        let args: SearchArgs = parse_args(arguments)?;
        let results = self.env.services.search.search(&args.query, &args.filters()).await?;
        render(&self.env, results).await
    }
}

/// Tool to search requirements only
pub struct SearchRequirementsTool {
    env: ToolEnv,
}

impl SearchRequirementsTool {
    pub fn new(env: ToolEnv) -> Self {
        Self { env }
    }
}

#[async_trait::async_trait]
impl Tool for SearchRequirementsTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "search_requirements".to_string(),
            title: "Search requirements".to_string(),
            description: "Case-insensitive text search restricted to requirements".to_string(),
            input_schema: json_schema_object(
                json!({
                    "query": json_schema_string("Text to look for in requirement titles and descriptions"),
                    "status": json_schema_string("Only requirements in this status"),
                    "limit": json_schema_integer("Maximum number of results (default: 50)")
                }),
                vec!["query"],
            ),
        }
    }

    async fn execute(&self, _ctx: &RequestContext, arguments: Value) -> McpResult<CallToolResult> {
        let args: SearchArgs = parse_args(arguments)?;
        let results = self
            .env
            .services
            .search
            .search_requirements(&args.query, &args.filters())
            .await?;
        render(&self.env, results).await
    }
}
