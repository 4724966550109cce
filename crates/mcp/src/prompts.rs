// Stored prompts exposed through `prompts/list` and `prompts/get`

use crate::capabilities::PromptProvider;
use crate::error::McpResult;
use crate::protocol::{GetPromptResult, PromptDescriptor, PromptMessage, ToolContent};
use regex::{Captures, Regex};
use reqhub_core::services::Services;
use reqhub_core::types::{Page, Prompt};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| match Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}") {
        Ok(re) => re,
        Err(_) => unreachable!("static regex pattern"),
    });

const LIST_LIMIT: usize = 1000;

#[derive(Clone)]
pub struct PromptCatalog {
    services: Services,
    list_changed: bool,
}

impl PromptCatalog {
    pub fn new(services: Services, list_changed: bool) -> Self {
        Self {
            services,
            list_changed,
        }
    }

    pub async fn list(&self) -> Vec<PromptDescriptor> {
        let (prompts, _) = self.services.prompts.list(Page::new(LIST_LIMIT, 0)).await;
        prompts.iter().map(describe).collect()
    }

    /// Render a prompt by name, reference id or UUID.
    ///
    /// `{{name}}` placeholders are filled from `arguments`; unknown
    /// placeholders are left as written.
    pub async fn get(&self, key: &str, arguments: Option<&Map<String, Value>>) -> McpResult<GetPromptResult> {
        let prompt = self.services.prompts.get(key).await?;
        let text = render(&prompt.content, arguments);
        Ok(GetPromptResult {
            description: prompt.description.clone().or(Some(prompt.title.clone())),
            messages: vec![PromptMessage {
                role: "user".to_string(),
                content: ToolContent::text(text),
            }],
        })
    }
}

impl PromptProvider for PromptCatalog {
    // Stored prompts can appear at any time
    fn has_prompts(&self) -> bool {
        true
    }

    fn supports_list_changed(&self) -> bool {
        self.list_changed
    }
}

fn describe(prompt: &Prompt) -> PromptDescriptor {
    let names: BTreeSet<&str> = PLACEHOLDER
        .captures_iter(&prompt.content)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
        .collect();
    PromptDescriptor {
        name: prompt.name.clone(),
        title: prompt.title.clone(),
        description: prompt.description.clone(),
        arguments: names
            .into_iter()
            .map(|name| crate::protocol::PromptArgument {
                name: name.to_string(),
                description: None,
                required: false,
            })
            .collect(),
    }
}

fn render(content: &str, arguments: Option<&Map<String, Value>>) -> String {
    let Some(arguments) = arguments else {
        return content.to_string();
    };
    PLACEHOLDER
        .replace_all(content, |caps: &Captures| match arguments.get(&caps[1]) {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqhub_core::access::{Actor, UserRole};
    use reqhub_core::services::NewPrompt;
    use reqhub_core::storage::Store;
    use serde_json::json;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_list_and_render() {
        let services = Services::new(Store::in_memory());
        let actor = Actor::new(Uuid::new_v4(), "pm", UserRole::User);
        services
            .prompts
            .create(
                NewPrompt {
                    name: "review".into(),
                    title: "Review".into(),
                    content: "Review {{ epic }} for {{audience}}".into(),
                    description: None,
                },
                &actor,
            )
            .await
            .unwrap();
        let catalog = PromptCatalog::new(services, false);

        let listed = catalog.list().await;
        assert_eq!(listed.len(), 1);
        let args: Vec<&str> = listed[0].arguments.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(args, vec!["audience", "epic"]);

        let arguments = json!({"epic": "EP-001"});
        let result = catalog.get("review", arguments.as_object()).await.unwrap();
        assert_eq!(result.description.as_deref(), Some("Review"));
        assert_eq!(
            result.messages[0].content,
            ToolContent::text("Review EP-001 for {{audience}}")
        );
        assert!(catalog.get("missing", None).await.is_err());
    }
}
