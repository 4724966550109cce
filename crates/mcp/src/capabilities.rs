// Capability negotiation for `initialize`

use crate::protocol::{
    PromptsCapability, ResourcesCapability, ServerCapabilities, ToolsCapability,
};
use std::sync::Arc;

/// Anything that contributes tools to the server
pub trait ToolProvider: Send + Sync {
    fn has_tools(&self) -> bool;
    fn supports_list_changed(&self) -> bool;
}

/// Anything that contributes prompts to the server
pub trait PromptProvider: Send + Sync {
    fn has_prompts(&self) -> bool;
    fn supports_list_changed(&self) -> bool;
}

/// Builds the capability record from the registered providers.
///
/// The result depends only on provider state, so repeated calls agree.
#[derive(Clone)]
pub struct CapabilitiesManager {
    tools: Arc<dyn ToolProvider>,
    prompts: Arc<dyn PromptProvider>,
}

impl CapabilitiesManager {
    pub fn new(tools: Arc<dyn ToolProvider>, prompts: Arc<dyn PromptProvider>) -> Self {
        Self { tools, prompts }
    }

    pub fn server_capabilities(&self) -> ServerCapabilities {
        ServerCapabilities {
            tools: ToolsCapability {
                list_changed: self.tools.has_tools() && self.tools.supports_list_changed(),
            },
            prompts: PromptsCapability {
                list_changed: self.prompts.has_prompts() && self.prompts.supports_list_changed(),
            },
            resources: ResourcesCapability {
                list_changed: true,
                subscribe: true,
            },
        }
    }
}
