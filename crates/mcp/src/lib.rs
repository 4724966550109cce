// MCP (Model Context Protocol) surface of the requirements backend:
// JSON-RPC processing, tools, resources and prompts over the core services.

pub mod capabilities;
pub mod context;
pub mod error;
pub mod logging;
pub mod prompts;
pub mod protocol;
pub mod resources;
pub mod server;
pub mod tools;
pub mod uri;

pub use context::RequestContext;
pub use error::{McpError, McpResult};
pub use logging::McpLogger;
pub use server::{McpServer, McpServerConfig};
