use reqhub_core::access::Actor;
use uuid::Uuid;

/// Per-request scope: correlation id plus whatever the transport learned
/// about the caller.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub correlation_id: String,
    pub actor: Option<Actor>,
    pub client_address: Option<String>,
    pub user_agent: Option<String>,
}

impl RequestContext {
    /// Inherit an incoming correlation id or mint a new one
    pub fn new(correlation_id: Option<String>, actor: Option<Actor>) -> Self {
        let correlation_id = correlation_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        Self {
            correlation_id,
            actor,
            client_address: None,
            user_agent: None,
        }
    }

    pub fn with_client(mut self, address: Option<String>, user_agent: Option<String>) -> Self {
        self.client_address = address;
        self.user_agent = user_agent;
        self
    }

    pub fn is_authenticated(&self) -> bool {
        self.actor.is_some()
    }
}
