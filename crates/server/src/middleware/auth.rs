use crate::config::{AppState, TokenConfig};
use anyhow::{bail, Result};
use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use reqhub_core::access::Actor;
use reqhub_mcp::logging::redact_string;
use reqhub_mcp::RequestContext;
use sha2::{Digest, Sha256};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

pub const CORRELATION_HEADER: HeaderName = HeaderName::from_static("x-correlation-id");

/// Lowercase hex SHA-256 of a raw token
pub fn token_digest(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Personal access tokens, keyed by digest
#[derive(Debug, Clone, Default)]
pub struct TokenStore {
    actors: Arc<HashMap<String, Actor>>,
}

impl TokenStore {
    pub fn from_config(tokens: &[TokenConfig]) -> Result<Self> {
        let mut actors = HashMap::with_capacity(tokens.len());
        for token in tokens {
            let digest = token.token_sha256.trim().to_lowercase();
            if digest.len() != 64 || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
                bail!("token for '{}' is not a SHA-256 hex digest", token.username);
            }
            let actor = Actor::new(token.user_id, token.username.clone(), token.role);
            if actors.insert(digest, actor).is_some() {
                bail!("duplicate token digest for '{}'", token.username);
            }
        }
        Ok(Self {
            actors: Arc::new(actors),
        })
    }

    pub fn len(&self) -> usize {
        self.actors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }

    pub fn authenticate(&self, token: &str) -> Option<Actor> {
        self.actors.get(&token_digest(token)).cloned()
    }
}

/// Extract the bearer token from the authorization header
pub fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let auth_header = headers.get("Authorization")?;
    let auth_str = auth_header.to_str().ok()?;
    auth_str
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Resolve the caller and correlation id and attach them as a
/// [`RequestContext`] extension. Requests without a valid token still pass;
/// handlers and the MCP processor decide what anonymous callers may do.
pub async fn authenticate(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Response {
    let headers = req.headers();
    let correlation_id = header_string(headers, CORRELATION_HEADER.as_str());
    let client_address = header_string(headers, "x-forwarded-for");
    let user_agent = header_string(headers, "user-agent");

    let presented = extract_bearer(headers).map(str::to_string);
    let actor = presented
        .as_deref()
        .and_then(|token| state.tokens.authenticate(token));

    let ctx = RequestContext::new(correlation_id, actor).with_client(client_address, user_agent);
    if let (Some(token), None) = (presented.as_deref(), ctx.actor.as_ref()) {
        state.logger.security(
            &ctx,
            "token_rejected",
            &json!({ "authorization": redact_string(&format!("Bearer {}", token)) }),
        );
    }
    let echoed = HeaderValue::from_str(&ctx.correlation_id).ok();
    req.extensions_mut().insert(ctx);

    let mut response = next.run(req).await;
    if let Some(value) = echoed {
        response.headers_mut().insert(CORRELATION_HEADER, value);
    }
    response
}
