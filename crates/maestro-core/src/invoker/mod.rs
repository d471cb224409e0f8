//! Agent invocation contract.
//!
//! The workflow patterns never talk to a provider directly. They go through
//! an [`AgentInvoker`], which maps an [`AgentRequest`] to an [`AgentResponse`]
//! and manages server-side conversation sessions.
//!
//! ```text
//! WorkflowEngine ──► AgentInvoker ──► HttpAgentInvoker ──► Anthropic / OpenAI-compatible API
//!                                 └─► ScriptedInvoker  (dry-run, tests)
//! ```

pub mod http;
pub mod scripted;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{InvocationError, SessionError};

pub use http::HttpAgentInvoker;
pub use scripted::{RecordedCall, ScriptedInvoker};

/// One request to a target agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRequest {
    /// Which agent/model to invoke. Opaque to the workflow layer.
    pub target_id: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl AgentRequest {
    pub fn new(target_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            target_id: target_id.into(),
            message: message.into(),
            session_id: None,
        }
    }

    /// Scope this request to a conversation session.
    pub fn in_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

/// Result of an invocation: plain text, or a structured payload whose shape
/// is decided by the target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum AgentResponse {
    Text(String),
    Structured(serde_json::Map<String, serde_json::Value>),
}

impl AgentResponse {
    /// Textual content of the response, whatever its shape.
    ///
    /// Structured payloads yield their `content` field when it is a string,
    /// and their compact JSON rendering otherwise.
    pub fn text(&self) -> String {
        match self {
            AgentResponse::Text(text) => text.clone(),
            AgentResponse::Structured(fields) => match fields.get("content") {
                Some(serde_json::Value::String(content)) => content.clone(),
                _ => serde_json::Value::Object(fields.clone()).to_string(),
            },
        }
    }

    pub fn is_structured(&self) -> bool {
        matches!(self, AgentResponse::Structured(_))
    }

    /// Look up a named field of a structured payload.
    pub fn field(&self, name: &str) -> Option<&serde_json::Value> {
        match self {
            AgentResponse::Text(_) => None,
            AgentResponse::Structured(fields) => fields.get(name),
        }
    }
}

impl From<String> for AgentResponse {
    fn from(text: String) -> Self {
        AgentResponse::Text(text)
    }
}

impl From<&str> for AgentResponse {
    fn from(text: &str) -> Self {
        AgentResponse::Text(text.to_string())
    }
}

/// The external collaborator that performs invocations.
///
/// Implementations own transport, timeouts and provider selection. Dropping
/// an in-flight `invoke` future is how the workflow layer cancels it.
#[async_trait]
pub trait AgentInvoker: Send + Sync {
    /// Perform one request/response exchange.
    async fn invoke(&self, request: &AgentRequest) -> Result<AgentResponse, InvocationError>;

    /// Create a server-side session and return its id.
    async fn open_session(&self) -> Result<String, SessionError>;

    /// Release a session. Returns `Ok(false)` when the id is unknown or was
    /// already closed; calling it twice is never an error.
    async fn close_session(&self, session_id: &str) -> Result<bool, SessionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structured_response_prefers_content_field() {
        let mut fields = serde_json::Map::new();
        fields.insert("content".into(), "summary text".into());
        fields.insert("confidence".into(), serde_json::json!(0.9));
        let response = AgentResponse::Structured(fields);

        assert_eq!(response.text(), "summary text");
        assert_eq!(response.field("confidence"), Some(&serde_json::json!(0.9)));
    }

    #[test]
    fn structured_response_without_content_renders_json() {
        let mut fields = serde_json::Map::new();
        fields.insert("summary".into(), "ok".into());
        let response = AgentResponse::Structured(fields);

        assert_eq!(response.text(), r#"{"summary":"ok"}"#);
        assert!(response.is_structured());
    }

    #[test]
    fn request_builder_attaches_session() {
        let request = AgentRequest::new("100", "hi").in_session("s-1");
        assert_eq!(request.session_id.as_deref(), Some("s-1"));
    }
}
