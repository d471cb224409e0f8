//! HTTP agent invoker — calls LLM provider APIs directly.
//!
//! Each `target_id` is resolved through the [`AgentRegistry`]; fields the
//! agent leaves unset fall back to [`InvokerConfig`]. Two wire formats are
//! supported:
//!
//! - `anthropic` — `POST {base_url}/v1/messages`
//! - `openai` — `POST {base_url}/chat/completions`
//!
//! Sessions are process-local message histories; a request carrying a
//! `session_id` sends the whole history so the agent sees earlier turns.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::{AgentInvoker, AgentRequest, AgentResponse};
use crate::agents::{AgentDefinition, AgentRegistry};
use crate::config::InvokerConfig;
use crate::error::{InvocationError, SessionError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

impl ChatMessage {
    fn user(content: &str) -> Self {
        Self {
            role: "user".to_string(),
            content: content.to_string(),
        }
    }

    fn assistant(content: &str) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.to_string(),
        }
    }
}

/// Effective call settings for one agent.
#[derive(Debug, Clone)]
struct CallSettings {
    adapter: String,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: Option<f64>,
    system_prompt: String,
}

impl CallSettings {
    fn resolve(agent: &AgentDefinition, defaults: &InvokerConfig) -> Self {
        Self {
            adapter: agent.adapter.clone().unwrap_or_else(|| defaults.adapter.clone()),
            base_url: agent.base_url.clone().unwrap_or_else(|| defaults.base_url.clone()),
            api_key: agent.api_key.clone().unwrap_or_else(|| defaults.api_key.clone()),
            model: agent.model.clone().unwrap_or_else(|| defaults.model.clone()),
            max_tokens: agent.max_tokens.unwrap_or(defaults.max_tokens),
            temperature: agent.temperature,
            system_prompt: agent.system_prompt.clone(),
        }
    }
}

pub struct HttpAgentInvoker {
    client: reqwest::Client,
    registry: AgentRegistry,
    defaults: InvokerConfig,
    sessions: RwLock<HashMap<String, Vec<ChatMessage>>>,
}

impl HttpAgentInvoker {
    pub fn new(registry: AgentRegistry, defaults: InvokerConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(defaults.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            registry,
            defaults,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    async fn history(&self, request: &AgentRequest) -> Result<Vec<ChatMessage>, InvocationError> {
        let Some(session_id) = request.session_id.as_deref() else {
            return Ok(Vec::new());
        };
        self.sessions
            .read()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| {
                InvocationError::new(
                    &request.target_id,
                    format!("Unknown or closed session '{}'", session_id),
                )
            })
    }

    async fn remember(&self, session_id: &str, user: &str, assistant: &str) {
        if let Some(history) = self.sessions.write().await.get_mut(session_id) {
            history.push(ChatMessage::user(user));
            history.push(ChatMessage::assistant(assistant));
        }
    }

    async fn send(
        &self,
        settings: &CallSettings,
        messages: &[ChatMessage],
    ) -> Result<String, String> {
        match settings.adapter.as_str() {
            "anthropic" | "claude" => self.call_anthropic(settings, messages).await,
            "openai" | "opencode" => self.call_openai(settings, messages).await,
            other => Err(format!("Unknown adapter type: '{}'", other)),
        }
    }

    /// Anthropic-compatible Messages API.
    ///
    /// POST {base_url}/v1/messages
    /// Headers:
    ///   x-api-key: {api_key}
    ///   anthropic-version: 2023-06-01
    async fn call_anthropic(
        &self,
        settings: &CallSettings,
        messages: &[ChatMessage],
    ) -> Result<String, String> {
        let url = format!("{}/v1/messages", settings.base_url.trim_end_matches('/'));

        let mut body = serde_json::json!({
            "model": settings.model,
            "max_tokens": settings.max_tokens,
            "messages": messages,
        });
        if !settings.system_prompt.is_empty() {
            body["system"] = serde_json::Value::String(settings.system_prompt.clone());
        }
        if let Some(temp) = settings.temperature {
            body["temperature"] = serde_json::json!(temp);
        }

        tracing::debug!("[HttpInvoker] Calling Anthropic API: {} (model: {})", url, settings.model);

        let json = self
            .post_json(
                self.client
                    .post(&url)
                    .header("x-api-key", &settings.api_key)
                    .header("anthropic-version", "2023-06-01")
                    .json(&body),
            )
            .await?;

        let text = json
            .get("content")
            .and_then(|c| c.as_array())
            .map(|blocks| {
                blocks
                    .iter()
                    .filter(|block| block.get("type").and_then(|t| t.as_str()) == Some("text"))
                    .filter_map(|block| block.get("text").and_then(|t| t.as_str()))
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .ok_or_else(|| "Response has no content blocks".to_string())?;

        Ok(text)
    }

    /// OpenAI-compatible chat completions API.
    ///
    /// POST {base_url}/chat/completions
    /// Headers:
    ///   Authorization: Bearer {api_key}
    async fn call_openai(
        &self,
        settings: &CallSettings,
        messages: &[ChatMessage],
    ) -> Result<String, String> {
        let url = format!("{}/chat/completions", settings.base_url.trim_end_matches('/'));

        let mut all_messages = Vec::with_capacity(messages.len() + 1);
        if !settings.system_prompt.is_empty() {
            all_messages.push(ChatMessage {
                role: "system".to_string(),
                content: settings.system_prompt.clone(),
            });
        }
        all_messages.extend_from_slice(messages);

        let mut body = serde_json::json!({
            "model": settings.model,
            "max_tokens": settings.max_tokens,
            "messages": all_messages,
        });
        if let Some(temp) = settings.temperature {
            body["temperature"] = serde_json::json!(temp);
        }

        tracing::debug!("[HttpInvoker] Calling OpenAI-compatible API: {} (model: {})", url, settings.model);

        let json = self
            .post_json(
                self.client
                    .post(&url)
                    .header("Authorization", format!("Bearer {}", settings.api_key))
                    .json(&body),
            )
            .await?;

        json.get("choices")
            .and_then(|c| c.as_array())
            .and_then(|arr| arr.first())
            .and_then(|choice| choice.get("message"))
            .and_then(|msg| msg.get("content"))
            .and_then(|c| c.as_str())
            .map(str::to_string)
            .ok_or_else(|| "Response has no choices".to_string())
    }

    async fn post_json(&self, builder: reqwest::RequestBuilder) -> Result<serde_json::Value, String> {
        let response = builder
            .send()
            .await
            .map_err(|e| format!("HTTP request failed: {}", e))?;

        let status = response.status();
        let response_text = response
            .text()
            .await
            .map_err(|e| format!("Failed to read response body: {}", e))?;

        if !status.is_success() {
            return Err(format!("API returned {}: {}", status, response_text));
        }

        serde_json::from_str(&response_text)
            .map_err(|e| format!("Failed to parse response JSON: {}", e))
    }
}

/// Parse a structured reply, tolerating a surrounding markdown code fence.
fn parse_structured(text: &str) -> Result<serde_json::Map<String, serde_json::Value>, String> {
    let trimmed = text.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();

    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(serde_json::Value::Object(fields)) => Ok(fields),
        Ok(_) => Err("Structured reply is not a JSON object".to_string()),
        Err(e) => Err(format!("Structured reply is not valid JSON: {}", e)),
    }
}

#[async_trait]
impl AgentInvoker for HttpAgentInvoker {
    async fn invoke(&self, request: &AgentRequest) -> Result<AgentResponse, InvocationError> {
        let agent = self.registry.get(&request.target_id).ok_or_else(|| {
            InvocationError::new(
                &request.target_id,
                format!("Unknown target '{}'", request.target_id),
            )
        })?;
        let settings = CallSettings::resolve(agent, &self.defaults);

        let mut messages = self.history(request).await?;
        messages.push(ChatMessage::user(&request.message));

        tracing::info!(
            "[HttpInvoker] Invoking {} ({}) with {} message(s)",
            agent.id,
            agent.name,
            messages.len()
        );

        let text = self
            .send(&settings, &messages)
            .await
            .map_err(|cause| InvocationError::new(&request.target_id, cause))?;

        if let Some(session_id) = request.session_id.as_deref() {
            self.remember(session_id, &request.message, &text).await;
        }

        if agent.structured_output {
            parse_structured(&text)
                .map(AgentResponse::Structured)
                .map_err(|cause| InvocationError::new(&request.target_id, cause))
        } else {
            Ok(AgentResponse::Text(text))
        }
    }

    async fn open_session(&self) -> Result<String, SessionError> {
        let id = uuid::Uuid::new_v4().to_string();
        self.sessions.write().await.insert(id.clone(), Vec::new());
        tracing::debug!("[HttpInvoker] Opened session {}", id);
        Ok(id)
    }

    async fn close_session(&self, session_id: &str) -> Result<bool, SessionError> {
        let removed = self.sessions.write().await.remove(session_id).is_some();
        tracing::debug!("[HttpInvoker] Closed session {} (was open: {})", session_id, removed);
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn invoker_for(server: &MockServer, adapter: &str) -> HttpAgentInvoker {
        let defaults = InvokerConfig {
            adapter: adapter.to_string(),
            base_url: server.uri(),
            api_key: "test-key".to_string(),
            model: "test-model".to_string(),
            ..InvokerConfig::default()
        };
        HttpAgentInvoker::new(AgentRegistry::with_builtins(), defaults)
    }

    fn anthropic_reply(text: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "model": "test-model",
            "content": [{ "type": "text", "text": text }],
            "usage": { "input_tokens": 3, "output_tokens": 5 }
        }))
    }

    #[tokio::test]
    async fn anthropic_text_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "test-key"))
            .respond_with(anthropic_reply("hello there"))
            .expect(1)
            .mount(&server)
            .await;

        let invoker = invoker_for(&server, "anthropic");
        let response = invoker.invoke(&AgentRequest::new("100", "hi")).await.unwrap();

        assert_eq!(response, AgentResponse::Text("hello there".to_string()));
    }

    #[tokio::test]
    async fn openai_text_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{ "message": { "role": "assistant", "content": "from openai" } }]
            })))
            .mount(&server)
            .await;

        let invoker = invoker_for(&server, "openai");
        let response = invoker.invoke(&AgentRequest::new("102", "write")).await.unwrap();

        assert_eq!(response.text(), "from openai");
    }

    #[tokio::test]
    async fn provider_error_becomes_invocation_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let invoker = invoker_for(&server, "anthropic");
        let err = invoker.invoke(&AgentRequest::new("100", "hi")).await.unwrap_err();

        assert_eq!(err.target_id, "100");
        assert!(err.cause.contains("503"), "cause was: {}", err.cause);
    }

    #[tokio::test]
    async fn unknown_target_fails_without_calling_provider() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(anthropic_reply("unused"))
            .expect(0)
            .mount(&server)
            .await;

        let invoker = invoker_for(&server, "anthropic");
        let err = invoker.invoke(&AgentRequest::new("999", "hi")).await.unwrap_err();

        assert!(err.cause.contains("Unknown target"));
    }

    #[tokio::test]
    async fn structured_agent_reply_is_parsed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(anthropic_reply(
                "```json\n{\"content\": \"mean is 200\", \"confidence\": 0.9}\n```",
            ))
            .mount(&server)
            .await;

        let invoker = invoker_for(&server, "anthropic");
        let response = invoker
            .invoke(&AgentRequest::new("101", "100, 200, 300"))
            .await
            .unwrap();

        assert!(response.is_structured());
        assert_eq!(response.text(), "mean is 200");
        assert_eq!(response.field("confidence"), Some(&serde_json::json!(0.9)));
    }

    #[tokio::test]
    async fn structured_agent_with_prose_reply_fails_validation() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(anthropic_reply("I could not analyse that."))
            .mount(&server)
            .await;

        let invoker = invoker_for(&server, "anthropic");
        let err = invoker
            .invoke(&AgentRequest::new("101", "???"))
            .await
            .unwrap_err();

        assert!(err.cause.contains("not valid JSON"));
    }

    #[tokio::test]
    async fn session_history_is_sent_on_later_turns() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(anthropic_reply("noted"))
            .mount(&server)
            .await;

        let invoker = invoker_for(&server, "anthropic");
        let session = invoker.open_session().await.unwrap();

        invoker
            .invoke(&AgentRequest::new("100", "my name is Ada").in_session(&session))
            .await
            .unwrap();
        invoker
            .invoke(&AgentRequest::new("100", "what is my name?").in_session(&session))
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        let second: serde_json::Value = serde_json::from_slice(&requests[1].body).unwrap();
        let messages = second["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0]["content"], "my name is Ada");
        assert_eq!(messages[1]["role"], "assistant");
        assert_eq!(messages[2]["content"], "what is my name?");
    }

    #[tokio::test]
    async fn closed_session_cannot_be_used_and_closes_idempotently() {
        let server = MockServer::start().await;
        let invoker = invoker_for(&server, "anthropic");
        let session = invoker.open_session().await.unwrap();

        assert_eq!(invoker.close_session(&session).await, Ok(true));
        assert_eq!(invoker.close_session(&session).await, Ok(false));

        let err = invoker
            .invoke(&AgentRequest::new("100", "hello?").in_session(&session))
            .await
            .unwrap_err();
        assert!(err.cause.contains("closed session"));
    }
}
