//! Chat backend client.
//!
//! The [`ModelClient`] trait is the seam between the loop and the language
//! model. [`OllamaClient`] speaks the Ollama `/api/chat` protocol with one
//! blocking, non-streaming request per call. Failures are never retried.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::core::conversation::Message;

pub const DEFAULT_BASE_URL: &str = "http://ollama:11434";
pub const DEFAULT_MODEL: &str = "qwen2.5-coder:7b";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Backend failures. Both variants end the run.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Unreachable backend, timeout, or non-success HTTP status.
    #[error("chat request to {url} failed: {message}")]
    Request { url: String, message: String },
    /// Success status, but the body lacks `message.content`.
    #[error("unexpected chat response from {url}: {message}")]
    ResponseShape { url: String, message: String },
}

/// Sends the conversation and returns the assistant's raw reply text.
pub trait ModelClient {
    fn complete(&self, messages: &[Message]) -> Result<String, ModelError>;
}

/// Explicit backend settings; built once at the entry point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelConfig {
    pub base_url: String,
    pub model: String,
    pub request_timeout: Duration,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl ModelConfig {
    pub fn chat_url(&self) -> String {
        format!("{}/api/chat", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    stream: bool,
}

/// Client for an Ollama-compatible chat endpoint.
pub struct OllamaClient {
    config: ModelConfig,
    http: reqwest::blocking::Client,
}

impl OllamaClient {
    pub fn new(config: ModelConfig) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context("build http client")?;
        Ok(Self { config, http })
    }
}

impl ModelClient for OllamaClient {
    #[instrument(skip_all, fields(model = %self.config.model, messages = messages.len()))]
    fn complete(&self, messages: &[Message]) -> Result<String, ModelError> {
        let url = self.config.chat_url();
        let body = ChatRequest {
            model: &self.config.model,
            messages,
            stream: false,
        };

        debug!(%url, "sending chat request");
        let request_error = |err: reqwest::Error| {
            warn!(%url, err = %err, "chat request failed");
            ModelError::Request {
                url: url.clone(),
                message: err.to_string(),
            }
        };
        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .and_then(reqwest::blocking::Response::error_for_status)
            .map_err(request_error)?;
        let payload = response.text().map_err(request_error)?;

        let reply = extract_reply(&payload).map_err(|message| ModelError::ResponseShape {
            url: url.clone(),
            message,
        })?;
        debug!(reply_bytes = reply.len(), "chat reply received");
        Ok(reply)
    }
}

/// Pull `message.content` out of a chat response body.
fn extract_reply(body: &str) -> Result<String, String> {
    let value: Value =
        serde_json::from_str(body).map_err(|err| format!("response is not JSON: {err}"))?;
    value
        .get("message")
        .and_then(|message| message.get("content"))
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| "missing string field message.content".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::StubHttpServer;

    fn config_for(base_url: String) -> ModelConfig {
        ModelConfig {
            base_url,
            model: "test-model".to_string(),
            request_timeout: Duration::from_secs(10),
        }
    }

    #[test]
    fn chat_url_strips_trailing_slashes() {
        let config = config_for("http://localhost:11434//".to_string());
        assert_eq!(config.chat_url(), "http://localhost:11434/api/chat");
    }

    #[test]
    fn request_body_matches_chat_protocol() {
        let messages = vec![Message::system("sys"), Message::user("goal")];
        let body = ChatRequest {
            model: "m",
            messages: &messages,
            stream: false,
        };
        let json = serde_json::to_value(&body).expect("serialize");
        assert_eq!(
            json,
            serde_json::json!({
                "model": "m",
                "messages": [
                    {"role": "system", "content": "sys"},
                    {"role": "user", "content": "goal"}
                ],
                "stream": false
            })
        );
    }

    #[test]
    fn extract_reply_reads_message_content() {
        let reply = extract_reply(r#"{"message":{"role":"assistant","content":"hi"},"done":true}"#)
            .expect("reply");
        assert_eq!(reply, "hi");
    }

    #[test]
    fn extract_reply_rejects_missing_content() {
        assert!(extract_reply(r#"{"done":true}"#).is_err());
        assert!(extract_reply(r#"{"message":{"content":5}}"#).is_err());
        assert!(extract_reply("not json").is_err());
    }

    #[test]
    fn complete_posts_conversation_and_returns_reply() {
        let server = StubHttpServer::respond_once(
            200,
            r#"{"message":{"role":"assistant","content":"{\"action\":\"done\"}"}}"#,
        );
        let client = OllamaClient::new(config_for(server.base_url())).expect("client");

        let reply = client
            .complete(&[Message::system("sys"), Message::user("goal")])
            .expect("complete");
        assert_eq!(reply, r#"{"action":"done"}"#);

        let request = server.join();
        assert!(request.starts_with("POST /api/chat "));
        assert!(request.contains(r#""model":"test-model""#));
        assert!(request.contains(r#""stream":false"#));
    }

    #[test]
    fn error_status_is_request_error() {
        let server = StubHttpServer::respond_once(500, r#"{"error":"boom"}"#);
        let client = OllamaClient::new(config_for(server.base_url())).expect("client");

        let err = client.complete(&[Message::user("goal")]).unwrap_err();
        assert!(matches!(err, ModelError::Request { .. }));
        server.join();
    }

    #[test]
    fn missing_content_is_shape_error() {
        let server = StubHttpServer::respond_once(200, r#"{"done":true}"#);
        let client = OllamaClient::new(config_for(server.base_url())).expect("client");

        let err = client.complete(&[Message::user("goal")]).unwrap_err();
        assert!(matches!(err, ModelError::ResponseShape { .. }));
        server.join();
    }

    #[test]
    fn unreachable_backend_is_request_error() {
        let base_url = StubHttpServer::closed_base_url();
        let client = OllamaClient::new(config_for(base_url)).expect("client");

        let err = client.complete(&[Message::user("goal")]).unwrap_err();
        assert!(matches!(err, ModelError::Request { .. }));
    }
}
