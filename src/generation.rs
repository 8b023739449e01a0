//! Generation port: "produce text or structured output from a prompt".
//!
//! Workers and the auditor depend only on the [`Generator`] trait. The
//! shipped adapter, [`OpenAiClient`], talks to any OpenAI-compatible
//! chat-completions endpoint.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::config::GenerationSection;
use crate::errors::GenerationError;

/// Shape the caller expects back from the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    Text,
    Json,
}

/// A backend response, already parsed according to the requested shape.
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    Text(String),
    Structured(serde_json::Value),
}

impl Completion {
    /// Text form of the completion; structured values are rendered as JSON.
    pub fn into_text(self) -> String {
        match self {
            Completion::Text(s) => s,
            Completion::Structured(v) => v.to_string(),
        }
    }

    /// Structured form; text completions are parsed, failing with `Format`.
    pub fn into_structured(self) -> Result<serde_json::Value, GenerationError> {
        match self {
            Completion::Structured(v) => Ok(v),
            Completion::Text(s) => parse_structured(&s),
        }
    }
}

/// Abstraction over a text-completion backend.
/// Real implementation: `OpenAiClient`. Test doubles implement it directly.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn complete(
        &self,
        prompt: &str,
        shape: ResponseShape,
    ) -> Result<Completion, GenerationError>;
}

/// Parse a JSON object out of a model response, tolerating markdown fences
/// or prose around it.
pub fn parse_structured(raw: &str) -> Result<serde_json::Value, GenerationError> {
    let cleaned = match (raw.find('{'), raw.rfind('}')) {
        (Some(start), Some(end)) if start < end => &raw[start..=end],
        _ => raw,
    };
    serde_json::from_str(cleaned).map_err(|e| GenerationError::Format(e.to_string()))
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Client for OpenAI-compatible `/chat/completions` endpoints.
pub struct OpenAiClient {
    api_key: String,
    model: String,
    base_url: String,
    timeout_secs: u64,
    temperature: f32,
    http: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(api_key: String, settings: &GenerationSection) -> Result<Self, GenerationError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| GenerationError::from_http(e, settings.timeout_secs))?;
        Ok(Self {
            api_key,
            model: settings.model.clone(),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            timeout_secs: settings.timeout_secs,
            temperature: settings.temperature,
            http,
        })
    }

    fn request_body(&self, prompt: &str, shape: ResponseShape) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": &self.model,
            "temperature": self.temperature,
            "messages": [{"role": "user", "content": prompt}],
        });
        if shape == ResponseShape::Json {
            body["response_format"] = serde_json::json!({"type": "json_object"});
        }
        body
    }
}

#[async_trait]
impl Generator for OpenAiClient {
    async fn complete(
        &self,
        prompt: &str,
        shape: ResponseShape,
    ) -> Result<Completion, GenerationError> {
        let resp = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&self.request_body(prompt, shape))
            .send()
            .await
            .map_err(|e| GenerationError::from_http(e, self.timeout_secs))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(GenerationError::Backend(format!(
                "completion API error {status}: {body}"
            )));
        }

        let parsed: ChatResponse = resp
            .json()
            .await
            .map_err(|e| GenerationError::from_http(e, self.timeout_secs))?;
        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| GenerationError::Format("response has no message content".into()))?;

        tracing::debug!(model = %self.model, chars = text.len(), "completion received");

        match shape {
            ResponseShape::Text => Ok(Completion::Text(text)),
            ResponseShape::Json => parse_structured(&text).map(Completion::Structured),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_structured_plain_object() {
        let v = parse_structured(r#"{"status": "PASS", "critique": "ok"}"#).unwrap();
        assert_eq!(v["status"], "PASS");
    }

    #[test]
    fn test_parse_structured_inside_markdown_fence() {
        let raw = "Here you go:\n```json\n{\"status\": \"FAIL\", \"critique\": \"[Name] found\"}\n```";
        let v = parse_structured(raw).unwrap();
        assert_eq!(v["status"], "FAIL");
        assert_eq!(v["critique"], "[Name] found");
    }

    #[test]
    fn test_parse_structured_garbage_is_format_error() {
        let err = parse_structured("I think it passes.").unwrap_err();
        assert!(err.is_format());
    }

    #[test]
    fn test_completion_into_text_renders_structured() {
        let c = Completion::Structured(serde_json::json!({"a": 1}));
        assert_eq!(c.into_text(), r#"{"a":1}"#);
        assert_eq!(Completion::Text("hi".into()).into_text(), "hi");
    }

    #[test]
    fn test_completion_into_structured_parses_text() {
        let v = Completion::Text(r#"{"x": true}"#.into())
            .into_structured()
            .unwrap();
        assert_eq!(v["x"], true);
        assert!(Completion::Text("nope".into()).into_structured().is_err());
    }

    #[test]
    fn test_request_body_requests_json_object_for_structured_shape() {
        let settings = GenerationSection {
            model: "gpt-4o-mini".into(),
            ..GenerationSection::default()
        };
        let client = OpenAiClient::new("sk-test".into(), &settings).unwrap();

        let text = client.request_body("hello", ResponseShape::Text);
        assert!(text.get("response_format").is_none());
        assert_eq!(text["messages"][0]["content"], "hello");

        let json = client.request_body("hello", ResponseShape::Json);
        assert_eq!(json["response_format"]["type"], "json_object");
        assert_eq!(json["model"], "gpt-4o-mini");
    }

    #[tokio::test]
    async fn test_request_timeout_maps_to_timeout_error() {
        // Accepts connections but never answers.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let settings = GenerationSection {
            base_url: format!("http://{addr}"),
            timeout_secs: 1,
            ..GenerationSection::default()
        };
        let client = OpenAiClient::new("sk-test".into(), &settings).unwrap();
        let err = client
            .complete("hello", ResponseShape::Text)
            .await
            .unwrap_err();

        assert!(matches!(err, GenerationError::Timeout { seconds: 1 }));
        server.abort();
    }
}
