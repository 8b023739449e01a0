//! Research port: `research(query) -> text`.
//!
//! [`PerplexityClient`] queries a Perplexity-compatible chat endpoint.
//! [`SimulatedResearch`] stands in when no API key is configured and returns
//! a clearly-labeled simulated analysis instead of failing.

use async_trait::async_trait;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

use crate::config::ResearchSection;
use crate::errors::GenerationError;

/// Label prefixed to every simulated research result.
pub const SIMULATED_LABEL: &str = "(simulated research)";

/// What to research and which angle to take.
#[derive(Debug, Clone, PartialEq)]
pub struct ResearchQuery {
    /// Organization being researched
    pub subject: String,
    /// Current instruction for the research phase
    pub focus: String,
    /// Reason the previous attempt was rejected, if any
    pub feedback: Option<String>,
    /// 1-based attempt number for this phase
    pub attempt: u32,
}

impl fmt::Display for ResearchQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Company: {}\nTask: {}", self.subject, self.focus)?;
        if let Some(ref feedback) = self.feedback {
            write!(f, "\nThe previous answer was rejected: {feedback}. Address this.")?;
        }
        if self.attempt > 1 {
            write!(f, "\nThis is attempt {}; take a different angle.", self.attempt)?;
        }
        Ok(())
    }
}

/// Abstraction over a research backend.
#[async_trait]
pub trait Researcher: Send + Sync {
    async fn research(&self, query: &ResearchQuery) -> Result<String, GenerationError>;
}

/// Offline stand-in used when no research backend is configured.
#[derive(Debug, Clone, Default)]
pub struct SimulatedResearch;

#[async_trait]
impl Researcher for SimulatedResearch {
    async fn research(&self, query: &ResearchQuery) -> Result<String, GenerationError> {
        Ok(format!(
            "{SIMULATED_LABEL} Market analysis of {}: Currently facing cash flow challenges due to rapid expansion. Their CTO mentioned needing better budget tools in a recent podcast.",
            query.subject
        ))
    }
}

#[derive(Debug, Deserialize)]
struct ResearchResponse {
    choices: Vec<ResearchChoice>,
}

#[derive(Debug, Deserialize)]
struct ResearchChoice {
    message: ResearchMessage,
}

#[derive(Debug, Deserialize)]
struct ResearchMessage {
    content: String,
}

const RESEARCH_SYSTEM: &str = "You are a market research analyst. Report recent, specific and verifiable facts: financial results, leadership statements, technical initiatives. Be concise; no preamble.";

/// Client for Perplexity-compatible `/chat/completions` endpoints.
pub struct PerplexityClient {
    api_key: String,
    model: String,
    base_url: String,
    timeout_secs: u64,
    http: reqwest::Client,
}

impl PerplexityClient {
    pub fn new(api_key: String, settings: &ResearchSection) -> Result<Self, GenerationError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| GenerationError::from_http(e, settings.timeout_secs))?;
        Ok(Self {
            api_key,
            model: settings.model.clone(),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            timeout_secs: settings.timeout_secs,
            http,
        })
    }
}

#[async_trait]
impl Researcher for PerplexityClient {
    async fn research(&self, query: &ResearchQuery) -> Result<String, GenerationError> {
        let body = serde_json::json!({
            "model": &self.model,
            "messages": [
                {"role": "system", "content": RESEARCH_SYSTEM},
                {"role": "user", "content": query.to_string()},
            ],
        });

        let resp = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerationError::from_http(e, self.timeout_secs))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(GenerationError::Backend(format!(
                "research API error {status}: {body}"
            )));
        }

        let parsed: ResearchResponse = resp
            .json()
            .await
            .map_err(|e| GenerationError::from_http(e, self.timeout_secs))?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| GenerationError::Format("research response has no choices".into()))
    }
}
