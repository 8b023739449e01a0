use async_trait::async_trait;
use std::sync::Arc;

use super::Worker;
use crate::errors::GenerationError;
use crate::generation::{Generator, ResponseShape};
use crate::orchestrator::{Artifact, Directive, PipelineState};
use crate::phase::RESEARCH_KEY;

/// Insights placeholder when no research artifact exists.
const NO_DATA: &str = "No data";

/// Build the copywriting prompt for one dispatch.
pub fn build_writer_prompt(state: &PipelineState, research_key: &str, directive: &Directive) -> String {
    let context = state.context();
    let insights = state
        .artifact(research_key)
        .map(|a| a.as_text())
        .unwrap_or_else(|| NO_DATA.to_string());

    let mut prompt = format!(
        r#"You are an expert B2B copywriter.

Task: {instruction}
Target: {name} at {organization}
Research insights: {insights}

Rules:
- Max 300 characters.
- Never use placeholders such as [Name] or [Company]; use the real names.
- Reference a specific point from the research.
- Keep it conversational, not salesy."#,
        instruction = directive.instruction,
        name = context.display_name,
        organization = context.organization,
    );

    if directive.attempt > 1 {
        prompt.push_str(&format!(
            "\n\nAttempt {}: earlier drafts were rejected. Write a fresh one.",
            directive.attempt
        ));
    }
    if let Some(ref feedback) = directive.feedback {
        prompt.push_str(&format!(
            "\n\nPREVIOUS REJECTION REASON: {feedback} FIX THIS IMMEDIATELY."
        ));
    }
    prompt
}

/// Drafts outreach copy through the generation port.
pub struct WriterWorker {
    generator: Option<Arc<dyn Generator>>,
    research_key: String,
}

impl WriterWorker {
    pub fn new(generator: Option<Arc<dyn Generator>>) -> Self {
        Self {
            generator,
            research_key: RESEARCH_KEY.to_string(),
        }
    }

    /// Read research insights from a different state key.
    pub fn with_research_key(mut self, key: &str) -> Self {
        self.research_key = key.to_string();
        self
    }

    fn simulated_draft(state: &PipelineState) -> String {
        let context = state.context();
        format!(
            "(simulated) Hi {}, I've been following {} and would love to connect and compare notes.",
            context.display_name, context.organization
        )
    }
}

#[async_trait]
impl Worker for WriterWorker {
    async fn produce(
        &self,
        state: &PipelineState,
        directive: &Directive,
    ) -> Result<Artifact, GenerationError> {
        let Some(ref generator) = self.generator else {
            return Ok(Artifact::Text(Self::simulated_draft(state)));
        };

        let prompt = build_writer_prompt(state, &self.research_key, directive);
        let text = generator
            .complete(&prompt, ResponseShape::Text)
            .await?
            .into_text();
        Ok(Artifact::Text(text.trim().to_string()))
    }
}
