use async_trait::async_trait;
use std::sync::Arc;

use super::Worker;
use crate::errors::GenerationError;
use crate::orchestrator::{Artifact, Directive, PipelineState};
use crate::research::{ResearchQuery, Researcher};

/// Looks up facts about the run's organization through the research port.
pub struct ResearcherWorker {
    researcher: Arc<dyn Researcher>,
}

impl ResearcherWorker {
    pub fn new(researcher: Arc<dyn Researcher>) -> Self {
        Self { researcher }
    }
}

#[async_trait]
impl Worker for ResearcherWorker {
    async fn produce(
        &self,
        state: &PipelineState,
        directive: &Directive,
    ) -> Result<Artifact, GenerationError> {
        let query = ResearchQuery {
            subject: state.context().organization.clone(),
            focus: directive.instruction.clone(),
            feedback: directive.feedback.clone(),
            attempt: directive.attempt,
        };
        let text = self.researcher.research(&query).await?;
        Ok(Artifact::Text(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::{FieldValue, Payload, Record};
    use crate::phase::PipelineDefinition;
    use crate::research::SIMULATED_LABEL;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording {
        queries: Mutex<Vec<ResearchQuery>>,
    }

    #[async_trait]
    impl Researcher for Recording {
        async fn research(&self, query: &ResearchQuery) -> Result<String, GenerationError> {
            self.queries.lock().unwrap().push(query.clone());
            Ok("Acme is migrating off its legacy billing stack.".into())
        }
    }

    fn state() -> PipelineState {
        let mut record = Record::new();
        record.insert("companyName".into(), FieldValue::Text("Acme".into()));
        PipelineState::new(&Payload::new(vec![record]), &PipelineDefinition::default()).unwrap()
    }

    #[tokio::test]
    async fn test_query_uses_organization_instruction_and_feedback() {
        let recording = Arc::new(Recording::default());
        let worker = ResearcherWorker::new(recording.clone());
        let directive = Directive {
            instruction: "Find billing problems.".into(),
            feedback: Some("too generic".into()),
            attempt: 2,
        };

        let artifact = worker.produce(&state(), &directive).await.unwrap();

        assert_eq!(
            artifact,
            Artifact::Text("Acme is migrating off its legacy billing stack.".into())
        );
        let queries = recording.queries.lock().unwrap();
        assert_eq!(queries[0].subject, "Acme");
        assert_eq!(queries[0].focus, "Find billing problems.");
        assert_eq!(queries[0].feedback.as_deref(), Some("too generic"));
        assert_eq!(queries[0].attempt, 2);
    }

    #[tokio::test]
    async fn test_simulated_research_is_labeled() {
        let worker = ResearcherWorker::new(Arc::new(crate::research::SimulatedResearch));
        let directive = Directive {
            instruction: "Find challenges.".into(),
            feedback: None,
            attempt: 1,
        };
        let artifact = worker.produce(&state(), &directive).await.unwrap();
        assert!(artifact.as_text().starts_with(SIMULATED_LABEL));
    }
}
