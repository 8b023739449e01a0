//! Workers produce one phase's candidate artifact.
//!
//! A worker is stateless: it reads the pipeline state through a shared
//! borrow, receives the current [`Directive`], and returns an [`Artifact`].
//! The [`WorkerRegistry`] maps role names to workers so the orchestrator
//! never branches on role.

mod researcher;
mod writer;

pub use researcher::ResearcherWorker;
pub use writer::{WriterWorker, build_writer_prompt};

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::errors::{DefinitionError, GenerationError};
use crate::generation::Generator;
use crate::orchestrator::{Artifact, Directive, PipelineState};
use crate::phase::{PipelineDefinition, RESEARCHER, WRITER};
use crate::research::Researcher;

#[async_trait]
pub trait Worker: Send + Sync {
    async fn produce(
        &self,
        state: &PipelineState,
        directive: &Directive,
    ) -> Result<Artifact, GenerationError>;
}

/// Lookup table from role name to worker.
#[derive(Clone, Default)]
pub struct WorkerRegistry {
    workers: HashMap<String, Arc<dyn Worker>>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with a researcher and a writer. The writer reads insights
    /// from the key `definition` assigns to its researcher phase. A writer
    /// without a generator produces simulated drafts.
    pub fn standard(
        definition: &PipelineDefinition,
        generator: Option<Arc<dyn Generator>>,
        researcher: Arc<dyn Researcher>,
    ) -> Self {
        let writer = WriterWorker::new(generator).with_research_key(definition.research_key());
        Self::new()
            .with(RESEARCHER, Arc::new(ResearcherWorker::new(researcher)))
            .with(WRITER, Arc::new(writer))
    }

    /// Register `worker` under `role`, replacing any previous entry.
    pub fn with(mut self, role: &str, worker: Arc<dyn Worker>) -> Self {
        self.workers.insert(role.to_string(), worker);
        self
    }

    pub fn get(&self, role: &str) -> Option<Arc<dyn Worker>> {
        self.workers.get(role).cloned()
    }

    pub fn contains(&self, role: &str) -> bool {
        self.workers.contains_key(role)
    }

    /// Sorted role names, for diagnostics.
    pub fn roles(&self) -> Vec<&str> {
        let mut roles: Vec<&str> = self.workers.keys().map(String::as_str).collect();
        roles.sort_unstable();
        roles
    }

    /// Every phase role must have a registered worker.
    pub fn check(&self, definition: &PipelineDefinition) -> Result<(), DefinitionError> {
        match definition.phases.iter().find(|p| !self.contains(&p.role)) {
            Some(phase) => Err(DefinitionError::UnknownWorker(phase.role.clone())),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for WorkerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerRegistry")
            .field("roles", &self.roles())
            .finish()
    }
}
