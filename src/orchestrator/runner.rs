use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

use super::state::{Artifact, Directive, PipelineState};
use crate::auditor::{Auditor, Verdict};
use crate::config::{GatingMode, OverseerConfig};
use crate::errors::{DefinitionError, GenerationError, RunError};
use crate::generation::{Generator, OpenAiClient};
use crate::observer::{EventKind, RunObserver, SYSTEM_ROLE};
use crate::phase::{Phase, PipelineDefinition};
use crate::research::{PerplexityClient, Researcher, SimulatedResearch};
use crate::run::{RunRecord, RunStatus};
use crate::workers::WorkerRegistry;

/// Retry policy, gating mode and call bound for one orchestrator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrchestratorConfig {
    /// Rejections allowed per phase before escalation
    pub max_retries: u32,
    pub mode: GatingMode,
    /// Bound on every worker dispatch and auditor call
    pub call_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            mode: GatingMode::Static,
            call_timeout: Duration::from_secs(120),
        }
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed { result: String },
    Failed { reason: String },
}

impl RunOutcome {
    pub fn status(&self) -> RunStatus {
        match self {
            Self::Completed { .. } => RunStatus::Completed,
            Self::Failed { .. } => RunStatus::Failed,
        }
    }

    pub fn result(&self) -> Option<&str> {
        match self {
            Self::Completed { result } => Some(result),
            Self::Failed { .. } => None,
        }
    }
}

/// The phase runner: sequences phases, dispatches workers, gates each
/// artifact through the auditor and applies the retry budget.
pub struct Orchestrator {
    definition: PipelineDefinition,
    workers: WorkerRegistry,
    auditor: Auditor,
    config: OrchestratorConfig,
}

impl Orchestrator {
    /// `evaluator` backs the auditor; `None` makes every audit fail open.
    /// Fails when the definition is invalid or names a role with no worker.
    pub fn new(
        definition: PipelineDefinition,
        workers: WorkerRegistry,
        evaluator: Option<Arc<dyn Generator>>,
        config: OrchestratorConfig,
    ) -> Result<Self, DefinitionError> {
        definition.validate()?;
        workers.check(&definition)?;
        let auditor = Auditor::new(evaluator, config.mode, config.call_timeout);
        Ok(Self {
            definition,
            workers,
            auditor,
            config,
        })
    }

    /// Wire backends from configuration. Missing API keys select the
    /// simulated writer, simulated research and a fail-open auditor.
    pub fn from_config(config: &OverseerConfig) -> Result<Self> {
        let generator: Option<Arc<dyn Generator>> = match config.openai_api_key {
            Some(ref key) => Some(Arc::new(
                OpenAiClient::new(key.clone(), &config.toml.generation)
                    .context("Failed to build generation client")?,
            )),
            None => None,
        };
        let researcher: Arc<dyn Researcher> = match config.perplexity_api_key {
            Some(ref key) => Arc::new(
                PerplexityClient::new(key.clone(), &config.toml.research)
                    .context("Failed to build research client")?,
            ),
            None => Arc::new(SimulatedResearch),
        };
        let definition = match config.toml.pipeline.definition {
            Some(ref path) => PipelineDefinition::load(path)?,
            None => PipelineDefinition::default(),
        };

        let workers = WorkerRegistry::standard(&definition, generator.clone(), researcher);
        Self::new(
            definition,
            workers,
            generator,
            config.toml.orchestrator_config(),
        )
        .context("Invalid pipeline definition")
    }

    pub fn definition(&self) -> &PipelineDefinition {
        &self.definition
    }

    pub fn config(&self) -> OrchestratorConfig {
        self.config
    }

    /// Execute one run to completion. Status, progress, events and result
    /// are written to `run` as the run advances.
    #[instrument(skip_all, fields(run_id = %run.id()))]
    pub async fn run(&self, run: &RunRecord) -> RunOutcome {
        run.mark_running();

        match self.execute(run).await {
            Ok(result) => {
                tracing::info!("run completed");
                run.set_result(&result);
                run.set_progress(100);
                run.events()
                    .record(EventKind::Terminal, SYSTEM_ROLE, "Run completed");
                run.finish(RunStatus::Completed);
                RunOutcome::Completed { result }
            }
            Err(e) => {
                tracing::error!(error = %e, "run failed");
                let reason = e.to_string();
                run.events().record(EventKind::Terminal, SYSTEM_ROLE, &reason);
                run.finish(RunStatus::Failed);
                RunOutcome::Failed { reason }
            }
        }
    }

    async fn execute(&self, run: &RunRecord) -> Result<String, RunError> {
        let events = run.events();
        let mut state = PipelineState::new(run.payload(), &self.definition)?;

        let context = state.context();
        events.record(
            EventKind::System,
            SYSTEM_ROLE,
            &format!(
                "Starting pipeline for {} at {} ({} phases, {} gating)",
                context.display_name,
                context.organization,
                self.definition.len(),
                self.config.mode
            ),
        );

        let total = self.definition.len();
        let mut cursor = 0;
        while cursor < total {
            let phase = &self.definition.phases[cursor];
            if run.is_cancelled() {
                return Err(RunError::Cancelled);
            }

            match state.artifact(&phase.key).map(Artifact::as_text) {
                None => {
                    let directive = state.directive_for(phase);
                    events.record(
                        EventKind::Dispatch,
                        &phase.role,
                        &dispatch_message(&directive),
                    );

                    let artifact = self.dispatch(run, phase, &state, &directive).await?;
                    events.record(
                        EventKind::System,
                        &phase.role,
                        &format!("{} draft: {}", phase.role, artifact),
                    );
                    state.record_artifact(&phase.key, artifact);
                }
                Some(content) => {
                    let verdict = self.audit(run, phase, &state, &content).await?;
                    if self.gate(phase, &mut state, verdict, run) {
                        cursor += 1;
                    }
                }
            }

            run.set_progress(progress(cursor, total));
        }

        Ok(self
            .definition
            .result_key()
            .and_then(|key| state.artifact(key))
            .map(Artifact::as_text)
            .unwrap_or_default())
    }

    /// Apply a verdict to `phase`. Returns true when the phase advances.
    fn gate(
        &self,
        phase: &Phase,
        state: &mut PipelineState,
        verdict: Verdict,
        run: &RunRecord,
    ) -> bool {
        let events = run.events();
        match verdict {
            Verdict::Pass { reason } => {
                tracing::info!(role = %phase.role, "phase approved");
                events.record(
                    EventKind::Approved,
                    &phase.role,
                    &format!("Approved: {reason}"),
                );
                true
            }
            Verdict::Fail {
                reason,
                replacement_instruction,
            } => {
                let max = self.config.max_retries;
                if state.retries(&phase.key) >= max {
                    tracing::warn!(role = %phase.role, retries = max, "retry budget exhausted, escalating");
                    events.record(
                        EventKind::Escalated,
                        &phase.role,
                        &format!("Max retries ({max}) reached, accepting as-is: {reason}"),
                    );
                    return true;
                }

                let retry = state.reject(
                    &phase.key,
                    &reason,
                    replacement_instruction.as_deref(),
                    self.config.mode,
                );
                let mut message = format!("Rejected (retry {retry}/{max}): {reason}");
                if self.config.mode == GatingMode::Adaptive
                    && let Some(ref instruction) = replacement_instruction
                {
                    message.push_str(&format!(" | New instruction: {instruction}"));
                }
                tracing::info!(role = %phase.role, retry, "phase rejected");
                events.record(EventKind::Rejected, &phase.role, &message);
                false
            }
        }
    }

    async fn dispatch(
        &self,
        run: &RunRecord,
        phase: &Phase,
        state: &PipelineState,
        directive: &Directive,
    ) -> Result<Artifact, RunError> {
        let worker = self
            .workers
            .get(&phase.role)
            .ok_or_else(|| RunError::Dispatch {
                role: phase.role.clone(),
                source: GenerationError::Unconfigured,
            })?;

        let call = tokio::time::timeout(self.config.call_timeout, worker.produce(state, directive));
        tokio::select! {
            _ = run.cancel_token().cancelled() => Err(RunError::Cancelled),
            result = call => match result {
                Ok(Ok(artifact)) => Ok(artifact),
                Ok(Err(source)) => Err(RunError::Dispatch {
                    role: phase.role.clone(),
                    source,
                }),
                Err(_) => Err(RunError::DispatchTimeout {
                    role: phase.role.clone(),
                    seconds: self.config.call_timeout.as_secs(),
                }),
            },
        }
    }

    async fn audit(
        &self,
        run: &RunRecord,
        phase: &Phase,
        state: &PipelineState,
        content: &str,
    ) -> Result<Verdict, RunError> {
        let evaluation = self.auditor.evaluate(
            &phase.role,
            content,
            &phase.criteria,
            state.instruction(&phase.key),
        );
        tokio::select! {
            _ = run.cancel_token().cancelled() => Err(RunError::Cancelled),
            verdict = evaluation => Ok(verdict),
        }
    }
}

fn dispatch_message(directive: &Directive) -> String {
    let mut message = format!("Attempt {}: {}", directive.attempt, directive.instruction);
    if let Some(ref feedback) = directive.feedback {
        message.push_str(&format!(" | Feedback: {feedback}"));
    }
    message
}

fn progress(cursor: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    (cursor * 100 / total).min(100) as u8
}
