pub mod runner;
pub mod state;

pub use runner::{Orchestrator, OrchestratorConfig, RunOutcome};
pub use state::{Artifact, Directive, PipelineState, RunContext};
