//! Phase definitions and JSON loading for the pipeline.
//!
//! This module provides:
//! - `Phase` struct describing a single pipeline stage
//! - `PipelineDefinition`, the ordered phase list a run executes
//! - Loading and validation of JSON pipeline files
//! - The default research → copywriting plan as a fallback

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::errors::DefinitionError;

/// Role name of the default research phase.
pub const RESEARCHER: &str = "RESEARCHER";
/// Role name of the default copywriting phase.
pub const WRITER: &str = "WRITER";
/// State key of the default research phase; the writer reads it.
pub const RESEARCH_KEY: &str = "research";
/// State key of the default copywriting phase.
pub const COPY_KEY: &str = "copy";

/// Represents a single pipeline stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Phase {
    /// Role identifier, also the key into the worker registry (e.g. "WRITER")
    pub role: String,
    /// State key the phase's artifact is stored under (e.g. "copy")
    pub key: String,
    /// Acceptance criteria handed to the auditor
    pub criteria: String,
    /// Initial operating instruction for the worker
    #[serde(default)]
    pub instruction: String,
}

impl Phase {
    pub fn new(role: &str, key: &str, criteria: &str, instruction: &str) -> Self {
        Self {
            role: role.to_string(),
            key: key.to_string(),
            criteria: criteria.to_string(),
            instruction: instruction.to_string(),
        }
    }
}

/// Ordered list of phases for one run. Position in `phases` is the
/// execution order; definitions are never mutated once a run starts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineDefinition {
    pub phases: Vec<Phase>,
}

impl PipelineDefinition {
    pub fn new(phases: Vec<Phase>) -> Self {
        Self { phases }
    }

    /// Load a pipeline definition from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read pipeline file: {}", path.display()))?;

        let definition: PipelineDefinition = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse pipeline file: {}", path.display()))?;

        definition
            .validate()
            .with_context(|| format!("Invalid pipeline file: {}", path.display()))?;

        Ok(definition)
    }

    /// Check structural rules: at least one phase, unique roles and keys,
    /// non-empty criteria.
    pub fn validate(&self) -> Result<(), DefinitionError> {
        if self.phases.is_empty() {
            return Err(DefinitionError::Empty);
        }

        let mut roles = HashSet::new();
        let mut keys = HashSet::new();
        for phase in &self.phases {
            if !roles.insert(phase.role.as_str()) {
                return Err(DefinitionError::DuplicateRole(phase.role.clone()));
            }
            if !keys.insert(phase.key.as_str()) {
                return Err(DefinitionError::DuplicateKey(phase.key.clone()));
            }
            if phase.criteria.trim().is_empty() {
                return Err(DefinitionError::MissingCriteria(phase.role.clone()));
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.phases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }

    /// Key of the last phase; its artifact is the run's result.
    pub fn result_key(&self) -> Option<&str> {
        self.phases.last().map(|p| p.key.as_str())
    }

    /// State key written by the first researcher phase. Falls back to
    /// [`RESEARCH_KEY`] when the plan has no researcher.
    pub fn research_key(&self) -> &str {
        self.phases
            .iter()
            .find(|p| p.role == RESEARCHER)
            .map(|p| p.key.as_str())
            .unwrap_or(RESEARCH_KEY)
    }
}

impl Default for PipelineDefinition {
    /// The research → copywriting plan.
    fn default() -> Self {
        Self::new(vec![
            Phase::new(
                RESEARCHER,
                RESEARCH_KEY,
                "Must mention specific financial or technical challenges.",
                "Find recent, specific financial or technical challenges the company is facing.",
            ),
            Phase::new(
                WRITER,
                COPY_KEY,
                "Must NOT contain '[Name]' or brackets. Must mention the Company Name explicitly. Under 300 chars.",
                "Write a LinkedIn connection request (max 300 chars).",
            ),
        ])
    }
}
