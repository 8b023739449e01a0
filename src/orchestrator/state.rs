//! Mutable per-run pipeline state, owned by the orchestrator.
//!
//! Workers only ever see `&PipelineState`; every mutation goes through the
//! crate-private transition methods below.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::config::GatingMode;
use crate::errors::RunError;
use crate::payload::{
    DEFAULT_DISPLAY_NAME, DEFAULT_ORGANIZATION, DISPLAY_NAME_KEY, ORGANIZATION_KEY, Payload,
    Record, field,
};
use crate::phase::{Phase, PipelineDefinition};

/// A worker's candidate output for one phase.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Artifact {
    Text(String),
    Structured(serde_json::Value),
}

impl Artifact {
    /// Text rendering used for audits and as the run result.
    pub fn as_text(&self) -> String {
        match self {
            Artifact::Text(s) => s.clone(),
            Artifact::Structured(v) => v.to_string(),
        }
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Artifact::Text(s) => write!(f, "{s}"),
            Artifact::Structured(v) => write!(f, "{v}"),
        }
    }
}

/// Instruction and optional feedback handed to a worker for one dispatch.
///
/// `attempt` is 1-based and grows with every rejection of the phase, so two
/// dispatches of the same phase never carry identical directives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    pub instruction: String,
    pub feedback: Option<String>,
    pub attempt: u32,
}

/// Run-scoped values derived once from the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunContext {
    pub display_name: String,
    pub organization: String,
}

impl RunContext {
    fn from_record(record: &Record) -> Self {
        Self {
            display_name: field(record, DISPLAY_NAME_KEY)
                .unwrap_or_else(|| DEFAULT_DISPLAY_NAME.to_string()),
            organization: field(record, ORGANIZATION_KEY)
                .unwrap_or_else(|| DEFAULT_ORGANIZATION.to_string()),
        }
    }
}

/// Per-phase slot: artifact, retry counter and current instruction.
#[derive(Debug, Clone)]
struct PhaseSlot {
    artifact: Option<Artifact>,
    retries: u32,
    instruction: String,
}

/// Feedback from a rejection, bound to the phase that was rejected.
#[derive(Debug, Clone)]
struct PendingFeedback {
    phase_key: String,
    text: String,
}

#[derive(Debug, Clone)]
pub struct PipelineState {
    records: Vec<Record>,
    context: RunContext,
    slots: BTreeMap<String, PhaseSlot>,
    pending_feedback: Option<PendingFeedback>,
}

impl PipelineState {
    /// Build the initial state. An empty payload is a precondition fault.
    pub fn new(payload: &Payload, definition: &PipelineDefinition) -> Result<Self, RunError> {
        let primary = payload.primary().ok_or(RunError::EmptyPayload)?;
        let slots = definition
            .phases
            .iter()
            .map(|p| {
                (
                    p.key.clone(),
                    PhaseSlot {
                        artifact: None,
                        retries: 0,
                        instruction: p.instruction.clone(),
                    },
                )
            })
            .collect();

        Ok(Self {
            context: RunContext::from_record(primary),
            records: payload.records.clone(),
            slots,
            pending_feedback: None,
        })
    }

    pub fn context(&self) -> &RunContext {
        &self.context
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn artifact(&self, key: &str) -> Option<&Artifact> {
        self.slots.get(key).and_then(|s| s.artifact.as_ref())
    }

    pub fn retries(&self, key: &str) -> u32 {
        self.slots.get(key).map(|s| s.retries).unwrap_or(0)
    }

    pub fn instruction(&self, key: &str) -> &str {
        self.slots
            .get(key)
            .map(|s| s.instruction.as_str())
            .unwrap_or("")
    }

    /// Directive for the next dispatch of `phase`. Pending feedback is only
    /// included when it belongs to this phase.
    pub fn directive_for(&self, phase: &Phase) -> Directive {
        Directive {
            instruction: self.instruction(&phase.key).to_string(),
            attempt: self.retries(&phase.key) + 1,
            feedback: self
                .pending_feedback
                .as_ref()
                .filter(|f| f.phase_key == phase.key)
                .map(|f| f.text.clone()),
        }
    }

    /// Store a freshly dispatched artifact and consume pending feedback.
    pub(crate) fn record_artifact(&mut self, key: &str, artifact: Artifact) {
        if let Some(slot) = self.slots.get_mut(key) {
            slot.artifact = Some(artifact);
        }
        self.pending_feedback = None;
    }

    /// Reject-and-retry transition: bump the retry counter, clear the
    /// artifact, and change the next directive. Static mode stores the
    /// critique as feedback; adaptive mode also swaps in the replacement
    /// instruction when one was proposed. Returns the new retry count.
    pub(crate) fn reject(
        &mut self,
        key: &str,
        critique: &str,
        replacement: Option<&str>,
        mode: GatingMode,
    ) -> u32 {
        let Some(slot) = self.slots.get_mut(key) else {
            return 0;
        };
        slot.retries += 1;
        slot.artifact = None;
        if mode == GatingMode::Adaptive
            && let Some(instruction) = replacement.filter(|s| !s.trim().is_empty())
        {
            slot.instruction = instruction.to_string();
        }
        self.pending_feedback = Some(PendingFeedback {
            phase_key: key.to_string(),
            text: critique.to_string(),
        });
        slot.retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::FieldValue;

    fn payload(pairs: &[(&str, &str)]) -> Payload {
        let record: Record = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), FieldValue::Text(v.to_string())))
            .collect();
        Payload::new(vec![record])
    }

    fn state() -> (PipelineState, PipelineDefinition) {
        let def = PipelineDefinition::default();
        let state = PipelineState::new(
            &payload(&[("companyName", "Acme"), ("firstName", "Sam")]),
            &def,
        )
        .unwrap();
        (state, def)
    }

    #[test]
    fn test_empty_payload_is_precondition_fault() {
        let err = PipelineState::new(&Payload::default(), &PipelineDefinition::default())
            .unwrap_err();
        assert!(matches!(err, RunError::EmptyPayload));
    }

    #[test]
    fn test_context_extracted_from_first_record() {
        let (state, _) = state();
        assert_eq!(state.context().display_name, "Sam");
        assert_eq!(state.context().organization, "Acme");
        assert_eq!(state.records().len(), 1);
    }

    #[test]
    fn test_context_defaults_when_fields_missing() {
        let state =
            PipelineState::new(&payload(&[("title", "VP")]), &PipelineDefinition::default())
                .unwrap();
        assert_eq!(state.context().display_name, "there");
        assert_eq!(state.context().organization, "your company");
    }

    #[test]
    fn test_initial_slots_are_empty_with_static_instruction() {
        let (state, def) = state();
        for phase in &def.phases {
            assert!(state.artifact(&phase.key).is_none());
            assert_eq!(state.retries(&phase.key), 0);
            assert_eq!(state.instruction(&phase.key), phase.instruction);
        }
    }

    #[test]
    fn test_static_reject_sets_feedback_and_keeps_instruction() {
        let (mut state, def) = state();
        let writer = &def.phases[1];
        state.record_artifact(&writer.key, Artifact::Text("[Name]".into()));

        let count = state.reject(&writer.key, "placeholder", Some("ignored"), GatingMode::Static);

        assert_eq!(count, 1);
        assert!(state.artifact(&writer.key).is_none());
        let directive = state.directive_for(writer);
        assert_eq!(directive.instruction, writer.instruction);
        assert_eq!(directive.feedback.as_deref(), Some("placeholder"));
    }

    #[test]
    fn test_adaptive_reject_replaces_instruction() {
        let (mut state, def) = state();
        let writer = &def.phases[1];
        state.record_artifact(&writer.key, Artifact::Text("[Name]".into()));

        state.reject(&writer.key, "placeholder", Some("Address Sam by name."), GatingMode::Adaptive);

        let directive = state.directive_for(writer);
        assert_eq!(directive.instruction, "Address Sam by name.");
        assert_eq!(directive.feedback.as_deref(), Some("placeholder"));
    }

    #[test]
    fn test_adaptive_reject_without_replacement_keeps_instruction() {
        let (mut state, def) = state();
        let writer = &def.phases[1];
        let before = state.directive_for(writer);

        state.reject(&writer.key, "too long", Some("   "), GatingMode::Adaptive);

        let after = state.directive_for(writer);
        assert_eq!(after.instruction, before.instruction);
        assert_ne!(after, before, "a retry must never reuse identical inputs");
    }

    #[test]
    fn test_repeated_critique_still_changes_directive() {
        let (mut state, def) = state();
        let writer = &def.phases[1];
        let mut directives = vec![state.directive_for(writer)];
        for _ in 0..3 {
            state.record_artifact(&writer.key, Artifact::Text("[Name]".into()));
            state.reject(&writer.key, "Contains a bracket", None, GatingMode::Static);
            directives.push(state.directive_for(writer));
        }

        let attempts: Vec<u32> = directives.iter().map(|d| d.attempt).collect();
        assert_eq!(attempts, vec![1, 2, 3, 4]);
        for pair in directives.windows(2) {
            assert_ne!(pair[0], pair[1]);
        }
    }

    #[test]
    fn test_feedback_is_isolated_to_rejected_phase() {
        let (mut state, def) = state();
        let (research, writer) = (&def.phases[0], &def.phases[1]);

        state.reject(&research.key, "too vague", None, GatingMode::Static);

        assert!(state.directive_for(writer).feedback.is_none());
        assert_eq!(
            state.directive_for(research).feedback.as_deref(),
            Some("too vague")
        );
    }

    #[test]
    fn test_recording_artifact_consumes_feedback() {
        let (mut state, def) = state();
        let research = &def.phases[0];
        state.reject(&research.key, "too vague", None, GatingMode::Static);

        state.record_artifact(&research.key, Artifact::Text("better".into()));

        assert!(state.directive_for(research).feedback.is_none());
        assert_eq!(
            state.artifact(&research.key).map(Artifact::as_text).as_deref(),
            Some("better")
        );
    }

    #[test]
    fn test_retry_counter_only_increases() {
        let (mut state, def) = state();
        let key = &def.phases[1].key;
        let counts: Vec<u32> = (0..3)
            .map(|_| state.reject(key, "again", None, GatingMode::Static))
            .collect();
        assert_eq!(counts, vec![1, 2, 3]);
        state.record_artifact(key, Artifact::Text("x".into()));
        assert_eq!(state.retries(key), 3);
    }

    #[test]
    fn test_artifact_display() {
        assert_eq!(Artifact::Text("hi".into()).to_string(), "hi");
        let structured = Artifact::Structured(serde_json::json!({"k": "v"}));
        assert_eq!(structured.as_text(), r#"{"k":"v"}"#);
    }
}
