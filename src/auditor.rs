//! Quality auditor that gates every phase artifact.
//!
//! The auditor asks a generation backend, acting as a strict QA editor,
//! whether an artifact meets its phase's acceptance criteria. Two gating
//! modes are available:
//!
//! - **Static**: the verdict carries a critique that is fed back to the worker
//! - **Adaptive**: a failing verdict also carries a rewritten instruction
//!
//! ## Fail-open
//!
//! Any evaluation fault (no backend, timeout, backend error, malformed
//! response) yields a pass with the reason [`AUTO_PASS_REASON`]. A broken
//! auditor can delay a run but never block it.
//!
//! ```
//! use overseer::auditor::{Auditor, Verdict};
//! use overseer::config::GatingMode;
//! use std::time::Duration;
//!
//! # async fn example() {
//! let auditor = Auditor::new(None, GatingMode::Static, Duration::from_secs(5));
//! let verdict = auditor
//!     .evaluate("WRITER", "Hi Sam", "Under 300 chars.", "Write a note.")
//!     .await;
//! assert!(verdict.is_pass());
//! # }
//! ```

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::config::GatingMode;
use crate::errors::GenerationError;
use crate::generation::{Generator, ResponseShape};

/// Reason recorded when evaluation is unavailable and the artifact passes.
pub const AUTO_PASS_REASON: &str = "auto-passed: evaluation unavailable";

/// Maximum number of artifact characters sent for evaluation.
pub const MAX_AUDIT_CHARS: usize = 3000;

/// Outcome of one evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Verdict {
    Pass {
        reason: String,
    },
    Fail {
        reason: String,
        /// Rewritten instruction for the next attempt (adaptive mode only).
        #[serde(skip_serializing_if = "Option::is_none")]
        replacement_instruction: Option<String>,
    },
}

impl Verdict {
    pub fn pass(reason: &str) -> Self {
        Self::Pass {
            reason: reason.to_string(),
        }
    }

    pub fn fail(reason: &str, replacement_instruction: Option<String>) -> Self {
        Self::Fail {
            reason: reason.to_string(),
            replacement_instruction,
        }
    }

    /// The fail-open verdict.
    pub fn auto_pass() -> Self {
        Self::pass(AUTO_PASS_REASON)
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, Self::Pass { .. })
    }

    pub fn reason(&self) -> &str {
        match self {
            Self::Pass { reason } | Self::Fail { reason, .. } => reason,
        }
    }

    pub fn replacement_instruction(&self) -> Option<&str> {
        match self {
            Self::Fail {
                replacement_instruction,
                ..
            } => replacement_instruction.as_deref(),
            Self::Pass { .. } => None,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pass { reason } => write!(f, "PASS: {reason}"),
            Self::Fail { reason, .. } => write!(f, "FAIL: {reason}"),
        }
    }
}

/// Truncate `content` to at most [`MAX_AUDIT_CHARS`] characters.
pub fn truncate_for_audit(content: &str) -> &str {
    match content.char_indices().nth(MAX_AUDIT_CHARS) {
        Some((idx, _)) => &content[..idx],
        None => content,
    }
}

/// Build the QA editor prompt for one evaluation.
pub fn build_audit_prompt(
    role: &str,
    content: &str,
    criteria: &str,
    prior_instruction: &str,
    mode: GatingMode,
) -> String {
    let (revision_rule, revision_field) = match mode {
        GatingMode::Static => ("", ""),
        GatingMode::Adaptive => (
            "\nIf the status is FAIL, rewrite the worker's instruction so the next attempt cannot repeat the mistake. The rewritten instruction replaces the original entirely.\n",
            ",\n  \"revised_instruction\": \"If FAIL: the complete replacement instruction\"",
        ),
    };

    format!(
        r#"# Quality Audit

You are a strict QA Editor reviewing the output of the {role} agent.

## Instruction Given To The Agent
{prior_instruction}

## Acceptance Criteria
{criteria}

## Content
{content}

## Rules
- Specific names (company, person) must be present where the criteria require them.
- Bracket placeholders such as [Name] or [Company] fail immediately.
- Robotic or generic tone fails.
{revision_rule}
## Output

Respond with ONLY a JSON object in this exact format:

{{
  "status": "PASS|FAIL",
  "critique": "Short reason for the decision"{revision_field}
}}
"#,
        content = truncate_for_audit(content),
    )
}

/// Parse an evaluation response. Status matching is case-insensitive; any
/// other status, or a missing or blank critique, is a format fault.
pub fn parse_audit_response(
    value: &serde_json::Value,
    mode: GatingMode,
) -> Result<Verdict, GenerationError> {
    let status = value
        .get("status")
        .and_then(|v| v.as_str())
        .ok_or_else(|| GenerationError::Format("audit response has no status".into()))?;
    let critique = value
        .get("critique")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| GenerationError::Format("audit response has no critique".into()))?;

    match status.trim().to_uppercase().as_str() {
        "PASS" => Ok(Verdict::pass(critique)),
        "FAIL" => {
            let replacement = match mode {
                GatingMode::Static => None,
                GatingMode::Adaptive => value
                    .get("revised_instruction")
                    .and_then(|v| v.as_str())
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from),
            };
            Ok(Verdict::fail(critique, replacement))
        }
        other => Err(GenerationError::Format(format!(
            "unknown audit status '{other}'"
        ))),
    }
}

/// Evaluates artifacts against phase criteria.
pub struct Auditor {
    generator: Option<Arc<dyn Generator>>,
    mode: GatingMode,
    timeout: Duration,
}

impl Auditor {
    /// `generator` of `None` means no backend is configured; every
    /// evaluation then fail-opens.
    pub fn new(generator: Option<Arc<dyn Generator>>, mode: GatingMode, timeout: Duration) -> Self {
        Self {
            generator,
            mode,
            timeout,
        }
    }

    pub fn mode(&self) -> GatingMode {
        self.mode
    }

    /// Evaluate `content` produced by `role` against `criteria`.
    pub async fn evaluate(
        &self,
        role: &str,
        content: &str,
        criteria: &str,
        prior_instruction: &str,
    ) -> Verdict {
        match self.try_evaluate(role, content, criteria, prior_instruction).await {
            Ok(verdict) => verdict,
            Err(e) => {
                tracing::warn!(role, error = %e, "audit unavailable, failing open");
                Verdict::auto_pass()
            }
        }
    }

    async fn try_evaluate(
        &self,
        role: &str,
        content: &str,
        criteria: &str,
        prior_instruction: &str,
    ) -> Result<Verdict, GenerationError> {
        let generator = self.generator.as_ref().ok_or(GenerationError::Unconfigured)?;
        let prompt = build_audit_prompt(role, content, criteria, prior_instruction, self.mode);

        let completion = tokio::time::timeout(
            self.timeout,
            generator.complete(&prompt, ResponseShape::Json),
        )
        .await
        .map_err(|_| GenerationError::Timeout {
            seconds: self.timeout.as_secs(),
        })??;

        let value = completion.into_structured()?;
        parse_audit_response(&value, self.mode)
    }
}
