//! Typed error hierarchy for the overseer pipeline.
//!
//! Three top-level enums cover the three subsystems:
//! - `GenerationError`: faults raised by the generation and research ports
//! - `RunError`: terminal faults that end a run as `failed`
//! - `DefinitionError`: invalid pipeline definitions, caught before any run starts

use thiserror::Error;

/// Errors from an external generation or research backend.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Malformed structured response: {0}")]
    Format(String),

    #[error("Backend call failed: {0}")]
    Backend(String),

    #[error("Backend call timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("No generation backend configured")]
    Unconfigured,
}

impl GenerationError {
    /// True for faults caused by the response body rather than the call itself.
    pub fn is_format(&self) -> bool {
        matches!(self, Self::Format(_))
    }

    /// Classify an HTTP client error. `timeout_secs` is the client's
    /// configured request timeout, reported when the call timed out.
    pub fn from_http(err: reqwest::Error, timeout_secs: u64) -> Self {
        if err.is_timeout() {
            Self::Timeout {
                seconds: timeout_secs,
            }
        } else if err.is_decode() {
            Self::Format(err.to_string())
        } else {
            Self::Backend(err.to_string())
        }
    }
}

/// Faults that terminate a run. The `Display` text is what lands in the
/// run's terminal event.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("No records found in input payload")]
    EmptyPayload,

    #[error("Critical error in {role}: {source}")]
    Dispatch {
        role: String,
        #[source]
        source: GenerationError,
    },

    #[error("Critical error in {role}: worker timed out after {seconds}s")]
    DispatchTimeout { role: String, seconds: u64 },

    #[error("Run cancelled")]
    Cancelled,
}

/// Errors from validating a pipeline definition against itself and the
/// worker registry.
#[derive(Debug, Error, PartialEq)]
pub enum DefinitionError {
    #[error("Pipeline definition has no phases")]
    Empty,

    #[error("Role {0} appears in more than one phase")]
    DuplicateRole(String),

    #[error("State key {0} is written by more than one phase")]
    DuplicateKey(String),

    #[error("Phase {0} has empty acceptance criteria")]
    MissingCriteria(String),

    #[error("No worker registered for role {0}")]
    UnknownWorker(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_error_empty_payload_message() {
        let err = RunError::EmptyPayload;
        assert_eq!(err.to_string(), "No records found in input payload");
    }

    #[test]
    fn run_error_dispatch_carries_role_and_source() {
        let err = RunError::Dispatch {
            role: "WRITER".to_string(),
            source: GenerationError::Backend("401 Unauthorized".to_string()),
        };
        match &err {
            RunError::Dispatch { role, source } => {
                assert_eq!(role, "WRITER");
                assert!(matches!(source, GenerationError::Backend(_)));
            }
            _ => panic!("Expected Dispatch"),
        }
        let msg = err.to_string();
        assert!(msg.contains("WRITER"));
        assert!(msg.contains("401 Unauthorized"));
    }

    #[test]
    fn run_error_dispatch_exposes_source_chain() {
        use std::error::Error as _;
        let err = RunError::Dispatch {
            role: "RESEARCHER".to_string(),
            source: GenerationError::Timeout { seconds: 30 },
        };
        let source = err.source().expect("dispatch errors carry a source");
        assert!(source.to_string().contains("30s"));
    }

    #[test]
    fn generation_error_format_is_detected() {
        assert!(GenerationError::Format("bad json".into()).is_format());
        assert!(!GenerationError::Backend("503".into()).is_format());
        assert!(!GenerationError::Unconfigured.is_format());
    }

    #[test]
    fn definition_error_variants_are_distinct() {
        let dup = DefinitionError::DuplicateRole("WRITER".into());
        let unknown = DefinitionError::UnknownWorker("WRITER".into());
        assert_ne!(dup, unknown);
        assert!(unknown.to_string().contains("WRITER"));
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&GenerationError::Unconfigured);
        assert_std_error(&RunError::Cancelled);
        assert_std_error(&DefinitionError::Empty);
    }
}
