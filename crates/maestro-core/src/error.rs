//! Error types for the Maestro core.
//!
//! Invoker-level failures (`InvocationError`, `SessionError`) are produced by
//! an [`AgentInvoker`](crate::invoker::AgentInvoker). Pattern-level failures
//! (`WorkflowError`) wrap them with positional context. Partial failure of a
//! fan-out is data, not an error: see [`WorkflowResult`](crate::workflow::WorkflowResult).

/// A single call to the invoker failed (transport, provider or validation).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Invocation of '{target_id}' failed: {cause}")]
pub struct InvocationError {
    pub target_id: String,
    pub cause: String,
}

impl InvocationError {
    pub fn new(target_id: impl Into<String>, cause: impl Into<String>) -> Self {
        Self {
            target_id: target_id.into(),
            cause: cause.into(),
        }
    }
}

/// Session creation or release failed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SessionError {
    #[error("Failed to open session: {0}")]
    Open(String),

    #[error("Failed to close session '{session_id}': {cause}")]
    Close { session_id: String, cause: String },
}

/// Failure surfaced by a workflow pattern.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WorkflowError {
    /// A dependent step failed; later steps were never dispatched.
    #[error("Pipeline aborted at stage {stage_index}: {cause}")]
    PipelineAborted {
        stage_index: usize,
        cause: InvocationError,
    },

    /// Every primary attempt failed and no fallback target was configured.
    #[error("All {attempts} attempt(s) exhausted. Last error: {last_error}")]
    AllAttemptsExhausted {
        attempts: u32,
        last_error: InvocationError,
    },

    /// Primary attempts and the fallback all failed.
    #[error("Primary and fallback both failed (primary: {primary_error}; fallback: {fallback_error})")]
    TotalFailure {
        primary_error: InvocationError,
        fallback_error: InvocationError,
    },

    /// A single independent call failed (fan-out branch, direct call).
    #[error(transparent)]
    Invocation(#[from] InvocationError),

    #[error(transparent)]
    Session(#[from] SessionError),

    /// The run was cancelled before it reached a terminal state.
    #[error("Workflow cancelled")]
    Cancelled,

    /// A workflow definition could not be turned into a runnable pattern.
    #[error("Invalid workflow definition: {0}")]
    Definition(String),
}

/// Configuration or definition-loading failure.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse '{path}': {message}")]
    Parse { path: String, message: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_aborted_message_names_stage_and_target() {
        let err = WorkflowError::PipelineAborted {
            stage_index: 2,
            cause: InvocationError::new("102", "HTTP 503"),
        };
        assert_eq!(
            err.to_string(),
            "Pipeline aborted at stage 2: Invocation of '102' failed: HTTP 503"
        );
    }

    #[test]
    fn session_error_converts_into_workflow_error() {
        let err: WorkflowError = SessionError::Open("refused".into()).into();
        assert!(matches!(err, WorkflowError::Session(SessionError::Open(_))));
    }
}
