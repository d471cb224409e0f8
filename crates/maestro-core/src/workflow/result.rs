use crate::error::WorkflowError;

/// Outcome of a pattern invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowResult<T> {
    Success(T),
    /// `partial_results` holds textual outputs produced before the failure,
    /// when the pattern has any worth reporting.
    Failure {
        error: WorkflowError,
        partial_results: Vec<String>,
    },
}

impl<T> WorkflowResult<T> {
    pub fn failure(error: WorkflowError) -> Self {
        WorkflowResult::Failure {
            error,
            partial_results: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, WorkflowResult::Success(_))
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            WorkflowResult::Success(value) => Some(value),
            WorkflowResult::Failure { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&WorkflowError> {
        match self {
            WorkflowResult::Success(_) => None,
            WorkflowResult::Failure { error, .. } => Some(error),
        }
    }

    pub fn partial_results(&self) -> &[String] {
        match self {
            WorkflowResult::Success(_) => &[],
            WorkflowResult::Failure {
                partial_results, ..
            } => partial_results,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> WorkflowResult<U> {
        match self {
            WorkflowResult::Success(value) => WorkflowResult::Success(f(value)),
            WorkflowResult::Failure {
                error,
                partial_results,
            } => WorkflowResult::Failure {
                error,
                partial_results,
            },
        }
    }

    /// Drop any partial results and convert into a plain `Result`.
    pub fn into_result(self) -> Result<T, WorkflowError> {
        match self {
            WorkflowResult::Success(value) => Ok(value),
            WorkflowResult::Failure { error, .. } => Err(error),
        }
    }
}

impl<T> From<Result<T, WorkflowError>> for WorkflowResult<T> {
    fn from(result: Result<T, WorkflowError>) -> Self {
        match result {
            Ok(value) => WorkflowResult::Success(value),
            Err(error) => WorkflowResult::failure(error),
        }
    }
}
