//! Resilient call: retry the primary target with exponential backoff, then
//! fall back once.
//!
//! ```text
//! Attempting(1) ─fail─► wait base ─► Attempting(2) ─fail─► wait 2·base ─► … Attempting(max)
//!      │                                                                        │ fail
//!   success                                                          AllAttemptsExhausted
//!      ▼                                                                        ▼
//!  Succeeded                                      FallbackAttempting ─success─► FallbackSucceeded
//!                                                         │ fail
//!                                                         ▼
//!                                                   TotalFailure
//! ```
//!
//! The fallback itself is not retried.

use serde::{Deserialize, Serialize};

use super::{Cancelled, WorkflowEngine, WorkflowResult};
use crate::error::{InvocationError, WorkflowError};
use crate::invoker::AgentRequest;
use crate::observer::{Pattern, ResilientState, WorkflowEvent};
use crate::retry::{RetryDecision, RetryPolicy, RetryState};

/// Which target produced a resilient call's answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum ResponseSource {
    Primary { attempts: u32 },
    Fallback { primary_attempts: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResilientResponse {
    pub content: String,
    pub target_id: String,
    #[serde(flatten)]
    pub source: ResponseSource,
}

impl ResilientResponse {
    pub fn is_fallback(&self) -> bool {
        matches!(self.source, ResponseSource::Fallback { .. })
    }
}

impl WorkflowEngine {
    /// Call `primary` up to `max_attempts` times, waiting
    /// `backoff_base * 2^(n-1)` after failed attempt `n`, then try
    /// `fallback` once.
    ///
    /// Without a fallback, exhaustion returns `AllAttemptsExhausted`.
    pub async fn resilient_call(
        &self,
        primary: &str,
        fallback: Option<&str>,
        message: &str,
        max_attempts: u32,
    ) -> WorkflowResult<ResilientResponse> {
        self.emit(WorkflowEvent::Started {
            pattern: Pattern::Resilient,
        });
        let result = self.run_resilient(primary, fallback, message, max_attempts).await;
        self.finish(Pattern::Resilient, result)
    }

    async fn run_resilient(
        &self,
        primary: &str,
        fallback: Option<&str>,
        message: &str,
        max_attempts: u32,
    ) -> WorkflowResult<ResilientResponse> {
        let policy = RetryPolicy::new(max_attempts, self.config().backoff_base());
        let mut state = RetryState::new();
        let request = AgentRequest::new(primary, message);

        let last_error: InvocationError = loop {
            if self.is_cancelled() {
                return WorkflowResult::failure(WorkflowError::Cancelled);
            }
            let attempt = state.begin_attempt();
            self.transition(ResilientState::Attempting(attempt));

            let error = match self.dispatch(&request).await {
                Ok(Ok(response)) => {
                    self.transition(ResilientState::Succeeded);
                    return WorkflowResult::Success(ResilientResponse {
                        content: response.text(),
                        target_id: primary.to_string(),
                        source: ResponseSource::Primary { attempts: attempt },
                    });
                }
                Ok(Err(error)) => error,
                Err(Cancelled) => return WorkflowResult::failure(WorkflowError::Cancelled),
            };

            self.emit(WorkflowEvent::AttemptFailed {
                attempt,
                max_attempts: policy.max_attempts(),
                error: error.clone(),
            });
            let decision = policy.decide(attempt, &error);
            state.record_failure(error.clone());

            match decision {
                RetryDecision::Retry { delay, .. } => {
                    self.emit(WorkflowEvent::BackoffScheduled { attempt, delay });
                    if self.pause(delay).await.is_err() {
                        return WorkflowResult::failure(WorkflowError::Cancelled);
                    }
                }
                RetryDecision::Fallback => break error,
            }
        };

        self.transition(ResilientState::AllAttemptsExhausted);
        let Some(fallback) = fallback else {
            return WorkflowResult::failure(WorkflowError::AllAttemptsExhausted {
                attempts: state.attempt,
                last_error,
            });
        };

        if self.is_cancelled() {
            return WorkflowResult::failure(WorkflowError::Cancelled);
        }
        self.transition(ResilientState::FallbackAttempting);
        match self.dispatch(&AgentRequest::new(fallback, message)).await {
            Ok(Ok(response)) => {
                self.transition(ResilientState::FallbackSucceeded);
                WorkflowResult::Success(ResilientResponse {
                    content: response.text(),
                    target_id: fallback.to_string(),
                    source: ResponseSource::Fallback {
                        primary_attempts: state.attempt,
                    },
                })
            }
            Ok(Err(fallback_error)) => {
                self.transition(ResilientState::TotalFailure);
                WorkflowResult::failure(WorkflowError::TotalFailure {
                    primary_error: last_error,
                    fallback_error,
                })
            }
            Err(Cancelled) => WorkflowResult::failure(WorkflowError::Cancelled),
        }
    }

    fn transition(&self, state: ResilientState) {
        self.emit(WorkflowEvent::Transition { state });
    }
}
