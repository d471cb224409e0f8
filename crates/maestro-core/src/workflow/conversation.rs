//! Multi-turn conversation inside one session.
//!
//! Turns are sent strictly one at a time because each turn depends on the
//! session state left by the previous one. The session is released exactly
//! once whichever way the run ends.

use super::{Cancelled, WorkflowEngine, WorkflowResult};
use crate::error::WorkflowError;
use crate::invoker::AgentRequest;
use crate::observer::{Pattern, WorkflowEvent};
use crate::session::SessionGuard;

impl WorkflowEngine {
    /// Send `turns` to `target_id` in order within a fresh session and
    /// return one response per turn.
    ///
    /// On failure the responses already received are kept as partial
    /// results; the turn that failed is reported as the stage index.
    pub async fn conversation<S: AsRef<str>>(&self, target_id: &str, turns: &[S]) -> WorkflowResult<Vec<String>> {
        self.emit(WorkflowEvent::Started {
            pattern: Pattern::Conversation,
        });
        if self.is_cancelled() {
            return self.finish(Pattern::Conversation, WorkflowResult::failure(WorkflowError::Cancelled));
        }

        let guard = match SessionGuard::open(self.invoker().clone(), self.observer()).await {
            Ok(guard) => guard,
            Err(e) => return self.finish(Pattern::Conversation, WorkflowResult::failure(e.into())),
        };

        let mut responses = Vec::with_capacity(turns.len());
        let mut failure = None;
        for (index, turn) in turns.iter().enumerate() {
            if self.is_cancelled() {
                failure = Some(WorkflowError::Cancelled);
                break;
            }
            let request = AgentRequest::new(target_id, turn.as_ref()).in_session(guard.id());
            self.emit(WorkflowEvent::StepDispatched {
                pattern: Pattern::Conversation,
                index,
                target_id: target_id.to_string(),
            });

            match self.dispatch(&request).await {
                Ok(Ok(response)) => {
                    self.emit(WorkflowEvent::StepCompleted {
                        pattern: Pattern::Conversation,
                        index,
                        target_id: target_id.to_string(),
                    });
                    responses.push(response.text());
                }
                Ok(Err(cause)) => {
                    self.emit(WorkflowEvent::StepFailed {
                        pattern: Pattern::Conversation,
                        index,
                        error: cause.clone(),
                    });
                    failure = Some(WorkflowError::PipelineAborted {
                        stage_index: index,
                        cause,
                    });
                    break;
                }
                Err(Cancelled) => {
                    failure = Some(WorkflowError::Cancelled);
                    break;
                }
            }
        }

        guard.release().await;

        let result = match failure {
            None => WorkflowResult::Success(responses),
            Some(error) => WorkflowResult::Failure {
                error,
                partial_results: responses,
            },
        };
        self.finish(Pattern::Conversation, result)
    }
}
