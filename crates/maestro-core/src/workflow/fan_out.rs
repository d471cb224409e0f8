//! Parallel fan-out / fan-in.
//!
//! Every task is dispatched concurrently and the call returns only once all
//! of them are terminal. Each branch future owns its key and yields
//! `(key, result)`; the output map is assembled after the join, so no two
//! branches ever write to shared state.

use std::collections::HashMap;
use std::fmt::Display;
use std::hash::Hash;

use futures::future::join_all;

use super::{Cancelled, WorkflowEngine, WorkflowResult};
use crate::error::WorkflowError;
use crate::invoker::{AgentRequest, AgentResponse};
use crate::observer::{Pattern, WorkflowEvent};

impl WorkflowEngine {
    /// Run every task concurrently; the result has exactly one entry per
    /// input key. A failing task never fails the aggregate.
    pub async fn fan_out<K>(&self, tasks: HashMap<K, AgentRequest>) -> HashMap<K, WorkflowResult<AgentResponse>>
    where
        K: Eq + Hash + Display,
    {
        self.emit(WorkflowEvent::Started {
            pattern: Pattern::FanOut,
        });

        let branches = tasks.into_iter().map(|(key, request)| async move {
            let result = self.run_branch(&key, &request).await;
            self.emit(WorkflowEvent::TaskFinished {
                key: key.to_string(),
                success: result.is_success(),
            });
            (key, result)
        });
        let results: HashMap<K, WorkflowResult<AgentResponse>> =
            join_all(branches).await.into_iter().collect();

        let succeeded = results.values().filter(|r| r.is_success()).count();
        self.emit(WorkflowEvent::FanOutJoined {
            succeeded,
            total: results.len(),
        });
        self.emit(WorkflowEvent::Finished {
            pattern: Pattern::FanOut,
            success: succeeded == results.len(),
        });
        results
    }

    async fn run_branch<K: Display>(&self, key: &K, request: &AgentRequest) -> WorkflowResult<AgentResponse> {
        let permit = tokio::select! {
            biased;
            _ = self.cancellation_token().cancelled() => None,
            permit = self.limiter.acquire() => permit.ok(),
        };
        let Some(_permit) = permit else {
            return WorkflowResult::failure(WorkflowError::Cancelled);
        };
        if self.is_cancelled() {
            return WorkflowResult::failure(WorkflowError::Cancelled);
        }

        self.emit(WorkflowEvent::TaskDispatched {
            key: key.to_string(),
            target_id: request.target_id.clone(),
        });
        match self.dispatch(request).await {
            Ok(Ok(response)) => WorkflowResult::Success(response),
            Ok(Err(error)) => WorkflowResult::failure(WorkflowError::Invocation(error)),
            Err(Cancelled) => WorkflowResult::failure(WorkflowError::Cancelled),
        }
    }
}
