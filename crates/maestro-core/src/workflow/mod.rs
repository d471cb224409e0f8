//! Workflow engine — composable multi-agent patterns.
//!
//! Every pattern is a method on [`WorkflowEngine`] and is built only from
//! [`AgentInvoker`] calls, the [`RetryPolicy`](crate::retry::RetryPolicy)
//! and [`SessionGuard`](crate::session::SessionGuard).
//!
//! # Architecture
//!
//! ```text
//! workflow.yaml ──► WorkflowDefinition ──► WorkflowRunner
//!                                              │
//!                                        WorkflowEngine
//!        ┌──────────┬──────────┬───────────────┼──────────────┬──────────────┐
//!    pipeline    fan_out     chain       conversation     resilient      routing
//!                                              │
//!                                        AgentInvoker
//! ```
//!
//! Cancellation is carried by a `CancellationToken`: once it fires, no new
//! step is dispatched, in-flight calls are dropped, backoff waits end early,
//! and an open conversation session is still released.

pub mod conversation;
pub mod definition;
pub mod fan_out;
pub mod pipeline;
pub mod resilient;
pub mod result;
pub mod routing;
pub mod runner;

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::error::{InvocationError, WorkflowError};
use crate::invoker::{AgentInvoker, AgentRequest, AgentResponse};
use crate::observer::{Pattern, TracingObserver, WorkflowEvent, WorkflowObserver};

pub use definition::{PatternSpec, StageSpec, TaskSpec, WorkflowDefinition};
pub use pipeline::Stage;
pub use resilient::{ResilientResponse, ResponseSource};
pub use result::WorkflowResult;
pub use routing::{Route, RoutedResponse, RoutingTable};
pub use runner::{RunReport, WorkflowRunner};

/// Marker for a step that was not allowed to finish because the run was
/// cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Cancelled;

/// Runs workflow patterns against an invoker.
///
/// Cloning is cheap; clones share the invoker, observer, concurrency limit
/// and cancellation token.
#[derive(Clone)]
pub struct WorkflowEngine {
    invoker: Arc<dyn AgentInvoker>,
    observer: Arc<dyn WorkflowObserver>,
    config: Arc<EngineConfig>,
    limiter: Arc<Semaphore>,
    cancel: CancellationToken,
}

impl WorkflowEngine {
    pub fn new(invoker: Arc<dyn AgentInvoker>) -> Self {
        let config = EngineConfig::default();
        Self {
            invoker,
            observer: Arc::new(TracingObserver),
            limiter: Arc::new(Semaphore::new(config.max_concurrency)),
            config: Arc::new(config),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn WorkflowObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.limiter = Arc::new(Semaphore::new(config.max_concurrency.max(1)));
        self.config = Arc::new(config);
        self
    }

    /// A handle on the same engine whose runs observe `token`.
    pub fn with_cancellation(&self, token: CancellationToken) -> Self {
        Self {
            cancel: token,
            ..self.clone()
        }
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn invoker(&self) -> &Arc<dyn AgentInvoker> {
        &self.invoker
    }

    /// A single call with no composition, for callers that only need one
    /// answer.
    pub async fn call(&self, request: AgentRequest) -> WorkflowResult<AgentResponse> {
        match self.dispatch(&request).await {
            Ok(Ok(response)) => WorkflowResult::Success(response),
            Ok(Err(error)) => WorkflowResult::failure(WorkflowError::Invocation(error)),
            Err(Cancelled) => WorkflowResult::failure(WorkflowError::Cancelled),
        }
    }

    pub(crate) fn emit(&self, event: WorkflowEvent) {
        self.observer.on_event(&event);
    }

    pub(crate) fn observer(&self) -> Arc<dyn WorkflowObserver> {
        self.observer.clone()
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Issue one invoker call unless the run is cancelled. A cancellation
    /// arriving mid-call drops the in-flight future.
    pub(crate) async fn dispatch(
        &self,
        request: &AgentRequest,
    ) -> Result<Result<AgentResponse, InvocationError>, Cancelled> {
        if self.cancel.is_cancelled() {
            return Err(Cancelled);
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Cancelled),
            outcome = self.invoker.invoke(request) => Ok(outcome),
        }
    }

    /// Wait out a backoff delay. Returns `Err` if cancelled first.
    pub(crate) async fn pause(&self, delay: std::time::Duration) -> Result<(), Cancelled> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Cancelled),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }

    /// Report the terminal outcome of a pattern and hand it back.
    pub(crate) fn finish<T>(&self, pattern: Pattern, result: WorkflowResult<T>) -> WorkflowResult<T> {
        if matches!(result.error(), Some(WorkflowError::Cancelled)) {
            self.emit(WorkflowEvent::Cancelled { pattern });
        }
        self.emit(WorkflowEvent::Finished {
            pattern,
            success: result.is_success(),
        });
        result
    }
}
