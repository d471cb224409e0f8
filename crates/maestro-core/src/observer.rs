//! Observability for workflow runs.
//!
//! Patterns report every step, retry transition and session lifecycle event
//! to an injected [`WorkflowObserver`]. The engine holds no global logger of
//! its own; [`TracingObserver`] forwards events to `tracing`, and
//! [`RecordingObserver`] keeps them for inspection.

use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

use crate::error::{InvocationError, SessionError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pattern {
    Pipeline,
    FanOut,
    Chain,
    Conversation,
    Resilient,
    Routing,
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Pattern::Pipeline => "pipeline",
            Pattern::FanOut => "fan_out",
            Pattern::Chain => "chain",
            Pattern::Conversation => "conversation",
            Pattern::Resilient => "resilient",
            Pattern::Routing => "routing",
        };
        f.write_str(name)
    }
}

/// States of the resilient-call state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResilientState {
    Attempting(u32),
    Succeeded,
    AllAttemptsExhausted,
    FallbackAttempting,
    FallbackSucceeded,
    TotalFailure,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowEvent {
    Started {
        pattern: Pattern,
    },
    StepDispatched {
        pattern: Pattern,
        index: usize,
        target_id: String,
    },
    StepCompleted {
        pattern: Pattern,
        index: usize,
        target_id: String,
    },
    StepFailed {
        pattern: Pattern,
        index: usize,
        error: InvocationError,
    },
    TaskDispatched {
        key: String,
        target_id: String,
    },
    TaskFinished {
        key: String,
        success: bool,
    },
    Transition {
        state: ResilientState,
    },
    /// A primary attempt of a resilient call failed.
    AttemptFailed {
        attempt: u32,
        max_attempts: u32,
        error: InvocationError,
    },
    BackoffScheduled {
        attempt: u32,
        delay: Duration,
    },
    SessionOpened {
        session_id: String,
    },
    SessionReleased {
        session_id: String,
        was_open: bool,
    },
    SessionReleaseFailed {
        session_id: String,
        error: SessionError,
    },
    Routed {
        keyword: Option<String>,
        target_id: String,
    },
    Cancelled {
        pattern: Pattern,
    },
    FanOutJoined {
        succeeded: usize,
        total: usize,
    },
    Finished {
        pattern: Pattern,
        success: bool,
    },
}

pub trait WorkflowObserver: Send + Sync {
    fn on_event(&self, event: &WorkflowEvent);
}

/// Forwards events to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl WorkflowObserver for TracingObserver {
    fn on_event(&self, event: &WorkflowEvent) {
        match event {
            WorkflowEvent::Started { pattern } => {
                tracing::info!("[Workflow] {} started", pattern);
            }
            WorkflowEvent::StepDispatched { pattern, index, target_id } => {
                tracing::info!("[Workflow] {} step {} → agent {}", pattern, index, target_id);
            }
            WorkflowEvent::StepCompleted { pattern, index, target_id } => {
                tracing::debug!("[Workflow] {} step {} completed by {}", pattern, index, target_id);
            }
            WorkflowEvent::StepFailed { pattern, index, error } => {
                tracing::error!("[Workflow] {} step {} failed: {}", pattern, index, error);
            }
            WorkflowEvent::TaskDispatched { key, target_id } => {
                tracing::info!("[Workflow] Launching task '{}' → agent {}", key, target_id);
            }
            WorkflowEvent::TaskFinished { key, success } => {
                if *success {
                    tracing::info!("[Workflow] Task '{}' completed", key);
                } else {
                    tracing::warn!("[Workflow] Task '{}' failed", key);
                }
            }
            WorkflowEvent::Transition { state } => {
                tracing::info!("[Workflow] resilient → {:?}", state);
            }
            WorkflowEvent::AttemptFailed {
                attempt,
                max_attempts,
                error,
            } => {
                tracing::warn!(
                    "[Workflow] Attempt {}/{} with primary agent {} failed: {}",
                    attempt,
                    max_attempts,
                    error.target_id,
                    error.cause
                );
            }
            WorkflowEvent::BackoffScheduled { attempt, delay } => {
                tracing::info!(
                    "[Workflow] Waiting {}ms before retrying after attempt {}",
                    delay.as_millis(),
                    attempt
                );
            }
            WorkflowEvent::SessionOpened { session_id } => {
                tracing::info!("[Workflow] Created session {}", session_id);
            }
            WorkflowEvent::SessionReleased { session_id, was_open } => {
                tracing::info!("[Workflow] Released session {} (was open: {})", session_id, was_open);
            }
            WorkflowEvent::SessionReleaseFailed { session_id, error } => {
                tracing::error!("[Workflow] Failed to release session {}: {}", session_id, error);
            }
            WorkflowEvent::Routed { keyword, target_id } => match keyword {
                Some(k) => tracing::info!("[Workflow] Classified as '{}', routing to {}", k, target_id),
                None => tracing::info!("[Workflow] No route matched, using default {}", target_id),
            },
            WorkflowEvent::Cancelled { pattern } => {
                tracing::warn!("[Workflow] {} cancelled", pattern);
            }
            WorkflowEvent::FanOutJoined { succeeded, total } => {
                tracing::debug!("[Workflow] fan_out joined: {}/{} task(s) succeeded", succeeded, total);
            }
            WorkflowEvent::Finished { pattern, success } => {
                tracing::info!("[Workflow] {} finished (success: {})", pattern, success);
            }
        }
    }
}

/// Keeps every event in memory, in arrival order.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<WorkflowEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<WorkflowEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// The resilient-call states visited, in order.
    pub fn transitions(&self) -> Vec<ResilientState> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                WorkflowEvent::Transition { state } => Some(state),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, predicate: impl Fn(&WorkflowEvent) -> bool) -> usize {
        self.events().iter().filter(|e| predicate(e)).count()
    }
}

impl WorkflowObserver for RecordingObserver {
    fn on_event(&self, event: &WorkflowEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
