//! Maestro Core — composable orchestration of calls to AI agents.
//!
//! Agents are reached only through the [`AgentInvoker`] trait, so the same
//! workflow patterns run against a live HTTP provider
//! ([`HttpAgentInvoker`]) or an in-memory script ([`ScriptedInvoker`]).
//!
//! - [`WorkflowEngine`]: six patterns (sequential pipeline, parallel
//!   fan-out, specialization chain, conversation, resilient call and
//!   conditional routing).
//! - [`RetryPolicy`]: exponential backoff for the resilient call.
//! - [`SessionGuard`]: scoped conversation session that is always released.
//! - [`WorkflowDefinition`] / [`WorkflowRunner`]: YAML-defined runs.

pub mod agents;
pub mod config;
pub mod error;
pub mod invoker;
pub mod observer;
pub mod retry;
pub mod session;
pub mod workflow;

// Convenience re-exports
pub use agents::{AgentDefinition, AgentRegistry};
pub use config::{EngineConfig, InvokerConfig};
pub use error::{ConfigError, InvocationError, SessionError, WorkflowError};
pub use invoker::{AgentInvoker, AgentRequest, AgentResponse, HttpAgentInvoker, ScriptedInvoker};
pub use observer::{RecordingObserver, TracingObserver, WorkflowEvent, WorkflowObserver};
pub use retry::RetryPolicy;
pub use session::{ConversationSession, SessionGuard};
pub use workflow::{WorkflowDefinition, WorkflowEngine, WorkflowResult, WorkflowRunner};
