//! CLI command implementations.
//!
//! Each submodule corresponds to a top-level CLI command. Shared setup
//! (configuration, agent registry, engine) lives here.

pub mod agents;
pub mod ask;
pub mod workflow;

use std::sync::Arc;

use maestro_core::{
    AgentInvoker, AgentRegistry, EngineConfig, HttpAgentInvoker, ScriptedInvoker, WorkflowEngine,
};
use tokio_util::sync::CancellationToken;

/// Load the engine configuration, with `MAESTRO_*` overrides applied.
pub fn load_config(path: Option<&str>) -> Result<EngineConfig, String> {
    EngineConfig::load(path).map_err(|e| e.to_string())
}

/// Built-in agents plus any found in `agents_dir` (or the configured
/// directory). Same-id files replace built-ins.
pub fn load_registry(config: &EngineConfig, agents_dir: Option<&str>) -> Result<AgentRegistry, String> {
    let mut registry = AgentRegistry::with_builtins();
    if let Some(dir) = agents_dir.or(config.agents_dir.as_deref()) {
        let count = registry.load_dir(dir).map_err(|e| e.to_string())?;
        tracing::info!("[AgentRegistry] Loaded {} agent(s) from '{}'", count, dir);
    }
    Ok(registry)
}

/// Build an engine whose runs are cancelled on Ctrl-C.
pub fn build_engine(config: EngineConfig, registry: AgentRegistry, dry_run: bool) -> WorkflowEngine {
    let invoker: Arc<dyn AgentInvoker> = if dry_run {
        Arc::new(ScriptedInvoker::new())
    } else {
        Arc::new(HttpAgentInvoker::new(registry, config.invoker.clone()))
    };

    let token = CancellationToken::new();
    let on_interrupt = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling workflow");
            on_interrupt.cancel();
        }
    });

    WorkflowEngine::new(invoker)
        .with_config(config)
        .with_cancellation(token)
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{}…", kept)
    }
}
