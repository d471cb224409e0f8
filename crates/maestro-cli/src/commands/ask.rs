//! `maestro ask` — one message to one agent.

use maestro_core::{AgentRequest, AgentResponse, WorkflowResult};

use super::{build_engine, load_config, load_registry};

pub async fn run(
    config_path: Option<&str>,
    target: &str,
    message: &str,
    agents_dir: Option<&str>,
) -> Result<(), String> {
    let config = load_config(config_path)?;
    let registry = load_registry(&config, agents_dir)?;
    if registry.get(target).is_none() {
        return Err(format!("Unknown agent '{}'. Run `maestro agents` to list them.", target));
    }

    let engine = build_engine(config, registry, false);
    match engine.call(AgentRequest::new(target, message)).await {
        WorkflowResult::Success(AgentResponse::Structured(fields)) => {
            let out = serde_json::to_string_pretty(&fields).map_err(|e| e.to_string())?;
            println!("{}", out);
            Ok(())
        }
        WorkflowResult::Success(response) => {
            println!("{}", response.text());
            Ok(())
        }
        WorkflowResult::Failure { error, .. } => Err(error.to_string()),
    }
}
