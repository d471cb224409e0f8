//! `maestro agents` — list registered agents.

use super::{load_config, load_registry, truncate};

pub fn list(config_path: Option<&str>, agents_dir: Option<&str>) -> Result<(), String> {
    let config = load_config(config_path)?;
    let registry = load_registry(&config, agents_dir)?;

    println!("┌────────┬────────────────────┬────────────┬──────────────────────────┐");
    println!("│ ID     │ Name               │ Adapter    │ Model                    │");
    println!("├────────┼────────────────────┼────────────┼──────────────────────────┤");
    for agent in registry.all() {
        let adapter = agent.adapter.as_deref().unwrap_or(config.invoker.adapter.as_str());
        let model = agent.model.as_deref().unwrap_or(config.invoker.model.as_str());
        let name = if agent.structured_output {
            format!("{} {{}}", agent.name)
        } else {
            agent.name.clone()
        };
        println!(
            "│ {:<6} │ {:<18} │ {:<10} │ {:<24} │",
            truncate(&agent.id, 6),
            truncate(&name, 18),
            truncate(adapter, 10),
            truncate(model, 24)
        );
    }
    println!("└────────┴────────────────────┴────────────┴──────────────────────────┘");
    println!("{} agent(s); {{}} marks structured output", registry.len());
    Ok(())
}
