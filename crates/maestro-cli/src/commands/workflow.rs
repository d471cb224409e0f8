//! `maestro run` / `maestro validate` — YAML-defined workflows.

use maestro_core::workflow::{PatternSpec, RunReport, WorkflowDefinition, WorkflowRunner};

use super::{build_engine, load_config, load_registry};

/// Run a workflow from a YAML file.
pub async fn run(
    config_path: Option<&str>,
    workflow_file: &str,
    input: Option<&str>,
    dry_run: bool,
    json: bool,
    agents_dir: Option<&str>,
) -> Result<(), String> {
    let workflow = WorkflowDefinition::from_file(workflow_file).map_err(|e| e.to_string())?;
    let config = load_config(config_path)?;
    let registry = load_registry(&config, agents_dir)?;

    if !json {
        println!("📄 Loaded workflow: {} ({})", workflow.name, workflow_file);
        println!("   pattern: {}{}", workflow.pattern.kind(), if dry_run { " (dry run)" } else { "" });
        println!();
    }

    let runner = WorkflowRunner::new(build_engine(config, registry, dry_run));
    let report = runner.run(&workflow, input).await;

    if json {
        let out = serde_json::to_string_pretty(&report).map_err(|e| e.to_string())?;
        println!("{}", out);
    } else {
        print_report(&report);
    }

    if report.success {
        Ok(())
    } else {
        Err(format!(
            "Workflow '{}' failed: {}",
            report.workflow_name,
            report.error.as_deref().unwrap_or("unknown error")
        ))
    }
}

/// Validate a workflow YAML file without executing it.
pub fn validate(config_path: Option<&str>, workflow_file: &str) -> Result<(), String> {
    let workflow = WorkflowDefinition::from_file(workflow_file).map_err(|e| e.to_string())?;
    workflow.validate().map_err(|e| e.to_string())?;

    let config = load_config(config_path)?;
    let registry = load_registry(&config, None)?;
    let unknown: Vec<&str> = workflow
        .pattern
        .targets()
        .into_iter()
        .filter(|t| registry.get(t).is_none())
        .collect();

    println!("✅ Workflow '{}' is valid", workflow.name);
    println!("   Version: {}", workflow.version);
    println!("   Pattern: {}", workflow.pattern.kind());
    describe(&workflow.pattern);
    if !unknown.is_empty() {
        println!("   ⚠️  Unregistered target(s): {}", unknown.join(", "));
    }
    Ok(())
}

fn describe(pattern: &PatternSpec) {
    match pattern {
        PatternSpec::Pipeline { stages } => {
            for (i, stage) in stages.iter().enumerate() {
                println!("   {}. {} ← {}", i + 1, stage.target, super::truncate(&stage.template, 60));
            }
        }
        PatternSpec::FanOut { tasks } => {
            for (key, task) in tasks {
                println!("   • {} → {}", key, task.target);
            }
        }
        PatternSpec::Chain { targets, .. } => println!("   {}", targets.join(" → ")),
        PatternSpec::Conversation { target, turns } => {
            println!("   {} turn(s) with {}", turns.len(), target)
        }
        PatternSpec::Resilient {
            primary,
            fallback,
            max_attempts,
            ..
        } => {
            let attempts = max_attempts.map(|n| n.to_string()).unwrap_or_else(|| "default".to_string());
            println!(
                "   primary {} ({} attempts), fallback {}",
                primary,
                attempts,
                fallback.as_deref().unwrap_or("none")
            );
        }
        PatternSpec::Routing {
            classifier,
            routes,
            default_target,
            ..
        } => {
            println!("   classifier: {}", classifier);
            for route in routes {
                println!("   • {} → {}", route.keyword, route.target_id);
            }
            println!("   • (default) → {}", default_target);
        }
    }
}

fn print_report(report: &RunReport) {
    for output in &report.outputs {
        let mark = if output.success { "✅" } else { "❌" };
        println!("── {} {} ──", mark, output.label);
        println!("{}", output.text);
        println!();
    }
    println!("═══════════════════════════════════════════════════════════");
    if report.success {
        println!("🎉 Workflow '{}' completed successfully", report.workflow_name);
    } else {
        println!("Workflow '{}' did not complete", report.workflow_name);
    }
}
