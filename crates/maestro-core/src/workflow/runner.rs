//! Workflow runner: turns a [`WorkflowDefinition`] into one engine call and
//! collects what came back into a [`RunReport`].

use std::collections::HashMap;

use serde::Serialize;

use super::definition::{PatternSpec, WorkflowDefinition};
use super::pipeline::Stage;
use super::routing::RoutingTable;
use super::{WorkflowEngine, WorkflowResult};
use crate::invoker::AgentRequest;

/// One labelled output of a run: a pipeline's final text, one fan-out task,
/// one conversation turn, and so on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunOutput {
    pub label: String,
    pub success: bool,
    pub text: String,
}

impl RunOutput {
    fn ok(label: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            success: true,
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub workflow_name: String,
    pub pattern: String,
    pub success: bool,
    pub outputs: Vec<RunOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct WorkflowRunner {
    engine: WorkflowEngine,
}

impl WorkflowRunner {
    pub fn new(engine: WorkflowEngine) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &WorkflowEngine {
        &self.engine
    }

    /// Run `definition` with `input`, falling back to the definition's own
    /// input and then to the empty string.
    ///
    /// Invalid definitions are reported in the returned report rather than
    /// as an error, so callers always get something printable.
    pub async fn run(&self, definition: &WorkflowDefinition, input: Option<&str>) -> RunReport {
        let input = input
            .or(definition.input.as_deref())
            .unwrap_or_default()
            .to_string();
        let mut report = RunReport {
            workflow_name: definition.name.clone(),
            pattern: definition.pattern.kind().to_string(),
            success: false,
            outputs: Vec::new(),
            error: None,
        };

        if let Err(e) = definition.validate() {
            report.error = Some(e.to_string());
            return report;
        }

        tracing::info!(
            "[Workflow] Running '{}' ({} pattern)",
            definition.name,
            report.pattern
        );

        let engine = &self.engine;
        match &definition.pattern {
            PatternSpec::Pipeline { stages } => {
                let stages: Vec<Stage> = stages
                    .iter()
                    .map(|s| Stage::template(s.target.as_str(), s.template.as_str()))
                    .collect();
                let result = engine.sequential_pipeline(&input, &stages).await;
                report.absorb(result, |text| vec![RunOutput::ok("result", text)]);
            }
            PatternSpec::Chain {
                targets,
                instruction,
            } => {
                let instruction = instruction
                    .as_deref()
                    .or(engine.config().chain_instruction.as_deref());
                let result = engine
                    .specialization_chain_with(&input, targets.as_slice(), instruction)
                    .await;
                report.absorb(result, |text| vec![RunOutput::ok("result", text)]);
            }
            PatternSpec::FanOut { tasks } => {
                let requests: HashMap<String, AgentRequest> = tasks
                    .iter()
                    .map(|(key, task)| {
                        (
                            key.clone(),
                            AgentRequest::new(task.target.as_str(), substitute(&task.message, &input)),
                        )
                    })
                    .collect();
                let results = engine.fan_out(requests).await;

                // BTreeMap order from the definition, not HashMap order.
                for key in tasks.keys() {
                    let output = match results.get(key) {
                        Some(WorkflowResult::Success(response)) => RunOutput::ok(key.as_str(), response.text()),
                        Some(WorkflowResult::Failure { error, .. }) => RunOutput {
                            label: key.clone(),
                            success: false,
                            text: error.to_string(),
                        },
                        None => continue,
                    };
                    report.outputs.push(output);
                }
                let failed = report.outputs.iter().filter(|o| !o.success).count();
                report.success = failed == 0;
                if failed > 0 {
                    report.error = Some(format!("{} of {} task(s) failed", failed, tasks.len()));
                }
            }
            PatternSpec::Conversation { target, turns } => {
                let turns: Vec<String> = turns.iter().map(|t| substitute(t, &input)).collect();
                let result = engine.conversation(target, turns.as_slice()).await;
                report.absorb(result, |responses| {
                    responses
                        .into_iter()
                        .enumerate()
                        .map(|(i, text)| RunOutput::ok(format!("turn {}", i + 1), text))
                        .collect()
                });
            }
            PatternSpec::Resilient {
                primary,
                fallback,
                message,
                max_attempts,
            } => {
                let max_attempts = max_attempts.unwrap_or(engine.config().default_max_attempts);
                let result = engine
                    .resilient_call(primary, fallback.as_deref(), &substitute(message, &input), max_attempts)
                    .await;
                report.absorb(result, |response| {
                    let label = if response.is_fallback() {
                        format!("{} (fallback)", response.target_id)
                    } else {
                        response.target_id.clone()
                    };
                    vec![RunOutput::ok(label, response.content)]
                });
            }
            PatternSpec::Routing {
                classifier,
                routes,
                default_target,
                instruction,
            } => {
                let mut table = RoutingTable::from_routes(routes.clone(), default_target.as_str());
                if let Some(instruction) = instruction {
                    table = table.with_instruction(instruction.as_str());
                }
                let result = engine.conditional_route(&input, classifier, &table).await;
                report.absorb(result, |routed| {
                    let label = match &routed.keyword {
                        Some(keyword) => format!("{} ({})", routed.target_id, keyword),
                        None => format!("{} (default)", routed.target_id),
                    };
                    vec![RunOutput::ok(label, routed.content)]
                });
            }
        }

        report
    }
}

impl RunReport {
    fn absorb<T>(&mut self, result: WorkflowResult<T>, outputs: impl FnOnce(T) -> Vec<RunOutput>) {
        match result {
            WorkflowResult::Success(value) => {
                self.success = true;
                self.outputs = outputs(value);
            }
            WorkflowResult::Failure {
                error,
                partial_results,
            } => {
                self.outputs = partial_results
                    .into_iter()
                    .enumerate()
                    .map(|(i, text)| RunOutput::ok(format!("partial {}", i + 1), text))
                    .collect();
                self.error = Some(error.to_string());
            }
        }
    }
}

fn substitute(template: &str, input: &str) -> String {
    template.replace("${input}", input)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::invoker::ScriptedInvoker;
    use crate::observer::{Pattern, RecordingObserver, WorkflowEvent};

    fn runner(invoker: &Arc<ScriptedInvoker>) -> WorkflowRunner {
        WorkflowRunner::new(WorkflowEngine::new(invoker.clone()))
    }

    #[tokio::test]
    async fn pipeline_uses_definition_input_by_default() {
        let invoker = Arc::new(ScriptedInvoker::new());
        let def = WorkflowDefinition::from_yaml(
            r#"
name: "Report"
input: "1, 2, 3"
pattern:
  type: pipeline
  stages:
    - target: "101"
      template: "Analyze: ${input}"
    - target: "102"
      template: "Report on: ${input}"
"#,
        )
        .unwrap();

        let report = runner(&invoker).run(&def, None).await;

        assert!(report.success);
        assert_eq!(report.outputs, vec![RunOutput::ok("result", "[102] Report on: [101] Analyze: 1, 2, 3")]);
    }

    #[tokio::test]
    async fn fan_out_reports_every_task_in_key_order() {
        let invoker = Arc::new(ScriptedInvoker::new());
        invoker.fail("103", "offline");
        let def = WorkflowDefinition::from_yaml(
            r#"
name: "Parallel"
pattern:
  type: fan_out
  tasks:
    b: { target: "103", message: "review ${input}" }
    a: { target: "101", message: "analyze ${input}" }
"#,
        )
        .unwrap();

        let report = runner(&invoker).run(&def, Some("code")).await;

        assert!(!report.success);
        assert_eq!(report.outputs[0], RunOutput::ok("a", "[101] analyze code"));
        assert_eq!(report.outputs[1].label, "b");
        assert!(!report.outputs[1].success);
        assert_eq!(report.error.as_deref(), Some("1 of 2 task(s) failed"));
    }

    #[tokio::test]
    async fn conversation_failure_keeps_partial_turns() {
        let invoker = Arc::new(ScriptedInvoker::new());
        invoker.reply("100", "hello").fail("100", "overloaded");
        let def = WorkflowDefinition::from_yaml(
            "name: c\npattern:\n  type: conversation\n  target: \"100\"\n  turns: [a, b, c]\n",
        )
        .unwrap();

        let report = runner(&invoker).run(&def, None).await;

        assert!(!report.success);
        assert_eq!(report.outputs, vec![RunOutput::ok("partial 1", "hello")]);
        assert!(report.error.unwrap().contains("stage 1"));
    }

    #[tokio::test]
    async fn chain_instruction_keeps_chain_events() {
        let invoker = Arc::new(ScriptedInvoker::new());
        let observer = Arc::new(RecordingObserver::new());
        let engine = WorkflowEngine::new(invoker.clone()).with_observer(observer.clone());
        let def = WorkflowDefinition::from_yaml(
            "name: c\npattern:\n  type: chain\n  targets: [\"101\", \"102\"]\n  instruction: \"Refine:\"\n",
        )
        .unwrap();

        let report = WorkflowRunner::new(engine).run(&def, Some("notes")).await;

        assert!(report.success);
        assert_eq!(invoker.calls()[0].request.message, "Refine:\n\nnotes");
        assert_eq!(
            observer.events().first(),
            Some(&WorkflowEvent::Started {
                pattern: Pattern::Chain
            })
        );
        assert!(observer.events().contains(&WorkflowEvent::Finished {
            pattern: Pattern::Chain,
            success: true
        }));
        assert_eq!(
            observer.count(|e| matches!(
                e,
                WorkflowEvent::StepDispatched {
                    pattern: Pattern::Pipeline,
                    ..
                }
            )),
            0
        );
    }

    #[tokio::test(start_paused = true)]
    async fn resilient_fallback_is_labelled() {
        let invoker = Arc::new(ScriptedInvoker::new());
        invoker.always_fail("102", "503").reply("100", "backup answer");
        let def = WorkflowDefinition::from_yaml(
            "name: r\npattern:\n  type: resilient\n  primary: \"102\"\n  fallback: \"100\"\n  message: hi\n  max_attempts: 2\n",
        )
        .unwrap();

        let report = runner(&invoker).run(&def, None).await;

        assert!(report.success);
        assert_eq!(report.outputs, vec![RunOutput::ok("100 (fallback)", "backup answer")]);
    }

    #[tokio::test]
    async fn resilient_primary_success_is_labelled_plainly() {
        let invoker = Arc::new(ScriptedInvoker::new());
        invoker.reply("102", "first try");
        let def = WorkflowDefinition::from_yaml(
            "name: r\npattern:\n  type: resilient\n  primary: \"102\"\n  fallback: \"100\"\n",
        )
        .unwrap();

        let report = runner(&invoker).run(&def, None).await;

        assert_eq!(report.outputs, vec![RunOutput::ok("102", "first try")]);
    }

    #[tokio::test]
    async fn routing_labels_the_chosen_target() {
        let invoker = Arc::new(ScriptedInvoker::new());
        invoker.reply("100", "content_creation").reply("102", "A poem");
        let def = WorkflowDefinition::from_yaml(
            r#"
name: "Router"
pattern:
  type: routing
  classifier: "100"
  default_target: "100"
  routes:
    - { keyword: data_analysis, target: "101" }
    - { keyword: content_creation, target: "102" }
"#,
        )
        .unwrap();

        let report = runner(&invoker).run(&def, Some("Write a poem")).await;

        assert_eq!(report.outputs, vec![RunOutput::ok("102 (content_creation)", "A poem")]);
    }

    #[tokio::test]
    async fn invalid_definition_is_reported_without_calls() {
        let invoker = Arc::new(ScriptedInvoker::new());
        let def = WorkflowDefinition::from_yaml("name: x\npattern:\n  type: pipeline\n  stages: []\n").unwrap();

        let report = runner(&invoker).run(&def, None).await;

        assert!(!report.success);
        assert!(report.error.unwrap().contains("at least one stage"));
        assert!(invoker.calls().is_empty());
    }
}
