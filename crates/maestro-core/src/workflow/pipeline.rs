//! Dependent-step patterns: the sequential pipeline and the specialization
//! chain.
//!
//! Both run their stages strictly in order and feed each stage's textual
//! output into the next. The first failure aborts the run with the failing
//! stage's index; later stages are never dispatched and no partial value is
//! returned.

use std::fmt;

use super::{Cancelled, WorkflowEngine, WorkflowResult};
use crate::error::WorkflowError;
use crate::invoker::AgentRequest;
use crate::observer::{Pattern, WorkflowEvent};

type Transform = Box<dyn Fn(&str) -> AgentRequest + Send + Sync>;

/// One pipeline stage: builds its request from the previous stage's output.
pub struct Stage {
    transform: Transform,
}

impl Stage {
    pub fn new(transform: impl Fn(&str) -> AgentRequest + Send + Sync + 'static) -> Self {
        Self {
            transform: Box::new(transform),
        }
    }

    /// Send the previous output to `target_id` unchanged.
    pub fn forward(target_id: impl Into<String>) -> Self {
        let target_id = target_id.into();
        Self::new(move |input| AgentRequest::new(target_id.clone(), input))
    }

    /// Send `instruction`, a blank line, then the previous output.
    pub fn with_instruction(target_id: impl Into<String>, instruction: impl Into<String>) -> Self {
        let target_id = target_id.into();
        let instruction = instruction.into();
        Self::new(move |input| {
            AgentRequest::new(target_id.clone(), format!("{}\n\n{}", instruction, input))
        })
    }

    /// Substitute the previous output for every `${input}` in `template`.
    pub fn template(target_id: impl Into<String>, template: impl Into<String>) -> Self {
        let target_id = target_id.into();
        let template = template.into();
        Self::new(move |input| AgentRequest::new(target_id.clone(), template.replace("${input}", input)))
    }

    pub fn build(&self, input: &str) -> AgentRequest {
        (self.transform)(input)
    }
}

impl fmt::Debug for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stage").finish_non_exhaustive()
    }
}

impl WorkflowEngine {
    /// Run `stages` in order, starting from `input`; returns the last
    /// stage's text.
    pub async fn sequential_pipeline(&self, input: &str, stages: &[Stage]) -> WorkflowResult<String> {
        self.emit(WorkflowEvent::Started {
            pattern: Pattern::Pipeline,
        });
        let result = self.run_stages(Pattern::Pipeline, input, stages).await;
        self.finish(Pattern::Pipeline, result)
    }

    /// Pass `initial_input` through each target of `chain` in turn. Each
    /// response becomes the next target's input, prefixed with the
    /// configured chain instruction when there is one.
    pub async fn specialization_chain<S: AsRef<str>>(
        &self,
        initial_input: &str,
        chain: &[S],
    ) -> WorkflowResult<String> {
        let instruction = self.config().chain_instruction.as_deref();
        self.specialization_chain_with(initial_input, chain, instruction).await
    }

    /// Like [`specialization_chain`](Self::specialization_chain), with an
    /// explicit instruction in place of the configured one.
    pub async fn specialization_chain_with<S: AsRef<str>>(
        &self,
        initial_input: &str,
        chain: &[S],
        instruction: Option<&str>,
    ) -> WorkflowResult<String> {
        self.emit(WorkflowEvent::Started {
            pattern: Pattern::Chain,
        });
        let stages: Vec<Stage> = chain
            .iter()
            .map(|target| match instruction {
                Some(instruction) => Stage::with_instruction(target.as_ref(), instruction),
                None => Stage::forward(target.as_ref()),
            })
            .collect();
        let result = self.run_stages(Pattern::Chain, initial_input, &stages).await;
        self.finish(Pattern::Chain, result)
    }

    async fn run_stages(&self, pattern: Pattern, input: &str, stages: &[Stage]) -> WorkflowResult<String> {
        if stages.is_empty() {
            return WorkflowResult::failure(WorkflowError::Definition(format!(
                "{} needs at least one stage",
                pattern
            )));
        }

        let mut current = input.to_string();
        for (index, stage) in stages.iter().enumerate() {
            if self.is_cancelled() {
                return WorkflowResult::failure(WorkflowError::Cancelled);
            }
            let request = stage.build(&current);
            self.emit(WorkflowEvent::StepDispatched {
                pattern,
                index,
                target_id: request.target_id.clone(),
            });

            match self.dispatch(&request).await {
                Ok(Ok(response)) => {
                    self.emit(WorkflowEvent::StepCompleted {
                        pattern,
                        index,
                        target_id: request.target_id,
                    });
                    current = response.text();
                }
                Ok(Err(cause)) => {
                    self.emit(WorkflowEvent::StepFailed {
                        pattern,
                        index,
                        error: cause.clone(),
                    });
                    return WorkflowResult::failure(WorkflowError::PipelineAborted {
                        stage_index: index,
                        cause,
                    });
                }
                Err(Cancelled) => return WorkflowResult::failure(WorkflowError::Cancelled),
            }
        }

        WorkflowResult::Success(current)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::config::EngineConfig;
    use crate::invoker::ScriptedInvoker;
    use crate::observer::{RecordingObserver, WorkflowObserver};

    /// Records events and cancels the run once the first stage completes.
    struct CancelAfterFirstStage {
        recorder: RecordingObserver,
        token: CancellationToken,
    }

    impl WorkflowObserver for CancelAfterFirstStage {
        fn on_event(&self, event: &WorkflowEvent) {
            self.recorder.on_event(event);
            if matches!(event, WorkflowEvent::StepCompleted { index: 0, .. }) {
                self.token.cancel();
            }
        }
    }

    #[tokio::test]
    async fn output_of_each_stage_feeds_the_next() {
        let invoker = Arc::new(ScriptedInvoker::new());
        invoker
            .reply("101", "mean=200")
            .reply("102", "Revenue averaged 200.");
        let engine = WorkflowEngine::new(invoker.clone());

        let stages = [
            Stage::template("101", "Analyze this data: ${input}"),
            Stage::template("102", "Summarize: ${input}"),
        ];
        let result = engine.sequential_pipeline("100, 200, 300", &stages).await;

        assert_eq!(result, WorkflowResult::Success("Revenue averaged 200.".to_string()));
        let calls = invoker.calls();
        assert_eq!(calls[0].request.message, "Analyze this data: 100, 200, 300");
        assert_eq!(calls[1].request.message, "Summarize: mean=200");
    }

    #[tokio::test]
    async fn failed_stage_stops_the_pipeline() {
        let invoker = Arc::new(ScriptedInvoker::new());
        invoker.fail("102", "provider unavailable");
        let engine = WorkflowEngine::new(invoker.clone());

        let stages = [
            Stage::forward("101"),
            Stage::forward("102"),
            Stage::forward("103"),
            Stage::forward("100"),
        ];
        let result = engine.sequential_pipeline("data", &stages).await;

        match result {
            WorkflowResult::Failure {
                error: WorkflowError::PipelineAborted { stage_index, cause },
                partial_results,
            } => {
                assert_eq!(stage_index, 1);
                assert_eq!(cause.target_id, "102");
                assert!(partial_results.is_empty());
            }
            other => panic!("expected abort, got {:?}", other),
        }
        assert_eq!(invoker.call_count("101"), 1);
        assert_eq!(invoker.call_count("102"), 1);
        assert_eq!(invoker.call_count("103"), 0);
        assert_eq!(invoker.call_count("100"), 0);
    }

    #[tokio::test]
    async fn empty_pipeline_is_rejected() {
        let engine = WorkflowEngine::new(Arc::new(ScriptedInvoker::new()));
        let result = engine.sequential_pipeline("x", &[]).await;
        assert!(matches!(result.error(), Some(WorkflowError::Definition(_))));
    }

    #[tokio::test]
    async fn chain_passes_responses_verbatim() {
        let invoker = Arc::new(ScriptedInvoker::new());
        let engine = WorkflowEngine::new(invoker.clone());

        let result = engine
            .specialization_chain("raw notes", &["101", "103", "102"])
            .await;

        assert_eq!(
            result.value().map(String::as_str),
            Some("[102] [103] [101] raw notes")
        );
    }

    #[tokio::test]
    async fn chain_applies_configured_instruction() {
        let invoker = Arc::new(ScriptedInvoker::new());
        let config = EngineConfig {
            chain_instruction: Some("Improve this:".to_string()),
            ..EngineConfig::default()
        };
        let engine = WorkflowEngine::new(invoker.clone()).with_config(config);

        engine.specialization_chain("draft", &["103"]).await;

        assert_eq!(invoker.calls()[0].request.message, "Improve this:\n\ndraft");
    }

    #[tokio::test]
    async fn explicit_chain_instruction_overrides_config_and_keeps_chain_events() {
        let invoker = Arc::new(ScriptedInvoker::new());
        let config = EngineConfig {
            chain_instruction: Some("Improve this:".to_string()),
            ..EngineConfig::default()
        };
        let observer = Arc::new(RecordingObserver::new());
        let engine = WorkflowEngine::new(invoker.clone())
            .with_config(config)
            .with_observer(observer.clone());

        let result = engine
            .specialization_chain_with("draft", &["101", "103"], Some("Refine:"))
            .await;

        assert!(result.is_success());
        assert_eq!(invoker.calls()[0].request.message, "Refine:\n\ndraft");
        assert_eq!(
            observer.count(|e| matches!(
                e,
                WorkflowEvent::StepDispatched {
                    pattern: Pattern::Chain,
                    ..
                }
            )),
            2
        );
        assert!(observer.events().contains(&WorkflowEvent::Started {
            pattern: Pattern::Chain
        }));
        assert_eq!(
            observer.count(|e| matches!(
                e,
                WorkflowEvent::Started {
                    pattern: Pattern::Pipeline
                }
            )),
            0
        );
    }

    #[tokio::test]
    async fn chain_failure_reports_stage_and_emits_events() {
        let invoker = Arc::new(ScriptedInvoker::new());
        invoker.fail("101", "bad gateway");
        let observer = Arc::new(RecordingObserver::new());
        let engine = WorkflowEngine::new(invoker.clone()).with_observer(observer.clone());

        let result = engine.specialization_chain("x", &["101", "102"]).await;

        assert!(matches!(
            result.error(),
            Some(WorkflowError::PipelineAborted { stage_index: 0, .. })
        ));
        assert_eq!(invoker.call_count("102"), 0);
        assert!(observer.events().contains(&WorkflowEvent::Finished {
            pattern: Pattern::Chain,
            success: false
        }));
    }

    #[tokio::test]
    async fn cancelling_between_stages_dispatches_nothing_further() {
        let invoker = Arc::new(ScriptedInvoker::new());
        let token = CancellationToken::new();
        let observer = Arc::new(CancelAfterFirstStage {
            recorder: RecordingObserver::new(),
            token: token.clone(),
        });
        let engine = WorkflowEngine::new(invoker.clone())
            .with_observer(observer.clone())
            .with_cancellation(token);

        let stages = [Stage::forward("101"), Stage::forward("102")];
        let result = engine.sequential_pipeline("data", &stages).await;

        assert_eq!(result.error(), Some(&WorkflowError::Cancelled));
        assert_eq!(invoker.call_count("101"), 1);
        assert_eq!(invoker.call_count("102"), 0);
        assert_eq!(
            observer
                .recorder
                .count(|e| matches!(e, WorkflowEvent::StepDispatched { .. })),
            1
        );
        assert!(observer.recorder.events().contains(&WorkflowEvent::Cancelled {
            pattern: Pattern::Pipeline
        }));
    }
}
