//! Conditional orchestration: classify once, then route the original input.

use serde::{Deserialize, Serialize};

use super::{Cancelled, WorkflowEngine, WorkflowResult};
use crate::error::WorkflowError;
use crate::invoker::AgentRequest;
use crate::observer::{Pattern, WorkflowEvent};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub keyword: String,
    #[serde(alias = "target")]
    pub target_id: String,
}

/// Ordered keyword → target routes plus a default target. Earlier routes
/// win when several keywords match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingTable {
    routes: Vec<Route>,
    default_target: String,
    instruction: Option<String>,
}

impl RoutingTable {
    pub fn new(default_target: impl Into<String>) -> Self {
        Self {
            routes: Vec::new(),
            default_target: default_target.into(),
            instruction: None,
        }
    }

    pub fn route(mut self, keyword: impl Into<String>, target_id: impl Into<String>) -> Self {
        self.routes.push(Route {
            keyword: keyword.into(),
            target_id: target_id.into(),
        });
        self
    }

    pub fn from_routes(routes: Vec<Route>, default_target: impl Into<String>) -> Self {
        Self {
            routes,
            default_target: default_target.into(),
            instruction: None,
        }
    }

    /// Replace the generated classifier prompt prefix.
    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = Some(instruction.into());
        self
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn default_target(&self) -> &str {
        &self.default_target
    }

    /// First route whose keyword occurs in `classification`, ignoring case.
    pub fn resolve(&self, classification: &str) -> Option<&Route> {
        let haystack = classification.to_lowercase();
        self.routes
            .iter()
            .find(|route| haystack.contains(&route.keyword.to_lowercase()))
    }

    /// The message sent to the classifier.
    pub fn classifier_prompt(&self, user_input: &str) -> String {
        match &self.instruction {
            Some(instruction) => format!("{}{}", instruction, user_input),
            None => {
                let keywords: Vec<&str> = self.routes.iter().map(|r| r.keyword.as_str()).collect();
                format!(
                    "Classify this input into ONE word ({}, or general): {}",
                    keywords.join(", "),
                    user_input
                )
            }
        }
    }
}

/// The routed target's answer, tagged with who handled it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutedResponse {
    pub target_id: String,
    /// Matched keyword; `None` when the default target handled it.
    pub keyword: Option<String>,
    pub content: String,
}

impl WorkflowEngine {
    /// Classify `user_input` with `classifier`, then send the original input
    /// to the matched target. A failed classification aborts the run.
    pub async fn conditional_route(
        &self,
        user_input: &str,
        classifier: &str,
        table: &RoutingTable,
    ) -> WorkflowResult<RoutedResponse> {
        self.emit(WorkflowEvent::Started {
            pattern: Pattern::Routing,
        });
        let result = self.run_routing(user_input, classifier, table).await;
        self.finish(Pattern::Routing, result)
    }

    async fn run_routing(&self, user_input: &str, classifier: &str, table: &RoutingTable) -> WorkflowResult<RoutedResponse> {
        let classify = AgentRequest::new(classifier, table.classifier_prompt(user_input));
        let classification = match self.routing_step(0, &classify).await {
            Ok(text) => text,
            Err(error) => return WorkflowResult::failure(error),
        };

        let (keyword, target_id) = match table.resolve(&classification) {
            Some(route) => (Some(route.keyword.clone()), route.target_id.clone()),
            None => (None, table.default_target().to_string()),
        };
        self.emit(WorkflowEvent::Routed {
            keyword: keyword.clone(),
            target_id: target_id.clone(),
        });

        let handle = AgentRequest::new(target_id.as_str(), user_input);
        match self.routing_step(1, &handle).await {
            Ok(content) => WorkflowResult::Success(RoutedResponse {
                target_id,
                keyword,
                content,
            }),
            Err(error) => WorkflowResult::failure(error),
        }
    }

    async fn routing_step(&self, index: usize, request: &AgentRequest) -> Result<String, WorkflowError> {
        if self.is_cancelled() {
            return Err(WorkflowError::Cancelled);
        }
        self.emit(WorkflowEvent::StepDispatched {
            pattern: Pattern::Routing,
            index,
            target_id: request.target_id.clone(),
        });
        match self.dispatch(request).await {
            Ok(Ok(response)) => {
                self.emit(WorkflowEvent::StepCompleted {
                    pattern: Pattern::Routing,
                    index,
                    target_id: request.target_id.clone(),
                });
                Ok(response.text())
            }
            Ok(Err(cause)) => {
                self.emit(WorkflowEvent::StepFailed {
                    pattern: Pattern::Routing,
                    index,
                    error: cause.clone(),
                });
                Err(WorkflowError::PipelineAborted {
                    stage_index: index,
                    cause,
                })
            }
            Err(Cancelled) => Err(WorkflowError::Cancelled),
        }
    }
}
