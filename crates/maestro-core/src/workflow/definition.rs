//! YAML schema for workflow definitions.
//!
//! A definition names one orchestration pattern and its parameters:
//!
//! ```yaml
//! name: "Report Flow"
//! description: "Analyze figures, then write them up"
//! input: "Q1: 1000, Q2: 2000, Q3: 3000"
//!
//! pattern:
//!   type: pipeline          # pipeline | fan_out | chain | conversation | resilient | routing
//!   stages:
//!     - target: "101"
//!       template: "Analyze this data: ${input}"
//!     - target: "102"
//!       template: "Write a short report about: ${input}"
//! ```
//!
//! `${input}` is replaced with the run input (or, inside a pipeline, with
//! the previous stage's output). Environment references are not expanded
//! here; agent definitions own credentials.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::routing::Route;
use crate::error::{ConfigError, WorkflowError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default = "default_version")]
    pub version: String,

    /// Default run input, used when none is given on the command line.
    #[serde(default)]
    pub input: Option<String>,

    pub pattern: PatternSpec,
}

fn default_version() -> String {
    "1.0".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PatternSpec {
    Pipeline {
        stages: Vec<StageSpec>,
    },
    FanOut {
        tasks: BTreeMap<String, TaskSpec>,
    },
    Chain {
        targets: Vec<String>,
        /// Overrides the engine's chain instruction for this run.
        #[serde(default)]
        instruction: Option<String>,
    },
    Conversation {
        target: String,
        turns: Vec<String>,
    },
    Resilient {
        primary: String,
        #[serde(default)]
        fallback: Option<String>,
        #[serde(default = "default_message")]
        message: String,
        /// Falls back to the engine's `default_max_attempts`.
        #[serde(default)]
        max_attempts: Option<u32>,
    },
    Routing {
        classifier: String,
        #[serde(default)]
        routes: Vec<Route>,
        default_target: String,
        #[serde(default)]
        instruction: Option<String>,
    },
}

fn default_message() -> String {
    "${input}".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageSpec {
    pub target: String,
    #[serde(default = "default_message")]
    pub template: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub target: String,
    #[serde(default = "default_message")]
    pub message: String,
}

impl PatternSpec {
    pub fn kind(&self) -> &'static str {
        match self {
            PatternSpec::Pipeline { .. } => "pipeline",
            PatternSpec::FanOut { .. } => "fan_out",
            PatternSpec::Chain { .. } => "chain",
            PatternSpec::Conversation { .. } => "conversation",
            PatternSpec::Resilient { .. } => "resilient",
            PatternSpec::Routing { .. } => "routing",
        }
    }

    /// Every target id this pattern may call.
    pub fn targets(&self) -> Vec<&str> {
        match self {
            PatternSpec::Pipeline { stages } => stages.iter().map(|s| s.target.as_str()).collect(),
            PatternSpec::FanOut { tasks } => tasks.values().map(|t| t.target.as_str()).collect(),
            PatternSpec::Chain { targets, .. } => targets.iter().map(String::as_str).collect(),
            PatternSpec::Conversation { target, .. } => vec![target.as_str()],
            PatternSpec::Resilient { primary, fallback, .. } => {
                let mut out = vec![primary.as_str()];
                out.extend(fallback.as_deref());
                out
            }
            PatternSpec::Routing {
                classifier,
                routes,
                default_target,
                ..
            } => {
                let mut out = vec![classifier.as_str(), default_target.as_str()];
                out.extend(routes.iter().map(|r| r.target_id.as_str()));
                out
            }
        }
    }
}

impl WorkflowDefinition {
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(yaml).map_err(|e| ConfigError::Parse {
            path: "<inline>".to_string(),
            message: e.to_string(),
        })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Structural checks that serde cannot express.
    pub fn validate(&self) -> Result<(), WorkflowError> {
        let invalid = |msg: String| Err(WorkflowError::Definition(msg));

        if self.name.trim().is_empty() {
            return invalid("workflow name must not be empty".to_string());
        }
        match &self.pattern {
            PatternSpec::Pipeline { stages } if stages.is_empty() => {
                return invalid("pipeline needs at least one stage".to_string());
            }
            PatternSpec::Chain { targets, .. } if targets.is_empty() => {
                return invalid("chain needs at least one target".to_string());
            }
            PatternSpec::Conversation { turns, .. } if turns.is_empty() => {
                return invalid("conversation needs at least one turn".to_string());
            }
            PatternSpec::Resilient {
                max_attempts: Some(0), ..
            } => {
                return invalid("resilient max_attempts must be at least 1".to_string());
            }
            PatternSpec::Routing { routes, .. } => {
                if let Some(route) = routes.iter().find(|r| r.keyword.trim().is_empty()) {
                    return invalid(format!("route to '{}' has an empty keyword", route.target_id));
                }
            }
            _ => {}
        }

        if let Some(empty) = self.pattern.targets().iter().position(|t| t.trim().is_empty()) {
            return invalid(format!(
                "{} target #{} is empty",
                self.pattern.kind(),
                empty + 1
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_pipeline_with_defaults() {
        let yaml = r#"
name: "Report Flow"
pattern:
  type: pipeline
  stages:
    - target: "101"
      template: "Analyze this data: ${input}"
    - target: "102"
"#;
        let wf = WorkflowDefinition::from_yaml(yaml).unwrap();
        assert_eq!(wf.version, "1.0");
        assert_eq!(wf.pattern.kind(), "pipeline");
        match &wf.pattern {
            PatternSpec::Pipeline { stages } => {
                assert_eq!(stages[0].template, "Analyze this data: ${input}");
                assert_eq!(stages[1].template, "${input}");
            }
            other => panic!("unexpected pattern {:?}", other),
        }
        assert!(wf.validate().is_ok());
    }

    #[test]
    fn parses_routing_and_resilient() {
        let routing = WorkflowDefinition::from_yaml(
            r#"
name: "Router"
pattern:
  type: routing
  classifier: "100"
  default_target: "100"
  routes:
    - keyword: data_analysis
      target: "101"
    - keyword: content_creation
      target_id: "102"
"#,
        )
        .unwrap();
        assert_eq!(routing.pattern.targets(), vec!["100", "100", "101", "102"]);

        let resilient = WorkflowDefinition::from_yaml(
            r#"
name: "Sturdy"
pattern:
  type: resilient
  primary: "100"
  fallback: "101"
  max_attempts: 3
"#,
        )
        .unwrap();
        assert_eq!(
            resilient.pattern,
            PatternSpec::Resilient {
                primary: "100".to_string(),
                fallback: Some("101".to_string()),
                message: "${input}".to_string(),
                max_attempts: Some(3),
            }
        );
    }

    #[test]
    fn fan_out_tasks_keep_key_order() {
        let wf = WorkflowDefinition::from_yaml(
            r#"
name: "Parallel"
pattern:
  type: fan_out
  tasks:
    task3: { target: "102", message: "Write about AI" }
    task1: { target: "101", message: "Analyze 1, 2, 3" }
"#,
        )
        .unwrap();
        match wf.pattern {
            PatternSpec::FanOut { tasks } => {
                assert_eq!(tasks.keys().collect::<Vec<_>>(), vec!["task1", "task3"]);
            }
            other => panic!("unexpected pattern {:?}", other),
        }
    }

    #[test]
    fn unknown_pattern_type_is_a_parse_error() {
        let err = WorkflowDefinition::from_yaml("name: x\npattern:\n  type: loop\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn validate_rejects_empty_shapes() {
        let wf = WorkflowDefinition::from_yaml(
            "name: x\npattern:\n  type: conversation\n  target: \"100\"\n  turns: []\n",
        )
        .unwrap();
        assert!(matches!(wf.validate(), Err(WorkflowError::Definition(_))));

        let wf = WorkflowDefinition::from_yaml(
            "name: x\npattern:\n  type: chain\n  targets: [\"101\", \"\"]\n",
        )
        .unwrap();
        assert_eq!(
            wf.validate(),
            Err(WorkflowError::Definition("chain target #2 is empty".to_string()))
        );
    }

    #[test]
    fn from_file_reports_path() {
        let err = WorkflowDefinition::from_file("/definitely/missing.yaml").unwrap_err();
        assert!(err.to_string().contains("/definitely/missing.yaml"));
    }
}
