//! Agent definitions — what a `target_id` resolves to.
//!
//! Agents can be defined in JSON or YAML files, one agent per file:
//!
//! ```yaml
//! id: "101"
//! name: "Data Analyzer"
//! description: "Extracts key metrics and trends from raw data"
//! model: "claude-sonnet-4-20250514"
//! structured_output: true
//! system_prompt: |
//!   You analyze data. Reply with a JSON object with the fields
//!   summary, keyMetrics, trends, insights and confidence.
//! ```
//!
//! Fields left out fall back to the invoker defaults in
//! [`InvokerConfig`](crate::config::InvokerConfig).

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::resolve_env_vars;
use crate::error::ConfigError;

/// A registered agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDefinition {
    /// Target id used in requests (e.g. "101")
    pub id: String,

    /// Display name
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    /// Adapter override: "anthropic" or "openai"
    #[serde(default)]
    pub adapter: Option<String>,

    #[serde(default)]
    pub model: Option<String>,

    #[serde(default)]
    pub base_url: Option<String>,

    /// API key override (supports `${ENV_VAR}` references)
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default)]
    pub system_prompt: String,

    #[serde(default)]
    pub temperature: Option<f64>,

    #[serde(default)]
    pub max_tokens: Option<u32>,

    /// Parse replies as a JSON object into a structured response.
    #[serde(default)]
    pub structured_output: bool,
}

impl AgentDefinition {
    pub fn from_yaml(yaml: &str) -> Result<Self, String> {
        serde_yaml::from_str(yaml).map_err(|e| e.to_string())
    }

    pub fn from_json(json: &str) -> Result<Self, String> {
        serde_json::from_str(json).map_err(|e| e.to_string())
    }

    /// Load a definition from a `.json`, `.yaml` or `.yml` file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let parsed = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&content),
            _ => Self::from_yaml(&content),
        };
        let mut def = parsed.map_err(|message| ConfigError::Parse {
            path: path.display().to_string(),
            message,
        })?;
        def.base_url = def.base_url.map(|u| resolve_env_vars(&u));
        def.api_key = def.api_key.map(|k| resolve_env_vars(&k));
        Ok(def)
    }

    fn builtin(id: &str, name: &str, description: &str, system_prompt: &str, structured: bool) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: Some(description.to_string()),
            adapter: None,
            model: None,
            base_url: None,
            api_key: None,
            system_prompt: system_prompt.to_string(),
            temperature: None,
            max_tokens: None,
            structured_output: structured,
        }
    }
}

/// Agent definitions indexed by target id.
#[derive(Debug, Default)]
pub struct AgentRegistry {
    agents: HashMap<String, AgentDefinition>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding only the built-in agents.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for agent in Self::builtin_agents() {
            registry.insert(agent);
        }
        registry
    }

    /// Load every agent file from a directory. Returns how many were loaded.
    /// Files in the directory replace same-id entries already registered.
    pub fn load_dir(&mut self, dir: impl AsRef<Path>) -> Result<usize, ConfigError> {
        let dir_path = dir.as_ref();
        if !dir_path.is_dir() {
            return Err(ConfigError::Invalid(format!(
                "Agent directory '{}' does not exist",
                dir_path.display()
            )));
        }

        let entries = std::fs::read_dir(dir_path).map_err(|source| ConfigError::Io {
            path: dir_path.display().to_string(),
            source,
        })?;

        let mut count = 0;
        for entry in entries {
            let path = entry
                .map_err(|source| ConfigError::Io {
                    path: dir_path.display().to_string(),
                    source,
                })?
                .path();
            let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
            if !matches!(ext, "json" | "yaml" | "yml") {
                continue;
            }

            let agent = AgentDefinition::from_file(&path)?;
            tracing::info!("[AgentRegistry] Loaded agent: {} ({})", agent.id, agent.name);
            self.insert(agent);
            count += 1;
        }

        Ok(count)
    }

    pub fn insert(&mut self, agent: AgentDefinition) {
        self.agents.insert(agent.id.clone(), agent);
    }

    pub fn get(&self, id: &str) -> Option<&AgentDefinition> {
        self.agents.get(id)
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// All agents sorted by id.
    pub fn all(&self) -> Vec<&AgentDefinition> {
        let mut agents: Vec<_> = self.agents.values().collect();
        agents.sort_by(|a, b| a.id.cmp(&b.id));
        agents
    }

    /// Built-in agents used by the bundled workflow examples.
    pub fn builtin_agents() -> Vec<AgentDefinition> {
        vec![
            AgentDefinition::builtin(
                "100",
                "General Agent",
                "General-purpose assistant and input classifier",
                GENERAL_SYSTEM_PROMPT,
                false,
            ),
            AgentDefinition::builtin(
                "101",
                "Data Analyzer",
                "Extracts key metrics, trends and insights from raw data",
                DATA_ANALYZER_SYSTEM_PROMPT,
                true,
            ),
            AgentDefinition::builtin(
                "102",
                "Content Writer",
                "Writes professional prose from analysis or notes",
                CONTENT_WRITER_SYSTEM_PROMPT,
                false,
            ),
            AgentDefinition::builtin(
                "103",
                "Code Reviewer",
                "Reviews code and analyses for accuracy and completeness",
                CODE_REVIEWER_SYSTEM_PROMPT,
                false,
            ),
        ]
    }
}

const GENERAL_SYSTEM_PROMPT: &str =
    "You are a helpful general-purpose assistant. Answer concisely and accurately.";

const DATA_ANALYZER_SYSTEM_PROMPT: &str = r#"You are a data analyst.
Reply with a single JSON object and nothing else, using these fields:
- content: a 2-3 sentence overview of the analysis
- keyMetrics: an object of metric name to number (mean, median, min, max, ...)
- trends: a list of identified trends
- insights: a list of actionable insights
- confidence: a number between 0.0 and 1.0
"#;

const CONTENT_WRITER_SYSTEM_PROMPT: &str =
    "You are a professional writer. Produce clear, well-structured prose for a business audience.";

const CODE_REVIEWER_SYSTEM_PROMPT: &str =
    "You are a meticulous reviewer. Point out errors, omissions and risks, then suggest fixes.";
