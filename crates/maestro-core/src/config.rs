//! Engine configuration.
//!
//! Loaded from an optional YAML file, then overridden by `MAESTRO_*`
//! environment variables:
//!
//! ```yaml
//! backoff_base_ms: 1000
//! default_max_attempts: 3
//! max_concurrency: 20
//! chain_instruction: "Refine the following:"
//! agents_dir: "./agents"
//! invoker:
//!   adapter: "anthropic"
//!   base_url: "${ANTHROPIC_BASE_URL:-https://api.anthropic.com}"
//!   api_key: "${ANTHROPIC_API_KEY}"
//!   model: "claude-sonnet-4-20250514"
//!   timeout_secs: 300
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Backoff time unit for resilient calls, in milliseconds.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Attempts used by resilient calls when a definition does not say.
    #[serde(default = "default_max_attempts")]
    pub default_max_attempts: u32,

    /// Upper bound on concurrently in-flight fan-out invocations.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Instruction prepended to each hop of a specialization chain.
    #[serde(default)]
    pub chain_instruction: Option<String>,

    /// Directory of agent definition files.
    #[serde(default)]
    pub agents_dir: Option<String>,

    #[serde(default)]
    pub invoker: InvokerConfig,
}

/// Defaults for the HTTP invoker; individual agent definitions override them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvokerConfig {
    /// "anthropic" (Messages API) or "openai" (chat completions)
    #[serde(default = "default_adapter")]
    pub adapter: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_backoff_base_ms() -> u64 {
    1000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_max_concurrency() -> usize {
    20
}

fn default_adapter() -> String {
    "anthropic".to_string()
}

fn default_base_url() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}

fn default_max_tokens() -> u32 {
    8192
}

fn default_timeout_secs() -> u64 {
    300
}

impl Default for InvokerConfig {
    fn default() -> Self {
        Self {
            adapter: default_adapter(),
            base_url: default_base_url(),
            api_key: String::new(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            backoff_base_ms: default_backoff_base_ms(),
            default_max_attempts: default_max_attempts(),
            max_concurrency: default_max_concurrency(),
            chain_instruction: None,
            agents_dir: None,
            invoker: InvokerConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yaml::from_str(yaml).map_err(|e| ConfigError::Parse {
            path: "<inline>".to_string(),
            message: e.to_string(),
        })?;
        config.resolve_env_refs();
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&content).map_err(|e| match e {
            ConfigError::Parse { message, .. } => ConfigError::Parse {
                path: path.display().to_string(),
                message,
            },
            other => other,
        })
    }

    /// Load from `path` when given (defaults otherwise), then apply
    /// environment overrides.
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Apply `MAESTRO_*` overrides and provider key fallbacks.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(v) = env_parse::<u64>("MAESTRO_BACKOFF_BASE_MS")? {
            self.backoff_base_ms = v;
        }
        if let Some(v) = env_parse::<u32>("MAESTRO_MAX_ATTEMPTS")? {
            self.default_max_attempts = v;
        }
        if let Some(v) = env_parse::<usize>("MAESTRO_MAX_CONCURRENCY")? {
            self.max_concurrency = v;
        }
        if let Ok(v) = std::env::var("MAESTRO_AGENTS_DIR") {
            self.agents_dir = Some(v);
        }
        if let Ok(v) = std::env::var("MAESTRO_ADAPTER") {
            self.invoker.adapter = v;
        }
        if let Ok(v) = std::env::var("MAESTRO_BASE_URL") {
            self.invoker.base_url = v;
        }
        if let Ok(v) = std::env::var("MAESTRO_MODEL") {
            self.invoker.model = v;
        }
        if self.invoker.api_key.is_empty() {
            self.invoker.api_key = std::env::var("MAESTRO_API_KEY")
                .or_else(|_| std::env::var("ANTHROPIC_API_KEY"))
                .or_else(|_| std::env::var("OPENAI_API_KEY"))
                .unwrap_or_default();
        }
        self.validate()
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    fn resolve_env_refs(&mut self) {
        self.invoker.base_url = resolve_env_vars(&self.invoker.base_url);
        self.invoker.api_key = resolve_env_vars(&self.invoker.api_key);
        self.invoker.model = resolve_env_vars(&self.invoker.model);
        if let Some(dir) = self.agents_dir.as_mut() {
            *dir = resolve_env_vars(dir);
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrency must be at least 1".to_string(),
            ));
        }
        if self.default_max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "default_max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::Invalid(format!("{} is not a valid number: '{}'", key, raw))),
        Err(_) => Ok(None),
    }
}

/// Resolve environment variable references in a string.
/// Supports `${ENV_VAR}` and `${ENV_VAR:-default}` syntax; unknown variables
/// without a default are left untouched.
pub fn resolve_env_vars(input: &str) -> String {
    let Ok(re) = regex::Regex::new(r"\$\{([^}]+)\}") else {
        return input.to_string();
    };
    re.replace_all(input, |caps: &regex::Captures| {
        let var_expr = &caps[1];
        if let Some(idx) = var_expr.find(":-") {
            let var_name = &var_expr[..idx];
            let default_val = &var_expr[idx + 2..];
            std::env::var(var_name).unwrap_or_else(|_| default_val.to_string())
        } else {
            std::env::var(var_expr).unwrap_or_else(|_| format!("${{{}}}", var_expr))
        }
    })
    .to_string()
}
