//! Configuration: TOML file plus environment overrides.
//!
//! Resolution order, later wins: built-in defaults, the config file,
//! environment variables, command-line flags (applied by `main`).

use std::path::{Path, PathBuf};
use std::str::FromStr;

use proto::{ConfigError, EditMode};
use serde::Deserialize;

/// Environment variable prefix for overrides.
const ENV_PREFIX: &str = "AGENT_";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub llm: LlmConfig,
    pub agent: AgentConfig,
}

/// Model provider settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// API key. Falls back to `OPENAI_API_KEY`.
    pub api_key: Option<String>,
    /// Custom API base URL for OpenAI-compatible endpoints.
    pub base_url: Option<String>,
    /// Model id to request.
    pub model: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            model: "gpt-4o".to_string(),
        }
    }
}

/// Agent loop settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Edit mode new sessions start in.
    pub default_mode: EditMode,
    /// Workspace root tools operate in. Defaults to the current directory.
    pub workspace_root: Option<PathBuf>,
    /// Iteration cap per run.
    pub max_iterations: usize,
    /// Wall-clock cap per run, in seconds.
    pub max_run_secs: u64,
    /// Stream stall timeout, in seconds.
    pub stall_secs: u64,
    /// Approval wait before auto-stop, in seconds.
    pub approval_secs: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        let limits = agent::RunLimits::default();
        Self {
            default_mode: EditMode::Ask,
            workspace_root: None,
            max_iterations: limits.max_iterations,
            max_run_secs: limits.max_run_secs,
            stall_secs: limits.stall_secs,
            approval_secs: limits.approval_secs,
        }
    }
}

impl Config {
    /// Loads configuration from `path` (or `./agent.toml` when it exists),
    /// then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = Path::new("agent.toml");
                if default_path.exists() {
                    Self::from_file(default_path)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env();
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|e| ConfigError::Toml(e.to_string()))
    }

    fn apply_env(&mut self) {
        if let Ok(key) = std::env::var(format!("{ENV_PREFIX}API_KEY")) {
            self.llm.api_key = Some(key);
        } else if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            self.llm.api_key.get_or_insert(key);
        }
        if let Ok(url) = std::env::var(format!("{ENV_PREFIX}BASE_URL")) {
            self.llm.base_url = Some(url);
        }
        if let Ok(model) = std::env::var(format!("{ENV_PREFIX}MODEL")) {
            self.llm.model = model;
        }
        if let Ok(mode) = std::env::var(format!("{ENV_PREFIX}MODE")) {
            if let Ok(mode) = EditMode::from_str(&mode) {
                self.agent.default_mode = mode;
            }
        }
    }

    /// Validates fields that have no usable default.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let Some(api_key) = &self.llm.api_key else {
            return Err(ConfigError::MissingField("llm.api_key".to_string()));
        };
        if api_key.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "llm.api_key".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        if self.agent.max_iterations == 0 {
            return Err(ConfigError::InvalidValue {
                field: "agent.max_iterations".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Run limits assembled from the agent section.
    pub fn limits(&self) -> agent::RunLimits {
        agent::RunLimits {
            max_iterations: self.agent.max_iterations,
            max_run_secs: self.agent.max_run_secs,
            stall_secs: self.agent.stall_secs,
            approval_secs: self.agent.approval_secs,
        }
    }
}
