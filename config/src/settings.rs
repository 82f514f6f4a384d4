//! Per-agent settings: agent type plus per-stage LLM parameters.
//!
//! TOML shape:
//!
//! ```toml
//! [agents.executor]
//! agent_type = "react"
//!
//! [agents.executor.stages.REASONING]
//! model = "gpt-4o-mini"
//! base_url = "https://api.openai.com/v1"
//! api_key = "sk-..."
//! temperature = 0.7
//! max_tokens = 4096
//! ```
//!
//! Stage keys are the stage names the runtime reports (e.g. `REASONING`,
//! `REFLECTING`, `CLARIFYING`).

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::LoadError;

/// LLM parameters for one workflow stage.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LlmSettings {
    pub model: Option<String>,
    pub base_url: Option<String>,
    /// Either the key itself or a `${VAR}` reference into the environment.
    pub api_key: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
}

impl LlmSettings {
    /// The api key with `${VAR}` indirection resolved against the process
    /// environment (populated by [`load_and_apply`](crate::load_and_apply)'s
    /// env > .env > XDG layering). A reference to an unset variable resolves
    /// to `None`.
    pub fn resolved_api_key(&self) -> Option<String> {
        let raw = self.api_key.as_deref()?;
        match raw.strip_prefix("${").and_then(|s| s.strip_suffix('}')) {
            Some(var) => std::env::var(var).ok(),
            None => Some(raw.to_string()),
        }
    }
}

/// Configuration of one agent: its type and the per-stage LLM parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentSettings {
    pub agent_type: String,
    #[serde(default)]
    pub stages: HashMap<String, LlmSettings>,
}

impl AgentSettings {
    /// The LLM settings of a stage, by the stage's diagnostic name.
    pub fn stage(&self, name: &str) -> Option<&LlmSettings> {
        self.stages.get(name)
    }
}

/// All agent settings, keyed by agent name.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    agents: HashMap<String, AgentSettings>,
}

impl Settings {
    /// Parses settings from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self, LoadError> {
        Ok(toml::from_str(content)?)
    }

    /// Loads settings from a TOML file.
    pub fn load(path: &Path) -> Result<Self, LoadError> {
        let content = std::fs::read_to_string(path).map_err(LoadError::Read)?;
        Self::from_toml_str(&content)
    }

    /// The settings of a named agent.
    pub fn agent(&self, name: &str) -> Option<&AgentSettings> {
        self.agents.get(name)
    }

    /// Registered agent names.
    pub fn agent_names(&self) -> impl Iterator<Item = &str> {
        self.agents.keys().map(String::as_str)
    }
}
