//! Agent and model configuration.
//!
//! Both are produced by the shell's config layer (the scripting language);
//! the agent core only consumes them. Config changes between turns take
//! effect on the next turn.

use crate::provider::{ModelParams, Provider};
use crate::tools::Tool;
use std::fmt;
use std::sync::Arc;

pub const DEFAULT_MAX_ITERATIONS: u32 = 100;

/// A configured model: a display name, a provider capability handle, and
/// connection parameters. Immutable after construction.
#[derive(Clone)]
pub struct Model {
    pub name: String,
    pub provider: Arc<dyn Provider>,
    pub params: ModelParams,
}

impl Model {
    pub fn new(name: impl Into<String>, provider: Arc<dyn Provider>, params: ModelParams) -> Self {
        Self {
            name: name.into(),
            provider,
            params,
        }
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("name", &self.name)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Default)]
pub struct AgentConfig {
    /// Missing model is a configuration error surfaced on the first send.
    pub model: Option<Model>,
    pub system_prompt: Option<String>,
    pub tools: Vec<Arc<dyn Tool>>,
    pub max_iterations: Option<u32>,
}

impl AgentConfig {
    /// Iteration cap for one user turn. Non-positive values fall back to
    /// the default.
    pub fn effective_max_iterations(&self) -> u32 {
        match self.max_iterations {
            Some(n) if n > 0 => n,
            _ => DEFAULT_MAX_ITERATIONS,
        }
    }
}

/// A named conversational policy: model, system prompt, tools, limits.
#[derive(Clone)]
pub struct Agent {
    pub name: String,
    pub config: AgentConfig,
}

impl Agent {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: AgentConfig::default(),
        }
    }

    // -- builder-style setters --

    pub fn with_model(mut self, model: Model) -> Self {
        self.config.model = Some(model);
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_tools(mut self, tools: Vec<Arc<dyn Tool>>) -> Self {
        self.config.tools = tools;
        self
    }

    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.config.max_iterations = Some(max);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_iterations_coercion() {
        let mut agent = Agent::new("a");
        assert_eq!(agent.config.effective_max_iterations(), DEFAULT_MAX_ITERATIONS);
        agent.config.max_iterations = Some(0);
        assert_eq!(agent.config.effective_max_iterations(), DEFAULT_MAX_ITERATIONS);
        agent.config.max_iterations = Some(5);
        assert_eq!(agent.config.effective_max_iterations(), 5);
    }
}
