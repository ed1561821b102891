//! Agent configuration surface.
//!
//! Grounded on `original_source/agent/models.py`'s `AgentConfig` dataclass,
//! expressed as a consuming-self builder in the teacher's `ClientConfig`
//! idiom (`src/llm/client.rs`).

use std::time::Duration;

/// Verbosity of `tracing` events emitted by the orchestrator and roles.
///
/// Maps onto the original's `log_level` string field
/// (`"minimal" | "moderate" | "verbose"`), reinterpreted as a `tracing`
/// filter level rather than a hand-rolled printer verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LogLevel {
    /// Warnings and errors only.
    Minimal,
    /// Plan/execute/evaluate events at info level (default).
    #[default]
    Moderate,
    /// Full debug tracing, including LLM prompts/responses.
    Verbose,
}

impl LogLevel {
    /// The `tracing::Level` this verbosity maps to.
    pub fn tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Minimal => tracing::Level::WARN,
            LogLevel::Moderate => tracing::Level::INFO,
            LogLevel::Verbose => tracing::Level::DEBUG,
        }
    }
}

/// Configuration for a `MemoryRetrievalAgent`.
///
/// Defaults mirror `original_source/agent/models.py::AgentConfig`:
/// `max_iterations=10`, `parallel_tools=True`, `tool_timeout=30.0`,
/// `enable_cache=True` (reserved), `log_level="moderate"`.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Maximum ReAct loop iterations before forced termination.
    pub max_iterations: u32,
    /// Whether `Executor` dispatches a multi-call batch concurrently.
    pub parallel_tools: bool,
    /// Maximum concurrent tool calls when `parallel_tools` is set.
    pub max_tool_workers: usize,
    /// Per-call timeout for tool execution.
    pub tool_timeout: Duration,
    /// Reserved for future tool-result caching (spec §9); has no effect on
    /// behavior today.
    pub enable_cache: bool,
    /// Logging verbosity.
    pub log_level: LogLevel,
    /// Whether the Reasoner/reasoning-cache path is engaged at all. When
    /// `false`, the orchestrator runs the plain plan/execute/evaluate loop
    /// with no `ReasoningState`.
    pub enable_reasoning: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            parallel_tools: true,
            max_tool_workers: 5,
            tool_timeout: Duration::from_secs(30),
            enable_cache: true,
            log_level: LogLevel::Moderate,
            enable_reasoning: true,
        }
    }
}

impl AgentConfig {
    /// Create a config with defaults matching the original agent.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_parallel_tools(mut self, parallel_tools: bool) -> Self {
        self.parallel_tools = parallel_tools;
        self
    }

    pub fn with_max_tool_workers(mut self, max_tool_workers: usize) -> Self {
        self.max_tool_workers = max_tool_workers;
        self
    }

    pub fn with_tool_timeout(mut self, tool_timeout: Duration) -> Self {
        self.tool_timeout = tool_timeout;
        self
    }

    pub fn with_enable_cache(mut self, enable_cache: bool) -> Self {
        self.enable_cache = enable_cache;
        self
    }

    pub fn with_log_level(mut self, log_level: LogLevel) -> Self {
        self.log_level = log_level;
        self
    }

    pub fn with_enable_reasoning(mut self, enable_reasoning: bool) -> Self {
        self.enable_reasoning = enable_reasoning;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_original_agent_config() {
        let config = AgentConfig::default();
        assert_eq!(config.max_iterations, 10);
        assert!(config.parallel_tools);
        assert_eq!(config.tool_timeout, Duration::from_secs(30));
        assert!(config.enable_cache);
        assert_eq!(config.log_level, LogLevel::Moderate);
    }

    #[test]
    fn builder_overrides_defaults() {
        let config = AgentConfig::new()
            .with_max_iterations(3)
            .with_parallel_tools(false);
        assert_eq!(config.max_iterations, 3);
        assert!(!config.parallel_tools);
    }
}
