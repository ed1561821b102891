//! Error types for recall-core.

use thiserror::Error;

/// Result type alias using recall-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during memory-retrieval agent operations.
///
/// Tool failures and malformed LLM responses are *not* represented here:
/// per the error-handling design, those are folded into `ToolResult`/role
/// outputs and surfaced through the reasoning trace, never raised. `Error`
/// is reserved for programmer-error invariant violations and fatal,
/// non-recoverable failures.
#[derive(Error, Debug)]
pub enum Error {
    /// A tool call named a tool that isn't registered in any `ToolRegistry`.
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    /// An operation that requires an initialized `ReasoningState` was called
    /// before `ReasoningCache::init_state`.
    #[error("reasoning cache not initialized: {0}")]
    CacheUninitialized(&'static str),

    /// `add_sub_goal` would introduce a cycle in the goal dependency graph.
    #[error("adding sub-goal would introduce a dependency cycle at {goal_id}")]
    GoalCycle { goal_id: String },

    /// `add_sub_goal` named a `depends_on` id that doesn't exist.
    #[error("sub-goal depends on unknown goal id: {0}")]
    UnknownDependency(String),

    /// LLM API error (transport/provider level).
    #[error("LLM API error: {provider} - {message}")]
    LlmApi { provider: String, message: String },

    /// Operation timed out.
    #[error("operation timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Internal invariant violation.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an LLM API error.
    pub fn llm_api(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::LlmApi {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(duration_ms: u64) -> Self {
        Self::Timeout { duration_ms }
    }
}
