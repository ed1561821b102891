//! # recall-core
//!
//! A memory-retrieval ReAct agent over a temporal knowledge graph: given a
//! question and one or more backing stores exposed as tool registries, it
//! drives a bounded plan/execute/evaluate loop (optionally layered with an
//! explicit multi-step reasoning cache) until the question is answered or
//! the iteration cap is reached.
//!
//! ## Core components
//!
//! - [`config`] — `AgentConfig`, the agent's configuration surface.
//! - [`tools`] — the tool vocabulary (`Tool`, `ToolCall`, `ToolResult`, `ToolRegistry`).
//! - [`executor`] — dispatches a batch of tool calls with bounded concurrency.
//! - [`reasoning`] — `ReasoningCache`, the single mutable aggregate the loop reads and writes.
//! - [`roles`] — the four LLM-backed roles: Planner, Reasoner, Evaluator, Summarizer.
//! - [`orchestrator`] — `MemoryRetrievalAgent`, which drives the roles over the registries.
//! - [`llm`] — the LLM client abstraction (Anthropic/OpenAI/Google, batching, cost tracking).
//!
//! ## Example
//!
//! ```rust,ignore
//! use recall_core::{AgentConfig, MemoryRetrievalAgent, ToolRegistry};
//! use recall_core::llm::{AnthropicClient, ClientConfig};
//! use std::sync::Arc;
//!
//! let llm = Arc::new(AnthropicClient::new(ClientConfig::new("api-key")));
//! let mut agent = MemoryRetrievalAgent::builder()
//!     .with_llm(llm)
//!     .with_registry(ToolRegistry::new())
//!     .with_config(AgentConfig::new())
//!     .build()?;
//!
//! let result = agent.query("What did Bob work on last quarter?").await;
//! println!("{:?}", result.answer());
//! # Ok::<(), recall_core::Error>(())
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod json_extract;
pub mod llm;
pub mod orchestrator;
pub mod query;
pub mod reasoning;
pub mod roles;
pub mod tools;

pub use config::{AgentConfig, LogLevel};
pub use context::{extract_question, Message, Role};
pub use error::{Error, Result};
pub use executor::Executor;
pub use json_extract::{extract_json, parse_llm_json};
pub use llm::{
    AnthropicClient, ChatMessage, ChatRole, ClientConfig, CompletionRequest, CompletionResponse,
    LLMClient, ModelSpec, MultiProviderClient, OpenAIClient, Provider, TrackedClient,
};
pub use orchestrator::{MemoryRetrievalAgent, MemoryRetrievalAgentBuilder, QueryInput};
pub use query::{QueryResult, ReasoningTraceEntry, RetrievedMemory};
pub use reasoning::{
    GoalStatus, Hypothesis, QuestionType, ReasoningCache, ReasoningState, SubGoal, TriedQuery,
};
pub use roles::{
    EvaluationResult, Evaluator, PlanResult, Planner, QuestionTypeAdjustment, Reasoner,
    SummaryResult, Summarizer,
};
pub use tools::{
    ParamMap, ParamSchema, ParamValue, Tool, ToolCall, ToolDefinition, ToolRegistry, ToolResult,
    ToolStatus,
};
