//! LLM client abstraction.
//!
//! This module provides a unified interface for working with multiple LLM providers
//! (Anthropic, OpenAI, OpenRouter, optionally Google Gemini) plus the batching
//! primitives used by the [`crate::executor::Executor`] to fan tool calls and role
//! calls out concurrently.
//!
//! ## Example
//!
//! ```rust,ignore
//! use recall_core::llm::{AnthropicClient, ClientConfig, ChatMessage, LLMClient};
//!
//! let client = AnthropicClient::new(
//!     ClientConfig::new("your-api-key")
//!         .with_default_model("claude-3-5-sonnet-20241022")
//! );
//!
//! let response = client.chat(vec![ChatMessage::user("Hello")]).await?;
//! ```

mod batch;
mod client;
mod types;

pub use batch::{
    BatchConfig, BatchExecutor, BatchQueryResult, BatchedLLMQuery, BatchedQueryResults,
    DEFAULT_MAX_PARALLEL,
};
pub use client::{
    AnthropicClient, ClientConfig, LLMClient, MultiProviderClient, OpenAIClient, TrackedClient,
};
#[cfg(feature = "gemini")]
pub use client::GoogleClient;
pub use types::{
    CacheControl, ChatMessage, ChatRole, CompletionRequest, CompletionResponse, CostTracker,
    EmbeddingRequest, EmbeddingResponse, ModelCosts, ModelSpec, ModelTier, Provider, StopReason,
    TierBreakdown, TierCosts, TokenUsage,
};
