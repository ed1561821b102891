//! The four LLM-backed roles: Planner, Reasoner, Evaluator, Summarizer.
//!
//! Each role is a small struct holding an `Arc<dyn LLMClient>` plus any
//! role-specific precomputed prompt material, with one or more async
//! methods that build a prompt, call the LLM, and parse the response via
//! [`crate::json_extract`]. Grounded on
//! `original_source/agent/{planner,evaluator,summarizer}/*.py` and
//! `original_source/agent/orchestrator.py`'s Reasoner-shaped calls.

mod evaluator;
mod planner;
mod reasoner;
mod summarizer;

pub use evaluator::{EvaluationResult, Evaluator, QuestionTypeAdjustment};
pub use planner::{PlanResult, Planner, RawToolCall};
pub use reasoner::Reasoner;
pub use summarizer::{SummaryResult, Summarizer};
