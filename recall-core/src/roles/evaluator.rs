//! Evaluator: decides whether collected information is sufficient to stop
//! the ReAct loop, and whether the question's classification should change
//! mid-flight.
//!
//! Grounded on `original_source/agent/evaluator/evaluator.py`
//! (`evaluate`, `quick_check`).

use serde::Deserialize;
use std::sync::Arc;

use crate::json_extract::parse_llm_json;
use crate::llm::{ChatMessage, LLMClient};
use crate::reasoning::ReasoningState;
use crate::tools::ToolResult;

/// A proposed change to the question's classification, surfaced when the
/// Evaluator decides the initial classification was wrong.
#[derive(Debug, Clone, Deserialize)]
pub struct QuestionTypeAdjustment {
    pub should_adjust: bool,
    #[serde(default)]
    pub new_type: Option<String>,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EvaluationResult {
    pub is_sufficient: bool,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub memories_to_keep: Vec<String>,
    #[serde(default)]
    pub next_action: String,
    #[serde(default)]
    pub question_type_adjustment: Option<QuestionTypeAdjustment>,
}

impl EvaluationResult {
    fn insufficient(reasoning: impl Into<String>) -> Self {
        Self {
            is_sufficient: false,
            reasoning: reasoning.into(),
            memories_to_keep: Vec::new(),
            next_action: "continue".to_string(),
            question_type_adjustment: None,
        }
    }
}

/// Sufficiency keywords used as a fallback when the LLM response fails to
/// parse as JSON (English-only, per the Open Question resolution in
/// `SPEC_FULL.md`).
const SUFFICIENCY_MARKERS: &[&str] = &["sufficient", "enough", "can_reason", "can answer"];

const SIMPLE_PROMPT: &str = "Decide whether the collected information is sufficient to answer \
the question. Respond with JSON: {\"is_sufficient\": bool, \"reasoning\", \
\"memories_to_keep\": [string], \"next_action\"}.";

const REASONING_AWARE_PROMPT: &str = "Decide whether the collected information plus the \
reasoning state below is sufficient to answer the question. You may also propose changing the \
question's classification if it was misclassified. Respond with JSON: {\"is_sufficient\": bool, \
\"reasoning\", \"memories_to_keep\": [string], \"next_action\", \
\"question_type_adjustment\"?: {\"should_adjust\": bool, \"new_type\"?, \"reason\"}}.";

pub struct Evaluator {
    llm: Arc<dyn LLMClient>,
}

impl Evaluator {
    pub fn new(llm: Arc<dyn LLMClient>) -> Self {
        Self { llm }
    }

    /// Dispatches the "simple" prompt when no reasoning state is active (or
    /// it's a `Direct` question), else the reasoning-aware variant that can
    /// also request a classification change (spec §4.5).
    pub async fn evaluate(
        &self,
        question: &str,
        collected_info: &str,
        iteration: u32,
        reasoning_state: Option<&ReasoningState>,
    ) -> EvaluationResult {
        let is_reasoning_aware = reasoning_state
            .map(|s| s.question_type != crate::reasoning::QuestionType::Direct)
            .unwrap_or(false);

        let system_prompt = if is_reasoning_aware {
            REASONING_AWARE_PROMPT
        } else {
            SIMPLE_PROMPT
        };

        let mut request = format!("Question: {question}\nIteration: {iteration}\nCollected:\n{collected_info}\n");
        if let Some(state) = reasoning_state {
            request.push_str(&format!("\nReasoning state:\n{}\n", state_digest(state)));
        }

        let messages = vec![ChatMessage::system(system_prompt), ChatMessage::user(request)];

        match self.llm.chat(messages).await {
            Ok(response) => parse_llm_json::<EvaluationResult>(&response.content)
                .unwrap_or_else(|| keyword_fallback(&response.content)),
            Err(err) => EvaluationResult::insufficient(format!("evaluation call failed: {err}")),
        }
    }

    /// No-LLM fast path applied before the full evaluation call, matching
    /// `original_source/agent/evaluator/evaluator.py::quick_check`'s exact
    /// three rules.
    pub fn quick_check(&self, collected_results: &[ToolResult]) -> bool {
        let Some(last) = collected_results.last() else {
            return true;
        };
        let Some(data) = &last.data else {
            return false;
        };
        let has_entities_or_relations = data.get("entities").is_some() || data.get("relations").is_some();
        if has_entities_or_relations {
            return true;
        }
        if last.is_success() {
            let hit_count = data
                .get("results")
                .and_then(|v| v.as_array())
                .map(|a| a.len())
                .unwrap_or(usize::MAX);
            if hit_count == 0 {
                return true;
            }
        }
        false
    }
}

fn state_digest(state: &ReasoningState) -> String {
    format!(
        "type={:?} sub_goals={} hypotheses={} missing_info={}",
        state.question_type,
        state.sub_goals.len(),
        state.hypotheses.len(),
        state.missing_info.len()
    )
}

fn keyword_fallback(content: &str) -> EvaluationResult {
    let lower = content.to_lowercase();
    let is_sufficient = SUFFICIENCY_MARKERS.iter().any(|m| lower.contains(m));
    EvaluationResult {
        is_sufficient,
        reasoning: "keyword fallback: response did not parse as JSON".to_string(),
        memories_to_keep: Vec::new(),
        next_action: if is_sufficient { "stop".to_string() } else { "continue".to_string() },
        question_type_adjustment: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quick_check_true_with_no_results_yet() {
        let evaluator = Evaluator::new(Arc::new(unreachable_llm()));
        assert!(evaluator.quick_check(&[]));
    }

    #[test]
    fn quick_check_true_when_entities_present() {
        let evaluator = Evaluator::new(Arc::new(unreachable_llm()));
        let result = ToolResult::success(
            "c1".to_string(),
            "search".to_string(),
            serde_json::json!({"entities": [{"id": "e1"}]}),
            1,
        );
        assert!(evaluator.quick_check(&[result]));
    }

    #[test]
    fn quick_check_true_on_successful_zero_hit_search() {
        let evaluator = Evaluator::new(Arc::new(unreachable_llm()));
        let result = ToolResult::success(
            "c1".to_string(),
            "search".to_string(),
            serde_json::json!({"results": []}),
            1,
        );
        assert!(evaluator.quick_check(&[result]));
    }

    #[test]
    fn quick_check_false_when_more_could_be_found() {
        let evaluator = Evaluator::new(Arc::new(unreachable_llm()));
        let result = ToolResult::success(
            "c1".to_string(),
            "search".to_string(),
            serde_json::json!({"results": [{"id": "e1"}]}),
            1,
        );
        assert!(!evaluator.quick_check(&[result]));
    }

    #[test]
    fn keyword_fallback_detects_sufficiency_language() {
        let result = keyword_fallback("I believe this is sufficient to answer.");
        assert!(result.is_sufficient);
    }

    #[test]
    fn keyword_fallback_defaults_to_continue() {
        let result = keyword_fallback("not json at all");
        assert!(!result.is_sufficient);
    }

    fn unreachable_llm() -> impl LLMClient {
        struct DummyLlm;
        #[async_trait::async_trait]
        impl LLMClient for DummyLlm {
            async fn complete(
                &self,
                _request: crate::llm::CompletionRequest,
            ) -> crate::error::Result<crate::llm::CompletionResponse> {
                unreachable!()
            }
            async fn embed(
                &self,
                _request: crate::llm::EmbeddingRequest,
            ) -> crate::error::Result<crate::llm::EmbeddingResponse> {
                unreachable!()
            }
            fn provider(&self) -> crate::llm::Provider {
                crate::llm::Provider::Anthropic
            }
            fn available_models(&self) -> Vec<crate::llm::ModelSpec> {
                Vec::new()
            }
        }
        DummyLlm
    }
}
