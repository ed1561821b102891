//! Reasoner: classifies the question, folds tool results into known facts,
//! and decides whether enough has been gathered to conclude.
//!
//! Grounded on `original_source/agent/orchestrator.py`'s Reasoner-shaped
//! calls (`_analyze_question`, `_integrate_tool_results`,
//! `_attempt_conclusion`) layered over `reasoning.rs`'s `ReasoningCache`.

use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::Result;
use crate::json_extract::parse_llm_json;
use crate::llm::{ChatMessage, LLMClient};
use crate::reasoning::{QuestionType, ReasoningCache};
use crate::tools::{ToolCall, ToolResult};

#[derive(Debug, Default, Deserialize)]
struct RawAnalysis {
    #[serde(default)]
    question_type: String,
    #[serde(default)]
    sub_goals: Vec<String>,
    #[serde(default)]
    missing_info: Vec<String>,
    #[serde(default)]
    initial_hypotheses: Vec<RawHypothesis>,
}

#[derive(Debug, Deserialize)]
struct RawHypothesis {
    content: String,
    #[serde(default)]
    confidence: f64,
}

#[derive(Debug, Default, Deserialize)]
struct RawConclusion {
    #[serde(default)]
    can_conclude: bool,
    #[serde(default)]
    conclusion: Option<String>,
    #[serde(default)]
    confidence: f64,
    #[serde(default)]
    reasoning_steps: Vec<String>,
    #[serde(default)]
    evidence: Vec<String>,
    #[serde(default)]
    new_hypothesis: Option<RawHypothesis>,
    #[serde(default)]
    still_missing: Vec<String>,
}

const ANALYZE_SYSTEM_PROMPT: &str = "Classify the question and seed the reasoning state. \
Respond with JSON: {\"question_type\": \"direct\"|\"reasoning\"|\"temporal_reasoning\", \
\"sub_goals\": [string], \"missing_info\": [string], \
\"initial_hypotheses\": [{\"content\", \"confidence\"}]}.";

const CONCLUDE_SYSTEM_PROMPT: &str = "Given the accumulated reasoning state, decide whether \
enough evidence has been gathered to answer the question. Respond with JSON: \
{\"can_conclude\": bool, \"conclusion\"?, \"confidence\"?, \"reasoning_steps\": [string], \
\"evidence\": [string], \"new_hypothesis\"?: {\"content\", \"confidence\"}, \
\"still_missing\": [string]}.";

/// Ordinal/temporal markers that route a question to `TemporalReasoning`
/// when the classification call fails to parse (spec §4.4 keyword
/// fallback, English-only per the Open Question resolution in
/// `SPEC_FULL.md`).
const TEMPORAL_MARKERS: &[&str] = &[
    "before", "after", "first", "last", "earliest", "latest", "when did", "order",
];
/// Relational/comparative markers routing to `Reasoning`.
const REASONING_MARKERS: &[&str] = &[
    "why", "how", "compare", "relationship", "because", "caused", "led to",
];

pub struct Reasoner {
    llm: Arc<dyn LLMClient>,
}

impl Reasoner {
    pub fn new(llm: Arc<dyn LLMClient>) -> Self {
        Self { llm }
    }

    /// Classifies `question` and seeds `cache`'s sub-goals/missing-info/
    /// hypotheses. Falls back to a keyword heuristic if the LLM response
    /// doesn't parse (spec §4.4).
    pub async fn analyze(&self, cache: &mut ReasoningCache, question: &str) -> Result<()> {
        let messages = vec![
            ChatMessage::system(ANALYZE_SYSTEM_PROMPT),
            ChatMessage::user(question),
        ];

        let parsed = match self.llm.chat(messages).await {
            Ok(response) => parse_llm_json::<RawAnalysis>(&response.content),
            Err(_) => None,
        };

        let (question_type, raw) = match parsed {
            Some(raw) => {
                let question_type = raw
                    .question_type
                    .parse::<QuestionType>()
                    .unwrap_or_else(|_| classify_by_keyword(question));
                (question_type, raw)
            }
            None => (classify_by_keyword(question), RawAnalysis::default()),
        };

        cache.init_state(question.to_string(), question_type);
        for goal in raw.sub_goals {
            cache.add_sub_goal(goal, Vec::new())?;
        }
        for info in raw.missing_info {
            cache.add_missing_info(info)?;
        }
        for hypothesis in raw.initial_hypotheses {
            cache.add_hypothesis(hypothesis.content, hypothesis.confidence)?;
        }
        Ok(())
    }

    /// Deterministic, no LLM call: folds `(call, result)` pairs into
    /// entity/relation facts and known facts, dispatching on `tool_name`
    /// against spec §6's per-tool result shapes
    /// (`search_entity`->`entities[]`, `get_entity_by_id`/
    /// `get_entity_at_time`->`entity`, `find_relations`->`relations[]`,
    /// `find_paths`->`paths[].edges[]`, `get_version_history`->
    /// `versions[]`/`earliest_time`/`latest_time`, `get_memory_cache`->
    /// `cache`). The id for the latter two lives only in the originating
    /// call's parameters, not the result payload, hence the paired input —
    /// matching `original_source/agent/orchestrator.py::_integrate_tool_results`.
    pub fn integrate_facts(
        &self,
        cache: &mut ReasoningCache,
        calls: &[ToolCall],
        tool_results: &[ToolResult],
    ) -> Result<()> {
        for (call, result) in calls.iter().zip(tool_results.iter()) {
            if let Some(data) = &result.data {
                match result.tool_name.as_str() {
                    "search_entity" => {
                        for entity in data.get("entities").and_then(|v| v.as_array()).into_iter().flatten() {
                            if let Some((id, attrs)) = entity_id_and_attrs(entity) {
                                cache.add_entity_fact(id, attrs)?;
                            }
                        }
                    }
                    "get_entity_by_id" | "get_entity_at_time" => {
                        if let Some(entity) = data.get("entity") {
                            if let Some((id, attrs)) = entity_id_and_attrs(entity) {
                                cache.add_entity_fact(id, attrs)?;
                            }
                        }
                    }
                    "find_relations" => {
                        for relation in data.get("relations").and_then(|v| v.as_array()).into_iter().flatten() {
                            if let Some((id, attrs)) = relation_id_and_attrs(relation) {
                                cache.add_relation_fact(id, attrs)?;
                            }
                        }
                    }
                    "find_paths" => {
                        for path in data.get("paths").and_then(|v| v.as_array()).into_iter().flatten() {
                            for edge in path.get("edges").and_then(|v| v.as_array()).into_iter().flatten() {
                                if let Some((id, attrs)) = relation_id_and_attrs(edge) {
                                    cache.add_relation_fact(id, attrs)?;
                                }
                            }
                        }
                    }
                    "get_version_history" => {
                        if let Some(entity_id) = call.parameters.get("entity_id").and_then(|v| v.as_str()) {
                            let mut record = serde_json::json!({
                                "versions": data.get("versions").cloned().unwrap_or(serde_json::Value::Array(Vec::new())),
                            });
                            if let Some(earliest) = data.get("earliest_time") {
                                record["earliest_time"] = earliest.clone();
                            }
                            if let Some(latest) = data.get("latest_time") {
                                record["latest_time"] = latest.clone();
                            }
                            cache.add_known_fact(format!("version_history_{entity_id}"), record)?;
                        }
                    }
                    "get_memory_cache" => {
                        if let Some(memory_cache_id) =
                            call.parameters.get("memory_cache_id").and_then(|v| v.as_str())
                        {
                            if let Some(memory_cache) = data.get("cache") {
                                cache.add_known_fact(
                                    format!("memory_cache_{memory_cache_id}"),
                                    memory_cache.clone(),
                                )?;
                            }
                        }
                    }
                    _ => {}
                }
            }

            if result.is_success() {
                if let Some(state) = cache.state() {
                    let satisfied: Vec<String> = state
                        .missing_info
                        .iter()
                        .filter(|info| {
                            result.tool_name.contains(info.as_str())
                                || result.data.as_ref().is_some_and(|d| mentions(d, info))
                        })
                        .cloned()
                        .collect();
                    for info in satisfied {
                        cache.remove_missing_info(&info)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Attempts to conclude from the accumulated state. On success, records
    /// the conclusion plus numbered `reasoning_step_n`/`evidence_n` known
    /// facts; on failure, may add/update hypotheses and missing info.
    /// Returns `(concluded, conclusion, confidence)`.
    pub async fn try_conclude(&self, cache: &mut ReasoningCache) -> Result<(bool, Option<String>, f64)> {
        let summary = cache.state_summary();
        let messages = vec![
            ChatMessage::system(CONCLUDE_SYSTEM_PROMPT),
            ChatMessage::user(summary),
        ];

        let Ok(response) = self.llm.chat(messages).await else {
            return Ok((false, None, 0.0));
        };
        let Some(raw) = parse_llm_json::<RawConclusion>(&response.content) else {
            return Ok((false, None, 0.0));
        };

        if raw.can_conclude {
            let conclusion = raw.conclusion.clone().unwrap_or_default();
            cache.set_conclusion(conclusion.clone(), raw.confidence)?;
            for (i, step) in raw.reasoning_steps.iter().enumerate() {
                cache.add_known_fact(
                    format!("reasoning_step_{}", i + 1),
                    serde_json::Value::String(step.clone()),
                )?;
            }
            for (i, evidence) in raw.evidence.iter().enumerate() {
                cache.add_known_fact(
                    format!("evidence_{}", i + 1),
                    serde_json::Value::String(evidence.clone()),
                )?;
            }
            Ok((true, Some(conclusion), raw.confidence))
        } else {
            if let Some(hypothesis) = raw.new_hypothesis {
                cache.add_hypothesis(hypothesis.content, hypothesis.confidence)?;
            }
            for info in raw.still_missing {
                cache.add_missing_info(info)?;
            }
            Ok((false, None, 0.0))
        }
    }
}

fn mentions(data: &serde_json::Value, needle: &str) -> bool {
    data.to_string().to_lowercase().contains(&needle.to_lowercase())
}

/// Splits an entity object into its `entity_id` and every other field as
/// attributes, the shape `search_entity`/`get_entity_by_id`/
/// `get_entity_at_time` return per entity.
fn entity_id_and_attrs(value: &serde_json::Value) -> Option<(String, HashMap<String, serde_json::Value>)> {
    let obj = value.as_object()?;
    let entity_id = obj.get("entity_id")?.as_str()?.to_string();
    let attrs = obj
        .iter()
        .filter(|(k, _)| k.as_str() != "entity_id")
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    Some((entity_id, attrs))
}

/// Mirrors `entity_id_and_attrs` for `relation_id`-keyed objects
/// (`find_relations`'s `relations[]` and `find_paths`'s `edges[]`).
fn relation_id_and_attrs(value: &serde_json::Value) -> Option<(String, HashMap<String, serde_json::Value>)> {
    let obj = value.as_object()?;
    let relation_id = obj.get("relation_id")?.as_str()?.to_string();
    let attrs = obj
        .iter()
        .filter(|(k, _)| k.as_str() != "relation_id")
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    Some((relation_id, attrs))
}

fn classify_by_keyword(question: &str) -> QuestionType {
    let lower = question.to_lowercase();
    if TEMPORAL_MARKERS.iter().any(|m| lower.contains(m)) {
        QuestionType::TemporalReasoning
    } else if REASONING_MARKERS.iter().any(|m| lower.contains(m)) {
        QuestionType::Reasoning
    } else {
        QuestionType::Direct
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_by_keyword_routes_temporal_questions() {
        assert_eq!(
            classify_by_keyword("What happened before the meeting?"),
            QuestionType::TemporalReasoning
        );
    }

    #[test]
    fn classify_by_keyword_routes_reasoning_questions() {
        assert_eq!(
            classify_by_keyword("Why did the project get delayed?"),
            QuestionType::Reasoning
        );
    }

    #[test]
    fn classify_by_keyword_defaults_to_direct() {
        assert_eq!(classify_by_keyword("What is Bob's email?"), QuestionType::Direct);
    }

    #[test]
    fn integrate_facts_merges_entity_attributes_from_search_entity() {
        let mut cache = ReasoningCache::new();
        cache.init_state("q", QuestionType::Direct);

        let call = crate::tools::ToolCall::new("search_entity", crate::tools::ParamMap::new());
        let result = ToolResult::success(
            call.call_id.clone(),
            "search_entity".to_string(),
            serde_json::json!({"entities": [{"entity_id": "e1", "name": "Bob"}]}),
            5,
        );

        let reasoner = Reasoner::new(Arc::new(unreachable_llm()));
        reasoner.integrate_facts(&mut cache, &[call], &[result]).unwrap();

        let state = cache.state().unwrap();
        assert_eq!(
            state.entity_facts.get("e1").unwrap().get("name").unwrap(),
            "Bob"
        );
    }

    #[test]
    fn integrate_facts_keys_version_history_by_call_parameters() {
        let mut cache = ReasoningCache::new();
        cache.init_state("q", QuestionType::Direct);

        let mut params = crate::tools::ParamMap::new();
        params.insert(
            "entity_id".to_string(),
            crate::tools::ParamValue::String("e1".to_string()),
        );
        let call = crate::tools::ToolCall::new("get_version_history", params);
        let result = ToolResult::success(
            call.call_id.clone(),
            "get_version_history".to_string(),
            serde_json::json!({"versions": [{"v": 1}], "earliest_time": "2024-01-01T00:00:00Z"}),
            5,
        );

        let reasoner = Reasoner::new(Arc::new(unreachable_llm()));
        reasoner.integrate_facts(&mut cache, &[call], &[result]).unwrap();

        let state = cache.state().unwrap();
        let fact = state.known_facts.get("version_history_e1").unwrap();
        assert_eq!(fact["earliest_time"], "2024-01-01T00:00:00Z");
    }

    #[test]
    fn integrate_facts_merges_relation_attributes_from_find_relations() {
        let mut cache = ReasoningCache::new();
        cache.init_state("q", QuestionType::Direct);

        let call = crate::tools::ToolCall::new("find_relations", crate::tools::ParamMap::new());
        let result = ToolResult::success(
            call.call_id.clone(),
            "find_relations".to_string(),
            serde_json::json!({"relations": [{"relation_id": "r1", "type": "manages"}]}),
            5,
        );

        let reasoner = Reasoner::new(Arc::new(unreachable_llm()));
        reasoner.integrate_facts(&mut cache, &[call], &[result]).unwrap();

        let state = cache.state().unwrap();
        assert_eq!(state.relation_facts.get("r1").unwrap()["type"], "manages");
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
