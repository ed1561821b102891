//! Summarizer: turns the final reasoning state into a structured answer
//! plus a context blob suitable for a downstream LLM prompt.
//!
//! Grounded on `original_source/agent/summarizer/summarizer.py`'s
//! three-step `summarize` (filter -> structured summary -> context_text)
//! and its no-LLM `quick_summary` fallback.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::json_extract::parse_llm_json;
use crate::llm::{ChatMessage, LLMClient};
use crate::reasoning::ReasoningState;

/// The Summarizer's final structured output.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SummaryResult {
    pub question: String,
    #[serde(default)]
    pub answer: String,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub answer_type: String,
    #[serde(default)]
    pub reasoning_chain: Vec<String>,
    #[serde(default)]
    pub supporting_evidence: Vec<String>,
    #[serde(default)]
    pub entities_used: Vec<String>,
    #[serde(default)]
    pub relations_used: Vec<String>,
    #[serde(default)]
    pub limitations: Vec<String>,
    #[serde(default)]
    pub context_text: String,
}

#[derive(Debug, Default, Deserialize)]
struct RawFilter {
    #[serde(default)]
    relevant_facts: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawRelevanceFilter {
    #[serde(default)]
    entities: Vec<RawRelevantId>,
    #[serde(default)]
    relations: Vec<RawRelevantId>,
}

#[derive(Debug, Deserialize)]
struct RawRelevantId {
    id: String,
    #[serde(default = "default_relevance_score")]
    relevance_score: f64,
}

fn default_relevance_score() -> f64 {
    1.0
}

#[derive(Debug, Default, Deserialize)]
struct RawSummary {
    #[serde(default)]
    answer: String,
    #[serde(default)]
    confidence: f64,
    #[serde(default)]
    answer_type: String,
    #[serde(default)]
    reasoning_chain: Vec<String>,
    #[serde(default)]
    supporting_evidence: Vec<String>,
    #[serde(default)]
    entities_used: Vec<String>,
    #[serde(default)]
    relations_used: Vec<String>,
    #[serde(default)]
    limitations: Vec<String>,
}

const FILTER_PROMPT: &str = "From the known facts below, list only the ones relevant to the \
question. Respond with JSON: {\"relevant_facts\": [string]}.";

const SUMMARY_PROMPT: &str = "Produce a structured answer to the question from the relevant \
facts. Respond with JSON: {\"answer\", \"confidence\", \"answer_type\", \
\"reasoning_chain\": [string], \"supporting_evidence\": [string], \
\"entities_used\": [string], \"relations_used\": [string], \"limitations\": [string]}.";

const CONTEXT_PROMPT: &str = "Render the relevant facts as a concise prose context block for a \
downstream assistant to read. Respond with plain text, no JSON.";

const FILTER_RELEVANCE_PROMPT: &str = "From the known entity/relation facts below, pick the ones \
relevant to the question and score each one's relevance from 0 to 1. Respond with JSON: \
{\"entities\": [{\"id\", \"relevance_score\"}], \"relations\": [{\"id\", \"relevance_score\"}]}.";

pub struct Summarizer {
    llm: Arc<dyn LLMClient>,
}

impl Summarizer {
    pub fn new(llm: Arc<dyn LLMClient>) -> Self {
        Self { llm }
    }

    /// Three LLM calls: filter known facts down to the relevant subset,
    /// produce a structured summary from them, then render a prose
    /// context block. Falls back to every stored fact if the filter step
    /// returns nothing (spec §4.6).
    pub async fn summarize(&self, state: &ReasoningState, filter_info: bool) -> SummaryResult {
        let all_facts = render_known_facts(state);

        let relevant_facts = if filter_info {
            let messages = vec![
                ChatMessage::system(FILTER_PROMPT),
                ChatMessage::user(format!("Question: {}\nFacts:\n{}", state.question, all_facts)),
            ];
            match self.llm.chat(messages).await {
                Ok(response) => parse_llm_json::<RawFilter>(&response.content)
                    .map(|raw| raw.relevant_facts)
                    .filter(|facts| !facts.is_empty())
                    .map(|facts| facts.join("\n"))
                    .unwrap_or_else(|| all_facts.clone()),
                Err(_) => all_facts.clone(),
            }
        } else {
            all_facts.clone()
        };

        let summary_messages = vec![
            ChatMessage::system(SUMMARY_PROMPT),
            ChatMessage::user(format!(
                "Question: {}\nRelevant facts:\n{}",
                state.question, relevant_facts
            )),
        ];
        let raw_summary = match self.llm.chat(summary_messages).await {
            Ok(response) => parse_llm_json::<RawSummary>(&response.content).unwrap_or_default(),
            Err(_) => RawSummary::default(),
        };

        let context_messages = vec![
            ChatMessage::system(CONTEXT_PROMPT),
            ChatMessage::user(relevant_facts.clone()),
        ];
        let context_text = match self.llm.chat(context_messages).await {
            Ok(response) => response.content,
            Err(_) => relevant_facts,
        };

        SummaryResult {
            question: state.question.clone(),
            answer: raw_summary.answer,
            confidence: raw_summary.confidence.clamp(0.0, 1.0),
            answer_type: raw_summary.answer_type,
            reasoning_chain: raw_summary.reasoning_chain,
            supporting_evidence: raw_summary.supporting_evidence,
            entities_used: raw_summary.entities_used,
            relations_used: raw_summary.relations_used,
            limitations: raw_summary.limitations,
            context_text,
        }
    }

    /// Filters the cache's entity/relation facts down to the subset
    /// relevant to the question, each joined back to the cache by id and
    /// annotated with a relevance score (spec §4.6 item 1). Falls back to
    /// every stored entity/relation fact, each scored 1.0, if the LLM
    /// returns nothing.
    pub async fn filter(&self, state: &ReasoningState) -> (Vec<serde_json::Value>, Vec<serde_json::Value>) {
        if state.entity_facts.is_empty() && state.relation_facts.is_empty() {
            return (Vec::new(), Vec::new());
        }

        let facts = render_known_facts(state);
        let messages = vec![
            ChatMessage::system(FILTER_RELEVANCE_PROMPT),
            ChatMessage::user(format!("Question: {}\nFacts:\n{}", state.question, facts)),
        ];

        let raw = match self.llm.chat(messages).await {
            Ok(response) => parse_llm_json::<RawRelevanceFilter>(&response.content),
            Err(_) => None,
        };

        match raw {
            Some(raw) if !raw.entities.is_empty() || !raw.relations.is_empty() => {
                let entities = raw
                    .entities
                    .iter()
                    .filter_map(|r| join_entity(state, &r.id, r.relevance_score))
                    .collect();
                let relations = raw
                    .relations
                    .iter()
                    .filter_map(|r| join_relation(state, &r.id, r.relevance_score))
                    .collect();
                (entities, relations)
            }
            _ => (all_entities(state), all_relations(state)),
        }
    }

    /// Deterministic, no LLM calls: builds a `SummaryResult` straight from
    /// stored facts and the conclusion, if any — the fallback path used
    /// when the caller cannot afford another round trip.
    pub fn quick_summary(&self, state: &ReasoningState) -> SummaryResult {
        let context_text = render_known_facts(state);
        SummaryResult {
            question: state.question.clone(),
            answer: state.conclusion.clone().unwrap_or_default(),
            confidence: state.confidence,
            answer_type: "quick".to_string(),
            reasoning_chain: Vec::new(),
            supporting_evidence: state
                .entity_facts
                .keys()
                .chain(state.relation_facts.keys())
                .cloned()
                .collect(),
            entities_used: state.entity_facts.keys().cloned().collect(),
            relations_used: state.relation_facts.keys().cloned().collect(),
            limitations: if state.conclusion.is_none() {
                vec!["no conclusion reached before summarization".to_string()]
            } else {
                Vec::new()
            },
            context_text,
        }
    }
}

fn join_entity(state: &ReasoningState, entity_id: &str, relevance_score: f64) -> Option<serde_json::Value> {
    let attrs = state.entity_facts.get(entity_id)?;
    let mut record = serde_json::to_value(attrs).ok()?;
    let obj = record.as_object_mut()?;
    obj.insert("entity_id".to_string(), serde_json::Value::String(entity_id.to_string()));
    obj.insert("relevance_score".to_string(), serde_json::json!(relevance_score.clamp(0.0, 1.0)));
    Some(record)
}

fn join_relation(state: &ReasoningState, relation_id: &str, relevance_score: f64) -> Option<serde_json::Value> {
    let attrs = state.relation_facts.get(relation_id)?;
    let mut record = serde_json::to_value(attrs).ok()?;
    let obj = record.as_object_mut()?;
    obj.insert("relation_id".to_string(), serde_json::Value::String(relation_id.to_string()));
    obj.insert("relevance_score".to_string(), serde_json::json!(relevance_score.clamp(0.0, 1.0)));
    Some(record)
}

fn all_entities(state: &ReasoningState) -> Vec<serde_json::Value> {
    state
        .entity_facts
        .keys()
        .filter_map(|id| join_entity(state, id, 1.0))
        .collect()
}

fn all_relations(state: &ReasoningState) -> Vec<serde_json::Value> {
    state
        .relation_facts
        .keys()
        .filter_map(|id| join_relation(state, id, 1.0))
        .collect()
}

fn render_known_facts(state: &ReasoningState) -> String {
    let mut lines = Vec::new();
    for (key, value) in &state.known_facts {
        lines.push(format!("{key}: {value}"));
    }
    for (entity_id, attrs) in &state.entity_facts {
        lines.push(format!("entity {entity_id}: {attrs:?}"));
    }
    for (relation_id, attrs) in &state.relation_facts {
        lines.push(format!("relation {relation_id}: {attrs:?}"));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reasoning::{QuestionType, ReasoningCache};

    fn state_with_conclusion() -> ReasoningState {
        let mut cache = ReasoningCache::new();
        cache.init_state("What is Bob's role?", QuestionType::Direct);
        cache
            .add_entity_fact("e1", [("name".to_string(), serde_json::json!("Bob"))].into())
            .unwrap();
        cache.set_conclusion("Bob is the lead engineer.", 0.9).unwrap();
        cache.state().unwrap().clone()
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

    #[test]
    fn quick_summary_uses_conclusion_and_confidence_without_llm() {
        let state = state_with_conclusion();
        let summarizer = Summarizer::new(Arc::new(unreachable_llm()));
        let result = summarizer.quick_summary(&state);
        assert_eq!(result.answer, "Bob is the lead engineer.");
        assert_eq!(result.confidence, 0.9);
        assert!(result.limitations.is_empty());
        assert!(result.entities_used.contains(&"e1".to_string()));
    }

    struct ScriptedLlm(String);

    #[async_trait::async_trait]
    impl LLMClient for ScriptedLlm {
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
        async fn chat(&self, _messages: Vec<ChatMessage>) -> crate::error::Result<ChatMessage> {
            Ok(ChatMessage::assistant(self.0.clone()))
        }
    }

    #[tokio::test]
    async fn filter_joins_llm_picked_ids_back_to_the_cache() {
        let state = state_with_conclusion();
        let summarizer = Summarizer::new(Arc::new(ScriptedLlm(
            r#"{"entities": [{"id": "e1", "relevance_score": 0.7}], "relations": []}"#.to_string(),
        )));
        let (entities, relations) = summarizer.filter(&state).await;
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0]["entity_id"], "e1");
        assert_eq!(entities[0]["relevance_score"], 0.7);
        assert!(relations.is_empty());
    }

    #[tokio::test]
    async fn filter_falls_back_to_every_stored_fact_when_llm_returns_nothing() {
        let state = state_with_conclusion();
        let summarizer = Summarizer::new(Arc::new(ScriptedLlm("not json".to_string())));
        let (entities, _relations) = summarizer.filter(&state).await;
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0]["entity_id"], "e1");
        assert_eq!(entities[0]["relevance_score"], 1.0);
    }

    #[test]
    fn quick_summary_flags_missing_conclusion() {
        let mut cache = ReasoningCache::new();
        cache.init_state("q", QuestionType::Direct);
        let state = cache.state().unwrap().clone();
        let summarizer = Summarizer::new(Arc::new(unreachable_llm()));
        let result = summarizer.quick_summary(&state);
        assert!(!result.limitations.is_empty());
    }
}
