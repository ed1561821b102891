//! Query input/output shapes: the orchestrator's public contract.
//!
//! Grounded on `original_source/agent/models.py` (`QueryResult`,
//! `RetrievedMemory`) and its `to_dict()`/`get_context_text()` methods.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single piece of retrieved memory surfaced in the final result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedMemory {
    pub memory_type: String,
    pub content: String,
    pub source_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub physical_time: Option<DateTime<Utc>>,
    /// Populated when the Summarizer's filter step annotates a fact with
    /// relevance; `None` otherwise (additive beyond spec.md's named
    /// shape, carried from `original_source/agent/models.py::RetrievedMemory`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relevance_score: Option<f64>,
    pub metadata: HashMap<String, serde_json::Value>,
}

/// One entry in the reasoning trace: a tagged record of what happened at
/// a given loop iteration (plan/execute/evaluate/conclude/summary/error).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningTraceEntry {
    #[serde(rename = "type")]
    pub entry_type: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    pub iteration: u32,
    pub timestamp: DateTime<Utc>,
}

impl ReasoningTraceEntry {
    pub fn new(
        entry_type: impl Into<String>,
        content: impl Into<String>,
        data: Option<serde_json::Value>,
        iteration: u32,
    ) -> Self {
        Self {
            entry_type: entry_type.into(),
            content: content.into(),
            data,
            iteration,
            timestamp: Utc::now(),
        }
    }
}

/// The final result of one `MemoryRetrievalAgent::query` call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryResult {
    pub retrieved_memories: Vec<RetrievedMemory>,
    pub relevant_entities: Vec<serde_json::Value>,
    pub relevant_relations: Vec<serde_json::Value>,
    pub reasoning_trace: Vec<ReasoningTraceEntry>,
    pub total_iterations: u32,
    pub total_tool_calls: u32,
    pub execution_time_ms: u64,
}

impl Default for ReasoningTraceEntry {
    fn default() -> Self {
        Self {
            entry_type: String::new(),
            content: String::new(),
            data: None,
            iteration: 0,
            timestamp: Utc::now(),
        }
    }
}

impl QueryResult {
    /// The final summary entry in the trace, if the Summarizer ran.
    fn summary_entry(&self) -> Option<&serde_json::Value> {
        self.reasoning_trace
            .iter()
            .rev()
            .find(|e| e.entry_type == "summary")
            .and_then(|e| e.data.as_ref())
    }

    /// Convenience accessor carried from
    /// `original_source/agent/orchestrator.py::get_answer` — pulls the
    /// answer out of the final summary trace entry, if present.
    pub fn answer(&self) -> Option<&str> {
        self.summary_entry()?.get("answer")?.as_str()
    }

    /// Carried from `get_confidence` in the original.
    pub fn confidence(&self) -> Option<f64> {
        self.summary_entry()?.get("confidence")?.as_f64()
    }

    /// Carried from `get_context_text` in the original.
    pub fn context_text(&self) -> Option<&str> {
        self.summary_entry()?.get("context_text")?.as_str()
    }

    /// Markdown-ish rendering of retrieved memories/entities/relations for
    /// feeding back into a downstream LLM prompt, matching the original's
    /// `QueryResult.get_context_text` (not to be confused with the
    /// Summarizer-produced `context_text` field above, which this method
    /// is named distinctly from to avoid the collision).
    pub fn render_context(&self) -> String {
        let mut out = String::new();
        if !self.relevant_entities.is_empty() {
            out.push_str("## Relevant entities\n");
            for entity in &self.relevant_entities {
                out.push_str(&format!("- {entity}\n"));
            }
        }
        if !self.relevant_relations.is_empty() {
            out.push_str("\n## Relevant relations\n");
            for relation in &self.relevant_relations {
                out.push_str(&format!("- {relation}\n"));
            }
        }
        if !self.retrieved_memories.is_empty() {
            out.push_str("\n## Retrieved memories\n");
            for memory in &self.retrieved_memories {
                out.push_str(&format!("- [{}] {}\n", memory.memory_type, memory.content));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn answer_confidence_context_text_read_final_summary_entry() {
        let mut result = QueryResult::default();
        result.reasoning_trace.push(ReasoningTraceEntry::new(
            "plan",
            "planning",
            None,
            1,
        ));
        result.reasoning_trace.push(ReasoningTraceEntry::new(
            "summary",
            "summary",
            Some(json!({"answer": "42", "confidence": 0.8, "context_text": "ctx"})),
            2,
        ));

        assert_eq!(result.answer(), Some("42"));
        assert_eq!(result.confidence(), Some(0.8));
        assert_eq!(result.context_text(), Some("ctx"));
    }

    #[test]
    fn accessors_return_none_without_summary_entry() {
        let result = QueryResult::default();
        assert_eq!(result.answer(), None);
        assert_eq!(result.confidence(), None);
        assert_eq!(result.context_text(), None);
    }
}
