//! The ReAct loop: `MemoryRetrievalAgent` drives Planner/Reasoner/
//! Evaluator/Summarizer over one or more tool registries.
//!
//! Grounded on `original_source/agent/orchestrator.py`'s `query` state
//! machine, constructed via a consuming-self builder in the teacher's
//! `ClientConfig` idiom (`src/llm/client.rs`). Named distinctly from the
//! teacher's `Orchestrator` trait (an RLM-recursion concept with no
//! counterpart here) to avoid a misleading collision.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::config::AgentConfig;
use crate::context::{extract_question, Message};
use crate::error::Result;
use crate::executor::Executor;
use crate::llm::LLMClient;
use crate::query::{QueryResult, ReasoningTraceEntry, RetrievedMemory};
use crate::reasoning::{QuestionType, ReasoningCache};
use crate::roles::{Evaluator, Planner, Reasoner, Summarizer};
use crate::tools::{ToolDefinition, ToolRegistry, ToolResult};

/// A query's input: either a bare question or a conversation history, of
/// which only the latest `user` turn is used as the question (spec §6).
pub enum QueryInput {
    Text(String),
    Conversation(Vec<Message>),
}

impl From<&str> for QueryInput {
    fn from(text: &str) -> Self {
        QueryInput::Text(text.to_string())
    }
}

impl From<String> for QueryInput {
    fn from(text: String) -> Self {
        QueryInput::Text(text)
    }
}

impl From<Vec<Message>> for QueryInput {
    fn from(messages: Vec<Message>) -> Self {
        QueryInput::Conversation(messages)
    }
}

/// Consuming-self builder for `MemoryRetrievalAgent`, mirroring
/// `ClientConfig`'s builder idiom.
#[derive(Default)]
pub struct MemoryRetrievalAgentBuilder {
    llm: Option<Arc<dyn LLMClient>>,
    registries: Vec<ToolRegistry>,
    config: AgentConfig,
}

impl MemoryRetrievalAgentBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_llm(mut self, llm: Arc<dyn LLMClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    /// Add a backing store's tool registry. May be called more than once;
    /// one `Executor` is created per registry (spec §4.2).
    pub fn with_registry(mut self, registry: ToolRegistry) -> Self {
        self.registries.push(registry);
        self
    }

    pub fn with_config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<MemoryRetrievalAgent> {
        let llm = self.llm.ok_or_else(|| {
            crate::error::Error::Config("MemoryRetrievalAgent requires an LLM client".to_string())
        })?;

        let executors: Vec<Executor> = self
            .registries
            .iter()
            .map(|_| {
                Executor::new(
                    self.config.parallel_tools,
                    self.config.max_tool_workers,
                    self.config.tool_timeout,
                )
            })
            .collect();

        let planner = Planner::new(Arc::clone(&llm), &merge_tool_definitions(&self.registries));
        let reasoner = Reasoner::new(Arc::clone(&llm));
        let evaluator = Evaluator::new(Arc::clone(&llm));
        let summarizer = Summarizer::new(Arc::clone(&llm));

        Ok(MemoryRetrievalAgent {
            llm,
            registries: self.registries,
            executors,
            planner,
            reasoner,
            evaluator,
            summarizer,
            cache: ReasoningCache::new(),
            config: self.config,
        })
    }
}

fn merge_tool_definitions(registries: &[ToolRegistry]) -> HashMap<String, ToolDefinition> {
    let mut merged = HashMap::new();
    for registry in registries {
        merged.extend(registry.get_all_definitions());
    }
    merged
}

/// Drives the plan/execute/integrate/conclude/evaluate loop over one or
/// more backing stores for a single query at a time (spec §4.7).
pub struct MemoryRetrievalAgent {
    llm: Arc<dyn LLMClient>,
    registries: Vec<ToolRegistry>,
    executors: Vec<Executor>,
    planner: Planner,
    reasoner: Reasoner,
    evaluator: Evaluator,
    summarizer: Summarizer,
    cache: ReasoningCache,
    config: AgentConfig,
}

impl MemoryRetrievalAgent {
    pub fn builder() -> MemoryRetrievalAgentBuilder {
        MemoryRetrievalAgentBuilder::new()
    }

    /// Append a registry (and its `Executor`) after construction, matching
    /// the original's `add_storage` (spec.md §4.2 is already agnostic to
    /// store count; this just lets the agent grow post-construction).
    /// Rebuilds the Planner's tool catalog from the new combined set.
    pub fn add_registry(&mut self, registry: ToolRegistry) {
        self.registries.push(registry);
        self.executors.push(Executor::new(
            self.config.parallel_tools,
            self.config.max_tool_workers,
            self.config.tool_timeout,
        ));
        self.planner = Planner::new(Arc::clone(&self.llm), &merge_tool_definitions(&self.registries));
    }

    /// Runs one query through the full loop, returning a `QueryResult`
    /// even if an internal step fails (spec §4.7 failure semantics: any
    /// error is caught at this boundary and surfaced as a partial result
    /// plus an `error` trace entry).
    pub async fn query(&mut self, input: impl Into<QueryInput>) -> QueryResult {
        let started = Instant::now();
        let (question, history) = match input.into() {
            QueryInput::Text(text) => (text, Vec::new()),
            QueryInput::Conversation(messages) => match extract_question(&messages) {
                Some((question, history)) => (question, history),
                None => (String::new(), Vec::new()),
            },
        };

        let mut result = QueryResult::default();
        if let Err(err) = self.run_loop(&question, &history, &mut result).await {
            result.reasoning_trace.push(ReasoningTraceEntry::new(
                "error",
                format!("orchestrator error: {err}"),
                None,
                result.total_iterations,
            ));
        }

        result.execution_time_ms = started.elapsed().as_millis() as u64;
        result
    }

    async fn run_loop(
        &mut self,
        question: &str,
        history: &[Message],
        result: &mut QueryResult,
    ) -> Result<()> {
        if self.config.enable_reasoning {
            self.reasoner.analyze(&mut self.cache, question).await?;
        }

        let mut collected: Vec<ToolResult> = Vec::new();
        let mut iter = 0u32;

        while iter < self.config.max_iterations {
            iter += 1;
            result.total_iterations = iter;

            let collected_info = render_collected(&collected);
            let state_summary = self.cache.state().map(|_| self.cache.state_summary());

            let plan = self
                .planner
                .plan(
                    question,
                    Some(collected_info.as_str()).filter(|s| !s.is_empty()),
                    state_summary.as_deref(),
                    history,
                )
                .await;

            result
                .reasoning_trace
                .push(ReasoningTraceEntry::new("plan", plan.analysis.clone(), None, iter));

            if plan.is_complete || plan.tool_calls.is_empty() {
                break;
            }

            let mut iteration_calls = Vec::new();
            let mut iteration_results = Vec::new();
            for (registry, executor) in self.registries.iter().zip(self.executors.iter()) {
                let batch = executor.execute(registry, &plan.tool_calls).await;
                for (call, tool_result) in plan.tool_calls.iter().zip(batch.iter()) {
                    self.cache.record_query(
                        call.tool_name.clone(),
                        call.parameters.clone(),
                        iter,
                        tool_result.is_success(),
                        summarize_result(tool_result),
                    )?;
                }
                result.total_tool_calls += batch.len() as u32;
                iteration_calls.extend(plan.tool_calls.iter().cloned());
                iteration_results.extend(batch);
            }
            collected.extend(iteration_results.iter().cloned());

            if self.config.enable_reasoning {
                self.reasoner
                    .integrate_facts(&mut self.cache, &iteration_calls, &iteration_results)?;

                let (concluded, conclusion, confidence) = self.reasoner.try_conclude(&mut self.cache).await?;
                if concluded {
                    result.reasoning_trace.push(ReasoningTraceEntry::new(
                        "conclude",
                        conclusion.unwrap_or_default(),
                        Some(serde_json::json!({ "confidence": confidence })),
                        iter,
                    ));
                    break;
                }
            }

            if self.evaluator.quick_check(&collected) {
                continue;
            }

            let eval = self
                .evaluator
                .evaluate(question, &collected_info, iter, self.cache.state())
                .await;
            result.reasoning_trace.push(ReasoningTraceEntry::new(
                "evaluate",
                eval.reasoning.clone(),
                Some(serde_json::json!({ "memories_to_keep": eval.memories_to_keep })),
                iter,
            ));

            if let Some(adjustment) = &eval.question_type_adjustment {
                self.apply_question_type_adjustment(adjustment)?;
            }

            if eval.is_sufficient {
                break;
            }
        }

        let summary = match self.cache.state() {
            Some(state) => {
                let (entities, relations) = self.summarizer.filter(state).await;
                result.retrieved_memories = build_retrieved_memories(&entities, &relations);
                result.relevant_entities = entities;
                result.relevant_relations = relations;
                self.summarizer.summarize(state, true).await
            }
            None => crate::roles::SummaryResult {
                question: question.to_string(),
                ..Default::default()
            },
        };

        result.reasoning_trace.push(ReasoningTraceEntry::new(
            "summary",
            summary.answer.clone(),
            Some(serde_json::json!({
                "answer": summary.answer,
                "confidence": summary.confidence,
                "reasoning_chain": summary.reasoning_chain,
                "context_text": summary.context_text,
            })),
            result.total_iterations,
        ));

        Ok(())
    }

    /// Applies an Evaluator-proposed classification change (spec §4.5):
    /// rewrites `question_type` while preserving every other field,
    /// auto-adds a time-ordering sub-goal on a switch to
    /// `TemporalReasoning` if none already mentions ordering, and ignores
    /// invalid `new_type` strings.
    fn apply_question_type_adjustment(
        &mut self,
        adjustment: &crate::roles::QuestionTypeAdjustment,
    ) -> Result<()> {
        if !adjustment.should_adjust {
            return Ok(());
        }
        let Some(new_type_str) = &adjustment.new_type else {
            return Ok(());
        };
        let Ok(new_type) = new_type_str.parse::<QuestionType>() else {
            tracing::warn!(new_type = %new_type_str, "ignoring invalid question_type_adjustment");
            return Ok(());
        };

        let current = self.cache.state().map(|s| s.question_type);
        if current == Some(new_type) {
            return Ok(());
        }

        self.cache.set_question_type(new_type)?;

        if new_type == QuestionType::TemporalReasoning {
            let has_ordering_goal = self
                .cache
                .state()
                .map(|s| s.sub_goals.iter().any(|g| g.description.to_lowercase().contains("time")))
                .unwrap_or(false);
            if !has_ordering_goal {
                self.cache.add_sub_goal("order relevant events by time", Vec::new())?;
            }
        }
        Ok(())
    }
}

fn render_collected(results: &[ToolResult]) -> String {
    results
        .iter()
        .filter_map(|r| r.data.as_ref().map(|d| format!("{}: {}", r.tool_name, d)))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Projects the Summarizer's filtered entity/relation records into the
/// `RetrievedMemory` shape the caller sees alongside them, carrying over
/// each record's `relevance_score`.
fn build_retrieved_memories(
    entities: &[serde_json::Value],
    relations: &[serde_json::Value],
) -> Vec<RetrievedMemory> {
    entities
        .iter()
        .filter_map(|entity| retrieved_memory_from("entity", entity, "entity_id"))
        .chain(
            relations
                .iter()
                .filter_map(|relation| retrieved_memory_from("relation", relation, "relation_id")),
        )
        .collect()
}

fn retrieved_memory_from(memory_type: &str, record: &serde_json::Value, id_key: &str) -> Option<RetrievedMemory> {
    let obj = record.as_object()?;
    let source_id = obj.get(id_key)?.as_str()?.to_string();
    let content = obj
        .get("content")
        .or_else(|| obj.get("name"))
        .or_else(|| obj.get("type"))
        .map(|v| v.to_string())
        .unwrap_or_else(|| record.to_string());
    let metadata = obj
        .iter()
        .filter(|(k, _)| k.as_str() != id_key && k.as_str() != "relevance_score")
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    Some(RetrievedMemory {
        memory_type: memory_type.to_string(),
        content,
        source_id,
        physical_time: None,
        relevance_score: obj.get("relevance_score").and_then(|v| v.as_f64()),
        metadata,
    })
}

fn summarize_result(result: &ToolResult) -> String {
    if result.is_success() {
        result.data.as_ref().map(|d| d.to_string()).unwrap_or_default()
    } else {
        result.error_message.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{
        ChatMessage, CompletionRequest, CompletionResponse, EmbeddingRequest, EmbeddingResponse, ModelSpec,
        Provider,
    };
    use crate::tools::{ParamMap, ParamSchema, Tool};
    use async_trait::async_trait;
    use serde_json::json;

    struct ScriptedLlm {
        responses: std::sync::Mutex<Vec<String>>,
    }

    #[async_trait]
    impl LLMClient for ScriptedLlm {
        async fn complete(&self, _request: CompletionRequest) -> crate::error::Result<CompletionResponse> {
            unreachable!("chat() is used exclusively by the roles in this loop")
        }
        async fn embed(&self, _request: EmbeddingRequest) -> crate::error::Result<EmbeddingResponse> {
            unreachable!()
        }
        fn provider(&self) -> Provider {
            Provider::Anthropic
        }
        fn available_models(&self) -> Vec<ModelSpec> {
            Vec::new()
        }
        async fn chat(&self, _messages: Vec<ChatMessage>) -> crate::error::Result<ChatMessage> {
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                Ok(ChatMessage::assistant("{}"))
            } else {
                Ok(ChatMessage::assistant(responses.remove(0)))
            }
        }
    }

    struct SearchEntity;

    #[async_trait]
    impl Tool for SearchEntity {
        async fn call(&self, _parameters: &ParamMap) -> crate::error::Result<serde_json::Value> {
            Ok(json!({ "success": true, "entities": [{"entity_id": "e1", "name": "Bob"}] }))
        }
        fn definition(&self) -> ToolDefinition {
            ToolDefinition {
                name: "search_entity".to_string(),
                description: "search by name".to_string(),
                parameters: vec![ParamSchema::new("name", "string", true, "name or query")],
            }
        }
    }

    #[tokio::test]
    async fn planner_declaring_complete_on_first_turn_skips_tool_execution() {
        let llm = Arc::new(ScriptedLlm {
            responses: std::sync::Mutex::new(vec![
                r#"{"analysis": "nothing to look up", "tool_calls": [], "is_complete": true}"#.to_string(),
            ]),
        });
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(SearchEntity));

        let mut agent = MemoryRetrievalAgent::builder()
            .with_llm(llm)
            .with_registry(registry)
            .with_config(AgentConfig::new().with_enable_reasoning(false))
            .build()
            .unwrap();

        let result = agent.query("What is 2+2?").await;
        assert_eq!(result.total_iterations, 1);
        assert_eq!(result.total_tool_calls, 0);
        assert!(result.reasoning_trace.iter().any(|e| e.entry_type == "plan"));
        assert!(result.reasoning_trace.iter().any(|e| e.entry_type == "summary"));
    }

    #[tokio::test]
    async fn iteration_cap_terminates_a_non_converging_loop() {
        let responses: Vec<String> = (0..6)
            .map(|_| {
                r#"{"analysis": "keep looking", "tool_calls": [{"tool_name": "search_entity", "parameters": {"name": "Bob"}}], "is_complete": false}"#
                    .to_string()
            })
            .collect();
        let llm = Arc::new(ScriptedLlm {
            responses: std::sync::Mutex::new(responses),
        });
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(SearchEntity));

        let mut agent = MemoryRetrievalAgent::builder()
            .with_llm(llm)
            .with_registry(registry)
            .with_config(
                AgentConfig::new()
                    .with_enable_reasoning(false)
                    .with_max_iterations(3),
            )
            .build()
            .unwrap();

        let result = agent.query("Tell me everything about Bob").await;
        assert_eq!(result.total_iterations, 3);
    }

    #[tokio::test]
    async fn concluding_with_reasoning_enabled_populates_relevant_entities() {
        let responses = vec![
            r#"{"question_type": "direct", "sub_goals": [], "missing_info": [], "initial_hypotheses": []}"#.to_string(),
            r#"{"analysis": "search", "tool_calls": [{"tool_name": "search_entity", "parameters": {"name": "Bob"}}], "is_complete": false}"#.to_string(),
            r#"{"can_conclude": true, "conclusion": "Bob is an engineer", "confidence": 0.9, "reasoning_steps": [], "evidence": [], "still_missing": []}"#.to_string(),
            r#"{"entities": [{"id": "e1", "relevance_score": 0.8}], "relations": []}"#.to_string(),
            r#"{"relevant_facts": ["entity e1: Bob"]}"#.to_string(),
            r#"{"answer": "Bob is an engineer", "confidence": 0.9, "answer_type": "direct", "reasoning_chain": [], "supporting_evidence": [], "entities_used": ["e1"], "relations_used": [], "limitations": []}"#.to_string(),
            "Bob is an engineer, confirmed.".to_string(),
        ];
        let llm = Arc::new(ScriptedLlm {
            responses: std::sync::Mutex::new(responses),
        });
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(SearchEntity));

        let mut agent = MemoryRetrievalAgent::builder()
            .with_llm(llm)
            .with_registry(registry)
            .with_config(AgentConfig::new().with_enable_reasoning(true))
            .build()
            .unwrap();

        let result = agent.query("Who is Bob?").await;

        assert_eq!(result.relevant_entities.len(), 1);
        assert_eq!(result.relevant_entities[0]["entity_id"], "e1");
        assert_eq!(result.relevant_entities[0]["relevance_score"], 0.8);
        assert!(result.relevant_relations.is_empty());
        assert_eq!(result.retrieved_memories.len(), 1);
        assert_eq!(result.retrieved_memories[0].source_id, "e1");
        assert_eq!(result.answer(), Some("Bob is an engineer"));
    }
}
