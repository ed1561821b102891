//! Planner: given the question and accumulated state, emits the next
//! batch of tool calls or declares completion.
//!
//! Grounded on `original_source/agent/planner/planner.py`.

use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

use crate::context::Message;
use crate::json_extract::parse_llm_json;
use crate::llm::{ChatMessage, LLMClient};
use crate::tools::{ParamMap, ToolCall, ToolDefinition};

/// A single tool call as parsed straight off the wire, before unknown
/// tool names are discarded.
#[derive(Debug, Clone, Deserialize)]
pub struct RawToolCall {
    pub tool_name: String,
    #[serde(default)]
    pub parameters: ParamMap,
    #[serde(default)]
    #[allow(dead_code)]
    pub reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawPlan {
    #[serde(default)]
    analysis: String,
    #[serde(default)]
    tool_calls: Vec<RawToolCall>,
    #[serde(default)]
    is_complete: bool,
    #[serde(default)]
    next_steps: Option<String>,
    #[serde(default)]
    summary: Option<String>,
}

/// The Planner's output for one iteration.
#[derive(Debug, Clone)]
pub struct PlanResult {
    pub analysis: String,
    pub tool_calls: Vec<ToolCall>,
    pub is_complete: bool,
    pub next_steps: Option<String>,
    pub summary: Option<String>,
    /// Set when the response couldn't be parsed as JSON at all — the
    /// Evaluator/iteration-cap still moves the loop forward (spec §4.3).
    pub parse_error: bool,
}

impl PlanResult {
    fn parse_failure(raw_content: impl Into<String>) -> Self {
        Self {
            analysis: raw_content.into(),
            tool_calls: Vec::new(),
            is_complete: false,
            next_steps: None,
            summary: None,
            parse_error: true,
        }
    }
}

const NO_TOOL_NEEDED_PROMPT: &str = "If the collected information already answers the question, set is_complete=true and tool_calls=[].";

pub struct Planner {
    llm: Arc<dyn LLMClient>,
    system_prompt: String,
    known_tools: std::collections::HashSet<String>,
}

impl Planner {
    /// Builds its system prompt once from the tool catalog, matching
    /// `Planner.__init__`'s pre-rendering in the original.
    pub fn new(llm: Arc<dyn LLMClient>, tools: &HashMap<String, ToolDefinition>) -> Self {
        let system_prompt = format!(
            "You are the planning component of a memory-retrieval agent.\n\
             You can call the following tools:\n{}\n\n\
             Rules:\n\
             1. Most tools require an entity_id, obtainable only from a name-search tool. Never invent an entity_id.\n\
             2. A name may have aliases — search broadly before narrowing.\n\
             3. memory_cache_id equality identifies scene co-occurrence; physical_time orders events.\n\
             Respond with a single JSON object: {{\"analysis\", \"tool_calls\": [{{\"tool_name\", \"parameters\"}}], \"is_complete\", \"next_steps\"?, \"summary\"?}}.",
            format_tools_description(tools)
        );
        Self {
            llm,
            system_prompt,
            known_tools: tools.keys().cloned().collect(),
        }
    }

    pub async fn plan(
        &self,
        question: &str,
        collected_info: Option<&str>,
        reasoning_state: Option<&str>,
        conversation_history: &[Message],
    ) -> PlanResult {
        let mut request = format!("Question: {question}\n");
        if let Some(state) = reasoning_state {
            request.push_str(&format!("\nReasoning state so far:\n{state}\n"));
        }
        let has_collected_info = collected_info.map(|s| !s.is_empty()).unwrap_or(false);
        if let Some(info) = collected_info {
            if !info.is_empty() {
                request.push_str(&format!("\nCollected so far:\n{info}\n"));
            }
        }
        if has_collected_info {
            request.push_str(&format!("\n{NO_TOOL_NEEDED_PROMPT}\n"));
        }

        let mut messages = vec![ChatMessage::system(self.system_prompt.clone())];
        for turn in conversation_history {
            messages.push(ChatMessage {
                role: to_chat_role(turn.role),
                content: turn.content.clone(),
                cache_control: None,
            });
        }
        messages.push(ChatMessage::user(request));

        let response = match self.llm.chat(messages).await {
            Ok(response) => response,
            Err(err) => return PlanResult::parse_failure(format!("LLM call failed: {err}")),
        };

        self.parse_response(&response.content)
    }

    fn parse_response(&self, content: &str) -> PlanResult {
        let Some(raw) = parse_llm_json::<RawPlan>(content) else {
            return PlanResult::parse_failure(content);
        };

        let tool_calls = raw
            .tool_calls
            .into_iter()
            .filter(|call| self.known_tools.contains(&call.tool_name))
            .map(|call| ToolCall::new(call.tool_name, call.parameters))
            .collect();

        PlanResult {
            analysis: raw.analysis,
            tool_calls,
            is_complete: raw.is_complete,
            next_steps: raw.next_steps,
            summary: raw.summary,
            parse_error: false,
        }
    }
}

fn to_chat_role(role: crate::context::Role) -> crate::llm::ChatRole {
    use crate::context::Role as CtxRole;
    use crate::llm::ChatRole;
    match role {
        CtxRole::System => ChatRole::System,
        CtxRole::User | CtxRole::Tool => ChatRole::User,
        CtxRole::Assistant => ChatRole::Assistant,
    }
}

fn format_tools_description(tools: &HashMap<String, ToolDefinition>) -> String {
    let mut names: Vec<&String> = tools.keys().collect();
    names.sort();
    names
        .into_iter()
        .map(|name| {
            let def = &tools[name];
            let params: Vec<String> = def
                .parameters
                .iter()
                .map(|p| format!("{}{}: {}", p.name, if p.required { "" } else { "?" }, p.type_tag))
                .collect();
            format!("- {}({}): {}", def.name, params.join(", "), def.description)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ParamSchema;

    fn tools() -> HashMap<String, ToolDefinition> {
        let mut map = HashMap::new();
        map.insert(
            "search_entity".to_string(),
            ToolDefinition {
                name: "search_entity".to_string(),
                description: "search by name".to_string(),
                parameters: vec![ParamSchema::new("name", "string", true, "name or query")],
            },
        );
        map
    }

    fn planner() -> Planner {
        struct DummyLlm;
        #[async_trait::async_trait]
        impl LLMClient for DummyLlm {
            async fn complete(
                &self,
                _request: crate::llm::CompletionRequest,
            ) -> crate::error::Result<crate::llm::CompletionResponse> {
                unreachable!("parse_response is tested directly")
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
        Planner::new(Arc::new(DummyLlm), &tools())
    }

    #[test]
    fn unknown_tool_names_are_discarded() {
        let planner = planner();
        let content = r#"```json
        {"analysis": "x", "tool_calls": [{"tool_name": "search_entity", "parameters": {"name": "Bob"}}, {"tool_name": "delete_everything", "parameters": {}}], "is_complete": false}
        ```"#;
        let result = planner.parse_response(content);
        assert_eq!(result.tool_calls.len(), 1);
        assert_eq!(result.tool_calls[0].tool_name, "search_entity");
        assert!(!result.parse_error);
    }

    #[test]
    fn malformed_json_yields_parse_error_and_empty_calls() {
        let planner = planner();
        let result = planner.parse_response("this is not json");
        assert!(result.parse_error);
        assert!(result.tool_calls.is_empty());
        assert!(!result.is_complete);
    }
}
