//! Tool vocabulary: definitions, dynamic parameters, calls, and results.
//!
//! Grounded on `original_source/agent/models.py` (`ToolCall`, `ToolResult`,
//! `ToolStatus`) and `original_source/agent/executor/executor.py`'s
//! schema/instance lookup conventions, adapted to Rust with a tagged-union
//! `ParamValue` per spec §9's design note on heterogeneous tool parameters.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::error::Result;

/// A dynamically-typed tool parameter value.
///
/// Untagged so the wire format to/from the LLM (and to/from a concrete
/// `Tool` implementation) is plain JSON, matching the Planner's JSON
/// `tool_calls[].parameters` object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    List(Vec<ParamValue>),
    Object(HashMap<String, ParamValue>),
}

impl ParamValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ParamValue::Int(i) => Some(*i),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::String(s) => write!(f, "{s}"),
            ParamValue::Int(i) => write!(f, "{i}"),
            ParamValue::Float(v) => write!(f, "{v}"),
            ParamValue::Bool(b) => write!(f, "{b}"),
            ParamValue::List(items) => {
                let rendered: Vec<String> = items.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", rendered.join(", "))
            }
            ParamValue::Object(_) => write!(f, "{{object}}"),
        }
    }
}

/// A tool's parameter bag, as sent by the Planner and dispatched to the
/// bound tool instance.
pub type ParamMap = HashMap<String, ParamValue>;

/// Declared shape of a single tool parameter, for the Planner's prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamSchema {
    pub name: String,
    pub type_tag: String,
    pub required: bool,
    pub description: String,
}

impl ParamSchema {
    pub fn new(
        name: impl Into<String>,
        type_tag: impl Into<String>,
        required: bool,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            type_tag: type_tag.into(),
            required,
            description: description.into(),
        }
    }
}

/// A tool's declared shape, shown to the Planner so it knows what it can
/// call and with what parameters (spec §6's tool vocabulary table).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Vec<ParamSchema>,
}

/// One call to a single tool, as emitted by the Planner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub call_id: String,
    pub tool_name: String,
    pub parameters: ParamMap,
}

impl ToolCall {
    pub fn new(tool_name: impl Into<String>, parameters: ParamMap) -> Self {
        Self {
            call_id: uuid::Uuid::new_v4().to_string()[..8].to_string(),
            tool_name: tool_name.into(),
            parameters,
        }
    }
}

/// Terminal status of a tool invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Success,
    Error,
    Timeout,
}

/// Result of a single tool invocation, tied back to its originating call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub call_id: String,
    pub tool_name: String,
    pub status: ToolStatus,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
    #[serde(default)]
    pub error_message: String,
    pub execution_time_ms: u64,
}

impl ToolResult {
    pub fn is_success(&self) -> bool {
        self.status == ToolStatus::Success
    }

    pub fn success(call_id: impl Into<String>, tool_name: impl Into<String>, data: serde_json::Value, execution_time_ms: u64) -> Self {
        Self {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            status: ToolStatus::Success,
            data: Some(data),
            error_message: String::new(),
            execution_time_ms,
        }
    }

    pub fn error(call_id: impl Into<String>, tool_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            status: ToolStatus::Error,
            data: None,
            error_message: message.into(),
            execution_time_ms: 0,
        }
    }

    pub fn timeout(call_id: impl Into<String>, tool_name: impl Into<String>, execution_time_ms: u64) -> Self {
        Self {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            status: ToolStatus::Timeout,
            data: None,
            error_message: "tool call timed out".to_string(),
            execution_time_ms,
        }
    }
}

/// A single invocable tool backed by an external collaborator (the graph
/// store, an embedding model, etc.), bound behind a uniform async
/// interface so the `Executor` never needs to know its concrete shape.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Invoke the tool with the given parameters, returning a JSON payload
    /// that becomes `ToolResult::data` on success.
    ///
    /// A tool signals its own logical failure by returning
    /// `Ok(json!({"success": false, "message": "..."}))` rather than `Err`
    /// — `Err` is reserved for unexpected/fatal failures, matching
    /// `original_source/agent/executor/executor.py`'s `result_data.get("success", True)`
    /// convention.
    async fn call(&self, parameters: &ParamMap) -> Result<serde_json::Value>;

    /// The tool's declared shape, shown to the Planner.
    fn definition(&self) -> ToolDefinition;
}

/// Registry of named tools bound to one backing store.
///
/// One `ToolRegistry` exists per backing store (spec §4.2); the
/// `Orchestrator` holds one `Executor` per registry and dispatches the
/// same `tool_calls` batch to every registry in turn.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool under its own declared name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.definition().name.clone();
        self.tools.insert(name, tool);
    }

    /// Look up a tool instance by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// All registered tool definitions, for the Planner's system prompt.
    pub fn get_all_definitions(&self) -> HashMap<String, ToolDefinition> {
        self.tools
            .iter()
            .map(|(name, tool)| (name.clone(), tool.definition()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        async fn call(&self, parameters: &ParamMap) -> Result<serde_json::Value> {
            Ok(json!({ "success": true, "echo": parameters.get("text").map(|v| v.to_string()) }))
        }

        fn definition(&self) -> ToolDefinition {
            ToolDefinition {
                name: "echo".to_string(),
                description: "echoes its input".to_string(),
                parameters: vec![ParamSchema::new("text", "string", true, "text to echo")],
            }
        }
    }

    #[tokio::test]
    async fn registry_round_trips_a_tool() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));

        let tool = registry.get("echo").expect("echo tool registered");
        let mut params = ParamMap::new();
        params.insert("text".to_string(), ParamValue::String("hi".to_string()));
        let result = tool.call(&params).await.unwrap();
        assert_eq!(result["success"], json!(true));

        assert_eq!(registry.get_all_definitions().len(), 1);
        assert!(registry.get("nonexistent").is_none());
    }
}
