//! Dispatches a batch of tool calls against a `ToolRegistry`, either
//! sequentially or with bounded concurrency, preserving call order in the
//! returned results regardless of completion order.
//!
//! Grounded on two sources: the control flow of
//! `original_source/agent/executor/executor.py` (`execute` /
//! `_execute_sequential` / `_execute_parallel`), and the
//! semaphore+timeout+order-preserving mechanics of
//! this crate's `llm/batch.rs::BatchExecutor`, retargeted from LLM batch
//! calls to tool calls. Unlike the Python source's async path (whose
//! `enumerate(asyncio.as_completed(tasks))` does not actually preserve
//! original call order — a latent bug), every future here is tagged with
//! its original index before dispatch and results are sorted back into
//! place, so ordering is correct by construction rather than by luck.

use futures::future::join_all;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

use crate::tools::{ToolCall, ToolRegistry, ToolResult};

/// Dispatches tool calls against one `ToolRegistry`.
pub struct Executor {
    parallel: bool,
    max_workers: usize,
    timeout: Duration,
}

impl Executor {
    pub fn new(parallel: bool, max_workers: usize, timeout: Duration) -> Self {
        Self {
            parallel,
            max_workers,
            timeout,
        }
    }

    /// Execute `calls` against `registry`, returning results in the same
    /// order as `calls` regardless of completion order (spec §4.2/§5).
    pub async fn execute(&self, registry: &ToolRegistry, calls: &[ToolCall]) -> Vec<ToolResult> {
        if calls.is_empty() {
            return Vec::new();
        }
        if !self.parallel || calls.len() <= 1 {
            self.execute_sequential(registry, calls).await
        } else {
            self.execute_parallel(registry, calls).await
        }
    }

    async fn execute_sequential(&self, registry: &ToolRegistry, calls: &[ToolCall]) -> Vec<ToolResult> {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            results.push(execute_single(registry, call, self.timeout).await);
        }
        results
    }

    async fn execute_parallel(&self, registry: &ToolRegistry, calls: &[ToolCall]) -> Vec<ToolResult> {
        let semaphore = Arc::new(Semaphore::new(self.max_workers));
        let futures = calls.iter().enumerate().map(|(index, call)| {
            let semaphore = Arc::clone(&semaphore);
            let timeout = self.timeout;
            async move {
                let _permit = semaphore.acquire().await.expect("semaphore not closed");
                (index, execute_single(registry, call, timeout).await)
            }
        });

        let mut indexed = join_all(futures).await;
        indexed.sort_by_key(|(index, _)| *index);
        indexed.into_iter().map(|(_, result)| result).collect()
    }
}

async fn execute_single(registry: &ToolRegistry, call: &ToolCall, timeout: Duration) -> ToolResult {
    let Some(tool) = registry.get(&call.tool_name) else {
        return ToolResult::error(
            call.call_id.clone(),
            call.tool_name.clone(),
            format!("tool not found: {}", call.tool_name),
        );
    };

    let started = Instant::now();
    match tokio::time::timeout(timeout, tool.call(&call.parameters)).await {
        Ok(Ok(data)) => {
            let elapsed_ms = started.elapsed().as_millis() as u64;
            let success = data
                .get("success")
                .and_then(|v| v.as_bool())
                .unwrap_or(true);
            if success {
                ToolResult::success(call.call_id.clone(), call.tool_name.clone(), data, elapsed_ms)
            } else {
                let message = data
                    .get("message")
                    .and_then(|v| v.as_str())
                    .unwrap_or("tool reported failure")
                    .to_string();
                ToolResult::error(call.call_id.clone(), call.tool_name.clone(), message)
            }
        }
        Ok(Err(err)) => ToolResult::error(call.call_id.clone(), call.tool_name.clone(), err.to_string()),
        Err(_) => {
            let elapsed_ms = started.elapsed().as_millis() as u64;
            ToolResult::timeout(call.call_id.clone(), call.tool_name.clone(), elapsed_ms)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{ParamMap, ParamSchema, ParamValue, Tool, ToolDefinition};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct SlowEcho {
        delay: Duration,
        order: Arc<std::sync::Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Tool for SlowEcho {
        async fn call(&self, parameters: &ParamMap) -> crate::error::Result<serde_json::Value> {
            tokio::time::sleep(self.delay).await;
            let label = parameters
                .get("label")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            self.order.lock().unwrap().push(label.clone());
            Ok(json!({ "success": true, "label": label }))
        }

        fn definition(&self) -> ToolDefinition {
            ToolDefinition {
                name: "slow_echo".to_string(),
                description: "sleeps then echoes".to_string(),
                parameters: vec![ParamSchema::new("label", "string", true, "label")],
            }
        }
    }

    struct FlakyCounter(AtomicU32);

    #[async_trait]
    impl Tool for FlakyCounter {
        async fn call(&self, _parameters: &ParamMap) -> crate::error::Result<serde_json::Value> {
            let n = self.0.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                Ok(json!({ "success": false, "message": "not ready yet" }))
            } else {
                Ok(json!({ "success": true }))
            }
        }

        fn definition(&self) -> ToolDefinition {
            ToolDefinition {
                name: "flaky".to_string(),
                description: "fails once then succeeds".to_string(),
                parameters: vec![],
            }
        }
    }

    fn call_with(tool: &str, label: &str) -> ToolCall {
        let mut params = ParamMap::new();
        params.insert("label".to_string(), ParamValue::String(label.to_string()));
        ToolCall::new(tool, params)
    }

    #[tokio::test]
    async fn unknown_tool_yields_error_result_without_panicking() {
        let registry = ToolRegistry::new();
        let executor = Executor::new(false, 5, Duration::from_secs(1));
        let results = executor.execute(&registry, &[call_with("missing", "x")]).await;
        assert_eq!(results.len(), 1);
        assert!(!results[0].is_success());
    }

    #[tokio::test]
    async fn parallel_execution_preserves_call_order_despite_out_of_order_completion() {
        let mut registry = ToolRegistry::new();
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        registry.register(Box::new(SlowEcho {
            delay: Duration::from_millis(0),
            order: Arc::clone(&order),
        }));

        let calls = vec![
            call_with("slow_echo", "a"),
            call_with("slow_echo", "b"),
            call_with("slow_echo", "c"),
        ];
        let executor = Executor::new(true, 5, Duration::from_secs(1));
        let results = executor.execute(&registry, &calls).await;

        let labels: Vec<&str> = results
            .iter()
            .map(|r| r.data.as_ref().unwrap()["label"].as_str().unwrap())
            .collect();
        assert_eq!(labels, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn logical_failure_maps_to_error_status_with_message() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(FlakyCounter(AtomicU32::new(0))));
        let executor = Executor::new(false, 5, Duration::from_secs(1));

        let results = executor
            .execute(&registry, &[call_with("flaky", "x")])
            .await;
        assert!(!results[0].is_success());
        assert_eq!(results[0].error_message, "not ready yet");
    }

    #[tokio::test]
    async fn timeout_yields_timeout_status() {
        struct Forever;
        #[async_trait]
        impl Tool for Forever {
            async fn call(&self, _parameters: &ParamMap) -> crate::error::Result<serde_json::Value> {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(json!({ "success": true }))
            }
            fn definition(&self) -> ToolDefinition {
                ToolDefinition {
                    name: "forever".to_string(),
                    description: "never returns".to_string(),
                    parameters: vec![],
                }
            }
        }

        let mut registry = ToolRegistry::new();
        registry.register(Box::new(Forever));
        let executor = Executor::new(false, 5, Duration::from_millis(10));
        let results = executor
            .execute(&registry, &[call_with("forever", "x")])
            .await;
        assert_eq!(results[0].status, crate::tools::ToolStatus::Timeout);
    }
}
