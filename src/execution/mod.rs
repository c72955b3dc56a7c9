//! Execution engine for routed tool calls
//!
//! Every selected tool runs concurrently against the same question.
//! Failures never escape: each becomes an error `ToolResult` in its slot.

use crate::models::ToolResult;
use crate::tools::ToolRegistry;
use futures::future::join_all;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Upper bound on tools per query (defensive guard)
const MAX_TOOLS_PER_QUERY: usize = 16;

/// Runs routed tools, independently and in parallel
pub struct ExecutionEngine {
    tool_registry: Arc<ToolRegistry>,
    tool_timeout: Duration,
}

impl ExecutionEngine {
    pub fn new(tool_registry: Arc<ToolRegistry>, tool_timeout: Duration) -> Self {
        Self {
            tool_registry,
            tool_timeout,
        }
    }

    /// Invoke every tool in `selected` with `question`.
    ///
    /// The returned results are in `selected` order, whatever order the
    /// calls complete in.
    pub async fn execute(&self, selected: &[String], question: &str) -> Vec<ToolResult> {
        let selected = if selected.len() > MAX_TOOLS_PER_QUERY {
            warn!(
                requested = selected.len(),
                limit = MAX_TOOLS_PER_QUERY,
                "Too many tools selected; truncating"
            );
            &selected[..MAX_TOOLS_PER_QUERY]
        } else {
            selected
        };

        debug!(tools = ?selected, "Starting tool execution");

        let calls = selected
            .iter()
            .map(|name| self.execute_one(name, question));

        join_all(calls).await
    }

    async fn execute_one(&self, tool_name: &str, question: &str) -> ToolResult {
        let start = Instant::now();
        let elapsed_ms = |start: Instant| start.elapsed().as_millis() as u64;

        // -------------------------------------------------
        // 1️⃣ TOOL LOOKUP
        // -------------------------------------------------
        let Some(tool) = self.tool_registry.get(tool_name) else {
            warn!(%tool_name, "Tool not registered");
            return ToolResult::error(tool_name, "tool not registered", 0);
        };

        // -------------------------------------------------
        // 2️⃣ GUARDED INVOCATION
        // -------------------------------------------------
        let call = AssertUnwindSafe(tool.call(question)).catch_unwind();

        let result = match tokio::time::timeout(self.tool_timeout, call).await {
            Ok(Ok(Ok(output))) => ToolResult::success(tool_name, output, elapsed_ms(start)),
            Ok(Ok(Err(e))) => {
                warn!(%tool_name, error = %e, "Tool execution failed");
                ToolResult::error(tool_name, e, elapsed_ms(start))
            }
            Ok(Err(panic)) => {
                let message = panic_message(panic.as_ref());
                warn!(%tool_name, %message, "Tool panicked");
                ToolResult::error(tool_name, format!("tool panicked: {}", message), elapsed_ms(start))
            }
            Err(_) => {
                warn!(
                    %tool_name,
                    timeout_ms = self.tool_timeout.as_millis() as u64,
                    "Tool timed out"
                );
                ToolResult::error(
                    tool_name,
                    format!("timed out after {} ms", self.tool_timeout.as_millis()),
                    elapsed_ms(start),
                )
            }
        };

        debug!(
            %tool_name,
            is_error = result.is_error,
            execution_time_ms = result.execution_time_ms,
            "Tool finished"
        );

        result
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OrchestrationError;
    use crate::models::{ToolOutput, TOOL_ERROR_MARKER};
    use crate::tools::{FnTool, Tool};
    use crate::Result;
    use async_trait::async_trait;

    struct SlowTool {
        name: String,
        delay_ms: u64,
    }

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str {
            &self.name
        }

        fn description(&self) -> &str {
            "sleeps then echoes"
        }

        async fn call(&self, input: &str) -> Result<ToolOutput> {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            Ok(ToolOutput::text(format!("{}: {}", self.name, input)))
        }
    }

    fn slow(name: &str, delay_ms: u64) -> Arc<dyn Tool> {
        Arc::new(SlowTool {
            name: name.to_string(),
            delay_ms,
        })
    }

    fn engine(tools: Vec<Arc<dyn Tool>>, timeout: Duration) -> ExecutionEngine {
        let mut registry = ToolRegistry::new();
        for tool in tools {
            registry.register(tool).unwrap();
        }
        ExecutionEngine::new(Arc::new(registry), timeout)
    }

    fn names(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[tokio::test]
    async fn test_order_preserved_under_varied_latency() {
        let engine = engine(
            vec![slow("slow", 80), slow("fast", 1), slow("medium", 30)],
            Duration::from_secs(5),
        );

        let results = engine
            .execute(&names(&["slow", "fast", "medium"]), "q")
            .await;

        let order: Vec<&str> = results.iter().map(|r| r.tool_name.as_str()).collect();
        assert_eq!(order, vec!["slow", "fast", "medium"]);
        assert_eq!(results[0].text, "slow: q");
    }

    #[tokio::test]
    async fn test_runs_concurrently() {
        let engine = engine(
            vec![slow("a", 100), slow("b", 100), slow("c", 100)],
            Duration::from_secs(5),
        );

        let start = Instant::now();
        engine.execute(&names(&["a", "b", "c"]), "q").await;
        assert!(start.elapsed() < Duration::from_millis(280));
    }

    #[tokio::test]
    async fn test_failing_tool_does_not_hide_siblings() {
        let broken: Arc<dyn Tool> = Arc::new(FnTool::new("broken", "always fails", |_| {
            Err(OrchestrationError::tool("broken", "upstream down"))
        }));
        let engine = engine(vec![broken, slow("ok", 1)], Duration::from_secs(5));

        let results = engine.execute(&names(&["broken", "ok"]), "q").await;

        assert_eq!(results.len(), 2);
        assert!(results[0].is_error);
        assert!(results[0].text.starts_with(TOOL_ERROR_MARKER));
        assert!(results[0].text.contains("upstream down"));
        assert!(!results[1].is_error);
        assert_eq!(results[1].text, "ok: q");
    }

    #[tokio::test]
    async fn test_timeout_unknown_and_panic_become_error_results() {
        let panicky: Arc<dyn Tool> = Arc::new(FnTool::new("panicky", "panics", |_| {
            panic!("index out of bounds")
        }));
        let engine = engine(
            vec![slow("sleepy", 500), panicky],
            Duration::from_millis(50),
        );

        let results = engine
            .execute(&names(&["sleepy", "missing", "panicky"]), "q")
            .await;

        assert!(results.iter().all(|r| r.is_error));
        assert!(results[0].text.contains("timed out"));
        assert!(results[1].text.contains("not registered"));
        assert!(results[2].text.contains("index out of bounds"));
    }

    #[tokio::test]
    async fn test_empty_selection() {
        let engine = engine(vec![slow("a", 1)], Duration::from_secs(1));
        assert!(engine.execute(&[], "q").await.is_empty());
    }
}
