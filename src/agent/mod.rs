//! Financial agent coordinator - implements the query pipeline
//!
//! QUESTION → ROUTE → EXECUTE → GUARD → SYNTHESIZE → ANSWER

use crate::config::AgentConfig;
use crate::error::OrchestrationError;
use crate::execution::ExecutionEngine;
use crate::guard::PiiGuard;
use crate::llm::{model_from_config, LanguageModel};
use crate::models::{AgentStatus, QueryPhase, QueryReport, ToolInfo};
use crate::router::ToolRouter;
use crate::schema::SchemaContext;
use crate::synthesis::Synthesizer;
use crate::tools::{create_default_registry, ToolRegistry};
use crate::Result;
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Short, stable identifier for a question, safe to log.
pub fn question_fingerprint(question: &str) -> String {
    let hash = Sha256::digest(question.trim().as_bytes());
    hex::encode(&hash[..6])
}

/// Coordinates routing, execution, guarding and synthesis for each question.
///
/// Holds no per-query state: one instance can serve any number of
/// concurrent queries.
pub struct FinancialAgent {
    config: AgentConfig,
    registry: Arc<ToolRegistry>,
    router: ToolRouter,
    execution_engine: ExecutionEngine,
    guard: PiiGuard,
    synthesizer: Synthesizer,
    schema: SchemaContext,
    model: Option<Arc<dyn LanguageModel>>,
}

impl FinancialAgent {
    pub fn new(
        config: AgentConfig,
        registry: Arc<ToolRegistry>,
        model: Option<Arc<dyn LanguageModel>>,
    ) -> Self {
        let router = ToolRouter::new(&config, model.clone());
        let execution_engine =
            ExecutionEngine::new(Arc::clone(&registry), config.execution.tool_timeout());
        let synthesizer = Synthesizer::new(&config, model.clone());

        Self {
            config,
            registry,
            router,
            execution_engine,
            guard: PiiGuard::new(),
            synthesizer,
            schema: SchemaContext::financial(),
            model,
        }
    }

    /// Build the hosted model client and the bundled tools from `config`.
    pub async fn from_config(config: AgentConfig) -> Result<Self> {
        let model = model_from_config(&config)?;
        let registry = create_default_registry(&config, model.clone()).await?;

        info!(
            tools = registry.len(),
            model = model.as_ref().map(|m| m.name()).unwrap_or("none"),
            "Financial agent initialized"
        );

        Ok(Self::new(config, Arc::new(registry), model))
    }

    /// Answer `question`. Fails only when no tool is registered.
    pub async fn query(&self, question: &str) -> Result<String> {
        self.query_with_report(question).await.map(|r| r.answer)
    }

    /// Answer `question` and return everything observed along the way.
    pub async fn query_with_report(&self, question: &str) -> Result<QueryReport> {
        let start_time = Instant::now();
        let query_id = Uuid::new_v4();
        let fingerprint = question_fingerprint(question);
        let mut phases = vec![QueryPhase::Idle];
        let mut reasoning_trace = Vec::new();

        info!(%query_id, %fingerprint, "Agent: question received");
        reasoning_trace.push("INPUT: Question received".to_string());

        // === ROUTE ===
        phases.push(QueryPhase::Routing);
        if self.registry.is_empty() {
            phases.push(QueryPhase::Failed);
            error!(%query_id, phases = ?phases, "No tools registered");
            return Err(OrchestrationError::EmptyRegistry);
        }

        let tools = self.registry.list();
        let decision = self.router.route(question, &tools).await;
        reasoning_trace.push(format!(
            "ROUTE: {} routing selected {} of {} tools [{}]",
            decision.strategy,
            decision.selected.len(),
            tools.len(),
            decision.selected.join(", ")
        ));
        if let Some(rationale) = &decision.rationale {
            reasoning_trace.push(format!("ROUTE: {}", rationale));
        }

        // === EXECUTE ===
        phases.push(QueryPhase::Executing);
        let results = self
            .execution_engine
            .execute(&decision.selected, question)
            .await;

        for result in &results {
            reasoning_trace.push(format!(
                "OBSERVE: {} - {} ({} ms)",
                result.tool_name,
                if result.is_error { "error" } else { "ok" },
                result.execution_time_ms
            ));
        }

        // === GUARD ===
        phases.push(QueryPhase::Guarding);
        let results = self.guard.protect_all(&results);

        let masked: Vec<String> = results
            .iter()
            .filter(|r| !r.masked_columns.is_empty())
            .map(|r| format!("{} [{}]", r.tool_name, r.masked_columns.join(", ")))
            .collect();
        if masked.is_empty() {
            reasoning_trace.push("GUARD: No sensitive columns".to_string());
        } else {
            reasoning_trace.push(format!("GUARD: Masked {}", masked.join("; ")));
        }

        // === SYNTHESIZE ===
        phases.push(QueryPhase::Synthesizing);
        let synthesis = self.synthesizer.synthesize(question, &results).await;
        reasoning_trace.push(format!("SYNTHESIZE: {:?}", synthesis.mode));

        phases.push(QueryPhase::Done);
        reasoning_trace.push("COMPLETE: Answer ready".to_string());

        let elapsed_ms = start_time.elapsed().as_millis() as u64;

        info!(
            %query_id,
            %fingerprint,
            strategy = %decision.strategy,
            tools = ?decision.selected,
            errors = results.iter().filter(|r| r.is_error).count(),
            elapsed_ms,
            "Agent: query complete"
        );
        debug!(%query_id, answer_len = synthesis.answer.len(), "Answer length");

        Ok(QueryReport {
            query_id,
            question: question.to_string(),
            answer: synthesis.answer,
            decision,
            results,
            phases,
            reasoning_trace,
            created_at: Utc::now(),
            elapsed_ms,
        })
    }

    pub fn status(&self) -> AgentStatus {
        AgentStatus {
            companies: self.config.companies.clone(),
            total_tools: self.registry.len(),
            tool_names: self.registry.names().into_iter().map(String::from).collect(),
            schema_tables: self.schema.table_names(),
            routing_mode: self.router.mode(),
            model_configured: self.model.is_some(),
            ready: !self.registry.is_empty(),
        }
    }

    pub fn list_tools(&self) -> Vec<ToolInfo> {
        self.registry.list()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RoutingStrategy, Table, ToolOutput, TOOL_ERROR_MARKER};
    use crate::testing::FailingModel;
    use crate::tools::{FnTool, Tool};
    use futures::future::join_all;

    fn fast_config() -> AgentConfig {
        let mut config = AgentConfig::default();
        config.retry_backoff_ms = 0;
        config.llm.request_timeout_secs = 1;
        config.execution.tool_timeout_secs = 2;
        config
    }

    fn text_tool(name: &str, description: &str, reply: &'static str) -> Arc<dyn Tool> {
        Arc::new(FnTool::new(name, description, move |_| Ok(ToolOutput::text(reply))))
    }

    fn registry(tools: Vec<Arc<dyn Tool>>) -> Arc<ToolRegistry> {
        let mut registry = ToolRegistry::new();
        for tool in tools {
            registry.register(tool).unwrap();
        }
        Arc::new(registry)
    }

    fn disjoint_registry() -> Arc<ToolRegistry> {
        registry(vec![
            text_tool("weather", "Forecast rainfall and temperature", "Rain expected"),
            text_tool("quotes", "Equity share price lookup", "ACME trades at 12.50"),
            text_tool("filings", "Annual report excerpts", "Revenue grew 8%"),
        ])
    }

    #[tokio::test]
    async fn test_always_answers_with_tools_registered() {
        let agent = FinancialAgent::new(fast_config(), disjoint_registry(), None);

        for question in ["", "zzqx blorp", "share price please", "   ", "rainfall and annual report"] {
            let answer = agent.query(question).await.unwrap();
            assert!(!answer.trim().is_empty(), "empty answer for {:?}", question);
        }
    }

    #[tokio::test]
    async fn test_keyword_fallback_selects_unique_tool() {
        let model = Arc::new(FailingModel::default());
        let agent = FinancialAgent::new(
            fast_config(),
            disjoint_registry(),
            Some(model.clone() as Arc<dyn LanguageModel>),
        );

        let report = agent
            .query_with_report("what is the latest share price")
            .await
            .unwrap();

        assert_eq!(report.decision.strategy, RoutingStrategy::Keyword);
        assert_eq!(report.decision.selected, vec!["quotes"]);
        assert_eq!(report.answer, "ACME trades at 12.50");
    }

    #[tokio::test]
    async fn test_failing_tool_does_not_hide_sibling() {
        let broken: Arc<dyn Tool> = Arc::new(FnTool::new(
            "weather",
            "Forecast rainfall",
            |_| Err(OrchestrationError::tool("weather", "station offline")),
        ));
        let agent = FinancialAgent::new(
            fast_config(),
            registry(vec![
                broken,
                text_tool("quotes", "Equity share price", "ACME trades at 12.50"),
            ]),
            None,
        );

        let answer = agent.query("rainfall and share price").await.unwrap();

        assert!(answer.contains("### weather"));
        assert!(answer.contains(TOOL_ERROR_MARKER));
        assert!(answer.contains("### quotes\nACME trades at 12.50"));
    }

    #[tokio::test]
    async fn test_tabular_results_are_guarded() {
        let customers: Arc<dyn Tool> = Arc::new(FnTool::new(
            "customers",
            "Customer contact lookup",
            |_| {
                Ok(ToolOutput::tabular(
                    "Database Results (1 rows):",
                    Table::new(
                        vec!["id".into(), "email".into(), "phone".into()],
                        vec![vec!["1".into(), "jane.doe@example.com".into(), "555-0101".into()]],
                    ),
                ))
            },
        ));
        let agent = FinancialAgent::new(fast_config(), registry(vec![customers]), None);

        let report = agent.query_with_report("customer contact").await.unwrap();

        assert!(report.answer.contains("1 | j***@example.com | ***-0101"));
        assert!(!report.answer.contains("jane.doe"));
        assert!(report.answer.ends_with("[PII PROTECTED] Masked columns: email, phone"));
        assert!(report.reasoning_trace.iter().any(|t| t.starts_with("GUARD: Masked customers")));
    }

    #[tokio::test]
    async fn test_phases_in_order() {
        let agent = FinancialAgent::new(fast_config(), disjoint_registry(), None);

        let report = agent.query_with_report("annual report").await.unwrap();
        assert_eq!(
            report.phases,
            vec![
                QueryPhase::Idle,
                QueryPhase::Routing,
                QueryPhase::Executing,
                QueryPhase::Guarding,
                QueryPhase::Synthesizing,
                QueryPhase::Done,
            ]
        );
        assert_eq!(report.reasoning_trace.first().unwrap(), "INPUT: Question received");
        assert_eq!(report.reasoning_trace.last().unwrap(), "COMPLETE: Answer ready");
    }

    #[tokio::test]
    async fn test_empty_registry_is_the_only_error() {
        let agent = FinancialAgent::new(fast_config(), Arc::new(ToolRegistry::new()), None);

        let err = agent.query("anything").await.unwrap_err();
        assert!(matches!(err, OrchestrationError::EmptyRegistry));
        assert!(!agent.status().ready);
    }

    #[tokio::test]
    async fn test_concurrent_queries_share_agent() {
        let agent = Arc::new(FinancialAgent::new(fast_config(), disjoint_registry(), None));

        let questions = ["share price", "rainfall", "annual report", "nothing relevant"];
        let answers = join_all(questions.iter().map(|q| {
            let agent = Arc::clone(&agent);
            async move { agent.query(q).await }
        }))
        .await;

        assert_eq!(answers[0].as_ref().unwrap(), "ACME trades at 12.50");
        assert_eq!(answers[1].as_ref().unwrap(), "Rain expected");
        assert_eq!(answers[2].as_ref().unwrap(), "Revenue grew 8%");
        assert!(answers[3].as_ref().unwrap().contains("None of the available tools"));
    }

    #[test]
    fn test_status_and_tool_listing() {
        let agent = FinancialAgent::new(fast_config(), disjoint_registry(), None);

        let status = agent.status();
        assert_eq!(status.total_tools, 3);
        assert_eq!(status.tool_names, vec!["weather", "quotes", "filings"]);
        assert_eq!(status.routing_mode, RoutingStrategy::Keyword);
        assert!(!status.model_configured);
        assert!(status.ready);
        assert!(status.schema_tables.contains(&"customers".to_string()));

        assert_eq!(agent.list_tools()[1].description, "Equity share price lookup");
    }

    #[test]
    fn test_question_fingerprint() {
        assert_eq!(question_fingerprint("abc"), question_fingerprint("  abc "));
        assert_eq!(question_fingerprint("abc").len(), 12);
        assert_ne!(question_fingerprint("abc"), question_fingerprint("abd"));
    }
}
