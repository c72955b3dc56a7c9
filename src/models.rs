//! Core data models for the financial agent

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Marker that prefixes every result produced from a failed tool call.
pub const TOOL_ERROR_MARKER: &str = "[TOOL ERROR]";

/// Prefix of the notice the PII guard attaches to masked output.
pub const PII_NOTICE_PREFIX: &str = "[PII PROTECTED] Masked columns:";

//
// ================= Tabular data =================
//

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { columns, rows }
    }

    /// Pipe-separated rendering followed by a `COLUMNS:` line.
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&self.columns.join(" | "));
        out.push('\n');

        if self.rows.is_empty() {
            out.push_str("(no rows)\n");
        }
        for row in &self.rows {
            out.push_str(&row.join(" | "));
            out.push('\n');
        }

        out.push_str(&format!("COLUMNS: [{}]", self.columns.join(", ")));
        out
    }
}

//
// ================= Tool I/O =================
//

/// What a tool capability hands back: free text, plus a table when the
/// answer is tabular.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolOutput {
    pub text: String,
    pub table: Option<Table>,
}

impl ToolOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            table: None,
        }
    }

    pub fn tabular(text: impl Into<String>, table: Table) -> Self {
        Self {
            text: text.into(),
            table: Some(table),
        }
    }
}

/// Name/description pair as exposed to routing and status endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
}

//
// ================= Execution =================
//

/// Output of one tool invocation within one query.
///
/// Never mutated once built: the PII guard produces a new value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_name: String,
    pub text: String,
    pub table: Option<Table>,
    pub is_error: bool,
    #[serde(default)]
    pub masked_columns: Vec<String>,
    pub execution_time_ms: u64,
}

impl ToolResult {
    pub fn success(tool_name: impl Into<String>, output: ToolOutput, execution_time_ms: u64) -> Self {
        Self {
            tool_name: tool_name.into(),
            text: output.text,
            table: output.table,
            is_error: false,
            masked_columns: Vec::new(),
            execution_time_ms,
        }
    }

    pub fn error(tool_name: impl Into<String>, message: impl fmt::Display, execution_time_ms: u64) -> Self {
        let tool_name = tool_name.into();
        Self {
            text: format!("{} {}: {}", TOOL_ERROR_MARKER, tool_name, message),
            tool_name,
            table: None,
            is_error: true,
            masked_columns: Vec::new(),
            execution_time_ms,
        }
    }

    pub fn column_names(&self) -> Option<&[String]> {
        self.table.as_ref().map(|t| t.columns.as_slice())
    }

    /// Full text form shown to the synthesizer and the caller.
    pub fn render(&self) -> String {
        let mut parts = Vec::with_capacity(3);

        if !self.text.trim().is_empty() {
            parts.push(self.text.trim_end().to_string());
        }
        if let Some(table) = &self.table {
            parts.push(table.render());
        }
        if !self.masked_columns.is_empty() {
            parts.push(format!(
                "{} {}",
                PII_NOTICE_PREFIX,
                self.masked_columns.join(", ")
            ));
        }

        parts.join("\n")
    }
}

//
// ================= Routing =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RoutingStrategy {
    Model,
    Keyword,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoutingDecision {
    pub selected: Vec<String>,
    pub rationale: Option<String>,
    pub strategy: RoutingStrategy,
}

impl RoutingDecision {
    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }
}

//
// ================= Query lifecycle =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum QueryPhase {
    Idle,
    Routing,
    Executing,
    Guarding,
    Synthesizing,
    Done,
    Failed,
}

/// Everything observed while answering one question. Not persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryReport {
    pub query_id: Uuid,
    pub question: String,
    pub answer: String,
    pub decision: RoutingDecision,
    pub results: Vec<ToolResult>,
    pub phases: Vec<QueryPhase>,
    pub reasoning_trace: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStatus {
    pub companies: Vec<String>,
    pub total_tools: usize,
    pub tool_names: Vec<String>,
    pub schema_tables: Vec<String>,
    pub routing_mode: RoutingStrategy,
    pub model_configured: bool,
    pub ready: bool,
}

impl fmt::Display for RoutingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RoutingStrategy::Model => "model",
            RoutingStrategy::Keyword => "keyword",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for QueryPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            QueryPhase::Idle => "IDLE",
            QueryPhase::Routing => "ROUTING",
            QueryPhase::Executing => "EXECUTING",
            QueryPhase::Guarding => "GUARDING",
            QueryPhase::Synthesizing => "SYNTHESIZING",
            QueryPhase::Done => "DONE",
            QueryPhase::Failed => "FAILED",
        };
        write!(f, "{}", s)
    }
}
