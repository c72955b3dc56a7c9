//! Tool router
//!
//! Decides which registered tools answer a question. The hosted model is
//! asked first; when it is unavailable or keeps failing the router falls
//! back to local keyword overlap, so routing itself never fails.

use crate::config::{AgentConfig, RoutingConfig};
use crate::error::OrchestrationError;
use crate::llm::{with_retry, LanguageModel, RetryPolicy};
use crate::models::{RoutingDecision, RoutingStrategy, ToolInfo};
use crate::Result;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub mod keyword;

/// Which part of a model reply the selection was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchedBy {
    JsonArray,
    ToolNames,
    Indices,
}

impl std::fmt::Display for MatchedBy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MatchedBy::JsonArray => "JSON array",
            MatchedBy::ToolNames => "tool names in reply",
            MatchedBy::Indices => "tool numbers in reply",
        };
        write!(f, "{}", s)
    }
}

/// What a model reply says about tool selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Tool names, in reply order, deduplicated.
    Tools(Vec<String>, MatchedBy),
    /// The model explicitly chose no tool.
    NoTool,
    /// Nothing recognizable in the reply.
    Unparsable,
}

impl Selection {
    pub fn into_tools(self) -> Vec<String> {
        match self {
            Selection::Tools(tools, _) => tools,
            Selection::NoTool | Selection::Unparsable => Vec::new(),
        }
    }
}

pub struct ToolRouter {
    model: Option<Arc<dyn LanguageModel>>,
    config: RoutingConfig,
    policy: RetryPolicy,
}

impl ToolRouter {
    pub fn new(config: &AgentConfig, model: Option<Arc<dyn LanguageModel>>) -> Self {
        Self {
            model,
            config: config.routing.clone(),
            policy: RetryPolicy::new(
                config.routing.attempts,
                config.llm.request_timeout(),
                config.retry_backoff(),
            ),
        }
    }

    /// Strategy that will be tried first for the next question.
    pub fn mode(&self) -> RoutingStrategy {
        match (&self.model, self.config.mode) {
            (Some(_), RoutingStrategy::Model) => RoutingStrategy::Model,
            _ => RoutingStrategy::Keyword,
        }
    }

    /// Select tools for `question`. An empty selection means no tool applies.
    pub async fn route(&self, question: &str, tools: &[ToolInfo]) -> RoutingDecision {
        if let (Some(model), RoutingStrategy::Model) = (&self.model, self.config.mode) {
            match self.route_with_model(model.as_ref(), question, tools).await {
                Ok(decision) => return decision,
                Err(e) => {
                    warn!(error = %e, "Model routing unavailable; using keyword fallback");
                }
            }
        }

        self.route_by_keyword(question, tools)
    }

    async fn route_with_model(
        &self,
        model: &dyn LanguageModel,
        question: &str,
        tools: &[ToolInfo],
    ) -> Result<RoutingDecision> {
        let prompt = build_routing_prompt(question, tools);
        let prompt = prompt.as_str();

        let selection = with_retry(&self.policy, "routing", || async move {
            let reply = model.complete(prompt).await?;
            match parse_selection(&reply, tools) {
                Selection::Unparsable => {
                    debug!(%reply, "Unparsable routing reply");
                    Err(OrchestrationError::RoutingUnavailable(
                        "model reply named no known tool".to_string(),
                    ))
                }
                selection => Ok(selection),
            }
        })
        .await
        .map_err(|e| OrchestrationError::RoutingUnavailable(e.to_string()))?;

        let rationale = match &selection {
            Selection::Tools(_, matched_by) => {
                format!("model selection read from {} ({} tools offered)", matched_by, tools.len())
            }
            Selection::NoTool | Selection::Unparsable => "model selected no tool".to_string(),
        };
        let selected = selection.into_tools();

        info!(strategy = "model", selected = ?selected, "Routing decision");

        Ok(RoutingDecision {
            selected,
            rationale: Some(rationale),
            strategy: RoutingStrategy::Model,
        })
    }

    fn route_by_keyword(&self, question: &str, tools: &[ToolInfo]) -> RoutingDecision {
        let scored = keyword::select(
            question,
            tools,
            self.config.keyword_threshold,
            self.config.max_tools,
        );

        let rationale = if scored.is_empty() {
            "no tool shares a keyword with the question".to_string()
        } else {
            scored
                .iter()
                .map(|(name, score)| format!("{} (overlap {})", name, score))
                .collect::<Vec<_>>()
                .join(", ")
        };
        let selected: Vec<String> = scored.into_iter().map(|(name, _)| name).collect();

        info!(strategy = "keyword", selected = ?selected, "Routing decision");

        RoutingDecision {
            selected,
            rationale: Some(rationale),
            strategy: RoutingStrategy::Keyword,
        }
    }
}

/// Build the routing prompt: numbered tool descriptions plus guidelines.
pub fn build_routing_prompt(question: &str, tools: &[ToolInfo]) -> String {
    let numbered = tools
        .iter()
        .enumerate()
        .map(|(i, t)| format!("{}. {} - {}", i + 1, t.name, t.description))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"You are a routing engine for a financial assistant.

Select every tool needed to answer the question completely.

QUESTION:
{}

Available tools:
{}

Routing guidelines:
- Customer, client, contact or portfolio questions use the database tool
- Current stock prices, quotes and trading volume use the market data tool
- Annual report facts (revenue, segments, risk factors) use the matching company's 10-K filing tool
- Use the PII protection tool only when the question asks to mask or protect personal data
- Combine tools when the question spans several of these areas

Rules:
- Return ONLY a JSON array of tool numbers, e.g. [1, 3]
- Return [] if no tool applies
- No explanation text
"#,
        question, numbered
    )
}

/// Parse a routing reply defensively.
///
/// Accepts JSON arrays of 1-based numbers or tool names, bare comma lists of
/// numbers, and tool names mentioned verbatim. Out-of-range indices are
/// ignored and duplicates dropped, preserving reply order.
pub fn parse_selection(reply: &str, tools: &[ToolInfo]) -> Selection {
    let cleaned = reply
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    if cleaned.is_empty() {
        return Selection::Unparsable;
    }

    // JSON array, possibly wrapped in prose
    if let (Some(start), Some(end)) = (cleaned.find('['), cleaned.rfind(']')) {
        if start < end {
            if let Ok(serde_json::Value::Array(items)) =
                serde_json::from_str::<serde_json::Value>(&cleaned[start..=end])
            {
                if items.is_empty() {
                    return Selection::NoTool;
                }
                let names = items.iter().filter_map(|item| match item {
                    serde_json::Value::Number(n) => {
                        n.as_u64().and_then(|i| tool_at(tools, i as usize))
                    }
                    serde_json::Value::String(s) => resolve_token(tools, s),
                    _ => None,
                });
                let selected = dedupe(names);
                if !selected.is_empty() {
                    return Selection::Tools(selected, MatchedBy::JsonArray);
                }
            }
        }
    }

    let mentioned = mentioned_names(cleaned, tools);
    if !mentioned.is_empty() {
        return Selection::Tools(mentioned, MatchedBy::ToolNames);
    }

    if cleaned
        .split(|c: char| !c.is_alphanumeric())
        .any(|w| w.eq_ignore_ascii_case("none"))
    {
        return Selection::NoTool;
    }

    let indices = dedupe(
        cleaned
            .split(|c: char| !c.is_ascii_digit())
            .filter_map(|s| s.parse::<usize>().ok())
            .filter_map(|i| tool_at(tools, i)),
    );
    if !indices.is_empty() {
        return Selection::Tools(indices, MatchedBy::Indices);
    }

    Selection::Unparsable
}

fn tool_at(tools: &[ToolInfo], one_based: usize) -> Option<String> {
    one_based
        .checked_sub(1)
        .and_then(|i| tools.get(i))
        .map(|t| t.name.clone())
}

fn resolve_token(tools: &[ToolInfo], token: &str) -> Option<String> {
    let token = token.trim();
    if let Ok(i) = token.parse::<usize>() {
        return tool_at(tools, i);
    }
    tools
        .iter()
        .find(|t| t.name.eq_ignore_ascii_case(token))
        .map(|t| t.name.clone())
}

/// Tool names appearing in `text`, ordered by first occurrence.
fn mentioned_names(text: &str, tools: &[ToolInfo]) -> Vec<String> {
    let lowered = text.to_lowercase();
    let mut found: Vec<(usize, String)> = tools
        .iter()
        .filter_map(|t| {
            lowered
                .find(&t.name.to_lowercase())
                .map(|pos| (pos, t.name.clone()))
        })
        .collect();
    found.sort_by_key(|(pos, _)| *pos);
    found.into_iter().map(|(_, name)| name).collect()
}

fn dedupe(names: impl Iterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for name in names {
        if !out.contains(&name) {
            out.push(name);
        }
    }
    out
}
