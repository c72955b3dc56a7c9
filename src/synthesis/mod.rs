//! Answer synthesis
//!
//! Merges guarded tool results into one answer. A single result is returned
//! verbatim; several are merged by the language model, or concatenated under
//! per-tool headers when the model is unavailable.

use crate::config::AgentConfig;
use crate::error::OrchestrationError;
use crate::llm::{with_retry, LanguageModel, RetryPolicy};
use crate::models::ToolResult;
use crate::Result;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// How the final answer was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthesisMode {
    Verbatim,
    Model,
    Concatenated,
    Declined,
}

#[derive(Debug, Clone)]
pub struct Synthesis {
    pub answer: String,
    pub mode: SynthesisMode,
}

pub struct Synthesizer {
    model: Option<Arc<dyn LanguageModel>>,
    policy: RetryPolicy,
}

impl Synthesizer {
    pub fn new(config: &AgentConfig, model: Option<Arc<dyn LanguageModel>>) -> Self {
        Self {
            model,
            policy: RetryPolicy::new(
                config.synthesis.attempts,
                config.llm.request_timeout(),
                config.retry_backoff(),
            ),
        }
    }

    /// Produce the final answer. Never returns an empty string.
    pub async fn synthesize(&self, question: &str, results: &[ToolResult]) -> Synthesis {
        match results {
            [] => self.answer_without_tools(question).await,
            [single] => Synthesis {
                answer: non_empty_render(single),
                mode: SynthesisMode::Verbatim,
            },
            _ => match self.merge_with_model(question, results).await {
                Ok(answer) => Synthesis {
                    answer,
                    mode: SynthesisMode::Model,
                },
                Err(e) => {
                    warn!(error = %e, "Synthesis unavailable; concatenating tool results");
                    Synthesis {
                        answer: concatenate(results),
                        mode: SynthesisMode::Concatenated,
                    }
                }
            },
        }
    }

    async fn answer_without_tools(&self, question: &str) -> Synthesis {
        if let Some(model) = &self.model {
            let prompt = build_general_prompt(question);
            match self.complete(model.as_ref(), &prompt).await {
                Ok(answer) => {
                    return Synthesis {
                        answer,
                        mode: SynthesisMode::Model,
                    }
                }
                Err(e) => warn!(error = %e, "General answer unavailable"),
            }
        }

        info!("No tool applies; declining");
        Synthesis {
            answer: decline_message(question),
            mode: SynthesisMode::Declined,
        }
    }

    async fn merge_with_model(&self, question: &str, results: &[ToolResult]) -> Result<String> {
        let model = self.model.as_ref().ok_or_else(|| {
            OrchestrationError::SynthesisUnavailable("no language model configured".to_string())
        })?;

        let prompt = build_synthesis_prompt(question, results);
        debug!(results = results.len(), "Merging tool results with model");

        self.complete(model.as_ref(), &prompt).await
    }

    async fn complete(&self, model: &dyn LanguageModel, prompt: &str) -> Result<String> {
        with_retry(&self.policy, "synthesis", || async move {
            let reply = model.complete(prompt).await?;
            let reply = reply.trim();
            if reply.is_empty() {
                return Err(OrchestrationError::SynthesisUnavailable(
                    "model returned an empty answer".to_string(),
                ));
            }
            Ok(reply.to_string())
        })
        .await
        .map_err(|e| OrchestrationError::SynthesisUnavailable(e.to_string()))
    }
}

pub fn build_synthesis_prompt(question: &str, results: &[ToolResult]) -> String {
    let sections = results
        .iter()
        .map(|r| format!("=== {} ===\n{}", r.tool_name, r.render()))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        r#"You are a financial assistant. Combine the tool outputs below into one clear answer.

QUESTION:
{}

TOOL OUTPUTS:
{}

Rules:
- Use only facts present in the tool outputs
- Keep masked values masked exactly as shown
- Mention when a tool reported an error
- Be concise
"#,
        question, sections
    )
}

fn build_general_prompt(question: &str) -> String {
    format!(
        r#"You are a financial assistant. None of your data tools apply to this question.
Answer briefly from general knowledge, or say you cannot help if it needs private or live data.

QUESTION:
{}
"#,
        question
    )
}

/// `### <tool>` header then the verbatim result text, per result in order.
pub fn concatenate(results: &[ToolResult]) -> String {
    results
        .iter()
        .map(|r| format!("### {}\n{}", r.tool_name, non_empty_render(r)))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn non_empty_render(result: &ToolResult) -> String {
    let rendered = result.render();
    if rendered.trim().is_empty() {
        format!("{} returned no output.", result.tool_name)
    } else {
        rendered
    }
}

fn decline_message(question: &str) -> String {
    format!(
        "None of the available tools can answer \"{}\". Try asking about customer portfolios, \
         current stock prices, or company annual reports.",
        question.trim()
    )
}
