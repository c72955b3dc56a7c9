//! Financial Agent Coordinator
//!
//! A multi-tool financial agent that:
//! - Routes each question to the relevant tools (hosted model, keyword fallback)
//! - Runs the selected tools concurrently and absorbs their failures
//! - Masks personal data in tabular tool results before anything leaves the pipeline
//! - Merges the results into one answer (hosted model, concatenation fallback)
//!
//! PIPELINE:
//! QUESTION → ROUTE → EXECUTE → GUARD → SYNTHESIZE → ANSWER

pub mod agent;
pub mod api;
pub mod config;
pub mod error;
pub mod execution;
pub mod guard;
pub mod llm;
pub mod models;
pub mod router;
pub mod schema;
pub mod synthesis;
pub mod tools;

#[cfg(test)]
mod testing;

pub use error::{OrchestrationError, Result};

// Re-export common types
pub use agent::FinancialAgent;
pub use config::AgentConfig;
pub use models::*;
pub use tools::{Tool, ToolRegistry};
