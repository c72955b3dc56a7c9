//! Error types for the financial agent coordinator

use thiserror::Error;

/// Result type alias for coordinator operations
pub type Result<T> = std::result::Result<T, OrchestrationError>;

#[derive(Error, Debug)]
pub enum OrchestrationError {

    // =============================
    // Pipeline Errors
    // =============================

    /// The hosted model could not produce a routing decision.
    /// Absorbed by the router, which falls back to keyword routing.
    #[error("Routing unavailable: {0}")]
    RoutingUnavailable(String),

    /// A single tool failed. Absorbed by the executor into an error result.
    #[error("Tool '{tool}' failed: {message}")]
    ToolExecution { tool: String, message: String },

    /// The hosted model could not merge tool outputs.
    /// Absorbed by the synthesizer, which concatenates instead.
    #[error("Synthesis unavailable: {0}")]
    SynthesisUnavailable(String),

    /// No tool is registered, so no query can be answered.
    #[error("Tool registry is empty: no tool can answer the query")]
    EmptyRegistry,

    #[error("Duplicate tool name: {0}")]
    DuplicateTool(String),

    // =============================
    // Collaborator Errors
    // =============================

    #[error("Invalid tool input: {0}")]
    InvalidToolInput(String),

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Configuration error: {0}")]
    Config(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("SQL error: {0}")]
    SqlError(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl OrchestrationError {
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolExecution {
            tool: tool.into(),
            message: message.into(),
        }
    }
}
