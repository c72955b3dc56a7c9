//! Agent configuration
//!
//! Every pipeline instance receives its own `AgentConfig`, so several agents
//! with different model settings can live in one process.

use crate::error::OrchestrationError;
use crate::models::RoutingStrategy;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub synthesis: SynthesisConfig,
    /// Base delay between model retries; doubles on each attempt.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_companies")]
    pub companies: Vec<String>,
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
    #[serde(default = "default_documents_dir")]
    pub documents_dir: PathBuf,
    #[serde(default = "default_market_api_base")]
    pub market_api_base: String,
    #[serde(default = "default_api_port")]
    pub api_port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Empty means "no hosted model": every model-backed step uses its fallback.
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Used for filing passage search.
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    #[serde(default = "default_routing_mode")]
    pub mode: RoutingStrategy,
    /// Model attempts before falling back to keyword routing.
    #[serde(default = "default_routing_attempts")]
    pub attempts: u32,
    #[serde(default = "default_keyword_threshold")]
    pub keyword_threshold: usize,
    #[serde(default = "default_max_tools")]
    pub max_tools: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisConfig {
    /// Model attempts before concatenating results (2 = one retry).
    #[serde(default = "default_synthesis_attempts")]
    pub attempts: u32,
}

fn default_retry_backoff_ms() -> u64 { 250 }
fn default_companies() -> Vec<String> {
    vec!["AAPL".to_string(), "GOOGL".to_string(), "TSLA".to_string()]
}
fn default_database_path() -> PathBuf { PathBuf::from("data/financial.db") }
fn default_documents_dir() -> PathBuf { PathBuf::from("data/10k_documents") }
fn default_market_api_base() -> String { "https://query1.finance.yahoo.com".to_string() }
fn default_api_port() -> u16 { 8080 }
fn default_api_base() -> String { "https://api.openai.com/v1".to_string() }
fn default_model() -> String { "gpt-3.5-turbo".to_string() }
fn default_embedding_model() -> String { "text-embedding-ada-002".to_string() }
fn default_max_tokens() -> u32 { 1024 }
fn default_request_timeout_secs() -> u64 { 30 }
fn default_routing_mode() -> RoutingStrategy { RoutingStrategy::Model }
fn default_routing_attempts() -> u32 { 3 }
fn default_keyword_threshold() -> usize { 1 }
fn default_max_tools() -> usize { 3 }
fn default_tool_timeout_secs() -> u64 { 45 }
fn default_synthesis_attempts() -> u32 { 2 }

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            api_key: String::new(),
            model: default_model(),
            embedding_model: default_embedding_model(),
            temperature: 0.0,
            max_tokens: default_max_tokens(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            mode: default_routing_mode(),
            attempts: default_routing_attempts(),
            keyword_threshold: default_keyword_threshold(),
            max_tools: default_max_tools(),
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            tool_timeout_secs: default_tool_timeout_secs(),
        }
    }
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            attempts: default_synthesis_attempts(),
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig::default(),
            routing: RoutingConfig::default(),
            execution: ExecutionConfig::default(),
            synthesis: SynthesisConfig::default(),
            retry_backoff_ms: default_retry_backoff_ms(),
            companies: default_companies(),
            database_path: default_database_path(),
            documents_dir: default_documents_dir(),
            market_api_base: default_market_api_base(),
            api_port: default_api_port(),
        }
    }
}

impl LlmConfig {
    pub fn is_configured(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl ExecutionConfig {
    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }
}

impl AgentConfig {
    /// Defaults, overridden by a `.env` file and the process environment.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let mut config = Self::default();

        if let Ok(key) = env::var("OPENAI_API_KEY") {
            config.llm.api_key = key;
        }
        if let Ok(base) = env::var("OPENAI_API_BASE") {
            config.llm.api_base = base.trim_end_matches('/').to_string();
        }
        if let Ok(model) = env::var("AGENT_MODEL") {
            config.llm.model = model;
        }
        if let Ok(model) = env::var("AGENT_EMBEDDING_MODEL") {
            config.llm.embedding_model = model;
        }
        if let Ok(mode) = env::var("AGENT_ROUTING_MODE") {
            config.routing.mode = parse_routing_mode(&mode)?;
        }
        if let Ok(path) = env::var("AGENT_DATABASE_PATH") {
            config.database_path = PathBuf::from(path);
        }
        if let Ok(dir) = env::var("AGENT_DOCUMENTS_DIR") {
            config.documents_dir = PathBuf::from(dir);
        }
        if let Ok(base) = env::var("MARKET_API_BASE") {
            config.market_api_base = base.trim_end_matches('/').to_string();
        }
        if let Ok(companies) = env::var("AGENT_COMPANIES") {
            config.companies = companies
                .split(',')
                .map(|s| s.trim().to_uppercase())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Ok(port) = env::var("PORT").or_else(|_| env::var("API_PORT")) {
            config.api_port = port
                .parse()
                .map_err(|e| OrchestrationError::Config(format!("invalid port '{}': {}", port, e)))?;
        }

        Ok(config)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

fn parse_routing_mode(value: &str) -> Result<RoutingStrategy> {
    match value.trim().to_lowercase().as_str() {
        "model" | "llm" => Ok(RoutingStrategy::Model),
        "keyword" | "local" => Ok(RoutingStrategy::Keyword),
        other => Err(OrchestrationError::Config(format!(
            "unknown routing mode '{}' (expected 'model' or 'keyword')",
            other
        ))),
    }
}
