//! Tool trait and registry
//!
//! Tools take the user's question as free text and return text, plus column
//! metadata when the answer is tabular. The registry is built once at startup
//! and shared read-only afterwards.

use crate::config::AgentConfig;
use crate::error::OrchestrationError;
use crate::llm::{embedder_from_config, LanguageModel};
use crate::models::{ToolInfo, ToolOutput};
use crate::Result;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

pub mod database;
pub mod documents;
pub mod market;
pub mod privacy;

pub use database::DatabaseQueryTool;
pub use documents::DocumentSearchTool;
pub use market::{MarketDataTool, QuoteSource, YahooQuoteSource};
pub use privacy::PiiProtectionTool;

/// (symbol, display name, aliases matched as whole words)
pub(crate) const COMPANY_CATALOG: &[(&str, &str, &[&str])] = &[
    ("AAPL", "Apple Inc.", &["apple", "aapl"]),
    ("GOOGL", "Alphabet Inc.", &["google", "alphabet", "googl", "goog"]),
    ("TSLA", "Tesla Inc.", &["tesla", "tsla"]),
    ("MSFT", "Microsoft Corporation", &["microsoft", "msft"]),
];

pub(crate) fn company_name(symbol: &str) -> Option<&'static str> {
    COMPANY_CATALOG
        .iter()
        .find(|(s, _, _)| s.eq_ignore_ascii_case(symbol))
        .map(|(_, name, _)| *name)
}

/// A registered capability
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    /// Free text the router matches questions against.
    fn description(&self) -> &str;
    async fn call(&self, input: &str) -> Result<ToolOutput>;
}

type Capability = dyn Fn(&str) -> Result<ToolOutput> + Send + Sync;

/// Wraps a plain function as a tool.
pub struct FnTool {
    name: String,
    description: String,
    capability: Box<Capability>,
}

impl FnTool {
    pub fn new<F>(name: impl Into<String>, description: impl Into<String>, capability: F) -> Self
    where
        F: Fn(&str) -> Result<ToolOutput> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            capability: Box::new(capability),
        }
    }
}

impl fmt::Debug for FnTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnTool").field("name", &self.name).finish()
    }
}

#[async_trait::async_trait]
impl Tool for FnTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn call(&self, input: &str) -> Result<ToolOutput> {
        (self.capability)(input)
    }
}

/// Append-only registry. Registration order is the routing index order.
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<()> {
        let name = tool.name().to_string();
        if self.index.contains_key(&name) {
            return Err(OrchestrationError::DuplicateTool(name));
        }

        self.index.insert(name, self.tools.len());
        self.tools.push(tool);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.index.get(name).map(|&i| Arc::clone(&self.tools[i]))
    }

    pub fn list(&self) -> Vec<ToolInfo> {
        self.tools
            .iter()
            .map(|tool| ToolInfo {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
            })
            .collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Create the registry with the bundled financial tools.
///
/// Filing tools are only registered for companies whose filing text exists;
/// the database tool only when the database file exists.
pub async fn create_default_registry(
    config: &AgentConfig,
    model: Option<Arc<dyn LanguageModel>>,
) -> Result<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    let embedder = embedder_from_config(config)?;

    for symbol in &config.companies {
        match DocumentSearchTool::from_documents_dir(&config.documents_dir, symbol, model.clone()) {
            Ok(Some(tool)) => registry.register(Arc::new(tool.with_embedder(embedder.clone())))?,
            Ok(None) => warn!(%symbol, dir = %config.documents_dir.display(), "No filing found; skipping document tool"),
            Err(e) => warn!(%symbol, error = %e, "Failed to build document tool"),
        }
    }

    if config.database_path.exists() {
        let tool = DatabaseQueryTool::connect(&config.database_path, model.clone()).await?;
        registry.register(Arc::new(tool))?;
    } else {
        warn!(path = %config.database_path.display(), "Database not found; skipping database tool");
    }

    let quotes = YahooQuoteSource::new(&config.market_api_base)?;
    registry.register(Arc::new(MarketDataTool::new(
        Arc::new(quotes),
        &config.companies,
    )))?;

    registry.register(Arc::new(PiiProtectionTool))?;

    info!(tools = ?registry.names(), "Tool registry created");

    Ok(registry)
}
