use financial_agent_coordinator::{agent::FinancialAgent, api::start_server, config::AgentConfig};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Loads .env as well
    let config = AgentConfig::from_env()?;
    let api_port = config.api_port;

    if !config.llm.is_configured() {
        warn!("OPENAI_API_KEY not set; routing and synthesis use local fallbacks");
    }

    info!("🚀 Financial Agent - API Server");
    info!("📍 Port: {}", api_port);

    let agent = Arc::new(FinancialAgent::from_config(config).await?);

    let status = agent.status();
    info!(tools = ?status.tool_names, ready = status.ready, "✅ Agent initialized");
    info!("📡 Starting API server...");

    start_server(agent, api_port).await?;

    Ok(())
}
