use financial_agent_coordinator::{agent::FinancialAgent, config::AgentConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let question = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    if question.trim().is_empty() {
        eprintln!("Usage: finagent <question>");
        eprintln!("Example: finagent \"What is Apple's current stock price?\"");
        std::process::exit(2);
    }

    let config = AgentConfig::from_env()?;
    if !config.llm.is_configured() {
        eprintln!("⚠️  OPENAI_API_KEY not set; using keyword routing and concatenated answers");
    }

    info!("Financial Agent starting");

    let agent = FinancialAgent::from_config(config).await?;

    match agent.query_with_report(&question).await {
        Ok(report) => {
            println!("\n=== ANSWER ===");
            println!("{}", report.answer);
            println!("\nTools: {} ({} routing)", report.decision.selected.join(", "), report.decision.strategy);
            println!("\nReasoning Trace:");
            for (i, trace) in report.reasoning_trace.iter().enumerate() {
                println!("  {}: {}", i + 1, trace);
            }
            println!("\nCompleted in {} ms", report.elapsed_ms);
            Ok(())
        }
        Err(e) => {
            eprintln!("Query failed: {}", e);
            Err(Box::new(e) as Box<dyn std::error::Error>)
        }
    }
}
