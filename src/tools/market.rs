//! Live market data tool
//!
//! Identifies the companies a question mentions and reports a point-in-time
//! quote for each through a [`QuoteSource`].

use crate::error::OrchestrationError;
use crate::models::ToolOutput;
use crate::tools::{Tool, COMPANY_CATALOG};
use crate::Result;
use async_trait::async_trait;
use futures::future::join_all;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub symbol: String,
    pub price: f64,
    pub previous_close: Option<f64>,
    pub volume: Option<u64>,
    pub currency: Option<String>,
}

impl Quote {
    pub fn change(&self) -> Option<(f64, f64)> {
        let previous = self.previous_close.filter(|p| *p != 0.0)?;
        let change = self.price - previous;
        Some((change, change / previous * 100.0))
    }
}

#[async_trait]
pub trait QuoteSource: Send + Sync {
    async fn quote(&self, symbol: &str) -> Result<Quote>;
}

/// Yahoo Finance chart endpoint.
pub struct YahooQuoteSource {
    client: Client,
    base_url: String,
}

impl YahooQuoteSource {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(4)
            .timeout(Duration::from_secs(10))
            .user_agent("Mozilla/5.0 (compatible; financial-agent-coordinator)")
            .build()
            .map_err(|e| OrchestrationError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl QuoteSource for YahooQuoteSource {
    async fn quote(&self, symbol: &str) -> Result<Quote> {
        let url = format!("{}/v8/finance/chart/{}", self.base_url, symbol);

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(OrchestrationError::tool(
                "finance_market_search_tool",
                format!("quote API returned {} for {}", status, symbol),
            ));
        }

        let body: ChartResponse = response.json().await?;
        parse_chart(symbol, body)
    }
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    result: Option<Vec<ChartResult>>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: ChartMeta,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    regular_market_price: Option<f64>,
    chart_previous_close: Option<f64>,
    previous_close: Option<f64>,
    regular_market_volume: Option<u64>,
    currency: Option<String>,
}

fn parse_chart(symbol: &str, body: ChartResponse) -> Result<Quote> {
    let meta = body
        .chart
        .result
        .and_then(|r| r.into_iter().next())
        .map(|r| r.meta)
        .ok_or_else(|| {
            OrchestrationError::tool("finance_market_search_tool", format!("no chart data for {}", symbol))
        })?;

    let price = meta.regular_market_price.ok_or_else(|| {
        OrchestrationError::tool("finance_market_search_tool", format!("no price for {}", symbol))
    })?;

    Ok(Quote {
        symbol: symbol.to_string(),
        price,
        previous_close: meta.previous_close.or(meta.chart_previous_close),
        volume: meta.regular_market_volume,
        currency: meta.currency,
    })
}

#[derive(Debug, Clone)]
struct Company {
    symbol: String,
    name: String,
    aliases: Vec<String>,
}

pub struct MarketDataTool {
    source: Arc<dyn QuoteSource>,
    companies: Vec<Company>,
    description: String,
}

impl MarketDataTool {
    pub fn new(source: Arc<dyn QuoteSource>, symbols: &[String]) -> Self {
        let companies: Vec<Company> = symbols
            .iter()
            .map(|symbol| {
                let symbol = symbol.to_uppercase();
                match COMPANY_CATALOG.iter().find(|(s, _, _)| *s == symbol) {
                    Some((s, name, aliases)) => Company {
                        symbol: s.to_string(),
                        name: name.to_string(),
                        aliases: aliases.iter().map(|a| a.to_string()).collect(),
                    },
                    None => Company {
                        aliases: vec![symbol.to_lowercase()],
                        name: symbol.clone(),
                        symbol,
                    },
                }
            })
            .collect();

        let covered = companies
            .iter()
            .map(|c| format!("{} ({})", c.name, c.symbol))
            .collect::<Vec<_>>()
            .join(", ");
        let description = format!(
            "Live stock market data: current share price, daily price change, trading volume \
             and quotes for {}",
            covered
        );

        Self {
            source,
            companies,
            description,
        }
    }

    fn identify(&self, question: &str) -> Vec<&Company> {
        let words: Vec<String> = question
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(|w| w.to_string())
            .collect();

        self.companies
            .iter()
            .filter(|c| c.aliases.iter().any(|a| words.iter().any(|w| w == a)))
            .collect()
    }
}

#[async_trait]
impl Tool for MarketDataTool {
    fn name(&self) -> &str {
        "finance_market_search_tool"
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn call(&self, input: &str) -> Result<ToolOutput> {
        let companies = self.identify(input);

        if companies.is_empty() {
            let supported = self
                .companies
                .iter()
                .map(|c| c.symbol.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            return Ok(ToolOutput::text(format!(
                "No supported company mentioned. Market data is available for: {}",
                supported
            )));
        }

        debug!(symbols = ?companies.iter().map(|c| &c.symbol).collect::<Vec<_>>(), "Fetching quotes");

        let quotes = join_all(companies.iter().map(|c| self.source.quote(&c.symbol))).await;

        let mut lines = vec!["Current market data:".to_string()];
        for (company, quote) in companies.iter().zip(quotes) {
            match quote {
                Ok(quote) => lines.push(format_quote(&company.name, &quote)),
                Err(e) => {
                    warn!(symbol = %company.symbol, error = %e, "Quote lookup failed");
                    lines.push(format!(
                        "- {} ({}): market data unavailable ({})",
                        company.symbol, company.name, e
                    ));
                }
            }
        }

        Ok(ToolOutput::text(lines.join("\n")))
    }
}

fn format_quote(name: &str, quote: &Quote) -> String {
    let currency = quote.currency.as_deref().unwrap_or("USD");
    let mut line = format!(
        "- {} ({}): {:.2} {}",
        quote.symbol, name, quote.price, currency
    );

    if let Some((change, pct)) = quote.change() {
        line.push_str(&format!(", change {:+.2} ({:+.2}%)", change, pct));
    }
    if let Some(volume) = quote.volume {
        line.push_str(&format!(", volume {}", group_thousands(volume)));
    }

    line
}

fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
