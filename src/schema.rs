//! Schema context for prompt construction
//!
//! A static description of the read-only financial store. The database tool
//! embeds it in its text-to-SQL prompt.

const FINANCIAL_SCHEMA: &str = r#"Database Schema with Relationships:

TABLE: customers (Customer Information)
- id (PRIMARY KEY, INTEGER) - Unique customer identifier
- first_name (TEXT) - Customer first name
- last_name (TEXT) - Customer last name
- email (TEXT) - Customer email address
- phone (TEXT) - Customer phone number
- investment_profile (TEXT) - conservative/moderate/aggressive
- risk_tolerance (TEXT) - low/medium/high

TABLE: portfolio_holdings (Customer Stock Holdings)
- id (PRIMARY KEY, INTEGER) - Unique holding record
- customer_id (FOREIGN KEY -> customers.id) - Links to customer
- symbol (TEXT) - Stock symbol like 'AAPL', 'TSLA', 'MSFT', 'GOOGL'
- shares (REAL) - Number of shares owned
- purchase_price (REAL) - Price when purchased
- current_value (REAL) - Current total value of holding

TABLE: companies (Company Master Data)
- id (PRIMARY KEY, INTEGER) - Unique company identifier
- symbol (TEXT) - Stock symbol like 'AAPL', 'TSLA', 'MSFT', 'GOOGL'
- name (TEXT) - Company name like 'Apple Inc', 'Tesla Inc'
- sector (TEXT) - Business sector (technology, automotive, etc.)
- market_cap (REAL) - Market capitalization

TABLE: financial_metrics (Company Financial Data)
- id (PRIMARY KEY, INTEGER) - Unique metrics record
- symbol (FOREIGN KEY -> companies.symbol) - Stock symbol
- revenue (REAL) - Company revenue
- net_income (REAL) - Net income
- eps (REAL) - Earnings per share
- pe_ratio (REAL) - Price to earnings ratio
- debt_to_equity (REAL) - Debt to equity ratio
- roe (REAL) - Return on equity

TABLE: market_data (Current Market Information)
- id (PRIMARY KEY, INTEGER) - Unique market record
- symbol (FOREIGN KEY -> companies.symbol) - Stock symbol
- close_price (REAL) - Latest closing price
- volume (INTEGER) - Trading volume
- market_cap (REAL) - Current market cap
- date (TEXT) - Date of data

COMMON QUERY PATTERNS:
1. Customer holdings with names:
   SELECT c.first_name, c.last_name, ph.symbol, ph.shares, ph.current_value
   FROM customers c JOIN portfolio_holdings ph ON c.id = ph.customer_id
2. Holdings with company information:
   SELECT ph.symbol, co.name, ph.shares, ph.current_value, co.sector
   FROM portfolio_holdings ph JOIN companies co ON ph.symbol = co.symbol
3. Holdings with current market prices:
   SELECT ph.symbol, ph.shares, ph.current_value, md.close_price
   FROM portfolio_holdings ph JOIN market_data md ON ph.symbol = md.symbol

TIPS:
- Use LIKE '%Tesla%' or LIKE '%Apple%' for company name searches
- Use symbol = 'TSLA', 'AAPL', 'MSFT', 'GOOGL' for exact stock matches
- JOIN portfolio_holdings with customers to get customer names
"#;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaContext {
    description: String,
}

impl SchemaContext {
    /// The customer/portfolio/market store the bundled tools query.
    pub fn financial() -> Self {
        Self::from_text(FINANCIAL_SCHEMA)
    }

    pub fn from_text(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
        }
    }

    pub fn as_prompt_text(&self) -> &str {
        &self.description
    }

    /// Table names declared with `TABLE: <name>` lines.
    pub fn table_names(&self) -> Vec<String> {
        self.description
            .lines()
            .filter_map(|line| line.trim().strip_prefix("TABLE:"))
            .filter_map(|rest| rest.split_whitespace().next())
            .map(|name| name.to_string())
            .collect()
    }
}

impl Default for SchemaContext {
    fn default() -> Self {
        Self::financial()
    }
}
