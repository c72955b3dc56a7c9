//! Database query tool
//!
//! Natural language → SQL (via the language model) → read-only SQLite query.
//! Results carry their column names so the PII guard can inspect them.

use crate::error::OrchestrationError;
use crate::llm::LanguageModel;
use crate::models::{Table, ToolOutput};
use crate::schema::SchemaContext;
use crate::tools::Tool;
use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row, ValueRef};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

const TOOL_NAME: &str = "database_query_tool";
const DEFAULT_MAX_ROWS: usize = 50;

pub struct DatabaseQueryTool {
    pool: SqlitePool,
    model: Option<Arc<dyn LanguageModel>>,
    schema: SchemaContext,
    max_rows: usize,
}

impl DatabaseQueryTool {
    /// Open `path` read-only.
    pub async fn connect(path: &Path, model: Option<Arc<dyn LanguageModel>>) -> Result<Self> {
        let options = SqliteConnectOptions::new().filename(path).read_only(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| {
                OrchestrationError::DatabaseError(format!(
                    "failed to open {}: {}",
                    path.display(),
                    e
                ))
            })?;

        info!(path = %path.display(), "Database tool connected");
        Ok(Self::with_pool(pool, model))
    }

    /// Wrap an existing pool. Statements are still checked by
    /// [`is_read_only_sql`], but the pool itself should be opened read-only.
    pub fn with_pool(pool: SqlitePool, model: Option<Arc<dyn LanguageModel>>) -> Self {
        Self {
            pool,
            model,
            schema: SchemaContext::financial(),
            max_rows: DEFAULT_MAX_ROWS,
        }
    }

    pub fn with_schema(mut self, schema: SchemaContext) -> Self {
        self.schema = schema;
        self
    }

    pub fn with_max_rows(mut self, max_rows: usize) -> Self {
        self.max_rows = max_rows.max(1);
        self
    }

    fn build_prompt(&self, question: &str, error_context: Option<(&str, &str)>) -> String {
        let mut prompt = format!(
            r#"You are a SQLite expert. Write ONE read-only SQL query answering the question.

{}

QUESTION:
{}

Rules:
- SELECT statements only
- Use only the tables and columns listed above
- Return ONLY the SQL, no explanation, no markdown
"#,
            self.schema.as_prompt_text(),
            question
        );

        if let Some((sql, error)) = error_context {
            prompt.push_str(&format!(
                "\nThe previous query failed.\nQUERY: {}\nERROR: {}\nWrite a corrected query.\n",
                sql, error
            ));
        }

        prompt
    }

    async fn generate_sql(&self, question: &str, error_context: Option<(&str, &str)>) -> Result<String> {
        let model = self.model.as_ref().ok_or_else(|| {
            OrchestrationError::tool(
                TOOL_NAME,
                "text-to-SQL needs a configured language model",
            )
        })?;

        let response = model.complete(&self.build_prompt(question, error_context)).await?;
        let sql = clean_sql(&response);

        if !is_read_only_sql(&sql) {
            return Err(OrchestrationError::tool(
                TOOL_NAME,
                format!("refusing non-SELECT statement: {}", sql),
            ));
        }

        debug!(%sql, "Generated SQL");
        Ok(sql)
    }

    async fn execute_sql(&self, sql: &str) -> Result<Table> {
        let rows: Vec<SqliteRow> = sqlx::query(sql).fetch_all(&self.pool).await?;

        let columns = rows
            .first()
            .map(|row| row.columns().iter().map(|c| c.name().to_string()).collect())
            .unwrap_or_default();

        let rows = rows
            .iter()
            .map(|row| (0..row.columns().len()).map(|i| cell_to_string(row, i)).collect())
            .collect();

        Ok(Table::new(columns, rows))
    }

    fn format_output(&self, sql: &str, mut table: Table) -> ToolOutput {
        let total = table.rows.len();

        if total == 0 {
            return ToolOutput::text(format!(
                "SQL Query: {}\nDatabase Results: query returned no rows",
                sql
            ));
        }

        let mut text = format!("SQL Query: {}\nDatabase Results ({} rows):", sql, total);
        if total > self.max_rows {
            table.rows.truncate(self.max_rows);
            text = format!(
                "SQL Query: {}\nDatabase Results (showing {} of {} rows):",
                sql, self.max_rows, total
            );
        }

        ToolOutput::tabular(text, table)
    }
}

#[async_trait::async_trait]
impl Tool for DatabaseQueryTool {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn description(&self) -> &str {
        "Query the customer database: customers, contact details, investment profiles, \
         risk tolerance, portfolio holdings, shares owned, stored company financial metrics"
    }

    async fn call(&self, input: &str) -> Result<ToolOutput> {
        let sql = self.generate_sql(input, None).await?;

        match self.execute_sql(&sql).await {
            Ok(table) => Ok(self.format_output(&sql, table)),
            Err(first_error) => {
                warn!(%sql, error = %first_error, "SQL failed; regenerating with error context");

                let first_error = first_error.to_string();
                let retry_sql = self
                    .generate_sql(input, Some((&sql, &first_error)))
                    .await?;
                let table = self.execute_sql(&retry_sql).await.map_err(|e| {
                    OrchestrationError::tool(TOOL_NAME, format!("query failed after retry: {}", e))
                })?;

                Ok(self.format_output(&retry_sql, table))
            }
        }
    }
}

/// Strip markdown fences and anything after the first statement.
pub fn clean_sql(response: &str) -> String {
    let trimmed = response.trim();
    let unfenced = match trimmed.find("```") {
        Some(start) => {
            let after = &trimmed[start + 3..];
            let after = after
                .strip_prefix("sql")
                .or_else(|| after.strip_prefix("SQL"))
                .unwrap_or(after);
            match after.find("```") {
                Some(end) => &after[..end],
                None => after,
            }
        }
        None => trimmed,
    };

    first_statement(unfenced).trim().to_string()
}

/// Text up to the first `;` that is not inside a quoted literal or identifier.
fn first_statement(sql: &str) -> &str {
    let mut quote: Option<char> = None;

    for (i, c) in sql.char_indices() {
        match (quote, c) {
            (None, '\'' | '"' | '`') => quote = Some(c),
            (Some(q), c) if c == q => quote = None,
            (None, ';') => return &sql[..i],
            _ => {}
        }
    }

    sql
}

/// Keywords that write to or reconfigure the database.
const WRITE_KEYWORDS: &[&str] = &[
    "insert", "update", "delete", "replace", "upsert", "merge", "drop", "alter", "create",
    "truncate", "attach", "detach", "pragma", "vacuum", "reindex", "analyze", "grant",
    "revoke", "begin", "commit", "rollback", "savepoint", "release",
];

/// `SELECT`/`WITH` statements that contain no write keyword outside literals.
pub fn is_read_only_sql(sql: &str) -> bool {
    let words = sql_words(sql);

    match words.first().map(String::as_str) {
        Some("select") | Some("with") => {}
        _ => return false,
    }

    !words.iter().any(|w| WRITE_KEYWORDS.contains(&w.as_str()))
}

/// Lowercased identifier-like words with quoted literals removed.
fn sql_words(sql: &str) -> Vec<String> {
    let mut unquoted = String::with_capacity(sql.len());
    let mut quote: Option<char> = None;

    for c in sql.chars() {
        match (quote, c) {
            (None, '\'' | '"' | '`') => {
                quote = Some(c);
                unquoted.push(' ');
            }
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, c) => unquoted.push(c),
        }
    }

    unquoted
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect()
}

fn cell_to_string(row: &SqliteRow, index: usize) -> String {
    match row.try_get_raw(index) {
        Ok(raw) if raw.is_null() => return "NULL".to_string(),
        Err(_) => return "NULL".to_string(),
        Ok(_) => {}
    }

    if let Ok(v) = row.try_get::<i64, _>(index) {
        return v.to_string();
    }
    if let Ok(v) = row.try_get::<f64, _>(index) {
        return v.to_string();
    }
    if let Ok(v) = row.try_get::<String, _>(index) {
        return v;
    }
    if let Ok(v) = row.try_get::<Vec<u8>, _>(index) {
        return format!("<{} bytes>", v.len());
    }

    String::new()
}
