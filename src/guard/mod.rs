//! PII guard for tabular tool results
//!
//! Sensitive columns are detected from their names only. Cell values in those
//! columns are masked according to their shape. Masking is idempotent.

use crate::models::{Table, ToolResult};
use std::collections::BTreeSet;
use tracing::debug;

/// Substrings that mark a normalized column name as sensitive.
pub const PII_PATTERNS: &[&str] = &[
    "name", "email", "phone", "address", "ssn", "social", "dob", "birth",
];

/// Replacement for free-text values such as names and addresses.
pub const MASK_TOKEN: &str = "****";

const MASK_CHAR: char = '*';
const PHONE_SEPARATORS: &[char] = &['-', ' ', '.', '(', ')', '+', '/'];

/// Lowercase and drop everything that is not alphanumeric.
fn normalize_column(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

pub fn is_sensitive_column(name: &str) -> bool {
    let normalized = normalize_column(name);
    PII_PATTERNS.iter().any(|p| normalized.contains(p))
}

/// Columns whose names match a PII pattern.
pub fn detect_pii_fields(columns: &[String]) -> BTreeSet<String> {
    columns
        .iter()
        .filter(|c| is_sensitive_column(c))
        .cloned()
        .collect()
}

fn mask_email(value: &str) -> Option<String> {
    let (local, domain) = value.split_once('@')?;
    let first = local.chars().next()?;
    if domain.is_empty() || domain.contains('@') || local.contains(char::is_whitespace) {
        return None;
    }
    Some(format!("{}***@{}", first, domain))
}

fn mask_phone(value: &str) -> Option<String> {
    let shape_ok = value
        .chars()
        .all(|c| c.is_ascii_digit() || c == MASK_CHAR || PHONE_SEPARATORS.contains(&c));
    let digits = value.chars().filter(|c| c.is_ascii_digit()).count();
    if !shape_ok || digits < 4 {
        return None;
    }

    let mut remaining = digits;
    let masked = value
        .chars()
        .map(|c| {
            if c.is_ascii_digit() {
                remaining -= 1;
                if remaining >= 4 {
                    return MASK_CHAR;
                }
            }
            c
        })
        .collect();
    Some(masked)
}

/// `YYYY-MM-DD`, `DD/MM/YYYY`, `MM.DD.YY` and similar.
fn is_date_shaped(value: &str) -> bool {
    let parts: Vec<&str> = value.split(['-', '/', '.']).collect();
    if parts.len() != 3 || parts.iter().any(|p| p.is_empty() || !p.chars().all(|c| c.is_ascii_digit())) {
        return false;
    }

    let short = |p: &str| p.len() <= 2;
    (parts[0].len() == 4 && short(parts[1]) && short(parts[2]))
        || (short(parts[0]) && short(parts[1]) && (parts[2].len() == 4 || parts[2].len() == 2))
}

/// Mask one sensitive cell by value shape.
pub fn mask_value(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("null") {
        return value.to_string();
    }
    if is_date_shaped(trimmed) {
        return MASK_TOKEN.to_string();
    }

    mask_email(trimmed)
        .or_else(|| mask_phone(trimmed))
        .unwrap_or_else(|| MASK_TOKEN.to_string())
}

/// Masks the sensitive columns of a table, returning the masked columns in
/// table order.
pub fn mask_table(table: &Table) -> (Table, Vec<String>) {
    let sensitive: Vec<bool> = table.columns.iter().map(|c| is_sensitive_column(c)).collect();

    let rows = table
        .rows
        .iter()
        .map(|row| {
            row.iter()
                .enumerate()
                .map(|(i, cell)| {
                    if sensitive.get(i).copied().unwrap_or(false) {
                        mask_value(cell)
                    } else {
                        cell.clone()
                    }
                })
                .collect()
        })
        .collect();

    let masked_columns = table
        .columns
        .iter()
        .zip(&sensitive)
        .filter(|(_, s)| **s)
        .map(|(c, _)| c.clone())
        .collect();

    (Table::new(table.columns.clone(), rows), masked_columns)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PiiGuard;

impl PiiGuard {
    pub fn new() -> Self {
        Self
    }

    /// Returns a guarded copy of `result`. Results without column metadata
    /// are returned unchanged.
    pub fn protect(&self, result: &ToolResult) -> ToolResult {
        let Some(table) = &result.table else {
            return result.clone();
        };

        let (masked, masked_columns) = mask_table(table);

        if !masked_columns.is_empty() {
            debug!(
                tool_name = %result.tool_name,
                columns = ?masked_columns,
                rows = masked.rows.len(),
                "Masked sensitive columns"
            );
        }

        ToolResult {
            table: Some(masked),
            masked_columns,
            ..result.clone()
        }
    }

    pub fn protect_all(&self, results: &[ToolResult]) -> Vec<ToolResult> {
        results.iter().map(|r| self.protect(r)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ToolOutput;

    fn customers() -> ToolResult {
        ToolResult::success(
            "database_query_tool",
            ToolOutput::tabular(
                "SQL Query: SELECT * FROM customers",
                Table::new(
                    vec![
                        "id".into(),
                        "first_name".into(),
                        "email".into(),
                        "phone".into(),
                        "risk_tolerance".into(),
                    ],
                    vec![
                        vec![
                            "1".into(),
                            "Jane".into(),
                            "jane.doe@example.com".into(),
                            "555-0101".into(),
                            "high".into(),
                        ],
                        vec![
                            "2".into(),
                            "John".into(),
                            "NULL".into(),
                            "(212) 555-0199".into(),
                            "low".into(),
                        ],
                    ],
                ),
            ),
            5,
        )
    }

    #[test]
    fn test_detect_pii_fields() {
        let fields: Vec<String> = ["customer_name", "email_address", "phone_number", "revenue", "stock_price", "Date-Of-Birth", "SSN"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let detected = detect_pii_fields(&fields);
        assert!(detected.contains("customer_name"));
        assert!(detected.contains("email_address"));
        assert!(detected.contains("phone_number"));
        assert!(detected.contains("Date-Of-Birth"));
        assert!(detected.contains("SSN"));
        assert!(!detected.contains("revenue"));
        assert!(!detected.contains("stock_price"));
    }

    #[test]
    fn test_email_mask_keeps_first_char_and_domain() {
        assert_eq!(mask_value("jane.doe@example.com"), "j***@example.com");
    }

    #[test]
    fn test_phone_mask_keeps_last_four_digits() {
        assert_eq!(mask_value("555-0101"), "***-0101");
        assert_eq!(mask_value("123-456-7890"), "***-***-7890");
        assert_eq!(mask_value("(212) 555-0199"), "(***) ***-0199");
    }

    #[test]
    fn test_dates_are_fully_masked() {
        assert_eq!(mask_value("1990-01-15"), MASK_TOKEN);
        assert_eq!(mask_value("15/01/1990"), MASK_TOKEN);
        assert_eq!(mask_value("01.15.90"), MASK_TOKEN);
        assert_eq!(mask_value(MASK_TOKEN), MASK_TOKEN);
        // Three-group phone numbers are not dates.
        assert_eq!(mask_value("555-123-4567"), "***-***-4567");
    }

    #[test]
    fn test_free_text_mask() {
        assert_eq!(mask_value("Jane"), MASK_TOKEN);
        assert_eq!(mask_value("42 Wallaby Way, Sydney"), MASK_TOKEN);
        assert_eq!(mask_value("NULL"), "NULL");
        assert_eq!(mask_value(""), "");
    }

    #[test]
    fn test_protect_masks_only_sensitive_columns() {
        let guarded = PiiGuard::new().protect(&customers());
        let table = guarded.table.as_ref().unwrap();

        assert_eq!(table.rows[0], vec!["1", "****", "j***@example.com", "***-0101", "high"]);
        assert_eq!(table.rows[1][2], "NULL");
        assert_eq!(guarded.masked_columns, vec!["first_name", "email", "phone"]);
        assert!(guarded
            .render()
            .ends_with("[PII PROTECTED] Masked columns: first_name, email, phone"));
    }

    #[test]
    fn test_protect_is_idempotent() {
        let guard = PiiGuard::new();
        let once = guard.protect(&customers());
        let twice = guard.protect(&once);

        assert_eq!(once, twice);
        assert_eq!(once.render(), twice.render());
    }

    #[test]
    fn test_input_not_mutated() {
        let original = customers();
        let _ = PiiGuard::new().protect(&original);
        assert_eq!(original.table.as_ref().unwrap().rows[0][2], "jane.doe@example.com");
        assert!(original.masked_columns.is_empty());
    }

    #[test]
    fn test_results_without_columns_pass_through() {
        let plain = ToolResult::success(
            "finance_market_search_tool",
            ToolOutput::text("Contact jane.doe@example.com"),
            1,
        );
        assert_eq!(PiiGuard::new().protect(&plain), plain);
    }
}
