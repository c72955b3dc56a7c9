//! PII protection tool
//!
//! Text-in masking: finds a tabular block (`COLUMNS: [...]` plus pipe-separated
//! rows) or `Label: value` pairs in its input and masks the sensitive parts.

use crate::error::OrchestrationError;
use crate::guard::{is_sensitive_column, mask_value, PiiGuard};
use crate::models::{Table, ToolOutput, ToolResult};
use crate::tools::Tool;
use crate::Result;

pub struct PiiProtectionTool;

fn parse_columns(line: &str) -> Option<Vec<String>> {
    let rest = line.trim().strip_prefix("COLUMNS:")?;
    let inner = rest.trim().trim_start_matches('[').trim_end_matches(']');
    let columns: Vec<String> = inner
        .split(',')
        .map(|c| c.trim().trim_matches(|ch| ch == '\'' || ch == '"').to_string())
        .filter(|c| !c.is_empty())
        .collect();

    if columns.is_empty() {
        None
    } else {
        Some(columns)
    }
}

fn split_row(line: &str) -> Vec<String> {
    line.split('|').map(|cell| cell.trim().to_string()).collect()
}

/// Split `input` into (preamble, table) when it carries a tabular block.
fn parse_tabular(input: &str) -> Option<(String, Table)> {
    let columns = input.lines().rev().find_map(parse_columns)?;

    let mut preamble = Vec::new();
    let mut rows = Vec::new();
    let mut in_table = false;

    for line in input.lines() {
        if parse_columns(line).is_some() {
            continue;
        }

        if in_table && line.trim().is_empty() {
            continue;
        }

        if line.trim() == "(no rows)" {
            in_table = true;
            continue;
        }

        // Single-column tables have no pipes, so the header opens the block.
        if !in_table && columns.len() == 1 && line.trim() == columns[0] {
            in_table = true;
            continue;
        }

        if line.contains('|') || (columns.len() == 1 && in_table) {
            let cells = split_row(line);
            if cells.len() == columns.len() {
                in_table = true;
                if cells != columns {
                    rows.push(cells);
                }
                continue;
            }
        }

        if !in_table {
            preamble.push(line);
        }
    }

    Some((preamble.join("\n"), Table::new(columns, rows)))
}

/// Mask values of `Label: value` segments whose label is sensitive.
fn mask_labelled_pairs(input: &str) -> (String, Vec<String>) {
    let mut masked_labels = Vec::new();

    let lines: Vec<String> = input
        .lines()
        .map(|line| {
            line.split(", ")
                .map(|segment| match segment.split_once(':') {
                    Some((label, value)) if is_sensitive_column(label) && !value.trim().is_empty() => {
                        let label = label.trim();
                        if !masked_labels.iter().any(|l| l == label) {
                            masked_labels.push(label.to_string());
                        }
                        format!("{}: {}", label, mask_value(value.trim()))
                    }
                    _ => segment.to_string(),
                })
                .collect::<Vec<_>>()
                .join(", ")
        })
        .collect();

    (lines.join("\n"), masked_labels)
}

#[async_trait::async_trait]
impl Tool for PiiProtectionTool {
    fn name(&self) -> &str {
        "pii_protection_tool"
    }

    fn description(&self) -> &str {
        "Mask personally identifiable information (names, emails, phone numbers, \
         addresses, SSNs) in customer records or query results before sharing them"
    }

    async fn call(&self, input: &str) -> Result<ToolOutput> {
        if input.trim().is_empty() {
            return Err(OrchestrationError::InvalidToolInput(
                "Expected text containing records to protect".to_string(),
            ));
        }

        if let Some((preamble, table)) = parse_tabular(input) {
            let result = ToolResult::success(self.name(), ToolOutput::tabular(preamble, table), 0);
            let guarded = PiiGuard::new().protect(&result);
            return Ok(ToolOutput::text(guarded.render()));
        }

        let (masked, labels) = mask_labelled_pairs(input);
        if labels.is_empty() {
            return Ok(ToolOutput::text(format!(
                "{}\n[PII PROTECTED] No sensitive fields detected",
                masked
            )));
        }

        Ok(ToolOutput::text(format!(
            "{}\n[PII PROTECTED] Masked fields: {}",
            masked,
            labels.join(", ")
        )))
    }
}
