//! Local keyword-overlap routing
//!
//! Pure and deterministic: used when the hosted model is unavailable or when
//! keyword routing is configured.

use crate::models::ToolInfo;
use std::collections::HashSet;

const STOP_WORDS: &[&str] = &[
    "a", "about", "all", "an", "and", "any", "are", "as", "at", "be", "by", "can", "could",
    "data", "did", "do", "does", "for", "from", "get", "give", "had", "has", "have", "how",
    "i", "in", "information", "into", "is", "it", "its", "list", "me", "my", "of", "on", "or",
    "our", "please", "show", "tell", "than", "that", "the", "their", "them", "there", "these",
    "this", "to", "tool", "use", "using", "was", "were", "what", "when", "where", "which",
    "who", "why", "will", "with", "would", "you", "your",
];

/// Lowercased alphanumeric tokens, stop words removed, simple plurals folded.
pub fn tokenize(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 1 && !STOP_WORDS.contains(w))
        .map(fold_plural)
        .collect()
}

fn fold_plural(word: &str) -> String {
    if word.len() > 4 && word.ends_with("ies") {
        format!("{}y", &word[..word.len() - 3])
    } else if word.len() > 3 && word.ends_with('s') && !word.ends_with("ss") {
        word[..word.len() - 1].to_string()
    } else {
        word.to_string()
    }
}

/// Distinct question tokens that also appear in the tool's name or description.
pub fn score(question_tokens: &HashSet<String>, tool: &ToolInfo) -> usize {
    let mut tool_tokens = tokenize(&tool.description);
    tool_tokens.extend(tokenize(&tool.name.replace('_', " ")));

    question_tokens.intersection(&tool_tokens).count()
}

/// Tools scoring at least `threshold`, best first (ties keep registry
/// order), at most `max_tools`.
pub fn select(question: &str, tools: &[ToolInfo], threshold: usize, max_tools: usize) -> Vec<(String, usize)> {
    let question_tokens = tokenize(question);
    let threshold = threshold.max(1);

    let mut scored: Vec<(usize, usize)> = tools
        .iter()
        .enumerate()
        .map(|(i, tool)| (i, score(&question_tokens, tool)))
        .filter(|(_, s)| *s >= threshold)
        .collect();

    // Stable sort keeps registry order among equal scores.
    scored.sort_by(|a, b| b.1.cmp(&a.1));
    scored.truncate(max_tools);

    scored
        .into_iter()
        .map(|(i, s)| (tools[i].name.clone(), s))
        .collect()
}
