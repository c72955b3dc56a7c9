//! Annual report (10-K) filing search
//!
//! One tool per company. The filing (PDF, or plain text as a fallback) is
//! split into overlapping word chunks once at construction. Each call ranks
//! chunks against the question by embedding similarity when an embedder is
//! attached, by token overlap otherwise, and answers from the best passages.

use crate::error::OrchestrationError;
use crate::llm::{cosine_similarity, Embedder, LanguageModel};
use crate::models::ToolOutput;
use crate::router::keyword::tokenize;
use crate::tools::{company_name, Tool};
use crate::Result;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

const CHUNK_WORDS: usize = 200;
const CHUNK_OVERLAP: usize = 40;
const TOP_K: usize = 3;
const FILING_YEAR: u32 = 2024;

/// Tried in order; the first readable, non-empty file wins.
const FILING_EXTENSIONS: [&str; 3] = ["pdf", "txt", "md"];

#[derive(Debug, Clone)]
struct Chunk {
    index: usize,
    text: String,
}

pub struct DocumentSearchTool {
    name: String,
    description: String,
    source_name: String,
    chunks: Vec<Chunk>,
    model: Option<Arc<dyn LanguageModel>>,
    embedder: Option<Arc<dyn Embedder>>,
    /// Chunk vectors, computed on first semantic search.
    chunk_vectors: OnceCell<Vec<Vec<f32>>>,
}

impl DocumentSearchTool {
    /// Load `<SYMBOL>_10K_2024.pdf` from `dir`, or the `.txt`/`.md` variant.
    ///
    /// Returns `Ok(None)` when no filing exists for the company, and the last
    /// read error when every filing present failed to load.
    pub fn from_documents_dir(
        dir: &Path,
        symbol: &str,
        model: Option<Arc<dyn LanguageModel>>,
    ) -> Result<Option<Self>> {
        let symbol = symbol.to_uppercase();
        let mut last_error = None;

        for extension in FILING_EXTENSIONS {
            let file_name = format!("{}_10K_{}.{}", symbol, FILING_YEAR, extension);
            let path = dir.join(&file_name);
            if !path.is_file() {
                continue;
            }

            let loaded = read_filing(&path)
                .and_then(|text| Self::from_text(&symbol, &file_name, &text, model.clone()));
            match loaded {
                Ok(tool) => {
                    info!(%symbol, file = %file_name, chunks = tool.chunks.len(), "Filing loaded");
                    return Ok(Some(tool));
                }
                Err(e) => {
                    warn!(%symbol, file = %file_name, error = %e, "Unreadable filing; trying next format");
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) => Err(e),
            None => Ok(None),
        }
    }

    pub fn from_text(
        symbol: &str,
        source_name: &str,
        text: &str,
        model: Option<Arc<dyn LanguageModel>>,
    ) -> Result<Self> {
        Self::build(symbol, source_name, text, model, CHUNK_WORDS, CHUNK_OVERLAP)
    }

    fn build(
        symbol: &str,
        source_name: &str,
        text: &str,
        model: Option<Arc<dyn LanguageModel>>,
        chunk_size: usize,
        chunk_overlap: usize,
    ) -> Result<Self> {
        let symbol = symbol.to_uppercase();
        let chunks = chunk_words(text, chunk_size, chunk_overlap);

        if chunks.is_empty() {
            return Err(OrchestrationError::InvalidToolInput(format!(
                "filing {} is empty",
                source_name
            )));
        }

        let company = company_name(&symbol).unwrap_or(&symbol);
        let description = format!(
            "{} ({}) {} 10-K annual report filing: revenue, net income, business segments, \
             products, risk factors, competition, strategy and management discussion",
            company, symbol, FILING_YEAR
        );

        Ok(Self {
            name: format!("{}_10k_filing_tool", symbol),
            description,
            source_name: source_name.to_string(),
            chunks,
            model,
            embedder: None,
            chunk_vectors: OnceCell::new(),
        })
    }

    /// Rank passages by embedding similarity instead of token overlap.
    pub fn with_embedder(mut self, embedder: Option<Arc<dyn Embedder>>) -> Self {
        self.embedder = embedder;
        self
    }

    async fn retrieve(&self, question: &str) -> Vec<&Chunk> {
        if let Some(embedder) = &self.embedder {
            match self.retrieve_by_similarity(embedder.as_ref(), question).await {
                Ok(passages) => return passages,
                Err(e) => {
                    warn!(tool = %self.name, error = %e, "Embedding search failed; using token overlap")
                }
            }
        }
        self.retrieve_by_overlap(question)
    }

    /// Best `TOP_K` chunks by cosine similarity to the question.
    async fn retrieve_by_similarity(
        &self,
        embedder: &dyn Embedder,
        question: &str,
    ) -> Result<Vec<&Chunk>> {
        let chunk_vectors = self
            .chunk_vectors
            .get_or_try_init(|| async {
                let texts: Vec<String> = self.chunks.iter().map(|c| c.text.clone()).collect();
                let vectors = embedder.embed(&texts).await?;
                if vectors.len() != texts.len() {
                    return Err(OrchestrationError::LlmError(format!(
                        "expected {} chunk embeddings, got {}",
                        texts.len(),
                        vectors.len()
                    )));
                }
                debug!(tool = %self.name, chunks = vectors.len(), "Filing chunks embedded");
                Ok::<_, OrchestrationError>(vectors)
            })
            .await?;

        let question_vector = embedder
            .embed(&[question.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| OrchestrationError::LlmError("no embedding returned for question".into()))?;

        let mut scored: Vec<(f32, &Chunk)> = self
            .chunks
            .iter()
            .zip(chunk_vectors)
            .map(|(chunk, vector)| (cosine_similarity(&question_vector, vector), chunk))
            .collect();

        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        Ok(scored.into_iter().take(TOP_K).map(|(_, c)| c).collect())
    }

    /// Best `TOP_K` chunks by distinct-token overlap, document order on ties.
    fn retrieve_by_overlap(&self, question: &str) -> Vec<&Chunk> {
        let question_tokens = tokenize(question);

        let mut scored: Vec<(usize, &Chunk)> = self
            .chunks
            .iter()
            .map(|chunk| {
                let overlap = tokenize(&chunk.text)
                    .intersection(&question_tokens)
                    .count();
                (overlap, chunk)
            })
            .filter(|(overlap, _)| *overlap > 0)
            .collect();

        scored.sort_by(|a, b| b.0.cmp(&a.0));
        scored.into_iter().take(TOP_K).map(|(_, c)| c).collect()
    }

    fn format_passages(&self, passages: &[&Chunk]) -> String {
        passages
            .iter()
            .map(|c| format!("[source: {}, chunk {}]\n{}", self.source_name, c.index + 1, c.text))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    fn build_prompt(&self, question: &str, context: &str) -> String {
        format!(
            r#"Answer the question using ONLY the annual report excerpts below.
If the excerpts do not contain the answer, say so.
Cite figures exactly as written.

EXCERPTS:
{}

QUESTION:
{}
"#,
            context, question
        )
    }
}

#[async_trait]
impl Tool for DocumentSearchTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn call(&self, input: &str) -> Result<ToolOutput> {
        let passages = self.retrieve(input).await;
        debug!(tool = %self.name, passages = passages.len(), "Retrieved filing passages");

        if passages.is_empty() {
            return Ok(ToolOutput::text(format!(
                "No passages in {} matched the question.",
                self.source_name
            )));
        }

        let context = self.format_passages(&passages);

        let Some(model) = &self.model else {
            return Ok(ToolOutput::text(context));
        };

        match model.complete(&self.build_prompt(input, &context)).await {
            Ok(answer) if !answer.trim().is_empty() => Ok(ToolOutput::text(format!(
                "{}\n\nSources: {}",
                answer.trim(),
                passages
                    .iter()
                    .map(|c| format!("{} chunk {}", self.source_name, c.index + 1))
                    .collect::<Vec<_>>()
                    .join("; ")
            ))),
            Ok(_) => Ok(ToolOutput::text(context)),
            Err(e) => {
                warn!(tool = %self.name, error = %e, "Filing answer failed; returning passages");
                Ok(ToolOutput::text(context))
            }
        }
    }
}

fn read_filing(path: &Path) -> Result<String> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("pdf") => extract_pdf_text(path),
        _ => Ok(std::fs::read_to_string(path)?),
    }
}

fn extract_pdf_text(path: &Path) -> Result<String> {
    // pdf-extract panics on some malformed documents
    let extracted = std::panic::catch_unwind(|| pdf_extract::extract_text(path)).map_err(|_| {
        OrchestrationError::InvalidToolInput(format!("PDF parser crashed on {}", path.display()))
    })?;

    extracted.map_err(|e| {
        OrchestrationError::InvalidToolInput(format!(
            "failed to extract text from {}: {}",
            path.display(),
            e
        ))
    })
}

fn chunk_words(text: &str, size: usize, overlap: usize) -> Vec<Chunk> {
    let words: Vec<&str> = text.split_whitespace().collect();
    let step = size.saturating_sub(overlap).max(1);

    let mut chunks = Vec::new();
    let mut start = 0;
    while start < words.len() {
        let end = (start + size).min(words.len());
        chunks.push(Chunk {
            index: chunks.len(),
            text: words[start..end].join(" "),
        });
        if end == words.len() {
            break;
        }
        start += step;
    }

    chunks
}
