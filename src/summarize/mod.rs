use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod huggingface;

pub use huggingface::HuggingFaceSummarizer;

use crate::Result;

/// Options passed through to the summarization model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryOptions {
    /// Maximum summary length per chunk
    pub max_length: u32,

    /// Minimum summary length per chunk
    pub min_length: u32,

    /// Maximum characters of input per chunk
    pub chunk_chars: usize,

    /// Text prepended to every chunk before it is sent
    pub prompt_prefix: String,
}

impl Default for SummaryOptions {
    fn default() -> Self {
        Self {
            max_length: 150,
            min_length: 30,
            chunk_chars: 400,
            prompt_prefix: "summarize: ".to_string(),
        }
    }
}

/// External text-to-text summarization capability
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Summarize one bounded piece of input
    async fn summarize_chunk(&self, input: &str, options: &SummaryOptions) -> Result<String>;
}

/// Split `text` into pieces of at most `max_chars` characters, preferring to
/// break on whitespace
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<&str> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut rest = text.trim();

    while !rest.is_empty() {
        let cut = match rest.char_indices().nth(max_chars) {
            None => rest.len(),
            Some((limit, c)) if c.is_whitespace() => limit,
            Some((limit, _)) => match rest[..limit].rfind(char::is_whitespace) {
                Some(ws) if ws > 0 => ws,
                _ => limit,
            },
        };

        let (head, tail) = rest.split_at(cut);
        chunks.push(head.trim_end());
        rest = tail.trim_start();
    }

    chunks
}

/// Summarize `text` chunk by chunk and join the partial summaries with a space
pub async fn summarize<S>(summarizer: &S, text: &str, options: &SummaryOptions) -> Result<String>
where
    S: Summarizer + ?Sized,
{
    let chunks = chunk_text(text, options.chunk_chars);
    if chunks.is_empty() {
        anyhow::bail!("nothing to summarize: transcript text is empty");
    }

    tracing::info!("Summarizing {} chunk(s)", chunks.len());

    let mut summaries = Vec::with_capacity(chunks.len());
    for (i, chunk) in chunks.iter().enumerate() {
        let input = format!("{}{}", options.prompt_prefix, chunk);
        let summary = summarizer.summarize_chunk(&input, options).await?;
        tracing::debug!("Chunk {}/{} summarized", i + 1, chunks.len());

        let summary = summary.trim();
        if !summary.is_empty() {
            summaries.push(summary.to_string());
        }
    }

    if summaries.is_empty() {
        anyhow::bail!("summarizer returned no text");
    }

    Ok(summaries.join(" "))
}
