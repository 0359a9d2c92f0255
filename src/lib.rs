//! Transcript Digest - fetch, cache and summarize YouTube video transcripts
//!
//! This library resolves video URLs to canonical identifiers, retrieves timed-text
//! transcripts from the provider with retry/backoff for transient failures, keeps
//! results in a bounded single-flight cache, and optionally condenses them through
//! an external summarization endpoint.

pub mod cache;
pub mod cli;
pub mod config;
pub mod fetcher;
pub mod output;
pub mod pipeline;
pub mod resolver;
pub mod retry;
pub mod summarize;
pub mod transcript;
pub mod utils;

pub use cache::{CacheStats, TranscriptCache};
pub use cli::{Cli, Commands, OutputFormat};
pub use config::Config;
pub use fetcher::{FetchError, FetchOutcome, TranscriptFetcher};
pub use pipeline::TranscriptPipeline;
pub use resolver::{resolve, VideoId};
pub use retry::{Backoff, RetryPolicy};
pub use summarize::{SummaryOptions, Summarizer};
pub use transcript::{Transcript, TranscriptEntry};

/// Result type used throughout the library
pub type Result<T> = anyhow::Result<T>;

/// Caller-facing error categories
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidUrl,
    NotAvailable,
    TemporarilyUnavailable,
    UpstreamError,
    Cancelled,
    SummaryFailed,
    Config,
}

/// Error types returned by the transcript pipeline
#[derive(thiserror::Error, Debug, Clone)]
pub enum TranscriptError {
    #[error("Invalid video URL: {0}")]
    InvalidUrl(String),

    #[error("Transcript not available: {0}")]
    NotAvailable(String),

    #[error("Transcript temporarily unavailable, retries exhausted: {0}")]
    TemporarilyUnavailable(String),

    #[error("Upstream error: {0}")]
    UpstreamError(String),

    #[error("Request cancelled: {0}")]
    Cancelled(String),

    #[error("Summarization failed: {0}")]
    SummaryFailed(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl TranscriptError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TranscriptError::InvalidUrl(_) => ErrorKind::InvalidUrl,
            TranscriptError::NotAvailable(_) => ErrorKind::NotAvailable,
            TranscriptError::TemporarilyUnavailable(_) => ErrorKind::TemporarilyUnavailable,
            TranscriptError::UpstreamError(_) => ErrorKind::UpstreamError,
            TranscriptError::Cancelled(_) => ErrorKind::Cancelled,
            TranscriptError::SummaryFailed(_) => ErrorKind::SummaryFailed,
            TranscriptError::Config(_) => ErrorKind::Config,
        }
    }

    /// Human-readable reason without the category prefix
    pub fn reason(&self) -> &str {
        match self {
            TranscriptError::InvalidUrl(r)
            | TranscriptError::NotAvailable(r)
            | TranscriptError::TemporarilyUnavailable(r)
            | TranscriptError::UpstreamError(r)
            | TranscriptError::Cancelled(r)
            | TranscriptError::SummaryFailed(r)
            | TranscriptError::Config(r) => r,
        }
    }
}
