use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::cache::TranscriptCache;
use crate::config::Config;
use crate::fetcher::{FetchError, TranscriptFetcher, YoutubeFetcher};
use crate::resolver::{resolve, VideoId};
use crate::retry::RetryPolicy;
use crate::summarize::{self, HuggingFaceSummarizer, SummaryOptions, Summarizer};
use crate::transcript::Transcript;
use crate::utils::truncate_text;
use crate::TranscriptError;

/// Transcript together with its summary
#[derive(Debug, Clone)]
pub struct Digest {
    pub transcript: Arc<Transcript>,
    pub summary: String,
}

/// Resolve -> cache -> retry(fetch) -> store
pub struct TranscriptPipeline {
    fetcher: Arc<dyn TranscriptFetcher>,
    cache: TranscriptCache,
    policy: RetryPolicy,
    politeness_delay: Option<Duration>,
    summarizer: Option<Arc<dyn Summarizer>>,
    summary_options: SummaryOptions,
    cancel: CancellationToken,
}

impl TranscriptPipeline {
    /// Build the production pipeline from configuration
    pub fn from_config(config: &Config) -> crate::Result<Self> {
        let fetcher = YoutubeFetcher::new(&config.fetch)?;
        let summarizer = HuggingFaceSummarizer::new(&config.summary)?;
        let cache = TranscriptCache::new(config.cache.capacity, config.cache_ttl());

        Ok(Self::new(Arc::new(fetcher), cache, config.retry_policy())
            .with_politeness_delay(config.politeness_delay())
            .with_summarizer(Arc::new(summarizer), config.summary_options()))
    }

    /// Create a pipeline around an injected fetcher and cache, without throttling or summarizer
    pub fn new(fetcher: Arc<dyn TranscriptFetcher>, cache: TranscriptCache, policy: RetryPolicy) -> Self {
        Self {
            fetcher,
            cache,
            policy,
            politeness_delay: None,
            summarizer: None,
            summary_options: SummaryOptions::default(),
            cancel: CancellationToken::new(),
        }
    }

    /// Pause before the first upstream attempt of every fetch
    pub fn with_politeness_delay(mut self, delay: Option<Duration>) -> Self {
        self.politeness_delay = delay.filter(|d| !d.is_zero());
        self
    }

    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>, options: SummaryOptions) -> Self {
        self.summarizer = Some(summarizer);
        self.summary_options = options;
        self
    }

    pub fn cache(&self) -> &TranscriptCache {
        &self.cache
    }

    pub fn summary_options(&self) -> &SummaryOptions {
        &self.summary_options
    }

    /// Stop retrying: running fetches give up at their next attempt boundary
    pub fn shutdown(&self) {
        tracing::info!("Shutting down transcript pipeline");
        self.cancel.cancel();
    }

    /// Get the transcript for a video URL
    pub async fn get_transcript(&self, raw_url: &str) -> Result<Arc<Transcript>, TranscriptError> {
        let id = resolve(raw_url)?;
        self.get_transcript_by_id(&id).await
    }

    /// Get the transcript for an already resolved identifier
    pub async fn get_transcript_by_id(&self, id: &VideoId) -> Result<Arc<Transcript>, TranscriptError> {
        if let Some(transcript) = self.cache.get(id) {
            tracing::info!("Transcript for {} served from cache", id);
            return Ok(transcript);
        }

        let fetcher = Arc::clone(&self.fetcher);
        let policy = self.policy;
        let delay = self.politeness_delay;
        let cancel = self.cancel.clone();
        let fetch_id = id.clone();

        let outcome = self
            .cache
            .get_or_fetch(id, move || async move {
                if let Some(delay) = delay {
                    tracing::debug!("Waiting {:?} before fetching {}", delay, fetch_id);
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            return Err(FetchError::Cancelled(format!(
                                "fetch for {} cancelled before the first attempt",
                                fetch_id
                            )));
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                policy.run(fetcher.as_ref(), &fetch_id, &cancel).await
            })
            .await;

        match outcome {
            Ok(transcript) => {
                tracing::info!(
                    "Fetched transcript for {} ({} entries)",
                    id,
                    transcript.entries().len()
                );
                Ok(transcript)
            }
            Err(err) => Err(classify(id, err)),
        }
    }

    /// Fetch the transcript for a URL and summarize it
    pub async fn summarize(
        &self,
        raw_url: &str,
        options: Option<&SummaryOptions>,
    ) -> Result<Digest, TranscriptError> {
        let transcript = self.get_transcript(raw_url).await?;
        let summary = self.summarize_text(transcript.text(), options).await?;
        tracing::debug!(
            "Summary for {}: {}",
            transcript.video_id,
            truncate_text(&summary, 80)
        );
        Ok(Digest {
            transcript,
            summary,
        })
    }

    /// Summarize arbitrary text with the configured summarizer
    pub async fn summarize_text(
        &self,
        text: &str,
        options: Option<&SummaryOptions>,
    ) -> Result<String, TranscriptError> {
        let summarizer = self
            .summarizer
            .as_ref()
            .ok_or_else(|| TranscriptError::SummaryFailed("no summarizer configured".to_string()))?;
        let options = options.unwrap_or(&self.summary_options);

        summarize::summarize(summarizer.as_ref(), text, options)
            .await
            .map_err(|e| TranscriptError::SummaryFailed(format!("{:#}", e)))
    }
}

/// Convert an internal fetch failure into the caller-facing category
fn classify(id: &VideoId, err: FetchError) -> TranscriptError {
    match err {
        FetchError::RateLimited(_) | FetchError::Network(_) => {
            TranscriptError::TemporarilyUnavailable(format!("{}: {}", id, err))
        }
        FetchError::Provider(_) => TranscriptError::UpstreamError(format!("{}: {}", id, err)),
        FetchError::Cancelled(reason) => TranscriptError::Cancelled(reason),
        FetchError::TranscriptsDisabled(_)
        | FetchError::VideoUnavailable(_, _)
        | FetchError::NoTranscriptFound(_, _)
        | FetchError::InvalidVideoId(_) => TranscriptError::NotAvailable(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn test_classify() {
        let id = VideoId::parse("abcdefghijk").unwrap();
        let cases = [
            (FetchError::RateLimited("429".into()), ErrorKind::TemporarilyUnavailable),
            (FetchError::Network("reset".into()), ErrorKind::TemporarilyUnavailable),
            (FetchError::Provider("HTTP 500".into()), ErrorKind::UpstreamError),
            (FetchError::Cancelled("stop".into()), ErrorKind::Cancelled),
            (FetchError::TranscriptsDisabled(id.to_string()), ErrorKind::NotAvailable),
            (
                FetchError::VideoUnavailable(id.to_string(), "private".into()),
                ErrorKind::NotAvailable,
            ),
            (
                FetchError::NoTranscriptFound(id.to_string(), "en".into()),
                ErrorKind::NotAvailable,
            ),
        ];

        for (err, kind) in cases {
            let classified = classify(&id, err);
            assert_eq!(classified.kind(), kind);
            assert!(!classified.reason().is_empty());
        }
    }
}
