use async_trait::async_trait;

pub mod captions;
pub mod youtube;

pub use youtube::YoutubeFetcher;

use crate::resolver::VideoId;
use crate::transcript::Transcript;

/// Outcome of a single fetch attempt
pub type FetchOutcome = std::result::Result<Transcript, FetchError>;

/// Classified failure of one fetch attempt
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("rate limited by provider: {0}")]
    RateLimited(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("unexpected provider response: {0}")]
    Provider(String),

    #[error("cancelled: {0}")]
    Cancelled(String),

    #[error("transcripts are disabled for video {0}")]
    TranscriptsDisabled(String),

    #[error("video {0} is unavailable: {1}")]
    VideoUnavailable(String, String),

    #[error("no transcript for video {0} in languages [{1}]")]
    NoTranscriptFound(String, String),

    #[error("invalid video id: {0}")]
    InvalidVideoId(String),
}

impl FetchError {
    /// Whether another attempt could succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FetchError::RateLimited(_) | FetchError::Network(_) | FetchError::Provider(_)
        )
    }

    pub fn is_permanent(&self) -> bool {
        !self.is_transient() && !matches!(self, FetchError::Cancelled(_))
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.status().map(|s| s.as_u16()) == Some(429) {
            FetchError::RateLimited(err.to_string())
        } else if err.is_decode() {
            FetchError::Provider(err.to_string())
        } else {
            FetchError::Network(err.to_string())
        }
    }
}

/// Retrieves the transcript for a single identifier.
///
/// One call is one round trip to the provider; implementations keep no state
/// about caching or retries.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TranscriptFetcher: Send + Sync {
    async fn fetch(&self, id: &VideoId) -> FetchOutcome;

    /// Name of the provider, for logs
    fn provider_name(&self) -> &'static str;
}
