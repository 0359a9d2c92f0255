use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::fetcher::{FetchError, FetchOutcome, TranscriptFetcher};
use crate::resolver::VideoId;

/// Shape of the delay between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Backoff {
    /// `base_delay * 2^(n-1)` after the n-th failed attempt
    #[default]
    Exponential,
    /// `base_delay` after every failed attempt
    Fixed,
}

/// Bounded retry for transient fetch failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::exponential(3, Duration::from_secs(2))
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, backoff: Backoff) -> Self {
        Self {
            max_attempts,
            base_delay,
            backoff,
        }
    }

    pub fn exponential(max_attempts: u32, base_delay: Duration) -> Self {
        Self::new(max_attempts, base_delay, Backoff::Exponential)
    }

    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self::new(max_attempts, delay, Backoff::Fixed)
    }

    /// Single attempt, no waiting
    pub fn none() -> Self {
        Self::fixed(1, Duration::ZERO)
    }

    /// Delay to wait after `attempt` (1-based) has failed
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.base_delay,
            Backoff::Exponential => {
                let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
                self.base_delay.saturating_mul(factor)
            }
        }
    }

    /// Run `fetcher` until it succeeds, fails permanently, or the attempt budget is spent.
    ///
    /// Cancellation is observed before each attempt and during backoff; an attempt
    /// already in progress always completes.
    pub async fn run<F>(&self, fetcher: &F, id: &VideoId, cancel: &CancellationToken) -> FetchOutcome
    where
        F: TranscriptFetcher + ?Sized,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(FetchError::Cancelled(format!(
                    "fetch for {} cancelled after {} attempt(s)",
                    id, attempt
                )));
            }

            attempt += 1;
            tracing::debug!(
                "Fetching transcript for {} from {} (attempt {}/{})",
                id,
                fetcher.provider_name(),
                attempt,
                max_attempts
            );

            let err = match fetcher.fetch(id).await {
                Ok(transcript) => return Ok(transcript),
                Err(err) => err,
            };

            if !err.is_transient() {
                tracing::warn!("Permanent failure for {}: {}", id, err);
                return Err(err);
            }

            if attempt >= max_attempts {
                tracing::warn!(
                    "Giving up on {} after {} attempt(s): {}",
                    id,
                    attempt,
                    err
                );
                return Err(err);
            }

            let delay = self.delay_for(attempt);
            tracing::info!(
                "Transient failure for {} ({}), retrying in {:?}",
                id,
                err,
                delay
            );

            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(FetchError::Cancelled(format!(
                        "fetch for {} cancelled during backoff after {} attempt(s)",
                        id, attempt
                    )));
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
