//! Bounded in-memory transcript cache with per-identifier single-flight.
//!
//! One mutex guards both the stored entries and the registry of in-flight
//! fetches. It is held only to decide "cached, joining, or leading" and to
//! publish a finished result. The leader builds and spawns the fetch after
//! releasing it, so slow fetches for one identifier never block others.

use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::fetcher::{FetchError, FetchOutcome};
use crate::resolver::VideoId;
use crate::transcript::Transcript;

type SharedOutcome = Result<Arc<Transcript>, FetchError>;
type SharedFetch = Shared<BoxFuture<'static, SharedOutcome>>;

/// Counters describing cache behaviour since construction or the last `clear`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Lookups answered from a stored transcript
    pub hits: u64,
    /// Lookups that started an upstream fetch
    pub misses: u64,
    /// Lookups that joined a fetch already in flight
    pub coalesced: u64,
    /// Entries dropped for capacity or age
    pub evictions: u64,
    /// Transcripts currently stored
    pub entries: usize,
    /// Fetches currently running
    pub in_flight: usize,
}

struct CachedEntry {
    transcript: Arc<Transcript>,
    inserted_at: Instant,
    last_used: u64,
}

struct Inner {
    entries: HashMap<VideoId, CachedEntry>,
    in_flight: HashMap<VideoId, SharedFetch>,
    clock: u64,
    stats: CacheStats,
    capacity: usize,
    ttl: Option<Duration>,
}

impl Inner {
    fn lookup(&mut self, id: &VideoId) -> Option<Arc<Transcript>> {
        let expired = match self.entries.get(id) {
            Some(entry) => self
                .ttl
                .is_some_and(|ttl| entry.inserted_at.elapsed() >= ttl),
            None => return None,
        };

        if expired {
            self.entries.remove(id);
            self.stats.evictions += 1;
            tracing::debug!("Cached transcript for {} expired", id);
            return None;
        }

        self.clock += 1;
        let clock = self.clock;
        let entry = self.entries.get_mut(id)?;
        entry.last_used = clock;
        Some(entry.transcript.clone())
    }

    fn store(&mut self, id: VideoId, transcript: Arc<Transcript>) {
        if self.capacity == 0 {
            return;
        }

        if !self.entries.contains_key(&id) {
            self.purge_expired();
            while self.entries.len() >= self.capacity {
                let Some(oldest) = self
                    .entries
                    .iter()
                    .min_by_key(|(_, e)| e.last_used)
                    .map(|(k, _)| k.clone())
                else {
                    break;
                };
                self.entries.remove(&oldest);
                self.stats.evictions += 1;
                tracing::debug!("Evicted least recently used transcript {}", oldest);
            }
        }

        self.clock += 1;
        self.entries.insert(
            id,
            CachedEntry {
                transcript,
                inserted_at: Instant::now(),
                last_used: self.clock,
            },
        );
    }

    fn purge_expired(&mut self) {
        let Some(ttl) = self.ttl else {
            return;
        };
        let before = self.entries.len();
        self.entries.retain(|_, e| e.inserted_at.elapsed() < ttl);
        self.stats.evictions += (before - self.entries.len()) as u64;
    }
}

/// Shared transcript cache, cheap to clone
#[derive(Clone)]
pub struct TranscriptCache {
    inner: Arc<Mutex<Inner>>,
}

impl TranscriptCache {
    /// Create a cache holding at most `capacity` transcripts, each for at most `ttl`
    pub fn new(capacity: usize, ttl: Option<Duration>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                entries: HashMap::new(),
                in_flight: HashMap::new(),
                clock: 0,
                stats: CacheStats::default(),
                capacity,
                ttl,
            })),
        }
    }

    /// Non-blocking lookup of a stored transcript
    pub fn get(&self, id: &VideoId) -> Option<Arc<Transcript>> {
        let mut inner = self.inner.lock();
        let found = inner.lookup(id);
        if found.is_some() {
            inner.stats.hits += 1;
        }
        found
    }

    /// Return the stored transcript or run `fetch_fn` to obtain it.
    ///
    /// Concurrent callers for the same identifier share a single invocation of
    /// `fetch_fn` and all observe its outcome. Failures are not stored. The fetch
    /// runs on its own task: callers that stop waiting do not cancel it, and a
    /// successful result is stored even if nobody is left to receive it.
    /// `fetch_fn` is called after the cache lock is released, so it may use the
    /// cache itself.
    pub async fn get_or_fetch<F, Fut>(
        &self,
        id: &VideoId,
        fetch_fn: F,
    ) -> Result<Arc<Transcript>, FetchError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = FetchOutcome> + Send + 'static,
    {
        let (pending, leader) = {
            let mut inner = self.inner.lock();

            if let Some(transcript) = inner.lookup(id) {
                inner.stats.hits += 1;
                return Ok(transcript);
            }

            if let Some(pending) = inner.in_flight.get(id) {
                let pending = pending.clone();
                inner.stats.coalesced += 1;
                tracing::debug!("Joining in-flight fetch for {}", id);
                (pending, None)
            } else {
                inner.stats.misses += 1;
                let (tx, rx) = oneshot::channel();
                let missing = id.clone();
                let pending = rx
                    .map(move |received| {
                        received.unwrap_or_else(|_| {
                            Err(FetchError::Provider(format!(
                                "fetch for {} ended without a result",
                                missing
                            )))
                        })
                    })
                    .boxed()
                    .shared();
                inner.in_flight.insert(id.clone(), pending.clone());
                (pending, Some(tx))
            }
        };

        if let Some(tx) = leader {
            match std::panic::catch_unwind(AssertUnwindSafe(fetch_fn)) {
                Ok(fetch) => self.spawn_fetch(id.clone(), fetch, tx),
                Err(_) => {
                    let err = FetchError::Provider(format!("fetch for {} panicked", id));
                    self.finish(id, Err(err.clone()), tx);
                    return Err(err);
                }
            }
        }

        pending.await
    }

    fn spawn_fetch<Fut>(&self, id: VideoId, fetch: Fut, tx: oneshot::Sender<SharedOutcome>)
    where
        Fut: Future<Output = FetchOutcome> + Send + 'static,
    {
        let cache = self.clone();
        tokio::spawn(async move {
            let outcome = AssertUnwindSafe(fetch)
                .catch_unwind()
                .await
                .unwrap_or_else(|_| {
                    Err(FetchError::Provider(format!("fetch for {} panicked", id)))
                });
            cache.finish(&id, outcome.map(Arc::new), tx);
        });
    }

    /// Retire the in-flight entry for `id`, store a success and wake every waiter
    fn finish(&self, id: &VideoId, outcome: SharedOutcome, tx: oneshot::Sender<SharedOutcome>) {
        let mut inner = self.inner.lock();
        inner.in_flight.remove(id);
        if let Ok(transcript) = &outcome {
            inner.store(id.clone(), transcript.clone());
        }
        let _ = tx.send(outcome);
    }

    /// Store a transcript directly, e.g. to pre-warm the cache
    pub fn insert(&self, transcript: Transcript) -> Arc<Transcript> {
        let transcript = Arc::new(transcript);
        self.inner
            .lock()
            .store(transcript.video_id.clone(), transcript.clone());
        transcript
    }

    pub fn contains(&self, id: &VideoId) -> bool {
        self.inner.lock().lookup(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every stored transcript and reset counters; in-flight fetches keep running
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.stats = CacheStats::default();
        tracing::debug!("Transcript cache cleared");
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            entries: inner.entries.len(),
            in_flight: inner.in_flight.len(),
            ..inner.stats
        }
    }
}

impl Default for TranscriptCache {
    fn default() -> Self {
        Self::new(256, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::TranscriptEntry;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn vid(s: &str) -> VideoId {
        VideoId::parse(s).unwrap()
    }

    fn transcript(id: &VideoId, text: &str) -> Transcript {
        Transcript::new(
            id.clone(),
            vec![TranscriptEntry::new(text, Duration::ZERO, Duration::from_secs(1))],
        )
    }

    #[tokio::test]
    async fn test_get_or_fetch_stores_success() {
        let cache = TranscriptCache::new(8, None);
        let id = vid("abcdefghijk");
        assert!(cache.get(&id).is_none());

        let expected = transcript(&id, "hello");
        let fetched = cache
            .get_or_fetch(&id, move || async move { FetchOutcome::Ok(expected) })
            .await
            .unwrap();
        assert_eq!(fetched.text(), "hello");

        let again = cache
            .get_or_fetch(&id, || async {
                FetchOutcome::Err(FetchError::Provider("must not fetch twice".into()))
            })
            .await
            .unwrap();
        assert!(Arc::ptr_eq(&fetched, &again));

        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.in_flight, 0);
    }

    #[tokio::test]
    async fn test_failure_not_cached() {
        let cache = TranscriptCache::new(8, None);
        let id = vid("abcdefghijk");

        let err = cache
            .get_or_fetch(&id, || async { FetchOutcome::Err(FetchError::Network("down".into())) })
            .await
            .unwrap_err();
        assert_eq!(err, FetchError::Network("down".into()));
        assert!(cache.is_empty());

        let retry_id = id.clone();
        let ok = cache
            .get_or_fetch(&id, move || async move { FetchOutcome::Ok(transcript(&retry_id, "later")) })
            .await;
        assert!(ok.is_ok());
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_share_one_fetch() {
        let cache = TranscriptCache::new(8, None);
        let id = vid("abcdefghijk");
        let calls = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(tokio::sync::Notify::new());

        let mut handles = Vec::new();
        for _ in 0..16 {
            let cache = cache.clone();
            let id = id.clone();
            let calls = calls.clone();
            let gate = gate.clone();
            handles.push(tokio::spawn(async move {
                let fetch_id = id.clone();
                cache
                    .get_or_fetch(&id, move || {
                        calls.fetch_add(1, Ordering::SeqCst);
                        async move {
                            gate.notified().await;
                            FetchOutcome::Ok(transcript(&fetch_id, "shared"))
                        }
                    })
                    .await
            }));
        }

        while cache.stats().misses + cache.stats().coalesced < 16 {
            tokio::task::yield_now().await;
        }
        gate.notify_one();

        for handle in handles {
            let result = handle.await.unwrap().unwrap();
            assert_eq!(result.text(), "shared");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.stats().coalesced, 15);
    }

    #[tokio::test]
    async fn test_different_ids_fetch_independently() {
        let cache = TranscriptCache::new(8, None);
        let slow_id = vid("aaaaaaaaaaa");
        let fast_id = vid("bbbbbbbbbbb");
        let gate = Arc::new(tokio::sync::Notify::new());

        let slow = {
            let cache = cache.clone();
            let gate = gate.clone();
            let id = slow_id.clone();
            tokio::spawn(async move {
                let inner_id = id.clone();
                cache
                    .get_or_fetch(&id, move || async move {
                        gate.notified().await;
                        FetchOutcome::Ok(transcript(&inner_id, "slow"))
                    })
                    .await
            })
        };

        let id = fast_id.clone();
        let fast = cache
            .get_or_fetch(&fast_id, move || async move { FetchOutcome::Ok(transcript(&id, "fast")) })
            .await
            .unwrap();
        assert_eq!(fast.text(), "fast");
        assert!(!slow.is_finished());

        gate.notify_one();
        assert_eq!(slow.await.unwrap().unwrap().text(), "slow");
    }

    #[tokio::test]
    async fn test_abandoned_waiter_does_not_cancel_fetch() {
        let cache = TranscriptCache::new(8, None);
        let id = vid("abcdefghijk");
        let gate = Arc::new(tokio::sync::Notify::new());

        let fetch_gate = gate.clone();
        let fetch_id = id.clone();
        let waited = tokio::time::timeout(
            Duration::from_millis(20),
            cache.get_or_fetch(&id, move || async move {
                fetch_gate.notified().await;
                FetchOutcome::Ok(transcript(&fetch_id, "eventually"))
            }),
        )
        .await;
        assert!(waited.is_err());
        assert_eq!(cache.stats().in_flight, 1);

        gate.notify_one();
        let joined = cache
            .get_or_fetch(&id, || async {
                FetchOutcome::Err(FetchError::Provider("must join the running fetch".into()))
            })
            .await
            .unwrap();
        assert_eq!(joined.text(), "eventually");
        assert_eq!(cache.len(), 1);
    }

    async fn explode_after(gate: Arc<tokio::sync::Notify>) -> FetchOutcome {
        gate.notified().await;
        panic!("malformed provider payload");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_panicking_fetch_fails_every_waiter() {
        let cache = TranscriptCache::new(8, None);
        let id = vid("abcdefghijk");
        let gate = Arc::new(tokio::sync::Notify::new());

        let mut handles = Vec::new();
        for _ in 0..4 {
            let cache = cache.clone();
            let id = id.clone();
            let gate = gate.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_fetch(&id, move || explode_after(gate))
                    .await
            }));
        }

        while cache.stats().misses + cache.stats().coalesced < 4 {
            tokio::task::yield_now().await;
        }
        gate.notify_one();

        for handle in handles {
            let err = handle.await.unwrap().unwrap_err();
            assert!(matches!(&err, FetchError::Provider(reason) if reason.contains("panicked")));
        }
        let stats = cache.stats();
        assert_eq!(stats.in_flight, 0);
        assert_eq!(stats.entries, 0);
    }

    #[tokio::test]
    async fn test_fetch_fn_panic_clears_in_flight() {
        let cache = TranscriptCache::new(8, None);
        let id = vid("abcdefghijk");

        let err = cache
            .get_or_fetch(&id, || -> std::future::Ready<FetchOutcome> {
                panic!("could not build request")
            })
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Provider(_)));
        assert_eq!(cache.stats().in_flight, 0);

        let fetch_id = id.clone();
        let ok = cache
            .get_or_fetch(&id, move || async move { FetchOutcome::Ok(transcript(&fetch_id, "recovered")) })
            .await
            .unwrap();
        assert_eq!(ok.text(), "recovered");
    }

    #[tokio::test]
    async fn test_fetch_fn_may_use_the_cache() {
        let cache = TranscriptCache::new(8, None);
        let id = vid("abcdefghijk");
        let other = vid("bbbbbbbbbbb");
        cache.insert(transcript(&other, "warm"));

        let inner_cache = cache.clone();
        let fetch_id = id.clone();
        let fetched = cache
            .get_or_fetch(&id, move || {
                let warm = inner_cache.get(&other).map(|t| t.text().to_string());
                assert_eq!(inner_cache.stats().in_flight, 1);
                async move {
                    FetchOutcome::Ok(transcript(&fetch_id, &warm.unwrap_or_default()))
                }
            })
            .await
            .unwrap();

        assert_eq!(fetched.text(), "warm");
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn test_capacity_evicts_least_recently_used() {
        let cache = TranscriptCache::new(2, None);
        let a = vid("aaaaaaaaaaa");
        let b = vid("bbbbbbbbbbb");
        let c = vid("ccccccccccc");

        cache.insert(transcript(&a, "a"));
        cache.insert(transcript(&b, "b"));
        assert!(cache.get(&a).is_some());
        cache.insert(transcript(&c, "c"));

        assert!(cache.contains(&a));
        assert!(!cache.contains(&b));
        assert!(cache.contains(&c));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[tokio::test]
    async fn test_zero_capacity_stores_nothing() {
        let cache = TranscriptCache::new(0, None);
        let id = vid("abcdefghijk");
        let fetch_id = id.clone();
        let result = cache
            .get_or_fetch(&id, move || async move { FetchOutcome::Ok(transcript(&fetch_id, "x")) })
            .await;
        assert!(result.is_ok());
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_expires_entries() {
        let cache = TranscriptCache::new(8, Some(Duration::from_secs(60)));
        let id = vid("abcdefghijk");
        cache.insert(transcript(&id, "fresh"));
        assert!(cache.get(&id).is_some());

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(cache.get(&id).is_none());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[tokio::test]
    async fn test_clear() {
        let cache = TranscriptCache::default();
        let id = vid("abcdefghijk");
        cache.insert(transcript(&id, "x"));
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.stats(), CacheStats::default());
    }
}
