//! Feed acquisition with cache fallback.
//!
//! A successful response refreshes the cache. Any failure (bad status,
//! rate limiting, transport error) falls back to whatever the cache holds,
//! expired or not; only an empty cache turns the failure into an error.

use log::{error, info, warn};

use crate::cache::FeedCache;
use crate::error::{FetchFailure, PalError};
use crate::http::HttpTransport;

pub const OVERCAST_OPML_URL: &str = "https://overcast.fm/account/export_opml/extended";

/// Where the feed text came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchResult {
    Live(String),
    Cached { body: String, is_stale: bool },
}

impl FetchResult {
    pub fn body(&self) -> &str {
        match self {
            FetchResult::Live(body) => body,
            FetchResult::Cached { body, .. } => body,
        }
    }

    pub fn into_body(self) -> String {
        match self {
            FetchResult::Live(body) => body,
            FetchResult::Cached { body, .. } => body,
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(self, FetchResult::Live(_))
    }
}

pub struct ResilientFetcher<T: HttpTransport> {
    transport: T,
    cache: FeedCache,
}

impl<T: HttpTransport> ResilientFetcher<T> {
    pub fn new(transport: T, cache: FeedCache) -> Self {
        Self { transport, cache }
    }

    pub fn cache(&self) -> &FeedCache {
        &self.cache
    }

    pub async fn fetch(&self, endpoint: &str) -> Result<FetchResult, PalError> {
        info!("Fetching latest OPML export from {}", endpoint);

        let failure = match self.transport.get(endpoint).await {
            Ok(response) if response.is_success() => {
                if let Err(e) = self.cache.write(&response.body) {
                    // Still a good fetch; only the next fallback is weakened.
                    error!("Unable to cache OPML export: {}", e);
                }
                return Ok(FetchResult::Live(response.body));
            }
            Ok(response) => {
                warn!("Failed to fetch OPML: HTTP {}", response.status);
                FetchFailure::from_status(response.status)
            }
            Err(e) => {
                warn!("Request failed: {}, attempting to use cache", e);
                FetchFailure::Transport(e.to_string())
            }
        };

        self.fall_back(failure)
    }

    /// Serves a still-fresh cache entry without touching the network, otherwise
    /// behaves like [`fetch`](Self::fetch).
    pub async fn fetch_preferring_cache(&self, endpoint: &str) -> Result<FetchResult, PalError> {
        if let Some(body) = self.cache.read() {
            info!("Using cached OPML export from {}", self.cache.path().display());
            return Ok(FetchResult::Cached { body, is_stale: false });
        }
        self.fetch(endpoint).await
    }

    fn fall_back(&self, failure: FetchFailure) -> Result<FetchResult, PalError> {
        match self.cache.force_read() {
            Some(body) => {
                let is_stale = self.cache.is_expired();
                if is_stale {
                    warn!("Using expired cache due to API error ({})", failure);
                } else {
                    info!("Using valid cache due to API error ({})", failure);
                }
                Ok(FetchResult::Cached { body, is_stale })
            }
            None => {
                if failure == FetchFailure::RateLimited {
                    error!("Rate limited by Overcast API and no cache available");
                } else {
                    error!("Failed to fetch OPML and no cache available: {}", failure);
                }
                Err(PalError::FetchError(failure))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheConfig;
    use crate::http::HttpResponse;
    use async_trait::async_trait;
    use filetime::{set_file_mtime, FileTime};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    enum Reply {
        Status(u16, &'static str),
        Broken,
    }

    struct MockTransport {
        reply: Reply,
        calls: AtomicUsize,
    }

    impl MockTransport {
        fn new(reply: Reply) -> Self {
            Self { reply, calls: AtomicUsize::new(0) }
        }
    }

    #[async_trait]
    impl HttpTransport for MockTransport {
        async fn get(&self, _url: &str) -> anyhow::Result<HttpResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.reply {
                Reply::Status(code, body) => Ok(HttpResponse::new(code, body)),
                Reply::Broken => Err(anyhow::anyhow!("Network error")),
            }
        }
    }

    fn cache_in(dir: &TempDir) -> FeedCache {
        FeedCache::new(CacheConfig::from_hours(dir.path().join("overcast.opml"), 24))
    }

    fn age_cache(cache: &FeedCache, hours: u64) {
        let then = SystemTime::now() - Duration::from_secs(hours * 3600);
        set_file_mtime(cache.path(), FileTime::from_system_time(then)).unwrap();
    }

    #[tokio::test]
    async fn success_is_cached_and_returned_live() {
        let dir = TempDir::new().unwrap();
        let fetcher = ResilientFetcher::new(MockTransport::new(Reply::Status(200, "<opml/>")), cache_in(&dir));

        let result = fetcher.fetch(OVERCAST_OPML_URL).await.unwrap();
        assert_eq!(result, FetchResult::Live("<opml/>".to_string()));
        assert_eq!(fetcher.cache().force_read().as_deref(), Some("<opml/>"));
        assert_eq!(fetcher.transport.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn rate_limit_uses_valid_cache() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir);
        cache.write("cached opml content").unwrap();
        let fetcher = ResilientFetcher::new(MockTransport::new(Reply::Status(429, "slow down")), cache);

        let result = fetcher.fetch(OVERCAST_OPML_URL).await.unwrap();
        assert_eq!(
            result,
            FetchResult::Cached { body: "cached opml content".to_string(), is_stale: false }
        );
        // The error body must not overwrite the cache.
        assert_eq!(fetcher.cache().force_read().as_deref(), Some("cached opml content"));
    }

    #[tokio::test]
    async fn transport_error_uses_expired_cache() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir);
        cache.write("old opml").unwrap();
        age_cache(&cache, 48);
        let fetcher = ResilientFetcher::new(MockTransport::new(Reply::Broken), cache);

        let result = fetcher.fetch(OVERCAST_OPML_URL).await.unwrap();
        assert_eq!(result.body(), "old opml");
        assert_eq!(result, FetchResult::Cached { body: "old opml".to_string(), is_stale: true });
    }

    #[tokio::test]
    async fn transport_error_without_cache_fails() {
        let dir = TempDir::new().unwrap();
        let fetcher = ResilientFetcher::new(MockTransport::new(Reply::Broken), cache_in(&dir));

        match fetcher.fetch(OVERCAST_OPML_URL).await {
            Err(PalError::FetchError(FetchFailure::Transport(msg))) => assert!(msg.contains("Network error")),
            other => panic!("expected transport FetchError, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn rate_limit_without_cache_fails_as_rate_limited() {
        let dir = TempDir::new().unwrap();
        let fetcher = ResilientFetcher::new(MockTransport::new(Reply::Status(429, "")), cache_in(&dir));

        assert!(matches!(
            fetcher.fetch(OVERCAST_OPML_URL).await,
            Err(PalError::FetchError(FetchFailure::RateLimited))
        ));
    }

    #[tokio::test]
    async fn fresh_cache_short_circuits_when_preferred() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir);
        cache.write("cached").unwrap();
        let fetcher = ResilientFetcher::new(MockTransport::new(Reply::Status(200, "live")), cache);

        let result = fetcher.fetch_preferring_cache(OVERCAST_OPML_URL).await.unwrap();
        assert_eq!(result.body(), "cached");
        assert_eq!(fetcher.transport.calls.load(Ordering::SeqCst), 0);

        age_cache(fetcher.cache(), 48);
        let result = fetcher.fetch_preferring_cache(OVERCAST_OPML_URL).await.unwrap();
        assert_eq!(result, FetchResult::Live("live".to_string()));
        assert_eq!(fetcher.transport.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cache_write_failure_does_not_fail_fetch() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();
        let cache = FeedCache::new(CacheConfig::from_hours(blocker.join("overcast.opml"), 24));
        let fetcher = ResilientFetcher::new(MockTransport::new(Reply::Status(200, "<opml/>")), cache);

        let result = fetcher.fetch(OVERCAST_OPML_URL).await.unwrap();
        assert!(result.is_live());
        assert_eq!(result.into_body(), "<opml/>");
    }
}
