//! Time-boxed cache of the remote protocol-version descriptor.
//!
//! Lookups hit the network at most once per TTL window. A fetch or parse
//! failure falls back to the library-pinned resolver; only a fallback
//! failure escapes to the caller (startup-fatal, no tertiary fallback).

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use tracing::{debug, warn};

use courier_core::engine::ProtocolVersion;
use courier_core::errors::VersionError;

/// Canonical version document location.
const VERSION_DOC_URL: &str =
    "https://raw.githubusercontent.com/WhiskeySockets/Baileys/refs/heads/master/src/Defaults/baileys-version.json";

/// Last protocol version known to work, compiled in as the fallback.
const PINNED_VERSION: [u32; 3] = [2, 3000, 1023];

/// Cache entries are valid for one hour.
pub const VERSION_CACHE_TTL: Duration = Duration::from_millis(3_600_000);

/// Fetches the canonical version document from the remote source.
#[async_trait]
pub trait VersionFetcher: Send + Sync {
    async fn fetch(&self) -> Result<ProtocolVersion, VersionError>;
}

/// Resolves a usable version when the canonical source is unreachable.
#[async_trait]
pub trait FallbackResolver: Send + Sync {
    async fn resolve(&self) -> Result<ProtocolVersion, VersionError>;
}

#[derive(Deserialize)]
struct VersionDoc {
    version: Vec<u32>,
}

/// HTTP GET of the well-known version document.
pub struct HttpVersionFetcher {
    client: reqwest::Client,
    url: String,
}

impl HttpVersionFetcher {
    pub fn new() -> Self {
        Self::with_url(VERSION_DOC_URL)
    }

    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

impl Default for HttpVersionFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VersionFetcher for HttpVersionFetcher {
    async fn fetch(&self) -> Result<ProtocolVersion, VersionError> {
        let resp = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| VersionError::Fetch(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(VersionError::Fetch(format!("status {}", resp.status())));
        }

        let doc: VersionDoc = resp
            .json()
            .await
            .map_err(|e| VersionError::Malformed(e.to_string()))?;

        if doc.version.is_empty() {
            return Err(VersionError::Malformed("empty version field".into()));
        }

        Ok(ProtocolVersion(doc.version))
    }
}

/// Compiled-in "latest known version" resolver. Infallible in practice.
pub struct PinnedResolver;

#[async_trait]
impl FallbackResolver for PinnedResolver {
    async fn resolve(&self) -> Result<ProtocolVersion, VersionError> {
        Ok(ProtocolVersion(PINNED_VERSION.to_vec()))
    }
}

struct CacheEntry {
    version: ProtocolVersion,
    fetched_at: Instant,
}

/// Version cache, constructed once at process start and shared by `Arc`.
pub struct VersionCache {
    fetcher: Arc<dyn VersionFetcher>,
    fallback: Arc<dyn FallbackResolver>,
    ttl: Duration,
    entry: Mutex<Option<CacheEntry>>,
}

impl VersionCache {
    pub fn new(fetcher: Arc<dyn VersionFetcher>, fallback: Arc<dyn FallbackResolver>) -> Self {
        Self::with_ttl(fetcher, fallback, VERSION_CACHE_TTL)
    }

    pub fn with_ttl(
        fetcher: Arc<dyn VersionFetcher>,
        fallback: Arc<dyn FallbackResolver>,
        ttl: Duration,
    ) -> Self {
        Self {
            fetcher,
            fallback,
            ttl,
            entry: Mutex::new(None),
        }
    }

    /// Return a usable protocol version.
    ///
    /// The lock is never held across an await, so concurrent callers on a
    /// cache miss may race duplicate fetches; calls are infrequent (once
    /// per connection open) and last write wins whole-entry.
    pub async fn get(&self) -> Result<ProtocolVersion, VersionError> {
        if let Some(version) = self.fresh() {
            debug!(version = %version, "protocol version cache hit");
            return Ok(version);
        }

        let version = match self.fetcher.fetch().await {
            Ok(version) => version,
            Err(e) => {
                warn!(error = %e, "version fetch failed, using fallback resolver");
                self.fallback.resolve().await?
            }
        };

        *self.entry.lock() = Some(CacheEntry {
            version: version.clone(),
            fetched_at: Instant::now(),
        });

        Ok(version)
    }

    fn fresh(&self) -> Option<ProtocolVersion> {
        let entry = self.entry.lock();
        entry
            .as_ref()
            .filter(|e| e.fetched_at.elapsed() < self.ttl)
            .map(|e| e.version.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingFetcher {
        calls: AtomicUsize,
        result: Result<ProtocolVersion, VersionError>,
    }

    impl CountingFetcher {
        fn ok(version: Vec<u32>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                result: Ok(ProtocolVersion(version)),
            }
        }

        fn failing() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                result: Err(VersionError::Fetch("connection refused".into())),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::Relaxed)
        }
    }

    #[async_trait]
    impl VersionFetcher for CountingFetcher {
        async fn fetch(&self) -> Result<ProtocolVersion, VersionError> {
            drop(self.calls.fetch_add(1, Ordering::Relaxed));
            self.result.clone()
        }
    }

    struct CountingResolver {
        calls: AtomicUsize,
        result: Result<ProtocolVersion, VersionError>,
    }

    impl CountingResolver {
        fn ok(version: Vec<u32>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                result: Ok(ProtocolVersion(version)),
            }
        }

        fn failing() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                result: Err(VersionError::FallbackFailed("resolver broken".into())),
            }
        }
    }

    #[async_trait]
    impl FallbackResolver for CountingResolver {
        async fn resolve(&self) -> Result<ProtocolVersion, VersionError> {
            drop(self.calls.fetch_add(1, Ordering::Relaxed));
            self.result.clone()
        }
    }

    #[tokio::test]
    async fn second_call_within_ttl_hits_cache() {
        let fetcher = Arc::new(CountingFetcher::ok(vec![2, 3000, 50]));
        let cache = VersionCache::new(fetcher.clone(), Arc::new(PinnedResolver));

        let first = cache.get().await.unwrap();
        let second = cache.get().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn expired_entry_triggers_exactly_one_refetch() {
        let fetcher = Arc::new(CountingFetcher::ok(vec![2, 3000, 50]));
        let cache = VersionCache::with_ttl(
            fetcher.clone(),
            Arc::new(PinnedResolver),
            Duration::from_millis(0),
        );

        let _ = cache.get().await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        let _ = cache.get().await.unwrap();

        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn fetch_failure_falls_back_once_per_miss() {
        let fetcher = Arc::new(CountingFetcher::failing());
        let fallback = Arc::new(CountingResolver::ok(vec![2, 3000, 40]));
        let cache = VersionCache::new(fetcher.clone(), fallback.clone());

        let version = cache.get().await.unwrap();
        assert_eq!(version, ProtocolVersion(vec![2, 3000, 40]));
        assert_eq!(fallback.calls.load(Ordering::Relaxed), 1);

        // Fallback result was cached; no further fetch or resolve.
        let _ = cache.get().await.unwrap();
        assert_eq!(fetcher.calls(), 1);
        assert_eq!(fallback.calls.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn fallback_failure_propagates() {
        let cache = VersionCache::new(
            Arc::new(CountingFetcher::failing()),
            Arc::new(CountingResolver::failing()),
        );

        let err = cache.get().await.unwrap_err();
        assert!(matches!(err, VersionError::FallbackFailed(_)));
    }

    #[tokio::test]
    async fn pinned_resolver_never_fails() {
        let version = PinnedResolver.resolve().await.unwrap();
        assert_eq!(version, ProtocolVersion(PINNED_VERSION.to_vec()));
    }

    #[tokio::test]
    async fn concurrent_misses_agree_on_a_version() {
        let fetcher = Arc::new(CountingFetcher::ok(vec![2, 3000, 60]));
        let cache = Arc::new(VersionCache::new(fetcher, Arc::new(PinnedResolver)));

        let a = tokio::spawn({
            let cache = Arc::clone(&cache);
            async move { cache.get().await.unwrap() }
        });
        let b = tokio::spawn({
            let cache = Arc::clone(&cache);
            async move { cache.get().await.unwrap() }
        });

        // Duplicate in-flight fetches are accepted; both callers must
        // still receive the same descriptor.
        assert_eq!(a.await.unwrap(), b.await.unwrap());
    }
}
