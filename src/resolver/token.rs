//! Cached bearer token for the paid decoder.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::{MAX_TOKEN_TTL_SECS, TOKEN_EXPIRY_SKEW_SECS};
use crate::error::{AppError, Result};

#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub access_token: String,
    pub expires_in: Duration,
}

/// Something that can mint a fresh token (the provider's auth endpoint).
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn fetch_token(&self) -> Result<IssuedToken>;
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// Process-wide token holder. The refresh runs under the lock, so concurrent
/// callers that miss together wait for one fetch instead of each issuing one.
pub struct TokenCache<S> {
    source: S,
    skew: Duration,
    slot: Mutex<Option<CachedToken>>,
}

impl<S: TokenSource> TokenCache<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            skew: Duration::from_secs(TOKEN_EXPIRY_SKEW_SECS),
            slot: Mutex::new(None),
        }
    }

    #[cfg(test)]
    pub fn with_skew(mut self, skew: Duration) -> Self {
        self.skew = skew;
        self
    }

    /// Return the cached token if it outlives the skew window, otherwise
    /// fetch, store and return a new one.
    pub async fn get_valid_token(&self) -> Result<String> {
        let mut slot = self.slot.lock().await;

        if let Some(token) = slot.as_ref() {
            if Instant::now() + self.skew < token.expires_at {
                return Ok(token.value.clone());
            }
            debug!("upstream token expired, refreshing");
        }

        let issued = self.source.fetch_token().await?;
        if issued.access_token.is_empty() {
            return Err(AppError::UpstreamAuth("token endpoint returned an empty token".to_string()));
        }
        // The advertised lifetime is provider data; never let it overflow `Instant`.
        let lifetime = issued.expires_in.min(Duration::from_secs(MAX_TOKEN_TTL_SECS));
        let now = Instant::now();
        let expires_at = now.checked_add(lifetime).unwrap_or(now);
        info!(
            expires_in_secs = issued.expires_in.as_secs(),
            cached_for_secs = lifetime.as_secs(),
            "upstream token refreshed"
        );

        let value = issued.access_token.clone();
        *slot = Some(CachedToken {
            value: issued.access_token,
            expires_at,
        });
        Ok(value)
    }

    /// Drop the cached token, e.g. after the provider rejected it.
    pub async fn invalidate(&self) {
        *self.slot.lock().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingSource {
        calls: Arc<AtomicUsize>,
        ttl: Duration,
        fail: bool,
    }

    impl CountingSource {
        fn new(ttl: Duration) -> (Self, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            let source = Self {
                calls: Arc::clone(&calls),
                ttl,
                fail: false,
            };
            (source, calls)
        }
    }

    #[async_trait]
    impl TokenSource for CountingSource {
        async fn fetch_token(&self) -> Result<IssuedToken> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(Duration::from_millis(20)).await;
            if self.fail {
                return Err(AppError::UpstreamAuth("bad client secret".to_string()));
            }
            Ok(IssuedToken {
                access_token: format!("token-{n}"),
                expires_in: self.ttl,
            })
        }
    }

    #[tokio::test]
    async fn reuses_token_until_expiry() {
        let (source, calls) = CountingSource::new(Duration::from_secs(3600));
        let cache = TokenCache::new(source);

        assert_eq!(cache.get_valid_token().await.unwrap(), "token-1");
        assert_eq!(cache.get_valid_token().await.unwrap(), "token-1");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn token_inside_skew_window_is_refreshed() {
        let (source, calls) = CountingSource::new(Duration::from_secs(30));
        let cache = TokenCache::new(source).with_skew(Duration::from_secs(60));

        assert_eq!(cache.get_valid_token().await.unwrap(), "token-1");
        assert_eq!(cache.get_valid_token().await.unwrap(), "token-2");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn concurrent_misses_share_one_refresh() {
        let (source, calls) = CountingSource::new(Duration::from_secs(3600));
        let cache = Arc::new(TokenCache::new(source));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move { cache.get_valid_token().await })
            })
            .collect();
        for h in handles {
            assert_eq!(h.await.unwrap().unwrap(), "token-1");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalidate_forces_refetch() {
        let (source, calls) = CountingSource::new(Duration::from_secs(3600));
        let cache = TokenCache::new(source);

        cache.get_valid_token().await.unwrap();
        cache.invalidate().await;
        assert_eq!(cache.get_valid_token().await.unwrap(), "token-2");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn oversized_lifetime_is_clamped() {
        let (source, calls) = CountingSource::new(Duration::from_secs(u64::MAX));
        let cache = TokenCache::new(source);

        assert_eq!(cache.get_valid_token().await.unwrap(), "token-1");
        assert_eq!(cache.get_valid_token().await.unwrap(), "token-1");
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let expires_at = cache.slot.lock().await.as_ref().map(|t| t.expires_at).unwrap();
        assert!(expires_at <= Instant::now() + Duration::from_secs(MAX_TOKEN_TTL_SECS));
    }

    #[tokio::test]
    async fn failed_fetch_is_not_cached() {
        let (mut source, calls) = CountingSource::new(Duration::from_secs(3600));
        source.fail = true;
        let cache = TokenCache::new(source);

        assert!(matches!(cache.get_valid_token().await, Err(AppError::UpstreamAuth(_))));
        assert!(cache.get_valid_token().await.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
