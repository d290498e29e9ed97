use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use screener_core::{HistoryProvider, OhlcvSeries, ProviderCapabilities, ProviderError, Quote};

use crate::cache::CacheStore;

/// Decorator that layers the on-disk snapshot cache over one concrete
/// provider.
///
/// Caching sits inside fallback composition, not around it: each provider
/// persists snapshots under its own name and adjusted mode, so a series
/// served by an unadjusted fallback is never stored under the primary's
/// adjusted key.
pub struct CachedProvider {
    inner: Arc<dyn HistoryProvider>,
    store: Arc<CacheStore>,
    max_age_days: f64,
}

impl CachedProvider {
    pub fn new(
        inner: Arc<dyn HistoryProvider>,
        cache_dir: impl AsRef<Path>,
        max_age_days: f64,
    ) -> std::io::Result<Self> {
        let capabilities = inner.capabilities();
        let store = CacheStore::new(cache_dir, inner.name().to_string(), capabilities.adjusted)?;
        Ok(Self {
            inner,
            store: Arc::new(store),
            max_age_days,
        })
    }

    /// Shared handle to the underlying store, for hit/miss reporting.
    pub fn store(&self) -> Arc<CacheStore> {
        Arc::clone(&self.store)
    }
}

#[async_trait]
impl HistoryProvider for CachedProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            manages_own_cache: true,
            ..self.inner.capabilities()
        }
    }

    async fn get_history(&self, symbol: &str, days: u32) -> Result<OhlcvSeries, ProviderError> {
        self.store
            .get_or_fetch(symbol, days, self.max_age_days, || {
                self.inner.get_history(symbol, days)
            })
            .await
    }

    // Quotes are spot reads; they are never cached.
    async fn get_quote(&self, symbol: &str) -> Result<Quote, ProviderError> {
        self.inner.get_quote(symbol).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fallback::FallbackProvider;
    use crate::testing::{FailKind, MockProvider};

    #[tokio::test]
    async fn serves_from_disk_on_the_second_call() {
        let dir = tempfile::tempdir().unwrap();
        let inner = Arc::new(MockProvider::with_closes("mock", &[5.0, 6.0]).cacheable());
        let cached = CachedProvider::new(inner.clone(), dir.path(), 1.0).unwrap();

        cached.get_history("AAA", 5).await.unwrap();
        cached.get_history("AAA", 5).await.unwrap();
        assert_eq!(inner.history_calls(), 1);
        assert_eq!(cached.store().hits(), 1);
        assert_eq!(cached.store().misses(), 1);
    }

    #[tokio::test]
    async fn fallback_served_history_is_stored_under_the_fallback_key() {
        let dir = tempfile::tempdir().unwrap();
        let primary = Arc::new(
            MockProvider::failing("primary", FailKind::Access)
                .cacheable()
                .adjusted(),
        );
        let fallback = Arc::new(MockProvider::with_closes("fallback", &[7.0, 8.0]).cacheable());
        let chained = FallbackProvider::new(
            Arc::new(CachedProvider::new(primary.clone(), dir.path(), 1.0).unwrap()),
            vec![Arc::new(
                CachedProvider::new(fallback.clone(), dir.path(), 1.0).unwrap(),
            )],
        );

        let series = chained.get_history("AAA", 5).await.unwrap();
        assert_eq!(series.last_close(), Some(8.0));

        // The unadjusted fallback data lands under the fallback's own key;
        // nothing is ever written under the primary's adjusted key.
        assert!(!dir.path().join("primary_AAA_adj.json").exists());
        assert!(dir.path().join("fallback_AAA.json").exists());

        // A repeat read is served from the fallback's snapshot.
        chained.get_history("AAA", 5).await.unwrap();
        assert_eq!(fallback.history_calls(), 1);
        assert_eq!(primary.history_calls(), 2);
    }
}
