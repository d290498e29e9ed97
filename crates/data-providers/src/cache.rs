use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use screener_core::{OhlcvSeries, ProviderError};

/// One persisted snapshot: the series plus the metadata needed for the
/// freshness and coverage checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    symbol: String,
    provider: String,
    adjusted: bool,
    /// Lookback the snapshot was fetched with; 0 means full history.
    lookback_days: u32,
    fetched_at: DateTime<Utc>,
    series: OhlcvSeries,
}

/// On-disk per-symbol snapshot cache with read-through-fetch-write
/// semantics.
///
/// Snapshots are keyed by (provider name, symbol, adjusted-mode) under a
/// deterministic file name, so a cached unadjusted series is never
/// substituted for an adjusted request. Freshness is wall-clock based: a
/// snapshot older than `max_age_days` at read time is refetched. A fresh
/// snapshot must also cover the requested lookback, so a 5-day micro
/// snapshot is never served for a 250-day request.
///
/// No cross-process locking; concurrent runs against the same directory are
/// not guaranteed safe.
#[derive(Debug)]
pub struct CacheStore {
    dir: PathBuf,
    provider: String,
    adjusted: bool,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheStore {
    pub fn new(
        dir: impl AsRef<Path>,
        provider: impl Into<String>,
        adjusted: bool,
    ) -> std::io::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            provider: provider.into(),
            adjusted,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        })
    }

    fn snapshot_path(&self, symbol: &str) -> PathBuf {
        let mode = if self.adjusted { "_adj" } else { "" };
        // Symbols can contain '.', keep them; '/' cannot appear after
        // normalization.
        self.dir
            .join(format!("{}_{}{}.json", self.provider, symbol, mode))
    }

    /// Return a fresh covering snapshot, or invoke `fetch` exactly once,
    /// persist its result, and return it.
    pub async fn get_or_fetch<F, Fut>(
        &self,
        symbol: &str,
        days: u32,
        max_age_days: f64,
        fetch: F,
    ) -> Result<OhlcvSeries, ProviderError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<OhlcvSeries, ProviderError>>,
    {
        let path = self.snapshot_path(symbol);
        if let Some(entry) = self.read_entry(&path) {
            let age = Utc::now() - entry.fetched_at;
            let max_age_secs = (max_age_days * 86_400.0) as i64;
            let fresh = age.num_seconds() < max_age_secs;
            let covers = entry.lookback_days == 0 || (days != 0 && entry.lookback_days >= days);
            if fresh && covers {
                self.hits.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("cache hit for {} ({} bars)", symbol, entry.series.len());
                return Ok(entry.series);
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let series = fetch().await?;
        self.write_entry(&path, symbol, days, &series);
        Ok(series)
    }

    fn read_entry(&self, path: &Path) -> Option<CacheEntry> {
        if !path.exists() {
            return None;
        }
        let raw = std::fs::read_to_string(path).ok()?;
        match serde_json::from_str(&raw) {
            Ok(entry) => Some(entry),
            Err(e) => {
                // Corrupt snapshot: treat as a miss and overwrite.
                tracing::warn!("discarding unreadable cache snapshot {:?}: {}", path, e);
                None
            }
        }
    }

    fn write_entry(&self, path: &Path, symbol: &str, days: u32, series: &OhlcvSeries) {
        let entry = CacheEntry {
            symbol: symbol.to_string(),
            provider: self.provider.clone(),
            adjusted: self.adjusted,
            lookback_days: days,
            fetched_at: Utc::now(),
            series: series.clone(),
        };
        match serde_json::to_string(&entry) {
            Ok(json) => {
                if let Err(e) = std::fs::write(path, json) {
                    tracing::warn!("failed to persist cache snapshot {:?}: {}", path, e);
                }
            }
            Err(e) => tracing::warn!("failed to serialize cache snapshot for {}: {}", symbol, e),
        }
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use screener_core::Bar;
    use std::sync::atomic::AtomicU32;

    fn series(closes: &[f64]) -> OhlcvSeries {
        let bars = closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Bar {
                date: chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
                    + Duration::days(i as i64),
                open: close,
                high: close,
                low: close,
                close,
                volume: Some(1_000.0),
                adj_close: None,
            })
            .collect();
        OhlcvSeries::from_bars(bars)
    }

    /// Rewrite the stored fetched_at so freshness tests do not need to sleep.
    fn backdate(store: &CacheStore, symbol: &str, by_secs: i64) {
        let path = store.snapshot_path(symbol);
        let raw = std::fs::read_to_string(&path).unwrap();
        let mut entry: CacheEntry = serde_json::from_str(&raw).unwrap();
        entry.fetched_at = entry.fetched_at - Duration::seconds(by_secs);
        std::fs::write(&path, serde_json::to_string(&entry).unwrap()).unwrap();
    }

    async fn fetch_counted(
        store: &CacheStore,
        counter: &AtomicU32,
        days: u32,
        max_age_days: f64,
    ) -> OhlcvSeries {
        store
            .get_or_fetch("AAA", days, max_age_days, || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok(series(&[5.0, 6.0, 7.0])) }
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn fresh_snapshot_is_a_hit_and_skips_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path(), "yahoo", false).unwrap();
        let fetches = AtomicU32::new(0);

        fetch_counted(&store, &fetches, 30, 1.0).await;
        assert_eq!(store.misses(), 1);

        // Just inside the freshness window.
        backdate(&store, "AAA", 86_400 - 1);
        let out = fetch_counted(&store, &fetches, 30, 1.0).await;
        assert_eq!(out.len(), 3);
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
        assert_eq!(store.hits(), 1);
    }

    #[tokio::test]
    async fn stale_snapshot_is_a_miss_and_fetches_exactly_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path(), "yahoo", false).unwrap();
        let fetches = AtomicU32::new(0);

        fetch_counted(&store, &fetches, 30, 1.0).await;
        backdate(&store, "AAA", 86_400 + 1);
        fetch_counted(&store, &fetches, 30, 1.0).await;

        assert_eq!(fetches.load(Ordering::SeqCst), 2);
        assert_eq!(store.hits(), 0);
        assert_eq!(store.misses(), 2);
    }

    #[tokio::test]
    async fn short_lookback_snapshot_never_serves_a_longer_request() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path(), "yahoo", false).unwrap();
        let fetches = AtomicU32::new(0);

        fetch_counted(&store, &fetches, 5, 1.0).await;
        // Fresh, but only covers 5 days; a 90-day request must refetch.
        fetch_counted(&store, &fetches, 90, 1.0).await;
        assert_eq!(fetches.load(Ordering::SeqCst), 2);

        // A full-history snapshot covers any lookback.
        fetch_counted(&store, &fetches, 0, 1.0).await;
        fetch_counted(&store, &fetches, 90, 1.0).await;
        assert_eq!(fetches.load(Ordering::SeqCst), 3);
        assert_eq!(store.hits(), 1);
    }

    #[tokio::test]
    async fn fetch_error_propagates_and_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path(), "yahoo", false).unwrap();

        let result = store
            .get_or_fetch("AAA", 30, 1.0, || async {
                Err(ProviderError::Transport("down".to_string()))
            })
            .await;
        assert!(result.is_err());
        assert!(!store.snapshot_path("AAA").exists());
    }

    #[tokio::test]
    async fn adjusted_mode_is_part_of_the_key() {
        let dir = tempfile::tempdir().unwrap();
        let unadjusted = CacheStore::new(dir.path(), "yahoo", false).unwrap();
        let adjusted = CacheStore::new(dir.path(), "yahoo", true).unwrap();
        let fetches = AtomicU32::new(0);

        fetch_counted(&unadjusted, &fetches, 30, 1.0).await;
        // Same symbol, adjusted mode: must not reuse the unadjusted file.
        fetch_counted(&adjusted, &fetches, 30, 1.0).await;
        assert_eq!(fetches.load(Ordering::SeqCst), 2);
        assert_ne!(
            unadjusted.snapshot_path("AAA"),
            adjusted.snapshot_path("AAA")
        );
    }
}
