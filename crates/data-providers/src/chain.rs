use std::sync::Arc;

use screener_core::{ConfigError, DataConfig, HistoryProvider};

use crate::cache::CacheStore;
use crate::cached::CachedProvider;
use crate::fallback::FallbackProvider;
use crate::file_snapshot::FileSnapshotProvider;
use crate::http::{HttpHistoryProvider, HttpProviderKind};
use crate::limited::LimitedProvider;

/// The wired provider stack plus handles to its snapshot stores, kept for
/// hit/miss reporting in the run summary.
pub struct ProviderChain {
    pub provider: Arc<dyn HistoryProvider>,
    pub caches: Vec<Arc<CacheStore>>,
}

impl ProviderChain {
    /// Chain with no snapshot caching, for providers that manage their own.
    pub fn direct(provider: Arc<dyn HistoryProvider>) -> Self {
        Self {
            provider,
            caches: Vec::new(),
        }
    }

    pub fn cache_hits(&self) -> u64 {
        self.caches.iter().map(|c| c.hits()).sum()
    }

    pub fn cache_misses(&self) -> u64 {
        self.caches.iter().map(|c| c.misses()).sum()
    }
}

fn http_provider(
    kind: HttpProviderKind,
    config: &DataConfig,
) -> Result<Arc<dyn HistoryProvider>, ConfigError> {
    let provider = HttpHistoryProvider::new(kind, &config.throttling)
        .map_err(|e| ConfigError::Invalid(format!("failed to build HTTP client: {e}")))?;
    Ok(Arc::new(provider))
}

fn base_provider(name: &str, config: &DataConfig) -> Result<Arc<dyn HistoryProvider>, ConfigError> {
    match name {
        "yahoo" => http_provider(HttpProviderKind::YahooChart, config),
        "stooq" => http_provider(HttpProviderKind::StooqDaily, config),
        "file" => {
            let dir = config.snapshot_dir.as_ref().ok_or_else(|| {
                ConfigError::Invalid("data.snapshot_dir is required for the file provider".into())
            })?;
            Ok(Arc::new(FileSnapshotProvider::new(dir, false)))
        }
        other => Err(ConfigError::Invalid(format!(
            "unknown provider '{other}' (expected yahoo, stooq, or file)"
        ))),
    }
}

/// Build the configured provider stack: each named provider wrapped with its
/// per-run budget and, unless it manages its own freshness, its own snapshot
/// cache; then the primary composed with the ordered fallbacks.
///
/// The cache sits per provider inside the fallback composition, so
/// fallback-served data is persisted under the provider that actually served
/// it, with that provider's adjusted mode.
pub fn build_provider(config: &DataConfig) -> Result<ProviderChain, ConfigError> {
    let mut caches: Vec<Arc<CacheStore>> = Vec::new();
    let mut wired = |name: &str| -> Result<Arc<dyn HistoryProvider>, ConfigError> {
        let base = base_provider(name, config)?;
        let max_requests = config.budget.max_requests_for(name);
        let limited: Arc<dyn HistoryProvider> = Arc::new(LimitedProvider::new(base, max_requests));
        if limited.capabilities().manages_own_cache {
            return Ok(limited);
        }
        let cached = CachedProvider::new(limited, &config.cache_dir, config.max_cache_age_days)
            .map_err(|source| ConfigError::Io {
                path: config.cache_dir.display().to_string(),
                source,
            })?;
        caches.push(cached.store());
        Ok(Arc::new(cached))
    };

    let primary = wired(&config.provider)?;
    let provider: Arc<dyn HistoryProvider> = if config.fallback_chain.is_empty() {
        primary
    } else {
        let mut fallbacks = Vec::with_capacity(config.fallback_chain.len());
        for name in &config.fallback_chain {
            if name == &config.provider {
                return Err(ConfigError::Invalid(format!(
                    "fallback chain repeats the primary provider '{name}'"
                )));
            }
            fallbacks.push(wired(name)?);
        }
        Arc::new(FallbackProvider::new(primary, fallbacks))
    };
    Ok(ProviderChain { provider, caches })
}
