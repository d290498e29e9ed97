use async_trait::async_trait;

use crate::{OhlcvSeries, ProviderError, Quote};

/// Static capability flags, checked once at wiring time instead of probing
/// for optional behavior at call sites.
#[derive(Debug, Clone, Copy)]
pub struct ProviderCapabilities {
    /// The provider handles its own freshness; the chain wiring must not
    /// layer the snapshot cache on top of it.
    pub manages_own_cache: bool,
    /// `get_quote` is implemented.
    pub supports_quotes: bool,
    /// Histories are split/dividend adjusted. Part of the cache key: an
    /// unadjusted series is never substituted for an adjusted request.
    pub adjusted: bool,
}

/// A source of daily price history, with an optional spot-quote capability.
///
/// Decorators ([`LimitedProvider`], [`FallbackProvider`] in the
/// data-providers crate) implement this same trait, so composition is
/// invisible to the funnel.
#[async_trait]
pub trait HistoryProvider: Send + Sync {
    /// Stable name used for cache keys, budgets, and logging.
    fn name(&self) -> &str;

    fn capabilities(&self) -> ProviderCapabilities;

    /// Daily bars for `symbol`. `days == 0` means all available history.
    async fn get_history(&self, symbol: &str, days: u32) -> Result<OhlcvSeries, ProviderError>;

    /// Spot quote. Optional capability; the default refuses.
    async fn get_quote(&self, symbol: &str) -> Result<Quote, ProviderError> {
        Err(ProviderError::access(
            symbol,
            format!("provider '{}' does not serve quotes", self.name()),
        ))
    }
}
