use std::sync::Arc;

use async_trait::async_trait;

use screener_core::{
    HistoryProvider, OhlcvSeries, ProviderCapabilities, ProviderError, Quote,
};

/// Primary provider plus an ordered fallback chain.
///
/// `get_history` consults fallbacks only when the primary reports an access
/// error (symbol missing, auth). Transport and limit errors propagate
/// untouched, so an outage is never masked as "data missing". When every
/// fallback also fails, the primary's access error is returned.
///
/// `get_quote` targets the primary only: quote staleness tolerance differs
/// from history staleness tolerance, so substitution does not apply. The
/// asymmetry is intentional.
pub struct FallbackProvider {
    primary: Arc<dyn HistoryProvider>,
    fallbacks: Vec<Arc<dyn HistoryProvider>>,
}

impl FallbackProvider {
    pub fn new(primary: Arc<dyn HistoryProvider>, fallbacks: Vec<Arc<dyn HistoryProvider>>) -> Self {
        Self { primary, fallbacks }
    }
}

#[async_trait]
impl HistoryProvider for FallbackProvider {
    fn name(&self) -> &str {
        self.primary.name()
    }

    fn capabilities(&self) -> ProviderCapabilities {
        self.primary.capabilities()
    }

    async fn get_history(&self, symbol: &str, days: u32) -> Result<OhlcvSeries, ProviderError> {
        let primary_err = match self.primary.get_history(symbol, days).await {
            Ok(series) => return Ok(series),
            Err(err) if err.is_fallback_eligible() => err,
            Err(err) => return Err(err),
        };

        for fallback in &self.fallbacks {
            match fallback.get_history(symbol, days).await {
                Ok(series) => {
                    tracing::info!(
                        "{}: history served by fallback provider '{}'",
                        symbol,
                        fallback.name()
                    );
                    return Ok(series);
                }
                Err(err) => {
                    tracing::warn!(
                        "{}: fallback provider '{}' failed: {}",
                        symbol,
                        fallback.name(),
                        err
                    );
                }
            }
        }
        Err(primary_err)
    }

    async fn get_quote(&self, symbol: &str) -> Result<Quote, ProviderError> {
        self.primary.get_quote(symbol).await
    }
}
