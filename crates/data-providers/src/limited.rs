use std::sync::Arc;

use async_trait::async_trait;

use screener_core::{
    HistoryProvider, OhlcvSeries, ProviderCapabilities, ProviderError, Quote,
};

use crate::budget::BudgetManager;

/// Decorator that charges one budget unit per call, before delegating.
///
/// Consume-then-delegate is the contract: a failed downstream call still
/// costs its unit, so a flapping symbol cannot burn unbounded requests.
pub struct LimitedProvider {
    inner: Arc<dyn HistoryProvider>,
    budget: BudgetManager,
}

impl LimitedProvider {
    pub fn new(inner: Arc<dyn HistoryProvider>, max_requests: u32) -> Self {
        let budget = BudgetManager::new(inner.name().to_string(), max_requests);
        Self { inner, budget }
    }

    pub fn budget(&self) -> &BudgetManager {
        &self.budget
    }
}

#[async_trait]
impl HistoryProvider for LimitedProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn capabilities(&self) -> ProviderCapabilities {
        self.inner.capabilities()
    }

    async fn get_history(&self, symbol: &str, days: u32) -> Result<OhlcvSeries, ProviderError> {
        self.budget.consume()?;
        self.inner.get_history(symbol, days).await
    }

    async fn get_quote(&self, symbol: &str) -> Result<Quote, ProviderError> {
        self.budget.consume()?;
        self.inner.get_quote(symbol).await
    }
}
