//! In-memory provider doubles for funnel and decorator tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};

use screener_core::{
    Bar, HistoryProvider, OhlcvSeries, ProviderCapabilities, ProviderError, Quote,
};

/// How a [`MockProvider`] fails when configured to fail.
#[derive(Debug, Clone, Copy)]
pub enum FailKind {
    Access,
    Transport,
    Limit,
}

/// Scripted in-memory provider that counts its calls.
pub struct MockProvider {
    name: String,
    manages_own_cache: bool,
    adjusted: bool,
    /// Closes per symbol; an unknown symbol is an access error.
    symbols: HashMap<String, Vec<f64>>,
    fail_with: Option<FailKind>,
    fail_symbols: HashMap<String, FailKind>,
    history_calls: AtomicU32,
    quote_calls: AtomicU32,
    per_symbol: Mutex<HashMap<String, u32>>,
}

impl MockProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            manages_own_cache: true,
            adjusted: false,
            symbols: HashMap::new(),
            fail_with: None,
            fail_symbols: HashMap::new(),
            history_calls: AtomicU32::new(0),
            quote_calls: AtomicU32::new(0),
            per_symbol: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_symbol(mut self, symbol: &str, closes: &[f64]) -> Self {
        self.symbols.insert(symbol.to_string(), closes.to_vec());
        self
    }

    /// Provider that serves the same closes for every symbol.
    pub fn with_closes(name: impl Into<String>, closes: &[f64]) -> Self {
        Self::new(name).with_symbol("*", closes)
    }

    pub fn failing(name: impl Into<String>, kind: FailKind) -> Self {
        let mut mock = Self::new(name);
        mock.fail_with = Some(kind);
        mock
    }

    /// Fail only for one symbol; everything else is served normally.
    pub fn with_failing_symbol(mut self, symbol: &str, kind: FailKind) -> Self {
        self.fail_symbols.insert(symbol.to_string(), kind);
        self
    }

    /// Opt in to the snapshot cache layer.
    pub fn cacheable(mut self) -> Self {
        self.manages_own_cache = false;
        self
    }

    /// Declare the served histories split/dividend adjusted.
    pub fn adjusted(mut self) -> Self {
        self.adjusted = true;
        self
    }

    pub fn history_calls(&self) -> u32 {
        self.history_calls.load(Ordering::SeqCst)
    }

    pub fn quote_calls(&self) -> u32 {
        self.quote_calls.load(Ordering::SeqCst)
    }

    pub fn calls_for(&self, symbol: &str) -> u32 {
        self.per_symbol
            .lock()
            .unwrap()
            .get(symbol)
            .copied()
            .unwrap_or(0)
    }

    fn fail(&self, symbol: &str, kind: FailKind) -> ProviderError {
        match kind {
            FailKind::Access => ProviderError::access(symbol, "scripted access failure"),
            FailKind::Transport => ProviderError::Transport("scripted transport failure".into()),
            FailKind::Limit => ProviderError::LimitExceeded {
                provider: self.name.clone(),
                detail: "scripted limit".into(),
            },
        }
    }

    fn series_for(&self, symbol: &str) -> Option<OhlcvSeries> {
        let closes = self
            .symbols
            .get(symbol)
            .or_else(|| self.symbols.get("*"))?;
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let bars = closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Bar {
                date: start + Duration::days(i as i64),
                open: close,
                high: close,
                low: close,
                close,
                volume: Some(1_000_000.0),
                adj_close: None,
            })
            .collect();
        Some(OhlcvSeries::from_bars(bars))
    }
}

#[async_trait]
impl HistoryProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            manages_own_cache: self.manages_own_cache,
            supports_quotes: true,
            adjusted: self.adjusted,
        }
    }

    async fn get_history(&self, symbol: &str, days: u32) -> Result<OhlcvSeries, ProviderError> {
        self.history_calls.fetch_add(1, Ordering::SeqCst);
        *self
            .per_symbol
            .lock()
            .unwrap()
            .entry(symbol.to_string())
            .or_insert(0) += 1;
        if let Some(kind) = self.fail_with.or_else(|| self.fail_symbols.get(symbol).copied()) {
            return Err(self.fail(symbol, kind));
        }
        match self.series_for(symbol) {
            Some(series) => Ok(series.tail(days as usize)),
            None => Err(ProviderError::access(symbol, "unknown symbol")),
        }
    }

    async fn get_quote(&self, symbol: &str) -> Result<Quote, ProviderError> {
        self.quote_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(kind) = self.fail_with {
            return Err(self.fail(symbol, kind));
        }
        let price = self
            .series_for(symbol)
            .and_then(|s| s.last_close())
            .ok_or_else(|| ProviderError::access(symbol, "unknown symbol"))?;
        Ok(Quote {
            symbol: symbol.to_string(),
            price,
            timestamp: Utc::now(),
        })
    }
}
