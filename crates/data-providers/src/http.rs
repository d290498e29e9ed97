use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use screener_core::{
    Bar, HistoryProvider, OhlcvSeries, ProviderCapabilities, ProviderError, Quote,
    ThrottlingConfig,
};

use crate::retry::{with_backoff, BackoffPolicy};

const YAHOO_CHART_URL: &str = "https://query2.finance.yahoo.com/v8/finance/chart";
const STOOQ_DAILY_URL: &str = "https://stooq.com/q/d/l/";

/// Remote API kind. Each kind has its own URL scheme and payload format;
/// everything else (retry, budget, fallback, cache) is shared composition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpProviderKind {
    /// Yahoo chart JSON endpoint. Adjusted closes, quote-capable.
    YahooChart,
    /// Stooq daily CSV endpoint. Unadjusted, history only.
    StooqDaily,
}

impl HttpProviderKind {
    pub fn name(&self) -> &'static str {
        match self {
            HttpProviderKind::YahooChart => "yahoo",
            HttpProviderKind::StooqDaily => "stooq",
        }
    }
}

/// HTTP-backed history provider with bounded-retry transport.
#[derive(Debug, Clone)]
pub struct HttpHistoryProvider {
    kind: HttpProviderKind,
    client: Client,
    backoff: BackoffPolicy,
}

impl HttpHistoryProvider {
    pub fn new(kind: HttpProviderKind, throttling: &ThrottlingConfig) -> reqwest::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("folioscope-screener/0.1")
            .build()?;
        Ok(Self {
            kind,
            client,
            backoff: BackoffPolicy::from_config(throttling),
        })
    }

    async fn fetch_text(&self, symbol: &str, url: &str) -> Result<String, ProviderError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            return response
                .text()
                .await
                .map_err(|e| ProviderError::Transport(e.to_string()));
        }
        if status == StatusCode::NOT_FOUND
            || status == StatusCode::UNAUTHORIZED
            || status == StatusCode::FORBIDDEN
        {
            return Err(ProviderError::access(
                symbol,
                format!("{} returned HTTP {}", self.name(), status),
            ));
        }
        // 429 and 5xx are transient from the transport layer's point of
        // view; the retry wrapper bounds how long we keep trying.
        Err(ProviderError::Transport(format!(
            "{} returned HTTP {}",
            self.name(),
            status
        )))
    }

    async fn fetch_yahoo_history(
        &self,
        symbol: &str,
        days: u32,
    ) -> Result<OhlcvSeries, ProviderError> {
        let url = format!(
            "{}/{}?range={}&interval=1d&events=div%2Csplit",
            YAHOO_CHART_URL,
            symbol,
            yahoo_range_param(days)
        );
        let body = with_backoff(&self.backoff, || self.fetch_text(symbol, &url)).await?;
        let series = parse_yahoo_chart(symbol, &body)?;
        Ok(series.tail(days as usize))
    }

    async fn fetch_stooq_history(
        &self,
        symbol: &str,
        days: u32,
    ) -> Result<OhlcvSeries, ProviderError> {
        // Stooq lists US tickers with a ".us" suffix, lowercase.
        let url = format!(
            "{}?s={}.us&i=d",
            STOOQ_DAILY_URL,
            symbol.to_ascii_lowercase()
        );
        let body = with_backoff(&self.backoff, || self.fetch_text(symbol, &url)).await?;
        let series = parse_stooq_daily(symbol, &body)?;
        Ok(series.tail(days as usize))
    }
}

#[async_trait]
impl HistoryProvider for HttpHistoryProvider {
    fn name(&self) -> &str {
        self.kind.name()
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            manages_own_cache: false,
            supports_quotes: self.kind == HttpProviderKind::YahooChart,
            adjusted: self.kind == HttpProviderKind::YahooChart,
        }
    }

    async fn get_history(&self, symbol: &str, days: u32) -> Result<OhlcvSeries, ProviderError> {
        match self.kind {
            HttpProviderKind::YahooChart => self.fetch_yahoo_history(symbol, days).await,
            HttpProviderKind::StooqDaily => self.fetch_stooq_history(symbol, days).await,
        }
    }

    async fn get_quote(&self, symbol: &str) -> Result<Quote, ProviderError> {
        if self.kind != HttpProviderKind::YahooChart {
            return Err(ProviderError::access(
                symbol,
                format!("provider '{}' does not serve quotes", self.name()),
            ));
        }
        let url = format!("{}/{}?range=1d&interval=1d", YAHOO_CHART_URL, symbol);
        let body = with_backoff(&self.backoff, || self.fetch_text(symbol, &url)).await?;
        parse_yahoo_quote(symbol, &body)
    }
}

/// Smallest Yahoo range parameter that covers `days` trading days, with
/// slack for weekends and holidays.
fn yahoo_range_param(days: u32) -> &'static str {
    if days == 0 {
        return "max";
    }
    // ~5 trading days per 7 calendar days
    let calendar_days = days.saturating_mul(7).div_ceil(5) + 10;
    match calendar_days {
        0..=5 => "5d",
        6..=30 => "1mo",
        31..=90 => "3mo",
        91..=186 => "6mo",
        187..=365 => "1y",
        366..=730 => "2y",
        731..=1825 => "5y",
        1826..=3650 => "10y",
        _ => "max",
    }
}

#[derive(Debug, Deserialize)]
struct YahooChartResponse {
    chart: YahooChart,
}

#[derive(Debug, Deserialize)]
struct YahooChart {
    result: Option<Vec<YahooChartResult>>,
    error: Option<YahooChartError>,
}

#[derive(Debug, Deserialize)]
struct YahooChartError {
    code: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct YahooChartResult {
    meta: YahooMeta,
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: YahooIndicators,
}

#[derive(Debug, Deserialize)]
struct YahooMeta {
    #[serde(rename = "regularMarketPrice")]
    regular_market_price: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct YahooIndicators {
    quote: Vec<YahooQuoteBlock>,
    #[serde(default)]
    adjclose: Vec<YahooAdjCloseBlock>,
}

#[derive(Debug, Default, Deserialize)]
struct YahooQuoteBlock {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct YahooAdjCloseBlock {
    #[serde(default)]
    adjclose: Vec<Option<f64>>,
}

fn parse_yahoo_result(symbol: &str, body: &str) -> Result<YahooChartResult, ProviderError> {
    let response: YahooChartResponse =
        serde_json::from_str(body).map_err(|e| ProviderError::Parse(e.to_string()))?;
    if let Some(err) = response.chart.error {
        return Err(ProviderError::access(
            symbol,
            format!(
                "{}: {}",
                err.code.unwrap_or_default(),
                err.description.unwrap_or_default()
            ),
        ));
    }
    response
        .chart
        .result
        .and_then(|mut r| (!r.is_empty()).then(|| r.remove(0)))
        .ok_or_else(|| ProviderError::access(symbol, "empty chart result"))
}

fn parse_yahoo_chart(symbol: &str, body: &str) -> Result<OhlcvSeries, ProviderError> {
    let result = parse_yahoo_result(symbol, body)?;
    let quote = result
        .indicators
        .quote
        .into_iter()
        .next()
        .unwrap_or_default();
    let adjclose = result.indicators.adjclose.into_iter().next();

    let mut bars = Vec::with_capacity(result.timestamp.len());
    for (i, ts) in result.timestamp.iter().enumerate() {
        let close = match quote.close.get(i).copied().flatten() {
            Some(c) => c,
            None => continue, // half-session placeholder rows carry nulls
        };
        let date = match DateTime::<Utc>::from_timestamp(*ts, 0) {
            Some(dt) => dt.date_naive(),
            None => continue,
        };
        bars.push(Bar {
            date,
            open: quote.open.get(i).copied().flatten().unwrap_or(close),
            high: quote.high.get(i).copied().flatten().unwrap_or(close),
            low: quote.low.get(i).copied().flatten().unwrap_or(close),
            close,
            volume: quote.volume.get(i).copied().flatten(),
            adj_close: adjclose
                .as_ref()
                .and_then(|a| a.adjclose.get(i).copied().flatten()),
        });
    }
    if bars.is_empty() {
        return Err(ProviderError::access(symbol, "no bars in chart response"));
    }
    Ok(OhlcvSeries::from_bars(bars))
}

fn parse_yahoo_quote(symbol: &str, body: &str) -> Result<Quote, ProviderError> {
    let result = parse_yahoo_result(symbol, body)?;
    let price = result
        .meta
        .regular_market_price
        .ok_or_else(|| ProviderError::access(symbol, "no regular market price"))?;
    Ok(Quote {
        symbol: symbol.to_string(),
        price,
        timestamp: Utc::now(),
    })
}

#[derive(Debug, Deserialize)]
struct StooqRow {
    #[serde(rename = "Date")]
    date: NaiveDate,
    #[serde(rename = "Open")]
    open: f64,
    #[serde(rename = "High")]
    high: f64,
    #[serde(rename = "Low")]
    low: f64,
    #[serde(rename = "Close")]
    close: f64,
    #[serde(rename = "Volume", default)]
    volume: Option<f64>,
}

fn parse_stooq_daily(symbol: &str, body: &str) -> Result<OhlcvSeries, ProviderError> {
    let trimmed = body.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("no data") {
        return Err(ProviderError::access(symbol, "stooq has no data"));
    }
    let mut reader = csv::Reader::from_reader(trimmed.as_bytes());
    let mut bars = Vec::new();
    for row in reader.deserialize::<StooqRow>() {
        let row = row.map_err(|e| ProviderError::Parse(e.to_string()))?;
        bars.push(Bar {
            date: row.date,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume,
            adj_close: None,
        });
    }
    if bars.is_empty() {
        return Err(ProviderError::access(symbol, "stooq returned no rows"));
    }
    Ok(OhlcvSeries::from_bars(bars))
}
