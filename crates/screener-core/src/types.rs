use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Daily OHLCV bar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub volume: Option<f64>,
    #[serde(default)]
    pub adj_close: Option<f64>,
}

/// Ordered daily price history for one symbol.
///
/// Invariant: strictly increasing dates, close > 0, deduplicated by date
/// keeping the last occurrence. `from_bars` enforces this on construction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OhlcvSeries {
    bars: Vec<Bar>,
}

impl OhlcvSeries {
    /// Normalize raw bars into a valid series: sort ascending by date, keep
    /// the last bar for each duplicated date, drop non-positive closes.
    pub fn from_bars(mut bars: Vec<Bar>) -> Self {
        bars.retain(|b| b.close > 0.0 && b.close.is_finite());
        bars.sort_by_key(|b| b.date);
        let mut deduped: Vec<Bar> = Vec::with_capacity(bars.len());
        for bar in bars {
            match deduped.last_mut() {
                Some(last) if last.date == bar.date => *last = bar,
                _ => deduped.push(bar),
            }
        }
        Self { bars: deduped }
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn last_close(&self) -> Option<f64> {
        self.bars.last().map(|b| b.close)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.bars.last().map(|b| b.date)
    }

    /// The trailing `n` bars as a new series; the whole series if `n == 0`
    /// or the history is shorter than `n`.
    pub fn tail(&self, n: usize) -> Self {
        if n == 0 || self.bars.len() <= n {
            return self.clone();
        }
        Self {
            bars: self.bars[self.bars.len() - n..].to_vec(),
        }
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }
}

/// Spot quote. Quotes are served by the primary provider only; fallback
/// substitution does not apply to them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub price: f64,
    pub timestamp: DateTime<Utc>,
}

/// Uppercase a raw ticker and strip whitespace. No exchange suffixes.
pub fn normalize_symbol(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

/// Per-symbol data classification at a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataStatus {
    Ok,
    InsufficientHistory,
    DataUnavailable,
}

impl DataStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataStatus::Ok => "OK",
            DataStatus::InsufficientHistory => "INSUFFICIENT_HISTORY",
            DataStatus::DataUnavailable => "DATA_UNAVAILABLE",
        }
    }
}

/// Reason codes carried on gate decisions and ineligible rows. These are
/// data for user-facing reporting, not exceptions.
pub mod reason {
    pub const NO_HISTORY: &str = "NO_HISTORY";
    pub const INSUFFICIENT_HISTORY: &str = "INSUFFICIENT_HISTORY";
    pub const PRICE_BELOW_MIN: &str = "PRICE_BELOW_MIN";
    pub const PRICE_ABOVE_MAX: &str = "PRICE_ABOVE_MAX";
    pub const PROVIDER_ERROR: &str = "PROVIDER_ERROR";
}

/// Outcome of gate evaluation. `reasons` is empty if and only if `passed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateDecision {
    pub passed: bool,
    pub reasons: Vec<String>,
}

impl GateDecision {
    pub fn pass() -> Self {
        Self {
            passed: true,
            reasons: Vec::new(),
        }
    }

    pub fn fail(reasons: Vec<String>) -> Self {
        debug_assert!(!reasons.is_empty());
        Self {
            passed: false,
            reasons,
        }
    }
}

/// Serialize non-finite f64 as JSON null so "missing" is never confused
/// with "zero" downstream; null deserializes back to NaN.
pub mod nan_as_null {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &f64, s: S) -> Result<S::Ok, S::Error> {
        if v.is_finite() {
            s.serialize_some(v)
        } else {
            s.serialize_none()
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(d)?.unwrap_or(f64::NAN))
    }
}

/// Fixed feature schema computed per symbol per run. NaN marks a feature the
/// history could not support; it is never persisted as a number (see
/// [`nan_as_null`]) and must never satisfy a numeric gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureVector {
    pub symbol: String,
    pub as_of: NaiveDate,
    pub history_days: usize,
    #[serde(with = "nan_as_null")]
    pub last_close: f64,
    #[serde(with = "nan_as_null")]
    pub ret_21d: f64,
    #[serde(with = "nan_as_null")]
    pub ret_63d: f64,
    #[serde(with = "nan_as_null")]
    pub ret_126d: f64,
    #[serde(with = "nan_as_null")]
    pub ret_252d: f64,
    #[serde(with = "nan_as_null")]
    pub close_to_sma20: f64,
    #[serde(with = "nan_as_null")]
    pub close_to_sma50: f64,
    #[serde(with = "nan_as_null")]
    pub close_to_sma200: f64,
    #[serde(with = "nan_as_null")]
    pub vol_20d: f64,
    #[serde(with = "nan_as_null")]
    pub vol_60d: f64,
    #[serde(with = "nan_as_null")]
    pub downside_vol: f64,
    #[serde(with = "nan_as_null")]
    pub worst_5d_126d: f64,
    #[serde(with = "nan_as_null")]
    pub max_drawdown_126d: f64,
    #[serde(with = "nan_as_null")]
    pub adv20: f64,
    #[serde(with = "nan_as_null")]
    pub zero_volume_frac_60d: f64,
}

impl FeatureVector {
    fn numeric_fields(&self) -> [f64; 15] {
        [
            self.last_close,
            self.ret_21d,
            self.ret_63d,
            self.ret_126d,
            self.ret_252d,
            self.close_to_sma20,
            self.close_to_sma50,
            self.close_to_sma200,
            self.vol_20d,
            self.vol_60d,
            self.downside_vol,
            self.worst_5d_126d,
            self.max_drawdown_126d,
            self.adv20,
            self.zero_volume_frac_60d,
        ]
    }

    /// Fraction of the feature schema that is populated (finite).
    pub fn data_completeness(&self) -> f64 {
        let fields = self.numeric_fields();
        let finite = fields.iter().filter(|v| v.is_finite()).count();
        finite as f64 / fields.len() as f64
    }

    /// Whether any dollar-volume signal is available.
    pub fn has_volume(&self) -> bool {
        self.adv20.is_finite()
    }
}

/// Named sub-scores, weighted raw score, and the run-scoped decile.
///
/// The decile is cross-sectional over the current run's eligible set, so the
/// same features can earn a different decile in a different run. That is by
/// contract, not a defect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreComponents {
    pub symbol: String,
    #[serde(with = "nan_as_null")]
    pub trend: f64,
    #[serde(with = "nan_as_null")]
    pub momentum: f64,
    #[serde(with = "nan_as_null")]
    pub liquidity: f64,
    #[serde(with = "nan_as_null")]
    pub quality: f64,
    #[serde(with = "nan_as_null")]
    pub volatility_penalty: f64,
    #[serde(with = "nan_as_null")]
    pub drawdown_penalty: f64,
    #[serde(with = "nan_as_null")]
    pub tail_penalty: f64,
    #[serde(with = "nan_as_null")]
    pub attention: f64,
    #[serde(with = "nan_as_null")]
    pub theme_bonus: f64,
    #[serde(with = "nan_as_null")]
    pub volume_missing_penalty: f64,
    #[serde(with = "nan_as_null")]
    pub raw_score: f64,
    /// Always in 1..=10.
    pub decile: u8,
}

/// Per-symbol diagnostic emitted by every stage for every processed symbol.
/// A processed symbol with no record is a defect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageRecord {
    pub symbol: String,
    pub stage: u8,
    pub lookback_days: u32,
    pub row_count: usize,
    pub history_days: usize,
    pub status: DataStatus,
}

/// Per-stage counts consumed by reporting and run-manifest generation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    pub universe: usize,
    pub stage1: usize,
    pub stage2: usize,
    pub stage3: usize,
    pub cache_hits: u64,
    pub cache_misses: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn bar(date: &str, close: f64) -> Bar {
        Bar {
            date: date.parse().unwrap(),
            open: close,
            high: close,
            low: close,
            close,
            volume: Some(1000.0),
            adj_close: None,
        }
    }

    #[test]
    fn normalization_sorts_and_dedups_keeping_last() {
        let series = OhlcvSeries::from_bars(vec![
            bar("2024-01-03", 12.0),
            bar("2024-01-02", 11.0),
            bar("2024-01-03", 13.0),
            bar("2024-01-01", 10.0),
        ]);
        assert_eq!(series.len(), 3);
        assert_eq!(series.last_close(), Some(13.0));
        assert_eq!(
            series.bars()[0].date,
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
        );
    }

    #[test]
    fn normalization_drops_non_positive_closes() {
        let series = OhlcvSeries::from_bars(vec![
            bar("2024-01-01", 0.0),
            bar("2024-01-02", -5.0),
            bar("2024-01-03", 7.5),
        ]);
        assert_eq!(series.len(), 1);
        assert_eq!(series.last_close(), Some(7.5));
    }

    #[test]
    fn tail_returns_whole_series_for_zero_or_oversized_n() {
        let series = OhlcvSeries::from_bars(vec![bar("2024-01-01", 1.0), bar("2024-01-02", 2.0)]);
        assert_eq!(series.tail(0).len(), 2);
        assert_eq!(series.tail(10).len(), 2);
        assert_eq!(series.tail(1).len(), 1);
        assert_eq!(series.tail(1).last_close(), Some(2.0));
    }

    #[test]
    fn symbol_normalization_uppercases_and_trims() {
        assert_eq!(normalize_symbol(" aapl "), "AAPL");
        assert_eq!(normalize_symbol("BRK.B"), "BRK.B");
    }

    #[test]
    fn nan_features_serialize_as_null() {
        let fv = FeatureVector {
            symbol: "AAA".to_string(),
            as_of: NaiveDate::from_ymd_opt(2024, 6, 3).unwrap(),
            history_days: 5,
            last_close: 10.0,
            ret_21d: f64::NAN,
            ret_63d: f64::NAN,
            ret_126d: f64::NAN,
            ret_252d: f64::NAN,
            close_to_sma20: f64::NAN,
            close_to_sma50: f64::NAN,
            close_to_sma200: f64::NAN,
            vol_20d: f64::NAN,
            vol_60d: f64::NAN,
            downside_vol: f64::NAN,
            worst_5d_126d: f64::NAN,
            max_drawdown_126d: f64::NAN,
            adv20: f64::NAN,
            zero_volume_frac_60d: 0.0,
        };
        let json = serde_json::to_value(&fv).unwrap();
        assert_eq!(json["last_close"], 10.0);
        assert!(json["ret_21d"].is_null());

        let back: FeatureVector = serde_json::from_value(json).unwrap();
        assert!(back.ret_21d.is_nan());
        assert_eq!(back.last_close, 10.0);
    }

    #[test]
    fn data_completeness_counts_finite_fields() {
        let fv = FeatureVector {
            symbol: "AAA".to_string(),
            as_of: NaiveDate::from_ymd_opt(2024, 6, 3).unwrap(),
            history_days: 5,
            last_close: 10.0,
            ret_21d: 0.1,
            ret_63d: 0.2,
            ret_126d: f64::NAN,
            ret_252d: f64::NAN,
            close_to_sma20: 1.0,
            close_to_sma50: f64::NAN,
            close_to_sma200: f64::NAN,
            vol_20d: 0.3,
            vol_60d: f64::NAN,
            downside_vol: f64::NAN,
            worst_5d_126d: f64::NAN,
            max_drawdown_126d: f64::NAN,
            adv20: f64::NAN,
            zero_volume_frac_60d: 0.0,
        };
        assert!((fv.data_completeness() - 6.0 / 15.0).abs() < 1e-12);
        assert!(!fv.has_volume());
    }
}
