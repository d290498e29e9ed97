use chrono::NaiveDate;

use screener_core::{FeatureVector, OhlcvSeries};

const TRADING_DAYS_PER_YEAR: f64 = 252.0;
/// ~6 months of trading days, the window for tail/drawdown features.
const HALF_YEAR_DAYS: usize = 126;

/// Compute the fixed feature schema for one symbol.
///
/// Pure over a normalized series. Every ratio is NaN when the history
/// cannot support it; nothing here panics or errors on short input.
pub fn compute_features(symbol: &str, series: &OhlcvSeries, as_of: NaiveDate) -> FeatureVector {
    let closes = series.closes();

    FeatureVector {
        symbol: symbol.to_string(),
        as_of,
        history_days: closes.len(),
        last_close: closes.last().copied().unwrap_or(f64::NAN),
        ret_21d: simple_return(&closes, 21),
        ret_63d: simple_return(&closes, 63),
        ret_126d: simple_return(&closes, 126),
        ret_252d: simple_return(&closes, 252),
        close_to_sma20: close_to_sma(&closes, 20),
        close_to_sma50: close_to_sma(&closes, 50),
        close_to_sma200: close_to_sma(&closes, 200),
        vol_20d: annualized_vol(&closes, 20),
        vol_60d: annualized_vol(&closes, 60),
        downside_vol: downside_vol(&closes, HALF_YEAR_DAYS),
        worst_5d_126d: worst_rolling_return(&closes, 5, HALF_YEAR_DAYS),
        max_drawdown_126d: max_drawdown(&closes, HALF_YEAR_DAYS),
        adv20: average_dollar_volume(series, 20),
        zero_volume_frac_60d: zero_volume_fraction(series, 60),
    }
}

/// N-day simple return: close[-1] / close[-1-N] - 1.
pub fn simple_return(closes: &[f64], n: usize) -> f64 {
    if closes.len() <= n {
        return f64::NAN;
    }
    let last = closes[closes.len() - 1];
    let base = closes[closes.len() - 1 - n];
    last / base - 1.0
}

/// Simple moving average of the trailing `period` closes.
pub fn sma(closes: &[f64], period: usize) -> f64 {
    if period == 0 || closes.len() < period {
        return f64::NAN;
    }
    let window = &closes[closes.len() - period..];
    window.iter().sum::<f64>() / period as f64
}

fn close_to_sma(closes: &[f64], period: usize) -> f64 {
    match closes.last() {
        Some(&last) => last / sma(closes, period),
        None => f64::NAN,
    }
}

fn log_returns(closes: &[f64]) -> Vec<f64> {
    closes
        .windows(2)
        .map(|pair| (pair[1] / pair[0]).ln())
        .collect()
}

/// Sample standard deviation (n-1 denominator); NaN below 2 observations.
fn sample_std(xs: &[f64]) -> f64 {
    if xs.len() < 2 {
        return f64::NAN;
    }
    let mean = xs.iter().sum::<f64>() / xs.len() as f64;
    let var = xs.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (xs.len() - 1) as f64;
    var.sqrt()
}

/// Annualized realized volatility: sample std of the trailing `window` log
/// returns, times sqrt(252). Needs at least `window + 1` closes.
pub fn annualized_vol(closes: &[f64], window: usize) -> f64 {
    let returns = log_returns(closes);
    if returns.len() < window {
        return f64::NAN;
    }
    let tail = &returns[returns.len() - window..];
    sample_std(tail) * TRADING_DAYS_PER_YEAR.sqrt()
}

/// Annualized std of the negative log returns within the trailing `span`
/// bars. NaN when fewer than 20 return observations exist at all; 0.0 when
/// fewer than 2 of them are negative.
pub fn downside_vol(closes: &[f64], span: usize) -> f64 {
    let windowed = tail_slice(closes, span + 1);
    let returns = log_returns(windowed);
    if returns.len() < 20 {
        return f64::NAN;
    }
    let negatives: Vec<f64> = returns.iter().copied().filter(|r| *r < 0.0).collect();
    if negatives.len() < 2 {
        return 0.0;
    }
    sample_std(&negatives) * TRADING_DAYS_PER_YEAR.sqrt()
}

/// Worst `window`-day rolling simple return over the trailing `span` bars.
pub fn worst_rolling_return(closes: &[f64], window: usize, span: usize) -> f64 {
    let windowed = tail_slice(closes, span + 1);
    if windowed.len() <= window {
        return f64::NAN;
    }
    let mut worst = f64::INFINITY;
    for i in window..windowed.len() {
        let ret = windowed[i] / windowed[i - window] - 1.0;
        if ret < worst {
            worst = ret;
        }
    }
    worst
}

/// Peak-to-trough maximum drawdown over the trailing `span` bars, as a
/// non-positive ratio against the running maximum.
pub fn max_drawdown(closes: &[f64], span: usize) -> f64 {
    let windowed = tail_slice(closes, span);
    if windowed.len() < 2 {
        return f64::NAN;
    }
    let mut peak = windowed[0];
    let mut worst = 0.0f64;
    for &close in windowed {
        if close > peak {
            peak = close;
        }
        let dd = close / peak - 1.0;
        if dd < worst {
            worst = dd;
        }
    }
    worst
}

/// Mean close*volume over the trailing `window` bars with reported volume.
/// NaN when no volume data exists in the window.
pub fn average_dollar_volume(series: &OhlcvSeries, window: usize) -> f64 {
    let bars = series.bars();
    let start = bars.len().saturating_sub(window);
    let mut sum = 0.0;
    let mut count = 0usize;
    for bar in &bars[start..] {
        if let Some(volume) = bar.volume {
            sum += bar.close * volume;
            count += 1;
        }
    }
    if count == 0 {
        return f64::NAN;
    }
    sum / count as f64
}

/// Fraction of the trailing `window` volume-reporting bars with zero volume.
/// NaN when no bar in the window reports volume.
pub fn zero_volume_fraction(series: &OhlcvSeries, window: usize) -> f64 {
    let bars = series.bars();
    let start = bars.len().saturating_sub(window);
    let mut zeros = 0usize;
    let mut reported = 0usize;
    for bar in &bars[start..] {
        if let Some(volume) = bar.volume {
            reported += 1;
            if volume == 0.0 {
                zeros += 1;
            }
        }
    }
    if reported == 0 {
        return f64::NAN;
    }
    zeros as f64 / reported as f64
}

fn tail_slice(closes: &[f64], n: usize) -> &[f64] {
    &closes[closes.len().saturating_sub(n)..]
}
