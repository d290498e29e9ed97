use screener_core::{FeatureVector, ScoreComponents, ScoreWeights};

/// One eligible row presented for scoring.
#[derive(Debug, Clone)]
pub struct ScoreInput<'a> {
    pub features: &'a FeatureVector,
    pub theme_tag_count: usize,
    /// Attention signal from upstream collaborators; 0.0 when none is wired.
    pub attention: f64,
}

/// Maps feature vectors and configured weights to named sub-scores, a
/// weighted raw score, and a run-scoped cross-sectional decile.
pub struct ScoringEngine {
    weights: ScoreWeights,
}

/// A missing sub-signal contributes neither bonus nor penalty.
fn zero_if_nan(v: f64) -> f64 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}

/// Mean of the finite values; NaN when none are finite.
fn finite_mean(values: &[f64]) -> f64 {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        return f64::NAN;
    }
    finite.iter().sum::<f64>() / finite.len() as f64
}

impl ScoringEngine {
    pub fn new(weights: ScoreWeights) -> Self {
        Self { weights }
    }

    fn trend(features: &FeatureVector) -> f64 {
        finite_mean(&[
            features.close_to_sma20 - 1.0,
            features.close_to_sma50 - 1.0,
            features.close_to_sma200 - 1.0,
        ])
    }

    fn momentum(features: &FeatureVector) -> f64 {
        finite_mean(&[features.ret_63d, features.ret_126d, features.ret_252d])
    }

    /// log10 of 20-day dollar volume, clamped to [0, 10].
    fn liquidity(features: &FeatureVector) -> f64 {
        if !features.adv20.is_finite() || features.adv20 <= 0.0 {
            return f64::NAN;
        }
        features.adv20.log10().clamp(0.0, 10.0)
    }

    fn quality(features: &FeatureVector) -> f64 {
        1.0 - features.zero_volume_frac_60d
    }

    /// Build the components for one row. The decile is filled by
    /// [`Self::score_all`]; standalone it defaults to 1.
    pub fn components(&self, input: &ScoreInput<'_>) -> ScoreComponents {
        let f = input.features;
        let trend = Self::trend(f);
        let momentum = Self::momentum(f);
        let liquidity = Self::liquidity(f);
        let quality = Self::quality(f);
        // Penalties enter as non-positive values under non-negative weights.
        let volatility_penalty = -zero_if_nan(f.vol_20d).abs();
        let drawdown_penalty = -zero_if_nan(f.max_drawdown_126d).abs();
        let tail_penalty = -zero_if_nan(f.worst_5d_126d.min(0.0)).abs();
        let attention = input.attention;
        let theme_bonus = if input.theme_tag_count > 0 { 1.0 } else { 0.0 };
        let volume_missing_penalty = if f.has_volume() { 0.0 } else { -1.0 };

        let w = &self.weights;
        let raw_score = w.trend * zero_if_nan(trend)
            + w.momentum * zero_if_nan(momentum)
            + w.liquidity * zero_if_nan(liquidity)
            + w.quality * zero_if_nan(quality)
            + w.volatility_penalty * volatility_penalty
            + w.drawdown_penalty * drawdown_penalty
            + w.tail_penalty * tail_penalty
            + w.attention * zero_if_nan(attention)
            + w.theme_bonus * theme_bonus
            + w.volume_missing_penalty * volume_missing_penalty;

        ScoreComponents {
            symbol: f.symbol.clone(),
            trend,
            momentum,
            liquidity,
            quality,
            volatility_penalty,
            drawdown_penalty,
            tail_penalty,
            attention,
            theme_bonus,
            volume_missing_penalty,
            raw_score,
            decile: 1,
        }
    }

    /// Score the run's eligible rows and assign cross-sectional deciles:
    /// rank ascending by raw score, bin into ten equal-count buckets,
    /// label 1..=10. Fewer than two distinct raw scores puts every row in
    /// decile 1. Ties break by symbol so reruns of the same set reproduce
    /// the same deciles.
    pub fn score_all(&self, inputs: &[ScoreInput<'_>]) -> Vec<ScoreComponents> {
        let mut components: Vec<ScoreComponents> =
            inputs.iter().map(|input| self.components(input)).collect();

        let n = components.len();
        let mut distinct: Vec<f64> = components.iter().map(|c| c.raw_score).collect();
        distinct.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        distinct.dedup();
        if distinct.len() < 2 {
            return components;
        }

        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| {
            components[a]
                .raw_score
                .partial_cmp(&components[b].raw_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| components[a].symbol.cmp(&components[b].symbol))
        });
        for (rank, &idx) in order.iter().enumerate() {
            components[idx].decile = (rank * 10 / n) as u8 + 1;
        }
        components
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use screener_core::ScoreWeights;

    fn features(symbol: &str, momentum: f64) -> FeatureVector {
        FeatureVector {
            symbol: symbol.to_string(),
            as_of: NaiveDate::from_ymd_opt(2024, 6, 3).unwrap(),
            history_days: 300,
            last_close: 10.0,
            ret_21d: momentum,
            ret_63d: momentum,
            ret_126d: momentum,
            ret_252d: momentum,
            close_to_sma20: 1.0,
            close_to_sma50: 1.0,
            close_to_sma200: 1.0,
            vol_20d: 0.2,
            vol_60d: 0.2,
            downside_vol: 0.1,
            worst_5d_126d: -0.04,
            max_drawdown_126d: -0.10,
            adv20: 1e7,
            zero_volume_frac_60d: 0.0,
        }
    }

    fn engine() -> ScoringEngine {
        ScoringEngine::new(ScoreWeights::default())
    }

    #[test]
    fn deciles_are_always_in_range_and_monotone_in_raw_score() {
        let feature_vecs: Vec<FeatureVector> = (0..25)
            .map(|i| features(&format!("S{i:02}"), i as f64 * 0.01))
            .collect();
        let inputs: Vec<ScoreInput<'_>> = feature_vecs
            .iter()
            .map(|f| ScoreInput {
                features: f,
                theme_tag_count: 0,
                attention: 0.0,
            })
            .collect();
        let scored = engine().score_all(&inputs);

        for c in &scored {
            assert!((1..=10).contains(&c.decile));
        }
        let mut by_raw = scored.clone();
        by_raw.sort_by(|a, b| a.raw_score.partial_cmp(&b.raw_score).unwrap());
        let deciles: Vec<u8> = by_raw.iter().map(|c| c.decile).collect();
        assert!(deciles.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(deciles.first(), Some(&1));
        assert_eq!(deciles.last(), Some(&10));
    }

    #[test]
    fn all_equal_raw_scores_collapse_to_decile_one() {
        let feature_vecs: Vec<FeatureVector> =
            (0..8).map(|i| features(&format!("S{i}"), 0.05)).collect();
        let inputs: Vec<ScoreInput<'_>> = feature_vecs
            .iter()
            .map(|f| ScoreInput {
                features: f,
                theme_tag_count: 0,
                attention: 0.0,
            })
            .collect();
        let scored = engine().score_all(&inputs);
        assert!(scored.iter().all(|c| c.decile == 1));
    }

    #[test]
    fn nan_sub_signals_contribute_zero_not_nan() {
        let mut f = features("AAA", 0.05);
        f.adv20 = f64::NAN;
        f.zero_volume_frac_60d = f64::NAN;
        f.close_to_sma20 = f64::NAN;
        f.close_to_sma50 = f64::NAN;
        f.close_to_sma200 = f64::NAN;
        let input = ScoreInput {
            features: &f,
            theme_tag_count: 0,
            attention: 0.0,
        };
        let c = engine().components(&input);
        assert!(c.trend.is_nan());
        assert!(c.liquidity.is_nan());
        assert!(c.raw_score.is_finite());
        // Missing volume is penalized explicitly, not via NaN leakage.
        assert_eq!(c.volume_missing_penalty, -1.0);
    }

    #[test]
    fn theme_tags_earn_the_bonus() {
        let f = features("AAA", 0.05);
        let untagged = engine().components(&ScoreInput {
            features: &f,
            theme_tag_count: 0,
            attention: 0.0,
        });
        let tagged = engine().components(&ScoreInput {
            features: &f,
            theme_tag_count: 2,
            attention: 0.0,
        });
        assert!(tagged.raw_score > untagged.raw_score);
        assert_eq!(tagged.theme_bonus, 1.0);
    }

    #[test]
    fn ten_distinct_rows_occupy_every_decile_once() {
        let feature_vecs: Vec<FeatureVector> = (0..10)
            .map(|i| features(&format!("S{i}"), i as f64 * 0.02))
            .collect();
        let inputs: Vec<ScoreInput<'_>> = feature_vecs
            .iter()
            .map(|f| ScoreInput {
                features: f,
                theme_tag_count: 0,
                attention: 0.0,
            })
            .collect();
        let mut deciles: Vec<u8> = engine()
            .score_all(&inputs)
            .iter()
            .map(|c| c.decile)
            .collect();
        deciles.sort_unstable();
        assert_eq!(deciles, (1..=10).collect::<Vec<u8>>());
    }
}
