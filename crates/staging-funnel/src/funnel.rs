use std::sync::Arc;

use chrono::Utc;

use data_providers::{CacheStore, ProviderChain};
use feature_engine::{apply_gates, compute_features};
use screener_core::{
    reason, DataStatus, GateDecision, HistoryProvider, OhlcvSeries, ProviderError, RunSummary,
    ScreenerConfig, StageRecord,
};

use crate::rows::{Stage1Row, Stage2Row, Stage3Row};
use crate::scoring::{ScoreInput, ScoringEngine};
use crate::tagger::ThemeTagger;
use crate::{assess_risk, NoopTagger};

/// Everything one run produces: the three stage row sets, the per-symbol
/// diagnostics, and the per-stage counts.
#[derive(Debug, Clone)]
pub struct FunnelOutput {
    pub stage1: Vec<Stage1Row>,
    pub stage2: Vec<Stage2Row>,
    pub stage3: Vec<Stage3Row>,
    pub records: Vec<StageRecord>,
    pub summary: RunSummary,
}

/// The three-pass narrowing pipeline.
///
/// Stage N runs only on survivors of stage N-1 and no stage is skipped.
/// Provider failures are isolated per symbol: a failing symbol becomes a
/// DATA_UNAVAILABLE row with the error text as a reason, and the batch
/// continues. Symbols are processed sequentially, so the budget's
/// consume-then-delegate ordering never races.
pub struct StagingFunnel {
    provider: Arc<dyn HistoryProvider>,
    caches: Vec<Arc<CacheStore>>,
    tagger: Arc<dyn ThemeTagger>,
    config: ScreenerConfig,
}

impl StagingFunnel {
    /// Wire the funnel over an already-composed provider chain. Snapshot
    /// caching happens per provider inside the chain; the funnel only reads
    /// the hit/miss counters for the run summary.
    pub fn new(chain: ProviderChain, config: ScreenerConfig) -> Self {
        Self::with_tagger(chain, Arc::new(NoopTagger), config)
    }

    pub fn with_tagger(
        chain: ProviderChain,
        tagger: Arc<dyn ThemeTagger>,
        config: ScreenerConfig,
    ) -> Self {
        Self {
            provider: chain.provider,
            caches: chain.caches,
            tagger,
            config,
        }
    }

    async fn fetch(&self, symbol: &str, days: u32) -> Result<OhlcvSeries, ProviderError> {
        self.provider.get_history(symbol, days).await
    }

    fn gate(&self, last_price: f64) -> GateDecision {
        apply_gates(
            last_price,
            self.config.gates.price_min,
            self.config.gates.price_max,
        )
    }

    fn classify(&self, history_days: usize) -> DataStatus {
        if history_days == 0 {
            DataStatus::DataUnavailable
        } else if history_days < self.config.staging.history_min_days as usize {
            DataStatus::InsufficientHistory
        } else {
            DataStatus::Ok
        }
    }

    /// Run the three stages over the universe.
    pub async fn run(&self, universe: &[String]) -> FunnelOutput {
        tracing::info!(
            "starting staged screen of {} symbols via provider '{}'",
            universe.len(),
            self.provider.name()
        );
        let mut records = Vec::new();

        let stage1 = self.run_stage1(universe, &mut records).await;
        let survivors1: Vec<&Stage1Row> = stage1.iter().filter(|r| r.eligible).collect();

        let stage2 = self.run_stage2(&survivors1, &mut records).await;
        let survivors2: Vec<&Stage2Row> = stage2.iter().filter(|r| r.eligible).collect();

        let stage3 = self.run_stage3(&survivors2, &mut records).await;

        let summary = RunSummary {
            universe: universe.len(),
            stage1: stage1.len(),
            stage2: stage2.len(),
            stage3: stage3.len(),
            cache_hits: self.caches.iter().map(|c| c.hits()).sum(),
            cache_misses: self.caches.iter().map(|c| c.misses()).sum(),
        };
        tracing::info!(
            "screen complete: {} -> {} -> {} -> {} (cache {}/{} hit/miss)",
            summary.universe,
            summary.stage1,
            summary.stage2,
            summary.stage3,
            summary.cache_hits,
            summary.cache_misses
        );

        FunnelOutput {
            stage1,
            stage2,
            stage3,
            records,
            summary,
        }
    }

    /// Stage 1: a micro fetch to gate cheaply on last observed price before
    /// any longer history is bought.
    async fn run_stage1(
        &self,
        universe: &[String],
        records: &mut Vec<StageRecord>,
    ) -> Vec<Stage1Row> {
        let lookback = self.config.staging.stage1_micro_days;
        let mut rows = Vec::with_capacity(universe.len());
        for symbol in universe {
            let (row, bar_count) = match self.fetch(symbol, lookback).await {
                Ok(series) if series.is_empty() => (
                    Stage1Row {
                        symbol: symbol.clone(),
                        last_close: f64::NAN,
                        data_status: DataStatus::DataUnavailable,
                        reasons: vec![reason::NO_HISTORY.to_string()],
                        eligible: false,
                    },
                    0,
                ),
                Ok(series) => {
                    let last_close = series.last_close().unwrap_or(f64::NAN);
                    let decision = self.gate(last_close);
                    (
                        Stage1Row {
                            symbol: symbol.clone(),
                            last_close,
                            data_status: DataStatus::Ok,
                            eligible: decision.passed,
                            reasons: decision.reasons,
                        },
                        series.len(),
                    )
                }
                Err(err) => {
                    tracing::warn!("stage 1: {} unavailable: {}", symbol, err);
                    (
                        Stage1Row {
                            symbol: symbol.clone(),
                            last_close: f64::NAN,
                            data_status: DataStatus::DataUnavailable,
                            reasons: vec![format!("{}: {}", reason::PROVIDER_ERROR, err)],
                            eligible: false,
                        },
                        0,
                    )
                }
            };
            records.push(StageRecord {
                symbol: symbol.clone(),
                stage: 1,
                lookback_days: lookback,
                row_count: bar_count,
                history_days: bar_count,
                status: row.data_status,
            });
            rows.push(row);
        }
        rows
    }

    /// Stage 2: a short fetch, cheap features, and the data-status check.
    async fn run_stage2(
        &self,
        survivors: &[&Stage1Row],
        records: &mut Vec<StageRecord>,
    ) -> Vec<Stage2Row> {
        let lookback = self.config.staging.stage2_short_days;
        let as_of = Utc::now().date_naive();
        let mut rows = Vec::with_capacity(survivors.len());
        for upstream in survivors {
            let symbol = &upstream.symbol;
            let (series, mut reasons) = match self.fetch(symbol, lookback).await {
                Ok(series) => (series, Vec::new()),
                Err(err) => {
                    tracing::warn!("stage 2: {} unavailable: {}", symbol, err);
                    (
                        OhlcvSeries::default(),
                        vec![format!("{}: {}", reason::PROVIDER_ERROR, err)],
                    )
                }
            };
            let history_days = series.len();
            let data_status = self.classify(history_days);
            if data_status == DataStatus::DataUnavailable && reasons.is_empty() {
                reasons.push(reason::NO_HISTORY.to_string());
            }
            if data_status == DataStatus::InsufficientHistory {
                reasons.push(reason::INSUFFICIENT_HISTORY.to_string());
            }

            let features = compute_features(symbol, &series, as_of);
            // Price can have moved or been adjusted since stage 1; gate on
            // this stage's own snapshot.
            let decision = self.gate(features.last_close);
            let eligible = data_status != DataStatus::DataUnavailable && decision.passed;
            reasons.extend(decision.reasons);

            records.push(StageRecord {
                symbol: symbol.clone(),
                stage: 2,
                lookback_days: lookback,
                row_count: history_days,
                history_days,
                status: data_status,
            });
            rows.push(Stage2Row {
                symbol: symbol.clone(),
                last_close: features.last_close,
                history_days,
                features,
                data_status,
                reasons,
                eligible,
            });
        }
        rows
    }

    /// Stage 3: the deep fetch, full feature battery, tags, risk, confidence,
    /// and scores for survivors.
    async fn run_stage3(
        &self,
        survivors: &[&Stage2Row],
        records: &mut Vec<StageRecord>,
    ) -> Vec<Stage3Row> {
        let lookback = self.config.staging.stage3_deep_days;
        let as_of = Utc::now().date_naive();
        let mut rows = Vec::with_capacity(survivors.len());
        for upstream in survivors {
            let symbol = &upstream.symbol;
            let (series, mut reasons) = match self.fetch(symbol, lookback).await {
                Ok(series) => (series, Vec::new()),
                Err(err) => {
                    tracing::warn!("stage 3: {} unavailable: {}", symbol, err);
                    (
                        OhlcvSeries::default(),
                        vec![format!("{}: {}", reason::PROVIDER_ERROR, err)],
                    )
                }
            };
            let history_days = series.len();
            let data_status = self.classify(history_days);
            if data_status == DataStatus::DataUnavailable && reasons.is_empty() {
                reasons.push(reason::NO_HISTORY.to_string());
            }
            if data_status == DataStatus::InsufficientHistory {
                reasons.push(reason::INSUFFICIENT_HISTORY.to_string());
            }

            let features = compute_features(symbol, &series, as_of);
            let decision = self.gate(features.last_close);
            let eligible = data_status != DataStatus::DataUnavailable && decision.passed;
            reasons.extend(decision.reasons);

            let tags = self.tagger.tag(symbol, &features);
            let risk = assess_risk(&features, &self.config.gates.risk_flags);
            let confidence = self.confidence(&features, tags.confidence);

            records.push(StageRecord {
                symbol: symbol.clone(),
                stage: 3,
                lookback_days: lookback,
                row_count: history_days,
                history_days,
                status: data_status,
            });
            rows.push(Stage3Row {
                symbol: symbol.clone(),
                features,
                tags: tags.tags,
                risk,
                confidence,
                data_status,
                reasons,
                eligible,
                score: None,
            });
        }

        self.attach_scores(&mut rows);
        rows
    }

    /// Cross-sectional scoring over this run's eligible deep rows.
    fn attach_scores(&self, rows: &mut [Stage3Row]) {
        let engine = ScoringEngine::new(self.config.score.weights.clone());
        let eligible: Vec<usize> = rows
            .iter()
            .enumerate()
            .filter(|(_, r)| r.eligible)
            .map(|(i, _)| i)
            .collect();
        let inputs: Vec<ScoreInput<'_>> = eligible
            .iter()
            .map(|&i| ScoreInput {
                features: &rows[i].features,
                theme_tag_count: rows[i].tags.len(),
                attention: 0.0,
            })
            .collect();
        let scored = engine.score_all(&inputs);
        for (&i, components) in eligible.iter().zip(scored) {
            rows[i].score = Some(components);
        }
    }

    /// Weighted blend of history completeness, data completeness, volume
    /// availability, and tag confidence, clamped to [0, 1].
    fn confidence(&self, features: &screener_core::FeatureVector, tag_confidence: f64) -> f64 {
        let target = self.config.staging.stage3_deep_days as f64;
        let history_completeness = (features.history_days as f64 / target).min(1.0);
        let volume_availability = if features.has_volume() { 1.0 } else { 0.0 };
        let blend = 0.40 * history_completeness
            + 0.30 * features.data_completeness()
            + 0.15 * volume_availability
            + 0.15 * tag_confidence.clamp(0.0, 1.0);
        blend.clamp(0.0, 1.0)
    }
}
