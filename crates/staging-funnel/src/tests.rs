//! Funnel integration tests against scripted in-memory providers.

use std::sync::Arc;

use data_providers::testing::{FailKind, MockProvider};
use data_providers::{CachedProvider, LimitedProvider, ProviderChain};
use screener_core::{DataStatus, ScreenerConfig};

use crate::funnel::StagingFunnel;

fn config() -> ScreenerConfig {
    let mut config = ScreenerConfig::default();
    config.staging.stage1_micro_days = 5;
    config.staging.stage2_short_days = 30;
    config.staging.stage3_deep_days = 60;
    config.staging.history_min_days = 10;
    config
}

fn universe(symbols: &[&str]) -> Vec<String> {
    symbols.iter().map(|s| s.to_string()).collect()
}

fn rising(n: usize, start: f64) -> Vec<f64> {
    (0..n).map(|i| start + i as f64 * 0.1).collect()
}

#[tokio::test]
async fn symbol_without_history_is_retained_then_excluded() {
    // AAA has 10 bars around $5, BBB has none: both appear in stage-1
    // output, only AAA proceeds.
    let provider = Arc::new(
        MockProvider::new("mock")
            .with_symbol("AAA", &[5.0; 10])
            .with_symbol("BBB", &[]),
    );
    let funnel = StagingFunnel::new(ProviderChain::direct(provider.clone()), config());
    let output = funnel.run(&universe(&["AAA", "BBB"])).await;

    assert_eq!(output.stage1.len(), 2);
    let aaa = &output.stage1[0];
    assert!(aaa.eligible);
    assert!(aaa.reasons.is_empty());
    assert_eq!(aaa.data_status, DataStatus::Ok);

    let bbb = &output.stage1[1];
    assert_eq!(bbb.data_status, DataStatus::DataUnavailable);
    assert_eq!(bbb.reasons, vec!["NO_HISTORY"]);
    assert!(!bbb.eligible);

    assert_eq!(output.stage2.len(), 1);
    assert_eq!(output.stage2[0].symbol, "AAA");
    // BBB saw exactly one fetch: the stage-1 micro probe.
    assert_eq!(provider.calls_for("BBB"), 1);
}

#[tokio::test]
async fn price_gate_failure_skips_all_downstream_fetches() {
    let mut config = config();
    config.gates.price_max = Some(10.0);
    let provider = Arc::new(
        MockProvider::new("mock")
            .with_symbol("CHEAP", &[8.0; 40])
            .with_symbol("RICH", &[11.0; 40]),
    );
    let funnel = StagingFunnel::new(ProviderChain::direct(provider.clone()), config);
    let output = funnel.run(&universe(&["CHEAP", "RICH"])).await;

    let rich = output.stage1.iter().find(|r| r.symbol == "RICH").unwrap();
    assert!(!rich.eligible);
    assert_eq!(rich.reasons, vec!["PRICE_ABOVE_MAX"]);

    // No stage-2 (or later) fetch was issued for the gated-out symbol.
    assert_eq!(provider.calls_for("RICH"), 1);
    assert_eq!(provider.calls_for("CHEAP"), 3);
    assert_eq!(output.stage2.len(), 1);
}

#[tokio::test]
async fn stage_row_counts_narrow_monotonically() {
    let provider = Arc::new(
        MockProvider::new("mock")
            .with_symbol("AAA", &rising(80, 20.0))
            .with_symbol("BBB", &rising(80, 30.0))
            .with_symbol("CCC", &[])
            .with_symbol("DDD", &rising(80, 40.0)),
    );
    let funnel = StagingFunnel::new(ProviderChain::direct(provider), config());
    let output = funnel.run(&universe(&["AAA", "BBB", "CCC", "DDD"])).await;

    assert_eq!(output.summary.universe, 4);
    assert!(output.summary.stage1 >= output.summary.stage2);
    assert!(output.summary.stage2 >= output.summary.stage3);
    assert_eq!(output.stage1.len(), 4);
    assert_eq!(output.stage2.len(), 3);
    assert_eq!(output.stage3.len(), 3);
}

#[tokio::test]
async fn every_processed_symbol_emits_a_stage_record() {
    let provider = Arc::new(
        MockProvider::new("mock")
            .with_symbol("AAA", &rising(80, 20.0))
            .with_symbol("BBB", &[]),
    );
    let funnel = StagingFunnel::new(ProviderChain::direct(provider), config());
    let output = funnel.run(&universe(&["AAA", "BBB"])).await;

    let records_for = |symbol: &str, stage: u8| {
        output
            .records
            .iter()
            .filter(|r| r.symbol == symbol && r.stage == stage)
            .count()
    };
    assert_eq!(records_for("AAA", 1), 1);
    assert_eq!(records_for("AAA", 2), 1);
    assert_eq!(records_for("AAA", 3), 1);
    assert_eq!(records_for("BBB", 1), 1);
    assert_eq!(records_for("BBB", 2), 0);
    assert_eq!(
        output.records.len(),
        output.stage1.len() + output.stage2.len() + output.stage3.len()
    );
}

#[tokio::test]
async fn provider_failure_is_isolated_per_symbol() {
    let provider = Arc::new(
        MockProvider::new("mock")
            .with_symbol("GOOD", &rising(80, 20.0))
            .with_symbol("BAD", &rising(80, 20.0))
            .with_failing_symbol("BAD", FailKind::Transport),
    );
    let funnel = StagingFunnel::new(ProviderChain::direct(provider), config());
    let output = funnel.run(&universe(&["BAD", "GOOD"])).await;

    let bad = output.stage1.iter().find(|r| r.symbol == "BAD").unwrap();
    assert_eq!(bad.data_status, DataStatus::DataUnavailable);
    assert!(bad.reasons[0].starts_with("PROVIDER_ERROR"));

    // The batch survived: GOOD went all the way through.
    assert_eq!(output.stage3.len(), 1);
    assert_eq!(output.stage3[0].symbol, "GOOD");
    assert!(output.stage3[0].score.is_some());
}

#[tokio::test]
async fn exhausted_budget_surfaces_as_unavailable_rows() {
    let inner = Arc::new(
        MockProvider::new("mock")
            .with_symbol("AAA", &rising(80, 20.0))
            .with_symbol("BBB", &rising(80, 20.0)),
    );
    let provider = Arc::new(LimitedProvider::new(inner, 1));
    let funnel = StagingFunnel::new(ProviderChain::direct(provider), config());
    let output = funnel.run(&universe(&["AAA", "BBB"])).await;

    // The single budget unit went to AAA's micro fetch; everything after
    // is an unavailable row, never a panic or an aborted batch.
    assert_eq!(output.stage1.len(), 2);
    let bbb = output.stage1.iter().find(|r| r.symbol == "BBB").unwrap();
    assert_eq!(bbb.data_status, DataStatus::DataUnavailable);
    assert!(bbb.reasons[0].contains("budget exhausted"));

    // AAA survived stage 1 but its stage-2 fetch was refused too.
    assert_eq!(output.stage2.len(), 1);
    assert_eq!(output.stage2[0].data_status, DataStatus::DataUnavailable);
    assert!(!output.stage2[0].eligible);
    assert!(output.stage3.is_empty());
}

#[tokio::test]
async fn cache_layer_serves_repeat_runs_without_refetching() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(MockProvider::with_closes("mock", &rising(80, 20.0)).cacheable());

    let build = || {
        let cached = CachedProvider::new(provider.clone(), dir.path(), 1.0).unwrap();
        let store = cached.store();
        let chain = ProviderChain {
            provider: Arc::new(cached),
            caches: vec![store],
        };
        StagingFunnel::new(chain, config())
    };

    let first = build().run(&universe(&["AAA"])).await;
    assert_eq!(first.summary.cache_misses, 3);
    assert_eq!(first.summary.cache_hits, 0);
    assert_eq!(provider.history_calls(), 3);

    // A fresh funnel over the same cache directory: the deep snapshot from
    // the first run covers every stage lookback.
    let second = build().run(&universe(&["AAA"])).await;
    assert_eq!(second.summary.cache_hits, 3);
    assert_eq!(second.summary.cache_misses, 0);
    assert_eq!(provider.history_calls(), 3);
}

#[tokio::test]
async fn uncached_chains_report_zero_cache_traffic() {
    let provider = Arc::new(MockProvider::with_closes("mock", &rising(80, 20.0)));
    let funnel = StagingFunnel::new(ProviderChain::direct(provider), config());
    let output = funnel.run(&universe(&["AAA"])).await;

    assert_eq!(output.summary.cache_hits, 0);
    assert_eq!(output.summary.cache_misses, 0);
}

#[tokio::test]
async fn insufficient_history_is_flagged_but_still_deepened() {
    let provider = Arc::new(MockProvider::new("mock").with_symbol("NEW", &rising(6, 20.0)));
    let funnel = StagingFunnel::new(ProviderChain::direct(provider), config());
    let output = funnel.run(&universe(&["NEW"])).await;

    let row2 = &output.stage2[0];
    assert_eq!(row2.data_status, DataStatus::InsufficientHistory);
    assert!(row2.reasons.contains(&"INSUFFICIENT_HISTORY".to_string()));
    assert!(row2.eligible);

    // Deep pass still ran and scored it, with NaN-heavy features handled.
    let row3 = &output.stage3[0];
    assert_eq!(row3.data_status, DataStatus::InsufficientHistory);
    assert!(row3.score.is_some());
    assert!(row3.confidence >= 0.0 && row3.confidence <= 1.0);
}

#[tokio::test]
async fn deep_survivors_carry_risk_and_confidence() {
    let provider = Arc::new(MockProvider::with_closes("mock", &rising(80, 20.0)));
    let funnel = StagingFunnel::new(ProviderChain::direct(provider), config());
    let output = funnel.run(&universe(&["AAA"])).await;

    let row = &output.stage3[0];
    assert!(row.eligible);
    assert!((0.0..=1.0).contains(&row.confidence));
    let score = row.score.as_ref().unwrap();
    assert!((1..=10).contains(&score.decile));
    // Single eligible row: fewer than two distinct raw scores, decile 1.
    assert_eq!(score.decile, 1);
}
