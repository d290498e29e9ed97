//! screener-runner: run the staged screening funnel over a universe file.
//!
//! Usage:
//!   screener-runner <config.json> <universe.csv> [output.json]
//!
//! Exits non-zero when zero symbols yield any data, while still writing
//! correctly-schemaed (empty) outputs.

use anyhow::{bail, Context, Result};
use screener_core::{DataStatus, ScreenerConfig};
use staging_funnel::{OutputRow, OutputTable, StagingFunnel};

mod universe;

use universe::load_universe;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let (Some(config_path), Some(universe_path)) = (args.next(), args.next()) else {
        bail!("usage: screener-runner <config.json> <universe.csv> [output.json]");
    };
    let output_path = args.next().unwrap_or_else(|| "screen_output.json".to_string());

    // Configuration and input problems are fatal before any fetch begins.
    let config = ScreenerConfig::from_file(&config_path)
        .with_context(|| format!("invalid configuration {config_path}"))?;
    let symbols = load_universe(&universe_path)?;
    tracing::info!(
        "loaded {} symbols from {}, provider '{}' (fallbacks: {:?})",
        symbols.len(),
        universe_path,
        config.data.provider,
        config.data.fallback_chain
    );

    let chain = data_providers::build_provider(&config.data)?;
    let funnel = StagingFunnel::new(chain, config);
    let output = funnel.run(&symbols).await;

    let mut table = OutputTable::load(&output_path)?;
    table.upsert(output.stage3.iter().map(OutputRow::from_stage3));
    table.save()?;
    tracing::info!(
        "wrote {} rows to {} ({} scored this run)",
        table.rows().len(),
        output_path,
        output
            .stage3
            .iter()
            .filter(|r| r.score.is_some())
            .count()
    );

    let with_data = output
        .stage1
        .iter()
        .filter(|r| r.data_status != DataStatus::DataUnavailable)
        .count();
    if with_data == 0 {
        tracing::error!("no symbol produced any data; outputs are empty");
        std::process::exit(1);
    }
    Ok(())
}
