use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;

use screener_core::{
    Bar, HistoryProvider, OhlcvSeries, ProviderCapabilities, ProviderError,
};

/// CSV row in a local snapshot file: date,open,high,low,close[,volume[,adj_close]].
#[derive(Debug, Deserialize)]
struct SnapshotRow {
    date: NaiveDate,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    #[serde(default)]
    volume: Option<f64>,
    #[serde(default)]
    adj_close: Option<f64>,
}

/// History provider backed by a local directory of per-symbol CSV files
/// (`{SYMBOL}.csv`). Reads are already local, so it declares
/// `manages_own_cache` and the chain wiring does not layer the snapshot
/// cache on top of it.
#[derive(Debug, Clone)]
pub struct FileSnapshotProvider {
    dir: PathBuf,
    adjusted: bool,
}

impl FileSnapshotProvider {
    pub fn new(dir: impl AsRef<Path>, adjusted: bool) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            adjusted,
        }
    }

    fn symbol_path(&self, symbol: &str) -> PathBuf {
        self.dir.join(format!("{symbol}.csv"))
    }

    fn read_series(&self, symbol: &str) -> Result<OhlcvSeries, ProviderError> {
        let path = self.symbol_path(symbol);
        if !path.exists() {
            return Err(ProviderError::access(
                symbol,
                format!("no snapshot file at {}", path.display()),
            ));
        }
        let mut reader = csv::Reader::from_path(&path)
            .map_err(|e| ProviderError::Parse(format!("{}: {}", path.display(), e)))?;
        let mut bars = Vec::new();
        for row in reader.deserialize::<SnapshotRow>() {
            let row = row.map_err(|e| ProviderError::Parse(format!("{}: {}", path.display(), e)))?;
            bars.push(Bar {
                date: row.date,
                open: row.open,
                high: row.high,
                low: row.low,
                close: row.close,
                volume: row.volume,
                adj_close: row.adj_close,
            });
        }
        Ok(OhlcvSeries::from_bars(bars))
    }
}

#[async_trait]
impl HistoryProvider for FileSnapshotProvider {
    fn name(&self) -> &str {
        "file"
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            manages_own_cache: true,
            supports_quotes: false,
            adjusted: self.adjusted,
        }
    }

    async fn get_history(&self, symbol: &str, days: u32) -> Result<OhlcvSeries, ProviderError> {
        let series = self.read_series(symbol)?;
        Ok(series.tail(days as usize))
    }
}
