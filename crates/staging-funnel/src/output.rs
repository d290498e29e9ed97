use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use screener_core::{nan_as_null, ConfigError, DataStatus};

use crate::risk::RiskLevel;
use crate::rows::Stage3Row;

/// One persisted output row. The table is keyed by symbol: a later run
/// updates the symbol's row in place rather than appending a duplicate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputRow {
    pub symbol: String,
    pub as_of: NaiveDate,
    pub data_status: DataStatus,
    pub reasons: Vec<String>,
    pub risk_level: RiskLevel,
    #[serde(with = "nan_as_null")]
    pub confidence: f64,
    #[serde(with = "nan_as_null")]
    pub raw_score: f64,
    /// 1..=10 for scored rows; absent when the symbol was not scored.
    pub decile: Option<u8>,
    pub tags: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

impl OutputRow {
    pub fn from_stage3(row: &Stage3Row) -> Self {
        Self {
            symbol: row.symbol.clone(),
            as_of: row.features.as_of,
            data_status: row.data_status,
            reasons: row.reasons.clone(),
            risk_level: row.risk.level,
            confidence: row.confidence,
            raw_score: row.score.as_ref().map_or(f64::NAN, |s| s.raw_score),
            decile: row.score.as_ref().map(|s| s.decile),
            tags: row.tags.clone(),
            updated_at: Utc::now(),
        }
    }
}

/// JSON-backed output table with upsert-by-symbol semantics.
#[derive(Debug)]
pub struct OutputTable {
    path: PathBuf,
    rows: Vec<OutputRow>,
}

impl OutputTable {
    /// Load the table, or start empty when the file does not exist yet.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref().to_path_buf();
        let rows = if path.exists() {
            let raw = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
                path: path.display().to_string(),
                source,
            })?;
            serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
                path: path.display().to_string(),
                source,
            })?
        } else {
            Vec::new()
        };
        Ok(Self { path, rows })
    }

    pub fn rows(&self) -> &[OutputRow] {
        &self.rows
    }

    /// Merge this run's rows: replace the existing row for a symbol, append
    /// rows for symbols seen for the first time.
    pub fn upsert(&mut self, incoming: impl IntoIterator<Item = OutputRow>) {
        for row in incoming {
            match self.rows.iter_mut().find(|r| r.symbol == row.symbol) {
                Some(existing) => *existing = row,
                None => self.rows.push(row),
            }
        }
    }

    /// Persist the table, creating parent directories as needed. An empty
    /// table still writes a valid (empty) JSON array so downstream readers
    /// always find a correctly-schemaed file.
    pub fn save(&self) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: self.path.display().to_string(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(io_err)?;
            }
        }
        let json = serde_json::to_string_pretty(&self.rows).map_err(|source| ConfigError::Parse {
            path: self.path.display().to_string(),
            source,
        })?;
        std::fs::write(&self.path, json).map_err(io_err)
    }
}
