use serde::{Deserialize, Serialize};

use screener_core::{nan_as_null, DataStatus, FeatureVector, ScoreComponents};

use crate::risk::RiskAssessment;

/// Stage-1 (micro) row. Every universe symbol emits one, including symbols
/// with no data; nothing is silently dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stage1Row {
    pub symbol: String,
    #[serde(with = "nan_as_null")]
    pub last_close: f64,
    pub data_status: DataStatus,
    pub reasons: Vec<String>,
    /// Survives into stage 2.
    pub eligible: bool,
}

/// Stage-2 (short) row with cheap features and the data-status check.
/// Insufficient history is flagged but still eligible; only missing data
/// and a failed price gate knock a symbol out here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stage2Row {
    pub symbol: String,
    #[serde(with = "nan_as_null")]
    pub last_close: f64,
    pub history_days: usize,
    pub features: FeatureVector,
    pub data_status: DataStatus,
    pub reasons: Vec<String>,
    pub eligible: bool,
}

/// Stage-3 (deep) row: full feature battery, theme tags, risk assessment,
/// confidence, and score components for survivors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stage3Row {
    pub symbol: String,
    pub features: FeatureVector,
    pub tags: Vec<String>,
    pub risk: RiskAssessment,
    /// Blended confidence in the row's data, clamped to [0, 1].
    pub confidence: f64,
    pub data_status: DataStatus,
    pub reasons: Vec<String>,
    pub eligible: bool,
    /// Present only for deep-history survivors.
    pub score: Option<ScoreComponents>,
}
