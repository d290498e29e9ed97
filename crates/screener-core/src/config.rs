use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Run configuration. Loaded from a JSON file; every section defaults so a
/// partial file is valid. Validation failures are fatal and surface before
/// any fetch begins.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScreenerConfig {
    #[serde(default)]
    pub staging: StagingConfig,
    #[serde(default)]
    pub gates: GatesConfig,
    #[serde(default)]
    pub score: ScoreConfig,
    #[serde(default)]
    pub data: DataConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagingConfig {
    /// Stage-1 lookback: just enough bars to gate on last price.
    pub stage1_micro_days: u32,
    /// Stage-2 lookback for cheap features and the data-status check.
    pub stage2_short_days: u32,
    /// Stage-3 lookback for the full feature battery.
    pub stage3_deep_days: u32,
    /// Observed history below this is INSUFFICIENT_HISTORY.
    pub history_min_days: u32,
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            stage1_micro_days: 5,
            stage2_short_days: 90,
            stage3_deep_days: 400,
            history_min_days: 60,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatesConfig {
    /// Lower price bound; unset disables it.
    pub price_min: Option<f64>,
    /// Upper price bound; unset disables it.
    pub price_max: Option<f64>,
    #[serde(default)]
    pub risk_flags: RiskFlagsConfig,
}

/// Thresholds for the stage-3 red/amber risk assessment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskFlagsConfig {
    /// Annualized 20d volatility above this is amber.
    pub volatility_amber: f64,
    /// Annualized 20d volatility above this is red.
    pub volatility_red: f64,
    /// Trailing max drawdown below this (more negative) is amber.
    pub drawdown_amber: f64,
    /// Trailing max drawdown below this is red.
    pub drawdown_red: f64,
}

impl Default for RiskFlagsConfig {
    fn default() -> Self {
        Self {
            volatility_amber: 0.35,
            volatility_red: 0.60,
            drawdown_amber: -0.15,
            drawdown_red: -0.30,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoreConfig {
    #[serde(default)]
    pub weights: ScoreWeights,
}

/// Weights for the named sub-scores. No requirement that they sum to any
/// fixed total; penalties enter the raw score as negative sub-score values,
/// so all weights are non-negative magnitudes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub trend: f64,
    pub momentum: f64,
    pub liquidity: f64,
    pub quality: f64,
    pub volatility_penalty: f64,
    pub drawdown_penalty: f64,
    pub tail_penalty: f64,
    pub attention: f64,
    pub theme_bonus: f64,
    pub volume_missing_penalty: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            trend: 1.0,
            momentum: 1.0,
            liquidity: 0.5,
            quality: 0.5,
            volatility_penalty: 1.0,
            drawdown_penalty: 1.0,
            tail_penalty: 0.5,
            attention: 0.25,
            theme_bonus: 0.25,
            volume_missing_penalty: 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Primary provider: "yahoo", "stooq", or "file".
    pub provider: String,
    /// Ordered fallback providers, consulted only on access errors.
    #[serde(default)]
    pub fallback_chain: Vec<String>,
    /// Cached snapshots older than this are refetched.
    pub max_cache_age_days: f64,
    /// Snapshot cache directory.
    pub cache_dir: PathBuf,
    /// Local snapshot directory for the "file" provider.
    #[serde(default)]
    pub snapshot_dir: Option<PathBuf>,
    #[serde(default)]
    pub budget: BudgetConfig,
    #[serde(default)]
    pub throttling: ThrottlingConfig,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            provider: "yahoo".to_string(),
            fallback_chain: vec!["stooq".to_string()],
            max_cache_age_days: 1.0,
            cache_dir: PathBuf::from(".cache/history"),
            snapshot_dir: None,
            budget: BudgetConfig::default(),
            throttling: ThrottlingConfig::default(),
        }
    }
}

/// Per-run request budgets, scoped to a provider instance and never
/// persisted across runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    pub default_max_requests: u32,
    /// Overrides keyed by provider name.
    #[serde(default)]
    pub per_provider: HashMap<String, u32>,
}

impl BudgetConfig {
    pub fn max_requests_for(&self, provider: &str) -> u32 {
        self.per_provider
            .get(provider)
            .copied()
            .unwrap_or(self.default_max_requests)
    }
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            default_max_requests: 200,
            per_provider: HashMap::new(),
        }
    }
}

/// Bounded exponential backoff parameters for remote calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThrottlingConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ThrottlingConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 250,
            max_delay_ms: 5_000,
        }
    }
}

impl ScreenerConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let s = &self.staging;
        if s.stage1_micro_days == 0 || s.stage2_short_days == 0 || s.stage3_deep_days == 0 {
            return Err(ConfigError::Invalid(
                "stage lookbacks must be positive".to_string(),
            ));
        }
        if s.stage1_micro_days > s.stage2_short_days || s.stage2_short_days > s.stage3_deep_days {
            return Err(ConfigError::Invalid(
                "stage lookbacks must be non-decreasing: micro <= short <= deep".to_string(),
            ));
        }
        if let (Some(min), Some(max)) = (self.gates.price_min, self.gates.price_max) {
            if min > max {
                return Err(ConfigError::Invalid(format!(
                    "gates.price_min ({min}) exceeds gates.price_max ({max})"
                )));
            }
        }
        let rf = &self.gates.risk_flags;
        if rf.volatility_amber > rf.volatility_red {
            return Err(ConfigError::Invalid(
                "risk_flags.volatility_amber must not exceed volatility_red".to_string(),
            ));
        }
        if rf.drawdown_amber < rf.drawdown_red {
            return Err(ConfigError::Invalid(
                "risk_flags.drawdown_amber must not be deeper than drawdown_red".to_string(),
            ));
        }
        if self.data.max_cache_age_days < 0.0 {
            return Err(ConfigError::Invalid(
                "data.max_cache_age_days must be non-negative".to_string(),
            ));
        }
        if self.data.provider == "file" && self.data.snapshot_dir.is_none() {
            return Err(ConfigError::Invalid(
                "data.snapshot_dir is required for the file provider".to_string(),
            ));
        }
        Ok(())
    }
}
