use serde::{Deserialize, Serialize};

use screener_core::{FeatureVector, RiskFlagsConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Green,
    Amber,
    Red,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub level: RiskLevel,
    pub flags: Vec<String>,
}

/// Red/amber assessment of stage-3 features against configured thresholds.
///
/// NaN features raise no flag: a missing number is reflected in the row's
/// confidence, not invented as a breach.
pub fn assess_risk(features: &FeatureVector, thresholds: &RiskFlagsConfig) -> RiskAssessment {
    let mut flags = Vec::new();
    let mut level = RiskLevel::Green;

    let mut raise = |flag: &str, severity: RiskLevel, flags: &mut Vec<String>| {
        flags.push(flag.to_string());
        if severity > level {
            level = severity;
        }
    };

    let vol = features.vol_20d;
    if vol.is_finite() {
        if vol >= thresholds.volatility_red {
            raise("VOLATILITY_RED", RiskLevel::Red, &mut flags);
        } else if vol >= thresholds.volatility_amber {
            raise("VOLATILITY_AMBER", RiskLevel::Amber, &mut flags);
        }
    }

    let dd = features.max_drawdown_126d;
    if dd.is_finite() {
        if dd <= thresholds.drawdown_red {
            raise("DRAWDOWN_RED", RiskLevel::Red, &mut flags);
        } else if dd <= thresholds.drawdown_amber {
            raise("DRAWDOWN_AMBER", RiskLevel::Amber, &mut flags);
        }
    }

    RiskAssessment { level, flags }
}
