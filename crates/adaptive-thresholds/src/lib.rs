//! Per-account, per-metric statistical thresholds.
//!
//! Base tiers come from the chosen sensitivity. Young accounts get looser
//! (numerically larger) thresholds and volatile metrics a wider CUSUM band.

use campaign_core::{MetricKind, Sensitivity, Severity, ThresholdSet};
use serde::{Deserialize, Serialize};

/// |z| above this is extreme (99.9% two-sided)
pub const Z_EXTREME: f64 = 3.29;
/// |z| above this is significant (99% two-sided)
pub const Z_SIGNIFICANT: f64 = 2.58;
/// Cohort percentiles at or beyond these bounds are outliers
pub const COHORT_LOW_PERCENTILE: f64 = 5.0;
pub const COHORT_HIGH_PERCENTILE: f64 = 95.0;

/// Number of rules that could fire; confidence is the fraction triggered
const RULE_COUNT: f64 = 4.0;

/// Rule that fired during threshold evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerRule {
    ZScoreExtreme,
    ZScoreSignificant,
    CohortOutlier,
}

impl TriggerRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerRule::ZScoreExtreme => "z_score_extreme",
            TriggerRule::ZScoreSignificant => "z_score_significant",
            TriggerRule::CohortOutlier => "cohort_outlier",
        }
    }
}

/// Baseline statistics a value is evaluated against
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ThresholdContext {
    pub mean: f64,
    pub std: f64,
    /// Client's percentile in its cohort (0-100), when known
    pub cohort_percentile: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdEvaluation {
    pub metric: MetricKind,
    pub value: f64,
    pub z_score: f64,
    pub is_anomaly: bool,
    pub triggered_by: Vec<TriggerRule>,
    pub severity: Severity,
    /// 0 to 100
    pub confidence: f64,
}

pub struct AdaptiveThresholdCalculator;

impl AdaptiveThresholdCalculator {
    pub fn new() -> Self {
        Self
    }

    /// Base thresholds for a sensitivity tier
    pub fn base_tier(sensitivity: Sensitivity) -> ThresholdSet {
        match sensitivity {
            Sensitivity::High => ThresholdSet {
                z_score_threshold: 1.96,
                deviation_percent: 15.0,
                cusum_threshold: 2.0,
            },
            Sensitivity::Medium => ThresholdSet {
                z_score_threshold: 2.58,
                deviation_percent: 20.0,
                cusum_threshold: 3.0,
            },
            Sensitivity::Low => ThresholdSet {
                z_score_threshold: 3.29,
                deviation_percent: 30.0,
                cusum_threshold: 4.0,
            },
        }
    }

    /// Loosening factor for young accounts
    pub fn maturity_multiplier(account_age_days: u32) -> f64 {
        if account_age_days < 30 {
            1.5
        } else if account_age_days < 90 {
            1.25
        } else {
            1.0
        }
    }

    pub fn compute_thresholds(&self, account_age_days: u32, metric: MetricKind, sensitivity: Sensitivity) -> ThresholdSet {
        let base = Self::base_tier(sensitivity);
        let maturity = Self::maturity_multiplier(account_age_days);

        ThresholdSet {
            z_score_threshold: base.z_score_threshold * maturity,
            deviation_percent: base.deviation_percent * maturity,
            cusum_threshold: base.cusum_threshold * maturity * metric.volatility(),
        }
    }

    /// Combine z-score and cohort checks into one verdict.
    pub fn evaluate_thresholds(&self, metric: MetricKind, value: f64, context: &ThresholdContext) -> ThresholdEvaluation {
        let z_score = if context.std > 0.0 {
            (value - context.mean) / context.std
        } else {
            0.0
        };

        let mut triggered_by = Vec::new();
        let mut severity = Severity::Low;

        if z_score.abs() > Z_EXTREME {
            triggered_by.push(TriggerRule::ZScoreExtreme);
            severity = Severity::Critical;
        } else if z_score.abs() > Z_SIGNIFICANT {
            triggered_by.push(TriggerRule::ZScoreSignificant);
            severity = severity.max(Severity::High);
        }

        if let Some(percentile) = context.cohort_percentile {
            if percentile <= COHORT_LOW_PERCENTILE || percentile >= COHORT_HIGH_PERCENTILE {
                triggered_by.push(TriggerRule::CohortOutlier);
                severity = severity.max(Severity::High);
            }
        }

        let confidence = (triggered_by.len() as f64 / RULE_COUNT * 100.0).min(100.0);

        ThresholdEvaluation {
            metric,
            value,
            z_score,
            is_anomaly: !triggered_by.is_empty(),
            triggered_by,
            severity,
            confidence,
        }
    }
}

impl Default for AdaptiveThresholdCalculator {
    fn default() -> Self {
        Self::new()
    }
}
