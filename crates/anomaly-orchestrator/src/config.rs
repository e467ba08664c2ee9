use campaign_core::{AnomalyError, MetricKind, Sensitivity};
use serde::{Deserialize, Serialize};

/// Tunables for one detection run. Pure parameters, no environment access.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Seasonal cycle length in days
    pub period: usize,
    pub sensitivity: Sensitivity,
    /// Metrics with fewer cleaned points are skipped
    pub min_history_days: usize,
    /// Residual z-score cutoff
    pub residual_z_threshold: f64,
    /// Distance cutoff for cross-metric checks
    pub multivariate_threshold: f64,
    /// Ranked list is truncated to this many entries
    pub max_results: usize,
    /// Account age used for adaptive thresholds; unset means a mature account
    pub account_age_days: Option<u32>,
    pub tracked_metrics: Vec<MetricKind>,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            period: 7,
            sensitivity: Sensitivity::Medium,
            min_history_days: 7,
            residual_z_threshold: 3.0,
            multivariate_threshold: 15.09,
            max_results: 20,
            account_age_days: None,
            tracked_metrics: MetricKind::TRACKED.to_vec(),
        }
    }
}

impl DetectionConfig {
    /// Age assumed when none is configured
    pub const MATURE_ACCOUNT_DAYS: u32 = 365;

    pub fn validate(&self) -> Result<(), AnomalyError> {
        if self.period < 2 {
            return Err(AnomalyError::InvalidInput(format!(
                "period must be at least 2, got {}",
                self.period
            )));
        }
        if !(self.residual_z_threshold.is_finite() && self.residual_z_threshold > 0.0) {
            return Err(AnomalyError::InvalidInput(format!(
                "residual_z_threshold must be positive, got {}",
                self.residual_z_threshold
            )));
        }
        if !(self.multivariate_threshold.is_finite() && self.multivariate_threshold > 0.0) {
            return Err(AnomalyError::InvalidInput(format!(
                "multivariate_threshold must be positive, got {}",
                self.multivariate_threshold
            )));
        }
        if self.tracked_metrics.is_empty() {
            return Err(AnomalyError::InvalidInput("no tracked metrics configured".to_string()));
        }
        for (i, metric) in self.tracked_metrics.iter().enumerate() {
            if self.tracked_metrics[..i].contains(metric) {
                return Err(AnomalyError::InvalidInput(format!(
                    "metric {} is tracked more than once",
                    metric
                )));
            }
        }
        Ok(())
    }

    pub fn account_age(&self) -> u32 {
        self.account_age_days.unwrap_or(Self::MATURE_ACCOUNT_DAYS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DetectionConfig::default();
        assert_eq!(config.period, 7);
        assert_eq!(config.min_history_days, 7);
        assert_eq!(config.max_results, 20);
        assert_eq!(config.residual_z_threshold, 3.0);
        assert_eq!(config.multivariate_threshold, 15.09);
        assert_eq!(config.tracked_metrics.len(), 5);
        assert_eq!(config.account_age(), 365);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: DetectionConfig =
            serde_json::from_str(r#"{"sensitivity": "high", "min_history_days": 14}"#).unwrap();
        assert_eq!(config.sensitivity, Sensitivity::High);
        assert_eq!(config.min_history_days, 14);
        assert_eq!(config.period, 7);
    }

    #[test]
    fn test_validation() {
        let mut config = DetectionConfig { period: 1, ..DetectionConfig::default() };
        assert!(config.validate().is_err());

        config.period = 7;
        config.residual_z_threshold = -1.0;
        assert!(config.validate().is_err());

        config.residual_z_threshold = 3.0;
        config.tracked_metrics.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duplicate_tracked_metric_rejected() {
        let config: DetectionConfig = serde_json::from_str(r#"{"tracked_metrics": ["ctr", "ctr"]}"#).unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(&err, AnomalyError::InvalidInput(msg) if msg.contains("ctr")));

        let config = DetectionConfig {
            tracked_metrics: vec![MetricKind::Cpa, MetricKind::Roas, MetricKind::Cpa],
            ..DetectionConfig::default()
        };
        assert!(config.validate().is_err());

        let config = DetectionConfig {
            tracked_metrics: vec![MetricKind::Cpa, MetricKind::Roas],
            ..DetectionConfig::default()
        };
        assert!(config.validate().is_ok());
    }
}
