//! Cross-metric anomaly scoring.
//!
//! Scores how far today's metric vector sits from the historical cloud using a
//! covariance-weighted quadratic form. Each cell of the sample covariance
//! matrix contributes `diff[i] * diff[j] / cov[i][j]`; cells with
//! `|cov| <= 1e-4` are skipped. This is an element-wise approximation, not the
//! inverse-covariance form, and its output values depend on that.

use campaign_core::AnomalyError;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ChiSquared, ContinuousCDF};

/// Chi-square style cutoff for moderate dimensionality
pub const DEFAULT_THRESHOLD: f64 = 15.09;

/// Covariance cells at or below this magnitude are left out of the sum
pub const COVARIANCE_EPSILON: f64 = 1e-4;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultivariateResult {
    pub is_anomaly: bool,
    pub distance: f64,
    pub dimensions: usize,
    /// Upper-tail chi-square probability of distance² with `dimensions` dof
    pub p_value: Option<f64>,
    pub interpretation: String,
}

pub struct MultivariateDetector {
    threshold: f64,
}

impl MultivariateDetector {
    pub fn new() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
        }
    }

    pub fn with_threshold(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Flag `current` when its distance from `history` exceeds the threshold.
    pub fn detect(&self, current: &[f64], history: &[Vec<f64>]) -> Result<MultivariateResult, AnomalyError> {
        let distance = mahalanobis(current, history)?;
        let dimensions = current.len();

        let p_value = if distance > 0.0 {
            let chi = ChiSquared::new(dimensions as f64)
                .map_err(|e| AnomalyError::CalculationError(format!("chi-square({}): {}", dimensions, e)))?;
            Some((1.0 - chi.cdf(distance * distance)).clamp(0.0, 1.0))
        } else {
            None
        };

        let is_anomaly = distance > self.threshold;
        let interpretation = if history.len() < 2 {
            format!("Insufficient history for covariance ({} rows)", history.len())
        } else if is_anomaly {
            format!(
                "Joint deviation across {} metrics: distance {:.2} exceeds {:.2}",
                dimensions, distance, self.threshold
            )
        } else {
            format!(
                "Metrics move together within the normal range (distance {:.2})",
                distance
            )
        };

        Ok(MultivariateResult {
            is_anomaly,
            distance,
            dimensions,
            p_value,
            interpretation,
        })
    }
}

impl Default for MultivariateDetector {
    fn default() -> Self {
        Self::new()
    }
}

/// Covariance-weighted distance of `current` from the mean of `history`.
///
/// Fewer than two historical rows yields 0. Rows must match the length of
/// `current`.
pub fn mahalanobis(current: &[f64], history: &[Vec<f64>]) -> Result<f64, AnomalyError> {
    if history.len() < 2 {
        return Ok(0.0);
    }
    validate_shape(current, history)?;

    let dims = current.len();
    let rows = history.len();
    let data = DMatrix::from_fn(rows, dims, |r, c| history[r][c]);

    let mean = DVector::from_fn(dims, |c, _| data.column(c).sum() / rows as f64);
    let diff = DVector::from_fn(dims, |c, _| current[c] - mean[c]);

    let mut cov = DMatrix::<f64>::zeros(dims, dims);
    for i in 0..dims {
        for j in i..dims {
            let mut sum = 0.0;
            for r in 0..rows {
                sum += (data[(r, i)] - mean[i]) * (data[(r, j)] - mean[j]);
            }
            let value = sum / (rows - 1) as f64;
            cov[(i, j)] = value;
            cov[(j, i)] = value;
        }
    }

    let mut quadratic = 0.0;
    for i in 0..dims {
        for j in 0..dims {
            let c = cov[(i, j)];
            if c.abs() > COVARIANCE_EPSILON {
                quadratic += diff[i] * diff[j] / c;
            }
        }
    }

    Ok(quadratic.max(0.0).sqrt())
}

fn validate_shape(current: &[f64], history: &[Vec<f64>]) -> Result<(), AnomalyError> {
    if current.is_empty() {
        return Err(AnomalyError::InvalidInput("current vector is empty".to_string()));
    }
    if current.iter().any(|v| !v.is_finite()) {
        return Err(AnomalyError::InvalidInput("current vector has non-finite values".to_string()));
    }
    for (idx, row) in history.iter().enumerate() {
        if row.len() != current.len() {
            tracing::warn!(row = idx, expected = current.len(), got = row.len(), "Historical row dimension mismatch");
            return Err(AnomalyError::InvalidInput(format!(
                "historical row {} has {} values, expected {}",
                idx,
                row.len(),
                current.len()
            )));
        }
        if row.iter().any(|v| !v.is_finite()) {
            return Err(AnomalyError::InvalidInput(format!(
                "historical row {} has non-finite values",
                idx
            )));
        }
    }
    Ok(())
}
