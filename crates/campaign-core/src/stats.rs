/// Descriptive statistics shared by the detection engines.
///
/// All helpers are total: empty or too-short inputs return a neutral value
/// instead of panicking, so callers can apply their own fallbacks.

/// Compute the mean of a data slice.
pub fn mean(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    data.iter().sum::<f64>() / data.len() as f64
}

/// Compute sample standard deviation (n-1 divisor).
pub fn std_dev(data: &[f64]) -> f64 {
    if data.len() < 2 {
        return 0.0;
    }
    let m = mean(data);
    let variance = data.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (data.len() - 1) as f64;
    variance.sqrt()
}

/// Compute a specific percentile value from data (0-100 scale).
/// Nearest-rank on a sorted copy.
pub fn percentile_value(data: &[f64], pct: f64) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let mut sorted: Vec<f64> = data.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let idx = ((pct.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

/// Drop NaN and infinite entries.
pub fn finite_values(data: &[f64]) -> Vec<f64> {
    data.iter().copied().filter(|v| v.is_finite()).collect()
}

/// Percent change of `value` against `reference`. Zero when the reference is ~0.
pub fn percent_change(value: f64, reference: f64) -> f64 {
    if reference.abs() < f64::EPSILON {
        return 0.0;
    }
    (value - reference) / reference * 100.0
}
