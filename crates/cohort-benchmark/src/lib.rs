//! Peer-cohort benchmarking.
//!
//! Ranks a client's metric value against a cohort's percentile summary and
//! classifies the standing. The rank is approximated from the five named
//! percentiles (p5, p25, p50, p75, p95), not from the full peer sample.

use campaign_core::{AnomalyError, BenchmarkComparison, BenchmarkStatus, CohortStats, MetricKind};

/// Share of reference points strictly below `value`, 0 to 100, rounded.
pub fn percentile_rank(value: f64, reference_points: &[f64]) -> u32 {
    if reference_points.is_empty() {
        return 0;
    }
    let below = reference_points.iter().filter(|&&p| p < value).count();
    (below as f64 / reference_points.len() as f64 * 100.0).round() as u32
}

/// Map a percentile rank to a standing, honoring metric direction
pub fn classify(rank: u32, higher_is_better: bool) -> BenchmarkStatus {
    if higher_is_better {
        match rank {
            r if r >= 75 => BenchmarkStatus::Excellent,
            r if r >= 60 => BenchmarkStatus::AboveAverage,
            r if r >= 40 => BenchmarkStatus::Average,
            r if r >= 25 => BenchmarkStatus::BelowAverage,
            _ => BenchmarkStatus::Poor,
        }
    } else {
        match rank {
            r if r <= 25 => BenchmarkStatus::Excellent,
            r if r <= 40 => BenchmarkStatus::AboveAverage,
            r if r <= 60 => BenchmarkStatus::Average,
            r if r <= 75 => BenchmarkStatus::BelowAverage,
            _ => BenchmarkStatus::Poor,
        }
    }
}

pub struct CohortBenchmarker;

impl CohortBenchmarker {
    pub fn new() -> Self {
        Self
    }

    /// Compare `client_value` against the cohort median and percentiles.
    pub fn compare(
        &self,
        client_value: f64,
        cohort: &CohortStats,
        metric: MetricKind,
        higher_is_better: bool,
    ) -> Result<BenchmarkComparison, AnomalyError> {
        if !client_value.is_finite() {
            return Err(AnomalyError::InvalidInput(format!(
                "{} client value is not finite",
                metric
            )));
        }
        if cohort.p50 == 0.0 || !cohort.p50.is_finite() {
            return Err(AnomalyError::InvalidInput(format!(
                "{} cohort median must be non-zero to compute a gap",
                metric
            )));
        }

        let gap_percent = (client_value - cohort.p50) / cohort.p50 * 100.0;
        let percentile_rank = percentile_rank(client_value, &cohort.reference_points());
        let status = classify(percentile_rank, higher_is_better);
        let interpretation = interpret(metric, status, percentile_rank, gap_percent);

        tracing::debug!(
            metric = %metric,
            percentile_rank,
            status = status.as_str(),
            gap_percent,
            "Cohort comparison"
        );

        Ok(BenchmarkComparison {
            metric,
            client_value,
            percentile_rank,
            status,
            gap_percent,
            interpretation,
        })
    }

    /// Like [`compare`](Self::compare) but takes the direction from the metric
    pub fn compare_metric(
        &self,
        client_value: f64,
        cohort: &CohortStats,
        metric: MetricKind,
    ) -> Result<BenchmarkComparison, AnomalyError> {
        self.compare(client_value, cohort, metric, metric.higher_is_better())
    }
}

impl Default for CohortBenchmarker {
    fn default() -> Self {
        Self::new()
    }
}

// Mid-tier standings carry no text.
fn interpret(metric: MetricKind, status: BenchmarkStatus, rank: u32, gap_percent: f64) -> Option<String> {
    let label = metric.label();
    match status {
        BenchmarkStatus::Excellent => Some(format!(
            "{} is among the best in its peer group (rank {}, {:+.1}% vs median)",
            label, rank, gap_percent
        )),
        BenchmarkStatus::BelowAverage => Some(format!(
            "{} trails most peers (rank {}, {:+.1}% vs median); review targeting and creatives",
            label, rank, gap_percent
        )),
        BenchmarkStatus::Poor => Some(format!(
            "{} is in the bottom tier of its peer group (rank {}, {:+.1}% vs median)",
            label, rank, gap_percent
        )),
        BenchmarkStatus::AboveAverage | BenchmarkStatus::Average => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cohort() -> CohortStats {
        CohortStats {
            p5: 1.0,
            p10: 1.5,
            p25: 2.0,
            p50: 3.0,
            p75: 4.0,
            p90: 5.0,
            p95: 6.0,
            mean: 3.2,
            std: 1.4,
            count: 250,
        }
    }

    #[test]
    fn test_percentile_rank() {
        let points = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(percentile_rank(0.5, &points), 0);
        assert_eq!(percentile_rank(3.0, &points), 40);
        assert_eq!(percentile_rank(3.5, &points), 60);
        assert_eq!(percentile_rank(9.0, &points), 100);
        assert_eq!(percentile_rank(1.0, &[]), 0);
        // 1 of 3 below rounds to 33
        assert_eq!(percentile_rank(1.5, &[1.0, 2.0, 3.0]), 33);
    }

    #[test]
    fn test_median_is_average() {
        let stats = cohort();
        let result = CohortBenchmarker::new()
            .compare(stats.p50, &stats, MetricKind::Ctr, true)
            .unwrap();
        assert_eq!(result.status, BenchmarkStatus::Average);
        assert!(result.gap_percent.abs() < 1e-12);
        assert!(result.interpretation.is_none());
    }

    #[test]
    fn test_higher_is_better_tiers() {
        let stats = cohort();
        let bench = CohortBenchmarker::new();

        let top = bench.compare(7.0, &stats, MetricKind::Roas, true).unwrap();
        assert_eq!(top.percentile_rank, 100);
        assert_eq!(top.status, BenchmarkStatus::Excellent);
        assert!(top.interpretation.is_some());
        assert!((top.gap_percent - 133.333).abs() < 0.01);

        let above = bench.compare(3.5, &stats, MetricKind::Roas, true).unwrap();
        assert_eq!(above.status, BenchmarkStatus::AboveAverage);
        assert!(above.interpretation.is_none());

        let below = bench.compare(1.5, &stats, MetricKind::Roas, true).unwrap();
        assert_eq!(below.percentile_rank, 20);
        assert_eq!(below.status, BenchmarkStatus::Poor);
        assert!(below.interpretation.is_some());
    }

    #[test]
    fn test_lower_is_better_mirrors() {
        let stats = cohort();
        let bench = CohortBenchmarker::new();

        let cheap = bench.compare_metric(0.5, &stats, MetricKind::Cpa).unwrap();
        assert_eq!(cheap.status, BenchmarkStatus::Excellent);

        let pricey = bench.compare_metric(7.0, &stats, MetricKind::Cpa).unwrap();
        assert_eq!(pricey.status, BenchmarkStatus::Poor);

        let slightly_high = bench.compare_metric(3.5, &stats, MetricKind::Cpa).unwrap();
        assert_eq!(slightly_high.percentile_rank, 60);
        assert_eq!(slightly_high.status, BenchmarkStatus::Average);
    }

    #[test]
    fn test_below_average_has_text() {
        assert_eq!(classify(30, true), BenchmarkStatus::BelowAverage);
        let text = interpret(MetricKind::Ctr, BenchmarkStatus::BelowAverage, 30, -12.0);
        assert!(text.unwrap().contains("CTR"));
    }

    #[test]
    fn test_invalid_inputs() {
        let mut stats = cohort();
        let bench = CohortBenchmarker::new();
        assert!(bench.compare(f64::NAN, &stats, MetricKind::Ctr, true).is_err());

        stats.p50 = 0.0;
        assert!(matches!(
            bench.compare(1.0, &stats, MetricKind::Ctr, true),
            Err(AnomalyError::InvalidInput(_))
        ));
    }
}
