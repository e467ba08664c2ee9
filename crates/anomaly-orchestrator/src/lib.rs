use std::collections::{BTreeMap, HashMap};

use adaptive_thresholds::{AdaptiveThresholdCalculator, ThresholdContext};
use campaign_core::{
    stats, Anomaly, AnomalyError, AnomalySummary, BenchmarkComparison, CampaignSeries, CohortStats,
    DetectionReport, MetricKind, MetricSeries, Severity,
};
use chrono::NaiveDate;
use cohort_benchmark::CohortBenchmarker;
use multivariate_detector::{MultivariateDetector, MultivariateResult};
use rayon::prelude::*;
use seasonal_decomposition::SeasonalDecomposer;
use serde::{Deserialize, Serialize};

pub mod config;
pub use config::DetectionConfig;


/// Cross-metric anomaly for one campaign day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointAnomaly {
    pub campaign_id: String,
    pub detected_at: NaiveDate,
    pub metrics: Vec<MetricKind>,
    pub current: Vec<f64>,
    pub history_days: usize,
    pub result: MultivariateResult,
}

/// Per-campaign detection output before ranking
struct CampaignOutcome {
    anomalies: Vec<Anomaly>,
    metrics_evaluated: usize,
}

pub struct AnomalyOrchestrator {
    config: DetectionConfig,
    decomposer: SeasonalDecomposer,
    thresholds: AdaptiveThresholdCalculator,
    benchmarker: CohortBenchmarker,
    multivariate: MultivariateDetector,
}

impl AnomalyOrchestrator {
    pub fn new(config: DetectionConfig) -> Result<Self, AnomalyError> {
        config.validate()?;
        Ok(Self {
            decomposer: SeasonalDecomposer::new(config.period)?,
            thresholds: AdaptiveThresholdCalculator::new(),
            benchmarker: CohortBenchmarker::new(),
            multivariate: MultivariateDetector::with_threshold(config.multivariate_threshold),
            config,
        })
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    /// Detect, rank and summarize anomalies across campaigns.
    pub fn run(&self, campaigns: &[CampaignSeries]) -> DetectionReport {
        self.run_with_cohorts(campaigns, &HashMap::new())
    }

    /// Same as [`run`](Self::run), with peer cohorts feeding the adaptive
    /// threshold check of each candidate anomaly.
    pub fn run_with_cohorts(
        &self,
        campaigns: &[CampaignSeries],
        cohorts: &HashMap<MetricKind, CohortStats>,
    ) -> DetectionReport {
        tracing::info!(
            "Starting anomaly detection for {} campaigns (sensitivity: {}, min history: {} days)",
            campaigns.len(),
            self.config.sensitivity,
            self.config.min_history_days
        );

        let outcomes: Vec<CampaignOutcome> = campaigns
            .par_iter()
            .map(|campaign| self.detect_campaign(campaign, cohorts))
            .collect();

        let metrics_evaluated = outcomes.iter().map(|o| o.metrics_evaluated).sum();
        let candidates: Vec<Anomaly> = outcomes.into_iter().flat_map(|o| o.anomalies).collect();
        let anomalies = rank_anomalies(candidates, self.config.max_results);

        let summary = AnomalySummary {
            campaigns_analyzed: campaigns.len(),
            metrics_evaluated,
            ..AnomalySummary::from_anomalies(&anomalies)
        };

        tracing::info!(
            total = summary.total,
            critical = summary.critical,
            high = summary.high,
            medium = summary.medium,
            "Anomaly detection complete ({} metric series evaluated)",
            summary.metrics_evaluated
        );

        DetectionReport { anomalies, summary }
    }

    /// Anomalies for a single campaign, unranked.
    pub fn detect(&self, campaign: &CampaignSeries) -> Vec<Anomaly> {
        self.detect_campaign(campaign, &HashMap::new()).anomalies
    }

    fn detect_campaign(&self, campaign: &CampaignSeries, cohorts: &HashMap<MetricKind, CohortStats>) -> CampaignOutcome {
        let mut outcome = CampaignOutcome {
            anomalies: Vec::new(),
            metrics_evaluated: 0,
        };

        for &metric in &self.config.tracked_metrics {
            let Some(series) = campaign.series(metric) else {
                continue;
            };
            if series.len() < self.config.min_history_days {
                tracing::debug!(
                    campaign_id = %campaign.campaign_id,
                    metric = %metric,
                    points = series.len(),
                    "Skipping metric with insufficient history"
                );
                continue;
            }

            outcome.metrics_evaluated += 1;
            if let Some(anomaly) = self.evaluate_series(&series, cohorts.get(&metric)) {
                outcome.anomalies.push(anomaly);
            }
        }

        outcome
    }

    /// Decompose the series and test its most recent point.
    fn evaluate_series(&self, series: &MetricSeries, cohort: Option<&CohortStats>) -> Option<Anomaly> {
        let values = series.values();
        let latest = series.latest()?;
        let index = values.len() - 1;

        let decomposition = self.decomposer.decompose(&values);
        let check = seasonal_decomposition::is_anomaly(
            latest.value,
            &decomposition,
            index,
            self.config.residual_z_threshold,
        );
        if !check.is_anomaly {
            return None;
        }

        let mean = stats::mean(&values);
        let std = stats::std_dev(&values);
        let confidence = (check.z_score.abs() * 10.0).min(100.0);

        let cohort_percentile = cohort.map(|stats| {
            cohort_benchmark::percentile_rank(latest.value, &stats.reference_points()) as f64
        });
        let limits = self
            .thresholds
            .compute_thresholds(self.config.account_age(), series.metric, self.config.sensitivity);
        let evaluation = self.thresholds.evaluate_thresholds(
            series.metric,
            latest.value,
            &ThresholdContext {
                mean,
                std,
                cohort_percentile,
            },
        );

        let rules: Vec<&str> = evaluation.triggered_by.iter().map(|r| r.as_str()).collect();
        let adaptive_note = if evaluation.z_score.abs() > limits.z_score_threshold {
            format!("exceeds the {} adaptive limit of {:.2}", self.config.sensitivity, limits.z_score_threshold)
        } else {
            format!("within the {} adaptive limit of {:.2}", self.config.sensitivity, limits.z_score_threshold)
        };
        let interpretation = format!(
            "{} {}. Series mean {:.4} (sd {:.4}); {}{}",
            series.metric.label(),
            check.interpretation,
            mean,
            std,
            adaptive_note,
            if rules.is_empty() {
                String::new()
            } else {
                format!("; triggered: {}", rules.join(", "))
            }
        );

        tracing::debug!(
            campaign_id = %series.campaign_id,
            metric = %series.metric,
            z_score = check.z_score,
            confidence,
            "Anomaly detected"
        );

        Some(Anomaly {
            campaign_id: series.campaign_id.clone(),
            metric: series.metric,
            current_value: latest.value,
            expected_value: mean,
            z_score: check.z_score,
            confidence,
            severity: Severity::from_confidence(confidence),
            deviation_percent: stats::percent_change(latest.value, mean),
            detected_at: latest.date,
            interpretation,
        })
    }

    /// Compare each campaign metric's latest value with its peer cohort.
    pub fn benchmark(
        &self,
        campaign: &CampaignSeries,
        cohorts: &HashMap<MetricKind, CohortStats>,
    ) -> Result<Vec<BenchmarkComparison>, AnomalyError> {
        let mut comparisons = Vec::new();
        for &metric in &self.config.tracked_metrics {
            let (Some(series), Some(cohort)) = (campaign.series(metric), cohorts.get(&metric)) else {
                continue;
            };
            if let Some(latest) = series.latest() {
                comparisons.push(self.benchmarker.compare_metric(latest.value, cohort, metric)?);
            }
        }
        Ok(comparisons)
    }

    /// Cross-metric check of each campaign's most recent aligned day.
    ///
    /// Only days where every tracked metric the campaign supplies has a value
    /// are used; campaigns with fewer than two such metrics, or fewer aligned
    /// days than the minimum history, are skipped.
    pub fn joint_anomalies(&self, campaigns: &[CampaignSeries]) -> Result<Vec<JointAnomaly>, AnomalyError> {
        let results: Vec<Option<JointAnomaly>> = campaigns
            .par_iter()
            .map(|campaign| self.joint_check(campaign))
            .collect::<Result<_, _>>()?;

        let mut flagged: Vec<JointAnomaly> = results
            .into_iter()
            .flatten()
            .filter(|joint| joint.result.is_anomaly)
            .collect();
        flagged.sort_by(|a, b| {
            b.result
                .distance
                .total_cmp(&a.result.distance)
                .then_with(|| a.campaign_id.cmp(&b.campaign_id))
        });

        tracing::info!("Joint detection flagged {} of {} campaigns", flagged.len(), campaigns.len());
        Ok(flagged)
    }

    fn joint_check(&self, campaign: &CampaignSeries) -> Result<Option<JointAnomaly>, AnomalyError> {
        let by_metric: Vec<(MetricKind, BTreeMap<NaiveDate, f64>)> = self
            .config
            .tracked_metrics
            .iter()
            .filter_map(|&metric| {
                let series = campaign.series(metric)?;
                let by_date: BTreeMap<NaiveDate, f64> = series.points.iter().map(|p| (p.date, p.value)).collect();
                Some((metric, by_date))
            })
            .collect();

        if by_metric.len() < 2 {
            return Ok(None);
        }

        let (_, first) = &by_metric[0];
        let mut dates = Vec::new();
        let mut rows = Vec::new();
        for &date in first.keys() {
            let row: Option<Vec<f64>> = by_metric.iter().map(|(_, values)| values.get(&date).copied()).collect();
            if let Some(row) = row {
                dates.push(date);
                rows.push(row);
            }
        }

        if rows.len() < self.config.min_history_days.max(2) {
            tracing::debug!(
                campaign_id = %campaign.campaign_id,
                aligned_days = rows.len(),
                "Skipping joint check with insufficient aligned history"
            );
            return Ok(None);
        }

        let (Some(current), Some(&detected_at)) = (rows.pop(), dates.last()) else {
            return Ok(None);
        };
        let result = self.multivariate.detect(&current, &rows)?;

        Ok(Some(JointAnomaly {
            campaign_id: campaign.campaign_id.clone(),
            detected_at,
            metrics: by_metric.iter().map(|(metric, _)| *metric).collect(),
            current,
            history_days: rows.len(),
            result,
        }))
    }
}

/// Order by confidence (highest first) and keep the top `limit`.
/// Ties break on campaign id, then metric, so the order is stable across runs.
pub fn rank_anomalies(mut anomalies: Vec<Anomaly>, limit: usize) -> Vec<Anomaly> {
    anomalies.sort_by(|a, b| {
        b.confidence
            .total_cmp(&a.confidence)
            .then_with(|| a.campaign_id.cmp(&b.campaign_id))
            .then_with(|| a.metric.cmp(&b.metric))
    });
    anomalies.truncate(limit);
    anomalies
}
