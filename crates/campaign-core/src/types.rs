use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{stats, AnomalyError};

/// Advertising metric tracked per campaign per day
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Ctr,
    Cpc,
    Cpa,
    Roas,
    QualityScore,
    ConversionRate,
    Conversions,
    Impressions,
    Clicks,
    Cost,
}

impl MetricKind {
    /// Metrics evaluated by the orchestrator, in evaluation order
    pub const TRACKED: [MetricKind; 5] = [
        MetricKind::Ctr,
        MetricKind::Cpa,
        MetricKind::Roas,
        MetricKind::QualityScore,
        MetricKind::ConversionRate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Ctr => "ctr",
            MetricKind::Cpc => "cpc",
            MetricKind::Cpa => "cpa",
            MetricKind::Roas => "roas",
            MetricKind::QualityScore => "quality_score",
            MetricKind::ConversionRate => "conversion_rate",
            MetricKind::Conversions => "conversions",
            MetricKind::Impressions => "impressions",
            MetricKind::Clicks => "clicks",
            MetricKind::Cost => "cost",
        }
    }

    /// Human-readable label
    pub fn label(&self) -> &'static str {
        match self {
            MetricKind::Ctr => "CTR",
            MetricKind::Cpc => "CPC",
            MetricKind::Cpa => "CPA",
            MetricKind::Roas => "ROAS",
            MetricKind::QualityScore => "Quality Score",
            MetricKind::ConversionRate => "Conversion rate",
            MetricKind::Conversions => "Conversions",
            MetricKind::Impressions => "Impressions",
            MetricKind::Clicks => "Clicks",
            MetricKind::Cost => "Cost",
        }
    }

    /// Whether a larger value means better performance.
    /// Cost-type metrics are the exception.
    pub fn higher_is_better(&self) -> bool {
        !matches!(self, MetricKind::Cpc | MetricKind::Cpa | MetricKind::Cost)
    }

    /// Volatility multiplier applied to CUSUM thresholds (1.0 = stable metric)
    pub fn volatility(&self) -> f64 {
        match self {
            MetricKind::Conversions => 1.5,
            MetricKind::Cpa => 1.8,
            MetricKind::Roas => 1.6,
            MetricKind::Cost => 1.4,
            MetricKind::Cpc => 1.3,
            MetricKind::Clicks => 1.2,
            _ => 1.0,
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKind {
    type Err = AnomalyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ctr" => Ok(MetricKind::Ctr),
            "cpc" => Ok(MetricKind::Cpc),
            "cpa" => Ok(MetricKind::Cpa),
            "roas" => Ok(MetricKind::Roas),
            "quality_score" => Ok(MetricKind::QualityScore),
            "conversion_rate" => Ok(MetricKind::ConversionRate),
            "conversions" => Ok(MetricKind::Conversions),
            "impressions" => Ok(MetricKind::Impressions),
            "clicks" => Ok(MetricKind::Clicks),
            "cost" => Ok(MetricKind::Cost),
            other => Err(AnomalyError::UnknownMetric(other.to_string())),
        }
    }
}

/// Coarse sensitivity control mapped to base statistical thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sensitivity {
    High,
    #[default]
    Medium,
    Low,
}

impl Sensitivity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sensitivity::High => "high",
            Sensitivity::Medium => "medium",
            Sensitivity::Low => "low",
        }
    }
}

impl fmt::Display for Sensitivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sensitivity {
    type Err = AnomalyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Ok(Sensitivity::High),
            "medium" => Ok(Sensitivity::Medium),
            "low" => Ok(Sensitivity::Low),
            other => Err(AnomalyError::UnknownSensitivity(other.to_string())),
        }
    }
}

/// One daily observation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricPoint {
    pub date: NaiveDate,
    pub value: f64,
}

impl MetricPoint {
    pub fn new(date: NaiveDate, value: f64) -> Self {
        Self { date, value }
    }
}

/// Cleaned, chronologically ordered series for one campaign and one metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSeries {
    pub campaign_id: String,
    pub metric: MetricKind,
    pub points: Vec<MetricPoint>,
}

impl MetricSeries {
    /// Build a series, sorting ascending by date and dropping non-finite values.
    pub fn from_points(campaign_id: impl Into<String>, metric: MetricKind, points: &[MetricPoint]) -> Self {
        let campaign_id = campaign_id.into();
        let mut cleaned: Vec<MetricPoint> = points.iter().copied().filter(|p| p.value.is_finite()).collect();

        let dropped = points.len() - cleaned.len();
        if dropped > 0 {
            tracing::warn!(
                campaign_id = %campaign_id,
                metric = %metric,
                dropped,
                "Dropped non-finite observations"
            );
        }

        // Stable sort keeps supplier order for duplicate dates
        cleaned.sort_by_key(|p| p.date);

        Self {
            campaign_id,
            metric,
            points: cleaned,
        }
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.value).collect()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Most recent observation
    pub fn latest(&self) -> Option<&MetricPoint> {
        self.points.last()
    }
}

/// All supplied metric series for one campaign
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CampaignSeries {
    pub campaign_id: String,
    #[serde(default)]
    pub metrics: BTreeMap<MetricKind, Vec<MetricPoint>>,
}

impl CampaignSeries {
    pub fn new(campaign_id: impl Into<String>) -> Self {
        Self {
            campaign_id: campaign_id.into(),
            metrics: BTreeMap::new(),
        }
    }

    pub fn with_metric(mut self, metric: MetricKind, points: Vec<MetricPoint>) -> Self {
        self.metrics.insert(metric, points);
        self
    }

    /// Cleaned series for `metric`, if the campaign supplied one
    pub fn series(&self, metric: MetricKind) -> Option<MetricSeries> {
        self.metrics
            .get(&metric)
            .map(|points| MetricSeries::from_points(self.campaign_id.clone(), metric, points))
    }
}

/// Additive split of a series: value[i] = trend[i] + seasonal[i] + residual[i]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecompositionResult {
    pub trend: Vec<f64>,
    pub seasonal: Vec<f64>,
    pub residual: Vec<f64>,
    /// True when the history was too short and trend is a copy of the input
    pub degenerate: bool,
}

impl DecompositionResult {
    pub fn len(&self) -> usize {
        self.trend.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trend.is_empty()
    }

    /// trend + seasonal at `index`, i.e. the value the model expected
    pub fn fitted(&self, index: usize) -> Option<f64> {
        Some(self.trend.get(index)? + self.seasonal.get(index)?)
    }
}

/// Per-metric, per-account statistical thresholds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdSet {
    pub z_score_threshold: f64,
    pub deviation_percent: f64,
    pub cusum_threshold: f64,
}

/// Percentile summary of a peer population for one metric
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CohortStats {
    pub p5: f64,
    pub p10: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
    pub p95: f64,
    pub mean: f64,
    pub std: f64,
    pub count: usize,
}

impl CohortStats {
    /// Summarize a raw peer sample. Non-finite values are ignored.
    pub fn from_population(values: &[f64]) -> Result<Self, AnomalyError> {
        let values = stats::finite_values(values);
        if values.is_empty() {
            return Err(AnomalyError::InsufficientData(
                "cohort population has no finite values".to_string(),
            ));
        }

        Ok(Self {
            p5: stats::percentile_value(&values, 5.0),
            p10: stats::percentile_value(&values, 10.0),
            p25: stats::percentile_value(&values, 25.0),
            p50: stats::percentile_value(&values, 50.0),
            p75: stats::percentile_value(&values, 75.0),
            p90: stats::percentile_value(&values, 90.0),
            p95: stats::percentile_value(&values, 95.0),
            mean: stats::mean(&values),
            std: stats::std_dev(&values),
            count: values.len(),
        })
    }

    /// The five named percentiles used for rank approximation
    pub fn reference_points(&self) -> [f64; 5] {
        [self.p5, self.p25, self.p50, self.p75, self.p95]
    }
}

/// Qualitative standing against a cohort
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BenchmarkStatus {
    Excellent,
    AboveAverage,
    Average,
    BelowAverage,
    Poor,
}

impl BenchmarkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BenchmarkStatus::Excellent => "excellent",
            BenchmarkStatus::AboveAverage => "above_average",
            BenchmarkStatus::Average => "average",
            BenchmarkStatus::BelowAverage => "below_average",
            BenchmarkStatus::Poor => "poor",
        }
    }
}

/// One client value compared against a cohort
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkComparison {
    pub metric: MetricKind,
    pub client_value: f64,
    /// 0 to 100
    pub percentile_rank: u32,
    pub status: BenchmarkStatus,
    /// Percent gap from the cohort median
    pub gap_percent: f64,
    /// Only set for excellent, below_average and poor standings
    pub interpretation: Option<String>,
}

/// Severity band
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Band a 0-100 confidence: critical >80, high >60, medium >40
    pub fn from_confidence(confidence: f64) -> Self {
        match confidence {
            c if c > 80.0 => Severity::Critical,
            c if c > 60.0 => Severity::High,
            c if c > 40.0 => Severity::Medium,
            _ => Severity::Low,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

/// Detected anomaly for one campaign metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    pub campaign_id: String,
    pub metric: MetricKind,
    pub current_value: f64,
    pub expected_value: f64,
    pub z_score: f64,
    /// 0 to 100
    pub confidence: f64,
    pub severity: Severity,
    pub deviation_percent: f64,
    /// Date of the flagged observation
    pub detected_at: NaiveDate,
    pub interpretation: String,
}

/// Counts over a ranked anomaly list
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnomalySummary {
    pub total: usize,
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub campaigns_analyzed: usize,
    pub metrics_evaluated: usize,
}

impl AnomalySummary {
    pub fn from_anomalies(anomalies: &[Anomaly]) -> Self {
        let mut summary = Self {
            total: anomalies.len(),
            ..Self::default()
        };
        for anomaly in anomalies {
            match Severity::from_confidence(anomaly.confidence) {
                Severity::Critical => summary.critical += 1,
                Severity::High => summary.high += 1,
                Severity::Medium => summary.medium += 1,
                Severity::Low => {}
            }
        }
        summary
    }
}

/// Output of one detection run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionReport {
    pub anomalies: Vec<Anomaly>,
    pub summary: AnomalySummary,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    #[test]
    fn test_metric_round_trip_names() {
        for metric in MetricKind::TRACKED {
            assert_eq!(metric.as_str().parse::<MetricKind>().unwrap(), metric);
        }
        assert!("bounce_rate".parse::<MetricKind>().is_err());
    }

    #[test]
    fn test_metric_direction() {
        assert!(MetricKind::Ctr.higher_is_better());
        assert!(MetricKind::Roas.higher_is_better());
        assert!(!MetricKind::Cpa.higher_is_better());
        assert!(!MetricKind::Cost.higher_is_better());
    }

    #[test]
    fn test_series_sorted_and_cleaned() {
        let points = vec![
            MetricPoint::new(day(3), 3.0),
            MetricPoint::new(day(1), 1.0),
            MetricPoint::new(day(4), f64::NAN),
            MetricPoint::new(day(2), 2.0),
        ];
        let series = MetricSeries::from_points("c-1", MetricKind::Ctr, &points);
        assert_eq!(series.values(), vec![1.0, 2.0, 3.0]);
        assert_eq!(series.latest().unwrap().date, day(3));
    }

    #[test]
    fn test_severity_bands() {
        assert_eq!(Severity::from_confidence(95.0), Severity::Critical);
        assert_eq!(Severity::from_confidence(80.0), Severity::High);
        assert_eq!(Severity::from_confidence(60.0), Severity::Medium);
        assert_eq!(Severity::from_confidence(40.0), Severity::Low);
        assert!(Severity::Critical > Severity::High);
    }

    #[test]
    fn test_campaign_series_json_shape() {
        let json = r#"{
            "campaign_id": "spring-sale",
            "metrics": {
                "ctr": [{"date": "2024-03-01", "value": 2.5}],
                "quality_score": [{"date": "2024-03-01", "value": 7.0}]
            }
        }"#;
        let campaign: CampaignSeries = serde_json::from_str(json).unwrap();
        assert_eq!(campaign.metrics.len(), 2);
        let series = campaign.series(MetricKind::QualityScore).unwrap();
        assert_eq!(series.values(), vec![7.0]);
        assert!(campaign.series(MetricKind::Cpa).is_none());
    }

    #[test]
    fn test_cohort_from_population() {
        let values: Vec<f64> = (1..=101).map(|i| i as f64).chain([f64::NAN]).collect();
        let cohort = CohortStats::from_population(&values).unwrap();
        assert_eq!(cohort.count, 101);
        assert_eq!(cohort.p50, 51.0);
        assert_eq!(cohort.p5, 6.0);
        assert_eq!(cohort.p95, 96.0);
        assert!((cohort.mean - 51.0).abs() < 1e-12);
        assert_eq!(cohort.reference_points(), [6.0, 26.0, 51.0, 76.0, 96.0]);

        assert!(matches!(
            CohortStats::from_population(&[f64::NAN]),
            Err(AnomalyError::InsufficientData(_))
        ));
        assert!(matches!(CohortStats::from_population(&[]), Err(AnomalyError::InsufficientData(_))));
    }

    #[test]
    fn test_summary_counts() {
        let make = |confidence: f64| Anomaly {
            campaign_id: "c".into(),
            metric: MetricKind::Ctr,
            current_value: 1.0,
            expected_value: 1.0,
            z_score: 0.0,
            confidence,
            severity: Severity::from_confidence(confidence),
            deviation_percent: 0.0,
            detected_at: day(1),
            interpretation: String::new(),
        };
        let summary = AnomalySummary::from_anomalies(&[make(95.0), make(70.0), make(50.0), make(30.0)]);
        assert_eq!(summary.total, 4);
        assert_eq!(summary.critical, 1);
        assert_eq!(summary.high, 1);
        assert_eq!(summary.medium, 1);
    }
}
