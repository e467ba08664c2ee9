//! campaign-anomalies: run the anomaly engine over a JSON dump of campaign metrics.
//!
//! Input is an array of `{ "campaign_id": ..., "metrics": { "ctr": [{"date", "value"}, ...] } }`.
//! The report is written to stdout as JSON; logs go to stderr.
//!
//! Usage:
//!   campaign-anomalies --input metrics.json
//!   campaign-anomalies --input - --sensitivity high --joint < metrics.json
//!   campaign-anomalies --input metrics.json --config detection.json --min-history 14

use std::io::Read;
use std::path::{Path, PathBuf};

use anomaly_orchestrator::{AnomalyOrchestrator, JointAnomaly};
use anyhow::{Context, Result};
use campaign_core::{CampaignSeries, DetectionReport};
use serde::Serialize;

mod config;

#[derive(Serialize)]
struct Output {
    #[serde(flatten)]
    report: DetectionReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    joint: Option<Vec<JointAnomaly>>,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    let input = flag_value(&args, "--input");
    let Some(input) = input else {
        print_usage();
        std::process::exit(1);
    };
    let config_path = flag_value(&args, "--config").map(PathBuf::from);
    let joint = args.iter().any(|a| a == "--joint");

    let overrides = config::CliOverrides {
        sensitivity: flag_value(&args, "--sensitivity")
            .map(|v| v.parse())
            .transpose()
            .context("--sensitivity")?,
        min_history_days: flag_value(&args, "--min-history")
            .map(|v| v.parse())
            .transpose()
            .context("--min-history")?,
    };

    let detection = config::load(config_path.as_deref(), &overrides)?;
    tracing::info!(
        "Detection config: period {}, sensitivity {}, min history {} days, top {}",
        detection.period,
        detection.sensitivity,
        detection.min_history_days,
        detection.max_results
    );

    let campaigns = read_campaigns(input)?;
    tracing::info!("Loaded {} campaigns from {}", campaigns.len(), input);

    let orchestrator = AnomalyOrchestrator::new(detection)?;
    let report = orchestrator.run(&campaigns);
    let joint = if joint {
        Some(orchestrator.joint_anomalies(&campaigns)?)
    } else {
        None
    };

    let output = serde_json::to_string_pretty(&Output { report, joint })?;
    println!("{}", output);
    Ok(())
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "campaign_anomalies=info,anomaly_orchestrator=info".into());

    if std::env::var("LOG_FORMAT").map(|v| v == "json").unwrap_or(false) {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str())
}

fn read_campaigns(input: &str) -> Result<Vec<CampaignSeries>> {
    let raw = if input == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf).context("reading campaigns from stdin")?;
        buf
    } else {
        std::fs::read_to_string(Path::new(input)).with_context(|| format!("reading {}", input))?
    };
    serde_json::from_str(&raw).with_context(|| format!("parsing campaigns from {}", input))
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  campaign-anomalies --input PATH       Campaign metrics JSON (use - for stdin)");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --config PATH        Detection config JSON (defaults apply to missing keys)");
    eprintln!("  --sensitivity LEVEL  high | medium | low");
    eprintln!("  --min-history N      Minimum days of history per metric");
    eprintln!("  --joint              Also run the cross-metric check");
    eprintln!();
    eprintln!("Environment (.env is loaded): ANOMALY_PERIOD, ANOMALY_SENSITIVITY, ANOMALY_MIN_HISTORY_DAYS,");
    eprintln!("  ANOMALY_Z_THRESHOLD, ANOMALY_MULTIVARIATE_THRESHOLD, ANOMALY_MAX_RESULTS,");
    eprintln!("  ANOMALY_ACCOUNT_AGE_DAYS, RUST_LOG, LOG_FORMAT=json");
}
