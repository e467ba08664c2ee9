//! Layered configuration: defaults, optional JSON file, environment, CLI flags.

use std::fmt::Display;
use std::path::Path;
use std::str::FromStr;

use anomaly_orchestrator::DetectionConfig;
use anyhow::{Context, Result};
use campaign_core::Sensitivity;

/// Flags that override every other configuration source
#[derive(Debug, Default, Clone)]
pub struct CliOverrides {
    pub sensitivity: Option<Sensitivity>,
    pub min_history_days: Option<usize>,
}

pub fn load(config_path: Option<&Path>, overrides: &CliOverrides) -> Result<DetectionConfig> {
    let mut config = match config_path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading config file {}", path.display()))?;
            serde_json::from_str(&raw).with_context(|| format!("parsing config file {}", path.display()))?
        }
        None => DetectionConfig::default(),
    };

    apply_env(&mut config, |name| std::env::var(name).ok())?;

    if let Some(sensitivity) = overrides.sensitivity {
        config.sensitivity = sensitivity;
    }
    if let Some(days) = overrides.min_history_days {
        config.min_history_days = days;
    }

    config.validate()?;
    Ok(config)
}

/// Apply `ANOMALY_*` variables read through `lookup`.
pub fn apply_env(config: &mut DetectionConfig, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
    if let Some(v) = parse_var(&lookup, "ANOMALY_PERIOD")? {
        config.period = v;
    }
    if let Some(v) = parse_var(&lookup, "ANOMALY_SENSITIVITY")? {
        config.sensitivity = v;
    }
    if let Some(v) = parse_var(&lookup, "ANOMALY_MIN_HISTORY_DAYS")? {
        config.min_history_days = v;
    }
    if let Some(v) = parse_var(&lookup, "ANOMALY_Z_THRESHOLD")? {
        config.residual_z_threshold = v;
    }
    if let Some(v) = parse_var(&lookup, "ANOMALY_MULTIVARIATE_THRESHOLD")? {
        config.multivariate_threshold = v;
    }
    if let Some(v) = parse_var(&lookup, "ANOMALY_MAX_RESULTS")? {
        config.max_results = v;
    }
    if let Some(v) = parse_var(&lookup, "ANOMALY_ACCOUNT_AGE_DAYS")? {
        config.account_age_days = Some(v);
    }
    Ok(())
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: Display,
{
    match lookup(name) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("invalid value {:?} for {}: {}", raw, name, e)),
        _ => Ok(None),
    }
}
