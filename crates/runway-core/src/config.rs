//! Engine configuration
//!
//! ## Configuration Resolution
//!
//! Config is loaded with a two-layer resolution:
//! 1. An explicit path, or the override in the data dir
//!    (~/.local/share/runway/config/engine.toml)
//! 2. Embedded defaults (compiled into binary)
//!
//! Override files may set any subset of keys; the rest keep their defaults.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::amortization::DEFAULT_MAX_MONTHS;
use crate::balance::{
    DEFAULT_COVERAGE_DAYS, DEFAULT_CRUNCH_DAYS, DEFAULT_RUNWAY_DAYS, DEFAULT_WARNING_THRESHOLD,
};
use crate::credit::DEFAULT_PAYOFF_MAX_MONTHS;
use crate::dates::MAX_WINDOW_DAYS;
use crate::error::{Error, Result};
use crate::health::{HealthWeights, DEFAULT_HEALTH_PERIOD_DAYS};
use crate::ledger::DEFAULT_REMAINDER_OFFSET_DAYS;

/// Embedded default config (compiled into binary)
const DEFAULT_CONFIG: &str = include_str!("../../../config/engine.toml");

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub warning_threshold: f64,
    pub coverage_days: i64,
    pub runway_days: i64,
    pub crunch_days: i64,
    pub remainder_offset_days: i64,
    pub amortization_max_months: u32,
    pub credit_max_months: u32,
    pub health_period_days: i64,
    pub health_weights: HealthWeights,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            warning_threshold: DEFAULT_WARNING_THRESHOLD,
            coverage_days: DEFAULT_COVERAGE_DAYS,
            runway_days: DEFAULT_RUNWAY_DAYS,
            crunch_days: DEFAULT_CRUNCH_DAYS,
            remainder_offset_days: DEFAULT_REMAINDER_OFFSET_DAYS,
            amortization_max_months: DEFAULT_MAX_MONTHS,
            credit_max_months: DEFAULT_PAYOFF_MAX_MONTHS,
            health_period_days: DEFAULT_HEALTH_PERIOD_DAYS,
            health_weights: HealthWeights::default(),
        }
    }
}

impl EngineConfig {
    /// Load from the default override location, falling back to embedded defaults
    pub fn load() -> Result<Self> {
        load_config(None)
    }

    /// Load from an explicit file
    pub fn from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        load_config(Some(path))
    }

    /// Parse TOML content over the defaults
    pub fn from_toml(content: &str) -> Result<Self> {
        parse_config(content)
    }
}

/// Default config override path
pub fn default_config_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("runway").join("config").join("engine.toml"))
}

/// Load configuration (override first, then default)
fn load_config(override_path: Option<&Path>) -> Result<EngineConfig> {
    let path = override_path
        .map(Path::to_path_buf)
        .or_else(default_config_path)
        .filter(|p| p.exists());

    let content = match path {
        Some(ref path) => {
            debug!(path = %path.display(), "Loading engine config override");
            fs::read_to_string(path)
                .map_err(|e| Error::Config(format!("Failed to read config: {}", e)))?
        }
        None => DEFAULT_CONFIG.to_string(),
    };

    parse_config(&content)
}

/// Raw config structure for TOML parsing
#[derive(Debug, Deserialize)]
struct RawConfig {
    balance: Option<RawBalance>,
    ledger: Option<RawLedger>,
    schedules: Option<RawSchedules>,
    health: Option<RawHealth>,
}

#[derive(Debug, Deserialize)]
struct RawBalance {
    warning_threshold: Option<f64>,
    coverage_days: Option<i64>,
    runway_days: Option<i64>,
    crunch_days: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct RawLedger {
    remainder_offset_days: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct RawSchedules {
    amortization_max_months: Option<u32>,
    credit_max_months: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct RawHealth {
    period_days: Option<i64>,
    weights: Option<RawWeights>,
}

#[derive(Debug, Deserialize)]
struct RawWeights {
    runway: Option<f64>,
    savings: Option<f64>,
    bills: Option<f64>,
    trend: Option<f64>,
}

/// Parse config from TOML content
fn parse_config(content: &str) -> Result<EngineConfig> {
    let raw: RawConfig = toml::from_str(content)
        .map_err(|e| Error::Config(format!("Invalid config TOML: {}", e)))?;

    let mut config = EngineConfig::default();

    if let Some(balance) = raw.balance {
        if let Some(threshold) = balance.warning_threshold {
            config.warning_threshold = threshold;
        }
        if let Some(days) = balance.coverage_days {
            config.coverage_days = days;
        }
        if let Some(days) = balance.runway_days {
            config.runway_days = days;
        }
        if let Some(days) = balance.crunch_days {
            config.crunch_days = days;
        }
    }

    if let Some(ledger) = raw.ledger {
        if let Some(days) = ledger.remainder_offset_days {
            config.remainder_offset_days = days;
        }
    }

    if let Some(schedules) = raw.schedules {
        if let Some(months) = schedules.amortization_max_months {
            config.amortization_max_months = months;
        }
        if let Some(months) = schedules.credit_max_months {
            config.credit_max_months = months;
        }
    }

    if let Some(health) = raw.health {
        if let Some(days) = health.period_days {
            config.health_period_days = days;
        }
        if let Some(weights) = health.weights {
            let w = &mut config.health_weights;
            w.runway = weights.runway.unwrap_or(w.runway);
            w.savings = weights.savings.unwrap_or(w.savings);
            w.bills = weights.bills.unwrap_or(w.bills);
            w.trend = weights.trend.unwrap_or(w.trend);
        }
    }

    validate(&config)?;
    Ok(config)
}

fn validate(config: &EngineConfig) -> Result<()> {
    let windows = [
        ("coverage_days", config.coverage_days),
        ("runway_days", config.runway_days),
        ("crunch_days", config.crunch_days),
        ("period_days", config.health_period_days),
    ];
    if let Some((name, _)) = windows
        .iter()
        .find(|(_, days)| !(1..=MAX_WINDOW_DAYS).contains(days))
    {
        return Err(Error::Config(format!(
            "{} must be between 1 and {}",
            name, MAX_WINDOW_DAYS
        )));
    }
    if !(0..=MAX_WINDOW_DAYS).contains(&config.remainder_offset_days) {
        return Err(Error::Config(format!(
            "remainder_offset_days must be between 0 and {}",
            MAX_WINDOW_DAYS
        )));
    }
    if config.health_weights.total() <= 0.0 {
        return Err(Error::Config("Health weights must sum to more than 0".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_default_config() {
        let config = parse_config(DEFAULT_CONFIG).unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_partial_override_keeps_defaults() {
        let config = EngineConfig::from_toml(
            r#"
            [balance]
            warning_threshold = 250.0

            [health.weights]
            trend = 0.5
            "#,
        )
        .unwrap();
        assert_eq!(config.warning_threshold, 250.0);
        assert_eq!(config.coverage_days, 14);
        assert_eq!(config.health_weights.trend, 0.5);
        assert_eq!(config.health_weights.runway, 0.3);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(EngineConfig::from_toml("[balance]\nrunway_days = 0").is_err());
        assert!(EngineConfig::from_toml("[balance]\ncrunch_days = 36501").is_err());
        assert!(EngineConfig::from_toml("[balance]\ncrunch_days = 36500").is_ok());
        assert!(EngineConfig::from_toml("[ledger]\nremainder_offset_days = -2").is_err());
        assert!(EngineConfig::from_toml("not toml at all [").is_err());
    }

    #[test]
    fn test_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.toml");
        fs::write(&path, "[ledger]\nremainder_offset_days = 3\n").unwrap();

        let config = EngineConfig::from_path(&path).unwrap();
        assert_eq!(config.remainder_offset_days, 3);

        let missing = dir.path().join("missing.toml");
        assert!(EngineConfig::from_path(&missing).is_err());
    }
}
