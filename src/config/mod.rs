//! Runtime configuration: logging, growth and exposure policy, GDP fallback

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::gdp::GLOBAL_GDP;
use crate::growth::DEFAULT_RATE;
use crate::models::exposure::{StalenessPolicy, MIN_EXPOSED_FOR_MAX_MMI};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub growth: GrowthConfig,
    #[serde(default)]
    pub exposure: ExposureConfig,
    #[serde(default)]
    pub economic: EconomicConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrowthConfig {
    /// Annual rate for countries without growth data.
    #[serde(default = "default_growth_rate")]
    pub default_rate: f64,
}

fn default_growth_rate() -> f64 {
    DEFAULT_RATE
}

impl Default for GrowthConfig {
    fn default() -> Self {
        Self {
            default_rate: default_growth_rate(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExposureConfig {
    #[serde(default = "default_warning_years")]
    pub warning_years: i32,
    #[serde(default = "default_error_years")]
    pub error_years: i32,
    #[serde(default = "default_min_exposed")]
    pub min_exposed_for_max_mmi: f64,
}

fn default_warning_years() -> i32 {
    StalenessPolicy::default().warning_years
}

fn default_error_years() -> i32 {
    StalenessPolicy::default().error_years
}

fn default_min_exposed() -> f64 {
    MIN_EXPOSED_FOR_MAX_MMI
}

impl Default for ExposureConfig {
    fn default() -> Self {
        Self {
            warning_years: default_warning_years(),
            error_years: default_error_years(),
            min_exposed_for_max_mmi: default_min_exposed(),
        }
    }
}

impl ExposureConfig {
    pub fn staleness(&self) -> StalenessPolicy {
        StalenessPolicy {
            warning_years: self.warning_years,
            error_years: self.error_years,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EconomicConfig {
    /// Per-capita GDP (USD) used when a country has no GDP data.
    #[serde(default = "default_global_gdp")]
    pub global_gdp: f64,
}

fn default_global_gdp() -> f64 {
    GLOBAL_GDP
}

impl Default for EconomicConfig {
    fn default() -> Self {
        Self {
            global_gdp: default_global_gdp(),
        }
    }
}

impl Config {
    /// Load configuration from YAML file
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(config)
    }

    /// Save configuration to YAML file
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let yaml = serde_yaml::to_string(self)?;
        fs::write(path, yaml).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }
}
