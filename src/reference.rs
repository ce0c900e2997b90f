//! Reference tables bundle: countries, growth rates, GDP, fitted loss models
//! and the building tables of the semi-empirical model.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::country::{CountryRecord, CountryRegistry};
use crate::gdp::GdpTable;
use crate::growth::{GrowthSeries, PopulationGrowth};
use crate::models::emploss::{EmpiricalLoss, LossModel};
use crate::models::semimodel::SemiTables;

/// Fitted models of one loss type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSet {
    #[serde(rename = "type")]
    pub loss_type: String,
    #[serde(default)]
    pub models: Vec<LossModel>,
}

impl ModelSet {
    pub fn build(&self) -> crate::error::Result<EmpiricalLoss> {
        EmpiricalLoss::new(self.models.clone(), &self.loss_type)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceData {
    #[serde(default)]
    pub countries: Vec<CountryRecord>,
    /// Growth intervals keyed by numeric country code.
    #[serde(default)]
    pub growth: BTreeMap<u32, GrowthSeries>,
    /// Per-capita GDP keyed by ISO3 code, then year. Nulls mark missing years.
    #[serde(default)]
    pub gdp: BTreeMap<String, BTreeMap<i32, Option<f64>>>,
    pub fatality: ModelSet,
    pub economic: ModelSet,
    #[serde(default)]
    pub semi: SemiTables,
}

impl ReferenceData {
    /// Load a bundle from YAML, or JSON when the file ends in `.json`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("Failed to read reference data {}", path.display()))?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let reference = if is_json {
            serde_json::from_str(&data)
                .with_context(|| format!("Failed to parse {}", path.display()))?
        } else {
            serde_yaml::from_str(&data)
                .with_context(|| format!("Failed to parse {}", path.display()))?
        };
        Ok(reference)
    }

    pub fn country_registry(&self) -> CountryRegistry {
        CountryRegistry::from_records(self.countries.clone())
    }

    pub fn population_growth(&self, default_rate: f64) -> crate::error::Result<PopulationGrowth> {
        PopulationGrowth::new(self.growth.clone(), default_rate)
    }

    pub fn gdp_table(&self, global_gdp: f64) -> GdpTable {
        let series = self
            .gdp
            .iter()
            .map(|(iso3, years)| {
                let years = years
                    .iter()
                    .map(|(year, value)| (*year, value.unwrap_or(f64::NAN)))
                    .collect();
                (iso3.clone(), years)
            })
            .collect();
        GdpTable::new(series).with_global_gdp(global_gdp)
    }

    pub fn fatality_model(&self) -> crate::error::Result<EmpiricalLoss> {
        self.fatality.build()
    }

    pub fn economic_model(&self) -> crate::error::Result<EmpiricalLoss> {
        self.economic.build()
    }
}
