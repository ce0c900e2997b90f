use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Datelike, Utc};
use serde::Deserialize;

use crate::models::exposure::nearest_population_year;
use crate::models::HazardGrids;
use crate::spatial::{GeoDict, Grid2D};

fn default_reference() -> PathBuf {
    PathBuf::from("data/reference.yaml")
}

/// Origin of the earthquake.
#[derive(Debug, Clone, Deserialize)]
pub struct EventInfo {
    pub time: DateTime<Utc>,
    pub lon: f64,
    pub lat: f64,
    #[serde(default)]
    pub depth: Option<f64>,
    #[serde(default)]
    pub magnitude: Option<f64>,
}

impl EventInfo {
    pub fn year(&self) -> i32 {
        self.time.year()
    }
}

/// South-west cell centre, resolution and shape of the scenario grids.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct GridFrame {
    pub xmin: f64,
    pub ymin: f64,
    pub dx: f64,
    pub dy: f64,
    pub nx: usize,
    pub ny: usize,
}

impl From<GridFrame> for GeoDict {
    fn from(frame: GridFrame) -> Self {
        GeoDict::new(frame.xmin, frame.ymin, frame.dx, frame.dy, frame.nx, frame.ny)
    }
}

/// An event with its input grids written inline, rows north to south.
#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    pub name: String,
    pub description: Option<String>,
    pub event: EventInfo,
    /// Year the population grid was collected.
    #[serde(default)]
    pub population_year: Option<i32>,
    /// Years with population data; the closest to the event is used when
    /// `population_year` is not given.
    #[serde(default)]
    pub population_years: Vec<i32>,
    #[serde(default = "default_reference")]
    pub reference: PathBuf,
    pub grid: GridFrame,
    pub mmi: Vec<Vec<f64>>,
    /// Missing cells are written as `.nan`.
    pub population: Vec<Vec<f64>>,
    pub countries: Vec<Vec<u32>>,
    #[serde(default)]
    pub urban: Option<Vec<Vec<u8>>>,
}

pub struct ScenarioLoader {
    base_dir: PathBuf,
}

impl ScenarioLoader {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    pub fn load(&self, file: impl AsRef<Path>) -> Result<Scenario> {
        let path = self.base_dir.join(file);
        let data = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read scenario file {}", path.display()))?;
        let scenario: Scenario = serde_yaml::from_str(&data)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(scenario)
    }

    /// The scenario's reference bundle, relative to the loader's base directory.
    pub fn reference_path(&self, scenario: &Scenario) -> PathBuf {
        self.base_dir.join(&scenario.reference)
    }
}

impl Scenario {
    pub fn build_grids(&self) -> Result<HazardGrids> {
        let geodict = GeoDict::from(self.grid);
        let mmi = Grid2D::from_rows(geodict, &self.mmi).context("mmi grid")?;
        let population = Grid2D::from_rows(geodict, &self.population).context("population grid")?;
        let countries = Grid2D::from_rows(geodict, &self.countries).context("country grid")?;
        let mut grids = HazardGrids::new(mmi, population, countries);
        if let Some(urban) = &self.urban {
            grids = grids.with_urban(Grid2D::from_rows(geodict, urban).context("urban grid")?);
        }
        Ok(grids)
    }

    /// Population data year: the explicit one, or the nearest available.
    pub fn population_year(&self) -> Result<i32> {
        if let Some(year) = self.population_year {
            return Ok(year);
        }
        nearest_population_year(self.event.year(), &self.population_years).ok_or_else(|| {
            anyhow!(
                "scenario '{}' gives neither population_year nor population_years",
                self.name
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENARIO: &str = r#"
name: tiny
event: {time: "2016-06-03T06:00:00Z", lon: 69.0, lat: 34.5}
population_years: [2010, 2015, 2020]
grid: {xmin: 69.0, ymin: 34.0, dx: 0.5, dy: 0.5, nx: 2, ny: 2}
mmi: [[8.0, 7.6], [6.2, 9.8]]
population: [[100000, .nan], [20000, 80000]]
countries: [[4, 4], [4, 0]]
"#;

    #[test]
    fn test_scenario_grids() {
        let scenario: Scenario = serde_yaml::from_str(SCENARIO).unwrap();
        let grids = scenario.build_grids().unwrap();
        assert_eq!(grids.mmi.get(1, 1), Some(9.8));
        assert!(grids.population.get(0, 1).unwrap().is_nan());
        assert_eq!(grids.country_codes(), vec![0, 4]);
        assert!(grids.urban.is_none());
        assert_eq!(scenario.reference, PathBuf::from("data/reference.yaml"));
    }

    #[test]
    fn test_population_year_falls_back_to_nearest() {
        let mut scenario: Scenario = serde_yaml::from_str(SCENARIO).unwrap();
        assert_eq!(scenario.population_year().unwrap(), 2015);
        scenario.population_year = Some(2012);
        assert_eq!(scenario.population_year().unwrap(), 2012);
        scenario.population_year = None;
        scenario.population_years.clear();
        assert!(scenario.population_year().is_err());
    }

    #[test]
    fn test_ragged_rows_rejected() {
        let mut scenario: Scenario = serde_yaml::from_str(SCENARIO).unwrap();
        scenario.mmi[1].pop();
        assert!(scenario.build_grids().is_err());
    }
}
