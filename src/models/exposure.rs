//! Population and economic exposure to shaking, per country and MMI bin.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::country::{CountryRegistry, UNKNOWN_ISO2};
use crate::error::{PagerError, Result};
use crate::gdp::GdpTable;
use crate::growth::PopulationGrowth;
use crate::models::emploss::EmpiricalLoss;
use crate::models::{HazardGrids, MMI_BINS};
use crate::spatial::Grid2D;

/// Minimum population exposed at an intensity for it to count as the maximum
/// MMI of an event.
pub const MIN_EXPOSED_FOR_MAX_MMI: f64 = 1000.0;

/// How far the event year may run ahead of the population data year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StalenessPolicy {
    /// Gaps longer than this many years log a warning.
    pub warning_years: i32,
    /// Gaps longer than this many years are rejected.
    pub error_years: i32,
}

impl Default for StalenessPolicy {
    fn default() -> Self {
        Self {
            warning_years: 10,
            error_years: 20,
        }
    }
}

impl StalenessPolicy {
    pub fn check(&self, pop_year: i32, event_year: i32) -> Result<()> {
        let gap = event_year - pop_year;
        if gap > self.error_years {
            return Err(PagerError::StaleData {
                years: gap,
                limit: self.error_years,
            });
        }
        if gap > self.warning_years {
            warn!(
                pop_year,
                event_year,
                "event year is more than {} years after the population data; \
                 results may not be valid",
                self.warning_years
            );
        }
        Ok(())
    }
}

/// Population (or dollars) exposed to MMI 1-10, per ISO2 country code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exposure {
    pub by_country: BTreeMap<String, [f64; MMI_BINS]>,
    pub total: [f64; MMI_BINS],
    /// Highest MMI along any edge of the shaking grid.
    pub maximum_border_mmi: f64,
}

impl Exposure {
    /// Exposure for a shaking grid that misses the population data entirely.
    pub fn unknown_only() -> Self {
        let mut by_country = BTreeMap::new();
        by_country.insert(UNKNOWN_ISO2.to_string(), [0.0; MMI_BINS]);
        Self {
            by_country,
            total: [0.0; MMI_BINS],
            maximum_border_mmi: 0.0,
        }
    }

    fn from_countries(by_country: BTreeMap<String, [f64; MMI_BINS]>, border_mmi: f64) -> Self {
        let mut total = [0.0; MMI_BINS];
        for bins in by_country.values() {
            for (t, v) in total.iter_mut().zip(bins) {
                *t += v;
            }
        }
        Self {
            by_country,
            total,
            maximum_border_mmi: border_mmi,
        }
    }

    pub fn country(&self, iso2: &str) -> Option<&[f64; MMI_BINS]> {
        self.by_country.get(&iso2.to_ascii_uppercase())
    }

    /// Highest MMI with at least `min_exposed` people exposed, or 0.
    pub fn max_mmi(&self, min_exposed: f64) -> u8 {
        (0..MMI_BINS)
            .rev()
            .find(|&i| self.total[i] >= min_exposed)
            .map(|i| (i + 1) as u8)
            .unwrap_or(0)
    }
}

/// Economic exposure plus the population grid weighted by GDP and alpha.
#[derive(Debug, Clone)]
pub struct EconExposure {
    pub exposure: Exposure,
    pub weighted_population: Grid2D<f64>,
}

/// Sum population into the MMI bins [i-0.5, i+0.5) for i in 1..=10, per
/// numeric country code. NaN population cells are ignored and each bin is
/// truncated to a whole number of people.
pub fn calc_exposure(
    mmi: &Grid2D<f64>,
    population: &Grid2D<f64>,
    countries: &Grid2D<u32>,
) -> BTreeMap<u32, [f64; MMI_BINS]> {
    let mut sums: BTreeMap<u32, [f64; MMI_BINS]> = BTreeMap::new();
    let cells = mmi
        .data()
        .iter()
        .zip(population.data())
        .zip(countries.data());
    for ((&intensity, &pop), &code) in cells {
        let bins = sums.entry(code).or_insert([0.0; MMI_BINS]);
        if pop.is_nan() {
            continue;
        }
        if let Some(idx) = mmi_bin(intensity) {
            bins[idx] += pop;
        }
    }
    for bins in sums.values_mut() {
        for value in bins.iter_mut() {
            *value = value.trunc();
        }
    }
    sums
}

/// Bin index for an intensity, or `None` outside [0.5, 10.5).
fn mmi_bin(intensity: f64) -> Option<usize> {
    (1..=MMI_BINS).find_map(|mmi| {
        let centre = mmi as f64;
        (intensity >= centre - 0.5 && intensity < centre + 0.5).then_some(mmi - 1)
    })
}

/// The population data year closest to the event year (earliest on ties).
pub fn nearest_population_year(event_year: i32, years: &[i32]) -> Option<i32> {
    let mut best: Option<i32> = None;
    for &year in years {
        match best {
            Some(b) if (year - event_year).abs() >= (b - event_year).abs() => {}
            _ => best = Some(year),
        }
    }
    best
}

pub struct ExposureCalculator<'a> {
    growth: &'a PopulationGrowth,
    countries: &'a CountryRegistry,
    pop_year: i32,
    policy: StalenessPolicy,
}

impl<'a> ExposureCalculator<'a> {
    pub fn new(
        growth: &'a PopulationGrowth,
        countries: &'a CountryRegistry,
        pop_year: i32,
    ) -> Self {
        Self {
            growth,
            countries,
            pop_year,
            policy: StalenessPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: StalenessPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn pop_year(&self) -> i32 {
        self.pop_year
    }

    /// Population exposure per ISO2 country, adjusted to the event year.
    pub fn calc_exposure(&self, grids: &HazardGrids, event_year: i32) -> Result<Exposure> {
        self.exposure_and_population(grids, event_year)
            .map(|(exposure, _)| exposure)
    }

    /// Exposure weighted by per-capita GDP and each country's alpha factor.
    pub fn calc_econ_exposure(
        &self,
        grids: &HazardGrids,
        event_year: i32,
        econ_model: &EmpiricalLoss,
        gdp: &GdpTable,
    ) -> Result<EconExposure> {
        let (exposure, mut weighted) = self.exposure_and_population(grids, event_year)?;
        let mut econ = BTreeMap::new();
        for (iso2, bins) in &exposure.by_country {
            if iso2 == UNKNOWN_ISO2 {
                continue;
            }
            let alpha = econ_model.model(iso2).alpha.unwrap_or(1.0);
            let per_capita = gdp.gdp(self.countries, iso2, event_year).gdp;
            let factor = per_capita * alpha;
            econ.insert(iso2.clone(), bins.map(|v| v * factor));

            let code = self.countries.lookup(iso2.as_str()).numeric_code;
            for (pop, cell_code) in weighted.data_mut().iter_mut().zip(grids.countries.data()) {
                if *cell_code == code {
                    *pop *= factor;
                }
            }
        }
        Ok(EconExposure {
            exposure: Exposure::from_countries(econ, exposure.maximum_border_mmi),
            weighted_population: weighted,
        })
    }

    /// Exposure together with the growth-adjusted population grid.
    pub fn exposure_and_population(
        &self,
        grids: &HazardGrids,
        event_year: i32,
    ) -> Result<(Exposure, Grid2D<f64>)> {
        if !grids.population.geodict().intersects(grids.mmi.geodict()) {
            return Ok((Exposure::unknown_only(), grids.population.clone()));
        }
        grids.check_alignment()?;
        self.policy.check(self.pop_year, event_year)?;

        let mut population = grids.population.clone();
        for code in grids.country_codes() {
            self.growth
                .adjust_grid(&mut population, &grids.countries, code, self.pop_year, event_year);
        }

        let mut by_country: BTreeMap<String, [f64; MMI_BINS]> = BTreeMap::new();
        for (code, bins) in calc_exposure(&grids.mmi, &population, &grids.countries) {
            let iso2 = self.countries.iso2_for(code);
            let entry = by_country.entry(iso2).or_insert([0.0; MMI_BINS]);
            for (e, v) in entry.iter_mut().zip(bins) {
                *e += v;
            }
        }

        let border_mmi = grids
            .mmi
            .border_values()
            .into_iter()
            .filter(|v| !v.is_nan())
            .fold(0.0_f64, f64::max);

        Ok((Exposure::from_countries(by_country, border_mmi), population))
    }
}
