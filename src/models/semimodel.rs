//! Semi-empirical fatality model.
//!
//! Population is split into residential, non-residential and outdoor shares
//! according to local time of day and urban/rural density, pushed through
//! each country's building inventory, then multiplied by collapse rates and
//! casualty-given-collapse rates per building type.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Datelike, Duration, Timelike, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::country::{CountryRegistry, CALIFORNIA_CCODE, US_CCODE};
use crate::error::{PagerError, Result};
use crate::growth::PopulationGrowth;
use crate::models::HazardGrids;
use crate::spatial::{check_alignment, Grid2D};

/// Intensities with collapse rates: MMI 6.0 to 9.0 in half steps.
pub const COLLAPSE_MMI_STEPS: usize = 7;
const MIN_COLLAPSE_MMI: f64 = 6.0;
const MAX_COLLAPSE_MMI: f64 = 9.0;

/// Codes at or above this (other than California) are regional aggregates
/// whose reference data lives under the USA.
const REGIONAL_CODE_START: u32 = 900;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeOfDay {
    Day,
    Transit,
    Night,
}

impl TimeOfDay {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeOfDay::Day => "day",
            TimeOfDay::Transit => "transit",
            TimeOfDay::Night => "night",
        }
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Urban/rural class of a cell, with the values used in urban grids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Density {
    Rural = 1,
    Urban = 2,
}

impl Density {
    pub fn code(&self) -> u8 {
        *self as u8
    }
}

/// Local time of day, local year and local hour of an event.
///
/// Local time is UTC shifted by one hour per 15 degrees of longitude.
pub fn time_of_day(utc: DateTime<Utc>, lon: f64) -> (TimeOfDay, i32, u32) {
    let offset_us = (lon / 15.0 * 3600.0 * 1e6).round() as i64;
    let local = utc + Duration::microseconds(offset_us);
    let hour = local.hour();
    let tod = match hour {
        0..=5 | 22..=23 => TimeOfDay::Night,
        6..=9 | 17..=21 => TimeOfDay::Transit,
        _ => TimeOfDay::Day,
    };
    (tod, local.year(), hour)
}

/// Workforce composition of a country. Sector fractions are shares of the
/// workforce, not of the population.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Workforce {
    pub total: f64,
    pub agricultural: f64,
    pub industrial: f64,
    pub services: f64,
}

/// Population in residential buildings, non-residential buildings and outdoors.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PopulationSplit {
    pub residential: f64,
    pub non_residential: f64,
    pub outdoor: f64,
}

// Share of the non-working population (base) and of each workforce sector
// found in one setting.
struct SettingFractions {
    base: f64,
    industrial: f64,
    services: f64,
    agricultural: f64,
}

impl SettingFractions {
    const fn new(base: f64, industrial: f64, services: f64, agricultural: f64) -> Self {
        Self {
            base,
            industrial,
            services,
            agricultural,
        }
    }

    fn share(&self, wf: &Workforce) -> f64 {
        let fwf = wf.total;
        let fnwf = 1.0 - fwf;
        self.base * fnwf
            + self.industrial * fwf * wf.industrial
            + self.services * fwf * wf.services
            + self.agricultural * fwf * wf.agricultural
    }
}

struct DistCoefficients {
    residential: SettingFractions,
    // base is the school fraction, only non-zero during the day
    non_residential: SettingFractions,
    outdoor: SettingFractions,
}

const URBAN_DAY: DistCoefficients = DistCoefficients {
    residential: SettingFractions::new(0.40, 0.01, 0.01, 0.01),
    non_residential: SettingFractions::new(0.25, 0.89, 0.89, 0.34),
    outdoor: SettingFractions::new(0.35, 0.1, 0.1, 0.65),
};

const URBAN_TRANSIT: DistCoefficients = DistCoefficients {
    residential: SettingFractions::new(0.75, 0.20, 0.25, 0.45),
    non_residential: SettingFractions::new(0.0, 0.25, 0.25, 0.01),
    outdoor: SettingFractions::new(0.25, 0.55, 0.50, 0.54),
};

const URBAN_NIGHT: DistCoefficients = DistCoefficients {
    residential: SettingFractions::new(0.999, 0.84, 0.89, 0.998),
    non_residential: SettingFractions::new(0.0, 0.15, 0.1, 0.001),
    outdoor: SettingFractions::new(0.001, 0.01, 0.01, 0.001),
};

const RURAL_DAY: DistCoefficients = DistCoefficients {
    residential: SettingFractions::new(0.40, 0.05, 0.05, 0.01),
    non_residential: SettingFractions::new(0.25, 0.85, 0.85, 0.04),
    outdoor: SettingFractions::new(0.35, 0.1, 0.1, 0.95),
};

const RURAL_TRANSIT: DistCoefficients = DistCoefficients {
    residential: SettingFractions::new(0.80, 0.10, 0.15, 0.65),
    non_residential: SettingFractions::new(0.0, 0.20, 0.20, 0.01),
    outdoor: SettingFractions::new(0.20, 0.70, 0.65, 0.34),
};

const RURAL_NIGHT: DistCoefficients = DistCoefficients {
    residential: SettingFractions::new(0.999, 0.89, 0.89, 0.998),
    non_residential: SettingFractions::new(0.0, 0.1, 0.1, 0.001),
    outdoor: SettingFractions::new(0.001, 0.01, 0.01, 0.001),
};

fn coefficients(time: TimeOfDay, density: Density) -> &'static DistCoefficients {
    match (density, time) {
        (Density::Urban, TimeOfDay::Day) => &URBAN_DAY,
        (Density::Urban, TimeOfDay::Transit) => &URBAN_TRANSIT,
        (Density::Urban, TimeOfDay::Night) => &URBAN_NIGHT,
        (Density::Rural, TimeOfDay::Day) => &RURAL_DAY,
        (Density::Rural, TimeOfDay::Transit) => &RURAL_TRANSIT,
        (Density::Rural, TimeOfDay::Night) => &RURAL_NIGHT,
    }
}

/// Split a population into residential, non-residential and outdoor shares.
pub fn pop_dist(
    population: f64,
    workforce: &Workforce,
    time: TimeOfDay,
    density: Density,
) -> PopulationSplit {
    let c = coefficients(time, density);
    PopulationSplit {
        residential: population * c.residential.share(workforce),
        non_residential: population * c.non_residential.share(workforce),
        outdoor: population * c.outdoor.share(workforce),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildingType {
    pub code: String,
    pub short_description: String,
    #[serde(default)]
    pub operational_description: String,
    #[serde(default)]
    pub long_description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptionKind {
    Short,
    Operational,
    Long,
}

/// Fraction of building stock per building code.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Inventory {
    #[serde(default)]
    pub residential: BTreeMap<String, f64>,
    #[serde(default)]
    pub non_residential: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CountryInventories {
    #[serde(default)]
    pub urban: Inventory,
    #[serde(default)]
    pub rural: Inventory,
}

/// Casualty rate given collapse.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CasualtyRate {
    pub day: f64,
    pub night: f64,
}

/// Building reference tables, all keyed by ISO2 country code.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SemiTables {
    #[serde(default)]
    pub building_types: Vec<BuildingType>,
    #[serde(default)]
    pub inventories: BTreeMap<String, CountryInventories>,
    /// Collapse rates per building code at MMI 6.0, 6.5, ... 9.0.
    #[serde(default)]
    pub collapse: BTreeMap<String, BTreeMap<String, [f64; COLLAPSE_MMI_STEPS]>>,
    #[serde(default)]
    pub casualty: BTreeMap<String, BTreeMap<String, CasualtyRate>>,
    #[serde(default)]
    pub workforce: BTreeMap<String, Workforce>,
}

/// Fatalities per building code.
pub type BuildingLosses = BTreeMap<String, f64>;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SemiLosses {
    pub total: u64,
    /// ISO2 country code to residential fatalities per building code.
    pub residential: BTreeMap<String, BuildingLosses>,
    pub non_residential: BTreeMap<String, BuildingLosses>,
}

impl SemiLosses {
    /// Building codes of the most affected country, most fatalities first.
    pub fn most_vulnerable(&self, n: usize) -> Vec<(String, f64)> {
        let mut combined: BTreeMap<&str, BuildingLosses> = BTreeMap::new();
        for by_type in [&self.residential, &self.non_residential] {
            for (ccode, losses) in by_type {
                let entry = combined.entry(ccode.as_str()).or_default();
                for (btype, fatalities) in losses {
                    *entry.entry(btype.clone()).or_insert(0.0) += fatalities;
                }
            }
        }
        let worst = combined.into_values().max_by(|a, b| {
            let (sa, sb): (f64, f64) = (a.values().sum(), b.values().sum());
            sa.total_cmp(&sb)
        });
        let Some(worst) = worst else {
            return Vec::new();
        };
        let mut ranked: Vec<(String, f64)> = worst.into_iter().collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked.truncate(n);
        ranked
    }
}

/// Building code and stock fraction, finite positive entries only.
pub type InventoryRow = Vec<(String, f64)>;

pub struct SemiEmpiricalFatality<'a> {
    tables: &'a SemiTables,
    growth: &'a PopulationGrowth,
    countries: &'a CountryRegistry,
}

impl<'a> SemiEmpiricalFatality<'a> {
    pub fn new(
        tables: &'a SemiTables,
        growth: &'a PopulationGrowth,
        countries: &'a CountryRegistry,
    ) -> Self {
        Self {
            tables,
            growth,
            countries,
        }
    }

    pub fn building_description(&self, code: &str, kind: DescriptionKind) -> Option<&str> {
        let building = self.tables.building_types.iter().find(|b| b.code == code)?;
        let text = match kind {
            DescriptionKind::Short => &building.short_description,
            DescriptionKind::Operational => &building.operational_description,
            DescriptionKind::Long => &building.long_description,
        };
        Some(text.as_str())
    }

    pub fn workforce(&self, iso2: &str) -> Option<&Workforce> {
        self.tables.workforce.get(&iso2.to_ascii_uppercase())
    }

    /// Residential and non-residential inventories. Countries without
    /// inventories get empty rows.
    pub fn inventories(&self, iso2: &str, density: Density) -> (InventoryRow, InventoryRow) {
        let Some(country) = self.tables.inventories.get(&iso2.to_ascii_uppercase()) else {
            return (Vec::new(), Vec::new());
        };
        let inventory = match density {
            Density::Urban => &country.urban,
            Density::Rural => &country.rural,
        };
        let usable = |row: &BTreeMap<String, f64>| -> InventoryRow {
            row.iter()
                .filter(|(_, fraction)| fraction.is_finite() && **fraction > 0.0)
                .map(|(code, fraction)| (code.clone(), *fraction))
                .collect()
        };
        (
            usable(&inventory.residential),
            usable(&inventory.non_residential),
        )
    }

    /// Collapse rates for each inventory building at a half-step MMI between
    /// 6 and 9. Missing buildings (or intensities) give NaN.
    pub fn collapse_rates(&self, iso2: &str, mmi: f64, inventory: &[(String, f64)]) -> Vec<f64> {
        let step = (mmi - MIN_COLLAPSE_MMI) / 0.5;
        let column = (step >= 0.0 && step.fract() == 0.0 && mmi <= MAX_COLLAPSE_MMI)
            .then_some(step as usize);
        let table = self.tables.collapse.get(&iso2.to_ascii_uppercase());
        inventory
            .iter()
            .map(|(code, _)| {
                column
                    .zip(table.and_then(|t| t.get(code)))
                    .map(|(col, rates)| rates[col])
                    .unwrap_or(f64::NAN)
            })
            .collect()
    }

    /// Casualty rates given collapse. Day and transit share the day rate.
    pub fn fatality_rates(
        &self,
        iso2: &str,
        time: TimeOfDay,
        inventory: &[(String, f64)],
    ) -> Vec<f64> {
        let table = self.tables.casualty.get(&iso2.to_ascii_uppercase());
        inventory
            .iter()
            .map(|(code, _)| {
                table
                    .and_then(|t| t.get(code))
                    .map(|rate| match time {
                        TimeOfDay::Day | TimeOfDay::Transit => rate.day,
                        TimeOfDay::Night => rate.night,
                    })
                    .unwrap_or(f64::NAN)
            })
            .collect()
    }

    /// Fatalities by country and building type for an event.
    ///
    /// Requires the urban/rural grid. Population is adjusted from `pop_year`
    /// to the local year of the event before it is distributed.
    pub fn get_losses(
        &self,
        grids: &HazardGrids,
        event_time: DateTime<Utc>,
        lon: f64,
        pop_year: i32,
    ) -> Result<SemiLosses> {
        let urban = grids.urban.as_ref().ok_or(PagerError::MissingGrid("urban"))?;
        check_alignment(&[
            ("mmi", grids.mmi.geodict()),
            ("population", grids.population.geodict()),
            ("country", grids.countries.geodict()),
            ("urban", urban.geodict()),
        ])?;

        let (time, event_year, hour) = time_of_day(event_time, lon);
        debug!(%time, event_year, hour, "local time of event");

        let mmi = grids.mmi.map(round_to_half_step);
        let mut population = grids.population.clone();
        for code in grids.country_codes() {
            self.growth
                .adjust_grid(&mut population, &grids.countries, code, pop_year, event_year);
        }

        let mut losses = SemiLosses::default();
        for code in grids.country_codes() {
            if code == 0 {
                continue;
            }
            let lookup_code = if code >= REGIONAL_CODE_START && code != CALIFORNIA_CCODE {
                US_CCODE
            } else {
                code
            };
            let iso2 = self.countries.iso2_for(lookup_code);
            let Some(workforce) = self.workforce(&iso2) else {
                info!(code, %iso2, "no workforce data, skipping country");
                continue;
            };

            let mut residential = BuildingLosses::new();
            let mut non_residential = BuildingLosses::new();
            for step in 0..COLLAPSE_MMI_STEPS {
                let level = MIN_COLLAPSE_MMI + 0.5 * step as f64;
                for density in [Density::Urban, Density::Rural] {
                    let cells = select_cells(
                        &mmi,
                        &population,
                        &grids.countries,
                        urban,
                        level,
                        code,
                        density,
                    );
                    let splits: Vec<PopulationSplit> = cells
                        .iter()
                        .map(|&pop| pop_dist(pop, workforce, time, density))
                        .collect();
                    let (res_inv, nonres_inv) = self.inventories(&iso2, density);
                    self.accumulate(
                        &mut residential,
                        &iso2,
                        level,
                        time,
                        &res_inv,
                        splits.iter().map(|s| s.residential),
                    );
                    self.accumulate(
                        &mut non_residential,
                        &iso2,
                        level,
                        time,
                        &nonres_inv,
                        splits.iter().map(|s| s.non_residential),
                    );
                }
            }

            let country_total: f64 =
                residential.values().sum::<f64>() + non_residential.values().sum::<f64>();
            losses.total += country_total.trunc() as u64;
            merge_into(losses.residential.entry(iso2.clone()).or_default(), residential);
            merge_into(losses.non_residential.entry(iso2).or_default(), non_residential);
        }
        Ok(losses)
    }

    /// Push per-cell populations through an inventory, collapse rates and
    /// casualty rates, adding the per-building fatalities to `sums`.
    /// Per-cell estimates below one are dropped.
    fn accumulate(
        &self,
        sums: &mut BuildingLosses,
        iso2: &str,
        mmi: f64,
        time: TimeOfDay,
        inventory: &[(String, f64)],
        populations: impl Iterator<Item = f64> + Clone,
    ) {
        let collapse = self.collapse_rates(iso2, mmi, inventory);
        let casualty = self.fatality_rates(iso2, time, inventory);
        let rates = collapse.into_iter().zip(casualty);
        for ((code, fraction), (collapse, casualty)) in inventory.iter().zip(rates) {
            let fatalities: f64 = populations
                .clone()
                .map(|pop| pop * fraction * collapse * casualty)
                .filter(|f| *f >= 1.0)
                .sum();
            *sums.entry(code.clone()).or_insert(0.0) += fatalities;
        }
    }
}

// nearest half step, ties to even; intensities above 9 count as 9
fn round_to_half_step(mmi: f64) -> f64 {
    let rounded = (mmi / 0.5).round_ties_even() * 0.5;
    if rounded > MAX_COLLAPSE_MMI {
        MAX_COLLAPSE_MMI
    } else {
        rounded
    }
}

fn select_cells(
    mmi: &Grid2D<f64>,
    population: &Grid2D<f64>,
    countries: &Grid2D<u32>,
    urban: &Grid2D<u8>,
    level: f64,
    code: u32,
    density: Density,
) -> Vec<f64> {
    mmi.data()
        .iter()
        .zip(population.data())
        .zip(countries.data())
        .zip(urban.data())
        .filter(|(((m, _), c), u)| **m == level && **c == code && **u == density.code())
        .map(|(((_, pop), _), _)| *pop)
        .collect()
}

fn merge_into(target: &mut BuildingLosses, source: BuildingLosses) {
    for (btype, fatalities) in source {
        *target.entry(btype).or_insert(0.0) += fatalities;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::country::tests::registry;
    use crate::growth::tests::growth;
    use crate::spatial::GeoDict;
    use approx::assert_relative_eq;
    use chrono::TimeZone;

    fn workforce() -> Workforce {
        Workforce {
            total: 0.5,
            agricultural: 0.5,
            industrial: 0.25,
            services: 0.25,
        }
    }

    fn rates(
        values: &[(&str, [f64; COLLAPSE_MMI_STEPS])],
    ) -> BTreeMap<String, [f64; COLLAPSE_MMI_STEPS]> {
        values.iter().map(|(c, r)| (c.to_string(), *r)).collect()
    }

    fn tables() -> SemiTables {
        let fractions = |values: &[(&str, f64)]| -> BTreeMap<String, f64> {
            values.iter().map(|(c, f)| (c.to_string(), *f)).collect()
        };
        let inventories = CountryInventories {
            urban: Inventory {
                residential: fractions(&[("A", 0.5), ("C", 0.3), ("W", 0.2), ("UFB", f64::NAN)]),
                non_residential: fractions(&[("C", 0.6), ("S", 0.4), ("RM", 0.0)]),
            },
            rural: Inventory {
                residential: fractions(&[("A", 0.8), ("W", 0.2)]),
                non_residential: fractions(&[("A", 0.5), ("C", 0.5)]),
            },
        };
        let collapse = rates(&[
            ("A", [0.01, 0.02, 0.04, 0.08, 0.12, 0.18, 0.25]),
            ("C", [0.001, 0.002, 0.005, 0.01, 0.02, 0.04, 0.08]),
            ("W", [0.0005, 0.001, 0.002, 0.004, 0.008, 0.016, 0.03]),
            ("S", [0.002, 0.004, 0.008, 0.015, 0.03, 0.05, 0.1]),
        ]);
        let casualty: BTreeMap<String, CasualtyRate> = [
            ("A", 0.1, 0.2),
            ("C", 0.15, 0.3),
            ("W", 0.05, 0.1),
            ("S", 0.2, 0.4),
        ]
        .iter()
        .map(|(c, day, night)| {
            (
                c.to_string(),
                CasualtyRate {
                    day: *day,
                    night: *night,
                },
            )
        })
        .collect();
        SemiTables {
            building_types: vec![BuildingType {
                code: "A".into(),
                short_description: "adobe block".into(),
                operational_description: "adobe block".into(),
                long_description: "Adobe block (unbaked dried mud block) walls".into(),
            }],
            inventories: BTreeMap::from([("AF".to_string(), inventories)]),
            collapse: BTreeMap::from([("AF".to_string(), collapse)]),
            casualty: BTreeMap::from([("AF".to_string(), casualty)]),
            workforce: BTreeMap::from([("AF".to_string(), workforce())]),
        }
    }

    fn scenario_grids(codes: [u32; 4]) -> HazardGrids {
        let geodict = GeoDict::new(69.0, 34.0, 0.5, 0.5, 2, 2);
        let mmi = Grid2D::new(geodict, vec![8.0, 7.6, 6.2, 9.8]).unwrap();
        let population =
            Grid2D::new(geodict, vec![100_000.0, 50_000.0, 20_000.0, 80_000.0]).unwrap();
        let countries = Grid2D::new(geodict, codes.to_vec()).unwrap();
        let urban = Grid2D::new(geodict, vec![2, 2, 1, 1]).unwrap();
        HazardGrids::new(mmi, population, countries).with_urban(urban)
    }

    fn daytime() -> DateTime<Utc> {
        // 10:36 local time at 69E
        Utc.with_ymd_and_hms(2016, 6, 3, 6, 0, 0).unwrap()
    }

    #[test]
    fn test_time_of_day() {
        let lon = -117.6981;
        let cases = [
            ((2016, 6, 3, 16, 39), TimeOfDay::Transit, 2016, 8),
            ((2016, 6, 3, 19, 39), TimeOfDay::Day, 2016, 11),
            ((2016, 6, 4, 7, 39), TimeOfDay::Night, 2016, 23),
            ((2017, 1, 1, 1, 0), TimeOfDay::Transit, 2016, 17),
        ];
        for ((y, mo, d, h, mi), tod, year, hour) in cases {
            let utc = Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap();
            assert_eq!(time_of_day(utc, lon), (tod, year, hour));
        }
        // hour 5 is night, not morning transit
        let early = Utc.with_ymd_and_hms(2016, 6, 3, 5, 30, 0).unwrap();
        assert_eq!(time_of_day(early, 0.0).0, TimeOfDay::Night);
    }

    #[test]
    fn test_pop_dist_every_setting() {
        // residential, non-residential, outdoor for 2000 people
        let cases = [
            (Density::Urban, TimeOfDay::Day, [410.0, 865.0, 725.0]),
            (Density::Urban, TimeOfDay::Transit, [1087.5, 130.0, 782.5]),
            (Density::Urban, TimeOfDay::Night, [1930.5, 63.0, 6.5]),
            (Density::Rural, TimeOfDay::Day, [430.0, 695.0, 875.0]),
            (Density::Rural, TimeOfDay::Transit, [1187.5, 105.0, 707.5]),
            (Density::Rural, TimeOfDay::Night, [1943.0, 50.5, 6.5]),
        ];
        for (density, time, [res, nonres, outdoor]) in cases {
            let split = pop_dist(2000.0, &workforce(), time, density);
            assert_relative_eq!(split.residential, res, max_relative = 1e-12);
            assert_relative_eq!(split.non_residential, nonres, max_relative = 1e-12);
            assert_relative_eq!(split.outdoor, outdoor, max_relative = 1e-12);
        }
    }

    #[test]
    fn test_pop_dist_shares_sum_to_population_at_night() {
        let wf = Workforce {
            total: 0.0,
            agricultural: 0.0,
            industrial: 0.0,
            services: 0.0,
        };
        for density in [Density::Urban, Density::Rural] {
            let split = pop_dist(1000.0, &wf, TimeOfDay::Night, density);
            assert_relative_eq!(split.residential, 999.0, max_relative = 1e-12);
            assert_eq!(split.non_residential, 0.0);
            assert_relative_eq!(split.outdoor, 1.0, max_relative = 1e-9);
        }
    }

    #[test]
    fn test_inventories_drop_missing_and_zero_entries() {
        let (tables, growth, countries) = (tables(), growth(), registry());
        let model = SemiEmpiricalFatality::new(&tables, &growth, &countries);
        let (res, nonres) = model.inventories("af", Density::Urban);
        let codes: Vec<&str> = res.iter().map(|(c, _)| c.as_str()).collect();
        assert_eq!(codes, ["A", "C", "W"]);
        assert_eq!(nonres.len(), 2);
        let (res, nonres) = model.inventories("CN", Density::Rural);
        assert!(res.is_empty() && nonres.is_empty());
    }

    #[test]
    fn test_collapse_and_fatality_rates() {
        let (tables, growth, countries) = (tables(), growth(), registry());
        let model = SemiEmpiricalFatality::new(&tables, &growth, &countries);
        let inventory = vec![("A".to_string(), 0.5), ("X".to_string(), 0.5)];
        let collapse = model.collapse_rates("AF", 7.5, &inventory);
        assert_eq!(collapse[0], 0.08);
        assert!(collapse[1].is_nan());
        assert!(model.collapse_rates("AF", 5.5, &inventory)[0].is_nan());
        assert_eq!(model.fatality_rates("AF", TimeOfDay::Transit, &inventory)[0], 0.1);
        assert_eq!(model.fatality_rates("AF", TimeOfDay::Night, &inventory)[0], 0.2);
        assert!(model.fatality_rates("CN", TimeOfDay::Day, &inventory)[0].is_nan());
    }

    #[test]
    fn test_building_descriptions() {
        let (tables, growth, countries) = (tables(), growth(), registry());
        let model = SemiEmpiricalFatality::new(&tables, &growth, &countries);
        assert_eq!(
            model.building_description("A", DescriptionKind::Short),
            Some("adobe block")
        );
        assert_eq!(
            model.building_description("A", DescriptionKind::Long),
            Some("Adobe block (unbaked dried mud block) walls")
        );
        assert_eq!(model.building_description("ZZ", DescriptionKind::Short), None);
    }

    #[test]
    fn test_half_step_rounding() {
        assert_eq!(round_to_half_step(7.6), 7.5);
        assert_eq!(round_to_half_step(5.24), 5.0);
        assert_eq!(round_to_half_step(6.25), 6.0);
        assert_eq!(round_to_half_step(9.8), 9.0);
        assert!(round_to_half_step(f64::NAN).is_nan());
    }

    #[test]
    fn test_two_by_two_regression() {
        let (tables, growth, countries) = (tables(), growth(), registry());
        let model = SemiEmpiricalFatality::new(&tables, &growth, &countries);
        let losses = model
            .get_losses(&scenario_grids([4, 4, 4, 4]), daytime(), 69.0, 2016)
            .unwrap();
        assert_eq!(losses.total, 1286);
        let res = &losses.residential["AF"];
        assert_relative_eq!(res["A"], 511.44, max_relative = 1e-9);
        assert_relative_eq!(res["C"], 23.0625, max_relative = 1e-9);
        assert_relative_eq!(res["W"], 6.8, max_relative = 1e-9);
        let nonres = &losses.non_residential["AF"];
        assert_relative_eq!(nonres["A"], 350.975, max_relative = 1e-9);
        assert_relative_eq!(nonres["S"], 129.75, max_relative = 1e-9);

        let ranked = losses.most_vulnerable(2);
        assert_eq!(ranked[0].0, "A");
        assert_eq!(ranked[1].0, "C");
        assert_eq!(ranked.len(), 2);
    }

    #[test]
    fn test_countries_without_workforce_are_skipped() {
        let (tables, growth, countries) = (tables(), growth(), registry());
        let model = SemiEmpiricalFatality::new(&tables, &growth, &countries);
        let losses = model
            .get_losses(&scenario_grids([156, 156, 0, 0]), daytime(), 69.0, 2016)
            .unwrap();
        assert_eq!(losses.total, 0);
        assert!(losses.residential.is_empty());
        assert!(losses.most_vulnerable(3).is_empty());
    }

    #[test]
    fn test_regional_codes_use_usa_tables() {
        let mut tables = tables();
        let af_inventories = tables.inventories["AF"].clone();
        tables.inventories.insert("US".into(), af_inventories);
        let af_collapse = tables.collapse["AF"].clone();
        tables.collapse.insert("US".into(), af_collapse);
        let af_casualty = tables.casualty["AF"].clone();
        tables.casualty.insert("US".into(), af_casualty);
        tables.workforce.insert("US".into(), workforce());
        let (growth, countries) = (growth(), registry());
        let model = SemiEmpiricalFatality::new(&tables, &growth, &countries);

        // Eastern US, Western US, California
        let geodict = GeoDict::new(-120.0, 35.0, 0.5, 0.5, 3, 1);
        let grids = HazardGrids::new(
            Grid2D::filled(geodict, 8.0),
            Grid2D::filled(geodict, 100_000.0),
            Grid2D::new(geodict, vec![903, 904, 902]).unwrap(),
        )
        .with_urban(Grid2D::filled(geodict, Density::Urban.code()));
        let losses = model.get_losses(&grids, daytime(), 69.0, 2016).unwrap();

        // one cell is 123 + 18.45 + 1.64 + 77.85 + 103.8 = 324.74 fatalities;
        // California has no tables of its own, so it adds nothing
        assert_eq!(losses.total, 648);
        assert!(!losses.residential.contains_key("XF"));
        assert!(!losses.residential.contains_key("EU"));
        let res = &losses.residential["US"];
        assert_relative_eq!(res["A"], 246.0, max_relative = 1e-9);
        assert_relative_eq!(res["C"], 36.9, max_relative = 1e-9);
        assert_relative_eq!(res["W"], 3.28, max_relative = 1e-9);
        let nonres = &losses.non_residential["US"];
        assert_relative_eq!(nonres["C"], 155.7, max_relative = 1e-9);
        assert_relative_eq!(nonres["S"], 207.6, max_relative = 1e-9);
    }

    #[test]
    fn test_urban_grid_required() {
        let (tables, growth, countries) = (tables(), growth(), registry());
        let model = SemiEmpiricalFatality::new(&tables, &growth, &countries);
        let mut grids = scenario_grids([4, 4, 4, 4]);
        grids.urban = None;
        let err = model.get_losses(&grids, daytime(), 69.0, 2016).unwrap_err();
        assert!(matches!(err, PagerError::MissingGrid("urban")));
    }
}
