//! Population growth rates per country and year-by-year population adjustment.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::country::us_code;
use crate::error::{PagerError, Result};
use crate::spatial::Grid2D;

/// Global mean growth rate used for countries without UN data.
pub const DEFAULT_RATE: f64 = 1.17 / 100.0;

/// Growth rates over consecutive intervals for one country.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrowthSeries {
    pub start: Vec<i32>,
    pub end: Vec<i32>,
    pub rate: Vec<f64>,
}

/// Adjust a population from year `tpop` to year `tevent` with a single rate.
///
/// Rounds half to even, the same way the reference tables were produced.
pub fn adjust_pop(population: f64, tpop: i32, tevent: i32, rate: f64) -> f64 {
    let t = f64::from(tpop - tevent);
    (population * (1.0 + rate).powf(-t)).round_ties_even()
}

#[derive(Debug, Clone)]
pub struct PopulationGrowth {
    series: BTreeMap<u32, GrowthSeries>,
    default_rate: f64,
}

impl PopulationGrowth {
    pub fn new(series: BTreeMap<u32, GrowthSeries>, default_rate: f64) -> Result<Self> {
        for (code, s) in &series {
            if s.start.len() != s.end.len() || s.start.len() != s.rate.len() {
                return Err(PagerError::MalformedGrowthTable {
                    code: *code,
                    reason: format!(
                        "start/end/rate lengths differ ({}, {}, {})",
                        s.start.len(),
                        s.end.len(),
                        s.rate.len()
                    ),
                });
            }
            if s.start.is_empty() {
                return Err(PagerError::MalformedGrowthTable {
                    code: *code,
                    reason: "no growth intervals".into(),
                });
            }
        }
        Ok(Self {
            series,
            default_rate,
        })
    }

    pub fn default_rate(&self) -> f64 {
        self.default_rate
    }

    fn series_for(&self, code: u32) -> Option<&GrowthSeries> {
        self.series
            .get(&code)
            .or_else(|| self.series.get(&us_code(code)))
    }

    /// Growth rate for a country and year, if the country has UN data.
    ///
    /// Years before the first interval use the first rate and years after the
    /// last interval use the last rate. Otherwise the interval whose end year
    /// is nearest wins, earliest interval first on ties.
    pub fn rate_for(&self, code: u32, year: i32) -> Option<f64> {
        let s = self.series_for(code)?;
        let first_start = *s.start.iter().min()?;
        let last_end = *s.end.iter().max()?;
        let rate = if year < first_start {
            s.rate[0]
        } else if year > last_end {
            s.rate[s.rate.len() - 1]
        } else {
            let mut best = 0;
            for (idx, end) in s.end.iter().enumerate() {
                if (year - end).abs() < (year - s.end[best]).abs() {
                    best = idx;
                }
            }
            s.rate[best]
        };
        Some(rate)
    }

    /// Growth rate for a country and year, falling back to the default rate.
    pub fn rate(&self, code: u32, year: i32) -> f64 {
        self.rate_for(code, year).unwrap_or_else(|| {
            debug!(code, year, "no growth data, using default rate");
            self.default_rate
        })
    }

    /// Interval start years and rates for a country.
    pub fn rates(&self, code: u32) -> Option<(&[i32], &[f64])> {
        self.series_for(code)
            .map(|s| (s.start.as_slice(), s.rate.as_slice()))
    }

    /// Adjust a population collected in `tpop` to the year `tevent`, compounding
    /// (and rounding) one year at a time.
    pub fn adjust(&self, population: f64, code: u32, tpop: i32, tevent: i32) -> f64 {
        if tpop == tevent {
            return population;
        }
        let step = if tpop < tevent { 1 } else { -1 };
        let mut year = tpop;
        let mut pop = population;
        while year != tevent {
            let rate = self.rate(code, year);
            pop = adjust_pop(pop, year, year + step, rate);
            year += step;
        }
        pop
    }

    /// Adjust every population cell whose country code is `code`.
    pub fn adjust_grid(
        &self,
        population: &mut Grid2D<f64>,
        countries: &Grid2D<u32>,
        code: u32,
        tpop: i32,
        tevent: i32,
    ) {
        if tpop == tevent {
            return;
        }
        for (pop, cell_code) in population.data_mut().iter_mut().zip(countries.data()) {
            if *cell_code == code && !pop.is_nan() {
                *pop = self.adjust(*pop, code, tpop, tevent);
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn growth() -> PopulationGrowth {
        let mut series = BTreeMap::new();
        series.insert(
            4,
            GrowthSeries {
                start: vec![2010, 2012, 2014, 2016],
                end: vec![2012, 2014, 2016, 2018],
                rate: vec![0.01, 0.02, 0.03, 0.04],
            },
        );
        series.insert(
            840,
            GrowthSeries {
                start: vec![1950, 1955, 1960],
                end: vec![1955, 1960, 1965],
                rate: vec![0.01581, 0.01724, 0.01373],
            },
        );
        PopulationGrowth::new(series, DEFAULT_RATE).unwrap()
    }

    #[test]
    fn test_adjust_pop() {
        assert_eq!(adjust_pop(1e6, 2015, 2016, 0.01), 1e6 + 1e6 * 0.01);
        assert_eq!(adjust_pop(1e6, 2016, 2015, 0.01), 990099.0);
        assert_eq!(adjust_pop(1e6, 2016, 2016, 0.01), 1e6);
    }

    #[test]
    fn test_rate_lookup_clamps_and_picks_nearest_end() {
        let pg = growth();
        assert_eq!(pg.rate(4, 2005), 0.01);
        assert_eq!(pg.rate(4, 2011), 0.01);
        // 2013 is equidistant from 2012 and 2014; the earlier interval wins
        assert_eq!(pg.rate(4, 2013), 0.01);
        assert_eq!(pg.rate(4, 2015), 0.02);
        assert_eq!(pg.rate(4, 2017), 0.03);
        assert_eq!(pg.rate(4, 2020), 0.04);
        assert_eq!(pg.rate(840, 1963), 0.01373);
    }

    #[test]
    fn test_unknown_country_uses_default_rate() {
        let pg = growth();
        assert_eq!(pg.rate_for(392, 2016), None);
        assert_eq!(pg.rate(392, 2016), DEFAULT_RATE);
        assert_eq!(pg.adjust(1e6, 392, 2014, 2016), 1_023_537.0);
    }

    #[test]
    fn test_pseudo_codes_use_us_rates() {
        let pg = growth();
        assert_eq!(pg.rate(902, 1963), 0.01373);
        assert_eq!(pg.rates(903).unwrap().0, &[1950, 1955, 1960]);
    }

    #[test]
    fn test_stepwise_adjustment() {
        let pg = growth();
        assert_eq!(pg.adjust(1e6, 4, 2010, 2016), 1_082_644.0);
        assert_eq!(pg.adjust(1e6, 4, 2016, 2010), 905_730.0);
        assert_eq!(pg.adjust(1e6, 4, 2015, 2016), 1_020_000.0);
        assert_eq!(pg.adjust(1e6, 4, 2016, 2015), 970_874.0);
    }

    #[test]
    fn test_identity_when_years_match() {
        let pg = growth();
        for pop in [0.0, 1.5, 1e6, 123_456_789.0] {
            for code in [0, 4, 840, 999] {
                assert_eq!(pg.adjust(pop, code, 2012, 2012), pop);
            }
        }
    }

    #[test]
    fn test_malformed_table_rejected() {
        let mut series = BTreeMap::new();
        series.insert(
            4,
            GrowthSeries {
                start: vec![2010, 2012],
                end: vec![2012],
                rate: vec![0.01, 0.02],
            },
        );
        let err = PopulationGrowth::new(series, DEFAULT_RATE).unwrap_err();
        assert!(matches!(err, PagerError::MalformedGrowthTable { code: 4, .. }));
    }
}
