//! Per-capita GDP by country and year.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::country::{is_us_region_iso2, CountryRegistry};

/// Gross world product per capita (USD), used when a country has no data.
pub const GLOBAL_GDP: f64 = 16100.0;

/// A GDP value and the ISO3 code of the country it was taken from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GdpValue {
    pub gdp: f64,
    pub iso3: Option<String>,
}

/// Per-capita GDP series keyed by ISO3 code. Missing (null) years are simply
/// absent from a country's series.
#[derive(Debug, Clone)]
pub struct GdpTable {
    series: BTreeMap<String, BTreeMap<i32, f64>>,
    global_gdp: f64,
}

impl Default for GdpTable {
    fn default() -> Self {
        Self::new(BTreeMap::new())
    }
}

impl GdpTable {
    pub fn new(series: BTreeMap<String, BTreeMap<i32, f64>>) -> Self {
        let series = series
            .into_iter()
            .map(|(iso3, years)| {
                let years = years.into_iter().filter(|(_, v)| v.is_finite()).collect();
                (iso3.to_ascii_uppercase(), years)
            })
            .collect();
        Self {
            series,
            global_gdp: GLOBAL_GDP,
        }
    }

    pub fn with_global_gdp(mut self, global_gdp: f64) -> Self {
        self.global_gdp = global_gdp;
        self
    }

    pub fn global_gdp(&self) -> f64 {
        self.global_gdp
    }

    /// GDP for an ISO3 code and year, if the country has any data.
    ///
    /// Years before the series use the first value, years after it the last
    /// value, and years missing inside it the most recent earlier value.
    pub fn lookup(&self, iso3: &str, year: i32) -> Option<f64> {
        let years = self.series.get(&iso3.to_ascii_uppercase())?;
        if let Some(value) = years.get(&year) {
            return Some(*value);
        }
        let (first_year, first) = years.iter().next()?;
        if year < *first_year {
            return Some(*first);
        }
        years.range(..year).next_back().map(|(_, v)| *v)
    }

    /// GDP for any country code the registry understands, falling back to the
    /// global value. US pseudo-countries (California, Eastern/Western US) use
    /// the USA series.
    pub fn gdp(&self, countries: &CountryRegistry, code: &str, year: i32) -> GdpValue {
        let Some(record) = countries.get(code) else {
            debug!(code, "unknown country, using global GDP");
            return self.global();
        };
        let iso3 = if is_us_region_iso2(&record.iso2) {
            "USA".to_string()
        } else {
            record.iso3.clone()
        };
        match self.lookup(&iso3, year) {
            Some(gdp) => GdpValue {
                gdp,
                iso3: Some(iso3),
            },
            None => {
                debug!(%iso3, year, "no GDP series, using global GDP");
                self.global()
            }
        }
    }

    fn global(&self) -> GdpValue {
        GdpValue {
            gdp: self.global_gdp,
            iso3: None,
        }
    }
}
