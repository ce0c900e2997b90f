//! Country code and name lookups.
//!
//! Lookups accept ISO 3166 two-letter, three-letter and numeric codes, or a
//! fragment of the short country name. Name matching returns the first record
//! whose name contains the fragment, so "guinea" resolves to whichever Guinea
//! appears first in the table.

use serde::{Deserialize, Serialize};

pub const US_CCODE: u32 = 840;
pub const CALIFORNIA_CCODE: u32 = 902;
pub const EASTERN_US_CCODE: u32 = 903;
pub const WESTERN_US_CCODE: u32 = 904;

/// ISO2 code of the bucket that collects unmapped country codes.
pub const UNKNOWN_ISO2: &str = "UK";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountryRecord {
    pub iso2: String,
    pub iso3: String,
    pub numeric_code: u32,
    #[serde(default)]
    pub short_name: String,
    pub long_name: String,
    #[serde(default)]
    pub population: u64,
}

impl CountryRecord {
    pub fn unknown() -> Self {
        Self {
            iso2: UNKNOWN_ISO2.to_string(),
            iso3: "UKN".to_string(),
            numeric_code: 0,
            short_name: "Unknown".to_string(),
            long_name: "Unknown".to_string(),
            population: 0,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.numeric_code == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountryQuery<'a> {
    Numeric(u32),
    Text(&'a str),
}

impl From<u32> for CountryQuery<'_> {
    fn from(value: u32) -> Self {
        CountryQuery::Numeric(value)
    }
}

impl<'a> From<&'a str> for CountryQuery<'a> {
    fn from(value: &'a str) -> Self {
        CountryQuery::Text(value)
    }
}

impl<'a> From<&'a String> for CountryQuery<'a> {
    fn from(value: &'a String) -> Self {
        CountryQuery::Text(value.as_str())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CountryRegistry {
    records: Vec<CountryRecord>,
}

impl CountryRegistry {
    pub fn from_records(records: Vec<CountryRecord>) -> Self {
        let records = records
            .into_iter()
            .map(|mut record| {
                if record.short_name.trim().is_empty() {
                    record.short_name = record.long_name.clone();
                }
                record
            })
            .collect();
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[CountryRecord] {
        &self.records
    }

    /// Find the first record matching the query.
    pub fn get<'q>(&self, query: impl Into<CountryQuery<'q>>) -> Option<&CountryRecord> {
        match query.into() {
            CountryQuery::Numeric(code) => self.by_numeric(code),
            CountryQuery::Text(text) => {
                let text = text.trim();
                if text.is_empty() {
                    return None;
                }
                if let Ok(code) = text.parse::<u32>() {
                    return self.by_numeric(code);
                }
                match text.len() {
                    2 => self
                        .records
                        .iter()
                        .find(|r| r.iso2.eq_ignore_ascii_case(text)),
                    3 => self
                        .records
                        .iter()
                        .find(|r| r.iso3.eq_ignore_ascii_case(text)),
                    _ => {
                        let needle = text.to_lowercase();
                        self.records
                            .iter()
                            .find(|r| r.short_name.to_lowercase().contains(&needle))
                    }
                }
            }
        }
    }

    /// Like [`get`](Self::get), but never fails: unmatched queries return the
    /// "Unknown" record.
    pub fn lookup<'q>(&self, query: impl Into<CountryQuery<'q>>) -> CountryRecord {
        self.get(query)
            .cloned()
            .unwrap_or_else(CountryRecord::unknown)
    }

    /// ISO2 code for a numeric code, or the unknown bucket.
    pub fn iso2_for(&self, code: u32) -> String {
        self.get(code)
            .map(|r| r.iso2.clone())
            .unwrap_or_else(|| UNKNOWN_ISO2.to_string())
    }

    fn by_numeric(&self, code: u32) -> Option<&CountryRecord> {
        self.records.iter().find(|r| r.numeric_code == code)
    }
}

/// Map the California, Eastern US and Western US pseudo-codes to the USA.
pub fn us_code(code: u32) -> u32 {
    match code {
        CALIFORNIA_CCODE | EASTERN_US_CCODE | WESTERN_US_CCODE => US_CCODE,
        other => other,
    }
}

/// True for the ISO2 codes of the US pseudo-countries.
pub fn is_us_region_iso2(iso2: &str) -> bool {
    matches!(iso2.to_ascii_uppercase().as_str(), "XF" | "EU" | "WU")
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    fn record(iso2: &str, iso3: &str, code: u32, name: &str, population: u64) -> CountryRecord {
        CountryRecord {
            iso2: iso2.into(),
            iso3: iso3.into(),
            numeric_code: code,
            short_name: name.into(),
            long_name: name.into(),
            population,
        }
    }

    pub(crate) fn registry() -> CountryRegistry {
        CountryRegistry::from_records(vec![
            record("AF", "AFG", 4, "Afghanistan", 32_527_000),
            record("CN", "CHN", 156, "China", 1_371_220_000),
            record("GQ", "GNQ", 226, "Equatorial Guinea", 845_000),
            record("GN", "GIN", 324, "Guinea", 12_609_000),
            record("ID", "IDN", 360, "Indonesia", 257_564_000),
            record("US", "USA", 840, "United States", 324_515_000),
            record("XF", "XFX", 902, "California", 39_144_000),
            record("EU", "EUS", 903, "Eastern US", 0),
            record("WU", "WUS", 904, "Western US", 0),
        ])
    }

    #[test]
    fn test_lookup_by_every_code_kind() {
        let countries = registry();
        let expected = countries.get(840).unwrap().clone();
        assert_eq!(expected.population, 324_515_000);
        assert_eq!(countries.lookup("US"), expected);
        assert_eq!(countries.lookup("USA"), expected);
        assert_eq!(countries.lookup("usa"), expected);
        assert_eq!(countries.lookup("United States"), expected);
        assert_eq!(countries.lookup("840"), expected);
    }

    #[test]
    fn test_failure_returns_unknown_record() {
        let countries = registry();
        let unknown = countries.lookup("happyland");
        assert_eq!(unknown.iso2, "UK");
        assert_eq!(unknown.iso3, "UKN");
        assert_eq!(unknown.numeric_code, 0);
        assert!(unknown.is_unknown());
        assert_eq!(countries.lookup(""), CountryRecord::unknown());
        assert_eq!(countries.lookup(999), CountryRecord::unknown());
    }

    #[test]
    fn test_name_fragment_matches_first_record() {
        let countries = registry();
        assert_eq!(countries.lookup("guinea").iso2, "GQ");
    }

    #[test]
    fn test_us_pseudo_codes() {
        assert_eq!(us_code(902), 840);
        assert_eq!(us_code(903), 840);
        assert_eq!(us_code(904), 840);
        assert_eq!(us_code(156), 156);
        assert!(is_us_region_iso2("xf"));
        assert!(!is_us_region_iso2("US"));
    }

    #[test]
    fn test_missing_short_name_uses_long_name() {
        let mut rec = record("BO", "BOL", 68, "", 0);
        rec.long_name = "Plurinational State of Bolivia".into();
        let countries = CountryRegistry::from_records(vec![rec]);
        assert_eq!(countries.lookup("bolivia").iso3, "BOL");
    }
}
