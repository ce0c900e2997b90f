//! Empirical loss models: per-country loss-rate curves over MMI, losses from
//! exposure, uncertainty (G) combination, range probabilities and alert levels.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use tracing::debug;

use crate::country::{CountryRegistry, UNKNOWN_ISO2};
use crate::error::{PagerError, Result};
use crate::models::exposure::Exposure;
use crate::models::MMI_BINS;
use crate::probs::{phi, prob_from_range};
use crate::spatial::Grid2D;

/// Upper bound on the combined dispersion of several countries.
pub const MAX_COMBINED_G: f64 = 2.5;

/// Lowest and highest MMI with fitted loss rates.
const MIN_LOSS_MMI: usize = 5;
const MAX_LOSS_MMI: usize = 9;

/// Loss ranges (fatalities, or millions of USD) that probabilities are
/// reported over. The open-ended top range is capped at one trillion.
const LOSS_RANGES: [(&str, f64, f64); 7] = [
    ("0-1", 0.0, 1.0),
    ("1-10", 1.0, 10.0),
    ("10-100", 10.0, 100.0),
    ("100-1000", 100.0, 1000.0),
    ("1000-10000", 1000.0, 10000.0),
    ("10000-100000", 10000.0, 100000.0),
    ("100000-10000000", 100000.0, 1e12),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LossKind {
    Fatality,
    Economic,
}

impl LossKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LossKind::Fatality => "fatality",
            LossKind::Economic => "economic",
        }
    }

    /// Key used for the total in serialised loss results.
    pub fn total_key(&self) -> &'static str {
        match self {
            LossKind::Fatality => "TotalFatalities",
            LossKind::Economic => "TotalDollars",
        }
    }

    /// Scale a total into the units alerts and probabilities are expressed in.
    fn expected(&self, total: f64) -> f64 {
        match self {
            LossKind::Fatality => total,
            LossKind::Economic => total / 1e6,
        }
    }
}

impl FromStr for LossKind {
    type Err = PagerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "fatality" => Ok(LossKind::Fatality),
            "economic" => Ok(LossKind::Economic),
            _ => Err(PagerError::InvalidLossType(s.to_string())),
        }
    }
}

impl fmt::Display for LossKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Loss rate as a function of shaking intensity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "curve", rename_all = "lowercase")]
pub enum LossCurve {
    /// Normal CDF of ln(mmi/theta)/beta.
    Lognormal { theta: f64, beta: f64 },
    /// 10^(theta - mmi * beta).
    Loglinear { theta: f64, beta: f64 },
}

impl LossCurve {
    pub fn rate(&self, mmi: f64) -> f64 {
        match *self {
            LossCurve::Lognormal { theta, beta } => phi((mmi / theta).ln() / beta),
            LossCurve::Loglinear { theta, beta } => 10f64.powf(theta - mmi * beta),
        }
    }

    pub fn theta(&self) -> f64 {
        match *self {
            LossCurve::Lognormal { theta, .. } | LossCurve::Loglinear { theta, .. } => theta,
        }
    }

    pub fn beta(&self) -> f64 {
        match *self {
            LossCurve::Lognormal { beta, .. } | LossCurve::Loglinear { beta, .. } => beta,
        }
    }
}

/// A fitted loss model for one country.
///
/// Models compare by the area under their rate curve between MMI 5 and 9,
/// so a "greater" model is the more deadly (or costly) one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LossModel {
    pub name: String,
    #[serde(flatten)]
    pub curve: LossCurve,
    /// L2G norm of the fit, the model's contribution to uncertainty.
    pub l2g: f64,
    /// Economic correction factor. Unused by fatality models.
    #[serde(default)]
    pub alpha: Option<f64>,
}

impl LossModel {
    pub fn new(name: impl Into<String>, curve: LossCurve, l2g: f64) -> Self {
        Self {
            name: name.into(),
            curve,
            l2g,
            alpha: None,
        }
    }

    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = Some(alpha);
        self
    }

    /// Model used for countries without a fitted one.
    pub fn default_model() -> Self {
        Self::new(
            "default",
            LossCurve::Lognormal {
                theta: 16.0,
                beta: 0.15,
            },
            1.0,
        )
        .with_alpha(1.0)
    }

    pub fn rate(&self, mmi: f64) -> f64 {
        self.curve.rate(mmi)
    }

    pub fn rates(&self, mmis: &[f64]) -> Vec<f64> {
        mmis.iter().map(|&mmi| self.rate(mmi)).collect()
    }

    /// Trapezoidal area under the rate curve over MMI 5-9.
    pub fn area(&self) -> f64 {
        let rates = self.rates(&loss_mmis());
        rates.windows(2).map(|w| (w[0] + w[1]) / 2.0).sum()
    }
}

impl PartialEq for LossModel {
    fn eq(&self, other: &Self) -> bool {
        self.area() == other.area()
    }
}

impl PartialOrd for LossModel {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.area().partial_cmp(&other.area())
    }
}

impl fmt::Display for LossModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for mmi in MIN_LOSS_MMI..=MAX_LOSS_MMI {
            let rate = self.rate(mmi as f64);
            let one_in = (1.0 / rate) as u64;
            writeln!(f, "MMI {mmi}: 1 in {}", thousands(one_in))?;
        }
        Ok(())
    }
}

fn thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

fn loss_mmis() -> Vec<f64> {
    (MIN_LOSS_MMI..=MAX_LOSS_MMI).map(|m| m as f64).collect()
}

/// Hard-coded MMI 1-10 rates that take precedence over fitted curves.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RateOverrides {
    rates: BTreeMap<String, [f64; MMI_BINS]>,
}

impl RateOverrides {
    pub fn set(&mut self, ccode: &str, rates: [f64; MMI_BINS]) {
        self.rates.insert(ccode.to_ascii_uppercase(), rates);
    }

    pub fn get(&self, ccode: &str) -> Option<&[f64; MMI_BINS]> {
        self.rates.get(&ccode.to_ascii_uppercase())
    }

    pub fn clear(&mut self) {
        self.rates.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }
}

/// Losses per ISO2 country, truncated to whole people (or dollars).
#[derive(Debug, Clone, PartialEq)]
pub struct LossResult {
    pub kind: LossKind,
    pub by_country: BTreeMap<String, f64>,
    pub total: f64,
}

impl LossResult {
    /// Total in alert units: fatalities, or millions of USD.
    pub fn expected(&self) -> f64 {
        self.kind.expected(self.total)
    }
}

impl Serialize for LossResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.by_country.len() + 1))?;
        for (ccode, loss) in &self.by_country {
            map.serialize_entry(ccode, loss)?;
        }
        map.serialize_entry(self.kind.total_key(), &self.total)?;
        map.end()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Green,
    Yellow,
    Orange,
    Red,
}

impl AlertLevel {
    /// Alert for an expected loss in fatalities or millions of USD.
    pub fn from_expected(expected: f64) -> Self {
        if expected < 1.0 {
            AlertLevel::Green
        } else if expected < 100.0 {
            AlertLevel::Yellow
        } else if expected < 1000.0 {
            AlertLevel::Orange
        } else {
            AlertLevel::Red
        }
    }

    /// Overall alert: the higher of the fatality and economic alerts.
    pub fn summary(fatality: AlertLevel, economic: AlertLevel) -> AlertLevel {
        fatality.max(economic)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertLevel::Green => "green",
            AlertLevel::Yellow => "yellow",
            AlertLevel::Orange => "orange",
            AlertLevel::Red => "red",
        }
    }
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LossRange {
    pub label: String,
    pub min: f64,
    pub max: f64,
    pub probability: f64,
}

/// Probabilities over the standard loss ranges, lowest range first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LossProbabilities {
    pub ranges: Vec<LossRange>,
}

impl LossProbabilities {
    pub fn get(&self, label: &str) -> Option<f64> {
        self.ranges
            .iter()
            .find(|r| r.label == label)
            .map(|r| r.probability)
    }

    pub fn values(&self) -> Vec<f64> {
        self.ranges.iter().map(|r| r.probability).collect()
    }
}

/// A set of fitted loss models of one kind, keyed by ISO2 country code.
#[derive(Debug, Clone)]
pub struct EmpiricalLoss {
    kind: LossKind,
    models: BTreeMap<String, LossModel>,
    default_model: LossModel,
    overrides: RateOverrides,
}

impl EmpiricalLoss {
    /// Build from a model list and a loss type ("fatality" or "economic").
    pub fn new(models: Vec<LossModel>, loss_type: &str) -> Result<Self> {
        Ok(Self::with_kind(models, loss_type.parse()?))
    }

    pub fn with_kind(models: Vec<LossModel>, kind: LossKind) -> Self {
        let models = models
            .into_iter()
            .map(|m| (m.name.to_ascii_uppercase(), m))
            .collect();
        Self {
            kind,
            models,
            default_model: LossModel::default_model(),
            overrides: RateOverrides::default(),
        }
    }

    pub fn kind(&self) -> LossKind {
        self.kind
    }

    /// The fitted model for a country, or the default model.
    pub fn model(&self, ccode: &str) -> &LossModel {
        self.models
            .get(&ccode.to_ascii_uppercase())
            .unwrap_or_else(|| {
                debug!(ccode, kind = %self.kind, "no fitted loss model, using default");
                &self.default_model
            })
    }

    pub fn loss_rates(&self, ccode: &str, mmis: &[f64]) -> Vec<f64> {
        self.model(ccode).rates(mmis)
    }

    pub fn set_override(&mut self, ccode: &str, rates: [f64; MMI_BINS]) {
        self.overrides.set(ccode, rates);
    }

    pub fn override_rates(&self, ccode: &str) -> Option<&[f64; MMI_BINS]> {
        self.overrides.get(ccode)
    }

    pub fn clear_overrides(&mut self) {
        self.overrides.clear();
    }

    /// Rates at MMI 5-9, preferring an override.
    fn effective_rates(&self, ccode: &str) -> Vec<f64> {
        match self.overrides.get(ccode) {
            Some(rates) => rates[MIN_LOSS_MMI - 1..MAX_LOSS_MMI].to_vec(),
            None => self.loss_rates(ccode, &loss_mmis()),
        }
    }

    /// Losses per country from an exposure. MMI 10 exposure counts as MMI 9.
    pub fn get_losses(&self, exposure: &Exposure) -> LossResult {
        let mut by_country = BTreeMap::new();
        for (ccode, bins) in &exposure.by_country {
            if ccode == UNKNOWN_ISO2 {
                continue;
            }
            let mut expo = *bins;
            expo[MAX_LOSS_MMI - 1] += expo[MMI_BINS - 1];
            let losses: f64 = expo[MIN_LOSS_MMI - 1..MAX_LOSS_MMI]
                .iter()
                .zip(self.effective_rates(ccode))
                .map(|(e, r)| e * r)
                .filter(|v| !v.is_nan())
                .sum();
            by_country.insert(ccode.clone(), losses.trunc());
        }
        let total = by_country.values().sum();
        LossResult {
            kind: self.kind,
            by_country,
            total,
        }
    }

    /// Combined dispersion: the root sum of squares of the L2G values of the
    /// countries with losses (or of every country when none has any).
    pub fn combined_g(&self, losses: &LossResult) -> f64 {
        let has_loss = losses.by_country.values().sum::<f64>() > 0.0;
        let sum_sq: f64 = losses
            .by_country
            .iter()
            .filter(|(_, loss)| !has_loss || **loss > 0.0)
            .map(|(ccode, _)| self.model(ccode).l2g.powi(2))
            .sum();
        sum_sq.sqrt().min(MAX_COMBINED_G)
    }

    pub fn probabilities(&self, losses: &LossResult, g: f64) -> LossProbabilities {
        let expected = losses.expected();
        let ranges = LOSS_RANGES
            .iter()
            .map(|&(label, min, max)| LossRange {
                label: label.to_string(),
                min,
                max,
                probability: prob_from_range(g, expected, &[min, max]),
            })
            .collect();
        LossProbabilities { ranges }
    }

    pub fn alert_level(&self, losses: &LossResult) -> AlertLevel {
        AlertLevel::from_expected(losses.expected())
    }

    /// Per-cell losses. Cells above MMI 9.5 are treated as MMI 9; cells
    /// outside MMI 5-9 have no loss.
    pub fn loss_grid(
        &self,
        countries: &CountryRegistry,
        mmi: &Grid2D<f64>,
        population: &Grid2D<f64>,
        codes: &Grid2D<u32>,
    ) -> Grid2D<f64> {
        let mut rates_by_code: BTreeMap<u32, Vec<f64>> = BTreeMap::new();
        let mut grid = Grid2D::filled(*mmi.geodict(), 0.0);
        let cells = mmi
            .data()
            .iter()
            .zip(population.data())
            .zip(codes.data());
        for (out, ((&intensity, &pop), &code)) in grid.data_mut().iter_mut().zip(cells) {
            let intensity = if intensity > 9.5 { 9.0 } else { intensity };
            let rates = rates_by_code
                .entry(code)
                .or_insert_with(|| self.effective_rates(&countries.iso2_for(code)));
            let bin = (MIN_LOSS_MMI..=MAX_LOSS_MMI).position(|m| {
                let m = m as f64;
                intensity >= m - 0.5 && intensity < m + 0.5
            });
            if let Some(idx) = bin {
                *out = pop * rates[idx];
            }
        }
        grid
    }
}
