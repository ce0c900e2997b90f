pub mod emploss;
pub mod exposure;
pub mod semimodel;

use crate::error::Result;
use crate::spatial::{check_alignment, Grid2D};

pub use emploss::{
    AlertLevel, EmpiricalLoss, LossCurve, LossKind, LossModel, LossProbabilities, LossRange,
    LossResult, RateOverrides,
};
pub use exposure::{
    calc_exposure, nearest_population_year, EconExposure, Exposure, ExposureCalculator,
    StalenessPolicy,
};
pub use semimodel::{
    pop_dist, time_of_day, Density, DescriptionKind, PopulationSplit, SemiEmpiricalFatality,
    SemiLosses, SemiTables, TimeOfDay, Workforce,
};

/// Number of MMI bins (MMI 1 through 10).
pub const MMI_BINS: usize = 10;

/// The aligned input grids for one event.
#[derive(Debug, Clone)]
pub struct HazardGrids {
    /// Shaking intensity (MMI, 1-10).
    pub mmi: Grid2D<f64>,
    /// People per cell at the population data year.
    pub population: Grid2D<f64>,
    /// ISO 3166 numeric country code per cell; 0 is unknown.
    pub countries: Grid2D<u32>,
    /// 1 for rural, 2 for urban. Only needed by the semi-empirical model.
    pub urban: Option<Grid2D<u8>>,
}

impl HazardGrids {
    pub fn new(mmi: Grid2D<f64>, population: Grid2D<f64>, countries: Grid2D<u32>) -> Self {
        Self {
            mmi,
            population,
            countries,
            urban: None,
        }
    }

    pub fn with_urban(mut self, urban: Grid2D<u8>) -> Self {
        self.urban = Some(urban);
        self
    }

    /// Require the shaking, population and country grids to share one frame.
    pub fn check_alignment(&self) -> Result<()> {
        check_alignment(&[
            ("mmi", self.mmi.geodict()),
            ("population", self.population.geodict()),
            ("country", self.countries.geodict()),
        ])
    }

    /// Unique country codes present, ascending.
    pub fn country_codes(&self) -> Vec<u32> {
        let mut codes: Vec<u32> = self.countries.data().to_vec();
        codes.sort_unstable();
        codes.dedup();
        codes
    }
}
