pub mod config;
pub mod country;
pub mod error;
pub mod gdp;
pub mod growth;
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod probs;
pub mod reference;
pub mod scenario;
pub mod spatial;

pub use config::Config;
pub use error::{PagerError, Result};
pub use models::{EmpiricalLoss, Exposure, ExposureCalculator, HazardGrids, SemiEmpiricalFatality};
pub use pipeline::{Assessment, Pipeline};
pub use reference::ReferenceData;
pub use scenario::{Scenario, ScenarioLoader};
