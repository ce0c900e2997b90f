//! Full loss assessment for one event: exposure, empirical fatality and
//! economic losses with their uncertainty, and the semi-empirical estimate
//! when an urban/rural grid is available.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use crate::config::Config;
use crate::country::CountryRegistry;
use crate::gdp::GdpTable;
use crate::growth::PopulationGrowth;
use crate::models::emploss::{AlertLevel, EmpiricalLoss, LossProbabilities, LossResult};
use crate::models::exposure::{Exposure, ExposureCalculator};
use crate::models::semimodel::{
    time_of_day, SemiEmpiricalFatality, SemiLosses, SemiTables, TimeOfDay,
};
use crate::models::HazardGrids;
use crate::reference::ReferenceData;
use crate::scenario::EventInfo;

/// How many building types to report as most vulnerable.
const MOST_VULNERABLE_COUNT: usize = 3;

#[derive(Debug, Clone, Serialize)]
pub struct LossSummary {
    pub losses: LossResult,
    pub g: f64,
    pub probabilities: LossProbabilities,
    pub alert: AlertLevel,
}

#[derive(Debug, Clone, Serialize)]
pub struct SemiSummary {
    pub time_of_day: TimeOfDay,
    pub losses: SemiLosses,
    pub most_vulnerable: Vec<(String, f64)>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Assessment {
    pub event_year: i32,
    pub population_year: i32,
    pub exposure: Exposure,
    pub max_mmi: u8,
    pub economic_exposure: Exposure,
    pub fatalities: LossSummary,
    pub economic: LossSummary,
    /// Higher of the fatality and economic alerts.
    pub alert: AlertLevel,
    pub semi_empirical: Option<SemiSummary>,
}

/// Reference tables and models, built once and reused across events.
pub struct Pipeline {
    config: Config,
    countries: CountryRegistry,
    growth: PopulationGrowth,
    gdp: GdpTable,
    fatality: EmpiricalLoss,
    economic: EmpiricalLoss,
    semi: SemiTables,
}

impl Pipeline {
    pub fn new(reference: ReferenceData, config: Config) -> Result<Self> {
        let growth = reference
            .population_growth(config.growth.default_rate)
            .context("Invalid population growth table")?;
        let fatality = reference
            .fatality_model()
            .context("Invalid fatality model set")?;
        let economic = reference
            .economic_model()
            .context("Invalid economic model set")?;
        Ok(Self {
            countries: reference.country_registry(),
            gdp: reference.gdp_table(config.economic.global_gdp),
            growth,
            fatality,
            economic,
            semi: reference.semi,
            config,
        })
    }

    pub fn countries(&self) -> &CountryRegistry {
        &self.countries
    }

    pub fn assess(
        &self,
        event: &EventInfo,
        grids: &HazardGrids,
        population_year: i32,
    ) -> Result<Assessment> {
        let event_year = event.year();
        let calculator = ExposureCalculator::new(&self.growth, &self.countries, population_year)
            .with_policy(self.config.exposure.staleness());

        let exposure = calculator
            .calc_exposure(grids, event_year)
            .context("Population exposure failed")?;
        let econ = calculator
            .calc_econ_exposure(grids, event_year, &self.economic, &self.gdp)
            .context("Economic exposure failed")?;

        let fatalities = summarise(&self.fatality, self.fatality.get_losses(&exposure));
        let economic = summarise(&self.economic, self.economic.get_losses(&econ.exposure));
        let alert = AlertLevel::summary(fatalities.alert, economic.alert);
        info!(
            fatalities = fatalities.losses.total,
            dollars = economic.losses.total,
            %alert,
            "empirical losses"
        );

        let semi_empirical = match grids.urban {
            Some(_) => {
                let model = SemiEmpiricalFatality::new(&self.semi, &self.growth, &self.countries);
                let losses = model
                    .get_losses(grids, event.time, event.lon, population_year)
                    .context("Semi-empirical model failed")?;
                info!(fatalities = losses.total, "semi-empirical losses");
                Some(SemiSummary {
                    time_of_day: time_of_day(event.time, event.lon).0,
                    most_vulnerable: losses.most_vulnerable(MOST_VULNERABLE_COUNT),
                    losses,
                })
            }
            None => None,
        };

        Ok(Assessment {
            event_year,
            population_year,
            max_mmi: exposure.max_mmi(self.config.exposure.min_exposed_for_max_mmi),
            exposure,
            economic_exposure: econ.exposure,
            fatalities,
            economic,
            alert,
            semi_empirical,
        })
    }
}

fn summarise(model: &EmpiricalLoss, losses: LossResult) -> LossSummary {
    let g = model.combined_g(&losses);
    LossSummary {
        probabilities: model.probabilities(&losses, g),
        alert: model.alert_level(&losses),
        g,
        losses,
    }
}
