use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use quakeloss::{logging, Config, Pipeline, ReferenceData, ScenarioLoader};

#[derive(Debug, Parser)]
#[command(author, version, about = "Earthquake loss assessment")]
struct Cli {
    /// Path to the scenario YAML file
    #[arg(long, default_value = "scenarios/kabul.yaml")]
    scenario: PathBuf,

    /// Reference data bundle (uses the scenario's when omitted)
    #[arg(long)]
    reference: Option<PathBuf>,

    /// Configuration YAML file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Pretty-print the JSON assessment
    #[arg(long)]
    pretty: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::from_yaml(path)?,
        None => Config::default(),
    };
    logging::init(&config.logging);

    let loader = ScenarioLoader::new(".");
    let scenario = loader.load(&cli.scenario)?;
    let reference_path = cli
        .reference
        .unwrap_or_else(|| loader.reference_path(&scenario));
    let reference = ReferenceData::load(&reference_path)?;

    let grids = scenario.build_grids()?;
    let population_year = scenario.population_year()?;
    let pipeline = Pipeline::new(reference, config)?;
    let assessment = pipeline.assess(&scenario.event, &grids, population_year)?;

    let json = if cli.pretty {
        serde_json::to_string_pretty(&assessment)?
    } else {
        serde_json::to_string(&assessment)?
    };
    println!("{json}");
    Ok(())
}
