use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use plotvars::config::PipelineConfig;
use plotvars::core::geoprocessing::GdalBackend;
use plotvars::core::tools::ProcessRunner;
use plotvars::io::coverage::HttpCoverageClient;
use plotvars::{logging, pipeline};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(
    name = "plotvars",
    version,
    about = "Compute ALS and raster predictors for forest inventory plots"
)]
struct Cli {
    /// JSON configuration; built-in defaults are used for missing fields
    #[arg(long, short, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print the effective configuration as JSON and exit
    #[arg(long)]
    print_config: bool,

    #[command(subcommand)]
    stage: Option<Stage>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    /// FUSION DTM, plot clips and cloud metrics
    Als,
    /// Terrain, soil-grid and remote-sensing predictors with zonal statistics
    Raster,
    /// Download and combine soil grids
    Soil,
    /// Soil, ALS and raster stages in that order
    All,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => PipelineConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration {}", path.display()))?,
        None => PipelineConfig::default(),
    };

    if cli.print_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }
    let stage = cli.stage.context("No stage given, expected one of: als, raster, soil, all")?;

    let log_file = matches!(stage, Stage::Als | Stage::All)
        .then(|| config.als.log_path())
        .filter(|path| path.parent().map_or(false, |dir| dir.is_dir()));
    logging::init(log_file.as_deref()).context("Failed to open log file")?;

    let runner = ProcessRunner::new();
    let backend = GdalBackend::new(&config.tools.qgis_process, config.tools.debug, &runner);

    if matches!(stage, Stage::Soil | Stage::All) {
        let client = HttpCoverageClient::new(config.soil.max_retries, Duration::from_secs(config.soil.timeout_secs))?;
        let combined = pipeline::run_soil_grids(&client, &backend, &config.soil).context("Soil grid stage failed")?;
        log::info!("Combined {} soil rasters", combined.len());
    }

    if matches!(stage, Stage::Als | Stage::All) {
        let area = pipeline::run_als(&runner, &config.tools, &config.als).context("ALS stage failed")?;
        log::info!("ALS stage finished for {} plots", area.plot_count());
    }

    if matches!(stage, Stage::Raster | Stage::All) {
        let outputs = pipeline::run_raster_predictors(&backend, &config.raster).context("Raster stage failed")?;
        log::info!(
            "Raster stage finished: {} and {}",
            outputs.results_file.display(),
            outputs.legend_file.display()
        );
    }

    Ok(())
}
