//! Stage entry points wiring configuration, tools and backends together

use crate::config::{AlsConfig, RasterConfig, SoilConfig, ToolsConfig};
use crate::core::fusion::{clip_plots, compute_cloudmetrics, ensure_fusion_dtm, ClipSettings, DtmParams, FusionTools};
use crate::core::geoprocessing::GeoBackend;
use crate::core::predictors::{
    add_remote_sensing_predictors, add_soil_grid_predictors, compute_zonal_statistics, create_terrain_predictors,
    PredictorSets,
};
use crate::core::soil_grids::{combine_groups, download_all, group_data_pairs};
use crate::core::study::StudyArea;
use crate::core::tools::ToolRunner;
use crate::io::coverage::CoverageClient;
use crate::io::manifest::{
    read_remote_sensing_records, read_soil_grid_records, write_cloudmetrics_manifest, write_combined_log,
    write_download_log, write_legend_file, write_path_list, write_results_file, CLOUDMETRICS_MANIFEST,
};
use crate::io::paths::{ensure_folder, list_files_with_extension};
use crate::io::plot_csv::read_plots_from_csv;
use crate::types::PipelineResult;
use std::path::PathBuf;

/// Outputs of the raster predictor stage
#[derive(Debug, Clone)]
pub struct RasterOutputs {
    pub predictors: PredictorSets,
    pub results_file: PathBuf,
    pub legend_file: PathBuf,
}

/// DTM, per-plot clips for every radius, cloud metrics and their manifest
pub fn run_als(runner: &dyn ToolRunner, tools: &ToolsConfig, config: &AlsConfig) -> PipelineResult<StudyArea> {
    log::info!("********************");
    log::info!("Starting ALS variable computation");
    log::info!("Input parameters:");
    log::info!("  Input las folder: {}", config.las_directory.display());
    log::info!("  Output folder: {}", config.output_directory.display());
    log::info!("  Fusion folder: {}", tools.fusion_directory.display());
    log::info!("  Input las files:");
    let las_files = list_files_with_extension(&config.las_directory, ".las")?;
    for las_file in &las_files {
        log::info!("      {}", las_file.display());
    }
    log::info!("********************");

    let las_list = config.las_list_path();
    write_path_list(&las_list, &las_files)?;
    ensure_folder(&config.output_directory)?;

    let fusion = FusionTools::new(&tools.fusion_directory);
    let dtm_params = DtmParams {
        resolution: config.dtm_resolution.clone(),
        utm_zone: config.utm_zone.clone(),
        ..DtmParams::default()
    };
    let dtm_path = config.dtm_path();
    ensure_fusion_dtm(runner, &fusion, &dtm_params, &dtm_path, &las_list)?;

    let mut area = StudyArea::new(config.study_area_name.clone());
    area.add_clusters(read_plots_from_csv(&config.plot_csv)?);
    log::info!("Study area {} has {} clusters and {} plots", area.name, area.clusters.len(), area.plot_count());

    let settings = ClipSettings {
        classes: &config.classes,
        dtm_path: &dtm_path,
        las_list: &las_list,
    };
    for &radius in &config.radii {
        log::info!("Clipping data with {} m radius", radius);
        let radius_directory = config.output_directory.join(radius.to_string());
        clip_plots(runner, &fusion, &settings, &mut area, radius, &radius_directory)?;
    }

    let invocations = compute_cloudmetrics(
        runner,
        &fusion,
        &mut area,
        &config.radii,
        &config.above_values,
        &config.output_directory,
    )?;
    log::info!("Ran cloudmetrics {} times", invocations);

    write_cloudmetrics_manifest(&config.output_directory.join(CLOUDMETRICS_MANIFEST), &area)?;
    Ok(area)
}

/// Terrain, soil-grid and remote-sensing predictors sampled over buffered plots
pub fn run_raster_predictors(backend: &dyn GeoBackend, config: &RasterConfig) -> PipelineResult<RasterOutputs> {
    log::info!("Starting raster predictor computation");
    ensure_folder(&config.output_directory)?;
    let mut predictors = create_terrain_predictors(backend, &config.dem_directory, &config.output_directory)?;

    match &config.soil_list {
        Some(path) if path.exists() => {
            let records = read_soil_grid_records(path)?;
            add_soil_grid_predictors(backend, &mut predictors, &records, &config.soil_reprojection)?;
        }
        Some(path) => log::warn!("Soil grid list {} not found, skipping soil predictors", path.display()),
        None => {}
    }

    match &config.remote_sensing_list {
        Some(path) if path.exists() => {
            let records = read_remote_sensing_records(path)?;
            add_remote_sensing_predictors(backend, &mut predictors, &records, &config.remote_sensing_reprojection)?;
        }
        Some(path) => log::warn!("Remote sensing list {} not found, skipping", path.display()),
        None => {}
    }
    log::info!("Collected {} predictors", predictors.len());

    let mut area = StudyArea::new("Plots");
    area.add_clusters(read_plots_from_csv(&config.plot_csv)?);
    let layers = compute_zonal_statistics(
        backend,
        area.plots().collect::<Vec<_>>(),
        &config.buffers,
        &predictors,
        &config.output_directory,
        config.plot_crs.as_deref(),
    )?;

    let results_file = write_results_file(&config.output_directory, &layers)?;
    let legend_file = write_legend_file(&config.output_directory, &predictors)?;
    Ok(RasterOutputs {
        predictors,
        results_file,
        legend_file,
    })
}

/// Download the soil catalogue, average each soil group and write both logs
pub fn run_soil_grids(
    client: &dyn CoverageClient,
    backend: &dyn GeoBackend,
    config: &SoilConfig,
) -> PipelineResult<Vec<PathBuf>> {
    log::info!("Starting soil grid download into {}", config.download_directory.display());
    ensure_folder(&config.download_directory)?;
    download_all(client, &config.source, &config.catalogue, &config.download_directory)?;

    let groups = group_data_pairs(&config.catalogue);
    let combined = combine_groups(backend, &groups, &config.download_directory)?;

    write_download_log(&config.download_directory, config.resolution, &config.catalogue)?;
    write_combined_log(&config.download_directory, config.resolution, &groups)?;
    Ok(combined)
}
