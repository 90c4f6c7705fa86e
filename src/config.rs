//! Pipeline configuration with defaults for the Sentinel study area

use crate::core::predictors::ReprojectionSpec;
use crate::core::soil_grids::{default_catalogue, CoverageSource, DataPair};
use crate::types::{PipelineError, PipelineResult, Radius};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Plot radii in meters, i.e. circles of 0.1, 0.2, 0.4, 0.8 and 1.6 ha
pub fn default_radii() -> Vec<Radius> {
    [17.84, 25.23, 35.68, 50.46, 71.37].into_iter().map(Radius).collect()
}

/// ALS stage: DTM, plot clipping and cloud metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlsConfig {
    /// Folder with the normalised `.las` tiles
    pub las_directory: PathBuf,
    pub output_directory: PathBuf,
    pub plot_csv: PathBuf,
    pub study_area_name: String,
    pub radii: Vec<Radius>,
    /// LAS classes kept by the clip
    pub classes: String,
    /// Height thresholds for cloud metrics
    pub above_values: Vec<u32>,
    pub dtm_resolution: String,
    pub utm_zone: String,
}

impl Default for AlsConfig {
    fn default() -> Self {
        Self {
            las_directory: PathBuf::from("F:/Gradu/OverageRemoved_500m"),
            output_directory: PathBuf::from("F:/Gradu/FinalCalculations"),
            plot_csv: PathBuf::from("F:/Gradu/FinalCalculations/AllPlots_Fixed.csv"),
            study_area_name: "Sentinel".to_string(),
            radii: default_radii(),
            classes: "2,3,5".to_string(),
            above_values: vec![0, 2, 4],
            dtm_resolution: "1".to_string(),
            utm_zone: "37S".to_string(),
        }
    }
}

impl AlsConfig {
    pub fn las_list_path(&self) -> PathBuf {
        self.las_directory.join("las_list.txt")
    }

    pub fn log_path(&self) -> PathBuf {
        self.las_directory.join("fusion_processing.log")
    }

    /// `<output>/<study area>_<resolution>m.dtm`
    pub fn dtm_path(&self) -> PathBuf {
        self.output_directory
            .join(format!("{}_{}m.dtm", self.study_area_name, self.dtm_resolution))
    }
}

/// Raster predictor stage
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RasterConfig {
    pub dem_directory: PathBuf,
    pub output_directory: PathBuf,
    pub plot_csv: PathBuf,
    /// Combined soil manifest; skipped when absent
    pub soil_list: Option<PathBuf>,
    /// Remote-sensing dataset list; skipped when absent
    pub remote_sensing_list: Option<PathBuf>,
    pub buffers: Vec<Radius>,
    /// Coordinate system of the plot table, written into the study-area shapefiles
    pub plot_crs: Option<String>,
    pub soil_reprojection: ReprojectionSpec,
    pub remote_sensing_reprojection: ReprojectionSpec,
}

impl Default for RasterConfig {
    fn default() -> Self {
        Self {
            dem_directory: PathBuf::from("F:/data/DEM"),
            output_directory: PathBuf::from("F:/data/RasterPredictors"),
            plot_csv: PathBuf::from("F:/data/AllPlots.csv"),
            soil_list: Some(PathBuf::from("F:/data/AfricanSoilGrids/combined-soil-rasters.csv")),
            remote_sensing_list: Some(PathBuf::from("F:/data/RS/rs-datasets.csv")),
            buffers: default_radii(),
            plot_crs: Some("EPSG:32737".to_string()),
            soil_reprojection: ReprojectionSpec {
                source_crs: "EPSG:4326".to_string(),
                target_crs: "EPSG:32737".to_string(),
                resolution: 250,
                resampling: 1,
                file_prefix: "32737_".to_string(),
            },
            remote_sensing_reprojection: ReprojectionSpec {
                source_crs: "EPSG:32637".to_string(),
                target_crs: "EPSG:32737".to_string(),
                resolution: 30,
                resampling: 0,
                file_prefix: "32737__".to_string(),
            },
        }
    }
}

/// Soil-grid download and combination stage
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SoilConfig {
    pub download_directory: PathBuf,
    /// Cell size written into the soil manifests
    pub resolution: u32,
    pub source: CoverageSource,
    pub catalogue: Vec<DataPair>,
    pub max_retries: u32,
    pub timeout_secs: u64,
}

impl Default for SoilConfig {
    fn default() -> Self {
        Self {
            download_directory: PathBuf::from("F:/Gradu/AfricanSoilGrids/WCS/"),
            resolution: 250,
            source: CoverageSource::default(),
            catalogue: default_catalogue(),
            max_retries: 3,
            timeout_secs: 300,
        }
    }
}

/// External tool locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub fusion_directory: PathBuf,
    pub qgis_process: PathBuf,
    /// Sets `QGIS_DEBUG=1` for every algorithm run
    pub debug: bool,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            fusion_directory: PathBuf::from("F:/FUSION/"),
            qgis_process: PathBuf::from("qgis_process"),
            debug: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub als: AlsConfig,
    pub raster: RasterConfig,
    pub soil: SoilConfig,
    pub tools: ToolsConfig,
}

impl PipelineConfig {
    /// Read a JSON configuration; missing fields keep their defaults
    pub fn from_file(path: &Path) -> PipelineResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: PipelineConfig = serde_json::from_str(&text)
            .map_err(|e| PipelineError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> PipelineResult<()> {
        if self.als.radii.is_empty() {
            return Err(PipelineError::Config("als.radii must not be empty".to_string()));
        }
        if let Some(radius) = self.als.radii.iter().chain(&self.raster.buffers).find(|r| !(r.meters() > 0.0)) {
            return Err(PipelineError::Config(format!("radius {} must be positive", radius)));
        }
        if self.als.above_values.is_empty() {
            return Err(PipelineError::Config("als.above_values must not be empty".to_string()));
        }
        if self.soil.max_retries == 0 {
            return Err(PipelineError::Config("soil.max_retries must be at least 1".to_string()));
        }
        Ok(())
    }
}
