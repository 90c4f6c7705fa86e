//! Raster predictors: terrain derivatives, reprojected auxiliary rasters and
//! their zonal statistics over buffered plots

use crate::core::geoprocessing::{AlgorithmCall, GeoBackend, ParamValue};
use crate::core::study::StudyPlot;
use crate::core::zonal::{PlotBufferLayer, ZonalStat};
use crate::io::manifest::{RemoteSensingRecord, SoilGridRecord};
use crate::io::paths::{basename, ensure_folder, file_name, list_files_with_extension, resolution_from_name};
use crate::types::{PipelineError, PipelineResult, Radius};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Surface model a terrain raster was derived from
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SurfaceType {
    Dtm,
    Dsm,
    Unknown,
}

/// Resampling used when the terrain raster was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TerrainResampling {
    Bilinear,
    Nearest,
}

/// Key of one predictor set, rendered as the column prefix (`TB5`, `SP250`, `RS30`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PredictorSetKey {
    Terrain {
        surface: SurfaceType,
        resampling: Option<TerrainResampling>,
        resolution: u32,
    },
    SoilGrid {
        resolution: u32,
    },
    RemoteSensing {
        resolution: u32,
    },
}

impl PredictorSetKey {
    /// Classify a terrain raster from its file name
    pub fn from_terrain_file(path: &Path) -> PipelineResult<Self> {
        let name = file_name(path);
        let surface = if name.contains("DTM") {
            SurfaceType::Dtm
        } else if name.contains("DSM") {
            SurfaceType::Dsm
        } else {
            SurfaceType::Unknown
        };
        let resampling = if name.contains("bilinear") {
            Some(TerrainResampling::Bilinear)
        } else if name.contains("ngb") {
            Some(TerrainResampling::Nearest)
        } else {
            None
        };
        Ok(PredictorSetKey::Terrain {
            surface,
            resampling,
            resolution: resolution_from_name(path)?,
        })
    }

    pub fn resolution(&self) -> u32 {
        match *self {
            PredictorSetKey::Terrain { resolution, .. }
            | PredictorSetKey::SoilGrid { resolution }
            | PredictorSetKey::RemoteSensing { resolution } => resolution,
        }
    }

    /// `Type` column of the legend
    pub fn source_type(&self) -> &'static str {
        match self {
            PredictorSetKey::Terrain { surface: SurfaceType::Dtm, .. } => "DTM",
            PredictorSetKey::Terrain { surface: SurfaceType::Dsm, .. } => "DSM",
            PredictorSetKey::Terrain { .. } => "",
            PredictorSetKey::SoilGrid { .. } => "SoilGrid",
            PredictorSetKey::RemoteSensing { .. } => "RemoteSensing",
        }
    }

    /// Multi-band sources get per-band columns and a reduced statistic set
    pub fn is_banded(&self) -> bool {
        matches!(self, PredictorSetKey::RemoteSensing { .. })
    }
}

impl std::fmt::Display for PredictorSetKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PredictorSetKey::Terrain { surface, resampling, resolution } => {
                let surface = match surface {
                    SurfaceType::Dtm => "T",
                    SurfaceType::Dsm => "S",
                    SurfaceType::Unknown => "",
                };
                let resampling = match resampling {
                    Some(TerrainResampling::Bilinear) => "B",
                    Some(TerrainResampling::Nearest) => "N",
                    None => "",
                };
                write!(f, "{}{}{}", surface, resampling, resolution)
            }
            PredictorSetKey::SoilGrid { resolution } => write!(f, "SP{}", resolution),
            PredictorSetKey::RemoteSensing { resolution } => write!(f, "RS{}", resolution),
        }
    }
}

/// A raster sampled as plot predictor
#[derive(Debug, Clone, PartialEq)]
pub struct PredictorDescriptor {
    pub short_name: String,
    pub full_name: String,
    pub path: PathBuf,
    pub resolution: u32,
    /// Band of multi-band sources
    pub band: Option<usize>,
}

impl PredictorDescriptor {
    pub fn new(short_name: &str, full_name: &str, path: impl Into<PathBuf>, resolution: u32) -> Self {
        Self {
            short_name: short_name.to_string(),
            full_name: full_name.to_string(),
            path: path.into(),
            resolution,
            band: None,
        }
    }

    pub fn with_band(mut self, band: usize) -> Self {
        self.band = Some(band);
        self
    }
}

/// Predictors grouped by set key
#[derive(Debug, Clone, Default)]
pub struct PredictorSets {
    sets: BTreeMap<PredictorSetKey, Vec<PredictorDescriptor>>,
}

impl PredictorSets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, key: PredictorSetKey, predictor: PredictorDescriptor) {
        self.sets.entry(key).or_default().push(predictor);
    }

    pub fn extend(&mut self, key: PredictorSetKey, predictors: impl IntoIterator<Item = PredictorDescriptor>) {
        self.sets.entry(key).or_default().extend(predictors);
    }

    pub fn get(&self, key: &PredictorSetKey) -> Option<&[PredictorDescriptor]> {
        self.sets.get(key).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PredictorSetKey, &Vec<PredictorDescriptor>)> {
        self.sets.iter()
    }

    pub fn len(&self) -> usize {
        self.sets.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub const SLOPE_ASPECT: &str = "grass7:r.slope.aspect";
pub const SOLAR_IRRADIATION: &str = "grass7:r.sun.insoltime";
pub const CATCHMENT_AREA: &str = "saga:catchmentarea";
pub const SLOPE_ASPECT_CURVATURE: &str = "saga:slopeaspectcurvature";
pub const WETNESS_INDEX: &str = "saga:topographicwetnessindextwi";
pub const POSITION_INDEX: &str = "gdal:tpitopographicpositionindex";
pub const WARP_REPROJECT: &str = "gdal:warpreproject";

/// Output rasters derived from one terrain raster
#[derive(Debug, Clone)]
pub struct TerrainOutputs {
    pub slope: PathBuf,
    pub aspect: PathBuf,
    pub profile_curvature: PathBuf,
    pub tangential_curvature: PathBuf,
    pub first_order_ew: PathBuf,
    pub first_order_ns: PathBuf,
    pub second_order_dxx: PathBuf,
    pub second_order_dyy: PathBuf,
    pub second_order_dxy: PathBuf,
    pub irradiation: PathBuf,
    pub insolation_time: PathBuf,
    pub diffuse_radiation: PathBuf,
    pub ground_reflected: PathBuf,
    pub global_total: PathBuf,
    pub catchment_area: PathBuf,
    pub saga_slope: PathBuf,
    pub twi: PathBuf,
    pub tpi: PathBuf,
}

impl TerrainOutputs {
    /// `<folder>/<prefix>_<Product>.tif` for every product
    pub fn in_folder(folder: &Path, prefix: &str) -> Self {
        let path = |suffix: &str| folder.join(format!("{}_{}.tif", prefix, suffix));
        Self {
            slope: path("Slope"),
            aspect: path("Aspect"),
            profile_curvature: path("Profile_Curvature"),
            tangential_curvature: path("Tangential_Curvature"),
            first_order_ew: path("First_Order_Derivative_EW"),
            first_order_ns: path("First_Order_Derivative_NS"),
            second_order_dxx: path("Second_Order_Derivative_DXX"),
            second_order_dyy: path("Second_Order_Derivative_DYY"),
            second_order_dxy: path("Second_Order_Derivative_DXY"),
            irradiation: path("Irradiation"),
            insolation_time: path("InsolationTime"),
            diffuse_radiation: path("DiffuseRadiation"),
            ground_reflected: path("GroundReflectedIrradiation"),
            global_total: path("GlobalTotalOutput"),
            catchment_area: path("CatchmentArea"),
            saga_slope: path("SagaSlope"),
            twi: path("TWI"),
            tpi: path("TPI"),
        }
    }
}

/// The six algorithm calls deriving every terrain product, in dependency order.
///
/// Both GRASS calls get the same integer `extent` so all fourteen GRASS
/// products share the source raster's region.
pub fn terrain_algorithm_calls(dem: &Path, extent: &str, out: &TerrainOutputs) -> Vec<AlgorithmCall> {
    let region = || ParamValue::Text(extent.to_string());
    vec![
        AlgorithmCall::new(SLOPE_ASPECT)
            .input("elevation", dem)
            .param("format", ParamValue::Integer(0))
            .param("precision", ParamValue::Integer(1))
            .param("-a", ParamValue::Bool(false))
            .param("zscale", ParamValue::Number(1.0))
            .param("min_slope", ParamValue::Number(0.0))
            .param("GRASS_REGION_PARAMETER", region())
            .param("GRASS_REGION_CELLSIZE_PARAMETER", ParamValue::Number(0.0))
            .output("slope", &out.slope)
            .output("aspect", &out.aspect)
            .output("pcurvature", &out.profile_curvature)
            .output("tcurvature", &out.tangential_curvature)
            .output("dx", &out.first_order_ew)
            .output("dy", &out.first_order_ns)
            .output("dxx", &out.second_order_dxx)
            .output("dyy", &out.second_order_dyy)
            .output("dxy", &out.second_order_dxy),
        AlgorithmCall::new(SOLAR_IRRADIATION)
            .input("elevation", dem)
            .input("aspect", &out.aspect)
            .input("slope", &out.slope)
            .param("day", ParamValue::Integer(180))
            .param("step", ParamValue::Number(0.5))
            .param("declination", ParamValue::Number(0.0))
            .param("distance_step", ParamValue::Number(1.0))
            .param("-p", ParamValue::Bool(false))
            .param("-m", ParamValue::Bool(false))
            .param("GRASS_REGION_PARAMETER", region())
            .param("GRASS_REGION_CELLSIZE_PARAMETER", ParamValue::Number(0.0))
            .output("beam_rad", &out.irradiation)
            .output("insol_time", &out.insolation_time)
            .output("diff_rad", &out.diffuse_radiation)
            .output("refl_rad", &out.ground_reflected)
            .output("glob_rad", &out.global_total),
        AlgorithmCall::new(CATCHMENT_AREA)
            .input("ELEVATION", dem)
            .param("METHOD", ParamValue::Integer(0))
            .output("CAREA", &out.catchment_area),
        AlgorithmCall::new(SLOPE_ASPECT_CURVATURE)
            .input("ELEVATION", dem)
            .param("METHOD", ParamValue::Integer(6))
            .param("UNIT_SLOPE", ParamValue::Integer(1))
            .param("UNIT_ASPECT", ParamValue::Integer(1))
            .output("SLOPE", &out.saga_slope),
        AlgorithmCall::new(WETNESS_INDEX)
            .input("SLOPE", &out.saga_slope)
            .input("AREA", &out.catchment_area)
            .param("CONV", ParamValue::Integer(1))
            .param("METHOD", ParamValue::Integer(0))
            .output("TWI", &out.twi),
        AlgorithmCall::new(POSITION_INDEX)
            .input("INPUT", dem)
            .param("BAND", ParamValue::Integer(1))
            .param("COMPUTE_EDGES", ParamValue::Bool(false))
            .output("OUTPUT", &out.tpi),
    ]
}

/// Predictor descriptors for the derived products plus the source raster
pub fn terrain_predictors(dem: &Path, out: &TerrainOutputs, resolution: u32) -> Vec<PredictorDescriptor> {
    let products: [(&str, &str, &Path); 18] = [
        ("SLO", "Slope", out.slope.as_path()),
        ("ASP", "Aspect", out.aspect.as_path()),
        ("PRC", "Profile Curvature", out.profile_curvature.as_path()),
        ("TAC", "Tangential Curvature", out.tangential_curvature.as_path()),
        ("FEW", "First Order Derivative EW", out.first_order_ew.as_path()),
        ("FNS", "First Order Derivative NS", out.first_order_ns.as_path()),
        ("SXX", "Second Order Derivative DXX", out.second_order_dxx.as_path()),
        ("SXY", "Second Order Derivative DXY", out.second_order_dxy.as_path()),
        ("SYY", "Second Order Derivative DYY", out.second_order_dyy.as_path()),
        ("IRR", "Beam Irradiation", out.irradiation.as_path()),
        ("INT", "Insolation Time", out.insolation_time.as_path()),
        ("DIF", "Diffuse Irradiation", out.diffuse_radiation.as_path()),
        ("GRI", "Ground Reflected Irradiation", out.ground_reflected.as_path()),
        ("GLO", "Global Irradiation", out.global_total.as_path()),
        ("CAA", "Catchment Area", out.catchment_area.as_path()),
        ("TWI", "Topographic Wetness Index", out.twi.as_path()),
        ("TPI", "Topographic Position Index", out.tpi.as_path()),
        ("DTM", "Digital Terrain Model", dem),
    ];
    products
        .iter()
        .map(|(code, name, path)| PredictorDescriptor::new(code, name, *path, resolution))
        .collect()
}

/// Derive every terrain product of `dem_path` into `<output_folder>/<basename>/`
pub fn compute_raster_variables(
    backend: &dyn GeoBackend,
    dem_path: &Path,
    output_folder: &Path,
) -> PipelineResult<Vec<PredictorDescriptor>> {
    let prefix = basename(dem_path);
    let folder = output_folder.join(&prefix);
    ensure_folder(&folder)?;

    let resolution = resolution_from_name(dem_path)?;
    let info = backend.load_raster(dem_path)?;
    let extent = info.extent.to_extent_string();
    log::info!("Deriving terrain variables of {} ({} m, extent {})", dem_path.display(), resolution, extent);

    let outputs = TerrainOutputs::in_folder(&folder, &prefix);
    for call in terrain_algorithm_calls(dem_path, &extent, &outputs) {
        backend.run_algorithm(&call)?;
    }

    Ok(terrain_predictors(dem_path, &outputs, resolution))
}

/// Terrain predictors for every `.tif` in `dem_directory`.
///
/// Two DEMs mapping to the same set key are rejected before anything is derived for the second.
pub fn create_terrain_predictors(
    backend: &dyn GeoBackend,
    dem_directory: &Path,
    output_directory: &Path,
) -> PipelineResult<PredictorSets> {
    let mut sets = PredictorSets::new();
    let mut sources: BTreeMap<PredictorSetKey, PathBuf> = BTreeMap::new();
    for dem in list_files_with_extension(dem_directory, ".tif")? {
        let key = PredictorSetKey::from_terrain_file(&dem)?;
        if let Some(previous) = sources.get(&key) {
            return Err(PipelineError::InvalidFormat(format!(
                "{} and {} both map to predictor set {}",
                file_name(previous),
                file_name(&dem),
                key
            )));
        }
        sources.insert(key, dem.clone());
        let predictors = compute_raster_variables(backend, &dem, output_directory)?;
        sets.extend(key, predictors);
    }
    Ok(sets)
}

/// `gdal:warpreproject` output type index for Float32
pub const WARP_DATA_TYPE_FLOAT32: i64 = 6;

/// GeoTIFF creation options of reprojected rasters
pub const WARP_CREATION_OPTIONS: &str = "COMPRESS=DEFLATE|PREDICTOR=1|ZLEVEL=6";

/// How an auxiliary raster family is brought into the target system
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReprojectionSpec {
    pub source_crs: String,
    pub target_crs: String,
    /// Output cell size in target units
    pub resolution: u32,
    /// GDAL warp resampling index (0 nearest, 1 bilinear)
    pub resampling: i64,
    /// Prefix added to the reprojected file name
    pub file_prefix: String,
}

impl ReprojectionSpec {
    pub fn reprojected_path(&self, source: &Path) -> PathBuf {
        let name = format!("{}{}", self.file_prefix, file_name(source));
        match source.parent() {
            Some(parent) => parent.join(name),
            None => PathBuf::from(name),
        }
    }

    pub fn warp_call(&self, source: &Path, output: &Path) -> AlgorithmCall {
        AlgorithmCall::new(WARP_REPROJECT)
            .input("INPUT", source)
            .param("SOURCE_CRS", ParamValue::Text(self.source_crs.clone()))
            .param("TARGET_CRS", ParamValue::Text(self.target_crs.clone()))
            .param("RESAMPLING", ParamValue::Integer(self.resampling))
            .param("TARGET_RESOLUTION", ParamValue::Number(f64::from(self.resolution)))
            .param("DATA_TYPE", ParamValue::Integer(WARP_DATA_TYPE_FLOAT32))
            .param("OPTIONS", ParamValue::Text(WARP_CREATION_OPTIONS.to_string()))
            .output("OUTPUT", output)
    }
}

/// Reproject soil-grid rasters and file them under `SP<resolution>`
pub fn add_soil_grid_predictors(
    backend: &dyn GeoBackend,
    sets: &mut PredictorSets,
    records: &[SoilGridRecord],
    spec: &ReprojectionSpec,
) -> PipelineResult<()> {
    let key = PredictorSetKey::SoilGrid { resolution: spec.resolution };
    for record in records {
        let reprojected = spec.reprojected_path(&record.path);
        log::info!("Reprojecting soil grid {} -> {}", record.path.display(), reprojected.display());
        backend.run_algorithm(&spec.warp_call(&record.path, &reprojected))?;
        sets.add(
            key,
            PredictorDescriptor::new(&record.short_name, &record.description, reprojected, spec.resolution),
        );
    }
    Ok(())
}

/// Reproject remote-sensing rasters and file them under `RS<resolution>` with their band
pub fn add_remote_sensing_predictors(
    backend: &dyn GeoBackend,
    sets: &mut PredictorSets,
    records: &[RemoteSensingRecord],
    spec: &ReprojectionSpec,
) -> PipelineResult<()> {
    let key = PredictorSetKey::RemoteSensing { resolution: spec.resolution };
    for record in records {
        let reprojected = spec.reprojected_path(&record.path);
        log::info!("Reprojecting {} band {} -> {}", record.path.display(), record.band, reprojected.display());
        backend.run_algorithm(&spec.warp_call(&record.path, &reprojected))?;
        sets.add(
            key,
            PredictorDescriptor::new(&record.short_name, &record.description, reprojected, spec.resolution)
                .with_band(record.band),
        );
    }
    Ok(())
}

/// Column prefix, band and statistics used for one predictor
pub fn zonal_plan(key: &PredictorSetKey, predictor: &PredictorDescriptor) -> (String, usize, &'static [ZonalStat]) {
    match (key.is_banded(), predictor.band) {
        (true, Some(band)) => (
            format!("{}{}{}", key, predictor.short_name, band),
            band,
            &ZonalStat::BANDED,
        ),
        (true, None) => (format!("{}{}", key, predictor.short_name), 1, &ZonalStat::BANDED),
        (false, _) => (format!("{}{}", key, predictor.short_name), 1, &ZonalStat::SINGLE_BAND),
    }
}

/// Study-area layer name for a buffer size, `StudyArea_<buffer>m.shp`
pub fn study_area_layer_name(buffer: Radius) -> String {
    format!("StudyArea_{}m.shp", buffer)
}

/// Buffer the plots by every size and sample every predictor.
///
/// Each buffer size gets a polygon shapefile in `crs` plus a CSV of the same
/// attributes under the untruncated column names. Returns the shapefile per buffer size.
pub fn compute_zonal_statistics<'a>(
    backend: &dyn GeoBackend,
    plots: impl IntoIterator<Item = &'a StudyPlot> + Clone,
    buffers: &[Radius],
    sets: &PredictorSets,
    output_directory: &Path,
    crs: Option<&str>,
) -> PipelineResult<BTreeMap<Radius, PathBuf>> {
    ensure_folder(output_directory)?;
    let mut written = BTreeMap::new();
    for &buffer in buffers {
        let mut layer = PlotBufferLayer::from_plots(plots.clone(), buffer);
        if layer.features.is_empty() {
            return Err(PipelineError::InvalidFormat("No plots to buffer".to_string()));
        }
        log::info!("Computing zonal statistics for {} plots with {} m buffer", layer.features.len(), buffer);

        for (key, predictors) in sets.iter() {
            for predictor in predictors {
                let (prefix, band, stats) = zonal_plan(key, predictor);
                backend.zonal_statistics(&mut layer, &predictor.path, band, &prefix, stats)?;
            }
        }

        let layer_path = output_directory.join(study_area_layer_name(buffer));
        layer.write_shapefile(&layer_path, crs)?;
        layer.write_csv(&layer_path.with_extension("csv"))?;
        written.insert(buffer, layer_path);
    }
    Ok(written)
}
