//! Core pipeline modules

pub mod algebra;
pub mod fusion;
pub mod geoprocessing;
pub mod predictors;
pub mod soil_grids;
pub mod study;
pub mod tools;
pub mod zonal;

// Re-export main types
pub use algebra::{band_average, RasterEntry};
pub use fusion::{ClipSettings, ClipSummary, DtmParams, FusionTools};
pub use geoprocessing::{AlgorithmCall, GdalBackend, GeoBackend, ParamValue};
pub use predictors::{PredictorDescriptor, PredictorSetKey, PredictorSets, ReprojectionSpec};
pub use soil_grids::{CoverageSource, DataPair, SoilGroupKey, SoilGroups};
pub use study::{ClusterMap, CloudMetricsFile, StudyArea, StudyCluster, StudyPlot};
pub use tools::{ProcessRunner, ToolCommand, ToolFailure, ToolRunner};
pub use zonal::{PlotBufferLayer, ZonalStat};
