use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;

use crate::core::tools::ToolFailure;
use crate::io::paths::python_float_str;

/// Clipping / buffer radius in meters.
///
/// Used as a map key, so equality and ordering go through the bit pattern
/// and `total_cmp` instead of IEEE comparison.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Radius(pub f64);

impl Radius {
    pub fn meters(self) -> f64 {
        self.0
    }
}

impl PartialEq for Radius {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

impl Eq for Radius {}

impl Hash for Radius {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

impl PartialOrd for Radius {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Radius {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl std::fmt::Display for Radius {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", python_float_str(self.0))
    }
}

/// Projected coordinate of a plot centre (easting, northing)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub long_x: f64,
    pub lat_y: f64,
}

/// Axis-aligned bounding box in map units
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    /// Square of side `2 * radius` centred on `center`
    pub fn around(center: Coordinate, radius: Radius) -> Self {
        let r = radius.meters();
        Self {
            min_x: center.long_x - r,
            min_y: center.lat_y - r,
            max_x: center.long_x + r,
            max_y: center.lat_y + r,
        }
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// FUSION ordering: `xmin ymin xmax ymax`
    pub fn to_fusion_string(&self) -> String {
        format!(
            "{} {} {} {}",
            python_float_str(self.min_x),
            python_float_str(self.min_y),
            python_float_str(self.max_x),
            python_float_str(self.max_y)
        )
    }

    /// Processing-framework ordering with integer truncation: `xmin,xmax,ymin,ymax`
    pub fn to_extent_string(&self) -> String {
        format!(
            "{},{},{},{}",
            self.min_x as i64, self.max_x as i64, self.min_y as i64, self.max_y as i64
        )
    }
}

/// Error types for pipeline processing
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("Input plot CSV has faulty header {found:?}, expected Cluster;Plot;Long_X;Lat_y")]
    PlotHeader { found: Vec<String> },

    #[error("Invalid data format: {0}")]
    InvalidFormat(String),

    #[error("DTM generation failed, {} was not created. Check logs and input parameters", .0.display())]
    DtmMissing(PathBuf),

    #[error(transparent)]
    Tool(#[from] ToolFailure),

    #[error("Cannot load raster {path}: {reason}")]
    RasterLoad { path: String, reason: String },

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("Download error: {0}")]
    Download(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;
