//! plotvars: predictor variables for forest inventory plots
//!
//! Drives FUSION over airborne laser scanning tiles to produce per-plot cloud
//! metrics, derives terrain predictors and samples them together with soil-grid
//! and remote-sensing rasters over buffered plots.

pub mod config;
pub mod core;
pub mod io;
pub mod logging;
pub mod pipeline;
pub mod types;

// Re-export main types and functions for easier access
pub use config::PipelineConfig;
pub use types::{BoundingBox, Coordinate, PipelineError, PipelineResult, Radius};
