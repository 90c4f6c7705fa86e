//! Input/output: plot tables, manifests, rasters and remote coverages

pub mod coverage;
pub mod manifest;
pub mod paths;
pub mod plot_csv;
pub mod raster;

pub use coverage::{CoverageClient, HttpCoverageClient};
pub use plot_csv::read_plots_from_csv;
pub use raster::{RasterGrid, RasterInfo};
