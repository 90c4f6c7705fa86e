//! Raster calculator: band averaging of several rasters

use crate::io::raster::{RasterGrid, OUTPUT_NO_DATA};
use crate::types::{PipelineError, PipelineResult};
use ndarray::Array2;
use std::path::PathBuf;

/// One operand of a raster calculation, referenced as `r<i>@<band>`
#[derive(Debug, Clone, PartialEq)]
pub struct RasterEntry {
    pub reference: String,
    pub path: PathBuf,
    pub band: usize,
}

/// First-band entries `r1@1 .. rN@1` for `paths`
pub fn first_band_entries(paths: &[PathBuf]) -> Vec<RasterEntry> {
    paths
        .iter()
        .enumerate()
        .map(|(i, path)| RasterEntry {
            reference: format!("r{}@1", i + 1),
            path: path.clone(),
            band: 1,
        })
        .collect()
}

/// `(r1@1 + r2@1 + ... + rN@1)/N`
pub fn average_expression(entries: &[RasterEntry]) -> String {
    let sum: Vec<&str> = entries.iter().map(|e| e.reference.as_str()).collect();
    format!("({})/{}", sum.join(" + "), entries.len())
}

/// Cell-wise mean of `grids` on the grid of the first one.
///
/// Other grids are sampled at each output cell centre (nearest cell). A cell
/// that is no-data or outside any input becomes no-data.
pub fn band_average(grids: &[RasterGrid]) -> PipelineResult<RasterGrid> {
    let reference = grids
        .first()
        .ok_or_else(|| PipelineError::Processing("Band average needs at least one raster".to_string()))?;

    let count = grids.len() as f64;
    let (rows, cols) = reference.data.dim();
    let mut data = Array2::from_elem((rows, cols), OUTPUT_NO_DATA);

    for row in 0..rows {
        for col in 0..cols {
            let first = reference.data[[row, col]];
            if !reference.is_valid(first) {
                continue;
            }
            let (x, y) = reference.cell_center(row, col);
            let mut sum = first;
            let mut complete = true;
            for other in &grids[1..] {
                match other.sample(x, y) {
                    Some(value) => sum += value,
                    None => {
                        complete = false;
                        break;
                    }
                }
            }
            if complete {
                data[[row, col]] = sum / count;
            }
        }
    }

    Ok(RasterGrid {
        data,
        geo_transform: reference.geo_transform,
        projection: reference.projection.clone(),
        no_data: Some(OUTPUT_NO_DATA),
    })
}
