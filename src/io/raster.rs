use crate::types::{BoundingBox, PipelineError, PipelineResult};
use gdal::raster::Buffer;
use gdal::{Dataset, DriverManager};
use ndarray::Array2;
use std::path::{Path, PathBuf};

/// No-data value written into derived rasters
pub const OUTPUT_NO_DATA: f64 = -9999.0;

/// Single raster band held in memory, north-up
#[derive(Debug, Clone)]
pub struct RasterGrid {
    /// Cell values, (rows, cols)
    pub data: Array2<f64>,
    /// GDAL geotransform: origin x, pixel width, rot, origin y, rot, pixel height
    pub geo_transform: [f64; 6],
    pub projection: String,
    pub no_data: Option<f64>,
}

impl RasterGrid {
    pub fn width(&self) -> usize {
        self.data.ncols()
    }

    pub fn height(&self) -> usize {
        self.data.nrows()
    }

    pub fn extent(&self) -> BoundingBox {
        let gt = &self.geo_transform;
        let x_end = gt[0] + self.width() as f64 * gt[1];
        let y_end = gt[3] + self.height() as f64 * gt[5];
        BoundingBox {
            min_x: gt[0].min(x_end),
            min_y: gt[3].min(y_end),
            max_x: gt[0].max(x_end),
            max_y: gt[3].max(y_end),
        }
    }

    /// Map coordinate of a cell centre
    pub fn cell_center(&self, row: usize, col: usize) -> (f64, f64) {
        let gt = &self.geo_transform;
        (
            gt[0] + (col as f64 + 0.5) * gt[1],
            gt[3] + (row as f64 + 0.5) * gt[5],
        )
    }

    /// Cell containing a map coordinate
    pub fn cell_at(&self, x: f64, y: f64) -> Option<(usize, usize)> {
        let gt = &self.geo_transform;
        let col = ((x - gt[0]) / gt[1]).floor();
        let row = ((y - gt[3]) / gt[5]).floor();
        if col < 0.0 || row < 0.0 || col >= self.width() as f64 || row >= self.height() as f64 {
            return None;
        }
        Some((row as usize, col as usize))
    }

    pub fn is_valid(&self, value: f64) -> bool {
        !value.is_nan() && self.no_data.map_or(true, |nd| value != nd)
    }

    /// Valid value of the cell containing a map coordinate
    pub fn sample(&self, x: f64, y: f64) -> Option<f64> {
        let (row, col) = self.cell_at(x, y)?;
        let value = self.data[[row, col]];
        self.is_valid(value).then_some(value)
    }
}

/// Header information of a raster file
#[derive(Debug, Clone)]
pub struct RasterInfo {
    pub width: usize,
    pub height: usize,
    pub band_count: usize,
    pub extent: BoundingBox,
    pub geo_transform: [f64; 6],
}

fn open_dataset(path: &Path) -> PipelineResult<Dataset> {
    Dataset::open(path).map_err(|e| PipelineError::RasterLoad {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

/// Open a raster and read its header
pub fn read_raster_info(path: &Path) -> PipelineResult<RasterInfo> {
    let dataset = open_dataset(path)?;
    let geo_transform = dataset.geo_transform()?;
    let (width, height) = dataset.raster_size();
    let band_count = dataset.raster_count().max(0) as usize;
    if band_count == 0 {
        return Err(PipelineError::RasterLoad {
            path: path.display().to_string(),
            reason: "dataset has no raster bands".to_string(),
        });
    }

    let grid_extent = RasterGrid {
        data: Array2::zeros((height, width)),
        geo_transform,
        projection: String::new(),
        no_data: None,
    }
    .extent();

    Ok(RasterInfo {
        width,
        height,
        band_count,
        extent: grid_extent,
        geo_transform,
    })
}

/// One band of an open raster, for repeated windowed reads
pub struct BandReader {
    dataset: Dataset,
    path: PathBuf,
    band: usize,
    geo_transform: [f64; 6],
    width: usize,
    height: usize,
}

impl BandReader {
    pub fn open(path: &Path, band: usize) -> PipelineResult<Self> {
        let dataset = open_dataset(path)?;
        if band == 0 || band > dataset.raster_count().max(0) as usize {
            return Err(PipelineError::RasterLoad {
                path: path.display().to_string(),
                reason: format!("band {} out of range", band),
            });
        }
        let geo_transform = dataset.geo_transform()?;
        let (width, height) = dataset.raster_size();
        Ok(Self {
            dataset,
            path: path.to_path_buf(),
            band,
            geo_transform,
            width,
            height,
        })
    }

    /// Cells overlapping `window`, or the whole band without one.
    /// `None` when the window misses the raster.
    pub fn read(&self, window: Option<&BoundingBox>) -> PipelineResult<Option<RasterGrid>> {
        let gt = self.geo_transform;
        let (col_min, row_min, cols, rows) = match window {
            Some(bbox) => match pixel_window(&gt, self.width, self.height, bbox) {
                Some(bounds) => bounds,
                None => return Ok(None),
            },
            None => (0, 0, self.width, self.height),
        };
        log::trace!(
            "Reading {}x{} cells at ({}, {}) of {} band {}",
            cols,
            rows,
            col_min,
            row_min,
            self.path.display(),
            self.band
        );

        let rasterband = self.dataset.rasterband(self.band as isize)?;
        let no_data = rasterband.no_data_value();
        let buffer = rasterband.read_as::<f64>(
            (col_min as isize, row_min as isize),
            (cols, rows),
            (cols, rows),
            None,
        )?;
        let data = Array2::from_shape_vec((rows, cols), buffer.data)
            .map_err(|e| PipelineError::Processing(format!("Failed to reshape raster data: {}", e)))?;

        let mut window_transform = gt;
        window_transform[0] = gt[0] + col_min as f64 * gt[1];
        window_transform[3] = gt[3] + row_min as f64 * gt[5];

        Ok(Some(RasterGrid {
            data,
            geo_transform: window_transform,
            projection: self.dataset.projection(),
            no_data,
        }))
    }
}

/// Read one band, optionally limited to the cells overlapping `window`
pub fn read_raster_band(path: &Path, band: usize, window: Option<&BoundingBox>) -> PipelineResult<RasterGrid> {
    log::debug!("Reading band {} of {}", band, path.display());
    BandReader::open(path, band)?.read(window)?.ok_or_else(|| {
        PipelineError::Processing(format!("Window {:?} does not overlap raster {}", window, path.display()))
    })
}

/// Pixel window `(col, row, cols, rows)` covering `bbox`, clamped to the raster
fn pixel_window(
    gt: &[f64; 6],
    width: usize,
    height: usize,
    bbox: &BoundingBox,
) -> Option<(usize, usize, usize, usize)> {
    let cols = [(bbox.min_x - gt[0]) / gt[1], (bbox.max_x - gt[0]) / gt[1]];
    let rows = [(bbox.max_y - gt[3]) / gt[5], (bbox.min_y - gt[3]) / gt[5]];

    let col_min = cols[0].min(cols[1]).floor().max(0.0);
    let col_max = cols[0].max(cols[1]).ceil().min(width as f64);
    let row_min = rows[0].min(rows[1]).floor().max(0.0);
    let row_max = rows[0].max(rows[1]).ceil().min(height as f64);

    if col_min >= col_max || row_min >= row_max {
        return None;
    }
    Some((
        col_min as usize,
        row_min as usize,
        (col_max - col_min) as usize,
        (row_max - row_min) as usize,
    ))
}

/// Write a grid as a single-band Float64 GeoTIFF
pub fn write_geotiff(grid: &RasterGrid, path: &Path) -> PipelineResult<()> {
    log::debug!("Writing {}x{} GeoTIFF: {}", grid.width(), grid.height(), path.display());
    let driver = DriverManager::get_driver_by_name("GTiff")?;
    let mut dataset = driver.create_with_band_type::<f64, _>(
        path,
        grid.width() as isize,
        grid.height() as isize,
        1,
    )?;
    dataset.set_geo_transform(&grid.geo_transform)?;
    if !grid.projection.is_empty() {
        dataset.set_projection(&grid.projection)?;
    }

    let mut band = dataset.rasterband(1)?;
    if let Some(no_data) = grid.no_data {
        band.set_no_data_value(Some(no_data))?;
    }
    let values: Vec<f64> = grid.data.iter().copied().collect();
    let buffer = Buffer::new((grid.width(), grid.height()), values);
    band.write((0, 0), (grid.width(), grid.height()), &buffer)?;
    Ok(())
}
