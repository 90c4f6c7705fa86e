//! Zonal statistics of rasters over buffered plot circles

use crate::core::study::StudyPlot;
use crate::io::paths::python_float_str;
use crate::io::raster::RasterGrid;
use crate::types::{Coordinate, PipelineError, PipelineResult, Radius};
use gdal::spatial_ref::SpatialRef;
use gdal::vector::{Feature, Geometry, LayerAccess, OGRFieldType, OGRwkbGeometryType};
use gdal::{DriverManager, LayerOptions};
use std::collections::HashSet;
use std::path::Path;

/// Attribute columns every layer starts with
const BASE_FIELDS: [&str; 4] = ["Cluster", "Plot", "Long_X", "Lat_y"];

/// dBASE limit on attribute names
const DBF_FIELD_NAME_LEN: usize = 10;

/// Segments per quarter circle of a buffered plot
const BUFFER_QUAD_SEGMENTS: u32 = 5;

/// Files making up one shapefile
const SHAPEFILE_PARTS: [&str; 5] = ["shp", "shx", "dbf", "prj", "cpg"];

/// Statistic written to the layer, in QGIS column naming
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZonalStat {
    Mean,
    Max,
    Min,
    Range,
    StDev,
}

impl ZonalStat {
    /// Full set used for single-band predictors
    pub const SINGLE_BAND: [ZonalStat; 5] = [
        ZonalStat::Mean,
        ZonalStat::Max,
        ZonalStat::Min,
        ZonalStat::Range,
        ZonalStat::StDev,
    ];

    /// Reduced set used for banded remote-sensing predictors
    pub const BANDED: [ZonalStat; 2] = [ZonalStat::Mean, ZonalStat::StDev];

    pub fn suffix(self) -> &'static str {
        match self {
            ZonalStat::Mean => "mean",
            ZonalStat::Max => "max",
            ZonalStat::Min => "min",
            ZonalStat::Range => "range",
            ZonalStat::StDev => "stdev",
        }
    }
}

/// Running statistics over the cells of one zone
#[derive(Debug, Clone, Copy, Default)]
pub struct ZoneSummary {
    pub count: usize,
    sum: f64,
    sum_sq: f64,
    min: f64,
    max: f64,
}

impl ZoneSummary {
    fn push(&mut self, value: f64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.count += 1;
        self.sum += value;
        self.sum_sq += value * value;
    }

    /// Value of `stat`, `None` for an empty zone
    pub fn get(&self, stat: ZonalStat) -> Option<f64> {
        if self.count == 0 {
            return None;
        }
        let n = self.count as f64;
        let mean = self.sum / n;
        Some(match stat {
            ZonalStat::Mean => mean,
            ZonalStat::Max => self.max,
            ZonalStat::Min => self.min,
            ZonalStat::Range => self.max - self.min,
            ZonalStat::StDev => (self.sum_sq / n - mean * mean).max(0.0).sqrt(),
        })
    }
}

/// Cells whose centre lies within `radius` of `center`.
///
/// A circle smaller than one cell falls back to the cell under its centre.
pub fn summarize_circle(grid: &RasterGrid, center: Coordinate, radius: f64) -> ZoneSummary {
    let mut summary = ZoneSummary::default();
    let gt = &grid.geo_transform;
    let (rows, cols) = grid.data.dim();

    let col_a = ((center.long_x - radius - gt[0]) / gt[1]).floor();
    let col_b = ((center.long_x + radius - gt[0]) / gt[1]).floor();
    let row_a = ((center.lat_y + radius - gt[3]) / gt[5]).floor();
    let row_b = ((center.lat_y - radius - gt[3]) / gt[5]).floor();

    let col_start = col_a.min(col_b).max(0.0) as usize;
    let col_end = (col_a.max(col_b) + 1.0).clamp(0.0, cols as f64) as usize;
    let row_start = row_a.min(row_b).max(0.0) as usize;
    let row_end = (row_a.max(row_b) + 1.0).clamp(0.0, rows as f64) as usize;

    let radius_sq = radius * radius;
    for row in row_start..row_end {
        for col in col_start..col_end {
            let (x, y) = grid.cell_center(row, col);
            let dx = x - center.long_x;
            let dy = y - center.lat_y;
            if dx * dx + dy * dy <= radius_sq {
                let value = grid.data[[row, col]];
                if grid.is_valid(value) {
                    summary.push(value);
                }
            }
        }
    }

    if summary.count == 0 {
        if let Some(value) = grid.sample(center.long_x, center.lat_y) {
            summary.push(value);
        }
    }
    summary
}

/// Plot circle of the layer
#[derive(Debug, Clone)]
pub struct ZoneFeature {
    pub cluster: String,
    pub plot: String,
    pub center: Coordinate,
}

/// Plots buffered by a fixed radius, with one attribute column per statistic
#[derive(Debug, Clone)]
pub struct PlotBufferLayer {
    pub buffer: Radius,
    pub features: Vec<ZoneFeature>,
    pub columns: Vec<String>,
    /// `values[feature][column]`
    pub values: Vec<Vec<Option<f64>>>,
}

impl PlotBufferLayer {
    pub fn from_plots<'a>(plots: impl IntoIterator<Item = &'a StudyPlot>, buffer: Radius) -> Self {
        let features: Vec<ZoneFeature> = plots
            .into_iter()
            .map(|plot| ZoneFeature {
                cluster: plot.cluster.clone(),
                plot: plot.plot.clone(),
                center: plot.location,
            })
            .collect();
        let values = vec![Vec::new(); features.len()];
        Self {
            buffer,
            features,
            columns: Vec::new(),
            values,
        }
    }

    pub fn column(&self, name: &str) -> Option<Vec<Option<f64>>> {
        let index = self.columns.iter().position(|c| c == name)?;
        Some(self.values.iter().map(|row| row[index]).collect())
    }

    /// Append `<prefix><stat>` columns computed from `grid`
    pub fn add_statistics(&mut self, grid: &RasterGrid, prefix: &str, stats: &[ZonalStat]) {
        let summaries: Vec<ZoneSummary> = self
            .features
            .iter()
            .map(|f| summarize_circle(grid, f.center, self.buffer.meters()))
            .collect();
        self.add_summaries(&summaries, prefix, stats);
    }

    /// Append `<prefix><stat>` columns from precomputed summaries, one per feature
    pub fn add_summaries(&mut self, summaries: &[ZoneSummary], prefix: &str, stats: &[ZonalStat]) {
        for &stat in stats {
            self.columns.push(format!("{}{}", prefix, stat.suffix()));
            for (row, summary) in self.values.iter_mut().zip(summaries) {
                row.push(summary.get(stat));
            }
        }
    }

    fn check_rows(&self) -> PipelineResult<()> {
        for (feature, row) in self.features.iter().zip(&self.values) {
            if row.len() != self.columns.len() {
                return Err(PipelineError::Processing(format!(
                    "Plot {}.{} has {} values for {} columns",
                    feature.cluster,
                    feature.plot,
                    row.len(),
                    self.columns.len()
                )));
            }
        }
        Ok(())
    }

    /// `Cluster;Plot;Long_X;Lat_y;<columns...>`, empty cells for empty zones
    pub fn write_csv(&self, path: &Path) -> PipelineResult<()> {
        self.check_rows()?;
        log::info!("Writing study area layer ({} plots, {} columns): {}", self.features.len(), self.columns.len(), path.display());
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b';')
            .quote(b'|')
            .from_path(path)?;

        let mut header: Vec<String> = BASE_FIELDS.iter().map(|f| f.to_string()).collect();
        header.extend(self.columns.iter().cloned());
        writer.write_record(&header)?;

        for (feature, row) in self.features.iter().zip(&self.values) {
            let mut record = vec![
                feature.cluster.clone(),
                feature.plot.clone(),
                python_float_str(feature.center.long_x),
                python_float_str(feature.center.lat_y),
            ];
            record.extend(row.iter().map(|v| v.map(|v| v.to_string()).unwrap_or_default()));
            writer.write_record(&record)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Polygon shapefile with one buffered circle per plot.
    ///
    /// Statistic columns become `Real` fields named by [`shapefile_field_names`];
    /// empty zones are left null. An existing layer at `path` is replaced.
    pub fn write_shapefile(&self, path: &Path, crs: Option<&str>) -> PipelineResult<()> {
        self.check_rows()?;
        log::info!("Writing study area shapefile ({} plots, {} columns): {}", self.features.len(), self.columns.len(), path.display());
        for ext in SHAPEFILE_PARTS {
            let part = path.with_extension(ext);
            if part.exists() {
                std::fs::remove_file(&part)?;
            }
        }

        let srs = crs.map(SpatialRef::from_definition).transpose()?;
        let driver = DriverManager::get_driver_by_name("ESRI Shapefile")?;
        let mut dataset = driver.create_vector_only(path)?;
        let name = path.file_stem().and_then(|s| s.to_str()).unwrap_or("StudyArea");
        let layer = dataset.create_layer(LayerOptions {
            name,
            srs: srs.as_ref(),
            ty: OGRwkbGeometryType::wkbPolygon,
            ..Default::default()
        })?;

        let field_names = shapefile_field_names(&self.columns);
        let mut definitions = vec![
            (BASE_FIELDS[0], OGRFieldType::OFTString),
            (BASE_FIELDS[1], OGRFieldType::OFTString),
            (BASE_FIELDS[2], OGRFieldType::OFTReal),
            (BASE_FIELDS[3], OGRFieldType::OFTReal),
        ];
        definitions.extend(field_names.iter().map(|n| (n.as_str(), OGRFieldType::OFTReal)));
        layer.create_defn_fields(&definitions)?;

        let radius = self.buffer.meters();
        for (feature, row) in self.features.iter().zip(&self.values) {
            let point = Geometry::from_wkt(&format!("POINT ({} {})", feature.center.long_x, feature.center.lat_y))?;
            let mut record = Feature::new(layer.defn())?;
            record.set_geometry(point.buffer(radius, BUFFER_QUAD_SEGMENTS)?)?;
            record.set_field_string(BASE_FIELDS[0], &feature.cluster)?;
            record.set_field_string(BASE_FIELDS[1], &feature.plot)?;
            record.set_field_double(BASE_FIELDS[2], feature.center.long_x)?;
            record.set_field_double(BASE_FIELDS[3], feature.center.lat_y)?;
            for (field, value) in field_names.iter().zip(row) {
                if let Some(value) = value {
                    record.set_field_double(field, *value)?;
                }
            }
            record.create(&layer)?;
        }
        Ok(())
    }
}

/// dBASE field names for `columns`: cut to ten characters, clashes get a `_<n>` tail
pub fn shapefile_field_names(columns: &[String]) -> Vec<String> {
    let mut used: HashSet<String> = BASE_FIELDS.iter().map(|f| f.to_uppercase()).collect();
    columns
        .iter()
        .map(|column| {
            let mut name: String = column.chars().take(DBF_FIELD_NAME_LEN).collect();
            let mut n = 1;
            while used.contains(&name.to_uppercase()) {
                let tail = format!("_{}", n);
                name = column.chars().take(DBF_FIELD_NAME_LEN - tail.len()).collect::<String>() + &tail;
                n += 1;
            }
            used.insert(name.to_uppercase());
            name
        })
        .collect()
}
