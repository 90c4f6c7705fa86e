//! Geoprocessing backend: raster loading, named algorithms, raster algebra,
//! zonal statistics

use crate::core::algebra::{average_expression, band_average, RasterEntry};
use crate::core::tools::{ToolCommand, ToolRunner};
use crate::core::zonal::{summarize_circle, PlotBufferLayer, ZonalStat, ZoneSummary};
use crate::io::raster::{read_raster_band, read_raster_info, write_geotiff, BandReader, RasterInfo};
use crate::types::{BoundingBox, PipelineError, PipelineResult};
use std::path::{Path, PathBuf};

/// Parameter value of a named algorithm
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Text(String),
    Number(f64),
    Integer(i64),
    Bool(bool),
    Input(PathBuf),
    /// Raster or file written by the algorithm
    Output(PathBuf),
}

impl ParamValue {
    pub fn render(&self) -> String {
        match self {
            ParamValue::Text(text) => text.clone(),
            ParamValue::Number(value) => value.to_string(),
            ParamValue::Integer(value) => value.to_string(),
            ParamValue::Bool(value) => value.to_string(),
            ParamValue::Input(path) | ParamValue::Output(path) => path.display().to_string(),
        }
    }
}

/// Invocation of a named processing algorithm, e.g. `saga:catchmentarea`
#[derive(Debug, Clone, PartialEq)]
pub struct AlgorithmCall {
    pub algorithm: String,
    pub params: Vec<(String, ParamValue)>,
}

impl AlgorithmCall {
    pub fn new(algorithm: impl Into<String>) -> Self {
        Self {
            algorithm: algorithm.into(),
            params: Vec::new(),
        }
    }

    pub fn param(mut self, key: &str, value: ParamValue) -> Self {
        self.params.push((key.to_string(), value));
        self
    }

    pub fn input(self, key: &str, path: &Path) -> Self {
        self.param(key, ParamValue::Input(path.to_path_buf()))
    }

    pub fn output(self, key: &str, path: &Path) -> Self {
        self.param(key, ParamValue::Output(path.to_path_buf()))
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.params.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn outputs(&self) -> Vec<&Path> {
        self.params
            .iter()
            .filter_map(|(_, v)| match v {
                ParamValue::Output(path) => Some(path.as_path()),
                _ => None,
            })
            .collect()
    }

    pub fn inputs(&self) -> Vec<&Path> {
        self.params
            .iter()
            .filter_map(|(_, v)| match v {
                ParamValue::Input(path) => Some(path.as_path()),
                _ => None,
            })
            .collect()
    }
}

/// Operations the predictor and soil-grid stages need from a GIS toolkit
pub trait GeoBackend {
    /// Open and validate a raster
    fn load_raster(&self, path: &Path) -> PipelineResult<RasterInfo>;

    /// Run a named processing algorithm to completion
    fn run_algorithm(&self, call: &AlgorithmCall) -> PipelineResult<()>;

    /// Evaluate `(e1 + ... + eN)/N` over the entries into `output`
    fn average_bands(&self, entries: &[RasterEntry], output: &Path) -> PipelineResult<()>;

    /// Append `<prefix><stat>` columns to `layer` from `band` of `raster`
    fn zonal_statistics(
        &self,
        layer: &mut PlotBufferLayer,
        raster: &Path,
        band: usize,
        prefix: &str,
        stats: &[ZonalStat],
    ) -> PipelineResult<()>;
}

/// Backend on GDAL for raster work and `qgis_process` for named algorithms
pub struct GdalBackend<'r> {
    qgis_process: PathBuf,
    debug: bool,
    runner: &'r dyn ToolRunner,
}

impl<'r> GdalBackend<'r> {
    pub fn new(qgis_process: impl Into<PathBuf>, debug: bool, runner: &'r dyn ToolRunner) -> Self {
        Self {
            qgis_process: qgis_process.into(),
            debug,
            runner,
        }
    }

    /// `qgis_process run <algorithm> -- KEY=VALUE ...`
    pub fn algorithm_command(&self, call: &AlgorithmCall) -> ToolCommand {
        let mut command = ToolCommand::new(&self.qgis_process)
            .arg("run")
            .arg(call.algorithm.clone())
            .arg("--");
        for (key, value) in &call.params {
            command = command.arg(format!("{}={}", key, value.render()));
        }
        if self.debug {
            command = command.env("QGIS_DEBUG", "1");
        }
        command
    }
}

impl GeoBackend for GdalBackend<'_> {
    fn load_raster(&self, path: &Path) -> PipelineResult<RasterInfo> {
        read_raster_info(path)
    }

    fn run_algorithm(&self, call: &AlgorithmCall) -> PipelineResult<()> {
        log::info!("Running {}", call.algorithm);
        self.runner.run(&self.algorithm_command(call))?;

        let missing: Vec<String> = call
            .outputs()
            .into_iter()
            .filter(|path| !path.exists())
            .map(|path| path.display().to_string())
            .collect();
        if !missing.is_empty() {
            return Err(PipelineError::Processing(format!(
                "{} finished without writing: {}",
                call.algorithm,
                missing.join(", ")
            )));
        }
        Ok(())
    }

    fn average_bands(&self, entries: &[RasterEntry], output: &Path) -> PipelineResult<()> {
        log::info!("Raster calculator: {} -> {}", average_expression(entries), output.display());
        let grids = entries
            .iter()
            .map(|entry| read_raster_band(&entry.path, entry.band, None))
            .collect::<PipelineResult<Vec<_>>>()?;
        let averaged = band_average(&grids)?;
        write_geotiff(&averaged, output)
    }

    fn zonal_statistics(
        &self,
        layer: &mut PlotBufferLayer,
        raster: &Path,
        band: usize,
        prefix: &str,
        stats: &[ZonalStat],
    ) -> PipelineResult<()> {
        log::debug!("Zonal statistics {} from {} band {}", prefix, raster.display(), band);
        let reader = BandReader::open(raster, band)?;
        let radius = layer.buffer.meters();

        let mut outside = 0;
        let mut summaries = Vec::with_capacity(layer.features.len());
        for feature in &layer.features {
            let window = BoundingBox::around(feature.center, layer.buffer);
            let summary = match reader.read(Some(&window))? {
                Some(grid) => summarize_circle(&grid, feature.center, radius),
                None => {
                    outside += 1;
                    ZoneSummary::default()
                }
            };
            summaries.push(summary);
        }
        if outside > 0 {
            log::warn!(
                "{} of {} plot buffers ({} m) fall outside {}",
                outside,
                layer.features.len(),
                layer.buffer,
                raster.display()
            );
        }

        layer.add_summaries(&summaries, prefix, stats);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tools::ToolFailure;

    struct NoopRunner;

    impl ToolRunner for NoopRunner {
        fn run(&self, _command: &ToolCommand) -> Result<(), ToolFailure> {
            Ok(())
        }
    }

    #[test]
    fn test_algorithm_command_line() {
        let runner = NoopRunner;
        let backend = GdalBackend::new("qgis_process", true, &runner);
        let call = AlgorithmCall::new("saga:catchmentarea")
            .input("ELEVATION", Path::new("dem.tif"))
            .param("METHOD", ParamValue::Integer(0))
            .output("CAREA", Path::new("ca.tif"));
        let command = backend.algorithm_command(&call);
        assert_eq!(
            command.command_line(),
            "qgis_process run saga:catchmentarea -- ELEVATION=dem.tif METHOD=0 CAREA=ca.tif"
        );
        assert_eq!(command.env, vec![("QGIS_DEBUG".to_string(), "1".to_string())]);
    }

    #[test]
    fn test_missing_output_is_error() {
        let runner = NoopRunner;
        let backend = GdalBackend::new("qgis_process", false, &runner);
        let call = AlgorithmCall::new("gdal:tpitopographicpositionindex")
            .output("OUTPUT", Path::new("/nonexistent/dir/tpi.tif"));
        let err = backend.run_algorithm(&call).unwrap_err();
        assert!(err.to_string().contains("tpi.tif"), "{}", err);
    }
}
