#![allow(dead_code)]

use plotvars::core::algebra::RasterEntry;
use plotvars::core::geoprocessing::{AlgorithmCall, GeoBackend};
use plotvars::core::zonal::{PlotBufferLayer, ZonalStat, ZoneSummary};
use plotvars::io::coverage::CoverageClient;
use plotvars::io::raster::RasterInfo;
use plotvars::{BoundingBox, PipelineError, PipelineResult};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Backend that touches every output and records what it was asked to do
#[derive(Default)]
pub struct RecordingBackend {
    pub loaded: Mutex<Vec<PathBuf>>,
    pub algorithms: Mutex<Vec<AlgorithmCall>>,
    pub averages: Mutex<Vec<(Vec<RasterEntry>, PathBuf)>>,
    pub zonal: Mutex<Vec<(String, usize, usize)>>,
}

impl RecordingBackend {
    pub fn algorithm_names(&self) -> Vec<String> {
        self.algorithms.lock().unwrap().iter().map(|c| c.algorithm.clone()).collect()
    }
}

fn touch(path: &Path) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, b"raster").unwrap();
}

impl GeoBackend for RecordingBackend {
    fn load_raster(&self, path: &Path) -> PipelineResult<RasterInfo> {
        if !path.exists() {
            return Err(PipelineError::RasterLoad {
                path: path.display().to_string(),
                reason: "missing".to_string(),
            });
        }
        self.loaded.lock().unwrap().push(path.to_path_buf());
        Ok(RasterInfo {
            width: 100,
            height: 80,
            band_count: 1,
            extent: BoundingBox { min_x: 350000.7, min_y: 9620000.2, max_x: 350500.9, max_y: 9620400.8 },
            geo_transform: [350000.7, 5.0, 0.0, 9620400.8, 0.0, -5.0],
        })
    }

    fn run_algorithm(&self, call: &AlgorithmCall) -> PipelineResult<()> {
        for output in call.outputs() {
            touch(output);
        }
        self.algorithms.lock().unwrap().push(call.clone());
        Ok(())
    }

    fn average_bands(&self, entries: &[RasterEntry], output: &Path) -> PipelineResult<()> {
        touch(output);
        self.averages.lock().unwrap().push((entries.to_vec(), output.to_path_buf()));
        Ok(())
    }

    fn zonal_statistics(
        &self,
        layer: &mut PlotBufferLayer,
        _raster: &Path,
        band: usize,
        prefix: &str,
        stats: &[ZonalStat],
    ) -> PipelineResult<()> {
        let empty = vec![ZoneSummary::default(); layer.features.len()];
        layer.add_summaries(&empty, prefix, stats);
        self.zonal.lock().unwrap().push((prefix.to_string(), band, stats.len()));
        Ok(())
    }
}

/// Coverage client writing a placeholder file per request
#[derive(Default)]
pub struct FakeCoverageClient {
    pub urls: Mutex<Vec<String>>,
    pub fail: bool,
}

impl CoverageClient for FakeCoverageClient {
    fn fetch(&self, url: &str, output_path: &Path) -> PipelineResult<()> {
        self.urls.lock().unwrap().push(url.to_string());
        if self.fail {
            return Err(PipelineError::Download(format!("HTTP 503 Service Unavailable: {}", url)));
        }
        touch(output_path);
        Ok(())
    }
}
