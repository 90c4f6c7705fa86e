//! FUSION point-cloud steps: ground DTM, per-plot clipping and cloud metrics
//!
//! Command lines follow FUSION's positional conventions exactly; FUSION parses
//! switches by prefix and is sensitive to argument order.

use crate::core::study::{CloudMetricsFile, StudyArea, StudyPlot};
use crate::core::tools::{ToolCommand, ToolRunner};
use crate::io::paths::ensure_folder;
use crate::types::{BoundingBox, PipelineError, PipelineResult, Radius};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// DTM creation parameters for `gridsurfacecreate`
#[derive(Debug, Clone)]
pub struct DtmParams {
    /// Cell size in meters, passed verbatim
    pub resolution: String,
    /// UTM zone, e.g. `37S`
    pub utm_zone: String,
    /// LAS classes, comma separated (`2` for ground)
    pub classes: String,
}

impl Default for DtmParams {
    fn default() -> Self {
        Self {
            resolution: "1".to_string(),
            utm_zone: "37S".to_string(),
            classes: "2".to_string(),
        }
    }
}

/// Location of the FUSION executables
#[derive(Debug, Clone)]
pub struct FusionTools {
    folder: PathBuf,
}

impl FusionTools {
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        Self { folder: folder.into() }
    }

    fn executable(&self, name: &str) -> PathBuf {
        self.folder.join(name)
    }

    /// `gridsurfacecreate.exe /class:<c> <out> <res> M M 1 <zone> 0 0 <list>`
    pub fn gridsurfacecreate(&self, params: &DtmParams, output_path: &Path, las_list: &Path) -> ToolCommand {
        ToolCommand::new(self.executable("gridsurfacecreate.exe"))
            .arg(format!("/class:{}", params.classes))
            .arg(output_path.display().to_string())
            .arg(params.resolution.clone())
            .args(["M", "M", "1"])
            .arg(params.utm_zone.clone())
            .args(["0", "0"])
            .arg(las_list.display().to_string())
    }

    /// `clipdata.exe /height /shape:1 /class:<c> /dtm:<dtm> <list> <out> <xmin> <ymin> <xmax> <ymax>`
    pub fn clipdata(
        &self,
        classes: &str,
        dtm_path: &Path,
        las_list: &Path,
        output_path: &Path,
        bbox: &BoundingBox,
    ) -> ToolCommand {
        ToolCommand::new(self.executable("clipdata.exe"))
            .args(["/height", "/shape:1"])
            .arg(format!("/class:{}", classes))
            .arg(format!("/dtm:{}", dtm_path.display()))
            .arg(las_list.display().to_string())
            .arg(output_path.display().to_string())
            .args(bbox.to_fusion_string().split(' ').map(str::to_string).collect::<Vec<_>>())
    }

    /// `cloudmetrics.exe /id /above:<above> <plot> <out>`
    pub fn cloudmetrics(&self, above: u32, plot_path: &Path, output_path: &Path) -> ToolCommand {
        ToolCommand::new(self.executable("cloudmetrics.exe"))
            .arg("/id")
            .arg(format!("/above:{}", above))
            .arg(plot_path.display().to_string())
            .arg(output_path.display().to_string())
    }
}

/// Create the ground DTM; fails when the tool leaves no output behind
pub fn create_fusion_dtm(
    runner: &dyn ToolRunner,
    tools: &FusionTools,
    params: &DtmParams,
    output_path: &Path,
    las_list: &Path,
) -> PipelineResult<()> {
    let command = tools.gridsurfacecreate(params, output_path, las_list);
    log::info!("Creating DTM: {}", command);
    runner.run(&command)?;

    if output_path.is_file() {
        log::info!("FUSION DTM created successfully: {}", output_path.display());
        Ok(())
    } else {
        Err(PipelineError::DtmMissing(output_path.to_path_buf()))
    }
}

/// Create the DTM unless it already exists. Returns whether the tool ran.
pub fn ensure_fusion_dtm(
    runner: &dyn ToolRunner,
    tools: &FusionTools,
    params: &DtmParams,
    output_path: &Path,
    las_list: &Path,
) -> PipelineResult<bool> {
    if output_path.exists() {
        log::info!("DTM exists, skipping creation: {}", output_path.display());
        return Ok(false);
    }
    create_fusion_dtm(runner, tools, params, output_path, las_list)?;
    Ok(true)
}

/// Settings shared by every clip call
#[derive(Debug, Clone)]
pub struct ClipSettings<'a> {
    pub classes: &'a str,
    pub dtm_path: &'a Path,
    pub las_list: &'a Path,
}

/// Outcome of a clip pass over all plots
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClipSummary {
    pub invoked: usize,
    pub skipped: usize,
}

/// Bounding box of a plot for a clipping radius
pub fn make_bounding_box(plot: &StudyPlot, radius: Radius) -> BoundingBox {
    BoundingBox::around(plot.location, radius)
}

/// Clip every plot of `area` at `radius` into `output_dir/<cluster>.<plot>.las`.
///
/// The clipped path is recorded on each plot before anything runs. Existing
/// outputs are never clipped again, and each output path is claimed once so
/// repeated plot rows cannot launch two clips of the same file.
pub fn clip_plots(
    runner: &dyn ToolRunner,
    tools: &FusionTools,
    settings: &ClipSettings<'_>,
    area: &mut StudyArea,
    radius: Radius,
    output_dir: &Path,
) -> PipelineResult<ClipSummary> {
    ensure_folder(output_dir)?;

    let mut jobs = Vec::with_capacity(area.plot_count());
    for plot in area.plots_mut() {
        let clipped_path = output_dir.join(plot.clip_file_name());
        let command = tools.clipdata(
            settings.classes,
            settings.dtm_path,
            settings.las_list,
            &clipped_path,
            &make_bounding_box(plot, radius),
        );
        plot.add_plot_path(radius, clipped_path.clone());
        jobs.push((clipped_path, command));
    }

    let claimed: Mutex<HashSet<PathBuf>> = Mutex::new(HashSet::new());
    let run_job = |(path, command): &(PathBuf, ToolCommand)| -> PipelineResult<bool> {
        let first_claim = claimed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(path.clone());
        if !first_claim || path.exists() {
            log::debug!("Clip exists, skipping: {}", path.display());
            return Ok(false);
        }
        log::debug!("Clipping {}", path.display());
        runner.run(command)?;
        Ok(true)
    };

    #[cfg(feature = "parallel")]
    let outcomes: Vec<bool> = jobs.par_iter().map(run_job).collect::<PipelineResult<_>>()?;
    #[cfg(not(feature = "parallel"))]
    let outcomes: Vec<bool> = jobs.iter().map(run_job).collect::<PipelineResult<_>>()?;

    let invoked = outcomes.iter().filter(|ran| **ran).count();
    let summary = ClipSummary {
        invoked,
        skipped: outcomes.len() - invoked,
    };
    log::info!(
        "Clipped {} plots at {} m radius ({} already present)",
        summary.invoked,
        radius,
        summary.skipped
    );
    Ok(summary)
}

/// Run cloudmetrics for one clipped plot. Returns `false` when the clip is missing.
pub fn create_cloudmetrics(
    runner: &dyn ToolRunner,
    tools: &FusionTools,
    above: u32,
    plot_path: &Path,
    output_path: &Path,
) -> PipelineResult<bool> {
    if !plot_path.exists() {
        log::warn!("{} plot not found", plot_path.display());
        return Ok(false);
    }
    runner.run(&tools.cloudmetrics(above, plot_path, output_path))?;
    Ok(true)
}

/// Cloud metrics for every threshold and radius.
///
/// Plots of one (radius, threshold) pair append to the same output file, so
/// the invocations stay sequential.
pub fn compute_cloudmetrics(
    runner: &dyn ToolRunner,
    tools: &FusionTools,
    area: &mut StudyArea,
    radii: &[Radius],
    above_values: &[u32],
    output_root: &Path,
) -> PipelineResult<usize> {
    let mut invocations = 0;
    for &above in above_values {
        for &radius in radii {
            let radius_directory = output_root.join(radius.to_string());
            let output_path = radius_directory.join(format!("{}h_cloudmetrics_result.csv", above));
            log::info!("Computing cloudmetrics above {} m for {} m radius", above, radius);
            area.add_cloudmetrics_file(
                radius,
                CloudMetricsFile {
                    path: output_path.clone(),
                    min_height: above,
                    above,
                },
            );

            for plot in area.plots() {
                match plot.plot_path(radius) {
                    Some(plot_path) => {
                        if create_cloudmetrics(runner, tools, above, plot_path, &output_path)? {
                            invocations += 1;
                        }
                    }
                    None => log::warn!(
                        "Plot {}.{} has no clip for {} m radius",
                        plot.cluster,
                        plot.plot,
                        radius
                    ),
                }
            }
        }
    }
    Ok(invocations)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gridsurfacecreate_command() {
        let tools = FusionTools::new("F:/FUSION/");
        let command = tools.gridsurfacecreate(
            &DtmParams::default(),
            Path::new("out/Sentinel_1m.dtm"),
            Path::new("las/las_list.txt"),
        );
        assert_eq!(
            command.command_line(),
            "F:/FUSION/gridsurfacecreate.exe /class:2 out/Sentinel_1m.dtm 1 M M 1 37S 0 0 las/las_list.txt"
        );
    }

    #[test]
    fn test_clipdata_command() {
        let tools = FusionTools::new("/opt/fusion");
        let plot = StudyPlot::new("1", "1", 100.0, 200.0);
        let command = tools.clipdata(
            "2,3,5",
            Path::new("ground.dtm"),
            Path::new("las_list.txt"),
            Path::new("10.0/1.1.las"),
            &make_bounding_box(&plot, Radius(10.0)),
        );
        assert_eq!(
            command.command_line(),
            "/opt/fusion/clipdata.exe /height /shape:1 /class:2,3,5 /dtm:ground.dtm las_list.txt 10.0/1.1.las 90.0 190.0 110.0 210.0"
        );
    }

    #[test]
    fn test_cloudmetrics_command() {
        let tools = FusionTools::new("/opt/fusion");
        let command = tools.cloudmetrics(4, Path::new("a.las"), Path::new("4h.csv"));
        assert_eq!(command.command_line(), "/opt/fusion/cloudmetrics.exe /id /above:4 a.las 4h.csv");
    }
}
