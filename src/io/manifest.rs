//! CSV manifests exchanged between the pipeline stages
//!
//! Every manifest is semicolon-delimited with `|` as quote character, which is
//! what the downstream modelling scripts read.

use crate::core::predictors::PredictorSets;
use crate::core::soil_grids::{DataPair, SoilGroups};
use crate::core::study::StudyArea;
use crate::types::{PipelineError, PipelineResult, Radius};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

pub const CLOUDMETRICS_MANIFEST: &str = "CloudMetricFiles.csv";
pub const PREDICTOR_RESULTS: &str = "predictor.csv";
pub const PREDICTOR_LEGEND: &str = "legend.csv";
pub const SOIL_DOWNLOAD_LOG: &str = "downloaded-soil-rasters.csv";
pub const SOIL_COMBINED_LOG: &str = "combined-soil-rasters.csv";

fn manifest_writer(path: &Path) -> PipelineResult<csv::Writer<BufWriter<File>>> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let file = File::create(path)?;
    Ok(csv::WriterBuilder::new()
        .delimiter(b';')
        .quote(b'|')
        .quote_style(csv::QuoteStyle::Necessary)
        .from_writer(BufWriter::new(file)))
}

fn manifest_reader(path: &Path) -> PipelineResult<csv::Reader<File>> {
    let file = File::open(path)?;
    Ok(csv::ReaderBuilder::new()
        .delimiter(b';')
        .quote(b'|')
        .trim(csv::Trim::All)
        .from_reader(file))
}

fn display_path(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Write one path per line (FUSION list file)
pub fn write_path_list(output_path: &Path, paths: &[PathBuf]) -> PipelineResult<()> {
    let mut writer = BufWriter::new(File::create(output_path)?);
    for path in paths {
        writeln!(writer, "{}", path.display())?;
    }
    writer.flush()?;
    Ok(())
}

/// `Resolution;Above;Path`, one row per (radius, threshold)
pub fn write_cloudmetrics_manifest(output_path: &Path, area: &StudyArea) -> PipelineResult<()> {
    log::info!("Writing cloudmetrics manifest: {}", output_path.display());
    let mut writer = manifest_writer(output_path)?;
    writer.write_record(["Resolution", "Above", "Path"])?;
    for (radius, files) in &area.cloudmetric_files {
        for file in files {
            writer.write_record([radius.to_string(), file.above.to_string(), display_path(&file.path)])?;
        }
    }
    writer.flush()?;
    Ok(())
}

/// `Resolution;Path`, one row per buffered study-area layer
pub fn write_results_file(output_directory: &Path, buffered: &BTreeMap<Radius, PathBuf>) -> PipelineResult<PathBuf> {
    let output_path = output_directory.join(PREDICTOR_RESULTS);
    log::info!("Writing predictor results: {}", output_path.display());
    let mut writer = manifest_writer(&output_path)?;
    writer.write_record(["Resolution", "Path"])?;
    for (buffer, path) in buffered {
        writer.write_record([buffer.to_string(), display_path(path)])?;
    }
    writer.flush()?;
    Ok(output_path)
}

/// `Short Name;Type;Resolution;Predictor;Input`, one row per predictor
pub fn write_legend_file(output_directory: &Path, predictors: &PredictorSets) -> PipelineResult<PathBuf> {
    let output_path = output_directory.join(PREDICTOR_LEGEND);
    log::info!("Writing predictor legend: {}", output_path.display());
    let mut writer = manifest_writer(&output_path)?;
    writer.write_record(["Short Name", "Type", "Resolution", "Predictor", "Input"])?;
    for (key, predictors) in predictors.iter() {
        for predictor in predictors {
            writer.write_record([
                format!("{}{}", key, predictor.short_name),
                key.source_type().to_string(),
                key.resolution().to_string(),
                predictor.full_name.clone(),
                display_path(&predictor.path),
            ])?;
        }
    }
    writer.flush()?;
    Ok(output_path)
}

#[derive(Debug, Serialize)]
struct DownloadLogRow<'a> {
    #[serde(rename = "Resolution")]
    resolution: u32,
    #[serde(rename = "Path")]
    path: String,
    #[serde(rename = "Description")]
    description: &'a str,
    #[serde(rename = "Short Name")]
    short_name: &'a str,
    #[serde(rename = "Soil Type")]
    soil_type: &'a str,
}

/// Flat per-coverage download log
pub fn write_download_log(
    output_directory: &Path,
    resolution: u32,
    data_pairs: &[DataPair],
) -> PipelineResult<PathBuf> {
    let output_path = output_directory.join(SOIL_DOWNLOAD_LOG);
    log::info!("Writing soil download log: {}", output_path.display());
    let mut writer = manifest_writer(&output_path)?;
    for pair in data_pairs {
        writer.serialize(DownloadLogRow {
            resolution,
            path: display_path(&pair.local_path(output_directory)),
            description: &pair.real_name,
            short_name: &pair.very_short_name,
            soil_type: &pair.soiltype,
        })?;
    }
    if data_pairs.is_empty() {
        writer.write_record(["Resolution", "Path", "Description", "Short Name", "Soil Type"])?;
    }
    writer.flush()?;
    Ok(output_path)
}

/// One row per averaged soil group
pub fn write_combined_log(
    output_directory: &Path,
    resolution: u32,
    groups: &SoilGroups,
) -> PipelineResult<PathBuf> {
    let output_path = output_directory.join(SOIL_COMBINED_LOG);
    log::info!("Writing combined soil log: {}", output_path.display());
    let mut writer = manifest_writer(&output_path)?;
    writer.write_record(["Resolution", "Path", "Description", "Short Name", "Short Names", "Soil Type"])?;
    for (key, members) in groups.iter() {
        let descriptions: String = members.iter().map(|m| format!("{},", m.real_name)).collect();
        let short_names: String = members.iter().map(|m| format!("{},", m.short_name)).collect();
        writer.write_record([
            resolution.to_string(),
            display_path(&output_directory.join(format!("{}.tif", key))),
            descriptions,
            key.short_code().unwrap_or_default().to_string(),
            short_names,
            key.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(output_path)
}

/// Row of the combined soil-grid manifest, as read back by the predictor stage
#[derive(Debug, Clone, Deserialize)]
pub struct SoilGridRecord {
    #[serde(rename = "Resolution")]
    pub resolution: String,
    #[serde(rename = "Path")]
    pub path: PathBuf,
    #[serde(rename = "Description")]
    pub description: String,
    #[serde(rename = "Short Name")]
    pub short_name: String,
    #[serde(rename = "Soil Type", default)]
    pub soil_type: String,
}

/// Row of the remote-sensing dataset list
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteSensingRecord {
    #[serde(rename = "Resolution")]
    pub resolution: String,
    #[serde(rename = "Path")]
    pub path: PathBuf,
    #[serde(rename = "Description")]
    pub description: String,
    #[serde(rename = "Short Name")]
    pub short_name: String,
    #[serde(rename = "Band")]
    pub band: usize,
}

fn read_records<T: for<'de> Deserialize<'de>>(path: &Path) -> PipelineResult<Vec<T>> {
    let mut reader = manifest_reader(path)?;
    let mut rows = Vec::new();
    for (index, row) in reader.deserialize().enumerate() {
        let row: T = row.map_err(|e| {
            PipelineError::InvalidFormat(format!("{} row {}: {}", path.display(), index + 2, e))
        })?;
        rows.push(row);
    }
    log::debug!("Read {} rows from {}", rows.len(), path.display());
    Ok(rows)
}

pub fn read_soil_grid_records(path: &Path) -> PipelineResult<Vec<SoilGridRecord>> {
    read_records(path)
}

pub fn read_remote_sensing_records(path: &Path) -> PipelineResult<Vec<RemoteSensingRecord>> {
    read_records(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::study::CloudMetricsFile;
    use tempfile::TempDir;

    #[test]
    fn test_cloudmetrics_manifest_rows() {
        let dir = TempDir::new().expect("temp dir");
        let mut area = StudyArea::new("Sentinel");
        for above in [0u32, 2] {
            for radius in [Radius(17.84), Radius(25.23)] {
                area.add_cloudmetrics_file(
                    radius,
                    CloudMetricsFile { path: PathBuf::from(format!("out/{}/{}h.csv", radius, above)), min_height: above, above },
                );
            }
        }
        let path = dir.path().join(CLOUDMETRICS_MANIFEST);
        write_cloudmetrics_manifest(&path, &area).expect("write");
        let text = std::fs::read_to_string(&path).expect("read");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Resolution;Above;Path");
        assert_eq!(lines[1], "17.84;0;out/17.84/0h.csv");
        assert_eq!(lines[2], "17.84;2;out/17.84/2h.csv");
        assert_eq!(lines[3], "25.23;0;out/25.23/0h.csv");
        assert_eq!(lines.len(), 5);
    }

    #[test]
    fn test_read_remote_sensing_records() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("rs.csv");
        std::fs::write(&path, "Resolution;Path;Description;Short Name;Band\n30;/rs/ls8.tif;Landsat 8 red;RED;4\n")
            .expect("write");
        let rows = read_remote_sensing_records(&path).expect("read");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].band, 4);
        assert_eq!(rows[0].short_name, "RED");
    }

    #[test]
    fn test_read_soil_records_reports_row() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("soil.csv");
        std::fs::write(&path, "Resolution;Path\n250;/a.tif\n").expect("write");
        let err = read_soil_grid_records(&path).unwrap_err();
        assert!(err.to_string().contains("row 2"), "{}", err);
    }
}
