mod common;

use common::{FakeCoverageClient, RecordingBackend};
use plotvars::config::SoilConfig;
use plotvars::core::soil_grids::{default_catalogue, download_all, group_data_pairs, CoverageSource, DataPair};
use plotvars::io::manifest::read_soil_grid_records;
use plotvars::pipeline::run_soil_grids;
use plotvars::PipelineError;
use tempfile::TempDir;

fn config(dir: &std::path::Path) -> SoilConfig {
    SoilConfig {
        download_directory: dir.to_path_buf(),
        ..SoilConfig::default()
    }
}

#[test]
fn test_soil_stage_writes_combined_rasters_and_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let client = FakeCoverageClient::default();
    let backend = RecordingBackend::default();

    let combined = run_soil_grids(&client, &backend, &config(temp_dir.path())).expect("soil stage");

    assert_eq!(client.urls.lock().unwrap().len(), 9);
    assert_eq!(backend.loaded.lock().unwrap().len(), 9);
    assert_eq!(combined.len(), 4);
    assert_eq!(combined[0], temp_dir.path().join("TOPSOIL_SOC_kg.tif"));
    assert!(temp_dir.path().join("SOC_ha").join("ocstha_m_sd4_250m.tif").exists());

    let averages = backend.averages.lock().unwrap();
    let refs: Vec<&str> = averages[0].0.iter().map(|e| e.reference.as_str()).collect();
    assert_eq!(refs, ["r1@1", "r2@1", "r3@1"]);

    let downloaded = std::fs::read_to_string(temp_dir.path().join("downloaded-soil-rasters.csv")).unwrap();
    let first_row = downloaded.lines().nth(1).expect("row");
    assert!(first_row.starts_with("250;"));
    assert!(first_row.ends_with(";SK1;TOPSOIL"), "{}", first_row);

    let records = read_soil_grid_records(&temp_dir.path().join("combined-soil-rasters.csv")).expect("records");
    let codes: Vec<&str> = records.iter().map(|r| r.short_name.as_str()).collect();
    assert_eq!(codes, ["TK", "SK", "TH", "SH"]);
    assert_eq!(records[3].soil_type, "SUBSOIL_SOC_ha");
}

#[test]
fn test_combined_row_lists_only_group_members() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let backend = RecordingBackend::default();
    let client = FakeCoverageClient::default();
    run_soil_grids(&client, &backend, &config(temp_dir.path())).expect("soil stage");

    let text = std::fs::read_to_string(temp_dir.path().join("combined-soil-rasters.csv")).unwrap();
    let subsoil_kg = text.lines().find(|l| l.ends_with(";SUBSOIL_SOC_kg")).expect("row");
    assert!(subsoil_kg.contains("SOC_g_per_kg_0.30m,SOC_g_per_kg_0.60m,"));
    assert!(!subsoil_kg.contains("SOC_g_per_kg_0.00m"));
    assert!(!subsoil_kg.contains("SOC_t_per_ha"));
}

#[test]
fn test_existing_downloads_are_skipped() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let catalogue = default_catalogue();
    let existing = catalogue[0].local_path(temp_dir.path());
    std::fs::create_dir_all(existing.parent().unwrap()).unwrap();
    std::fs::write(&existing, b"tif").unwrap();

    let client = FakeCoverageClient::default();
    let fetched = download_all(&client, &CoverageSource::default(), &catalogue, temp_dir.path()).expect("download");
    assert_eq!(fetched, 8);
    assert!(client.urls.lock().unwrap().iter().all(|url| !url.contains("orcdrc_m_sl1_250m")));
}

#[test]
fn test_download_failure_surfaces() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let client = FakeCoverageClient { fail: true, ..Default::default() };
    let err = download_all(&client, &CoverageSource::default(), &default_catalogue(), temp_dir.path()).unwrap_err();
    assert!(matches!(err, PipelineError::Download(_)));
}

#[test]
fn test_grouping_by_soiltype_and_folder() {
    let pairs = vec![
        DataPair::new("ns:a", "A", "a", "F1", "A1", "TOPSOIL"),
        DataPair::new("ns:b", "B", "b", "F2", "B1", "TOPSOIL"),
        DataPair::new("ns:c", "C", "c", "F1", "C1", "TOPSOIL"),
        DataPair::new("ns:d", "D", "d", "F1", "D1", "SUBSOIL"),
    ];
    let groups = group_data_pairs(&pairs);
    assert_eq!(groups.len(), 3);
    let (key, members) = groups.iter().next().expect("group");
    assert_eq!(key.to_string(), "TOPSOIL_F1");
    let names: Vec<&str> = members.iter().map(|m| m.short_name.as_str()).collect();
    assert_eq!(names, ["a", "c"]);
    assert_eq!(key.short_code(), None);
}
