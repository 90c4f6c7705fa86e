//! Soil-grid coverages: download from a WCS endpoint, group by soil layer and
//! quantity, and average each group into one raster

use crate::core::algebra::first_band_entries;
use crate::core::geoprocessing::GeoBackend;
use crate::io::coverage::CoverageClient;
use crate::types::PipelineResult;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// One downloadable coverage with its naming metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPair {
    /// Coverage id on the server, e.g. `geonode:orcdrc_m_sl1_250m`
    pub download_name: String,
    pub real_name: String,
    pub short_name: String,
    /// Sub-folder of the download directory, also the quantity of the group key
    pub folder: String,
    pub very_short_name: String,
    /// `TOPSOIL` or `SUBSOIL`
    pub soiltype: String,
}

impl DataPair {
    pub fn new(
        download_name: &str,
        real_name: &str,
        short_name: &str,
        folder: &str,
        very_short_name: &str,
        soiltype: &str,
    ) -> Self {
        Self {
            download_name: download_name.to_string(),
            real_name: real_name.to_string(),
            short_name: short_name.to_string(),
            folder: folder.to_string(),
            very_short_name: very_short_name.to_string(),
            soiltype: soiltype.to_string(),
        }
    }

    /// Coverage id without its workspace prefix
    pub fn coverage_file_stem(&self) -> &str {
        match self.download_name.split_once(':') {
            Some((_, stem)) => stem,
            None => &self.download_name,
        }
    }

    /// `<download_dir>/<folder>/<stem>.tif`
    pub fn local_path(&self, download_dir: &Path) -> PathBuf {
        download_dir
            .join(&self.folder)
            .join(format!("{}.tif", self.coverage_file_stem()))
    }

    pub fn group_key(&self) -> SoilGroupKey {
        SoilGroupKey::new(&self.soiltype, &self.folder)
    }
}

/// Soil organic carbon content at five depths and stock over four intervals
pub fn default_catalogue() -> Vec<DataPair> {
    const CONTENT: &str = "Soil organic carbon content (fine earth fraction) in g per kg at depth";
    const STOCK: &str = "Soil organic carbon stock in tonnes per ha for depth interval";
    let content = |layer: u32, depth: &str, soiltype: &str| {
        DataPair::new(
            &format!("geonode:orcdrc_m_sl{}_250m", layer),
            &format!("{} {} m", CONTENT, depth),
            &format!("SOC_g_per_kg_{}m", depth),
            "SOC_kg",
            &format!("SK{}", layer),
            soiltype,
        )
    };
    let stock = |layer: u32, interval: &str, short: &str, soiltype: &str| {
        DataPair::new(
            &format!("geonode:ocstha_m_sd{}_250m", layer),
            &format!("{} {}", STOCK, interval),
            short,
            "SOC_ha",
            &format!("SC{}", layer),
            soiltype,
        )
    };

    vec![
        content(1, "0.00", "TOPSOIL"),
        content(2, "0.05", "TOPSOIL"),
        content(3, "0.15", "TOPSOIL"),
        content(4, "0.30", "SUBSOIL"),
        content(5, "0.60", "SUBSOIL"),
        stock(1, "0.00 m - 0.05 m", "SOC_t_per_ha_0.00-0.05m", "TOPSOIL"),
        stock(2, "0.05 m - 0.15 m", "SOC_t_per_ha_0.05-0.15m", "TOPSOIL"),
        stock(3, "0.15 m - 0.30 m", "SOC_t_per_ha_0.15m-0.30m", "SUBSOIL"),
        stock(4, "0.30 m - 0.60 m", "SOC_t_per_ha_0.30m-0.30m", "SUBSOIL"),
    ]
}

/// WCS 2.0.1 endpoint and the lon/lat window requested from it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageSource {
    pub endpoint: String,
    pub long_min: f64,
    pub long_max: f64,
    pub lat_min: f64,
    pub lat_max: f64,
}

impl Default for CoverageSource {
    fn default() -> Self {
        Self {
            endpoint: "http://webservices.isric.org/geoserver/ows".to_string(),
            long_min: 38.281771435832226,
            long_max: 38.37234746699569,
            lat_min: -3.448906634066586,
            lat_max: -3.345927432376734,
        }
    }
}

impl CoverageSource {
    /// GetCoverage request for one coverage id
    pub fn coverage_url(&self, coverage_id: &str) -> String {
        format!(
            "{}?service=WCS&version=2.0.1&request=GetCoverage&CoverageId={}&subset=Long({:?},{:?})&subset=Lat({:?},{:?})",
            self.endpoint, coverage_id, self.long_min, self.long_max, self.lat_min, self.lat_max
        )
    }
}

/// Soil layer and quantity shared by the members of a group
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SoilGroupKey {
    pub soiltype: String,
    pub folder: String,
}

impl SoilGroupKey {
    pub fn new(soiltype: &str, folder: &str) -> Self {
        Self {
            soiltype: soiltype.to_string(),
            folder: folder.to_string(),
        }
    }

    /// Two-letter code of the combined raster
    pub fn short_code(&self) -> Option<&'static str> {
        match (self.soiltype.as_str(), self.folder.as_str()) {
            ("TOPSOIL", "SOC_kg") => Some("TK"),
            ("TOPSOIL", "SOC_ha") => Some("TH"),
            ("SUBSOIL", "SOC_kg") => Some("SK"),
            ("SUBSOIL", "SOC_ha") => Some("SH"),
            _ => None,
        }
    }

    /// `<download_dir>/<key>.tif`
    pub fn combined_path(&self, download_dir: &Path) -> PathBuf {
        download_dir.join(format!("{}.tif", self))
    }
}

impl std::fmt::Display for SoilGroupKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}", self.soiltype, self.folder)
    }
}

/// Data pairs grouped by key, groups in first-seen order
#[derive(Debug, Clone, Default)]
pub struct SoilGroups {
    groups: Vec<(SoilGroupKey, Vec<DataPair>)>,
    index: HashMap<SoilGroupKey, usize>,
}

impl SoilGroups {
    pub fn add(&mut self, pair: DataPair) {
        let key = pair.group_key();
        match self.index.get(&key) {
            Some(&i) => self.groups[i].1.push(pair),
            None => {
                self.index.insert(key.clone(), self.groups.len());
                self.groups.push((key, vec![pair]));
            }
        }
    }

    pub fn get(&self, key: &SoilGroupKey) -> Option<&[DataPair]> {
        self.index.get(key).map(|&i| self.groups[i].1.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SoilGroupKey, &Vec<DataPair>)> {
        self.groups.iter().map(|(key, members)| (key, members))
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

pub fn group_data_pairs(pairs: &[DataPair]) -> SoilGroups {
    let mut groups = SoilGroups::default();
    for pair in pairs {
        groups.add(pair.clone());
    }
    groups
}

/// Download every coverage not yet on disk. Returns the number fetched.
pub fn download_all(
    client: &dyn CoverageClient,
    source: &CoverageSource,
    pairs: &[DataPair],
    download_dir: &Path,
) -> PipelineResult<usize> {
    let mut fetched = 0;
    for pair in pairs {
        let output = pair.local_path(download_dir);
        if output.exists() {
            log::info!("Coverage {} already exists, skipping download", output.display());
            continue;
        }
        if let Some(parent) = output.parent() {
            std::fs::create_dir_all(parent)?;
        }
        log::info!("Downloading: {} to: {}", pair.download_name, output.display());
        client.fetch(&source.coverage_url(&pair.download_name), &output)?;
        fetched += 1;
    }
    log::info!("Download complete: {} fetched, {} on disk", fetched, pairs.len() - fetched);
    Ok(fetched)
}

/// Validate every member and average each group into its combined raster.
/// Returns the combined raster paths in group order.
pub fn combine_groups(
    backend: &dyn GeoBackend,
    groups: &SoilGroups,
    download_dir: &Path,
) -> PipelineResult<Vec<PathBuf>> {
    let mut combined = Vec::with_capacity(groups.len());
    for (key, members) in groups.iter() {
        let inputs: Vec<PathBuf> = members.iter().map(|m| m.local_path(download_dir)).collect();
        for input in &inputs {
            backend.load_raster(input)?;
        }
        let output = key.combined_path(download_dir);
        log::info!("Combining {} rasters of {} into {}", inputs.len(), key, output.display());
        backend.average_bands(&first_band_entries(&inputs), &output)?;
        combined.push(output);
    }
    Ok(combined)
}
