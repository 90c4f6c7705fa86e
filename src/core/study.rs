//! Study design hierarchy: study area -> clusters -> plots -> per-radius files

use crate::types::{Coordinate, Radius};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

/// Single field plot
#[derive(Debug, Clone)]
pub struct StudyPlot {
    pub cluster: String,
    pub plot: String,
    pub location: Coordinate,
    /// Clipped point cloud per clipping radius
    pub plot_paths: BTreeMap<Radius, PathBuf>,
}

impl StudyPlot {
    pub fn new(cluster: impl Into<String>, plot: impl Into<String>, long_x: f64, lat_y: f64) -> Self {
        Self {
            cluster: cluster.into(),
            plot: plot.into(),
            location: Coordinate { long_x, lat_y },
            plot_paths: BTreeMap::new(),
        }
    }

    pub fn add_plot_path(&mut self, radius: Radius, path: PathBuf) {
        self.plot_paths.insert(radius, path);
    }

    pub fn plot_path(&self, radius: Radius) -> Option<&Path> {
        self.plot_paths.get(&radius).map(PathBuf::as_path)
    }

    /// File name of the clipped cloud, `<cluster>.<plot>.las`
    pub fn clip_file_name(&self) -> String {
        format!("{}.{}.las", self.cluster, self.plot)
    }
}

/// Cluster of plots, in CSV row order
#[derive(Debug, Clone)]
pub struct StudyCluster {
    pub cluster_number: String,
    pub plots: Vec<StudyPlot>,
}

impl StudyCluster {
    pub fn new(cluster_number: impl Into<String>) -> Self {
        Self {
            cluster_number: cluster_number.into(),
            plots: Vec::new(),
        }
    }

    pub fn add_plot(&mut self, plot: StudyPlot) {
        self.plots.push(plot);
    }
}

/// One cloudmetrics output file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudMetricsFile {
    pub path: PathBuf,
    pub min_height: u32,
    pub above: u32,
}

/// Clusters keyed by id, iterated in first-seen order
#[derive(Debug, Clone, Default)]
pub struct ClusterMap {
    clusters: Vec<StudyCluster>,
    index: HashMap<String, usize>,
}

impl ClusterMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cluster for `id`, created on first reference
    pub fn entry(&mut self, id: &str) -> &mut StudyCluster {
        let position = match self.index.get(id) {
            Some(&position) => position,
            None => {
                self.clusters.push(StudyCluster::new(id));
                self.index.insert(id.to_string(), self.clusters.len() - 1);
                self.clusters.len() - 1
            }
        };
        &mut self.clusters[position]
    }

    pub fn get(&self, id: &str) -> Option<&StudyCluster> {
        self.index.get(id).map(|&position| &self.clusters[position])
    }

    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &StudyCluster> {
        self.clusters.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut StudyCluster> {
        self.clusters.iter_mut()
    }
}

/// Study area made from clusters
#[derive(Debug, Clone)]
pub struct StudyArea {
    pub name: String,
    pub clusters: ClusterMap,
    pub cloudmetric_files: BTreeMap<Radius, Vec<CloudMetricsFile>>,
}

impl StudyArea {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            clusters: ClusterMap::new(),
            cloudmetric_files: BTreeMap::new(),
        }
    }

    pub fn add_clusters(&mut self, clusters: ClusterMap) {
        self.clusters = clusters;
    }

    pub fn add_cloudmetrics_file(&mut self, radius: Radius, file: CloudMetricsFile) {
        self.cloudmetric_files.entry(radius).or_default().push(file);
    }

    pub fn plots(&self) -> impl Iterator<Item = &StudyPlot> {
        self.clusters.iter().flat_map(|cluster| cluster.plots.iter())
    }

    pub fn plots_mut(&mut self) -> impl Iterator<Item = &mut StudyPlot> {
        self.clusters.iter_mut().flat_map(|cluster| cluster.plots.iter_mut())
    }

    pub fn plot_count(&self) -> usize {
        self.plots().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cluster_map_keeps_first_seen_order() {
        let mut clusters = ClusterMap::new();
        clusters.entry("10").add_plot(StudyPlot::new("10", "1", 0.0, 0.0));
        clusters.entry("2").add_plot(StudyPlot::new("2", "1", 0.0, 0.0));
        clusters.entry("10").add_plot(StudyPlot::new("10", "2", 0.0, 0.0));

        let ids: Vec<&str> = clusters.iter().map(|c| c.cluster_number.as_str()).collect();
        assert_eq!(ids, vec!["10", "2"]);
        assert_eq!(clusters.get("10").map(|c| c.plots.len()), Some(2));
    }

    #[test]
    fn test_cloudmetrics_files_grouped_by_radius() {
        let mut area = StudyArea::new("Sentinel");
        for above in [0, 2] {
            for radius in [Radius(25.23), Radius(17.84)] {
                area.add_cloudmetrics_file(
                    radius,
                    CloudMetricsFile {
                        path: PathBuf::from(format!("{}/{}h.csv", radius, above)),
                        min_height: above,
                        above,
                    },
                );
            }
        }
        assert_eq!(area.cloudmetric_files.len(), 2);
        let small: Vec<u32> = area.cloudmetric_files[&Radius(17.84)].iter().map(|f| f.above).collect();
        assert_eq!(small, vec![0, 2]);
    }

    #[test]
    fn test_clip_file_name() {
        let plot = StudyPlot::new("7", "3", 1.0, 2.0);
        assert_eq!(plot.clip_file_name(), "7.3.las");
    }
}
