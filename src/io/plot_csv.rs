//! Plot definition CSV reader

use crate::core::study::{ClusterMap, StudyPlot};
use crate::types::{PipelineError, PipelineResult};
use std::io::Read;
use std::path::Path;

/// Header the plot list must carry, in this exact order and spelling
pub const PLOT_CSV_HEADER: [&str; 4] = ["Cluster", "Plot", "Long_X", "Lat_y"];

/// Semicolon-delimited reader with no quoting surprises
pub fn semicolon_reader<R: Read>(reader: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .delimiter(b';')
        .has_headers(false)
        .flexible(true)
        .from_reader(reader)
}

/// Read plots from the study-area CSV and group them into clusters
pub fn read_plots_from_csv(path: &Path) -> PipelineResult<ClusterMap> {
    log::info!("Reading plots from: {}", path.display());
    let file = std::fs::File::open(path)?;
    parse_plots(file)
}

/// Parse plots from any reader; see [`read_plots_from_csv`]
pub fn parse_plots<R: Read>(reader: R) -> PipelineResult<ClusterMap> {
    let mut csv_reader = semicolon_reader(reader);
    let mut records = csv_reader.records();

    let header = match records.next() {
        Some(record) => record?,
        None => return Err(PipelineError::PlotHeader { found: Vec::new() }),
    };
    if header.iter().ne(PLOT_CSV_HEADER.iter().copied()) {
        return Err(PipelineError::PlotHeader {
            found: header.iter().map(str::to_string).collect(),
        });
    }

    let mut clusters = ClusterMap::new();
    let mut count = 0usize;
    for (row, record) in records.enumerate() {
        let record = record?;
        let line = row + 2;
        if record.len() == 1 && record[0].trim().is_empty() {
            continue;
        }
        if record.len() < 4 {
            return Err(PipelineError::InvalidFormat(format!(
                "Plot CSV line {} has {} fields, expected 4",
                line,
                record.len()
            )));
        }

        let long_x = parse_coordinate(&record[2], "Long_X", line)?;
        let lat_y = parse_coordinate(&record[3], "Lat_y", line)?;
        clusters
            .entry(&record[0])
            .add_plot(StudyPlot::new(&record[0], &record[1], long_x, lat_y));
        count += 1;
    }

    log::info!("Read {} plots in {} clusters", count, clusters.len());
    Ok(clusters)
}

fn parse_coordinate(value: &str, column: &str, line: usize) -> PipelineResult<f64> {
    value.trim().parse::<f64>().map_err(|e| {
        PipelineError::InvalidFormat(format!(
            "Plot CSV line {}: {} value '{}' is not a number ({})",
            line, column, value, e
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plots_groups_by_cluster() {
        let data = "Cluster;Plot;Long_X;Lat_y\n1;1;100.0;200.0\n2;1;5;6\n1;2;150.0;250.0\n";
        let clusters = parse_plots(data.as_bytes()).expect("valid csv");
        assert_eq!(clusters.len(), 2);
        let first = clusters.get("1").expect("cluster 1");
        let plots: Vec<&str> = first.plots.iter().map(|p| p.plot.as_str()).collect();
        assert_eq!(plots, vec!["1", "2"]);
        assert_eq!(first.plots[1].location.lat_y, 250.0);
    }

    #[test]
    fn test_header_is_case_sensitive() {
        let data = "Cluster;Plot;Long_X;Lat_Y\n1;1;100.0;200.0\n";
        match parse_plots(data.as_bytes()) {
            Err(PipelineError::PlotHeader { found }) => assert_eq!(found[3], "Lat_Y"),
            other => panic!("expected header error, got {:?}", other),
        }
    }

    #[test]
    fn test_bad_coordinate_names_line() {
        let data = "Cluster;Plot;Long_X;Lat_y\n1;1;abc;200.0\n";
        let err = parse_plots(data.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("line 2"), "{}", err);
    }

    #[test]
    fn test_empty_file_rejected() {
        assert!(matches!(parse_plots("".as_bytes()), Err(PipelineError::PlotHeader { .. })));
    }
}
