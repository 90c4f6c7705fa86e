use plotvars::core::study::StudyArea;
use plotvars::io::plot_csv::{parse_plots, read_plots_from_csv};
use plotvars::PipelineError;
use std::collections::HashSet;
use tempfile::TempDir;

const ROWS: &str = "Cluster;Plot;Long_X;Lat_y\n\
                    12;1;351000.5;9620100.0\n\
                    12;2;351100.5;9620100.0\n\
                    3;1;352000.0;9621000.0\n\
                    12;3;351200.5;9620100.0\n\
                    7;1;353000.0;9622000.0\n";

#[test]
fn test_cluster_count_matches_distinct_ids() {
    let clusters = parse_plots(ROWS.as_bytes()).expect("plots");
    let distinct: HashSet<&str> = ROWS.lines().skip(1).map(|l| l.split(';').next().unwrap()).collect();
    assert_eq!(clusters.len(), distinct.len());

    let order: Vec<&str> = clusters.iter().map(|c| c.cluster_number.as_str()).collect();
    assert_eq!(order, ["12", "3", "7"]);

    let twelve = clusters.get("12").expect("cluster 12");
    let plots: Vec<&str> = twelve.plots.iter().map(|p| p.plot.as_str()).collect();
    assert_eq!(plots, ["1", "2", "3"]);
}

#[test]
fn test_every_row_becomes_one_plot() {
    let mut area = StudyArea::new("Sentinel");
    area.add_clusters(parse_plots(ROWS.as_bytes()).expect("plots"));
    assert_eq!(area.plot_count(), 5);
    let first = area.plots().next().expect("plot");
    assert_eq!(first.location.long_x, 351000.5);
    assert!(first.plot_paths.is_empty());
}

#[test]
fn test_bad_header_is_rejected_before_rows() {
    let err = parse_plots("Cluster;Plot;X;Y\n1;1;not-a-number;0\n".as_bytes()).unwrap_err();
    match err {
        PipelineError::PlotHeader { found } => assert_eq!(found, ["Cluster", "Plot", "X", "Y"]),
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn test_short_row_reports_line() {
    let err = parse_plots("Cluster;Plot;Long_X;Lat_y\n1;1;2.0;3.0\n1;2;2.0\n".as_bytes()).unwrap_err();
    assert!(matches!(err, PipelineError::InvalidFormat(ref msg) if msg.contains("line 3")), "{}", err);
}

#[test]
fn test_read_from_file() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = temp_dir.path().join("AllPlots.csv");
    std::fs::write(&path, ROWS).unwrap();
    assert_eq!(read_plots_from_csv(&path).expect("plots").len(), 3);

    let missing = read_plots_from_csv(&temp_dir.path().join("none.csv")).unwrap_err();
    assert!(matches!(missing, PipelineError::Io(_)));
}
