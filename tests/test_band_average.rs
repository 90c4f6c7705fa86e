use approx::assert_relative_eq;
use ndarray::Array2;
use plotvars::core::algebra::first_band_entries;
use plotvars::core::geoprocessing::{GdalBackend, GeoBackend};
use plotvars::core::tools::{ToolCommand, ToolFailure, ToolRunner};
use plotvars::core::zonal::{PlotBufferLayer, ZonalStat};
use plotvars::core::study::StudyPlot;
use gdal::vector::LayerAccess;
use gdal::Dataset;
use plotvars::io::raster::{read_raster_band, write_geotiff, BandReader, RasterGrid};
use plotvars::{BoundingBox, Coordinate, Radius};
use std::path::PathBuf;
use tempfile::TempDir;

struct NoTools;

impl ToolRunner for NoTools {
    fn run(&self, command: &ToolCommand) -> Result<(), ToolFailure> {
        panic!("unexpected tool call: {}", command);
    }
}

fn grid(value: f64) -> RasterGrid {
    RasterGrid {
        data: Array2::from_elem((8, 6), value),
        geo_transform: [350000.0, 250.0, 0.0, 9621000.0, 0.0, -250.0],
        projection: String::new(),
        no_data: Some(-9999.0),
    }
}

#[test]
fn test_average_of_identical_geotiffs() {
    let _ = env_logger::builder().is_test(true).try_init();
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let paths: Vec<PathBuf> = (1..=4).map(|i| temp_dir.path().join(format!("soil_{}.tif", i))).collect();
    for path in &paths {
        write_geotiff(&grid(12.5), path).expect("write input");
    }

    let backend = GdalBackend::new("qgis_process", false, &NoTools);
    for path in &paths {
        let info = backend.load_raster(path).expect("load");
        assert_eq!((info.width, info.height, info.band_count), (6, 8, 1));
    }

    let output = temp_dir.path().join("TOPSOIL_SOC_kg.tif");
    backend.average_bands(&first_band_entries(&paths), &output).expect("average");

    let averaged = read_raster_band(&output, 1, None).expect("read output");
    assert_eq!(averaged.data.dim(), (8, 6));
    for value in averaged.data.iter() {
        assert_relative_eq!(*value, 12.5, epsilon = 1e-9);
    }
    assert_eq!(averaged.geo_transform, grid(0.0).geo_transform);
}

#[test]
fn test_zonal_statistics_from_geotiff() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let raster = temp_dir.path().join("slope.tif");
    let mut slope = grid(0.0);
    for ((row, col), value) in slope.data.indexed_iter_mut() {
        *value = (row * 10 + col) as f64;
    }
    write_geotiff(&slope, &raster).expect("write");

    let plots = vec![
        StudyPlot::new("1", "1", 350625.0, 9620375.0),
        StudyPlot::new("1", "2", 10.0, 10.0),
    ];
    let mut layer = PlotBufferLayer::from_plots(&plots, Radius(100.0));
    let backend = GdalBackend::new("qgis_process", false, &NoTools);
    backend
        .zonal_statistics(&mut layer, &raster, 1, "TB250SLO", &ZonalStat::SINGLE_BAND)
        .expect("zonal");

    // Cell (2, 2) has its centre on the first plot; the second plot is off the raster
    let means = layer.column("TB250SLOmean").expect("column");
    assert_eq!(means[0], Some(22.0));
    assert_eq!(means[1], None);
    assert_eq!(layer.column("TB250SLOrange").unwrap()[0], Some(0.0));
}

#[test]
fn test_each_plot_reads_its_own_window() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let raster = temp_dir.path().join("twi.tif");
    let mut twi = grid(0.0);
    for ((row, col), value) in twi.data.indexed_iter_mut() {
        *value = (row * 10 + col) as f64;
    }
    write_geotiff(&twi, &raster).expect("write");

    // Opposite corners of the raster
    let corner = Coordinate { long_x: 350125.0, lat_y: 9620875.0 };
    let reader = BandReader::open(&raster, 1).expect("open");
    let window = reader
        .read(Some(&BoundingBox::around(corner, Radius(100.0))))
        .expect("read")
        .expect("overlap");
    assert_eq!(window.data.dim(), (1, 1));
    let outside = BoundingBox { min_x: 0.0, min_y: 0.0, max_x: 20.0, max_y: 20.0 };
    assert!(reader.read(Some(&outside)).expect("read").is_none());

    let plots = vec![
        StudyPlot::new("4", "1", corner.long_x, corner.lat_y),
        StudyPlot::new("9", "1", 351375.0, 9619125.0),
    ];
    let mut layer = PlotBufferLayer::from_plots(&plots, Radius(300.0));
    let backend = GdalBackend::new("qgis_process", false, &NoTools);
    backend
        .zonal_statistics(&mut layer, &raster, 1, "TB250TWI", &ZonalStat::SINGLE_BAND)
        .expect("zonal");

    // Cells within 300 m: the corner cell and its two edge neighbours
    let maxima = layer.column("TB250TWImax").expect("column");
    let minima = layer.column("TB250TWImin").expect("column");
    assert_eq!((minima[0], maxima[0]), (Some(0.0), Some(10.0)));
    assert_eq!((minima[1], maxima[1]), (Some(65.0), Some(75.0)));
}

#[test]
fn test_study_area_shapefile() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let raster = temp_dir.path().join("slope.tif");
    let mut slope = grid(0.0);
    for ((row, col), value) in slope.data.indexed_iter_mut() {
        *value = (row * 10 + col) as f64;
    }
    write_geotiff(&slope, &raster).expect("write");

    let plots = vec![
        StudyPlot::new("1", "1", 350625.0, 9620375.0),
        StudyPlot::new("1", "2", 10.0, 10.0),
    ];
    let mut layer = PlotBufferLayer::from_plots(&plots, Radius(100.0));
    let backend = GdalBackend::new("qgis_process", false, &NoTools);
    backend
        .zonal_statistics(&mut layer, &raster, 1, "TB250SLO", &ZonalStat::SINGLE_BAND)
        .expect("zonal");

    let path = temp_dir.path().join("StudyArea_100.0m.shp");
    layer.write_shapefile(&path, None).expect("shapefile");
    // A second write replaces the layer
    layer.write_shapefile(&path, None).expect("rewrite");

    let dataset = Dataset::open(&path).expect("open");
    let mut shapes = dataset.layer(0).expect("layer");
    assert_eq!(shapes.feature_count(), 2);
    let fields: Vec<String> = shapes.defn().fields().map(|field| field.name()).collect();
    assert_eq!(
        fields,
        ["Cluster", "Plot", "Long_X", "Lat_y", "TB250SLOme", "TB250SLOma", "TB250SLOmi", "TB250SLOra", "TB250SLOst"]
    );

    let features: Vec<_> = shapes.features().collect();
    assert_eq!(features[0].field_as_string_by_name("Plot").expect("plot"), Some("1".to_string()));
    assert_eq!(features[0].field_as_double_by_name("TB250SLOme").expect("mean"), Some(22.0));
    assert_eq!(features[1].field_as_double_by_name("TB250SLOme").expect("mean"), None);
}

#[test]
fn test_missing_raster_is_load_error() {
    let backend = GdalBackend::new("qgis_process", false, &NoTools);
    let err = backend.load_raster(std::path::Path::new("/nonexistent/dem.tif")).unwrap_err();
    assert!(matches!(err, plotvars::PipelineError::RasterLoad { .. }));
}
