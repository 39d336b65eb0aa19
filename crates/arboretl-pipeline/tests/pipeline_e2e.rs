//! End-to-end runs through the whole stage chain, from configuration to a
//! validated artifact on disk.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use geo_types::Geometry;
use tokio_util::sync::CancellationToken;

use arboretl_core::{
    AttrValue, Crs, DatasetDescriptor, FileType, InvalidGeometryPolicy, Template,
};
use arboretl_geoparquet::WriteOptions;
use arboretl_pipeline::orchestrate::{self, PipelineOptions};
use arboretl_pipeline::report::DatasetState;

fn template() -> Template {
    Template::from_fields([
        ("Height".to_string(), "tree height class".to_string()),
        ("Latin_name".to_string(), "scientific species name".to_string()),
    ])
}

fn descriptor(name: &str, file_type: FileType, local: &Path) -> DatasetDescriptor {
    DatasetDescriptor {
        name: name.to_string(),
        file_type,
        download_link: None,
        local_path: Some(local.to_path_buf()),
        crs: None,
        wkt_column: None,
        lon_column: None,
        lat_column: None,
        column_mapping: BTreeMap::new(),
        metadata: BTreeMap::new(),
        on_invalid_geometry: InvalidGeometryPolicy::default(),
    }
}

fn read_artifact(path: &Path) -> arboretl_core::FeatureTable {
    arboretl_geoparquet::read_geoparquet(path, InvalidGeometryPolicy::Abort, Crs::Wgs84).unwrap()
}

async fn run_single(
    descriptor: DatasetDescriptor,
    output_dir: &Path,
) -> arboretl_pipeline::RunReport {
    orchestrate::run(
        &[descriptor],
        &template(),
        &PipelineOptions::new(output_dir),
        &CancellationToken::new(),
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn csv_lon_lat_dataset_produces_mapped_wgs84_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("utrecht.csv");
    std::fs::write(&source, "LON,LAT,soort\n4.35,52.01,Quercus robur\n").unwrap();

    let mut d = descriptor("Utrecht", FileType::Csv, &source);
    d.crs = Some(Crs::Wgs84);
    d.lon_column = Some("LON".to_string());
    d.lat_column = Some("LAT".to_string());
    d.column_mapping
        .insert("Latin_name".to_string(), "soort".to_string());

    let report = run_single(d, dir.path()).await;

    assert_eq!(report.exit_code(), 0, "{:?}", report.outcomes);
    let outcome = &report.outcomes[0];
    assert_eq!(outcome.state, DatasetState::Done);
    assert_eq!(outcome.rows_written, 1);
    assert!(outcome.validation.unwrap().is_valid);

    let artifact = orchestrate::output_path(dir.path(), "Utrecht");
    let table = read_artifact(&artifact);
    assert_eq!(table.crs, Crs::Wgs84);
    assert_eq!(table.columns, ["Height", "Latin_name"]);
    assert_eq!(
        table.rows[0].attr("Latin_name"),
        Some(&AttrValue::Text("Quercus robur".to_string()))
    );
    match &table.rows[0].geometry {
        Some(Geometry::Point(p)) => assert_eq!((p.x(), p.y()), (4.35, 52.01)),
        other => panic!("expected a point, got {other:?}"),
    }
}

#[tokio::test]
async fn unmapped_standard_field_gets_the_sentinel() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("zwolle.json");
    std::fs::write(
        &source,
        r#"{"type":"FeatureCollection","features":[
            {"type":"Feature","geometry":{"type":"Point","coordinates":[6.09,52.51]},
             "properties":{"soort":"Tilia cordata"}}]}"#,
    )
    .unwrap();

    let mut d = descriptor("Zwolle", FileType::Json, &source);
    d.column_mapping
        .insert("Latin_name".to_string(), "soort".to_string());
    // No mapping for Height anywhere.

    let report = run_single(d, dir.path()).await;
    assert_eq!(report.exit_code(), 0, "{:?}", report.outcomes);

    let table = read_artifact(&orchestrate::output_path(dir.path(), "Zwolle"));
    assert_eq!(
        table.rows[0].attr("Height"),
        Some(&AttrValue::Text("N/A".to_string()))
    );
}

#[tokio::test]
async fn rows_without_geometry_are_dropped_from_the_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("ede.json");
    std::fs::write(
        &source,
        r#"{"type":"FeatureCollection","features":[
            {"type":"Feature","geometry":{"type":"Point","coordinates":[5.67,52.04]},
             "properties":{"soort":"Ulmus"}},
            {"type":"Feature","geometry":null,"properties":{"soort":"Fagus"}}]}"#,
    )
    .unwrap();

    let d = descriptor("Ede", FileType::Json, &source);
    let report = run_single(d, dir.path()).await;

    let outcome = &report.outcomes[0];
    assert_eq!(outcome.state, DatasetState::Done);
    assert_eq!(outcome.rows_written, 1);
    assert_eq!(outcome.rows_dropped, 1);

    let table = read_artifact(&orchestrate::output_path(dir.path(), "Ede"));
    assert_eq!(table.len(), 1);
}

#[tokio::test]
async fn rd_new_sources_are_reprojected() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("amersfoort.csv");
    // The RD base point, which maps onto Amersfoort.
    std::fs::write(&source, "X,Y,soort\n155000,463000,Quercus\n").unwrap();

    let mut d = descriptor("Amersfoort", FileType::Csv, &source);
    d.crs = Some(Crs::RdNew);
    d.lon_column = Some("X".to_string());
    d.lat_column = Some("Y".to_string());
    d.column_mapping
        .insert("Latin_name".to_string(), "soort".to_string());

    let report = run_single(d, dir.path()).await;
    assert_eq!(report.exit_code(), 0, "{:?}", report.outcomes);

    let table = read_artifact(&orchestrate::output_path(dir.path(), "Amersfoort"));
    match &table.rows[0].geometry {
        Some(Geometry::Point(p)) => {
            assert!((p.x() - 5.387_206).abs() < 1e-4, "lon was {}", p.x());
            assert!((p.y() - 52.155_174).abs() < 1e-4, "lat was {}", p.y());
        },
        other => panic!("expected a point, got {other:?}"),
    }
}

#[tokio::test]
async fn relayout_of_the_artifact_is_byte_stable() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("bomen.csv");
    std::fs::write(
        &source,
        "LON,LAT,soort\n5.2,52.4,Acer\n4.3,51.9,Tilia\n4.9,52.1,Ulmus\n",
    )
    .unwrap();

    let mut d = descriptor("Bomen", FileType::Csv, &source);
    d.crs = Some(Crs::Wgs84);
    d.lon_column = Some("LON".to_string());
    d.lat_column = Some("LAT".to_string());

    run_single(d, dir.path()).await;
    let artifact = orchestrate::output_path(dir.path(), "Bomen");

    let first = std::fs::read(&artifact).unwrap();
    arboretl_pipeline::layout::apply(&artifact, &WriteOptions::default()).unwrap();
    let second = std::fs::read(&artifact).unwrap();

    assert_eq!(first, second);
}

#[tokio::test]
async fn one_broken_dataset_does_not_take_down_the_batch() {
    let dir = tempfile::tempdir().unwrap();
    let good_a = dir.path().join("a.csv");
    let good_b = dir.path().join("b.csv");
    std::fs::write(&good_a, "LON,LAT\n4.9,52.37\n").unwrap();
    std::fs::write(&good_b, "LON,LAT\n6.1,52.5\n").unwrap();

    let make = |name: &str, path: &Path| {
        let mut d = descriptor(name, FileType::Csv, path);
        d.crs = Some(Crs::Wgs84);
        d.lon_column = Some("LON".to_string());
        d.lat_column = Some("LAT".to_string());
        d
    };
    let mut broken = make("Kapot", Path::new("unused.csv"));
    broken.local_path = None;
    // Nothing listens on this port; connection is refused immediately.
    broken.download_link = Some("http://127.0.0.1:9/bomen.csv".to_string());

    let descriptors = vec![make("Alpha", &good_a), broken, make("Beta", &good_b)];
    let report = orchestrate::run(
        &descriptors,
        &template(),
        &PipelineOptions::new(dir.path()),
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(report.succeeded(), 2);
    assert_eq!(report.failed(), 1);
    assert_eq!(report.exit_code(), 2);

    // Input order is preserved in the report.
    let names: Vec<&str> = report.outcomes.iter().map(|o| o.name.as_str()).collect();
    assert_eq!(names, ["Alpha", "Kapot", "Beta"]);
    let failed = &report.outcomes[1];
    assert_eq!(failed.state, DatasetState::Failed);
    assert!(failed.error.is_some());
    assert!(orchestrate::output_path(dir.path(), "Alpha").exists());
    assert!(orchestrate::output_path(dir.path(), "Beta").exists());
    assert!(!orchestrate::output_path(dir.path(), "Kapot").exists());
}

#[tokio::test]
async fn abort_policy_fails_the_dataset_on_broken_geometry() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("rot.csv");
    std::fs::write(&source, "geo,soort\nPOINT (4.9 52.37),Acer\nnot-wkt,Tilia\n").unwrap();

    let mut d = descriptor("Rot", FileType::Csv, &source);
    d.wkt_column = Some("geo".to_string());
    let report = run_single(d, dir.path()).await;
    assert_eq!(report.outcomes[0].state, DatasetState::Failed);

    // The same source with the skip policy keeps the good row.
    let mut d = descriptor("Rot", FileType::Csv, &source);
    d.wkt_column = Some("geo".to_string());
    d.on_invalid_geometry = InvalidGeometryPolicy::Skip;
    let report = run_single(d, dir.path()).await;
    assert_eq!(report.outcomes[0].state, DatasetState::Done);
    assert_eq!(report.outcomes[0].rows_written, 1);
}

#[tokio::test]
async fn dataset_filter_runs_only_the_named_dataset() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("a.csv");
    std::fs::write(&source, "LON,LAT\n4.9,52.37\n").unwrap();

    let make = |name: &str| {
        let mut d = descriptor(name, FileType::Csv, &source);
        d.crs = Some(Crs::Wgs84);
        d.lon_column = Some("LON".to_string());
        d.lat_column = Some("LAT".to_string());
        d
    };

    let mut options = PipelineOptions::new(dir.path());
    options.dataset = Some("beta".to_string());
    let report = orchestrate::run(
        &[make("Alpha"), make("Beta")],
        &template(),
        &options,
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(report.outcomes.len(), 1);
    assert_eq!(report.outcomes[0].name, "Beta");
    assert!(!orchestrate::output_path(dir.path(), "Alpha").exists());
}

#[tokio::test]
async fn cancelled_token_leaves_datasets_pending() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("a.csv");
    std::fs::write(&source, "LON,LAT\n4.9,52.37\n").unwrap();

    let mut d = descriptor("Alpha", FileType::Csv, &source);
    d.crs = Some(Crs::Wgs84);
    d.lon_column = Some("LON".to_string());
    d.lat_column = Some("LAT".to_string());

    let cancel = CancellationToken::new();
    cancel.cancel();
    let report = orchestrate::run(
        &[d],
        &template(),
        &PipelineOptions::new(dir.path()),
        &cancel,
    )
    .await
    .unwrap();

    assert_eq!(report.outcomes[0].state, DatasetState::Pending);
    assert_eq!(report.exit_code(), 2);
}
