use std::path::Path;
use std::rc::Rc;

use chrono::NaiveDate;
use indexmap::IndexMap;
use serde_json::json;

use shpbridge::io::{
    managed_records, managed_shape_records, read_all, DeleterRegistration, DeletionOptions, Feature,
    FeatureSource, FilenameOptions, KeyMatcher, ReadOptions, ShapeFilesDeleter, ShapeRecordItem,
    ShapeRecordsOptions, ShapefileWriter, WriteOutcome,
};
use shpbridge::schema::FieldKind;
use shpbridge::{Encoding, Error, FieldValue, ShapeType, ShpOptions};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn feature(id: &str, parts: Vec<Vec<Vec<f64>>>, attributes: serde_json::Value) -> Feature {
    let attributes: IndexMap<String, serde_json::Value> = serde_json::from_value(attributes).unwrap();
    Feature { id: id.to_string(), parts, attributes }
}

fn polyline(id: &str, attributes: serde_json::Value) -> Feature {
    feature(id, vec![vec![vec![0.0, 0.0, 1.0], vec![3.5, -2.25, 4.0]]], attributes)
}

fn write_with(options: &ShpOptions, features: &[Feature], path: &Path) -> shpbridge::Result<WriteOutcome> {
    ShapefileWriter::with_config(options)?.write(
        features,
        path,
        ShapeType::PolyLineZ,
        &FeatureSource::new(ShapeType::PolyLineZ),
        &KeyMatcher::any()?,
    )
}

#[test]
fn test_two_polylines_with_names() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let features = vec![polyline("first", json!({"Name": "A"})), polyline("second", json!({"Name": "B"}))];

    let outcome = write_with(&ShpOptions::default(), &features, &dir.path().join("names.shp")).unwrap();

    let names: Vec<&str> = outcome.schema.names().collect();
    assert_eq!(names, vec!["object_id", "Name"]);
    assert!(outcome.schema.get("Name").unwrap().width >= "A".len() + 2);
    assert_eq!(outcome.records.len(), 2);

    let contents = read_all(&outcome.path, &ReadOptions::default()).unwrap();
    assert_eq!(contents.num_entries, 2);
    let read: Vec<_> = contents.records.map(|r| r.unwrap()).collect();
    assert_eq!(read[0]["Name"], FieldValue::Character("A".into()));
    assert_eq!(read[1]["object_id"], FieldValue::Character("second".into()));
}

#[test]
fn test_round_trip_values_and_geometry() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let features = vec![
        polyline(
            "a",
            json!({"label": "river", "lanes": 2, "length": 12.75, "open": "True", "surveyed": "2021-03-04"}),
        ),
        polyline(
            "b",
            json!({"label": "canal", "lanes": 3, "length": 0.5, "open": false, "surveyed": "1999/12/31"}),
        ),
    ];

    let outcome = write_with(&ShpOptions::default(), &features, &dir.path().join("trip.shp")).unwrap();
    let schema = &outcome.schema;
    assert_eq!(schema.get("lanes").unwrap().kind, FieldKind::Integer);
    assert_eq!(schema.get("length").unwrap().kind, FieldKind::Decimal);
    assert_eq!(schema.get("open").unwrap().kind, FieldKind::Boolean);
    assert_eq!(schema.get("surveyed").unwrap().kind, FieldKind::Date);

    let contents = read_all(&outcome.path, &ReadOptions::default()).unwrap();
    assert_eq!(contents.shape_type, ShapeType::PolyLineZ);
    assert_eq!(contents.bbox.z_min, 1.0);
    assert_eq!(contents.bbox.z_max, 4.0);

    let read: Vec<_> = contents.records.map(|r| r.unwrap()).collect();
    assert_eq!(read, outcome.records);
    assert_eq!(read[1]["surveyed"], FieldValue::Date(NaiveDate::from_ymd_opt(1999, 12, 31).unwrap()));

    for shape in contents.shapes {
        let shape = shape.unwrap();
        let coords: Vec<(f64, f64, f64)> = shape.points.iter().map(|p| (p.x, p.y, p.z)).collect();
        assert_eq!(coords, vec![(0.0, 0.0, 1.0), (3.5, -2.25, 4.0)]);
    }
}

#[test]
fn test_demoted_values_read_back_as_text() {
    let dir = tempfile::tempdir().unwrap();
    let features = vec![polyline("a", json!({"code": 17})), polyline("b", json!({"code": "x-9"}))];
    let outcome = write_with(&ShpOptions::default(), &features, &dir.path().join("mixed.shp")).unwrap();
    assert_eq!(outcome.schema.get("code").unwrap().kind, FieldKind::Text);

    let contents = read_all(&outcome.path, &ReadOptions::default()).unwrap();
    let records: Vec<_> = contents.records.map(|r| r.unwrap()).collect();
    assert_eq!(records[0]["code"], FieldValue::Character("17".into()));
    assert_eq!(records[1]["code"], FieldValue::Character("x-9".into()));
}

#[test]
fn test_multi_part_shape_is_split_into_parts() {
    let dir = tempfile::tempdir().unwrap();
    let run = |start: usize, len: usize| -> Vec<Vec<f64>> {
        (start..start + len).map(|i| vec![i as f64, 0.0, 0.0]).collect()
    };
    let features = vec![
        feature("multi", vec![run(0, 3), run(3, 4), run(7, 2)], json!({"k": 1})),
        feature("single", vec![run(0, 2)], json!({"k": 0})),
    ];
    let outcome = write_with(&ShpOptions::default(), &features, &dir.path().join("parts.shp")).unwrap();

    let contents = read_all(&outcome.path, &ReadOptions::default()).unwrap();
    let first = contents.shapes.map(|s| s.unwrap()).next().unwrap();
    assert_eq!(first.parts, vec![0, 3, 7]);
    assert_eq!(first.points.len(), 9);

    let items: Vec<_> = managed_shape_records(
        &outcome.path,
        &ReadOptions::default(),
        &ShapeRecordsOptions::default(),
        &DeletionOptions::default(),
        &DeleterRegistration::new(),
    )
    .unwrap()
    .map(|item| item.unwrap())
    .collect();
    assert_eq!(items.len(), 2);

    match &items[0] {
        ShapeRecordItem::Multi(parts) => {
            let ranges: Vec<(f64, usize)> = parts.iter().map(|(points, _)| (points[0].x, points.len())).collect();
            assert_eq!(ranges, vec![(0.0, 3), (3.0, 4), (7.0, 2)]);
            assert!(parts.iter().all(|(_, record)| Rc::ptr_eq(record, &parts[0].1)));
            assert_eq!(parts[0].1["k"], FieldValue::Integer(1));
        }
        other => panic!("expected a multi-part item, got {:?}", other),
    }
    assert!(matches!(&items[1], ShapeRecordItem::Single(points, _) if points.len() == 2));
}

#[test]
fn test_existing_output_gets_a_suffixed_name() {
    let dir = tempfile::tempdir().unwrap();
    let desired = dir.path().join("out.shp");
    std::fs::write(&desired, b"taken").unwrap();

    let options = ShpOptions {
        filename: FilenameOptions { overwrite_shp: false, ..Default::default() },
        ..Default::default()
    };
    let outcome = write_with(&options, &[polyline("a", json!({}))], &desired).unwrap();
    assert_eq!(outcome.path, dir.path().join("out_(1).shp"));
    assert_eq!(std::fs::read(&desired).unwrap(), b"taken");
    assert!(dir.path().join("out_(1).dbf").is_file());
}

#[test]
fn test_intermediate_set_is_deleted_after_full_read() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let options = ShpOptions {
        filename: FilenameOptions { overwrite_shp: false, ..Default::default() },
        ..Default::default()
    };
    let outcome = write_with(&options, &[polyline("a", json!({"v": 1}))], &dir.path().join("tmp.shp")).unwrap();

    let registration = DeleterRegistration::new();
    registration.register(ShapeFilesDeleter::new(&outcome.path));

    let mut records = managed_records(&outcome.path, &options.read, &options.deletion(), &registration).unwrap();
    assert_eq!(records.len(), 1);
    assert!(records.next().unwrap().is_ok());
    assert!(outcome.path.is_file());
    assert!(records.next().is_none());

    for ext in ["shp", "shx", "dbf"] {
        assert!(!outcome.path.with_extension(ext).exists());
    }
    assert!(!registration.is_registered());
}

#[test]
fn test_overwrite_policy_keeps_files() {
    let dir = tempfile::tempdir().unwrap();
    let options = ShpOptions::default();
    let outcome = write_with(&options, &[polyline("a", json!({}))], &dir.path().join("kept.shp")).unwrap();

    let registration = DeleterRegistration::new();
    registration.register(ShapeFilesDeleter::new(&outcome.path));
    let records = managed_records(&outcome.path, &options.read, &options.deletion(), &registration).unwrap();
    assert_eq!(records.count(), 1);

    assert!(outcome.path.is_file());
    assert!(registration.is_registered());
}

#[test]
fn test_non_shape_aborts_whole_write() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.shp");
    let bad = feature("broken", vec![vec![vec![0.0, f64::NAN, 0.0]]], json!({}));
    let err = write_with(&ShpOptions::default(), &[polyline("fine", json!({})), bad], &path).unwrap_err();
    assert!(matches!(err, Error::GeometryError(_)));
    assert!(err.to_string().contains("broken"));
    assert!(!path.exists());
    assert!(!path.with_extension("dbf").exists());
}

#[test]
fn test_uncoercible_values_round_trip_as_memo() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let mut options = ShpOptions::default();
    options.coerce.use_memo = true;
    let features = vec![polyline("a", json!({"meta": {"nested": 1}, "n": 4}))];

    let outcome = write_with(&options, &features, &dir.path().join("memo.shp")).unwrap();
    assert_eq!(outcome.schema.get("meta").unwrap().kind, FieldKind::Memo);

    let contents = read_all(&outcome.path, &ReadOptions::default()).unwrap();
    let records: Vec<_> = contents.records.map(|r| r.unwrap()).collect();
    assert_eq!(records[0]["meta"], FieldValue::Memo(r#"{"nested":1}"#.into()));
    assert_eq!(records[0]["n"], FieldValue::Integer(4));
}

#[test]
fn test_exhausted_suffixes_overwrite_the_last_candidate() {
    let dir = tempfile::tempdir().unwrap();
    let desired = dir.path().join("out.shp");
    let last = dir.path().join("out_(1).shp");
    std::fs::write(&desired, b"taken").unwrap();
    std::fs::write(&last, b"also taken").unwrap();

    let options = ShpOptions {
        filename: FilenameOptions { overwrite_shp: false, max_new_files: 1, ..Default::default() },
        ..Default::default()
    };
    let outcome = write_with(&options, &[polyline("a", json!({"v": "new"}))], &desired).unwrap();
    assert_eq!(outcome.path, last);
    assert_eq!(std::fs::read(&desired).unwrap(), b"taken");

    let contents = read_all(&last, &ReadOptions::default()).unwrap();
    assert_eq!(contents.num_entries, 1);
    let records: Vec<_> = contents.records.map(|r| r.unwrap()).collect();
    assert_eq!(records[0]["v"], FieldValue::Character("new".into()));
}

#[test]
fn test_latin1_text_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let mut options = ShpOptions::default();
    options.write.encoding = Encoding::Latin1;
    options.read.encoding = Encoding::Latin1;
    let features = vec![polyline("a", json!({"city": "café"}))];

    let outcome = write_with(&options, &features, &dir.path().join("latin.shp")).unwrap();
    // one byte per character in Latin-1
    assert_eq!(outcome.schema.get("city").unwrap().width, 4 + 2);

    let dbf = std::fs::read(outcome.path.with_extension("dbf")).unwrap();
    assert!(dbf.windows(4).any(|w| w == b"caf\xe9"));

    let contents = read_all(&outcome.path, &options.read).unwrap();
    let records: Vec<_> = contents.records.map(|r| r.unwrap()).collect();
    assert_eq!(records[0]["city"], FieldValue::Character("café".into()));
}

#[test]
fn test_rounded_floats_are_written_when_not_kept() {
    let dir = tempfile::tempdir().unwrap();
    let mut options = ShpOptions::default();
    options.coerce.keep_floats = false;
    let features = vec![polyline("a", json!({"ratio": 1.23456})), polyline("b", json!({"ratio": 0.5}))];

    let outcome = write_with(&options, &features, &dir.path().join("rounded.shp")).unwrap();
    assert_eq!(outcome.schema.get("ratio").unwrap().decimal_places, Some(4));

    let contents = read_all(&outcome.path, &ReadOptions::default()).unwrap();
    let records: Vec<_> = contents.records.map(|r| r.unwrap()).collect();
    assert_eq!(records[0]["ratio"], FieldValue::Decimal("1.2346".parse().unwrap()));
    assert_eq!(records[1]["ratio"], FieldValue::Decimal("0.5".parse().unwrap()));
}
