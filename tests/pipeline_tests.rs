//! End-to-end pipeline tests: normalize, combine, map, aggregate, export,
//! and validate against a reference table.

use celltally::{
    AnnotationFrame, SessionCache, Thresholds, aggregate, compare, export, parse_mapping,
    reference, summarize,
};
use serde_json::json;

fn geojson_bytes(cells: &[(&str, f64)]) -> Vec<u8> {
    let features: Vec<_> = cells
        .iter()
        .map(|(class, area)| {
            json!({
                "type": "Feature",
                "geometry": {"type": "Polygon", "coordinates": [[[0.0, 0.0]]]},
                "properties": {
                    "objectType": "annotation",
                    "classification": {"name": class},
                    "measurements": {"Area µm^2": area}
                }
            })
        })
        .collect();
    serde_json::to_vec(&json!({"type": "FeatureCollection", "features": features})).unwrap()
}

#[test]
fn two_files_one_mouse_produces_ordered_csv() {
    let mut cache = SessionCache::new();

    // Image 10: two CD8 cells over threshold, one CD4 under its threshold.
    let file_10 = geojson_bytes(&[("CD8", 30.0), ("CD8", 26.0), ("CD4", 28.0)]);
    // Image 11: one Foxp3 over, one Other that never counts.
    let file_11 = geojson_bytes(&[("Foxp3", 21.0), ("Other", 99.0)]);

    let fragments = vec![
        cache
            .annotation_frame("slide_10.geojson", &file_10)
            .unwrap()
            .clone(),
        cache
            .annotation_frame("slide_11.geojson", &file_11)
            .unwrap()
            .clone(),
    ];
    let total_rows: usize = fragments.iter().map(AnnotationFrame::len).sum();
    let combined = AnnotationFrame::concat(fragments).unwrap();
    assert_eq!(combined.len(), total_rows);

    let mapping = parse_mapping("M1 10-11").unwrap();
    let records = aggregate(&combined, &mapping, &Thresholds::EXPORT_DEFAULTS).unwrap();

    let csv = export::to_csv_string(&records).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(
        lines,
        vec![
            "mouse_id,image_number,row_count,cd8_count,cd4_count,foxp3_count",
            "M1,10,2,2,0,0",
            "M1,11,1,0,0,1",
        ]
    );
}

#[test]
fn unmapped_image_survives_to_the_csv_with_empty_mouse() {
    let mut cache = SessionCache::new();
    let bytes = geojson_bytes(&[("CD8", 40.0)]);
    let frame = cache
        .annotation_frame("slide_99.geojson", &bytes)
        .unwrap()
        .clone();

    let records = aggregate(&frame, &[], &Thresholds::EXPORT_DEFAULTS).unwrap();
    let csv = export::to_csv_string(&records).unwrap();
    assert_eq!(csv.lines().nth(1), Some(",99,1,1,0,0"));
}

#[test]
fn tuning_path_reports_deltas_against_reference() {
    let mut cache = SessionCache::new();
    let bytes = geojson_bytes(&[("CD8", 30.0), ("CD8", 27.0), ("CD4", 35.0)]);
    let frame = cache
        .annotation_frame("slide_5.geojson", &bytes)
        .unwrap()
        .clone();

    let mapping = parse_mapping("M3 5-5").unwrap();
    let records = aggregate(&frame, &mapping, &Thresholds::EXPORT_DEFAULTS).unwrap();

    let reference_csv = "\
mouse_id,image_number,cd8_by_xm,cd4_by_xm,foxp3_by_xm
M3,5,3,1,
M9,9,1,1,1
";
    let reference = reference::read_reference(reference_csv.as_bytes()).unwrap();
    let rows = compare(&records, &reference);

    // The M9 pair exists only in the reference and is dropped by the join.
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].cd8_delta, Some(1.0));
    assert_eq!(rows[0].cd4_delta, Some(0.0));
    assert_eq!(rows[0].foxp3_delta, None);

    let summary = summarize(&rows);
    assert_eq!(summary.cd8.count, 1);
    assert_eq!(summary.cd8.mean, Some(1.0));
    assert_eq!(summary.foxp3.count, 0);
}

#[test]
fn heterogeneous_schemas_combine_after_backfill() {
    let mut cache = SessionCache::new();

    // One file carries isLocked, the other does not; backfill makes the
    // column sets identical so concat succeeds.
    let with_locked = serde_json::to_vec(&json!({
        "type": "FeatureCollection",
        "features": [{
            "type": "Feature",
            "geometry": {"type": "Polygon", "coordinates": [[[0.0, 0.0]]]},
            "properties": {
                "objectType": "annotation",
                "isLocked": true,
                "classification": {"name": "CD8"},
                "measurements": {"Area µm^2": 30.0}
            }
        }]
    }))
    .unwrap();
    let without_locked = geojson_bytes(&[("CD8", 30.0)]);

    let a = cache
        .annotation_frame("slide_1.geojson", &with_locked)
        .unwrap()
        .clone();
    let b = cache
        .annotation_frame("slide_2.geojson", &without_locked)
        .unwrap()
        .clone();

    let combined = AnnotationFrame::concat(vec![a, b]).unwrap();
    assert_eq!(combined.len(), 2);

    let provenance_idx = combined
        .column_index("has_is_locked_column_in_original_file")
        .unwrap();
    assert_eq!(combined.value(0, provenance_idx), &json!(true));
    assert_eq!(combined.value(1, provenance_idx), &json!(false));
}
