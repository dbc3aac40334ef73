//! GeoJSON schema normalization.
//!
//! Annotation exports from the histology analysis tool are GeoJSON feature
//! collections whose per-feature properties differ from file to file (some
//! exports carry `properties.isLocked`, some carry
//! `properties.classification.names`, some carry neither). This module
//! flattens each document into an [`AnnotationFrame`] with one canonical,
//! alphabetically sorted column set so that fragments from different files
//! can later be concatenated without column drift.

use std::collections::HashSet;
use std::path::Path;

use serde_json::{Map, Value};

use crate::error::TallyError;
use crate::frame::AnnotationFrame;

/// Document-level type column (`"FeatureCollection"` in practice).
pub const DOCUMENT_TYPE: &str = "type";

/// Per-feature type column, renamed from the feature's own `type` field to
/// avoid colliding with [`DOCUMENT_TYPE`].
pub const FEATURE_TYPE: &str = "feature_type";

/// Classification name assigned to a detected cell.
pub const CLASSIFICATION_NAME: &str = "properties.classification.name";

/// Multi-label classification list; absent in many exports.
pub const CLASSIFICATION_NAMES: &str = "properties.classification.names";

/// Lock flag; absent in many exports.
pub const IS_LOCKED: &str = "properties.isLocked";

/// Measured cell area in square micrometers.
pub const AREA_UM2: &str = "properties.measurements.Area µm^2";

/// Provenance flag: was [`IS_LOCKED`] present in the source file, or
/// synthesized as null during normalization?
pub const HAS_IS_LOCKED: &str = "has_is_locked_column_in_original_file";

/// Provenance flag for [`CLASSIFICATION_NAMES`], same contract as
/// [`HAS_IS_LOCKED`].
pub const HAS_CLASSIFICATION_NAMES: &str =
    "has_properties_classification_names_column_in_original_file";

/// Read and normalize one annotation file.
pub fn read_geojson(path: &Path) -> Result<AnnotationFrame, TallyError> {
    log::info!("Reading annotation file {:?}", path);
    let bytes = std::fs::read(path)?;
    normalize_bytes(&bytes)
}

/// Normalize raw GeoJSON bytes (upload path, where no filesystem path
/// exists).
pub fn normalize_bytes(bytes: &[u8]) -> Result<AnnotationFrame, TallyError> {
    let document: Value = serde_json::from_slice(bytes)?;
    normalize_document(&document)
}

/// Normalize one parsed GeoJSON document into an annotation frame.
///
/// The document must have exactly the top-level fields `type` and
/// `features`, in that order. Each feature is flattened into dotted-path
/// columns; the feature-level `type` field becomes [`FEATURE_TYPE`] and the
/// document-level `type` value is repeated on every row. After the
/// [`IS_LOCKED`] / [`CLASSIFICATION_NAMES`] backfill, columns are sorted by
/// name (ordinal, case-sensitive) to guarantee a stable order for
/// concatenation.
pub fn normalize_document(document: &Value) -> Result<AnnotationFrame, TallyError> {
    let object = document
        .as_object()
        .ok_or_else(|| TallyError::schema("document is not a JSON object"))?;

    let keys: Vec<&str> = object.keys().map(String::as_str).collect();
    if keys != [DOCUMENT_TYPE, "features"] {
        return Err(TallyError::schema(format!(
            "expected top-level fields [\"type\", \"features\"], found {keys:?}"
        )));
    }

    let document_type = &object[DOCUMENT_TYPE];
    let features = object["features"]
        .as_array()
        .ok_or_else(|| TallyError::schema("\"features\" is not an array"))?;

    // Flatten each feature, renaming its own "type" to keep the
    // document-level "type" column unambiguous.
    let mut flat_rows: Vec<Map<String, Value>> = Vec::with_capacity(features.len());
    for (index, feature) in features.iter().enumerate() {
        if !feature.is_object() {
            return Err(TallyError::schema(format!(
                "feature {index} is not a JSON object"
            )));
        }
        let mut flat = Map::new();
        flatten_into(&mut flat, "", feature);
        if let Some(feature_type) = flat.shift_remove(DOCUMENT_TYPE) {
            flat.insert(FEATURE_TYPE.to_string(), feature_type);
        }
        flat_rows.push(flat);
    }

    // Column union over all features, in first-seen order, with the
    // document-level type column prepended.
    let mut columns: Vec<String> = vec![DOCUMENT_TYPE.to_string()];
    let mut seen: HashSet<&str> = HashSet::new();
    seen.insert(DOCUMENT_TYPE);
    for flat in &flat_rows {
        for key in flat.keys() {
            if seen.insert(key) {
                columns.push(key.clone());
            }
        }
    }

    // Backfill the two optional columns and record whether they were real.
    let has_is_locked = columns.iter().any(|c| c == IS_LOCKED);
    if !has_is_locked {
        columns.push(IS_LOCKED.to_string());
    }
    columns.push(HAS_IS_LOCKED.to_string());

    let has_classification_names = columns.iter().any(|c| c == CLASSIFICATION_NAMES);
    if !has_classification_names {
        columns.push(CLASSIFICATION_NAMES.to_string());
    }
    columns.push(HAS_CLASSIFICATION_NAMES.to_string());

    columns.sort();

    let mut frame = AnnotationFrame::new(columns.clone());
    for flat in &flat_rows {
        let row = columns
            .iter()
            .map(|column| match column.as_str() {
                DOCUMENT_TYPE => document_type.clone(),
                HAS_IS_LOCKED => Value::Bool(has_is_locked),
                HAS_CLASSIFICATION_NAMES => Value::Bool(has_classification_names),
                _ => flat.get(column).cloned().unwrap_or(Value::Null),
            })
            .collect();
        frame.push_row(row);
    }

    log::debug!(
        "Normalized {} features into {} columns",
        frame.len(),
        frame.columns().len()
    );
    Ok(frame)
}

/// Flatten nested JSON objects into dotted-path leaves. Arrays and scalars
/// are leaves and are kept verbatim.
fn flatten_into(out: &mut Map<String, Value>, prefix: &str, value: &Value) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                flatten_into(out, &path, child);
            }
        }
        leaf => {
            out.insert(prefix.to_string(), leaf.clone());
        }
    }
}

/// Extract the image number from an annotation file name.
///
/// The export convention is `<prefix>_<image number>.<ext>`, e.g.
/// `slide_12.geojson`: split on `_`, take the second segment, truncate at
/// the first `.`, parse as an integer. Anything else is a named
/// [`TallyError::FileName`] instead of an opaque index panic.
pub fn image_number_from_filename(name: &str) -> Result<i64, TallyError> {
    let segments: Vec<&str> = name.split('_').collect();
    if segments.len() < 2 {
        return Err(TallyError::file_name(
            name,
            "expected at least two underscore-separated segments",
        ));
    }

    let raw = match segments[1].find('.') {
        Some(dot) => &segments[1][..dot],
        None => segments[1],
    };
    raw.parse::<i64>().map_err(|_| {
        TallyError::file_name(name, format!("segment '{raw}' is not an integer"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn feature(class: &str, area: f64) -> Value {
        json!({
            "type": "Feature",
            "geometry": {"type": "Polygon"},
            "properties": {
                "classification": {"name": class},
                "measurements": {"Area µm^2": area}
            }
        })
    }

    fn collection(features: Vec<Value>) -> Value {
        json!({"type": "FeatureCollection", "features": features})
    }

    #[test]
    fn test_normalize_flattens_nested_properties() {
        let frame = normalize_document(&collection(vec![feature("CD8", 31.5)])).unwrap();

        let class_idx = frame.column_index(CLASSIFICATION_NAME).unwrap();
        let area_idx = frame.column_index(AREA_UM2).unwrap();
        assert_eq!(frame.value(0, class_idx), &json!("CD8"));
        assert_eq!(frame.value(0, area_idx), &json!(31.5));

        // Feature-level "type" was renamed; document-level kept.
        let feature_type_idx = frame.column_index(FEATURE_TYPE).unwrap();
        let doc_type_idx = frame.column_index(DOCUMENT_TYPE).unwrap();
        assert_eq!(frame.value(0, feature_type_idx), &json!("Feature"));
        assert_eq!(frame.value(0, doc_type_idx), &json!("FeatureCollection"));
    }

    #[test]
    fn test_normalize_backfills_missing_optional_columns() {
        let frame = normalize_document(&collection(vec![feature("CD4", 20.0)])).unwrap();

        let locked_idx = frame.column_index(IS_LOCKED).unwrap();
        let names_idx = frame.column_index(CLASSIFICATION_NAMES).unwrap();
        assert_eq!(frame.value(0, locked_idx), &Value::Null);
        assert_eq!(frame.value(0, names_idx), &Value::Null);

        let has_locked_idx = frame.column_index(HAS_IS_LOCKED).unwrap();
        let has_names_idx = frame.column_index(HAS_CLASSIFICATION_NAMES).unwrap();
        assert_eq!(frame.value(0, has_locked_idx), &json!(false));
        assert_eq!(frame.value(0, has_names_idx), &json!(false));
    }

    #[test]
    fn test_normalize_preserves_present_optional_columns() {
        let doc = json!({
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "properties": {
                    "isLocked": true,
                    "classification": {"name": "CD8", "names": ["CD8"]}
                }
            }]
        });
        let frame = normalize_document(&doc).unwrap();

        let locked_idx = frame.column_index(IS_LOCKED).unwrap();
        assert_eq!(frame.value(0, locked_idx), &json!(true));

        let has_locked_idx = frame.column_index(HAS_IS_LOCKED).unwrap();
        let has_names_idx = frame.column_index(HAS_CLASSIFICATION_NAMES).unwrap();
        assert_eq!(frame.value(0, has_locked_idx), &json!(true));
        assert_eq!(frame.value(0, has_names_idx), &json!(true));
    }

    #[test]
    fn test_normalize_sorts_columns() {
        let frame = normalize_document(&collection(vec![feature("CD8", 10.0)])).unwrap();
        let mut sorted = frame.columns().to_vec();
        sorted.sort();
        assert_eq!(frame.columns(), sorted.as_slice());
    }

    #[test]
    fn test_normalize_rejects_unexpected_top_level_fields() {
        let doc = json!({"type": "FeatureCollection", "features": [], "extra": 1});
        assert!(matches!(
            normalize_document(&doc),
            Err(TallyError::Schema { .. })
        ));
    }

    #[test]
    fn test_normalize_rejects_wrong_field_order() {
        // Same field SET, wrong order: still a schema error.
        let text = r#"{"features": [], "type": "FeatureCollection"}"#;
        assert!(matches!(
            normalize_bytes(text.as_bytes()),
            Err(TallyError::Schema { .. })
        ));
    }

    #[test]
    fn test_normalize_missing_column_in_some_features_is_null() {
        let with_area = feature("CD8", 12.0);
        let without_area = json!({
            "type": "Feature",
            "properties": {"classification": {"name": "CD8"}}
        });
        let frame = normalize_document(&collection(vec![with_area, without_area])).unwrap();

        let area_idx = frame.column_index(AREA_UM2).unwrap();
        assert_eq!(frame.value(0, area_idx), &json!(12.0));
        assert_eq!(frame.value(1, area_idx), &Value::Null);
    }

    #[test]
    fn test_image_number_from_filename() {
        assert_eq!(image_number_from_filename("slide_12.geojson").unwrap(), 12);
        assert_eq!(image_number_from_filename("a_3_b.geojson").unwrap(), 3);
        assert_eq!(image_number_from_filename("x_7").unwrap(), 7);
    }

    #[test]
    fn test_image_number_rejects_malformed_names() {
        assert!(matches!(
            image_number_from_filename("noseparator.geojson"),
            Err(TallyError::FileName { .. })
        ));
        assert!(matches!(
            image_number_from_filename("slide_abc.geojson"),
            Err(TallyError::FileName { .. })
        ));
    }
}
