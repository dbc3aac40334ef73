//! Threshold filtering, mapping join, and per-image aggregation.
//!
//! This is the core query of the pipeline: left-join the combined
//! annotation table against the mouse mapping on image number, keep only
//! marker rows whose area passes that marker's threshold, then count per
//! (mouse, image) group.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;

use crate::error::TallyError;
use crate::frame::{AnnotationFrame, IMAGE_NUMBER};
use crate::geojson::{AREA_UM2, CLASSIFICATION_NAME};
use crate::mapping::MappingRecord;

/// Classification name excluded from every count.
const OTHER: &str = "Other";

/// The three cell-classification markers the pipeline counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    /// Cytotoxic T cells
    Cd8,
    /// Helper T cells
    Cd4,
    /// Regulatory T cells
    Foxp3,
}

impl Marker {
    /// All markers, in reporting order.
    pub const ALL: [Marker; 3] = [Marker::Cd8, Marker::Cd4, Marker::Foxp3];

    /// Match a classification name from the annotation export.
    /// Names are an open set; anything unrecognized (including `Other`)
    /// returns `None` and is excluded from counting.
    pub fn from_name(name: &str) -> Option<Marker> {
        match name {
            "CD8" => Some(Marker::Cd8),
            "CD4" => Some(Marker::Cd4),
            "Foxp3" => Some(Marker::Foxp3),
            _ => None,
        }
    }

    /// The classification name as it appears in the export.
    pub fn name(&self) -> &'static str {
        match self {
            Marker::Cd8 => "CD8",
            Marker::Cd4 => "CD4",
            Marker::Foxp3 => "Foxp3",
        }
    }
}

/// Per-marker area thresholds in µm².
///
/// Two named presets exist because the two entry modes of the original
/// workflow carried different defaults; the mismatch is intentional
/// configuration, not a bug to unify.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Thresholds {
    /// Minimum area for a CD8 cell to count
    pub cd8: f64,
    /// Minimum area for a CD4 cell to count
    pub cd4: f64,
    /// Minimum area for a Foxp3 cell to count
    pub foxp3: f64,
}

impl Thresholds {
    /// Defaults of the production/export path.
    pub const EXPORT_DEFAULTS: Thresholds = Thresholds {
        cd8: 25.0,
        cd4: 30.0,
        foxp3: 20.0,
    };

    /// Defaults of the tuning path, which additionally bounds every
    /// threshold to [`Self::TUNING_MIN`]..=[`Self::TUNING_MAX`].
    pub const TUNING_DEFAULTS: Thresholds = Thresholds {
        cd8: 25.0,
        cd4: 25.0,
        foxp3: 25.0,
    };

    /// Lower bound of the tuning range.
    pub const TUNING_MIN: f64 = 0.0;

    /// Upper bound of the tuning range.
    pub const TUNING_MAX: f64 = 100.0;

    /// Threshold for one marker.
    pub fn for_marker(&self, marker: Marker) -> f64 {
        match marker {
            Marker::Cd8 => self.cd8,
            Marker::Cd4 => self.cd4,
            Marker::Foxp3 => self.foxp3,
        }
    }

    /// Check every threshold against the tuning bounds.
    pub fn validate_tuning_bounds(&self) -> Result<(), TallyError> {
        for marker in Marker::ALL {
            let value = self.for_marker(marker);
            if !(Self::TUNING_MIN..=Self::TUNING_MAX).contains(&value) {
                return Err(TallyError::ThresholdOutOfRange {
                    marker: marker.name().to_string(),
                    value,
                    min: Self::TUNING_MIN,
                    max: Self::TUNING_MAX,
                });
            }
        }
        Ok(())
    }
}

/// Counts for one (mouse, image) group.
///
/// The per-marker counts are taken over the threshold-filtered rows, so
/// `cd8_count` only counts CD8 rows that passed the CD8 area threshold.
/// `mouse_id` is `None` for annotation rows whose image number has no
/// mapping entry; the left join keeps them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregateRecord {
    /// Mouse the image maps to, if any
    pub mouse_id: Option<String>,
    /// Image the annotations came from
    pub image_number: i64,
    /// All rows in the group that passed their marker's threshold
    pub row_count: u64,
    /// CD8 rows that passed the CD8 threshold
    pub cd8_count: u64,
    /// CD4 rows that passed the CD4 threshold
    pub cd4_count: u64,
    /// Foxp3 rows that passed the Foxp3 threshold
    pub foxp3_count: u64,
}

#[derive(Default)]
struct GroupCounts {
    rows: u64,
    cd8: u64,
    cd4: u64,
    foxp3: u64,
}

/// Join, filter, group, and count.
///
/// Semantics, pinned explicitly:
/// - Left outer join: every annotation row is kept, mapped or not; rows for
///   unmapped images group under a null mouse id.
/// - An image mapped to several mice (or duplicated mapping pairs) joins
///   once per mapping record; duplicates inflate counts by design.
/// - A row counts only if its classification is a [`Marker`] and its area
///   cell is numeric and `>=` that marker's threshold. Null or non-numeric
///   areas fail every threshold, mirroring SQL null comparison semantics.
/// - Output is ordered by mouse id ascending with nulls LAST, then image
///   number ascending.
///
/// An empty annotation table yields an empty result. A non-empty table
/// missing one of the required columns is a [`TallyError::MissingColumn`].
pub fn aggregate(
    annotations: &AnnotationFrame,
    mapping: &[MappingRecord],
    thresholds: &Thresholds,
) -> Result<Vec<AggregateRecord>, TallyError> {
    if annotations.is_empty() {
        return Ok(Vec::new());
    }

    let class_idx = annotations
        .column_index(CLASSIFICATION_NAME)
        .ok_or_else(|| TallyError::missing_column(CLASSIFICATION_NAME))?;
    let area_idx = annotations
        .column_index(AREA_UM2)
        .ok_or_else(|| TallyError::missing_column(AREA_UM2))?;
    let image_idx = annotations
        .column_index(IMAGE_NUMBER)
        .ok_or_else(|| TallyError::missing_column(IMAGE_NUMBER))?;

    // image_number -> mouse ids, preserving mapping order and duplicates.
    let mut mice_by_image: HashMap<i64, Vec<&str>> = HashMap::new();
    for record in mapping {
        mice_by_image
            .entry(record.image_number)
            .or_default()
            .push(record.mouse_id.as_str());
    }

    let mut groups: HashMap<(Option<String>, i64), GroupCounts> = HashMap::new();

    for row in 0..annotations.len() {
        let Some(class) = annotations.value(row, class_idx).as_str() else {
            continue;
        };
        if class == OTHER {
            continue;
        }
        let Some(marker) = Marker::from_name(class) else {
            continue;
        };
        let Some(area) = annotations.value(row, area_idx).as_f64() else {
            continue;
        };
        if area < thresholds.for_marker(marker) {
            continue;
        }

        let image_number = match annotations.value(row, image_idx) {
            Value::Number(n) => n
                .as_i64()
                .ok_or_else(|| TallyError::missing_column(IMAGE_NUMBER))?,
            _ => return Err(TallyError::missing_column(IMAGE_NUMBER)),
        };

        let mice = mice_by_image.get(&image_number);
        match mice {
            Some(mice) if !mice.is_empty() => {
                for mouse in mice {
                    bump(&mut groups, (Some((*mouse).to_string()), image_number), marker);
                }
            }
            _ => bump(&mut groups, (None, image_number), marker),
        }
    }

    let mut records: Vec<AggregateRecord> = groups
        .into_iter()
        .map(|((mouse_id, image_number), counts)| AggregateRecord {
            mouse_id,
            image_number,
            row_count: counts.rows,
            cd8_count: counts.cd8,
            cd4_count: counts.cd4,
            foxp3_count: counts.foxp3,
        })
        .collect();

    records.sort_by(|a, b| {
        compare_mouse_ids(&a.mouse_id, &b.mouse_id)
            .then_with(|| a.image_number.cmp(&b.image_number))
    });

    log::info!(
        "Aggregated {} annotation rows into {} (mouse, image) groups",
        annotations.len(),
        records.len()
    );
    Ok(records)
}

fn bump(
    groups: &mut HashMap<(Option<String>, i64), GroupCounts>,
    key: (Option<String>, i64),
    marker: Marker,
) {
    let counts = groups.entry(key).or_default();
    counts.rows += 1;
    match marker {
        Marker::Cd8 => counts.cd8 += 1,
        Marker::Cd4 => counts.cd4 += 1,
        Marker::Foxp3 => counts.foxp3 += 1,
    }
}

/// Lexicographic ascending, null mouse ids after every named mouse.
fn compare_mouse_ids(a: &Option<String>, b: &Option<String>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
