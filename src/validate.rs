//! Comparison of computed counts against the external reference table.
//!
//! The tuning path joins the aggregate output against hand-made reference
//! counts and reports how far the thresholds land from the external
//! counter's judgment, one delta column per marker.

use std::collections::HashMap;

use crate::aggregate::AggregateRecord;
use crate::reference::ReferenceRecord;
use crate::stats::{describe, Describe};

/// One joined (mouse, image) row with its per-marker deltas.
///
/// Deltas are `reference - computed`; a null reference count propagates as
/// a null delta, never zero.
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonRecord {
    /// Mouse identifier (always present; unmapped aggregate rows cannot join)
    pub mouse_id: String,
    /// Image number
    pub image_number: i64,
    /// `cd8_by_xm - cd8_count`
    pub cd8_delta: Option<f64>,
    /// `cd4_by_xm - cd4_count`
    pub cd4_delta: Option<f64>,
    /// `foxp3_by_xm - foxp3_count`
    pub foxp3_delta: Option<f64>,
}

/// Descriptive summary of the three delta columns.
#[derive(Debug, Clone, PartialEq)]
pub struct DeltaSummary {
    /// Summary of the CD8 deltas
    pub cd8: Describe,
    /// Summary of the CD4 deltas
    pub cd4: Describe,
    /// Summary of the Foxp3 deltas
    pub foxp3: Describe,
}

/// Inner-join aggregates with reference rows on (mouse_id, image_number)
/// and compute the delta columns.
///
/// Rows present on only one side are dropped, and aggregate rows with a
/// null mouse id never match. Joined rows whose three reference counts are
/// ALL null are dropped as well: they carry no signal for tuning. Output
/// order follows the reference table's row order.
pub fn compare(
    aggregates: &[AggregateRecord],
    reference: &[ReferenceRecord],
) -> Vec<ComparisonRecord> {
    let mut aggregates_by_key: HashMap<(&str, i64), &AggregateRecord> = HashMap::new();
    for aggregate in aggregates {
        if let Some(mouse_id) = &aggregate.mouse_id {
            aggregates_by_key.insert((mouse_id.as_str(), aggregate.image_number), aggregate);
        }
    }

    let mut rows = Vec::new();
    for record in reference {
        let Some(aggregate) = aggregates_by_key.get(&(record.mouse_id.as_str(), record.image_number))
        else {
            continue;
        };
        if record.cd8_by_xm.is_none()
            && record.cd4_by_xm.is_none()
            && record.foxp3_by_xm.is_none()
        {
            continue;
        }

        rows.push(ComparisonRecord {
            mouse_id: record.mouse_id.clone(),
            image_number: record.image_number,
            cd8_delta: record.cd8_by_xm.map(|v| v - aggregate.cd8_count as f64),
            cd4_delta: record.cd4_by_xm.map(|v| v - aggregate.cd4_count as f64),
            foxp3_delta: record.foxp3_by_xm.map(|v| v - aggregate.foxp3_count as f64),
        });
    }

    log::info!(
        "Compared {} aggregate rows against {} reference rows: {} matches",
        aggregates.len(),
        reference.len(),
        rows.len()
    );
    rows
}

/// Summarize the three delta columns.
pub fn summarize(rows: &[ComparisonRecord]) -> DeltaSummary {
    let cd8: Vec<Option<f64>> = rows.iter().map(|r| r.cd8_delta).collect();
    let cd4: Vec<Option<f64>> = rows.iter().map(|r| r.cd4_delta).collect();
    let foxp3: Vec<Option<f64>> = rows.iter().map(|r| r.foxp3_delta).collect();

    DeltaSummary {
        cd8: describe(&cd8),
        cd4: describe(&cd4),
        foxp3: describe(&foxp3),
    }
}
