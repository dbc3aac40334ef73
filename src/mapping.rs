//! Mouse-to-image mapping expansion.
//!
//! The mapping input is a plain text file with one entry per line:
//!
//! ```text
//! M1 10-12
//! M2 13-15
//! ```
//!
//! Each line expands into one record per image number in the inclusive
//! range, so `M1 10-12` yields (M1,10), (M1,11), (M1,12). Duplicate
//! (mouse, image) pairs are NOT deduplicated; a malformed input with
//! overlapping ranges inflates downstream counts through the join.

use std::path::Path;

use serde::Serialize;

use crate::error::TallyError;

/// One (mouse, image) pair produced by range expansion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MappingRecord {
    /// Mouse identifier, e.g. `M1`
    pub mouse_id: String,
    /// Image number the mouse maps to
    pub image_number: i64,
}

/// Read and expand a mapping file.
pub fn read_mapping(path: &Path) -> Result<Vec<MappingRecord>, TallyError> {
    log::info!("Reading mapping file {:?}", path);
    let text = std::fs::read_to_string(path)?;
    parse_mapping(&text)
}

/// Expand mapping text into row-level records.
///
/// Blank lines are skipped. A non-blank line must split into exactly two
/// whitespace-separated tokens, the second of which is `<start>-<end>` with
/// both ends parsing as integers. An empty range (`start > end`) yields
/// zero records and is not an error.
pub fn parse_mapping(text: &str) -> Result<Vec<MappingRecord>, TallyError> {
    let mut records = Vec::new();

    for (index, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        let line_number = index + 1;

        let mut tokens = line.split_whitespace();
        let (mouse_id, range) = match (tokens.next(), tokens.next(), tokens.next()) {
            (Some(mouse_id), Some(range), None) => (mouse_id, range),
            _ => {
                return Err(TallyError::mapping_line(
                    line_number,
                    "expected '<mouse_id> <start>-<end>'",
                ));
            }
        };

        let Some((start, end)) = range.split_once('-') else {
            return Err(TallyError::mapping_line(
                line_number,
                format!("range '{range}' has no '-' separator"),
            ));
        };
        let start: i64 = start.parse().map_err(|_| {
            TallyError::mapping_line(line_number, format!("range start '{start}' is not an integer"))
        })?;
        let end: i64 = end.parse().map_err(|_| {
            TallyError::mapping_line(line_number, format!("range end '{end}' is not an integer"))
        })?;

        for image_number in start..=end {
            records.push(MappingRecord {
                mouse_id: mouse_id.to_string(),
                image_number,
            });
        }
    }

    log::debug!("Expanded mapping into {} records", records.len());
    Ok(records)
}
