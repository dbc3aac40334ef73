//! Externally produced reference count table (tuning path input).
//!
//! The reference CSV is hand-maintained outside the pipeline. Headers are
//! matched case-insensitively (normalized to lowercase); the file may carry
//! extra columns, only the five required ones are read. Count cells may be
//! empty, which means "not counted", never zero.

use std::io::Read;
use std::path::Path;

use crate::error::TallyError;

/// Columns the reference file must provide (after lowercasing headers).
pub const REQUIRED_COLUMNS: [&str; 5] = [
    "mouse_id",
    "image_number",
    "cd8_by_xm",
    "cd4_by_xm",
    "foxp3_by_xm",
];

/// One externally counted (mouse, image) row.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceRecord {
    /// Mouse identifier
    pub mouse_id: String,
    /// Image number
    pub image_number: i64,
    /// External CD8 count, if counted
    pub cd8_by_xm: Option<f64>,
    /// External CD4 count, if counted
    pub cd4_by_xm: Option<f64>,
    /// External Foxp3 count, if counted
    pub foxp3_by_xm: Option<f64>,
}

/// Read a reference CSV file.
pub fn read_reference_file(path: &Path) -> Result<Vec<ReferenceRecord>, TallyError> {
    log::info!("Reading reference count file {:?}", path);
    let file = std::fs::File::open(path)?;
    read_reference(file)
}

/// Read reference records from a CSV stream.
pub fn read_reference<R: Read>(reader: R) -> Result<Vec<ReferenceRecord>, TallyError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers: Vec<String> = csv_reader
        .headers()?
        .iter()
        .map(str::to_lowercase)
        .collect();

    let column = |name: &str| -> Result<usize, TallyError> {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| TallyError::reference(format!("missing required column '{name}'")))
    };
    let mouse_idx = column(REQUIRED_COLUMNS[0])?;
    let image_idx = column(REQUIRED_COLUMNS[1])?;
    let cd8_idx = column(REQUIRED_COLUMNS[2])?;
    let cd4_idx = column(REQUIRED_COLUMNS[3])?;
    let foxp3_idx = column(REQUIRED_COLUMNS[4])?;

    let mut records = Vec::new();
    for (index, row) in csv_reader.records().enumerate() {
        let row = row?;
        let row_number = index + 2; // 1-based, after the header line

        let mouse_id = row.get(mouse_idx).unwrap_or("").to_string();
        let image_number = row
            .get(image_idx)
            .unwrap_or("")
            .parse::<i64>()
            .map_err(|_| {
                TallyError::reference(format!(
                    "row {row_number}: image_number '{}' is not an integer",
                    row.get(image_idx).unwrap_or("")
                ))
            })?;

        records.push(ReferenceRecord {
            mouse_id,
            image_number,
            cd8_by_xm: parse_count(row.get(cd8_idx), REQUIRED_COLUMNS[2], row_number)?,
            cd4_by_xm: parse_count(row.get(cd4_idx), REQUIRED_COLUMNS[3], row_number)?,
            foxp3_by_xm: parse_count(row.get(foxp3_idx), REQUIRED_COLUMNS[4], row_number)?,
        });
    }

    log::debug!("Read {} reference rows", records.len());
    Ok(records)
}

/// Parse a possibly-empty count cell. Empty and NA-style cells are null.
fn parse_count(
    cell: Option<&str>,
    name: &str,
    row_number: usize,
) -> Result<Option<f64>, TallyError> {
    let Some(cell) = cell else {
        return Ok(None);
    };
    if cell.is_empty() || cell.eq_ignore_ascii_case("na") || cell.eq_ignore_ascii_case("nan") {
        return Ok(None);
    }
    cell.parse::<f64>().map(Some).map_err(|_| {
        TallyError::reference(format!("row {row_number}: {name} '{cell}' is not a number"))
    })
}
