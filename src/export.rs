//! CSV export of the aggregate table.

use std::io::Write;
use std::path::Path;

use crate::aggregate::AggregateRecord;
use crate::error::TallyError;

/// Write aggregate records as CSV with the header
/// `mouse_id,image_number,row_count,cd8_count,cd4_count,foxp3_count`.
/// No index column; a null mouse id serializes as an empty field.
pub fn write_csv<W: Write>(records: &[AggregateRecord], writer: W) -> Result<(), TallyError> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for record in records {
        csv_writer.serialize(record)?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// Write aggregate records to a CSV file.
pub fn write_csv_file(records: &[AggregateRecord], path: &Path) -> Result<(), TallyError> {
    log::info!("Writing {} aggregate rows to {:?}", records.len(), path);
    let file = std::fs::File::create(path)?;
    write_csv(records, file)
}

/// Render aggregate records to a CSV string (download path).
pub fn to_csv_string(records: &[AggregateRecord]) -> Result<String, TallyError> {
    let mut buffer = Vec::new();
    write_csv(records, &mut buffer)?;
    // csv output of valid UTF-8 records is valid UTF-8
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}
