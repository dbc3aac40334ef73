//! Canonical row-table for normalized annotation data.
//!
//! Every annotation file is normalized into an [`AnnotationFrame`]: a fixed,
//! ordered column set plus one row per detected feature. Cells are
//! [`serde_json::Value`]s because source files carry heterogeneous nested
//! properties; the well-known columns get typed accessors at the call sites
//! that need them.

use serde_json::Value;

use crate::error::TallyError;

/// Column holding the image number a fragment was tagged with.
///
/// Appended after normalization (it comes from the file NAME, not the file
/// contents), so it always sits after the alphabetically sorted source
/// columns.
pub const IMAGE_NUMBER: &str = "image_number";

/// Ordered table of annotation records sharing one column set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnnotationFrame {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl AnnotationFrame {
    /// Create an empty frame with the given column order.
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Column names in table order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the frame holds no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Append a row. The caller is responsible for matching the column
    /// order; lengths are checked in debug builds only.
    pub fn push_row(&mut self, row: Vec<Value>) {
        debug_assert_eq!(row.len(), self.columns.len());
        self.rows.push(row);
    }

    /// Position of a column by name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Cell value at (row, column index).
    pub fn value(&self, row: usize, column: usize) -> &Value {
        &self.rows[row][column]
    }

    /// Tag every row with the image number derived from the source file
    /// name, appending the [`IMAGE_NUMBER`] column if it is not present yet.
    pub fn set_image_number(&mut self, image_number: i64) {
        let cell = Value::from(image_number);
        match self.column_index(IMAGE_NUMBER) {
            Some(idx) => {
                for row in &mut self.rows {
                    row[idx] = cell.clone();
                }
            }
            None => {
                self.columns.push(IMAGE_NUMBER.to_string());
                for row in &mut self.rows {
                    row.push(cell.clone());
                }
            }
        }
    }

    /// Concatenate per-file fragments into one combined frame.
    ///
    /// Fragments are appended in the order supplied and keep their internal
    /// row order; the combined row index is implicitly dense and 0-based.
    /// All fragments must share the first fragment's exact column list.
    /// Divergence is a [`TallyError::ColumnMismatch`] rather than a silent
    /// null-filled union.
    pub fn concat(fragments: Vec<AnnotationFrame>) -> Result<AnnotationFrame, TallyError> {
        let mut fragments = fragments.into_iter();
        let Some(mut combined) = fragments.next() else {
            return Ok(AnnotationFrame::default());
        };

        for fragment in fragments {
            if fragment.columns != combined.columns {
                let missing = combined
                    .columns
                    .iter()
                    .filter(|c| !fragment.columns.contains(c))
                    .cloned()
                    .collect();
                let unexpected = fragment
                    .columns
                    .iter()
                    .filter(|c| !combined.columns.contains(c))
                    .cloned()
                    .collect();
                return Err(TallyError::ColumnMismatch {
                    missing,
                    unexpected,
                });
            }
            combined.rows.extend(fragment.rows);
        }

        log::info!(
            "Combined annotation table: {} rows, {} columns",
            combined.rows.len(),
            combined.columns.len()
        );
        Ok(combined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn frame(columns: &[&str], rows: &[&[Value]]) -> AnnotationFrame {
        let mut f = AnnotationFrame::new(columns.iter().map(|c| c.to_string()).collect());
        for row in rows {
            f.push_row(row.to_vec());
        }
        f
    }

    #[test]
    fn test_concat_preserves_row_count_and_order() {
        let a = frame(&["x"], &[&[json!(1)], &[json!(2)]]);
        let b = frame(&["x"], &[&[json!(3)]]);

        let combined = AnnotationFrame::concat(vec![a, b]).unwrap();
        assert_eq!(combined.len(), 3);
        assert_eq!(combined.value(0, 0), &json!(1));
        assert_eq!(combined.value(1, 0), &json!(2));
        assert_eq!(combined.value(2, 0), &json!(3));
    }

    #[test]
    fn test_concat_rejects_column_mismatch() {
        let a = frame(&["x", "y"], &[&[json!(1), json!(2)]]);
        let b = frame(&["x", "z"], &[&[json!(1), json!(2)]]);

        let err = AnnotationFrame::concat(vec![a, b]).unwrap_err();
        match err {
            TallyError::ColumnMismatch {
                missing,
                unexpected,
            } => {
                assert_eq!(missing, vec!["y".to_string()]);
                assert_eq!(unexpected, vec!["z".to_string()]);
            }
            other => panic!("expected ColumnMismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_concat_of_nothing_is_empty() {
        let combined = AnnotationFrame::concat(Vec::new()).unwrap();
        assert!(combined.is_empty());
        assert!(combined.columns().is_empty());
    }

    #[test]
    fn test_set_image_number_appends_column_once() {
        let mut f = frame(&["a"], &[&[json!("v")]]);
        f.set_image_number(7);
        assert_eq!(f.columns(), &["a".to_string(), IMAGE_NUMBER.to_string()]);
        assert_eq!(f.value(0, 1), &json!(7));

        // Re-tagging overwrites in place instead of appending again.
        f.set_image_number(8);
        assert_eq!(f.columns().len(), 2);
        assert_eq!(f.value(0, 1), &json!(8));
    }
}
