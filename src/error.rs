//! Error types for the cell-count pipeline.

use thiserror::Error;

/// Errors that can occur while ingesting, combining, or comparing
/// annotation tables.
#[derive(Error, Debug)]
pub enum TallyError {
    /// I/O error during file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error in a GeoJSON annotation file
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV parsing or serialization error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// GeoJSON document does not have the expected top-level structure
    #[error("Unexpected GeoJSON structure: {message}")]
    Schema {
        /// Description of the structural problem
        message: String,
    },

    /// Malformed line in the mouse/image mapping file
    #[error("Malformed mapping line {line}: {message}")]
    MappingLine {
        /// 1-based line number in the mapping file
        line: usize,
        /// Description of the format error
        message: String,
    },

    /// Annotation file fragments disagree on their column sets
    #[error("Column mismatch between annotation files: missing {missing:?}, unexpected {unexpected:?}")]
    ColumnMismatch {
        /// Columns expected from earlier fragments but absent here
        missing: Vec<String>,
        /// Columns present here but absent from earlier fragments
        unexpected: Vec<String>,
    },

    /// File name does not follow the `<prefix>_<image number>.<ext>` convention
    #[error("Cannot extract an image number from file name '{name}': {message}")]
    FileName {
        /// The offending file name
        name: String,
        /// Description of the naming problem
        message: String,
    },

    /// A column required for aggregation is absent or holds unusable values
    #[error("Aggregation input lacks usable column '{column}'")]
    MissingColumn {
        /// Name of the missing or unusable column
        column: String,
    },

    /// Reference CSV is missing a required column or holds an unreadable value
    #[error("Invalid reference table: {message}")]
    Reference {
        /// Description of the reference table problem
        message: String,
    },

    /// Threshold value outside the bounds allowed by the active preset
    #[error("{marker} threshold {value} outside allowed range {min}..={max}")]
    ThresholdOutOfRange {
        /// Marker the threshold applies to
        marker: String,
        /// The rejected threshold value
        value: f64,
        /// Lower bound of the allowed range
        min: f64,
        /// Upper bound of the allowed range
        max: f64,
    },
}

impl TallyError {
    /// Create a schema error with a message.
    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema {
            message: message.into(),
        }
    }

    /// Create a mapping line error for the given 1-based line number.
    pub fn mapping_line(line: usize, message: impl Into<String>) -> Self {
        Self::MappingLine {
            line,
            message: message.into(),
        }
    }

    /// Create a file name error.
    pub fn file_name(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::FileName {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create a missing column error.
    pub fn missing_column(column: impl Into<String>) -> Self {
        Self::MissingColumn {
            column: column.into(),
        }
    }

    /// Create a reference table error.
    pub fn reference(message: impl Into<String>) -> Self {
        Self::Reference {
            message: message.into(),
        }
    }
}
