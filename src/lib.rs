//! celltally - thresholded immune-cell counting from histology annotation exports.
//!
//! Ingests GeoJSON annotation exports produced by a histology image-analysis
//! tool, expands a compact mouse-to-image mapping file, and computes
//! per-mouse, per-image cell counts above configurable area thresholds for
//! the CD8, CD4, and Foxp3 markers. Optionally validates the computed
//! counts against an externally produced reference table and summarizes the
//! discrepancies.
//!
//! Pipeline, leaves first:
//! - [`geojson`] normalizes one export into an [`AnnotationFrame`];
//! - [`mapping`] expands mapping lines into (mouse, image) records;
//! - [`AnnotationFrame::concat`] unions the per-file fragments;
//! - [`aggregate::aggregate`] joins, filters by threshold, and counts;
//! - [`export`] writes the production CSV, or [`validate`] compares the
//!   counts against a [`reference`] table for threshold tuning.

pub mod aggregate;
pub mod error;
pub mod export;
pub mod frame;
pub mod geojson;
pub mod mapping;
pub mod reference;
pub mod session;
pub mod stats;
pub mod validate;

pub use aggregate::{AggregateRecord, Marker, Thresholds, aggregate};
pub use error::TallyError;
pub use frame::AnnotationFrame;
pub use mapping::{MappingRecord, parse_mapping};
pub use reference::ReferenceRecord;
pub use session::SessionCache;
pub use validate::{ComparisonRecord, DeltaSummary, compare, summarize};
