//! Per-session caching of parsed tables.
//!
//! Parsing a large annotation export is the expensive step of the
//! pipeline, and one session re-runs the aggregation many times while the
//! operator adjusts thresholds. The cache keys parsed tables by file name
//! plus a fingerprint of the raw bytes, so re-supplying the same upload is
//! free and supplying changed bytes under the same name re-parses.
//! Invalidation is explicit via [`SessionCache::clear`].

use std::collections::HashMap;
use std::collections::hash_map::{DefaultHasher, Entry};
use std::hash::{Hash, Hasher};

use crate::error::TallyError;
use crate::frame::AnnotationFrame;
use crate::geojson;
use crate::mapping::{self, MappingRecord};

/// Fingerprint of an uploaded file's raw bytes.
fn fingerprint(bytes: &[u8]) -> u64 {
    let mut hasher = DefaultHasher::new();
    bytes.hash(&mut hasher);
    hasher.finish()
}

/// Session-scoped cache of normalized annotation frames and the expanded
/// mapping table.
#[derive(Debug, Default)]
pub struct SessionCache {
    annotations: HashMap<String, (u64, AnnotationFrame)>,
    mapping: Option<(u64, Vec<MappingRecord>)>,
}

impl SessionCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalized frame for one uploaded annotation file, tagged with the
    /// image number derived from `name`. Parses on first sight or when the
    /// bytes changed; otherwise returns the cached frame.
    pub fn annotation_frame(
        &mut self,
        name: &str,
        bytes: &[u8],
    ) -> Result<&AnnotationFrame, TallyError> {
        let digest = fingerprint(bytes);
        match self.annotations.entry(name.to_owned()) {
            Entry::Occupied(entry) if entry.get().0 == digest => {
                log::debug!("Annotation cache hit for '{name}'");
                Ok(&entry.into_mut().1)
            }
            Entry::Occupied(mut entry) => {
                let frame = parse_annotation(name, bytes)?;
                entry.insert((digest, frame));
                Ok(&entry.into_mut().1)
            }
            Entry::Vacant(entry) => {
                let frame = parse_annotation(name, bytes)?;
                Ok(&entry.insert((digest, frame)).1)
            }
        }
    }

    /// Expanded mapping table for the uploaded mapping file. Same caching
    /// contract as [`Self::annotation_frame`].
    pub fn mapping(&mut self, bytes: &[u8]) -> Result<&[MappingRecord], TallyError> {
        let digest = fingerprint(bytes);
        let hit = matches!(&self.mapping, Some((d, _)) if *d == digest);
        if hit {
            log::debug!("Mapping cache hit");
        } else {
            let text = std::str::from_utf8(bytes).map_err(|e| {
                TallyError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
            })?;
            let records = mapping::parse_mapping(text)?;
            self.mapping = Some((digest, records));
        }
        match &self.mapping {
            Some((_, records)) => Ok(records),
            None => Ok(&[]),
        }
    }

    /// Number of cached annotation frames.
    pub fn annotation_count(&self) -> usize {
        self.annotations.len()
    }

    /// Drop every cached table.
    pub fn clear(&mut self) {
        self.annotations.clear();
        self.mapping = None;
    }
}

fn parse_annotation(name: &str, bytes: &[u8]) -> Result<AnnotationFrame, TallyError> {
    let image_number = geojson::image_number_from_filename(name)?;
    let mut frame = geojson::normalize_bytes(bytes)?;
    frame.set_image_number(image_number);
    Ok(frame)
}
