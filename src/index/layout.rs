//! Blob layout descriptor.
//!
//! In-memory saves produce a flat list of blobs: the variant's data
//! segments followed by the two metadata segments when metadata exists.
//! The `[BlobLayout]` config section records how many of each were
//! written so a loader never has to guess from the blob count.

use std::io::Write;
use std::ops::Range;

use crate::config::{end_section, write_param, write_section, IniReader, BLOB_LAYOUT_SECTION};
use crate::error::{AnnError, Result};

/// Current `[BlobLayout]` version.
pub const BLOB_LAYOUT_VERSION: u32 = 1;

/// Metadata segments: the entry blob and its offset index.
const METADATA_SEGMENTS: usize = 2;

/// Variant segment count assumed for configs written without a layout
/// section; more blobs than this means metadata follows.
const LEGACY_INDEX_SEGMENTS: usize = 4;

/// Blob counts of a saved index.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlobLayout {
    /// Layout format version.
    pub version: u32,
    /// Leading blobs owned by the variant.
    pub index_segments: usize,
    /// Trailing metadata blobs, 0 or 2.
    pub metadata_segments: usize,
}

impl BlobLayout {
    /// Layout for a save with `index_segments` variant blobs.
    pub fn new(index_segments: usize, with_metadata: bool) -> Self {
        Self {
            version: BLOB_LAYOUT_VERSION,
            index_segments,
            metadata_segments: if with_metadata { METADATA_SEGMENTS } else { 0 },
        }
    }

    /// Total blob count.
    pub fn total(&self) -> usize {
        self.index_segments + self.metadata_segments
    }

    /// Positions of the metadata blobs, if any.
    pub fn metadata_slots(&self) -> Option<Range<usize>> {
        (self.metadata_segments > 0).then(|| self.index_segments..self.total())
    }

    /// Writes the `[BlobLayout]` section.
    pub fn write(&self, out: &mut dyn Write) -> Result<()> {
        write_section(out, BLOB_LAYOUT_SECTION)?;
        write_param(out, "Version", self.version)?;
        write_param(out, "IndexSegments", self.index_segments)?;
        write_param(out, "MetaDataSegments", self.metadata_segments)?;
        end_section(out)
    }

    /// Determines the layout of `blob_count` blobs described by `reader`.
    ///
    /// Without a `[BlobLayout]` section, metadata occupies the last two
    /// blobs iff `has_metadata` and more than four blobs are present.
    ///
    /// # Errors
    /// Returns `FailedParseValue` for an unknown version, a metadata count
    /// other than 0 or 2, or a total that disagrees with `blob_count`.
    pub fn resolve(reader: &IniReader, blob_count: usize, has_metadata: bool) -> Result<Self> {
        if !reader.does_section_exist(BLOB_LAYOUT_SECTION) {
            let with_metadata = has_metadata && blob_count > LEGACY_INDEX_SEGMENTS;
            let metadata_segments = if with_metadata { METADATA_SEGMENTS } else { 0 };
            return Ok(Self {
                version: BLOB_LAYOUT_VERSION,
                index_segments: blob_count - metadata_segments,
                metadata_segments,
            });
        }

        let version: u32 = reader.require(BLOB_LAYOUT_SECTION, "Version")?;
        if version != BLOB_LAYOUT_VERSION {
            return Err(AnnError::parse(format!(
                "Unsupported blob layout version {}",
                version
            )));
        }
        let layout = Self {
            version,
            index_segments: reader.require(BLOB_LAYOUT_SECTION, "IndexSegments")?,
            metadata_segments: reader.require(BLOB_LAYOUT_SECTION, "MetaDataSegments")?,
        };
        if layout.metadata_segments != 0 && layout.metadata_segments != METADATA_SEGMENTS {
            return Err(AnnError::parse(format!(
                "MetaDataSegments must be 0 or {}, got {}",
                METADATA_SEGMENTS, layout.metadata_segments
            )));
        }
        if layout.index_segments.checked_add(layout.metadata_segments) != Some(blob_count) {
            return Err(AnnError::parse(format!(
                "Blob layout describes {} blobs, got {}",
                layout.total(),
                blob_count
            )));
        }
        Ok(layout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn written(layout: BlobLayout) -> IniReader {
        let mut out = Vec::new();
        layout.write(&mut out).unwrap();
        IniReader::parse(std::str::from_utf8(&out).unwrap()).unwrap()
    }

    #[test]
    fn test_resolve_written_layout() {
        let layout = BlobLayout::new(4, true);
        let reader = written(layout);
        assert_eq!(BlobLayout::resolve(&reader, 6, true).unwrap(), layout);
        assert_eq!(layout.metadata_slots(), Some(4..6));
        assert!(BlobLayout::resolve(&reader, 5, true).unwrap_err().is_parse());
    }

    #[test]
    fn test_legacy_rule() {
        let reader = IniReader::default();
        let with_meta = BlobLayout::resolve(&reader, 6, true).unwrap();
        assert_eq!(with_meta.metadata_slots(), Some(4..6));
        let four = BlobLayout::resolve(&reader, 4, true).unwrap();
        assert_eq!(four.metadata_slots(), None);
        let no_section = BlobLayout::resolve(&reader, 6, false).unwrap();
        assert_eq!(no_section.index_segments, 6);
    }

    #[test]
    fn test_rejects_unknown_version() {
        let reader = IniReader::parse(
            "[BlobLayout]\nVersion=7\nIndexSegments=4\nMetaDataSegments=0\n",
        )
        .unwrap();
        assert!(BlobLayout::resolve(&reader, 4, false).unwrap_err().is_parse());
    }
}
