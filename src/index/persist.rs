//! Folder and in-memory persistence of a [`VectorIndex`].
//!
//! # Folder layout
//!
//! ```text
//! <folder>/
//!   indexloader.ini       config: [MetaData], [Index]
//!   metadata.bin          metadata entries        (if metadata)
//!   metadataIndex.bin     [count i32][offsets u64] (if metadata)
//!   vectors.bin tree.bin graph.bin deletes.bin
//! ```
//!
//! The blob form carries the same artifacts as a config string plus one
//! [`ByteArray`] per file, described by a `[BlobLayout]` section.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::RwLock;

use tracing::{debug, error, info, instrument};

use crate::byte_array::ByteArray;
use crate::config::{IniReader, INDEX_LOADER_FILE, INDEX_SECTION, METADATA_SECTION};
use crate::error::{AnnError, Result};
use crate::metadata::{MetadataSet, ReverseMap};
use crate::types::{IndexAlgoType, VectorValueType};

use super::layout::BlobLayout;
use super::{MetaState, VectorIndex};

/// An index serialized to memory.
#[derive(Clone, Debug)]
pub struct IndexBlobs {
    /// `indexloader.ini` content, including `[BlobLayout]`.
    pub config: String,
    /// Variant segments, then metadata and metadata index if present.
    pub blobs: Vec<ByteArray>,
}

impl VectorIndex {
    fn ensure_not_empty(&self) -> Result<()> {
        if self.num_samples() - self.num_deleted() == 0 {
            return Err(AnnError::EmptyIndex);
        }
        Ok(())
    }

    /// A compacted copy holding only live ids, if enough ids are deleted
    /// to warrant one.
    fn refined(&self) -> Result<Option<VectorIndex>> {
        if !self.algo.need_refine() {
            return Ok(None);
        }
        let (algo, kept) = self.algo.refine()?;
        let state = self.read_meta()?;
        let metadata = state.metadata.as_ref().map(|m| m.refine(&kept));
        let reverse = match (&metadata, &state.reverse) {
            (Some(m), Some(_)) => Some(ReverseMap::build(m, |id| algo.contain_sample(id))),
            _ => None,
        };
        info!(kept = kept.len(), "Saving compacted index");
        Ok(Some(VectorIndex {
            algo,
            meta: RwLock::new(MetaState {
                metadata,
                reverse,
                metadata_file: state.metadata_file.clone(),
                metadata_index_file: state.metadata_index_file.clone(),
            }),
        }))
    }

    /// Saves the index into `folder`, creating it if needed.
    ///
    /// If the variant reports that enough ids are deleted, a compacted
    /// copy is saved instead; ids are renumbered densely in that case.
    ///
    /// # Errors
    /// `EmptyIndex` if there are no live vectors (nothing is written),
    /// `FailedCreateFile` if the folder or a file cannot be created.
    #[instrument(skip(self, folder), fields(folder = %folder.as_ref().display()))]
    pub fn save_index(&self, folder: impl AsRef<Path>) -> Result<()> {
        self.ensure_not_empty()?;
        let folder = folder.as_ref();
        fs::create_dir_all(folder).map_err(|e| AnnError::create_file(folder, e))?;

        match self.refined()? {
            Some(compacted) => compacted.write_folder(folder),
            None => self.write_folder(folder),
        }
    }

    fn write_folder(&self, folder: &Path) -> Result<()> {
        let config_path = folder.join(INDEX_LOADER_FILE);
        let file = File::create(&config_path).map_err(|e| AnnError::create_file(&config_path, e))?;
        let mut out = BufWriter::new(file);
        self.save_index_config(&mut out)?;
        out.flush()?;

        {
            let state = self.read_meta()?;
            if let Some(metadata) = &state.metadata {
                metadata.save_files(
                    folder.join(&state.metadata_file),
                    folder.join(&state.metadata_index_file),
                )?;
            }
        }

        self.algo.save_index_data(folder)?;
        info!(samples = self.num_samples(), "Saved vector index");
        Ok(())
    }

    /// Loads an index saved with [`save_index`](Self::save_index).
    ///
    /// # Errors
    /// `FailedOpenFile` if the config or a data file is missing,
    /// `FailedParseValue` for unknown type tags or corrupt segments, `Fail`
    /// if the config lacks a distance method or metadata cannot be loaded.
    #[instrument(skip(folder), fields(folder = %folder.as_ref().display()))]
    pub fn load_index(folder: impl AsRef<Path>) -> Result<VectorIndex> {
        let folder = folder.as_ref();
        let reader = IniReader::load_file(folder.join(INDEX_LOADER_FILE))?;
        let index = Self::from_config(&reader)?;
        index.algo.load_index_data(folder)?;

        if reader.does_section_exist(METADATA_SECTION) {
            let (data_path, index_path) = {
                let state = index.read_meta()?;
                (
                    folder.join(&state.metadata_file),
                    folder.join(&state.metadata_index_file),
                )
            };
            let metadata = MetadataSet::load_files(&data_path, &index_path).map_err(|e| {
                error!(error = %e, "Failed to load metadata");
                AnnError::fail(format!("Failed to load metadata: {}", e))
            })?;
            index.install_metadata(metadata)?;
        }
        index.load_meta_mapping(&reader)?;

        info!(
            samples = index.num_samples(),
            deleted = index.num_deleted(),
            "Loaded vector index"
        );
        Ok(index)
    }

    /// Serializes the index to memory.
    ///
    /// Blob capacities are taken from
    /// [`calculate_buffer_size`](Self::calculate_buffer_size). Compaction
    /// follows the same rule as [`save_index`](Self::save_index).
    ///
    /// # Errors
    /// `EmptyIndex` if there are no live vectors.
    #[instrument(skip(self))]
    pub fn save_index_blobs(&self) -> Result<IndexBlobs> {
        self.ensure_not_empty()?;
        match self.refined()? {
            Some(compacted) => compacted.write_blobs(),
            None => self.write_blobs(),
        }
    }

    fn write_blobs(&self) -> Result<IndexBlobs> {
        let sizes = self.calculate_buffer_size();
        let mut buffers: Vec<Vec<u8>> = sizes
            .iter()
            .map(|&size| Vec::with_capacity(size as usize))
            .collect();
        let index_segments = self.algo.buffer_size().len();

        {
            let (index_bufs, meta_bufs) = buffers.split_at_mut(index_segments.min(sizes.len()));
            let mut writers: Vec<&mut dyn Write> =
                index_bufs.iter_mut().map(|b| b as &mut dyn Write).collect();
            self.algo.save_index_data_to(&mut writers)?;

            let state = self.read_meta()?;
            if let (Some(metadata), [data, offsets]) = (&state.metadata, meta_bufs) {
                metadata.write_to(data, offsets)?;
            }
        }

        let mut config = Vec::new();
        self.save_index_config(&mut config)?;
        BlobLayout::new(index_segments, buffers.len() > index_segments).write(&mut config)?;
        let config = String::from_utf8(config)
            .map_err(|e| AnnError::fail(format!("Config is not valid UTF-8: {}", e)))?;

        debug!(blobs = buffers.len(), "Serialized vector index to memory");
        Ok(IndexBlobs {
            config,
            blobs: buffers.into_iter().map(ByteArray::Owned).collect(),
        })
    }

    /// Loads an index from a config string and blobs produced by
    /// [`save_index_blobs`](Self::save_index_blobs).
    ///
    /// `View` blobs are borrowed by the loaded metadata without copying.
    ///
    /// # Errors
    /// `FailedParseValue` for unknown type tags, a `[BlobLayout]` that does
    /// not match the blobs, or corrupt segments; `Fail` if the metadata
    /// blobs cannot be decoded.
    #[instrument(skip_all, fields(blobs = blobs.len()))]
    pub fn load_index_from_blobs(config: &str, blobs: &[ByteArray]) -> Result<VectorIndex> {
        let reader = IniReader::parse(config)?;
        let index = Self::from_config(&reader)?;
        let has_metadata = reader.does_section_exist(METADATA_SECTION);
        let layout = BlobLayout::resolve(&reader, blobs.len(), has_metadata)?;
        index
            .algo
            .load_index_data_from_memory(&blobs[..layout.index_segments])?;

        if let Some(slots) = layout.metadata_slots() {
            let (data, offsets) = (&blobs[slots.start], &blobs[slots.start + 1]);
            let metadata =
                MetadataSet::from_blobs(data.to_bytes(), offsets.to_bytes()).map_err(|e| {
                    error!(error = %e, "Failed to load metadata");
                    AnnError::fail(format!("Failed to load metadata: {}", e))
                })?;
            index.install_metadata(metadata)?;
        }
        index.load_meta_mapping(&reader)?;
        Ok(index)
    }

    /// Creates an empty index of the type named by `[Index]` and applies
    /// the config to it.
    fn from_config(reader: &IniReader) -> Result<VectorIndex> {
        let algo: IndexAlgoType = reader.require(INDEX_SECTION, "IndexAlgoType")?;
        let value: VectorValueType = reader.require(INDEX_SECTION, "ValueType")?;
        let index = Self::create_instance(algo, value)?;
        index.load_index_config(reader)?;
        Ok(index)
    }

    fn install_metadata(&self, metadata: MetadataSet) -> Result<()> {
        if metadata.count() != self.num_samples() {
            error!(
                entries = metadata.count(),
                samples = self.num_samples(),
                "Metadata does not match the index"
            );
            return Err(AnnError::fail(format!(
                "Metadata holds {} entries for {} vectors",
                metadata.count(),
                self.num_samples()
            )));
        }
        self.write_meta()?.metadata = Some(metadata);
        Ok(())
    }

    fn load_meta_mapping(&self, reader: &IniReader) -> Result<()> {
        let flagged = reader
            .get_raw(METADATA_SECTION, "MetaDataToVectorIndex")
            .is_some_and(|v| v.eq_ignore_ascii_case("true"));
        if flagged && self.has_metadata() {
            self.build_meta_mapping()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector_set::VectorSet;

    fn index_with(n: usize) -> VectorIndex {
        let index = VectorIndex::create_instance(IndexAlgoType::KDT, VectorValueType::Int16).unwrap();
        let rows: Vec<Vec<i16>> = (0..n as i16).map(|i| vec![i, 2 * i, -i]).collect();
        let meta = MetadataSet::from_entries((0..n).map(|i| format!("m{}", i)));
        index
            .build_index(&VectorSet::from_rows(&rows).unwrap(), Some(meta), true)
            .unwrap();
        index
    }

    #[test]
    fn test_blob_sizes_match_capacity() {
        let index = index_with(12);
        let sizes = index.calculate_buffer_size();
        let saved = index.save_index_blobs().unwrap();
        assert_eq!(saved.blobs.len(), sizes.len());
        for (blob, size) in saved.blobs.iter().zip(&sizes) {
            assert_eq!(blob.len() as u64, *size);
        }
        assert!(saved.config.contains("[BlobLayout]"));
    }

    #[test]
    fn test_blob_roundtrip_with_views() {
        let index = index_with(12);
        let saved = index.save_index_blobs().unwrap();
        let views: Vec<ByteArray> = saved
            .blobs
            .iter()
            .map(|b| ByteArray::view(b.to_bytes()))
            .collect();
        let loaded = VectorIndex::load_index_from_blobs(&saved.config, &views).unwrap();
        assert_eq!(loaded.num_samples(), 12);
        assert_eq!(loaded.get_metadata(7).as_slice(), b"m7");
        assert!(loaded.get_metadata(7).is_view());
        assert!(loaded.has_meta_mapping());
    }

    #[test]
    fn test_refine_on_save_renumbers() {
        let index = index_with(10);
        for id in 0..6 {
            index.delete_index(id).unwrap();
        }
        let saved = index.save_index_blobs().unwrap();
        let loaded = VectorIndex::load_index_from_blobs(&saved.config, &saved.blobs).unwrap();
        assert_eq!(loaded.num_samples(), 4);
        assert_eq!(loaded.num_deleted(), 0);
        assert_eq!(loaded.get_metadata(0).as_slice(), b"m6");
        assert_eq!(loaded.get_sample(0), index.get_sample(6));
    }

    #[test]
    fn test_metadata_count_mismatch_fails() {
        let index = index_with(4);
        let mut saved = index.save_index_blobs().unwrap();
        let short = MetadataSet::from_entries(["a", "b"]);
        let (data, offsets) = short.to_blobs().unwrap();
        let n = saved.blobs.len();
        saved.blobs[n - 2] = ByteArray::from(data);
        saved.blobs[n - 1] = ByteArray::from(offsets);
        let err = VectorIndex::load_index_from_blobs(&saved.config, &saved.blobs).unwrap_err();
        assert_eq!(err.code(), crate::ErrorCode::Fail);
    }
}
