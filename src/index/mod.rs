//! The vector index orchestrator.
//!
//! [`VectorIndex`] owns one algorithm variant plus the metadata attached to
//! its ids, and composes the variant's primitives into the full lifecycle:
//! build, add, delete, merge, search, save and load.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                 VectorIndex                   │
//! │  ┌────────────────────┐  ┌─────────────────┐  │
//! │  │ Box<dyn Index-     │  │ RwLock<Meta-    │  │
//! │  │   Algorithm>       │  │   State>        │  │
//! │  │ vectors, trees,    │  │ MetadataSet     │  │
//! │  │ graph, deletes     │  │ ReverseMap      │  │
//! │  └────────────────────┘  └─────────────────┘  │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! Ids are assigned by the variant. Every mutation that creates ids holds
//! the metadata write lock across the variant call, so the metadata entry
//! for id `i` is always the `i`-th entry even under concurrent adds.

mod layout;
mod persist;

pub use layout::{BlobLayout, BLOB_LAYOUT_VERSION};
pub use persist::IndexBlobs;

use std::io::Write;
use std::ops::Range;
use std::path::Path;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use rayon::prelude::*;
use tracing::{error, info, instrument, warn};

use crate::algo::{create_algorithm, IndexAlgorithm};
use crate::byte_array::ByteArray;
use crate::config::{
    end_section, write_param, write_section, IniReader, DEFAULT_METADATA_FILE,
    DEFAULT_METADATA_INDEX_FILE, INDEX_SECTION, METADATA_SECTION,
};
use crate::error::{AnnError, Result};
use crate::metadata::{MetadataSet, ReverseMap};
use crate::query::BasicResult;
use crate::types::{
    encode_row, DistCalcMethod, IndexAlgoType, VecId, VectorValue, VectorValueType,
};
use crate::vector_set::{StridedView, VectorSet};

/// Queries per work unit in batch search.
const SEARCH_CHUNK: usize = 10;

/// Source ids per work unit in merge.
const MERGE_CHUNK: usize = 128;

/// Metadata attached to the variant's ids.
struct MetaState {
    metadata: Option<MetadataSet>,
    reverse: Option<ReverseMap>,
    metadata_file: String,
    metadata_index_file: String,
}

impl Default for MetaState {
    fn default() -> Self {
        Self {
            metadata: None,
            reverse: None,
            metadata_file: DEFAULT_METADATA_FILE.to_string(),
            metadata_index_file: DEFAULT_METADATA_INDEX_FILE.to_string(),
        }
    }
}

/// An ANN index with per-id metadata.
///
/// `VectorIndex` is `Send + Sync`; every method takes `&self`, so one
/// instance can be searched, extended and merged into from many threads
/// through an `Arc`.
pub struct VectorIndex {
    algo: Box<dyn IndexAlgorithm>,
    meta: RwLock<MetaState>,
}

impl std::fmt::Debug for VectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorIndex")
            .field("algo", &self.index_algo_type())
            .field("value_type", &self.vector_value_type())
            .field("num_samples", &self.num_samples())
            .field("num_deleted", &self.num_deleted())
            .finish()
    }
}

impl VectorIndex {
    /// Creates an empty index for `(algo, value)`.
    ///
    /// # Errors
    /// Returns `FailedParseValue` if either tag is `Undefined`.
    pub fn create_instance(algo: IndexAlgoType, value: VectorValueType) -> Result<Self> {
        Ok(Self::from_algorithm(create_algorithm(algo, value)?))
    }

    fn from_algorithm(algo: Box<dyn IndexAlgorithm>) -> Self {
        Self {
            algo,
            meta: RwLock::new(MetaState::default()),
        }
    }

    fn read_meta(&self) -> Result<RwLockReadGuard<'_, MetaState>> {
        self.meta
            .read()
            .map_err(|_| AnnError::fail("Metadata lock poisoned"))
    }

    fn write_meta(&self) -> Result<RwLockWriteGuard<'_, MetaState>> {
        self.meta
            .write()
            .map_err(|_| AnnError::fail("Metadata lock poisoned"))
    }

    fn check_value_type(&self, value_type: VectorValueType) -> Result<()> {
        if value_type != self.vector_value_type() {
            return Err(AnnError::fail(format!(
                "Vector type {} does not match index type {}",
                value_type,
                self.vector_value_type()
            )));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Parameters and config
    // ------------------------------------------------------------------

    /// Returns a variant tunable by config key (case-insensitive).
    pub fn get_parameter(&self, name: &str) -> Result<String> {
        self.algo.get_parameter(name)
    }

    /// Sets a variant tunable by config key (case-insensitive).
    ///
    /// # Errors
    /// `Fail` for a key the variant does not know, `FailedParseValue` for a
    /// value that does not parse.
    pub fn set_parameter(&self, name: &str, value: &str) -> Result<()> {
        self.algo.set_parameter(name, value)
    }

    /// Applies a parsed `indexloader.ini`.
    ///
    /// # Errors
    /// Returns `Fail` if `[Index] DistCalcMethod` is missing or undefined.
    pub fn load_index_config(&self, reader: &IniReader) -> Result<()> {
        if reader.does_section_exist(METADATA_SECTION) {
            let mut state = self.write_meta()?;
            state.metadata_file =
                reader.get_parameter(METADATA_SECTION, "MetaDataFilePath", state.metadata_file.clone());
            state.metadata_index_file = reader.get_parameter(
                METADATA_SECTION,
                "MetaDataIndexPath",
                state.metadata_index_file.clone(),
            );
        }

        let method =
            reader.get_parameter(INDEX_SECTION, "DistCalcMethod", DistCalcMethod::Undefined);
        if method == DistCalcMethod::Undefined {
            error!("DistCalcMethod is not defined in the index config");
            return Err(AnnError::fail("DistCalcMethod is not defined"));
        }
        self.algo.load_config(reader)
    }

    /// Writes this index's `indexloader.ini` content.
    pub fn save_index_config(&self, out: &mut dyn Write) -> Result<()> {
        {
            let state = self.read_meta()?;
            if state.metadata.is_some() {
                write_section(out, METADATA_SECTION)?;
                write_param(out, "MetaDataFilePath", &state.metadata_file)?;
                write_param(out, "MetaDataIndexPath", &state.metadata_index_file)?;
                if state.reverse.is_some() {
                    write_param(out, "MetaDataToVectorIndex", "true")?;
                }
                end_section(out)?;
            }
        }

        write_section(out, INDEX_SECTION)?;
        write_param(out, "IndexAlgoType", self.index_algo_type())?;
        write_param(out, "ValueType", self.vector_value_type())?;
        self.algo.save_config(out)?;
        end_section(out)
    }

    // ------------------------------------------------------------------
    // Build and mutation
    // ------------------------------------------------------------------

    /// Builds the index from `vectors`, replacing any previous content.
    ///
    /// `metadata`, when given, must hold one entry per vector. With
    /// `with_meta_index` a reverse map is built over the metadata.
    ///
    /// # Errors
    /// Returns `Fail` on an element type or metadata count mismatch.
    #[instrument(skip_all, fields(count = vectors.count(), dim = vectors.dimension()))]
    pub fn build_index(
        &self,
        vectors: &VectorSet,
        metadata: Option<MetadataSet>,
        with_meta_index: bool,
    ) -> Result<()> {
        self.check_value_type(vectors.value_type())?;
        if let Some(meta) = &metadata {
            if meta.count() != vectors.count() {
                return Err(AnnError::fail(format!(
                    "Metadata holds {} entries for {} vectors",
                    meta.count(),
                    vectors.count()
                )));
            }
        }

        let mut state = self.write_meta()?;
        self.algo.build_index(vectors.view())?;
        state.reverse = match (&metadata, with_meta_index) {
            (Some(meta), true) => Some(ReverseMap::build(meta, |id| self.algo.contain_sample(id))),
            _ => None,
        };
        state.metadata = metadata;
        info!(samples = self.num_samples(), "Built vector index");
        Ok(())
    }

    /// Appends `vectors` and returns the ids they were assigned.
    ///
    /// When the index carries metadata, vectors added without metadata get
    /// empty entries. With `with_meta_index` the new entries are added to
    /// the reverse map (building it if absent); otherwise an existing map
    /// is marked stale.
    ///
    /// # Errors
    /// Returns `Fail` on an element type, dimension, or metadata count
    /// mismatch.
    pub fn add_index(
        &self,
        vectors: &VectorSet,
        metadata: Option<&MetadataSet>,
        with_meta_index: bool,
    ) -> Result<Range<VecId>> {
        self.check_value_type(vectors.value_type())?;
        if let Some(meta) = metadata {
            if meta.count() != vectors.count() {
                return Err(AnnError::fail(format!(
                    "Metadata holds {} entries for {} vectors",
                    meta.count(),
                    vectors.count()
                )));
            }
        }

        let mut state = self.write_meta()?;
        let ids = self.algo.add_index(vectors.view())?;

        if metadata.is_some() && state.metadata.is_none() {
            state.metadata = Some(MetadataSet::new());
        }
        if let Some(stored) = state.metadata.as_mut() {
            while stored.count() < ids.start {
                stored.push(&[]);
            }
            match metadata {
                Some(meta) => stored.append(meta),
                None => (0..ids.len()).for_each(|_| stored.push(&[])),
            }
        }

        match (metadata, with_meta_index) {
            (Some(meta), true) => {
                let MetaState {
                    metadata: stored,
                    reverse,
                    ..
                } = &mut *state;
                match reverse {
                    Some(map) => {
                        for (i, id) in ids.clone().enumerate() {
                            meta.with_entry(i, |bytes| map.insert(bytes, id));
                        }
                    }
                    None => {
                        if let Some(stored) = stored {
                            *reverse =
                                Some(ReverseMap::build(stored, |id| self.algo.contain_sample(id)));
                        }
                    }
                }
            }
            _ => {
                if let Some(map) = state.reverse.as_mut() {
                    map.mark_stale();
                }
            }
        }
        Ok(ids)
    }

    /// Soft-deletes `id`. An existing reverse map is marked stale.
    ///
    /// # Errors
    /// Returns `VectorNotFound` if `id` is out of range or already deleted.
    pub fn delete_index(&self, id: VecId) -> Result<()> {
        self.algo.delete_index(id)?;
        if let Some(map) = self.write_meta()?.reverse.as_mut() {
            map.mark_stale();
        }
        Ok(())
    }

    /// Soft-deletes the id whose metadata equals `meta`.
    ///
    /// # Errors
    /// Returns `VectorNotFound` if there is no reverse map or no entry for
    /// `meta`.
    pub fn delete_index_by_metadata(&self, meta: &[u8]) -> Result<()> {
        let id = {
            let state = self.read_meta()?;
            let map = state
                .reverse
                .as_ref()
                .ok_or_else(|| AnnError::not_found("No metadata mapping"))?;
            map.get(meta)
                .ok_or_else(|| AnnError::not_found("Metadata not found"))?
        };
        self.delete_index(id)
    }

    /// Adds every live vector of `other`, with its metadata, using
    /// `thread_count` workers. `other` is only read.
    ///
    /// An existing reverse map is rebuilt afterwards.
    ///
    /// # Errors
    /// Returns `Fail` on an element type mismatch, when merging an index
    /// into itself, or if the worker pool cannot be created.
    #[instrument(skip_all, fields(source = other.num_samples(), threads = thread_count))]
    pub fn merge_index(&self, other: &VectorIndex, thread_count: usize) -> Result<()> {
        if std::ptr::eq(self, other) {
            return Err(AnnError::fail("Cannot merge an index into itself"));
        }
        self.check_value_type(other.vector_value_type())?;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(thread_count.max(1))
            .build()
            .map_err(|e| AnnError::fail(format!("Failed to create merge pool: {}", e)))?;

        let value_type = other.vector_value_type();
        let dim = other.feature_dim();
        let with_metadata = other.has_metadata();

        pool.install(|| {
            (0..other.num_samples())
                .into_par_iter()
                .with_max_len(MERGE_CHUNK)
                .try_for_each(|id| -> Result<()> {
                    if !other.contain_sample(id) {
                        return Ok(());
                    }
                    let Some(sample) = other.get_sample(id) else {
                        return Ok(());
                    };
                    let vectors = VectorSet::new(sample, value_type, dim, 1)?;
                    let meta = with_metadata.then(|| MetadataSet::single(other.get_metadata(id)));
                    self.add_index(&vectors, meta.as_ref(), false)?;
                    Ok(())
                })
        })?;

        if self.has_meta_mapping() {
            self.rebuild_meta_mapping()?;
        }
        info!(samples = self.num_samples(), "Merged vector index");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Search
    // ------------------------------------------------------------------

    fn fill_slots(&self, hits: &[(VecId, f32)], with_meta: bool, slots: &mut [BasicResult]) -> Result<()> {
        let state = if with_meta { Some(self.read_meta()?) } else { None };
        for (slot, i) in slots.iter_mut().zip(0..) {
            *slot = match hits.get(i) {
                Some(&(vid, dist)) => {
                    let mut hit = BasicResult::hit(vid, dist);
                    if let Some(metadata) = state.as_ref().and_then(|s| s.metadata.as_ref()) {
                        hit.meta = metadata.get(vid).unwrap_or_default();
                    }
                    hit
                }
                None => BasicResult::default(),
            };
        }
        Ok(())
    }

    /// Searches for the `k` nearest live vectors to the encoded `query`.
    ///
    /// Always returns `k` slots, nearest first; unused slots are empty.
    pub fn search_index(&self, query: &[u8], k: usize, with_meta: bool) -> Result<Vec<BasicResult>> {
        let hits = self.algo.search_index(query, k)?;
        let mut slots = vec![BasicResult::default(); k];
        self.fill_slots(&hits, with_meta, &mut slots)?;
        Ok(slots)
    }

    /// Typed convenience over [`search_index`](Self::search_index).
    /// Metadata is filled when the index carries it.
    pub fn search<T: VectorValue>(&self, query: &[T], k: usize) -> Result<Vec<BasicResult>> {
        self.check_value_type(T::VALUE_TYPE)?;
        self.search_index(&encode_row(query), k, self.has_metadata())
    }

    /// Runs `query_count` queries stored back to back in `queries`.
    ///
    /// Query `i` writes `results[i * k..(i + 1) * k]`. Queries run in
    /// parallel on the global rayon pool.
    ///
    /// # Errors
    /// Returns `Fail` if `queries` does not hold exactly `query_count`
    /// vectors of this index's shape or `results` is not `query_count * k`
    /// long.
    pub fn search_index_batch(
        &self,
        queries: &[u8],
        query_count: usize,
        k: usize,
        with_meta: bool,
        results: &mut [BasicResult],
    ) -> Result<()> {
        let slots = query_count.checked_mul(k).ok_or_else(|| {
            AnnError::fail(format!("{} queries x {} results overflows", query_count, k))
        })?;
        if results.len() != slots {
            return Err(AnnError::fail(format!(
                "Result buffer holds {} slots, expected {}",
                results.len(),
                slots
            )));
        }
        if k == 0 {
            return Ok(());
        }
        if self.num_samples() == 0 {
            results.fill(BasicResult::default());
            return Ok(());
        }

        let view = StridedView::new(queries, self.vector_value_type(), self.feature_dim(), query_count)?;
        results
            .par_chunks_mut(k)
            .with_max_len(SEARCH_CHUNK)
            .enumerate()
            .try_for_each(|(i, slots)| {
                let query = view
                    .get(i)
                    .ok_or_else(|| AnnError::fail(format!("Query {} out of range", i)))?;
                let hits = self.algo.search_index(query, k)?;
                self.fill_slots(&hits, with_meta, slots)
            })
    }

    // ------------------------------------------------------------------
    // Metadata
    // ------------------------------------------------------------------

    /// Returns true if the index carries metadata.
    pub fn has_metadata(&self) -> bool {
        self.meta.read().is_ok_and(|s| s.metadata.is_some())
    }

    /// Metadata of `id`; `Empty` without metadata or out of range.
    pub fn get_metadata(&self, id: VecId) -> ByteArray {
        self.meta
            .read()
            .ok()
            .and_then(|s| s.metadata.as_ref().and_then(|m| m.get(id)))
            .unwrap_or_default()
    }

    /// Looks up a vector by its metadata. Returns the encoded vector and
    /// whether it is deleted.
    pub fn get_sample_by_metadata(&self, meta: &[u8]) -> Option<(ByteArray, bool)> {
        let id = self.meta.read().ok()?.reverse.as_ref()?.get(meta)?;
        let sample = self.algo.get_sample(id)?;
        Some((sample, !self.algo.contain_sample(id)))
    }

    /// Loads metadata from files and attaches it to the index.
    ///
    /// # Errors
    /// Returns `FailedOpenFile` if a file cannot be read, or `Fail` if the
    /// entry count differs from `num_samples()`.
    pub fn set_metadata_files(
        &self,
        data_path: impl AsRef<Path>,
        index_path: impl AsRef<Path>,
    ) -> Result<()> {
        let metadata = MetadataSet::load_files(data_path, index_path)?;
        self.attach_metadata(metadata)
    }

    fn attach_metadata(&self, metadata: MetadataSet) -> Result<()> {
        if metadata.count() != self.num_samples() {
            return Err(AnnError::fail(format!(
                "Metadata holds {} entries for {} vectors",
                metadata.count(),
                self.num_samples()
            )));
        }
        let mut state = self.write_meta()?;
        if state.reverse.is_some() {
            state.reverse = Some(ReverseMap::build(&metadata, |id| self.algo.contain_sample(id)));
        }
        state.metadata = Some(metadata);
        Ok(())
    }

    /// Builds the reverse map over all live ids.
    ///
    /// # Errors
    /// Returns `Fail` if the index has no metadata.
    pub fn build_meta_mapping(&self) -> Result<()> {
        let mut state = self.write_meta()?;
        let metadata = state
            .metadata
            .as_ref()
            .ok_or_else(|| AnnError::fail("Index has no metadata"))?;
        let map = ReverseMap::build(metadata, |id| self.algo.contain_sample(id));
        state.reverse = Some(map);
        Ok(())
    }

    /// Rebuilds an existing reverse map, dropping deleted ids. Does nothing
    /// if there is no map.
    pub fn rebuild_meta_mapping(&self) -> Result<()> {
        if !self.has_meta_mapping() {
            return Ok(());
        }
        self.build_meta_mapping()
    }

    /// Returns true if a reverse map exists.
    pub fn has_meta_mapping(&self) -> bool {
        self.meta.read().is_ok_and(|s| s.reverse.is_some())
    }

    /// Returns true if the reverse map exists and is out of date.
    pub fn is_meta_mapping_stale(&self) -> bool {
        self.meta
            .read()
            .is_ok_and(|s| s.reverse.as_ref().is_some_and(ReverseMap::is_stale))
    }

    // ------------------------------------------------------------------
    // Forwarders
    // ------------------------------------------------------------------

    /// Encoded vector of `id`, deleted or not.
    pub fn get_sample(&self, id: VecId) -> Option<ByteArray> {
        self.algo.get_sample(id)
    }

    /// True if `id` is populated and not deleted.
    pub fn contain_sample(&self, id: VecId) -> bool {
        self.algo.contain_sample(id)
    }

    /// Populated ids, deleted ones included.
    pub fn num_samples(&self) -> usize {
        self.algo.num_samples()
    }

    /// Soft-deleted ids.
    pub fn num_deleted(&self) -> usize {
        self.algo.num_deleted()
    }

    /// Elements per vector.
    pub fn feature_dim(&self) -> usize {
        self.algo.feature_dim()
    }

    /// Element type of stored vectors.
    pub fn vector_value_type(&self) -> VectorValueType {
        self.algo.vector_value_type()
    }

    /// Partition algorithm.
    pub fn index_algo_type(&self) -> IndexAlgoType {
        self.algo.index_algo_type()
    }

    /// Serialized sizes of every blob a save would produce: the variant
    /// segments, then the metadata blob and offset index if present.
    pub fn calculate_buffer_size(&self) -> Vec<u64> {
        let mut sizes = self.algo.buffer_size();
        match self.meta.read() {
            Ok(state) => {
                if let Some(metadata) = &state.metadata {
                    let (data, index) = metadata.buffer_size();
                    sizes.push(data);
                    sizes.push(index);
                }
            }
            Err(_) => warn!("Metadata lock poisoned while sizing buffers"),
        }
        sizes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_embedding(seed: u64, dim: usize) -> Vec<f32> {
        (0..dim)
            .map(|i| ((seed as f32 * 0.37) + (i as f32 * 1.13)).sin())
            .collect()
    }

    fn make_set(range: Range<u64>, dim: usize) -> VectorSet {
        let rows: Vec<Vec<f32>> = range.map(|i| make_embedding(i, dim)).collect();
        VectorSet::from_rows(&rows).unwrap()
    }

    fn make_meta(range: Range<u64>) -> MetadataSet {
        MetadataSet::from_entries(range.map(|i| format!("id-{}", i)))
    }

    fn built(n: u64) -> VectorIndex {
        let index = VectorIndex::create_instance(IndexAlgoType::BKT, VectorValueType::Float).unwrap();
        index
            .build_index(&make_set(0..n, 8), Some(make_meta(0..n)), true)
            .unwrap();
        index
    }

    #[test]
    fn test_build_rejects_mismatches() {
        let index = VectorIndex::create_instance(IndexAlgoType::KDT, VectorValueType::Int8).unwrap();
        assert!(index.build_index(&make_set(0..4, 2), None, false).is_err());

        let index = VectorIndex::create_instance(IndexAlgoType::KDT, VectorValueType::Float).unwrap();
        let err = index
            .build_index(&make_set(0..4, 2), Some(make_meta(0..3)), false)
            .unwrap_err();
        assert_eq!(err.code(), crate::ErrorCode::Fail);
    }

    #[test]
    fn test_add_appends_metadata_in_order() {
        let index = built(10);
        let ids = index
            .add_index(&make_set(10..13, 8), Some(&make_meta(10..13)), true)
            .unwrap();
        assert_eq!(ids, 10..13);
        assert_eq!(index.get_metadata(12).as_slice(), b"id-12");
        assert_eq!(index.get_sample_by_metadata(b"id-11").map(|(_, d)| d), Some(false));
        assert!(!index.is_meta_mapping_stale());
    }

    #[test]
    fn test_add_without_metadata_pads_and_marks_stale() {
        let index = built(5);
        index.add_index(&make_set(5..7, 8), None, false).unwrap();
        assert_eq!(index.num_samples(), 7);
        assert!(index.get_metadata(6).is_empty());
        assert!(index.is_meta_mapping_stale());
        index.rebuild_meta_mapping().unwrap();
        assert!(!index.is_meta_mapping_stale());
    }

    #[test]
    fn test_delete_by_metadata() {
        let index = built(20);
        index.delete_index_by_metadata(b"id-4").unwrap();
        assert!(!index.contain_sample(4));
        assert!(index.is_meta_mapping_stale());
        assert!(index.delete_index_by_metadata(b"id-4").unwrap_err().is_not_found());
        assert!(index.delete_index_by_metadata(b"id-999").unwrap_err().is_not_found());
        assert_eq!(index.get_sample_by_metadata(b"id-4").map(|(_, d)| d), Some(true));

        index.rebuild_meta_mapping().unwrap();
        assert!(index.get_sample_by_metadata(b"id-4").is_none());
    }

    #[test]
    fn test_delete_by_metadata_without_mapping() {
        let index = VectorIndex::create_instance(IndexAlgoType::BKT, VectorValueType::Float).unwrap();
        index.build_index(&make_set(0..3, 8), Some(make_meta(0..3)), false).unwrap();
        assert!(index.delete_index_by_metadata(b"id-1").unwrap_err().is_not_found());
        index.build_meta_mapping().unwrap();
        index.delete_index_by_metadata(b"id-1").unwrap();
    }

    #[test]
    fn test_search_fills_exactly_k_slots() {
        let index = built(3);
        let results = index.search(&make_embedding(1, 8), 5).unwrap();
        assert_eq!(results.len(), 5);
        assert_eq!(results[0].vid, Some(1));
        assert_eq!(results[0].meta.as_slice(), b"id-1");
        assert!(results[3].is_empty());
        assert_eq!(results[4].dist, f32::MAX);
    }

    #[test]
    fn test_search_rejects_wrong_type() {
        let index = built(3);
        assert!(index.search(&[1u8; 8], 1).is_err());
    }

    #[test]
    fn test_batch_rejects_bad_buffers() {
        let index = built(4);
        let mut results = vec![BasicResult::default(); 3];
        let queries = encode_row(&make_embedding(0, 8));
        assert!(index
            .search_index_batch(&queries, 1, 2, false, &mut results)
            .is_err());
        let mut results = vec![BasicResult::default(); 4];
        assert!(index
            .search_index_batch(&queries, 2, 2, false, &mut results)
            .is_err());
    }

    #[test]
    fn test_batch_rejects_overflowing_sizes() {
        let index = built(4);
        let queries = encode_row(&make_embedding(0, 8));
        let mut results = vec![BasicResult::default(); 2];
        let err = index
            .search_index_batch(&queries, usize::MAX, 2, false, &mut results)
            .unwrap_err();
        assert_eq!(err.code(), crate::ErrorCode::Fail);
    }

    #[test]
    fn test_config_lists_metadata_and_index_sections() {
        let index = built(3);
        let mut out = Vec::new();
        index.save_index_config(&mut out).unwrap();
        let reader = IniReader::parse(std::str::from_utf8(&out).unwrap()).unwrap();
        assert_eq!(reader.get_raw("MetaData", "MetaDataToVectorIndex"), Some("true"));
        assert_eq!(reader.get_raw("Index", "IndexAlgoType"), Some("BKT"));
        assert_eq!(reader.get_raw("Index", "ValueType"), Some("Float"));
        assert_eq!(reader.get_raw("Index", "BKTKmeansK"), Some("32"));
    }

    #[test]
    fn test_config_requires_distance_method() {
        let index = VectorIndex::create_instance(IndexAlgoType::KDT, VectorValueType::Float).unwrap();
        let reader = IniReader::parse("[Index]\nIndexAlgoType=KDT\n").unwrap();
        assert_eq!(index.load_index_config(&reader).unwrap_err().code(), crate::ErrorCode::Fail);

        let reader = IniReader::parse("[Index]\nDistCalcMethod=Cosine\nTreeNumber=2\n").unwrap();
        index.load_index_config(&reader).unwrap();
        assert_eq!(index.get_parameter("TreeNumber").unwrap(), "2");
    }

    #[test]
    fn test_merge_into_self_rejected() {
        let index = built(3);
        assert!(index.merge_index(&index, 2).is_err());
    }

    #[test]
    fn test_buffer_sizes_include_metadata() {
        let index = built(3);
        assert_eq!(index.calculate_buffer_size().len(), 6);
        let bare = VectorIndex::create_instance(IndexAlgoType::KDT, VectorValueType::Float).unwrap();
        assert_eq!(bare.calculate_buffer_size().len(), 4);
    }
}
