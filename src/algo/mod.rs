//! Index algorithm variants.
//!
//! The orchestrator in [`crate::index`] only talks to [`IndexAlgorithm`].
//! Concrete variants are one type per (partition × element type), chosen
//! by [`create_algorithm`]:
//!
//! ```text
//! ┌────────────────────────────────────┐
//! │      IndexAlgorithm (dyn trait)     │
//! └──────────────┬─────────────────────┘
//!                │
//!     ┌──────────┴──────────┐
//!     │  TreeIndex<T, F>    │  T ∈ {i8, u8, i16, f32}
//!     └──────────┬──────────┘
//!        ┌───────┴───────┐
//!    BktForest       KdtForest
//! ```

mod bkt;
mod distance;
mod graph;
mod kdt;
mod params;
mod samples;
mod tree_index;

pub use bkt::BktForest;
pub use distance::distance;
pub use kdt::KdtForest;
pub use params::TreeParams;
pub use samples::{Candidate, Samples};
pub use tree_index::{BktIndex, KdtIndex, Partitioner, TreeIndex, SEGMENT_FILES};

use std::io::Write;
use std::ops::Range;
use std::path::Path;

use crate::byte_array::ByteArray;
use crate::config::IniReader;
use crate::error::{AnnError, Result};
use crate::types::{IndexAlgoType, VecId, VectorValueType};
use crate::vector_set::StridedView;

/// Contract between the orchestrator and an algorithm variant.
///
/// All methods take `&self` and use interior mutability, so searches can
/// run concurrently while mutations serialize inside the variant.
pub trait IndexAlgorithm: Send + Sync {
    /// Replaces the index content with `vectors`.
    fn build_index(&self, vectors: StridedView<'_>) -> Result<()>;

    /// Appends `vectors` and returns the ids assigned to them. An empty
    /// index adopts the dimension of the batch.
    fn add_index(&self, vectors: StridedView<'_>) -> Result<Range<VecId>>;

    /// Soft-deletes `id`.
    ///
    /// # Errors
    /// `VectorNotFound` if `id` is out of range or already deleted.
    fn delete_index(&self, id: VecId) -> Result<()>;

    /// Up to `k` live `(id, distance)` pairs nearest to the encoded
    /// `query`, nearest first.
    fn search_index(&self, query: &[u8], k: usize) -> Result<Vec<(VecId, f32)>>;

    /// Encoded vector of `id`, deleted or not.
    fn get_sample(&self, id: VecId) -> Option<ByteArray>;

    /// True if `id` is populated and not deleted.
    fn contain_sample(&self, id: VecId) -> bool;

    /// Populated ids, including deleted ones.
    fn num_samples(&self) -> usize;

    /// Soft-deleted ids.
    fn num_deleted(&self) -> usize;

    /// Elements per vector; 0 before the first build.
    fn feature_dim(&self) -> usize;

    /// Element type of stored vectors.
    fn vector_value_type(&self) -> VectorValueType;

    /// Partition algorithm of this variant.
    fn index_algo_type(&self) -> IndexAlgoType;

    /// True if enough ids are deleted that a save should compact.
    fn need_refine(&self) -> bool;

    /// Builds a compacted copy holding only live ids. The returned ids are
    /// the old ids in their new order.
    fn refine(&self) -> Result<(Box<dyn IndexAlgorithm>, Vec<VecId>)>;

    /// Serialized size of each data segment, in blob order.
    fn buffer_size(&self) -> Vec<u64>;

    /// Returns a tunable by config key.
    fn get_parameter(&self, name: &str) -> Result<String>;

    /// Sets a tunable by config key.
    fn set_parameter(&self, name: &str, value: &str) -> Result<()>;

    /// Applies the variant keys found in the `[Index]` section.
    fn load_config(&self, reader: &IniReader) -> Result<()>;

    /// Writes the variant keys as `Key=Value` lines.
    fn save_config(&self, out: &mut dyn Write) -> Result<()>;

    /// Reads the data segments from files in `folder`.
    fn load_index_data(&self, folder: &Path) -> Result<()>;

    /// Reads the data segments from the leading `blobs`.
    fn load_index_data_from_memory(&self, blobs: &[ByteArray]) -> Result<()>;

    /// Writes the data segments as files in `folder`.
    fn save_index_data(&self, folder: &Path) -> Result<()>;

    /// Writes one segment per writer.
    fn save_index_data_to(&self, writers: &mut [&mut dyn Write]) -> Result<()>;
}

/// Creates an empty variant for `(algo, value)`.
///
/// # Errors
/// Returns `FailedParseValue` if either tag is `Undefined`.
pub fn create_algorithm(
    algo: IndexAlgoType,
    value: VectorValueType,
) -> Result<Box<dyn IndexAlgorithm>> {
    macro_rules! with_value {
        ($index:ident) => {
            match value {
                VectorValueType::Int8 => Box::new($index::<i8>::new()) as Box<dyn IndexAlgorithm>,
                VectorValueType::UInt8 => Box::new($index::<u8>::new()),
                VectorValueType::Int16 => Box::new($index::<i16>::new()),
                VectorValueType::Float => Box::new($index::<f32>::new()),
                VectorValueType::Undefined => {
                    return Err(AnnError::parse("Vector value type is undefined"))
                }
            }
        };
    }

    let index = match algo {
        IndexAlgoType::BKT => with_value!(BktIndex),
        IndexAlgoType::KDT => with_value!(KdtIndex),
        IndexAlgoType::Undefined => {
            return Err(AnnError::parse("Index algorithm type is undefined"))
        }
    };
    Ok(index)
}
