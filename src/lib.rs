//! # pulse-ann
//!
//! In-memory approximate nearest neighbor index with per-vector metadata.
//!
//! A [`VectorIndex`] pairs an algorithm variant (balanced k-means trees or
//! KD-trees feeding a neighborhood graph) with opaque metadata for every
//! vector, and manages the whole lifecycle: build, incremental add, soft
//! delete, batched search, merge, and persistence to a folder or to
//! in-memory blobs.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use pulseann::prelude::*;
//!
//! let index = VectorIndex::create_instance(IndexAlgoType::BKT, VectorValueType::Float)?;
//! let vectors = VectorSet::from_rows(&embeddings)?;
//! let metadata = MetadataSet::from_entries(ids.iter().map(|id| id.as_bytes()));
//! index.build_index(&vectors, Some(metadata), true)?;
//!
//! let hits = index.search(&query, 10)?;
//! index.delete_index_by_metadata(b"doc-42")?;
//! index.save_index("./my-index")?;
//!
//! let reopened = VectorIndex::load_index("./my-index")?;
//! ```
//!
//! ## Key Concepts
//!
//! ### Ids
//!
//! Vectors get dense ids `0..num_samples()` in insertion order. Deletion
//! only flags an id; the slot is reclaimed when a save compacts the index.
//!
//! ### Metadata
//!
//! Each id owns one opaque byte entry. A reverse map from metadata content
//! to id can be built on request to delete or fetch vectors by metadata.
//!
//! ### Persistence
//!
//! An index saves to a folder (`indexloader.ini` plus one file per segment)
//! or to an [`IndexBlobs`] value holding the same artifacts in memory.
//!
//! ## Thread Safety
//!
//! `VectorIndex` is `Send + Sync`; all methods take `&self`. Searches share
//! read locks, while id-assigning mutations serialize on a write lock.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

// ============================================================================
// Module declarations
// ============================================================================

mod byte_array;
mod error;
mod metadata;
mod query;
mod types;
mod vector_set;

pub mod algo;
pub mod capacity;
pub mod config;
pub mod index;

// ============================================================================
// Public API re-exports
// ============================================================================

// Main index interface
pub use index::{BlobLayout, IndexBlobs, VectorIndex};

// Error handling
pub use error::{AnnError, ErrorCode, Result};

// Core types
pub use types::{
    decode_row, encode_row, DimensionType, DistCalcMethod, IndexAlgoType, SizeType, VecId,
    VectorValue, VectorValueType,
};

// Buffers and batches
pub use byte_array::ByteArray;
pub use metadata::{MetadataSet, ReverseMap};
pub use query::BasicResult;
pub use vector_set::{StridedView, VectorSet};

// Capacity planning
pub use capacity::{estimated_memory_usage, estimated_vector_count};

// ============================================================================
// Prelude module for convenient imports
// ============================================================================

/// Convenient imports for common pulse-ann usage.
///
/// ```rust
/// use pulseann::prelude::*;
/// ```
pub mod prelude {
    pub use crate::byte_array::ByteArray;
    pub use crate::error::{AnnError, ErrorCode, Result};
    pub use crate::index::VectorIndex;
    pub use crate::metadata::MetadataSet;
    pub use crate::query::BasicResult;
    pub use crate::types::{IndexAlgoType, VectorValueType};
    pub use crate::vector_set::VectorSet;
}
