//! Closed-form capacity and memory estimates.
//!
//! Both functions share one per-vector cost:
//!
//! ```text
//! unit = elem_size × dim          vector storage
//!      + 8                        metadata offset slot
//!      + 4 × neighborhood_size    graph row
//!      + 1                        deleted flag
//!      + tree_node_size × trees   one node per vector per tree
//! ```

use crate::types::{IndexAlgoType, VectorValueType};

const SIZE_OF_ID: u64 = 4;
const METADATA_SLOT: u64 = 8;
const DELETED_FLAG: u64 = 1;

/// Bytes of one tree node for `algo`, or `None` if undefined.
///
/// BKT nodes hold a center and a child range (three ids); KDT nodes hold
/// two children, a split dimension, and a split value.
fn tree_node_size(algo: IndexAlgoType) -> Option<u64> {
    match algo {
        IndexAlgoType::BKT => Some(3 * SIZE_OF_ID),
        IndexAlgoType::KDT => Some(2 * SIZE_OF_ID + SIZE_OF_ID + 4),
        IndexAlgoType::Undefined => None,
    }
}

fn unit_size(
    dim: usize,
    algo: IndexAlgoType,
    value: VectorValueType,
    trees: usize,
    neighborhood: usize,
) -> Option<u64> {
    let node = tree_node_size(algo)?;
    Some(
        value.size() as u64 * dim as u64
            + METADATA_SLOT
            + SIZE_OF_ID * neighborhood as u64
            + DELETED_FLAG
            + node * trees as u64,
    )
}

/// Vectors that fit in `memory` bytes. Returns 0 for an undefined
/// algorithm.
pub fn estimated_vector_count(
    memory: u64,
    dim: usize,
    algo: IndexAlgoType,
    value: VectorValueType,
    trees: usize,
    neighborhood: usize,
) -> u64 {
    unit_size(dim, algo, value, trees, neighborhood).map_or(0, |unit| memory / unit)
}

/// Bytes needed for `count` vectors. Returns 0 for an undefined algorithm.
pub fn estimated_memory_usage(
    count: u64,
    dim: usize,
    algo: IndexAlgoType,
    value: VectorValueType,
    trees: usize,
    neighborhood: usize,
) -> u64 {
    unit_size(dim, algo, value, trees, neighborhood).map_or(0, |unit| unit.saturating_mul(count))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bkt_unit() {
        // 4×128 + 8 + 4×32 + 1 + 12×1
        let usage = estimated_memory_usage(1, 128, IndexAlgoType::BKT, VectorValueType::Float, 1, 32);
        assert_eq!(usage, 661);
        assert_eq!(
            estimated_vector_count(6610, 128, IndexAlgoType::BKT, VectorValueType::Float, 1, 32),
            10
        );
    }

    #[test]
    fn test_kdt_unit() {
        // 1×100 + 8 + 4×16 + 1 + 16×2
        let usage = estimated_memory_usage(3, 100, IndexAlgoType::KDT, VectorValueType::UInt8, 2, 16);
        assert_eq!(usage, 3 * 205);
    }

    #[test]
    fn test_undefined_algo_is_zero() {
        assert_eq!(
            estimated_vector_count(1 << 30, 8, IndexAlgoType::Undefined, VectorValueType::Float, 1, 32),
            0
        );
        assert_eq!(
            estimated_memory_usage(100, 8, IndexAlgoType::Undefined, VectorValueType::Float, 1, 32),
            0
        );
    }
}
