//! Integration tests for parallel merge.
//!
//! Merged content must be the same set of (vector, metadata) pairs no
//! matter how many workers run the merge; only id order may differ.

use std::collections::BTreeSet;

use pulseann::{
    ErrorCode, IndexAlgoType, MetadataSet, VectorIndex, VectorSet, VectorValueType,
};

fn make_embedding(seed: u64, dim: usize) -> Vec<f32> {
    (0..dim)
        .map(|i| ((seed as f32 * 0.37) + (i as f32 * 1.13)).sin())
        .collect()
}

fn build_index(algo: IndexAlgoType, seeds: std::ops::Range<u64>, with_meta_index: bool) -> VectorIndex {
    let rows: Vec<Vec<f32>> = seeds.clone().map(|s| make_embedding(s, 8)).collect();
    let metadata = MetadataSet::from_entries(seeds.map(|s| format!("id-{}", s)));
    let index = VectorIndex::create_instance(algo, VectorValueType::Float).unwrap();
    index
        .build_index(&VectorSet::from_rows(&rows).unwrap(), Some(metadata), with_meta_index)
        .unwrap();
    index
}

/// Live (vector bytes, metadata) pairs.
fn live_content(index: &VectorIndex) -> BTreeSet<(Vec<u8>, Vec<u8>)> {
    (0..index.num_samples())
        .filter(|&id| index.contain_sample(id))
        .map(|id| {
            (
                index.get_sample(id).unwrap().to_vec(),
                index.get_metadata(id).to_vec(),
            )
        })
        .collect()
}

#[test]
fn test_merge_thread_counts_agree() {
    let source = build_index(IndexAlgoType::KDT, 100..400, false);
    for id in (0..300).step_by(7) {
        source.delete_index(id).unwrap();
    }

    let mut expected = None;
    for threads in [1, 4, 16] {
        let target = build_index(IndexAlgoType::KDT, 0..50, false);
        target.merge_index(&source, threads).unwrap();

        let live = source.num_samples() - source.num_deleted();
        assert_eq!(target.num_samples(), 50 + live, "threads = {}", threads);

        let content = live_content(&target);
        assert_eq!(content.len(), 50 + live);
        match &expected {
            None => expected = Some(content),
            Some(prev) => assert_eq!(prev, &content, "threads = {}", threads),
        }
    }

    // Every live source pair is present; deleted ones are not.
    let merged = expected.unwrap();
    for (pair, id) in live_content(&source).into_iter().zip(0..) {
        assert!(merged.contains(&pair), "pair {} missing", id);
    }
    let deleted_meta = b"id-100".to_vec();
    assert!(merged.iter().all(|(_, meta)| meta != &deleted_meta));
}

#[test]
fn test_merge_keeps_metadata_aligned_with_vectors() {
    let source = build_index(IndexAlgoType::BKT, 500..620, false);
    let target = build_index(IndexAlgoType::BKT, 0..10, true);
    target.merge_index(&source, 8).unwrap();

    for id in 10..target.num_samples() {
        let meta = target.get_metadata(id).to_vec();
        let seed: u64 = String::from_utf8(meta).unwrap()["id-".len()..].parse().unwrap();
        let expected = pulseann::encode_row(&make_embedding(seed, 8));
        assert_eq!(target.get_sample(id).unwrap().as_slice(), expected.as_slice());
    }
}

#[test]
fn test_merge_rebuilds_mapping() {
    let source = build_index(IndexAlgoType::BKT, 100..130, false);
    let target = build_index(IndexAlgoType::BKT, 0..10, true);
    target.merge_index(&source, 4).unwrap();

    assert!(!target.is_meta_mapping_stale());
    target.delete_index_by_metadata(b"id-120").unwrap();
    assert_eq!(target.num_deleted(), 1);
}

#[test]
fn test_merge_into_empty_index() {
    let source = build_index(IndexAlgoType::KDT, 0..25, false);
    let target = VectorIndex::create_instance(IndexAlgoType::KDT, VectorValueType::Float).unwrap();
    target.merge_index(&source, 2).unwrap();
    assert_eq!(target.num_samples(), 25);
    assert_eq!(target.feature_dim(), 8);
    assert_eq!(live_content(&target), live_content(&source));
}

#[test]
fn test_merge_type_mismatch_fails() {
    let source = VectorIndex::create_instance(IndexAlgoType::BKT, VectorValueType::Int16).unwrap();
    let target = build_index(IndexAlgoType::BKT, 0..5, false);
    let err = target.merge_index(&source, 2).unwrap_err();
    assert_eq!(err.code(), ErrorCode::Fail);
}
