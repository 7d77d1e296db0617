#![no_main]

use std::sync::OnceLock;

use libfuzzer_sys::fuzz_target;
use pulseann::{ByteArray, IndexAlgoType, IndexBlobs, MetadataSet, VectorIndex, VectorSet, VectorValueType};

/// Blobs of a small valid index; each run corrupts one of them.
fn seed_blobs() -> &'static IndexBlobs {
    static BLOBS: OnceLock<IndexBlobs> = OnceLock::new();
    BLOBS.get_or_init(|| {
        let rows: Vec<Vec<f32>> = (0..32)
            .map(|s| (0..4).map(|i| (s as f32 * 0.37 + i as f32 * 1.13).sin()).collect())
            .collect();
        let index = VectorIndex::create_instance(IndexAlgoType::BKT, VectorValueType::Float).unwrap();
        index
            .build_index(
                &VectorSet::from_rows(&rows).unwrap(),
                Some(MetadataSet::from_entries((0..32).map(|s| format!("id-{}", s)))),
                true,
            )
            .unwrap();
        index.save_index_blobs().unwrap()
    })
}

fuzz_target!(|data: &[u8]| {
    let Some((&selector, payload)) = data.split_first() else {
        return;
    };
    let seed = seed_blobs();
    let mut blobs = seed.blobs.clone();
    let slot = selector as usize % blobs.len();
    blobs[slot] = ByteArray::copy_from(payload);

    // Corrupt segments must be rejected with an error, never a panic.
    if let Ok(index) = VectorIndex::load_index_from_blobs(&seed.config, &blobs) {
        let _ = index.search(&[0.0f32, 0.5, -0.5, 1.0], 4);
    }
});
