#![no_main]

use libfuzzer_sys::fuzz_target;
use pulseann::config::IniReader;
use pulseann::{IndexAlgoType, VectorIndex, VectorValueType};

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(reader) = IniReader::parse(text) else {
        return;
    };

    // Arbitrary parameter values must either apply or fail cleanly.
    let index = VectorIndex::create_instance(IndexAlgoType::KDT, VectorValueType::Int8).unwrap();
    let _ = index.load_index_config(&reader);
    let _ = VectorIndex::load_index_from_blobs(text, &[]);
});
