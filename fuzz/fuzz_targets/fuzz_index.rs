#![no_main]

use huffpack::codec::decode_bytes;
use huffpack::index::index_bytes;
use libfuzzer_sys::fuzz_target;

// Arbitrary bytes as an archive: indexing must fail cleanly or produce
// entries that lie inside the input.
fuzz_target!(|data: &[u8]| {
    let Ok(index) = index_bytes(data) else {
        return;
    };
    for entry in &index.entries {
        assert!(entry.data_end() <= data.len() as u64);
        if entry.defect.is_some() || entry.original_size > 1 << 20 {
            continue;
        }
        let start = entry.data_offset as usize;
        let end = entry.data_end() as usize;
        let out = decode_bytes(&index.tree, &data[start..end], entry.original_size)
            .expect("indexed entry decodes");
        assert_eq!(out.len() as u64, entry.original_size);
    }
});
