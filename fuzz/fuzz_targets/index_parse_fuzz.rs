#![no_main]
use libfuzzer_sys::fuzz_target;
use hgrevlog::revlog::{FileBuilder, Index};

fuzz_target!(|data: &[u8]| {
    // Treat the input as an index file (inline revlogs carry their own data).
    let Ok(index) = Index::from_bytes(data, None) else {
        return;
    };
    let mut fb = FileBuilder::new();
    for r in index.records().iter().take(64) {
        // Corrupt input must surface as an error, never a panic.
        let _ = fb.build(&index, r);
    }
});
