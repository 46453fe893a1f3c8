#![no_main]
use libfuzzer_sys::fuzz_target;
use hgrevlog::patch::{self, Patch};

fuzz_target!(|data: &[u8]| {
    // Parsing arbitrary bytes must only ever fail with an error.
    let Ok(p) = Patch::parse(data) else {
        return;
    };
    assert!(p.validate().is_ok());

    // Applying a valid patch to any base either succeeds with the
    // predicted size or reports the offending hunk.
    let mut out = Vec::new();
    if let Ok(n) = patch::apply(&mut out, data, 0, &p) {
        assert_eq!(n, out.len());
        assert_eq!(n as isize, data.len() as isize + p.size_delta());
    }
});
