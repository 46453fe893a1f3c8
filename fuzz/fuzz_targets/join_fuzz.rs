#![no_main]
use libfuzzer_sys::fuzz_target;
use hgrevlog::patch::{self, Joiner, Patch};

// Build a patch valid against `len` bytes from a byte stream: every four
// bytes describe one hunk (gap, removed length, inserted length, fill).
fn derive_patch(len: usize, seed: &[u8]) -> Patch {
    let mut p = Patch::new();
    let mut pos = 0usize;
    for op in seed.chunks_exact(4) {
        let start = pos + op[0] as usize % 16;
        if start > len {
            break;
        }
        let end = (start + op[1] as usize % 8).min(len);
        let fill = vec![op[3]; op[2] as usize % 6];
        p.push_hunk(start as u32, end as u32, &fill);
        pos = end;
    }
    p
}

fn apply_vec(base: &[u8], p: &Patch) -> Vec<u8> {
    let mut out = Vec::new();
    patch::apply(&mut out, base, 0, p).expect("derived patch applies");
    out
}

fuzz_target!(|data: &[u8]| {
    if data.len() < 3 {
        return;
    }
    let third = data.len() / 3;
    let (base, rest) = data.split_at(third);
    let (a, b) = rest.split_at(third);

    let older = derive_patch(base.len(), a);
    let mid = apply_vec(base, &older);
    let newer = derive_patch(mid.len(), b);

    let mut joined = Patch::new();
    Joiner::new().join(&newer, &older, &mut joined);
    assert!(joined.validate().is_ok());
    assert_eq!(apply_vec(base, &joined), apply_vec(&mid, &newer));
});
