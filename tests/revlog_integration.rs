mod common;

use std::cell::RefCell;
use std::rc::Rc;

use common::{RevlogFixture, evolving_texts};
use hgrevlog::filelog::{self, ManifestEntry};
use hgrevlog::node::{HashScheme, NodeId};
use hgrevlog::revlog::verify::{failures, verify_all};
use hgrevlog::revlog::{
    BuilderOptions, FileBuilder, Index, IndexFlags, MemoryCache, RevisionSpec, RevlogError,
};
use tempfile::tempdir;

fn linear(flags: IndexFlags, n: usize, snapshot_every: usize) -> RevlogFixture {
    let mut fx = RevlogFixture::new(flags).compressed();
    for text in evolving_texts(n) {
        fx.push_linear(&text, snapshot_every);
    }
    fx
}

#[test]
fn round_trip_inline_on_disk() {
    let dir = tempdir().unwrap();
    let fx = linear(IndexFlags::INLINE_DATA, 40, 16);
    let path = fx.write(dir.path(), "inline");
    assert!(!dir.path().join("inline.d").exists());

    let index = Index::open(&path).unwrap();
    assert_eq!(index.len(), 40);
    assert!(index.is_inline());
    let mut fb = FileBuilder::new();
    for (i, r) in index.records().iter().enumerate() {
        assert_eq!(fb.build(&index, r).unwrap(), fx.text(i), "rev {i}");
    }
}

#[test]
fn round_trip_split_on_disk() {
    let dir = tempdir().unwrap();
    let fx = linear(IndexFlags::empty(), 40, 1000);
    let path = fx.write(dir.path(), "split");

    let index = Index::open(&path).unwrap();
    assert!(!index.is_inline());
    let mut fb = FileBuilder::new();
    // Newest first, so every build walks a long chain.
    for i in (0..40).rev() {
        let r = index.record(i).unwrap();
        assert_eq!(fb.build(&index, r).unwrap(), fx.text(i), "rev {i}");
    }
}

#[test]
fn round_trip_generaldelta_branches() {
    let mut fx = RevlogFixture::new(IndexFlags::GENERAL_DELTA).compressed();
    let texts = evolving_texts(12);
    fx.snapshot(&texts[0], -1, -1, 0);
    // Two branches off rev 0 interleaved, each delta against its own parent.
    let (mut left, mut right) = (0usize, 0usize);
    for (i, text) in texts.iter().enumerate().skip(1) {
        let parent = if i % 2 == 0 { &mut left } else { &mut right };
        let rev = fx.delta(text, *parent, *parent as i32, -1, i as i32);
        *parent = rev;
    }
    let merge = b"merged result\n".to_vec();
    fx.delta(&merge, left, left as i32, right as i32, 12);

    let index = fx.in_memory();
    let mut fb = FileBuilder::new();
    for i in 0..index.len() {
        let r = index.record(i).unwrap();
        assert_eq!(fb.build(&index, r).unwrap(), fx.text(i), "rev {i}");
    }
    let leaves: Vec<_> = index
        .records()
        .iter()
        .filter(|r| r.is_leaf())
        .map(|r| r.rev())
        .collect();
    assert_eq!(leaves, vec![12]);
}

#[test]
fn round_trip_sha256_nodes() {
    let dir = tempdir().unwrap();
    let mut fx = RevlogFixture::new(IndexFlags::empty())
        .compressed()
        .with_scheme(HashScheme::Sha256);
    for text in evolving_texts(12) {
        fx.push_linear(&text, 5);
    }
    let path = fx.write(dir.path(), "wide");

    let index = Index::open_with_scheme(&path, HashScheme::Sha256).unwrap();
    assert_eq!(index.hash_scheme(), HashScheme::Sha256);
    assert_eq!(index.null().node().len(), 32);
    let mut fb = FileBuilder::new();
    for i in (0..index.len()).rev() {
        let r = index.record(i).unwrap();
        assert_eq!(r.node().len(), 32);
        assert_eq!(fb.build(&index, r).unwrap(), fx.text(i), "rev {i}");
    }

    let hex = fx.node(7).to_hex();
    assert_eq!(hex.len(), 64);
    let r = RevisionSpec::NodeId(hex).lookup(&index).unwrap();
    assert_eq!(r.rev(), 7);

    // Read as SHA-1, the truncated ids no longer verify.
    let narrow = Index::open(&path).unwrap();
    let err = fb.build(&narrow, narrow.record(0).unwrap()).unwrap_err();
    assert!(matches!(err, RevlogError::HashMismatch { rev: 0, .. }));
}

#[test]
fn tampered_length_and_node_yield_no_bytes() {
    let mut fx = linear(IndexFlags::INLINE_DATA, 6, 100);
    fx.entry_mut(4).uncompressed_len -= 1;
    fx.entry_mut(5).node = NodeId::from_bytes(&[0x5a; 20]);
    let index = fx.in_memory();
    let mut fb = FileBuilder::new();

    let mut sink = Vec::new();
    let err = fb
        .build_write(&mut sink, &index, index.record(4).unwrap())
        .unwrap_err();
    assert!(matches!(err, RevlogError::LengthMismatch { .. }));
    assert!(sink.is_empty());

    let err = fb
        .build_write(&mut sink, &index, index.record(5).unwrap())
        .unwrap_err();
    assert!(matches!(err, RevlogError::HashMismatch { rev: 5, .. }));
    assert!(sink.is_empty());

    // Untouched revisions still build, and are written.
    let n = fb
        .build_write(&mut sink, &index, index.record(3).unwrap())
        .unwrap();
    assert_eq!(n, fx.text(3).len());
    assert_eq!(sink, fx.text(3));
}

#[test]
fn corrupted_snapshot_byte_detected() {
    let mut fx = RevlogFixture::new(IndexFlags::INLINE_DATA);
    fx.snapshot(b"stored verbatim, no compression\n", -1, -1, 0);
    fx.chunk_mut(0)[3] ^= 0x20;
    let index = fx.in_memory();
    let err = FileBuilder::new()
        .build(&index, index.record(0).unwrap())
        .map(<[u8]>::to_vec)
        .unwrap_err();
    assert!(matches!(err, RevlogError::HashMismatch { rev: 0, .. }));
}

#[test]
fn copy_metadata_is_stripped() {
    let header = b"\x01\ncopy: old.txt\ncopyrev: 1234567890abcdef1234567890abcdef12345678\n\x01\n";
    let mut full = header.to_vec();
    full.extend_from_slice(b"contents after rename\n");

    let mut fx = RevlogFixture::new(IndexFlags::INLINE_DATA);
    fx.snapshot(&full, -1, -1, 0);
    fx.delta(b"contents edited\n", 0, 0, -1, 1);
    let index = fx.in_memory();

    let mut fb = FileBuilder::new();
    let out = fb.build(&index, index.record(0).unwrap()).unwrap();
    assert_eq!(out, b"contents after rename\n");
    // Later revisions carry no header of their own.
    let out = fb.build(&index, index.record(1).unwrap()).unwrap();
    assert_eq!(out, b"contents edited\n");

    let fp = fb.prepare_patch(&index, index.record(0).unwrap()).unwrap();
    assert_eq!(fp.meta_len(), header.len());
    assert_eq!(
        fp.metadata().get("copyrev").map(String::as_str),
        Some("1234567890abcdef1234567890abcdef12345678")
    );
}

#[test]
fn cache_shared_between_builders() {
    let fx = linear(IndexFlags::empty(), 10, 100);
    let index = fx.in_memory();
    let cache = Rc::new(RefCell::new(MemoryCache::new()));

    let mut a = FileBuilder::new();
    a.set_data_cache(Rc::clone(&cache));
    a.build(&index, index.record(9).unwrap()).unwrap();
    assert_eq!(cache.borrow().misses(), 10);

    let mut b = FileBuilder::new();
    b.set_data_cache(Rc::clone(&cache));
    assert_eq!(b.build(&index, index.record(7).unwrap()).unwrap(), fx.text(7));
    assert_eq!(cache.borrow().hits(), 8);
    assert_eq!(cache.borrow().misses(), 10);
}

#[test]
fn keep_open_holds_data_file() {
    let dir = tempdir().unwrap();
    let fx = linear(IndexFlags::empty(), 5, 100);
    let index = Index::open(fx.write(dir.path(), "held")).unwrap();

    let mut fb = FileBuilder::with_options(BuilderOptions {
        keep_data_open: true,
        ..BuilderOptions::default()
    });
    fb.build(&index, index.record(4).unwrap()).unwrap();
    assert!(fb.is_data_open());
    fb.close_data();
    assert!(!fb.is_data_open());

    fb.build(&index, index.record(2).unwrap()).unwrap();
    assert!(!fb.is_data_open());
}

#[test]
fn missing_data_file_is_data_error() {
    let dir = tempdir().unwrap();
    let fx = linear(IndexFlags::empty(), 3, 100);
    let path = fx.write(dir.path(), "lost");
    std::fs::remove_file(dir.path().join("lost.d")).unwrap();

    let index = Index::open(&path).unwrap();
    assert_eq!(index.len(), 3);
    let mut fb = FileBuilder::new();
    let err = fb.build(&index, index.record(2).unwrap()).unwrap_err();
    assert!(matches!(err, RevlogError::Data { .. }));
    assert!(!fb.is_data_open());
}

#[test]
fn resolve_then_build() {
    let fx = linear(IndexFlags::INLINE_DATA, 8, 4);
    let index = fx.in_memory();
    let mut fb = FileBuilder::new();

    let node = index.record(5).unwrap().node().to_hex();
    let r = RevisionSpec::NodeId(node[..12].to_string())
        .lookup(&index)
        .unwrap();
    assert_eq!(fb.build(&index, r).unwrap(), fx.text(5));

    let r = "-1".parse::<RevisionSpec>().unwrap().lookup(&index).unwrap();
    assert_eq!(r.rev(), 7);
    let r = RevisionSpec::LinkRev(3).lookup(&index).unwrap();
    assert_eq!(fb.build(&index, r).unwrap(), fx.text(3));
    let r = RevisionSpec::Null.lookup(&index).unwrap();
    assert!(fb.build(&index, r).unwrap().is_empty());
}

#[test]
fn verify_reports_only_corrupt_revisions() {
    let mut fx = RevlogFixture::new(IndexFlags::INLINE_DATA);
    fx.snapshot(b"one\n", -1, -1, 0);
    fx.snapshot(b"two\n", -1, -1, 1);
    fx.snapshot(b"three\n", -1, -1, 2);
    fx.entry_mut(1).node = NodeId::from_bytes(&[9; 20]);
    let checks = verify_all(&fx.in_memory());
    assert_eq!(failures(&checks), 1);
    assert!(checks[1].1.is_err());
}

#[test]
fn existence_against_real_index() {
    // Changesets 0 and 4 touch the file; it is then modified at 9.
    let mut fx = RevlogFixture::new(IndexFlags::INLINE_DATA);
    fx.snapshot(b"v0\n", -1, -1, 0);
    fx.delta(b"v1\n", 0, 0, -1, 4);
    fx.delta(b"v2\n", 1, 1, -1, 9);
    let index = fx.in_memory();

    let r = filelog::lookup_file(&index, 4, || panic!("exact link")).unwrap();
    assert_eq!(r.rev(), 1);
    let r = filelog::lookup_file(&index, 20, || panic!("leaf")).unwrap();
    assert_eq!(r.rev(), 2);

    let node = index.record(1).unwrap().node();
    let r = filelog::lookup_file(&index, 6, || {
        Ok(ManifestEntry {
            path: "f".into(),
            node_hex: node.to_hex(),
            flags: String::new(),
        })
    })
    .unwrap();
    assert_eq!(r.rev(), 1);
}
