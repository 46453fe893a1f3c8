// In-memory revlog construction for unit tests.

use std::sync::Arc;

use super::index::{header_word, Index, IndexFlags, RawEntry, RevFlags, REVLOG_NG};
use crate::node::{HashScheme, NodeId};
use crate::patch::Patch;

/// Accumulates revisions and serializes them as a RevlogNG index (plus data
/// file when not inline). Chunks are stored uncompressed with the `u` marker.
pub(crate) struct Fixture {
    flags: IndexFlags,
    entries: Vec<RawEntry>,
    chunks: Vec<Vec<u8>>,
    texts: Vec<Vec<u8>>,
}

impl Fixture {
    pub fn new(flags: IndexFlags) -> Self {
        Self {
            flags,
            entries: Vec::new(),
            chunks: Vec::new(),
            texts: Vec::new(),
        }
    }

    pub fn text(&self, rev: usize) -> &[u8] {
        &self.texts[rev]
    }

    pub fn node(&self, rev: i32) -> NodeId {
        match usize::try_from(rev) {
            Ok(r) => self.entries[r].node,
            Err(_) => NodeId::null(20),
        }
    }

    pub fn entry_mut(&mut self, rev: usize) -> &mut RawEntry {
        &mut self.entries[rev]
    }

    /// Store `text` as a full snapshot.
    pub fn snapshot(&mut self, text: &[u8], p1: i32, p2: i32, link: i32) -> usize {
        let rev = self.entries.len();
        self.push(text, stored(text), rev as i32, p1, p2, link)
    }

    /// Store `text` as a delta against revision `against`, which must be the
    /// previous revision unless the fixture uses generaldelta.
    pub fn delta(&mut self, text: &[u8], against: usize, p1: i32, p2: i32, link: i32) -> usize {
        let patch = simple_delta(&self.texts[against], text);
        let base = if self.flags.contains(IndexFlags::GENERAL_DELTA) {
            against as i32
        } else {
            assert_eq!(against + 1, self.entries.len());
            self.entries[against].base_rev
        };
        self.push(text, stored(&patch.to_bytes()), base, p1, p2, link)
    }

    /// Store an arbitrary chunk; the recorded node hashes `text`.
    pub fn raw(&mut self, text: &[u8], chunk: Vec<u8>, base: i32, p1: i32, link: i32) -> usize {
        self.push(text, chunk, base, p1, -1, link)
    }

    fn push(&mut self, text: &[u8], chunk: Vec<u8>, base: i32, p1: i32, p2: i32, link: i32) -> usize {
        let node = HashScheme::Sha1.node_id(self.node(p1), self.node(p2), text);
        let offset = self.chunks.iter().map(|c| c.len() as u64).sum();
        self.entries.push(RawEntry {
            offset,
            flags: RevFlags::empty(),
            compressed_len: chunk.len() as u32,
            uncompressed_len: text.len() as u32,
            base_rev: base,
            link_rev: link,
            p1,
            p2,
            node,
        });
        self.chunks.push(chunk);
        self.texts.push(text.to_vec());
        self.entries.len() - 1
    }

    /// Serialized `.i` and `.d` contents; the data part is empty when inline.
    pub fn bytes(&self) -> (Vec<u8>, Vec<u8>) {
        let inline = self.flags.contains(IndexFlags::INLINE_DATA);
        let (mut idx, mut data) = (Vec::new(), Vec::new());
        for (i, (e, chunk)) in self.entries.iter().zip(&self.chunks).enumerate() {
            let mut buf = e.encode();
            if i == 0 {
                buf[0..4].copy_from_slice(&header_word(REVLOG_NG, self.flags));
            }
            idx.extend_from_slice(&buf);
            if inline {
                idx.extend_from_slice(chunk);
            } else {
                data.extend_from_slice(chunk);
            }
        }
        (idx, data)
    }

    pub fn index(&self) -> Index {
        let (idx, data) = self.bytes();
        Index::from_bytes(&idx, Some(Arc::from(data))).unwrap()
    }
}

fn stored(data: &[u8]) -> Vec<u8> {
    let mut chunk = Vec::with_capacity(data.len() + 1);
    chunk.push(b'u');
    chunk.extend_from_slice(data);
    chunk
}

/// Single-hunk patch turning `old` into `new`, found by trimming the common
/// prefix and suffix.
pub(crate) fn simple_delta(old: &[u8], new: &[u8]) -> Patch {
    let prefix = old.iter().zip(new).take_while(|(a, b)| a == b).count();
    let room = old.len().min(new.len()) - prefix;
    let suffix = old
        .iter()
        .rev()
        .zip(new.iter().rev())
        .take(room)
        .take_while(|(a, b)| a == b)
        .count();
    let mut p = Patch::new();
    if prefix == old.len() && prefix == new.len() {
        return p;
    }
    p.push_hunk(
        prefix as u32,
        (old.len() - suffix) as u32,
        &new[prefix..new.len() - suffix],
    );
    p
}
