// Revlog file writer for integration tests.
#![allow(dead_code)]

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use flate2::Compression;
use flate2::write::ZlibEncoder;
use hgrevlog::node::{HashScheme, NodeId};
use hgrevlog::patch::Patch;
use hgrevlog::revlog::index::{RawEntry, REVLOG_NG, header_word};
use hgrevlog::revlog::{Index, IndexFlags, RevFlags};

/// Builds revlogs revision by revision, the way a writer would lay them out.
pub struct RevlogFixture {
    flags: IndexFlags,
    compress: bool,
    scheme: HashScheme,
    entries: Vec<RawEntry>,
    chunks: Vec<Vec<u8>>,
    texts: Vec<Vec<u8>>,
}

impl RevlogFixture {
    pub fn new(flags: IndexFlags) -> Self {
        Self {
            flags,
            compress: false,
            scheme: HashScheme::Sha1,
            entries: Vec::new(),
            chunks: Vec::new(),
            texts: Vec::new(),
        }
    }

    /// Zlib-compress chunks when that makes them smaller.
    pub fn compressed(mut self) -> Self {
        self.compress = true;
        self
    }

    /// Node ids from `scheme` instead of SHA-1.
    pub fn with_scheme(mut self, scheme: HashScheme) -> Self {
        self.scheme = scheme;
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn text(&self, rev: usize) -> &[u8] {
        &self.texts[rev]
    }

    pub fn node(&self, rev: i32) -> NodeId {
        match usize::try_from(rev) {
            Ok(r) => self.entries[r].node,
            Err(_) => NodeId::null(self.scheme.node_len()),
        }
    }

    pub fn entry_mut(&mut self, rev: usize) -> &mut RawEntry {
        &mut self.entries[rev]
    }

    /// Stored chunk of `rev`. Edits must keep its length.
    pub fn chunk_mut(&mut self, rev: usize) -> &mut [u8] {
        &mut self.chunks[rev]
    }

    pub fn snapshot(&mut self, text: &[u8], p1: i32, p2: i32, link: i32) -> usize {
        let rev = self.entries.len() as i32;
        let chunk = self.encode_chunk(text);
        self.push(text, chunk, rev, p1, p2, link)
    }

    /// Store `text` as a delta against `against`. Without generaldelta,
    /// `against` must be the previous revision.
    pub fn delta(&mut self, text: &[u8], against: usize, p1: i32, p2: i32, link: i32) -> usize {
        let patch = simple_delta(&self.texts[against], text);
        let base = if self.flags.contains(IndexFlags::GENERAL_DELTA) {
            against as i32
        } else {
            assert_eq!(against + 1, self.entries.len(), "classic deltas chain linearly");
            self.entries[against].base_rev
        };
        let chunk = self.encode_chunk(&patch.to_bytes());
        self.push(text, chunk, base, p1, p2, link)
    }

    /// Append `text` as a child of the previous revision, snapshotting every
    /// `snapshot_every` revisions.
    pub fn push_linear(&mut self, text: &[u8], snapshot_every: usize) -> usize {
        let rev = self.entries.len();
        let link = rev as i32;
        if rev % snapshot_every == 0 {
            self.snapshot(text, rev as i32 - 1, -1, link)
        } else {
            self.delta(text, rev - 1, rev as i32 - 1, -1, link)
        }
    }

    fn encode_chunk(&self, data: &[u8]) -> Vec<u8> {
        if data.is_empty() {
            return Vec::new();
        }
        if self.compress {
            let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
            enc.write_all(data).unwrap();
            let z = enc.finish().unwrap();
            if z.len() < data.len() {
                return z;
            }
        }
        if data[0] == 0 {
            return data.to_vec();
        }
        let mut chunk = Vec::with_capacity(data.len() + 1);
        chunk.push(b'u');
        chunk.extend_from_slice(data);
        chunk
    }

    fn push(&mut self, text: &[u8], chunk: Vec<u8>, base: i32, p1: i32, p2: i32, link: i32) -> usize {
        let node = self.scheme.node_id(self.node(p1), self.node(p2), text);
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

    /// `.i` and `.d` contents; the data part is empty for inline revlogs.
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

    pub fn in_memory(&self) -> Index {
        let (idx, data) = self.bytes();
        Index::from_bytes(&idx, Some(Arc::from(data))).unwrap()
    }

    /// Write `<name>.i` (and `<name>.d` when split) into `dir`.
    pub fn write(&self, dir: &Path, name: &str) -> PathBuf {
        let (idx, data) = self.bytes();
        let path = dir.join(format!("{name}.i"));
        std::fs::write(&path, idx).unwrap();
        if !self.flags.contains(IndexFlags::INLINE_DATA) {
            std::fs::write(dir.join(format!("{name}.d")), data).unwrap();
        }
        path
    }
}

/// Single-hunk patch from `old` to `new` (common prefix and suffix trimmed).
pub fn simple_delta(old: &[u8], new: &[u8]) -> Patch {
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

/// Deterministic sequence of `n` evolving line-oriented texts.
pub fn evolving_texts(n: usize) -> Vec<Vec<u8>> {
    let mut lines: Vec<String> = (0..20).map(|i| format!("line {i} of the file\n")).collect();
    let mut out = Vec::with_capacity(n);
    for step in 0..n {
        match step % 4 {
            0 => lines.push(format!("appended at step {step}\n")),
            1 => {
                let at = step % lines.len();
                lines[at] = format!("rewritten at step {step}\n");
            }
            2 => {
                let at = (step * 7) % lines.len();
                lines.insert(at, format!("inserted at step {step}\n"));
            }
            _ => {
                let at = (step * 3) % lines.len();
                lines.remove(at);
            }
        }
        out.push(lines.concat().into_bytes());
    }
    out
}
