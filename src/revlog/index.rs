// Revlog index: record table of one revlog.
//
// Reads the RevlogNG (version 1) layout. Each revision has a 64-byte
// big-endian entry; the first four bytes of entry 0 double as the file
// header carrying the version and index flags. With the inline flag set, each
// revision's data chunk directly follows its entry in the `.i` file;
// otherwise chunks live in the companion `.d` file.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bitflags::bitflags;

use super::data::DataStore;
use super::error::RevlogError;
use crate::node::{HashScheme, NodeId};

/// Revision number of the null revision.
pub const NULL_REV: i32 = -1;

/// Version number of the RevlogNG format.
pub const REVLOG_NG: u16 = 1;

/// Size of one index entry.
pub const ENTRY_LEN: usize = 64;

bitflags! {
    /// Per-revlog flags from the header (upper half of the first word).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct IndexFlags: u16 {
        const INLINE_DATA = 1 << 0;
        const GENERAL_DELTA = 1 << 1;
    }
}

bitflags! {
    /// Per-revision flags (low 16 bits of the offset word).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct RevFlags: u16 {
        const CENSORED = 1 << 15;
        const ELLIPSIS = 1 << 14;
        const EXTSTORED = 1 << 13;
    }
}

// ---------------------------------------------------------------------------
// Raw entries
// ---------------------------------------------------------------------------

/// One decoded index entry, before cross-entry validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEntry {
    /// Offset of the data chunk in the data file (excluding inline entries).
    pub offset: u64,
    pub flags: RevFlags,
    pub compressed_len: u32,
    pub uncompressed_len: u32,
    pub base_rev: i32,
    pub link_rev: i32,
    pub p1: i32,
    pub p2: i32,
    pub node: NodeId,
}

impl RawEntry {
    /// Decode a 64-byte entry. `node_len` is the digest length in use.
    pub fn decode(buf: &[u8; ENTRY_LEN], node_len: usize) -> Self {
        let mut word = [0u8; 8];
        word.copy_from_slice(&buf[0..8]);
        let word = u64::from_be_bytes(word);
        Self {
            offset: word >> 16,
            flags: RevFlags::from_bits_retain(word as u16),
            compressed_len: be_u32(buf, 8),
            uncompressed_len: be_u32(buf, 12),
            base_rev: be_u32(buf, 16) as i32,
            link_rev: be_u32(buf, 20) as i32,
            p1: be_u32(buf, 24) as i32,
            p2: be_u32(buf, 28) as i32,
            node: NodeId::from_bytes(&buf[32..32 + node_len]),
        }
    }

    /// Encode as a 64-byte entry. The header is not merged in.
    pub fn encode(&self) -> [u8; ENTRY_LEN] {
        let mut buf = [0u8; ENTRY_LEN];
        let word = (self.offset << 16) | u64::from(self.flags.bits());
        buf[0..8].copy_from_slice(&word.to_be_bytes());
        buf[8..12].copy_from_slice(&self.compressed_len.to_be_bytes());
        buf[12..16].copy_from_slice(&self.uncompressed_len.to_be_bytes());
        buf[16..20].copy_from_slice(&self.base_rev.to_be_bytes());
        buf[20..24].copy_from_slice(&self.link_rev.to_be_bytes());
        buf[24..28].copy_from_slice(&self.p1.to_be_bytes());
        buf[28..32].copy_from_slice(&self.p2.to_be_bytes());
        let node = self.node.as_bytes();
        buf[32..32 + node.len()].copy_from_slice(node);
        buf
    }
}

#[inline]
fn be_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

/// The header word stored over the first four bytes of entry 0.
pub fn header_word(version: u16, flags: IndexFlags) -> [u8; 4] {
    ((u32::from(flags.bits()) << 16) | u32::from(version)).to_be_bytes()
}

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// Location of a revision's stored chunk within the data store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChunkLocation {
    pub offset: u64,
    pub len: u32,
}

/// One revision of the revlog, or the synthetic null revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    rev: i32,
    node: NodeId,
    p1: i32,
    p2: i32,
    link_rev: i32,
    base_rev: i32,
    flags: RevFlags,
    file_len: usize,
    chunk: ChunkLocation,
    leaf: bool,
}

impl Record {
    fn null(node_len: usize) -> Self {
        Self {
            rev: NULL_REV,
            node: NodeId::null(node_len),
            p1: NULL_REV,
            p2: NULL_REV,
            link_rev: NULL_REV,
            base_rev: NULL_REV,
            flags: RevFlags::empty(),
            file_len: 0,
            chunk: ChunkLocation::default(),
            leaf: false,
        }
    }

    /// Local revision number; [`NULL_REV`] for the null record.
    pub fn rev(&self) -> i32 {
        self.rev
    }

    /// Position in the index, or `None` for the null record.
    pub fn pos(&self) -> Option<usize> {
        usize::try_from(self.rev).ok()
    }

    pub fn is_null(&self) -> bool {
        self.rev == NULL_REV
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn p1(&self) -> i32 {
        self.p1
    }

    pub fn p2(&self) -> i32 {
        self.p2
    }

    pub fn link_rev(&self) -> i32 {
        self.link_rev
    }

    /// Stored base revision. Without generaldelta this is the start of the
    /// delta chain; with it, the revision the delta applies to.
    pub fn base_rev(&self) -> i32 {
        self.base_rev
    }

    pub fn flags(&self) -> RevFlags {
        self.flags
    }

    /// Length of the full revision text.
    pub fn file_len(&self) -> usize {
        self.file_len
    }

    pub fn chunk(&self) -> ChunkLocation {
        self.chunk
    }

    /// True if the stored chunk is a full snapshot.
    pub fn is_base(&self) -> bool {
        !self.is_null() && self.rev == self.base_rev
    }

    /// True if no other revision names this one as a parent.
    pub fn is_leaf(&self) -> bool {
        self.leaf
    }

    /// True if the first parent is null: a root revision, or the first
    /// revision of a copied or renamed file.
    pub fn is_start_of_branch(&self) -> bool {
        !self.is_null() && self.p1 == NULL_REV
    }
}

// ---------------------------------------------------------------------------
// Index
// ---------------------------------------------------------------------------

/// All records of one revlog, plus where its data chunks are stored.
#[derive(Debug)]
pub struct Index {
    records: Vec<Record>,
    null: Record,
    version: u16,
    flags: IndexFlags,
    scheme: HashScheme,
    store: DataStore,
}

impl Index {
    /// Open the revlog whose index file is `path` (normally `*.i`).
    ///
    /// The index is read fully; data chunks are read on demand.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RevlogError> {
        Self::open_with_scheme(path, HashScheme::Sha1)
    }

    pub fn open_with_scheme(
        path: impl AsRef<Path>,
        scheme: HashScheme,
    ) -> Result<Self, RevlogError> {
        let path = path.as_ref();
        let buf = std::fs::read(path)?;
        let (version, flags) = read_header(&buf);
        let store = if flags.contains(IndexFlags::INLINE_DATA) {
            DataStore::File(path.to_path_buf())
        } else {
            DataStore::File(data_path(path))
        };
        let index = Self::parse(&buf, store, scheme)?;
        log::debug!(
            "opened revlog {} (version {version}, flags {flags:?}, {} revisions)",
            path.display(),
            index.len()
        );
        Ok(index)
    }

    /// Build an index over in-memory revlog files. `data` is the `.d`
    /// content and is ignored for inline revlogs.
    pub fn from_bytes(index: &[u8], data: Option<Arc<[u8]>>) -> Result<Self, RevlogError> {
        let (_, flags) = read_header(index);
        let store = if flags.contains(IndexFlags::INLINE_DATA) {
            DataStore::Memory(Arc::from(index))
        } else {
            data.map_or(DataStore::Detached, DataStore::Memory)
        };
        Self::parse(index, store, HashScheme::Sha1)
    }

    /// Parse index bytes whose chunks are found in `store`.
    pub fn parse(buf: &[u8], store: DataStore, scheme: HashScheme) -> Result<Self, RevlogError> {
        let (version, flags) = read_header(buf);
        if version != REVLOG_NG {
            return Err(RevlogError::UnsupportedVersion(version));
        }
        let node_len = scheme.node_len();
        let inline = flags.contains(IndexFlags::INLINE_DATA);

        let mut entries = Vec::new();
        let mut pos = 0usize;
        while pos < buf.len() {
            let Some(raw) = buf
                .get(pos..pos + ENTRY_LEN)
                .and_then(|s| <&[u8; ENTRY_LEN]>::try_from(s).ok())
            else {
                return Err(RevlogError::CorruptIndex(format!(
                    "truncated entry at offset {pos}"
                )));
            };
            let mut entry = RawEntry::decode(raw, node_len);
            if entries.is_empty() {
                entry.offset = 0;
            }
            pos += ENTRY_LEN;
            if inline {
                pos += entry.compressed_len as usize;
            }
            entries.push(entry);
        }
        if pos > buf.len() {
            return Err(RevlogError::CorruptIndex(
                "inline data extends past end of file".into(),
            ));
        }

        Self::from_entries(entries, version, flags, scheme, store)
    }

    /// Assemble an index from decoded entries, checking their cross
    /// references and deriving leaf status and chunk locations.
    pub fn from_entries(
        entries: Vec<RawEntry>,
        version: u16,
        flags: IndexFlags,
        scheme: HashScheme,
        store: DataStore,
    ) -> Result<Self, RevlogError> {
        let inline = flags.contains(IndexFlags::INLINE_DATA);
        let mut records = Vec::with_capacity(entries.len());

        for (i, e) in entries.into_iter().enumerate() {
            let rev = i32::try_from(i)
                .map_err(|_| RevlogError::CorruptIndex("too many revisions".into()))?;
            for (name, p) in [("p1", e.p1), ("p2", e.p2)] {
                if p < NULL_REV || p >= rev {
                    return Err(RevlogError::CorruptIndex(format!(
                        "rev {rev}: {name} {p} out of range"
                    )));
                }
            }
            if e.base_rev < 0 || e.base_rev > rev {
                return Err(RevlogError::CorruptIndex(format!(
                    "rev {rev}: base {} out of range",
                    e.base_rev
                )));
            }
            let offset = if inline {
                e.offset + (i as u64 + 1) * ENTRY_LEN as u64
            } else {
                e.offset
            };
            records.push(Record {
                rev,
                node: e.node,
                p1: e.p1,
                p2: e.p2,
                link_rev: e.link_rev,
                base_rev: e.base_rev,
                flags: e.flags,
                file_len: e.uncompressed_len as usize,
                chunk: ChunkLocation {
                    offset,
                    len: e.compressed_len,
                },
                leaf: true,
            });
        }

        for i in 0..records.len() {
            let (p1, p2) = (records[i].p1, records[i].p2);
            for p in [p1, p2] {
                if let Ok(p) = usize::try_from(p) {
                    records[p].leaf = false;
                }
            }
        }

        Ok(Self {
            records,
            null: Record::null(scheme.node_len()),
            version,
            flags,
            scheme,
            store,
        })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn record(&self, pos: usize) -> Option<&Record> {
        self.records.get(pos)
    }

    /// Record for revision number `rev`; [`NULL_REV`] yields the null record.
    pub fn by_rev(&self, rev: i32) -> Option<&Record> {
        if rev == NULL_REV {
            return Some(&self.null);
        }
        usize::try_from(rev).ok().and_then(|p| self.records.get(p))
    }

    pub fn tip(&self) -> Option<&Record> {
        self.records.last()
    }

    pub fn null(&self) -> &Record {
        &self.null
    }

    pub fn parent1(&self, r: &Record) -> &Record {
        self.by_rev(r.p1).unwrap_or(&self.null)
    }

    pub fn parent2(&self, r: &Record) -> &Record {
        self.by_rev(r.p2).unwrap_or(&self.null)
    }

    /// The revision `r`'s delta applies to, or `None` if `r` is a snapshot.
    pub fn delta_parent(&self, r: &Record) -> Option<&Record> {
        if r.is_null() || r.is_base() {
            return None;
        }
        if self.flags.contains(IndexFlags::GENERAL_DELTA) {
            self.by_rev(r.base_rev)
        } else {
            self.by_rev(r.rev - 1)
        }
    }

    pub fn version(&self) -> u16 {
        self.version
    }

    pub fn flags(&self) -> IndexFlags {
        self.flags
    }

    pub fn is_inline(&self) -> bool {
        self.flags.contains(IndexFlags::INLINE_DATA)
    }

    pub fn hash_scheme(&self) -> HashScheme {
        self.scheme
    }

    pub fn store(&self) -> &DataStore {
        &self.store
    }
}

fn read_header(buf: &[u8]) -> (u16, IndexFlags) {
    match buf.get(0..4) {
        Some(h) => {
            let word = be_u32(h, 0);
            (word as u16, IndexFlags::from_bits_retain((word >> 16) as u16))
        }
        // An empty index file is a valid, empty RevlogNG.
        None => (REVLOG_NG, IndexFlags::INLINE_DATA),
    }
}

/// The `.d` file belonging to index file `path`.
pub fn data_path(path: &Path) -> PathBuf {
    path.with_extension("d")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
