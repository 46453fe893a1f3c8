// Raw revision data: chunk retrieval and decompression.
//
// Chunks are read through a `DataHelper`, which owns a lazily opened handle
// on the revlog's data store and a staging buffer reused across reads. The
// first byte of a chunk selects its encoding:
//
//   (empty)  empty text
//   \0       stored verbatim, the marker byte is part of the data
//   u        stored verbatim after the marker
//   x        zlib stream (the marker is the zlib header's first byte)

use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::sync::Arc;

use flate2::read::ZlibDecoder;

use super::error::RevlogError;
use super::index::{Index, Record};
use crate::patch::parse::HUNK_HEADER_LEN;

// ---------------------------------------------------------------------------
// Data store
// ---------------------------------------------------------------------------

/// Where the chunks of a revlog live.
#[derive(Debug, Clone)]
pub enum DataStore {
    /// No data available; only index queries work.
    Detached,
    /// A file on disk: the `.d` file, or the `.i` file of an inline revlog.
    File(PathBuf),
    /// An in-memory copy of the file that would hold the chunks.
    Memory(Arc<[u8]>),
}

impl DataStore {
    /// True if both refer to the same underlying storage.
    pub fn same_as(&self, other: &DataStore) -> bool {
        match (self, other) {
            (Self::File(a), Self::File(b)) => a == b,
            (Self::Memory(a), Self::Memory(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    fn open(&self) -> io::Result<Box<dyn ReadSeek>> {
        match self {
            Self::Detached => Err(io::Error::new(
                io::ErrorKind::NotFound,
                "revlog has no data store",
            )),
            Self::File(path) => Ok(Box::new(File::open(path)?)),
            Self::Memory(buf) => Ok(Box::new(Cursor::new(Arc::clone(buf)))),
        }
    }
}

trait ReadSeek: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadSeek for T {}

// ---------------------------------------------------------------------------
// DataHelper
// ---------------------------------------------------------------------------

/// Reusable chunk reader: one open handle plus a staging buffer.
pub struct DataHelper {
    file: Option<(DataStore, Box<dyn ReadSeek>)>,
    tmp: Vec<u8>,
    keep_open: bool,
}

impl Default for DataHelper {
    fn default() -> Self {
        Self::new(128)
    }
}

impl DataHelper {
    /// Create a helper whose staging buffer starts at `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            file: None,
            tmp: Vec::with_capacity(capacity),
            keep_open: false,
        }
    }

    pub fn keep_open(&self) -> bool {
        self.keep_open
    }

    pub fn set_keep_open(&mut self, keep: bool) {
        self.keep_open = keep;
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    /// Release the open handle, if any.
    pub fn close(&mut self) {
        if let Some((store, _)) = self.file.take() {
            log::trace!("closing data store {store:?}");
        }
    }

    /// Read `len` bytes at `offset` of `store` into the staging buffer.
    ///
    /// Reuses the open handle when it belongs to `store`; otherwise the old
    /// handle is dropped and `store` opened.
    fn read_chunk(&mut self, store: &DataStore, offset: u64, len: usize) -> io::Result<&[u8]> {
        let reuse = matches!(&self.file, Some((open, _)) if open.same_as(store));
        if !reuse {
            self.file = Some((store.clone(), store.open()?));
        }
        let Some((_, file)) = self.file.as_mut() else {
            return Err(io::Error::other("data store handle missing"));
        };
        file.seek(SeekFrom::Start(offset))?;
        self.tmp.clear();
        // Lengths come from the index; do not trust them for allocation.
        file.take(len as u64).read_to_end(&mut self.tmp)?;
        if self.tmp.len() != len {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("chunk at {offset}: wanted {len} bytes, got {}", self.tmp.len()),
            ));
        }
        Ok(&self.tmp)
    }
}

// ---------------------------------------------------------------------------
// Raw data provider
// ---------------------------------------------------------------------------

impl Index {
    /// The decompressed stored bytes of `r`: a full text for snapshots, a
    /// serialized patch otherwise.
    pub fn raw_data(&self, r: &Record, dh: &mut DataHelper) -> Result<Vec<u8>, RevlogError> {
        let rev = r.pos().ok_or(RevlogError::RevisionNotFound)?;
        let loc = r.chunk();
        if loc.len == 0 {
            return Ok(Vec::new());
        }
        let chunk = dh
            .read_chunk(self.store(), loc.offset, loc.len as usize)
            .map_err(|source| RevlogError::Data { rev, source })?;
        let limit = self.inflated_limit(r);
        decompress(rev, chunk, limit)
    }

    /// Upper bound on the decompressed size of `r`'s chunk. A snapshot is the
    /// full text; every hunk of a delta consumes parent bytes or produces
    /// output bytes, and its inserted data is part of the output.
    fn inflated_limit(&self, r: &Record) -> usize {
        let out = r.file_len();
        match self.delta_parent(r) {
            None => out,
            Some(p) => {
                let hunks = p.file_len().saturating_add(out).saturating_add(1);
                out.saturating_add(hunks.saturating_mul(HUNK_HEADER_LEN))
            }
        }
    }
}

/// Decode one stored chunk. A zlib chunk inflating past `limit` bytes is a
/// `Data` error.
pub fn decompress(rev: usize, chunk: &[u8], limit: usize) -> Result<Vec<u8>, RevlogError> {
    match chunk.first() {
        None => Ok(Vec::new()),
        Some(b'\0') => Ok(chunk.to_vec()),
        Some(b'u') => Ok(chunk[1..].to_vec()),
        Some(b'x') => {
            let mut out = Vec::with_capacity(limit.min(chunk.len().saturating_mul(32)));
            ZlibDecoder::new(chunk)
                .take((limit as u64).saturating_add(1))
                .read_to_end(&mut out)
                .map_err(|source| RevlogError::Data { rev, source })?;
            if out.len() > limit {
                return Err(RevlogError::Data {
                    rev,
                    source: io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("zlib chunk inflates past {limit} bytes"),
                    ),
                });
            }
            Ok(out)
        }
        Some(&kind) => Err(RevlogError::UnknownCompression { rev, kind }),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
