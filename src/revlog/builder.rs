// Revision reconstruction.
//
// Walks the delta chain of a target revision back to its snapshot, composing
// the chain's patches into one as it goes, then applies the composed patch
// to the snapshot in a single pass while hashing the output. The text is
// accepted only if both its length and its node hash match the index.

use std::collections::BTreeMap;
use std::io::{self, Write};
use std::sync::Arc;

use super::cache::{DataCache, NoCache};
use super::data::DataHelper;
use super::error::RevlogError;
use super::index::{Index, Record};
use crate::node::{sorted_pair, NodeHasher};
use crate::patch::{self, Joiner, Patch};

/// Tuning knobs for a [`FileBuilder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuilderOptions {
    /// Keep the data file handle open between builds.
    pub keep_data_open: bool,
    /// Initial hunk capacity of the composition buffers.
    pub patch_capacity: usize,
    /// Initial size of the chunk staging buffer.
    pub staging_capacity: usize,
}

impl Default for BuilderOptions {
    fn default() -> Self {
        Self {
            keep_data_open: false,
            patch_capacity: 600,
            staging_capacity: 128,
        }
    }
}

/// Reusable reconstruction state. Buffers grow to the largest chain seen and
/// are kept for the next build.
pub struct FileBuilder {
    acc: Patch,
    spare: Patch,
    parsed: Patch,
    joiner: Joiner,
    data: DataHelper,
    cache: Box<dyn DataCache>,
    out: Vec<u8>,
}

impl Default for FileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of walking a chain: the snapshot plus whether `acc` holds a patch.
struct Chain {
    base: Arc<[u8]>,
    has_patch: bool,
    meta_len: usize,
}

impl FileBuilder {
    pub fn new() -> Self {
        Self::with_options(BuilderOptions::default())
    }

    pub fn with_options(opts: BuilderOptions) -> Self {
        let mut data = DataHelper::new(opts.staging_capacity);
        data.set_keep_open(opts.keep_data_open);
        Self {
            acc: Patch::with_capacity(opts.patch_capacity, 0),
            spare: Patch::with_capacity(opts.patch_capacity, 0),
            parsed: Patch::new(),
            joiner: Joiner::with_capacity(opts.patch_capacity),
            data,
            cache: Box::new(NoCache),
            out: Vec::new(),
        }
    }

    /// Route raw chunk reads through `cache`. The cache is keyed by revision
    /// number and must not be shared with builders of other revlogs.
    pub fn set_data_cache(&mut self, cache: impl DataCache + 'static) {
        self.cache = Box::new(cache);
    }

    /// Keep the data file open after each build until [`close_data`] is
    /// called.
    ///
    /// [`close_data`]: FileBuilder::close_data
    pub fn keep_data_open(&mut self) {
        self.data.set_keep_open(true);
    }

    /// True if the data file stays open between builds.
    pub fn keeps_data_open(&self) -> bool {
        self.data.keep_open()
    }

    /// Close the data file and return to close-after-build behavior.
    pub fn close_data(&mut self) {
        self.data.set_keep_open(false);
        self.data.close();
    }

    pub fn is_data_open(&self) -> bool {
        self.data.is_open()
    }

    /// Text produced by the last successful [`build`](FileBuilder::build);
    /// empty after a failed one.
    pub fn bytes(&self) -> &[u8] {
        &self.out
    }

    /// Read and compose the delta chain of `r`.
    ///
    /// The data file is closed before returning, on success and failure
    /// alike, unless the builder keeps it open.
    pub fn prepare_patch<'a>(
        &'a mut self,
        index: &'a Index,
        r: &'a Record,
    ) -> Result<FilePatch<'a>, RevlogError> {
        let walked = self.walk_chain(index, r);
        if !self.data.keep_open() {
            self.data.close();
        }
        let chain = walked?;
        Ok(FilePatch {
            builder: self,
            index,
            rev: r,
            base: chain.base,
            has_patch: chain.has_patch,
            meta_len: chain.meta_len,
        })
    }

    /// Reconstruct and verify `r`, returning the text.
    pub fn build(&mut self, index: &Index, r: &Record) -> Result<&[u8], RevlogError> {
        self.prepare_patch(index, r)?.apply(None)?;
        Ok(&self.out)
    }

    /// Reconstruct `r` and write it to `w` once verified. Nothing reaches `w`
    /// when reconstruction or verification fails.
    pub fn build_write<W: Write + ?Sized>(
        &mut self,
        w: &mut W,
        index: &Index,
        r: &Record,
    ) -> Result<usize, RevlogError> {
        let n = self.prepare_patch(index, r)?.apply(None)?;
        w.write_all(&self.out)?;
        Ok(n)
    }

    /// Raw bytes of `r`, and whether they came from the cache.
    fn raw_chunk(
        &mut self,
        index: &Index,
        r: &Record,
        rev: usize,
    ) -> Result<(Arc<[u8]>, bool), RevlogError> {
        if let Some(d) = self.cache.get(rev) {
            return Ok((d, true));
        }
        let d: Arc<[u8]> = index.raw_data(r, &mut self.data)?.into();
        self.cache.store(rev, Arc::clone(&d));
        Ok((d, false))
    }

    fn walk_chain(&mut self, index: &Index, target: &Record) -> Result<Chain, RevlogError> {
        if target.is_null() {
            return Ok(Chain {
                base: Arc::from(&[][..]),
                has_patch: false,
                meta_len: 0,
            });
        }

        let mut r = target;
        let mut has_patch = false;
        let (mut deltas, mut hits) = (0usize, 0usize);
        loop {
            let rev = r.pos().ok_or(RevlogError::RevisionNotFound)?;
            let (d, cached) = self.raw_chunk(index, r, rev)?;
            hits += usize::from(cached);

            if r.is_base() {
                let meta_len = if r.rev() == target.rev() && r.is_start_of_branch() {
                    metadata_len(&d)
                } else {
                    0
                };
                log::debug!(
                    "rev {}: {deltas} deltas over snapshot rev {rev}, {hits} cached",
                    target.rev()
                );
                return Ok(Chain {
                    base: d,
                    has_patch,
                    meta_len,
                });
            }

            self.parsed
                .parse_into(&d)
                .map_err(|source| RevlogError::Patch { rev, source })?;
            if has_patch {
                // `acc` covers the newer revisions, `parsed` the one below.
                self.joiner.join(&self.acc, &self.parsed, &mut self.spare);
                std::mem::swap(&mut self.acc, &mut self.spare);
                log::trace!(
                    "rev {rev}: composed, {} hunks",
                    self.acc.hunks().len()
                );
            } else {
                std::mem::swap(&mut self.acc, &mut self.parsed);
                has_patch = true;
            }
            deltas += 1;

            r = index.delta_parent(r).ok_or_else(|| {
                RevlogError::CorruptIndex(format!("rev {rev}: delta chain has no snapshot"))
            })?;
        }
    }
}

/// Length of the `\1\n ... \1\n` metadata block at the start of `d`, or 0.
fn metadata_len(d: &[u8]) -> usize {
    if d.len() > 2 && d.starts_with(b"\x01\n") {
        if let Some(i) = d[2..].windows(2).position(|w| w == b"\x01\n") {
            return i + 4;
        }
    }
    0
}

// ---------------------------------------------------------------------------
// FilePatch
// ---------------------------------------------------------------------------

/// A composed, not yet applied, reconstruction of one revision.
pub struct FilePatch<'a> {
    builder: &'a mut FileBuilder,
    index: &'a Index,
    rev: &'a Record,
    base: Arc<[u8]>,
    has_patch: bool,
    meta_len: usize,
}

impl FilePatch<'_> {
    /// Bytes of metadata header preceding the file content.
    pub fn meta_len(&self) -> usize {
        self.meta_len
    }

    /// Key/value pairs of the metadata header (copy source and the like).
    pub fn metadata(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        if self.meta_len < 4 {
            return map;
        }
        let text = String::from_utf8_lossy(&self.base[2..self.meta_len - 2]);
        for line in text.lines() {
            if let Some((k, v)) = line.split_once(": ") {
                map.insert(k.to_string(), v.to_string());
            }
        }
        map
    }

    /// Apply the composed patch, writing the content to `w` or, when `w` is
    /// `None`, into the builder's output buffer. Returns the content length.
    ///
    /// Output streams to `w` as it is produced; a verification error
    /// therefore may follow bytes already written. The builder's own buffer
    /// is emptied on any error.
    pub fn apply(&mut self, w: Option<&mut dyn Write>) -> Result<usize, RevlogError> {
        let buffered = w.is_none();
        let res = self.apply_to(w);
        if res.is_err() && buffered {
            self.builder.out.clear();
        }
        res
    }

    fn apply_to(&mut self, w: Option<&mut dyn Write>) -> Result<usize, RevlogError> {
        let FileBuilder { acc, out, .. } = &mut *self.builder;
        let r = self.rev;
        let sink: &mut dyn Write = match w {
            Some(w) => w,
            None => {
                out.clear();
                out
            }
        };
        if r.is_null() {
            return Ok(0);
        }
        let rev = r.pos().ok_or(RevlogError::RevisionNotFound)?;

        let mut hasher = self.index.hash_scheme().hasher();
        let [a, b] = sorted_pair(self.index.parent1(r).node(), self.index.parent2(r).node());
        hasher.update(a.as_bytes());
        hasher.update(b.as_bytes());
        hasher.update(&self.base[..self.meta_len]);

        let empty = Patch::new();
        let patch = if self.has_patch { &*acc } else { &empty };
        let n = {
            let mut tee = HashingWriter {
                inner: sink,
                hasher: &mut hasher,
            };
            patch::apply(&mut tee, &self.base, self.meta_len, patch)
                .map_err(|source| RevlogError::Patch { rev, source })?
        };

        let total = self.meta_len + n;
        if total != r.file_len() {
            return Err(RevlogError::LengthMismatch {
                expected: r.file_len(),
                actual: total,
            });
        }
        let actual = hasher.finish();
        if actual != r.node() {
            return Err(RevlogError::HashMismatch {
                rev,
                expected: r.node(),
                actual,
            });
        }
        Ok(n)
    }
}

// ---------------------------------------------------------------------------
// Hashing writer
// ---------------------------------------------------------------------------

/// Tee that feeds everything successfully written into a node hasher.
struct HashingWriter<'a, W: Write + ?Sized> {
    inner: &'a mut W,
    hasher: &'a mut NodeHasher,
}

impl<W: Write + ?Sized> Write for HashingWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
