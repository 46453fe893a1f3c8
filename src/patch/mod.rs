// Binary patches in the revlog hunk format.
//
// A patch is a sorted list of hunks, each replacing the byte range
// `start..end` of the text it applies to with new data. On disk a hunk is
// three big-endian u32 values (start, end, data length) followed by the data.
//
// # Modules
//
// - `parse`: Decoding (and encoding) of the serialized hunk list
// - `join` : Composition of two patches into one equivalent patch
// - `apply`: Streaming application of a patch to a base text

pub mod apply;
pub mod join;
pub mod parse;

use std::ops::Range;

pub use apply::apply;
pub use join::Joiner;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum PatchError {
    #[error("patch: truncated hunk at offset {0}")]
    Truncated(usize),
    #[error("patch: hunk {start}..{end} is inverted")]
    InvertedHunk { start: u32, end: u32 },
    #[error("patch: hunk at {start} overlaps previous hunk ending at {prev_end}")]
    Unordered { start: u32, prev_end: u32 },
    #[error("patch: hunk {start}..{end} exceeds base length {base_len}")]
    OutOfBounds { start: u32, end: u32, base_len: usize },
    #[error("patch: hunk at {start} precedes apply offset {offset}")]
    BeforeOffset { start: u32, offset: usize },
    #[error("patch: write failed: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Hunk / Patch
// ---------------------------------------------------------------------------

/// One range replacement. `data` indexes into the owning patch's data buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hunk {
    pub start: u32,
    pub end: u32,
    pub data: Range<usize>,
}

impl Hunk {
    /// Number of base bytes this hunk removes.
    pub fn removed(&self) -> usize {
        (self.end - self.start) as usize
    }
}

/// An owned hunk list. Storage is reused across `clear()` so a patch can
/// serve as scratch space for repeated parsing and composition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Patch {
    hunks: Vec<Hunk>,
    data: Vec<u8>,
}

impl Patch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-size for `hunks` hunks and `data` bytes of replacement data.
    pub fn with_capacity(hunks: usize, data: usize) -> Self {
        Self {
            hunks: Vec::with_capacity(hunks),
            data: Vec::with_capacity(data),
        }
    }

    pub fn clear(&mut self) {
        self.hunks.clear();
        self.data.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.hunks.is_empty()
    }

    pub fn hunks(&self) -> &[Hunk] {
        &self.hunks
    }

    /// Replacement bytes of `hunk`, which must belong to this patch.
    pub fn hunk_data(&self, hunk: &Hunk) -> &[u8] {
        &self.data[hunk.data.clone()]
    }

    /// Append a hunk. Hunks must be pushed in ascending, non-overlapping
    /// order; [`Patch::validate`] checks this.
    pub fn push_hunk(&mut self, start: u32, end: u32, data: &[u8]) {
        let from = self.data.len();
        self.data.extend_from_slice(data);
        self.hunks.push(Hunk {
            start,
            end,
            data: from..self.data.len(),
        });
    }

    /// Check the ordering invariants of the hunk list.
    pub fn validate(&self) -> Result<(), PatchError> {
        let mut prev_end = 0u32;
        for h in &self.hunks {
            if h.start > h.end {
                return Err(PatchError::InvertedHunk {
                    start: h.start,
                    end: h.end,
                });
            }
            if h.start < prev_end {
                return Err(PatchError::Unordered {
                    start: h.start,
                    prev_end,
                });
            }
            prev_end = h.end;
        }
        Ok(())
    }

    /// Change in length the patch causes when applied.
    pub fn size_delta(&self) -> isize {
        self.hunks
            .iter()
            .map(|h| h.data.len() as isize - h.removed() as isize)
            .sum()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
