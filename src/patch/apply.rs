// Patch application.

use std::io::Write;

use super::{Patch, PatchError};

/// Apply `patch` to `base`, writing the result from `offset` onward to `w`.
///
/// Bytes of `base` before `offset` are not emitted; no hunk may start before
/// it. Returns the number of bytes written.
pub fn apply<W: Write + ?Sized>(
    w: &mut W,
    base: &[u8],
    offset: usize,
    patch: &Patch,
) -> Result<usize, PatchError> {
    let mut pos = offset;
    let mut n = 0usize;

    for h in patch.hunks() {
        let (start, end) = (h.start as usize, h.end as usize);
        if start < pos {
            return Err(PatchError::BeforeOffset {
                start: h.start,
                offset: pos,
            });
        }
        if start > end {
            return Err(PatchError::InvertedHunk {
                start: h.start,
                end: h.end,
            });
        }
        if end > base.len() {
            return Err(PatchError::OutOfBounds {
                start: h.start,
                end: h.end,
                base_len: base.len(),
            });
        }
        let data = patch.hunk_data(h);
        w.write_all(&base[pos..start])?;
        w.write_all(data)?;
        n += (start - pos) + data.len();
        pos = end;
    }

    if pos > base.len() {
        return Err(PatchError::OutOfBounds {
            start: pos as u32,
            end: pos as u32,
            base_len: base.len(),
        });
    }
    w.write_all(&base[pos..])?;
    n += base.len() - pos;
    Ok(n)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
