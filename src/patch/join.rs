// Patch composition.
//
// Joining an older patch A (base -> mid) with a newer patch B (mid -> final)
// yields one patch C (base -> final) with apply(C) == apply(B) after apply(A).
//
// The middle text is modelled as a list of pieces, each either a range of the
// base text or a run of inserted bytes. A's hunks produce the pieces; B's
// hunks cut and splice them; the surviving pieces are turned back into hunks
// against the base. Nothing ever needs the base length: the last piece is an
// open-ended base range.

use super::Patch;

/// End marker of the trailing, unbounded base piece.
const OPEN_END: usize = usize::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Older,
    Newer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Piece {
    /// `start..end` of the base text; `end` may be [`OPEN_END`].
    Base { start: usize, end: usize },
    /// `start..end` of the data buffer of the `src` patch.
    Insert { src: Source, start: usize, end: usize },
}

impl Piece {
    fn len(&self) -> usize {
        match *self {
            Piece::Base { end: OPEN_END, .. } => OPEN_END,
            Piece::Base { start, end } | Piece::Insert { start, end, .. } => end - start,
        }
    }

    /// The sub-piece covering `from..to` (relative to the piece start).
    fn slice(&self, from: usize, to: usize) -> Piece {
        match *self {
            Piece::Base { start, end } => Piece::Base {
                start: start + from,
                end: if to == OPEN_END { end } else { start + to },
            },
            Piece::Insert { src, start, .. } => Piece::Insert {
                src,
                start: start + from,
                end: start + to,
            },
        }
    }
}

/// Reusable workspace for composing patches.
///
/// Holds the piece buffers between calls so that composing along a long
/// delta chain does not allocate once the buffers have grown.
#[derive(Debug, Default)]
pub struct Joiner {
    mid: Vec<Piece>,
    out: Vec<Piece>,
}

impl Joiner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-size the piece buffers for patches of about `hunks` hunks.
    pub fn with_capacity(hunks: usize) -> Self {
        Self {
            mid: Vec::with_capacity(hunks * 2 + 1),
            out: Vec::with_capacity(hunks * 4 + 1),
        }
    }

    /// Compose `older` followed by `newer` into `out`.
    ///
    /// `out` is cleared first. Both inputs must satisfy the hunk ordering
    /// invariants (see [`Patch::validate`]).
    pub fn join(&mut self, newer: &Patch, older: &Patch, out: &mut Patch) {
        self.layout_mid(older);
        self.splice(newer);
        self.emit(newer, older, out);
    }

    /// Describe the text produced by `older` as pieces.
    fn layout_mid(&mut self, older: &Patch) {
        self.mid.clear();
        let mut pos = 0usize;
        for h in older.hunks() {
            let start = h.start as usize;
            if start > pos {
                self.mid.push(Piece::Base { start: pos, end: start });
            }
            if !h.data.is_empty() {
                self.mid.push(Piece::Insert {
                    src: Source::Older,
                    start: h.data.start,
                    end: h.data.end,
                });
            }
            pos = h.end as usize;
        }
        self.mid.push(Piece::Base {
            start: pos,
            end: OPEN_END,
        });
    }

    /// Apply the hunks of `newer` to the middle pieces.
    fn splice(&mut self, newer: &Patch) {
        self.out.clear();
        let mut cursor = Cursor::default();
        let mut mid_pos = 0usize;

        for h in newer.hunks() {
            let (start, end) = (h.start as usize, h.end as usize);
            cursor.take(&self.mid, start.saturating_sub(mid_pos), &mut self.out);
            cursor.skip(&self.mid, end.saturating_sub(start));
            if !h.data.is_empty() {
                self.out.push(Piece::Insert {
                    src: Source::Newer,
                    start: h.data.start,
                    end: h.data.end,
                });
            }
            mid_pos = end;
        }
        cursor.rest(&self.mid, &mut self.out);
    }

    /// Turn the spliced pieces back into hunks against the base.
    fn emit(&self, newer: &Patch, older: &Patch, out: &mut Patch) {
        out.clear();
        let mut pos = 0usize;
        let mut hunk_data = out.data.len();

        for piece in &self.out {
            match *piece {
                Piece::Insert { src, start, end } => {
                    let from = match src {
                        Source::Older => &older.data,
                        Source::Newer => &newer.data,
                    };
                    out.data.extend_from_slice(&from[start..end]);
                }
                Piece::Base { start, end } => {
                    if start != pos || out.data.len() != hunk_data {
                        out.hunks.push(super::Hunk {
                            start: pos as u32,
                            end: start as u32,
                            data: hunk_data..out.data.len(),
                        });
                    }
                    if end == OPEN_END {
                        return;
                    }
                    pos = end;
                    hunk_data = out.data.len();
                }
            }
        }
    }
}

/// Read position within a piece list.
#[derive(Debug, Default)]
struct Cursor {
    piece: usize,
    offset: usize,
}

impl Cursor {
    /// Copy the next `n` bytes worth of pieces to `out`.
    fn take(&mut self, pieces: &[Piece], mut n: usize, out: &mut Vec<Piece>) {
        while n > 0 {
            let Some(p) = pieces.get(self.piece) else {
                return;
            };
            let avail = p.len() - self.offset;
            let c = n.min(avail);
            out.push(p.slice(self.offset, self.offset + c));
            self.advance(p, c);
            n -= c;
        }
    }

    /// Drop the next `n` bytes worth of pieces.
    fn skip(&mut self, pieces: &[Piece], mut n: usize) {
        while n > 0 {
            let Some(p) = pieces.get(self.piece) else {
                return;
            };
            let c = n.min(p.len() - self.offset);
            self.advance(p, c);
            n -= c;
        }
    }

    /// Copy everything from the cursor to the end of the list.
    fn rest(&mut self, pieces: &[Piece], out: &mut Vec<Piece>) {
        if let Some(p) = pieces.get(self.piece) {
            out.push(p.slice(self.offset, p.len()));
            out.extend_from_slice(&pieces[self.piece + 1..]);
        }
        self.piece = pieces.len();
        self.offset = 0;
    }

    fn advance(&mut self, p: &Piece, c: usize) {
        self.offset += c;
        if p.len() != OPEN_END && self.offset == p.len() {
            self.piece += 1;
            self.offset = 0;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
