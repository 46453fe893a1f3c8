// Hunk list decoding and encoding.

use super::{Patch, PatchError};

/// Size of the fixed hunk header: start, end and data length.
pub const HUNK_HEADER_LEN: usize = 12;

impl Patch {
    /// Decode a serialized hunk list into a new patch.
    pub fn parse(bin: &[u8]) -> Result<Self, PatchError> {
        let mut patch = Self::new();
        patch.parse_into(bin)?;
        Ok(patch)
    }

    /// Decode into `self`, replacing its contents but reusing its storage.
    pub fn parse_into(&mut self, bin: &[u8]) -> Result<(), PatchError> {
        self.clear();
        let mut pos = 0usize;
        while pos < bin.len() {
            if bin.len() - pos < HUNK_HEADER_LEN {
                return Err(PatchError::Truncated(pos));
            }
            let start = read_u32(bin, pos);
            let end = read_u32(bin, pos + 4);
            let len = read_u32(bin, pos + 8) as usize;
            let data_at = pos + HUNK_HEADER_LEN;
            if bin.len() - data_at < len {
                return Err(PatchError::Truncated(pos));
            }
            self.push_hunk(start, end, &bin[data_at..data_at + len]);
            pos = data_at + len;
        }
        self.validate()
    }

    /// Serialize in the on-disk hunk format, appending to `out`.
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        for h in &self.hunks {
            let data = self.hunk_data(h);
            out.extend_from_slice(&h.start.to_be_bytes());
            out.extend_from_slice(&h.end.to_be_bytes());
            out.extend_from_slice(&(data.len() as u32).to_be_bytes());
            out.extend_from_slice(data);
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.hunks.len() * HUNK_HEADER_LEN + self.data.len());
        self.encode_into(&mut out);
        out
    }
}

#[inline]
fn read_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
