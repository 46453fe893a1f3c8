// Node ids and hash schemes.
//
// A node id is the digest identifying one revision of a revlog. Revlog v1
// stores ids in 32-byte slots of which SHA-1 uses the first 20. Hex text can
// name a full id or any (even-length) prefix of one.

use std::fmt;
use std::io::{self, Write};

use sha1::Digest;

/// Largest node id the index format has room for.
pub const MAX_NODE_LEN: usize = 32;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NodeIdError {
    #[error("node id: odd number of hex digits ({0})")]
    OddLength(usize),
    #[error("node id: too long ({0} hex digits, max {max})", max = MAX_NODE_LEN * 2)]
    TooLong(usize),
    #[error("node id: invalid hex character {0:?}")]
    InvalidChar(char),
}

// ---------------------------------------------------------------------------
// NodeId
// ---------------------------------------------------------------------------

/// A revision digest, or a prefix of one.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    bytes: [u8; MAX_NODE_LEN],
    len: u8,
}

impl NodeId {
    /// The all-zero id of `len` bytes naming the null revision.
    pub const fn null(len: usize) -> Self {
        Self {
            bytes: [0; MAX_NODE_LEN],
            len: len as u8,
        }
    }

    /// Build an id from raw digest bytes. Longer input is truncated to
    /// [`MAX_NODE_LEN`].
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let len = bytes.len().min(MAX_NODE_LEN);
        let mut id = Self::null(len);
        id.bytes[..len].copy_from_slice(&bytes[..len]);
        id
    }

    /// Parse hexadecimal text (upper or lower case).
    pub fn from_hex(hex: &str) -> Result<Self, NodeIdError> {
        let digits = hex.as_bytes();
        if digits.len() % 2 != 0 {
            return Err(NodeIdError::OddLength(digits.len()));
        }
        if digits.len() > MAX_NODE_LEN * 2 {
            return Err(NodeIdError::TooLong(digits.len()));
        }
        let mut id = Self::null(digits.len() / 2);
        for (i, pair) in digits.chunks_exact(2).enumerate() {
            id.bytes[i] = (nibble(pair[0])? << 4) | nibble(pair[1])?;
        }
        Ok(id)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_null(&self) -> bool {
        self.as_bytes().iter().all(|&b| b == 0)
    }

    /// True if `prefix` is no longer than `self` and equals its leading bytes.
    pub fn starts_with(&self, prefix: &NodeId) -> bool {
        self.as_bytes().starts_with(prefix.as_bytes())
    }

    pub fn to_hex(&self) -> String {
        const HEX_CHARS: &[u8] = b"0123456789abcdef";
        let mut hex = String::with_capacity(self.len() * 2);
        for &byte in self.as_bytes() {
            hex.push(HEX_CHARS[(byte >> 4) as usize] as char);
            hex.push(HEX_CHARS[(byte & 0xf) as usize] as char);
        }
        hex
    }

    /// The 12-digit abbreviation used in listings.
    pub fn short(&self) -> String {
        let mut hex = self.to_hex();
        hex.truncate(12);
        hex
    }
}

fn nibble(c: u8) -> Result<u8, NodeIdError> {
    match c {
        b'0'..=b'9' => Ok(c - b'0'),
        b'a'..=b'f' => Ok(c - b'a' + 10),
        b'A'..=b'F' => Ok(c - b'A' + 10),
        _ => Err(NodeIdError::InvalidChar(c as char)),
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.to_hex())
    }
}

impl std::str::FromStr for NodeId {
    type Err = NodeIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

/// Return `a` and `b` in ascending byte order, the order in which parent ids
/// enter a node hash.
pub fn sorted_pair(a: NodeId, b: NodeId) -> [NodeId; 2] {
    if b.as_bytes() < a.as_bytes() {
        [b, a]
    } else {
        [a, b]
    }
}

// ---------------------------------------------------------------------------
// Hash schemes
// ---------------------------------------------------------------------------

/// Digest algorithm producing the node ids of one revlog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HashScheme {
    /// Revlog v1: SHA-1, 20-byte ids.
    #[default]
    Sha1,
    /// SHA-256 filling the whole 32-byte id slot.
    Sha256,
}

impl HashScheme {
    pub const fn node_len(self) -> usize {
        match self {
            Self::Sha1 => 20,
            Self::Sha256 => 32,
        }
    }

    /// A fresh streaming accumulator.
    pub fn hasher(self) -> NodeHasher {
        match self {
            Self::Sha1 => NodeHasher::Sha1(sha1::Sha1::new()),
            Self::Sha256 => NodeHasher::Sha256(sha2::Sha256::new()),
        }
    }

    /// Node id of `text` with parents `p1`, `p2`.
    pub fn node_id(self, p1: NodeId, p2: NodeId, text: &[u8]) -> NodeId {
        let mut h = self.hasher();
        for id in sorted_pair(p1, p2) {
            h.update(id.as_bytes());
        }
        h.update(text);
        h.finish()
    }
}

/// Streaming node hash. Implements `Write` so it can sit behind a tee.
pub enum NodeHasher {
    Sha1(sha1::Sha1),
    Sha256(sha2::Sha256),
}

impl NodeHasher {
    pub fn update(&mut self, data: &[u8]) {
        match self {
            Self::Sha1(h) => h.update(data),
            Self::Sha256(h) => h.update(data),
        }
    }

    pub fn finish(self) -> NodeId {
        match self {
            Self::Sha1(h) => NodeId::from_bytes(&h.finalize()),
            Self::Sha256(h) => NodeId::from_bytes(&h.finalize()),
        }
    }
}

impl Write for NodeHasher {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
