// Revlog error type.

use crate::node::{NodeId, NodeIdError};
use crate::patch::PatchError;

#[derive(Debug, thiserror::Error)]
pub enum RevlogError {
    #[error("revlog: revision not found")]
    RevisionNotFound,

    #[error("revlog: ambiguous node prefix")]
    RevisionAmbiguous,

    #[error(transparent)]
    InvalidNodeId(#[from] NodeIdError),

    #[error("rev {rev}: {source}")]
    Patch {
        rev: usize,
        #[source]
        source: PatchError,
    },

    #[error("revlog: length of computed file differs from the expected value: {actual} != {expected}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("revlog: hash mismatch: internal error or corrupted data (rev {rev}, expected {expected}, got {actual})")]
    HashMismatch {
        rev: usize,
        expected: NodeId,
        actual: NodeId,
    },

    #[error("manifest node id {manifest} does not match file id {file}")]
    ManifestMismatch { manifest: NodeId, file: NodeId },

    #[error("changeset {rev}: entry does not start with a manifest node id")]
    MalformedChangeset { rev: usize },

    #[error("file does not exist in given revision: {0}")]
    FileNotInManifest(String),

    #[error("rev {rev}: get data: {source}")]
    Data {
        rev: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("rev {rev}: unknown chunk compression {kind:#04x}")]
    UnknownCompression { rev: usize, kind: u8 },

    #[error("revlog: unsupported version {0}")]
    UnsupportedVersion(u16),

    #[error("revlog: corrupt index: {0}")]
    CorruptIndex(String),

    #[error("revlog: I/O error: {0}")]
    Io(#[from] std::io::Error),
}
