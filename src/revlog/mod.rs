// Revlog reading.
//
// A revlog stores every revision of one file (or of the manifest or
// changelog) as a delta chain over periodic full snapshots. The index maps
// revision numbers to parents, link revisions and chunk locations; the data
// chunks are read lazily and reassembled by a `FileBuilder`.
//
// # Modules
//
// - `index`  : Index parsing and the per-revision `Record`
// - `data`   : Chunk retrieval and decompression
// - `cache`  : Pluggable cache of decompressed chunks
// - `lookup` : Resolution of revision references
// - `builder`: Delta-chain reconstruction with integrity checks
// - `verify` : Whole-revlog verification

pub mod builder;
pub mod cache;
pub mod data;
pub mod error;
pub mod index;
pub mod lookup;
pub mod verify;

#[cfg(test)]
pub(crate) mod fixture;

pub use builder::{BuilderOptions, FileBuilder, FilePatch};
pub use cache::{DataCache, MemoryCache, NoCache};
pub use data::{DataHelper, DataStore};
pub use error::RevlogError;
pub use index::{Index, IndexFlags, NULL_REV, Record, RevFlags};
pub use lookup::RevisionSpec;
