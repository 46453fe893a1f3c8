//! hgrevlog: read Mercurial revlogs and reconstruct verified revisions.
//!
//! The crate provides:
//! - Revlog index parsing, revision resolution and delta-chain
//!   reconstruction with length and hash verification (`revlog`)
//! - The binary hunk patch format: parse, compose, apply (`patch`)
//! - Node ids and the hash schemes producing them (`node`)
//! - File presence at a changeset with lazy manifest lookup (`filelog`)
//! - An optional CLI (`cli` feature)
//!
//! # Quick Start
//!
//! ```no_run
//! use hgrevlog::revlog::{FileBuilder, Index, RevisionSpec};
//!
//! let index = Index::open(".hg/store/data/README.i").unwrap();
//! let r = RevisionSpec::Tip.lookup(&index).unwrap();
//! let mut fb = FileBuilder::new();
//! let text = fb.build(&index, r).unwrap();
//! println!("{} bytes at rev {}", text.len(), r.rev());
//! ```

pub mod filelog;
pub mod node;
pub mod patch;
pub mod revlog;

#[cfg(feature = "cli")]
pub mod cli;
