// Revision references and their resolution against an index.

use std::fmt;
use std::str::FromStr;

use super::error::RevlogError;
use super::index::{Index, Record};
use crate::node::NodeId;

/// A way of naming one revision of a revlog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevisionSpec {
    /// Local revision number; negative values count back from the end.
    FileRev(i64),
    /// The latest revision whose link rev does not exceed the value.
    LinkRev(i64),
    /// Hex node id or unique hex prefix of one.
    NodeId(String),
    /// The last revision.
    Tip,
    /// The null revision.
    Null,
}

impl RevisionSpec {
    /// Resolve against `index`.
    pub fn lookup<'a>(&self, index: &'a Index) -> Result<&'a Record, RevlogError> {
        match self {
            Self::FileRev(n) => lookup_file_rev(index, *n),
            Self::LinkRev(want) => Ok(lookup_link_rev(index, *want)),
            Self::NodeId(hex) => lookup_node(index, hex),
            Self::Tip => index.tip().ok_or(RevlogError::RevisionNotFound),
            Self::Null => Ok(index.null()),
        }
    }
}

fn lookup_file_rev(index: &Index, n: i64) -> Result<&Record, RevlogError> {
    let n = if n < 0 { n.checked_add(index.len() as i64) } else { Some(n) };
    n.and_then(|n| usize::try_from(n).ok())
        .and_then(|i| index.record(i))
        .ok_or(RevlogError::RevisionNotFound)
}

fn lookup_link_rev(index: &Index, want: i64) -> &Record {
    let records = index.records();
    match records.iter().position(|r| i64::from(r.link_rev()) > want) {
        Some(0) => index.null(),
        Some(j) => &records[j - 1],
        None => index.tip().unwrap_or(index.null()),
    }
}

fn lookup_node<'a>(index: &'a Index, hex: &str) -> Result<&'a Record, RevlogError> {
    let want = NodeId::from_hex(hex)?;
    let mut matches = index.records().iter().filter(|r| r.node().starts_with(&want));
    let found = matches.next().ok_or(RevlogError::RevisionNotFound)?;
    if matches.next().is_some() {
        return Err(RevlogError::RevisionAmbiguous);
    }
    Ok(found)
}

impl FromStr for RevisionSpec {
    type Err = std::convert::Infallible;

    /// `tip`, `null`, a decimal revision number, or else a node id prefix.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "tip" => Self::Tip,
            "null" => Self::Null,
            _ => match s.parse::<i64>() {
                Ok(n) => Self::FileRev(n),
                Err(_) => Self::NodeId(s.to_string()),
            },
        })
    }
}

impl fmt::Display for RevisionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FileRev(n) => write!(f, "{n}"),
            Self::LinkRev(n) => write!(f, "link:{n}"),
            Self::NodeId(hex) => f.write_str(hex),
            Self::Tip => f.write_str("tip"),
            Self::Null => f.write_str("null"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
