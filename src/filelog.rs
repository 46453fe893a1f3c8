// File presence at an outer (changeset) revision.
//
// A filelog only records the changesets in which a file changed. Deciding
// whether the file exists at some other changeset normally means reading
// that changeset's manifest; `lookup_file` avoids this whenever the filelog
// alone is conclusive and only then asks the caller for the manifest entry.

use crate::node::{NodeId, NodeIdError};
use crate::revlog::{FileBuilder, Index, Record, RevisionSpec, RevlogError};

/// One line of a manifest: a path and the node id of its file revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub path: String,
    pub node_hex: String,
    /// `l` (symlink), `x` (executable), or empty.
    pub flags: String,
}

impl ManifestEntry {
    pub fn node_id(&self) -> Result<NodeId, NodeIdError> {
        NodeId::from_hex(&self.node_hex)
    }

    /// Parse `path\0<hex node><flags>`, without the trailing newline.
    pub fn parse_line(line: &[u8]) -> Option<Self> {
        let nul = line.iter().position(|&b| b == 0)?;
        let path = std::str::from_utf8(&line[..nul]).ok()?;
        let rest = std::str::from_utf8(&line[nul + 1..]).ok()?;
        let hex_len = rest.bytes().take_while(u8::is_ascii_hexdigit).count();
        let (hex, flags) = rest.split_at(hex_len);
        Some(Self {
            path: path.to_string(),
            node_hex: hex.to_string(),
            flags: flags.to_string(),
        })
    }
}

/// Entry for `path` in the manifest text `manifest`.
pub fn find_manifest_entry(manifest: &[u8], path: &str) -> Result<ManifestEntry, RevlogError> {
    manifest
        .split(|&b| b == b'\n')
        .filter_map(ManifestEntry::parse_line)
        .find(|e| e.path == path)
        .ok_or_else(|| RevlogError::FileNotInManifest(path.to_string()))
}

/// Node id of the manifest recorded by changeset `outer_rev`: the hex id on
/// the first line of its changelog entry.
pub fn changeset_manifest_node(
    changelog: &Index,
    outer_rev: i64,
    fb: &mut FileBuilder,
) -> Result<NodeId, RevlogError> {
    let r = RevisionSpec::FileRev(outer_rev).lookup(changelog)?;
    let rev = r.pos().ok_or(RevlogError::RevisionNotFound)?;
    let text = fb.build(changelog, r)?;
    let line = text.split(|&b| b == b'\n').next().unwrap_or_default();
    let hex = std::str::from_utf8(line)
        .ok()
        .filter(|h| !h.is_empty())
        .ok_or(RevlogError::MalformedChangeset { rev })?;
    Ok(NodeId::from_hex(hex)?)
}

/// Entry for `path` in the manifest revision with node id `manifest_node`.
pub fn manifest_entry_at(
    manifest: &Index,
    manifest_node: NodeId,
    path: &str,
    fb: &mut FileBuilder,
) -> Result<ManifestEntry, RevlogError> {
    let r = RevisionSpec::NodeId(manifest_node.to_hex()).lookup(manifest)?;
    let text = fb.build(manifest, r)?;
    find_manifest_entry(text, path)
}

/// Entry for `path` in the manifest of changeset `outer_rev`.
pub fn changeset_manifest_entry(
    changelog: &Index,
    manifest: &Index,
    outer_rev: i64,
    path: &str,
) -> Result<ManifestEntry, RevlogError> {
    let mut fb = FileBuilder::new();
    let node = changeset_manifest_node(changelog, outer_rev, &mut fb)?;
    log::debug!("changeset {outer_rev}: manifest {}", node.short());
    manifest_entry_at(manifest, node, path, &mut fb)
}

/// Find the revision of the file that is current at outer revision
/// `outer_rev`.
///
/// `manifest_entry` is called at most once, and only when the filelog cannot
/// settle the question: the latest revision at or before `outer_rev` was
/// not created by `outer_rev` itself and has descendants, so the file may
/// have been removed in between.
///
/// A node mismatch with the manifest is reported as
/// [`RevlogError::ManifestMismatch`], not as absence; the caller decides
/// what it means.
pub fn lookup_file<F>(
    index: &Index,
    outer_rev: i64,
    manifest_entry: F,
) -> Result<&Record, RevlogError>
where
    F: FnOnce() -> Result<ManifestEntry, RevlogError>,
{
    let r = RevisionSpec::LinkRev(outer_rev).lookup(index)?;
    if r.is_null() {
        return Err(RevlogError::RevisionNotFound);
    }
    if i64::from(r.link_rev()) == outer_rev {
        return Ok(r);
    }
    if r.is_leaf() {
        log::debug!(
            "rev {} (link {}) is a leaf; assuming present at {outer_rev}",
            r.rev(),
            r.link_rev()
        );
        return Ok(r);
    }

    log::debug!("rev {}: consulting manifest of {outer_rev}", r.rev());
    let manifest = manifest_entry()?.node_id()?;
    if manifest != r.node() {
        return Err(RevlogError::ManifestMismatch {
            manifest,
            file: r.node(),
        });
    }
    Ok(r)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
