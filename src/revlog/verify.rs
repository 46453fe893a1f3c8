// Whole-revlog integrity checking.

use super::builder::FileBuilder;
use super::error::RevlogError;
use super::index::Index;

/// Outcome for one revision: its content length, or why it failed.
pub type RevisionCheck = (usize, Result<usize, RevlogError>);

/// Reconstruct and verify every revision of `index` in order.
pub fn verify_all(index: &Index) -> Vec<RevisionCheck> {
    verify_with(index, &mut FileBuilder::new())
}

/// As [`verify_all`], using `fb` and whatever cache it carries. The data
/// file stays open for the run; afterwards it is closed unless `fb` was
/// already set to keep it open.
pub fn verify_with(index: &Index, fb: &mut FileBuilder) -> Vec<RevisionCheck> {
    let kept_open = fb.keeps_data_open();
    fb.keep_data_open();
    let checks = index
        .records()
        .iter()
        .enumerate()
        .map(|(rev, r)| (rev, report(rev, fb.build(index, r).map(<[u8]>::len))))
        .collect();
    if !kept_open {
        fb.close_data();
    }
    checks
}

/// As [`verify_all`], spreading revisions over the rayon thread pool. Each
/// worker reuses one builder of its own.
#[cfg(feature = "parallel")]
pub fn verify_all_parallel(index: &Index) -> Vec<RevisionCheck> {
    use rayon::prelude::*;

    index
        .records()
        .par_iter()
        .enumerate()
        .map_init(
            || {
                let mut fb = FileBuilder::new();
                fb.keep_data_open();
                fb
            },
            |fb, (rev, r)| (rev, report(rev, fb.build(index, r).map(<[u8]>::len))),
        )
        .collect()
}

fn report(rev: usize, res: Result<usize, RevlogError>) -> Result<usize, RevlogError> {
    if let Err(e) = &res {
        log::warn!("rev {rev}: verification failed: {e}");
    }
    res
}

/// Number of failed checks.
pub fn failures(checks: &[RevisionCheck]) -> usize {
    checks.iter().filter(|(_, res)| res.is_err()).count()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
