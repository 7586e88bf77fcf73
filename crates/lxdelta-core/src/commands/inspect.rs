//! Read-only helpers behind the `fingerprint` and `diff` subcommands.

use std::path::{Path, PathBuf};

use crate::baseline::{self, fingerprint_path};
use crate::diff::{diff, DiffResult};
use crate::error::Result;
use crate::fingerprint::{fingerprint_file, FingerprintTable};

/// Fingerprint `archive` and persist the table to `output`, or next to the
/// archive as `<archive>.md5sum` when no output is given.
pub fn fingerprint_archive(
    archive: &Path,
    output: Option<&Path>,
) -> Result<(PathBuf, FingerprintTable)> {
    let table = fingerprint_file(archive)?;
    let destination = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| fingerprint_path(archive));
    baseline::persist(&table, &destination)?;
    Ok((destination, table))
}

/// Compare `archive` against a persisted fingerprint table without writing
/// anything.
pub fn diff_archive(baseline_fingerprints: &Path, archive: &Path) -> Result<DiffResult> {
    let reference = baseline::load(baseline_fingerprints)?;
    let current = fingerprint_file(archive)?;
    Ok(diff(&reference, &current))
}
