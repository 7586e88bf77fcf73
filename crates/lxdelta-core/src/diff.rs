use std::collections::BTreeSet;

use crate::fingerprint::FingerprintTable;

/// Classification of the paths of a current fingerprint table against a
/// baseline. Unchanged paths are not recorded. Both sets iterate in sorted
/// order so emitted manifests are reproducible.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffResult {
    /// Paths whose digest differs from the baseline or that the baseline lacks.
    pub changed_or_added: BTreeSet<String>,
    /// Paths present in the baseline but absent from the current table.
    pub removed: BTreeSet<String>,
}

impl DiffResult {
    /// True when nothing changed; callers record "no changes" instead of
    /// building an empty delta.
    pub fn is_empty(&self) -> bool {
        self.changed_or_added.is_empty() && self.removed.is_empty()
    }

    /// One-line human summary, e.g. `"3 files changed/added, 1 removed."`.
    pub fn summary(&self) -> String {
        if self.is_empty() {
            return "No changes".to_string();
        }
        format!(
            "{} files changed/added, {} removed.",
            self.changed_or_added.len(),
            self.removed.len()
        )
    }
}

/// Compare `current` against `baseline` in one pass over each table.
pub fn diff(baseline: &FingerprintTable, current: &FingerprintTable) -> DiffResult {
    let mut result = DiffResult::default();

    for (path, old_digest) in baseline.iter() {
        match current.get(path) {
            Some(new_digest) if new_digest != old_digest => {
                result.changed_or_added.insert(path.to_string());
            }
            Some(_) => {}
            None => {
                result.removed.insert(path.to_string());
            }
        }
    }

    for (path, _) in current.iter() {
        if !baseline.contains(path) {
            result.changed_or_added.insert(path.to_string());
        }
    }

    result
}
