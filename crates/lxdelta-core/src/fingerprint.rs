use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use md5::{Digest, Md5};
use tracing::{debug, info};

use crate::archive::for_each_member;
use crate::error::{LxdeltaError, Result};

/// Content digests of the regular-file members of one archive, keyed by
/// archive path. Digests are lowercase hex MD5.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FingerprintTable {
    entries: HashMap<String, String>,
}

impl FingerprintTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a digest, returning the previous one if the path was already present.
    pub fn insert(&mut self, path: impl Into<String>, digest: impl Into<String>) -> Option<String> {
        self.entries.insert(path.into(), digest.into())
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.entries.get(path).map(String::as_str)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Unordered iteration over `(path, digest)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(p, d)| (p.as_str(), d.as_str()))
    }

    /// Entries in canonical (byte-wise path) order.
    pub fn sorted(&self) -> Vec<(&str, &str)> {
        let mut out: Vec<(&str, &str)> = self.iter().collect();
        out.sort_unstable_by(|a, b| a.0.cmp(b.0));
        out
    }
}

impl<P: Into<String>, D: Into<String>> FromIterator<(P, D)> for FingerprintTable {
    fn from_iter<I: IntoIterator<Item = (P, D)>>(iter: I) -> Self {
        let mut table = FingerprintTable::new();
        for (path, digest) in iter {
            table.insert(path, digest);
        }
        table
    }
}

/// Fingerprint a `.tar.zst` archive on disk.
pub fn fingerprint_file(path: &Path) -> Result<FingerprintTable> {
    let file = File::open(path).map_err(|e| LxdeltaError::file("open", path, e))?;
    fingerprint_reader(file, &path.display().to_string())
}

/// Fingerprint a compressed archive stream positioned at its start.
///
/// Every regular-file payload is fed through an MD5 accumulator as it is
/// read; other members are skipped unread. `source` names the stream in
/// errors.
pub fn fingerprint_reader<R: Read>(reader: R, source: &str) -> Result<FingerprintTable> {
    debug!(archive = source, "calculating fingerprints");
    let mut table = FingerprintTable::new();

    for_each_member(reader, source, |entry, path| {
        if !entry.header().entry_type().is_file() {
            return Ok(());
        }
        let expected = entry.size();
        let mut hasher = Md5::new();
        let actual =
            std::io::copy(entry, &mut hasher).map_err(|e| LxdeltaError::corrupt(source, e))?;
        if actual != expected {
            return Err(LxdeltaError::TruncatedMember {
                archive: source.to_string(),
                member: path.to_string(),
                expected,
                actual,
            });
        }
        table.insert(path, hex::encode(hasher.finalize()));
        Ok(())
    })?;

    info!(archive = source, files = table.len(), "calculated fingerprints");
    Ok(table)
}
