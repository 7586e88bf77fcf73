//! Durable fingerprint tables (`<archive>.md5sum`).
//!
//! One CSV record per regular file, `path,digest`, sorted by path so the file
//! is deterministic and diffs cleanly between runs.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{LxdeltaError, Result};
use crate::fingerprint::FingerprintTable;
use crate::platform::fs::atomic_write;

/// File name suffix of a persisted fingerprint table.
pub const FINGERPRINT_SUFFIX: &str = ".md5sum";

/// Path of the fingerprint file that belongs to `archive`.
pub fn fingerprint_path(archive: &Path) -> PathBuf {
    let mut name = archive.as_os_str().to_owned();
    name.push(FINGERPRINT_SUFFIX);
    PathBuf::from(name)
}

/// Write `table` to `destination`, replacing any previous content atomically.
pub fn persist(table: &FingerprintTable, destination: &Path) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::with_capacity(table.len() * 96));
    for (path, digest) in table.sorted() {
        writer
            .write_record([path, digest])
            .map_err(|e| csv_error("encode fingerprints for", destination, e))?;
    }
    let data = writer.into_inner().map_err(|e| {
        let io = std::io::Error::new(e.error().kind(), e.error().to_string());
        LxdeltaError::file("encode fingerprints for", destination, io)
    })?;

    atomic_write(destination, &data)?;
    debug!(path = %destination.display(), files = table.len(), "persisted fingerprints");
    Ok(())
}

/// Read a fingerprint table written by [`persist`].
pub fn load(source: &Path) -> Result<FingerprintTable> {
    let mut reader = match csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(source)
    {
        Ok(r) => r,
        Err(e) => {
            if let csv::ErrorKind::Io(io) = e.kind() {
                if io.kind() == std::io::ErrorKind::NotFound {
                    return Err(LxdeltaError::MissingBaseline(source.to_path_buf()));
                }
            }
            return Err(csv_error("open", source, e));
        }
    };

    let mut table = FingerprintTable::new();
    for record in reader.records() {
        let record = record.map_err(|e| csv_error("read", source, e))?;
        if record.len() != 2 {
            return Err(LxdeltaError::MalformedRecord {
                path: source.to_path_buf(),
                line: record.position().map(|p| p.line()).unwrap_or(0),
                fields: record.len(),
            });
        }
        table.insert(&record[0], &record[1]);
    }
    debug!(path = %source.display(), files = table.len(), "loaded fingerprints");
    Ok(table)
}

fn csv_error(action: &'static str, path: &Path, err: csv::Error) -> LxdeltaError {
    match err.into_kind() {
        csv::ErrorKind::Io(io) => LxdeltaError::file(action, path, io),
        other => LxdeltaError::file(
            action,
            path,
            std::io::Error::new(std::io::ErrorKind::InvalidData, format!("{other:?}")),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_path_appends_suffix() {
        let p = fingerprint_path(Path::new("/b/lxd-backup-web-Q20241.tar.zst"));
        assert_eq!(p, Path::new("/b/lxd-backup-web-Q20241.tar.zst.md5sum"));
    }
}
