use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

use crate::error::{LxdeltaError, Result};

/// Permission bits given to every artifact once it is in place.
pub const ARTIFACT_MODE: u32 = 0o644;

/// Write `data` to a temp file in the destination directory, then atomically
/// rename it over `path`. Readers never observe a partially written file.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    let dir = parent_dir(path);
    let mut tmp = NamedTempFile::new_in(dir)
        .map_err(|e| LxdeltaError::file("create temp file in", dir, e))?;
    tmp.write_all(data)
        .map_err(|e| LxdeltaError::file("write", tmp.path(), e))?;
    persist(tmp, path)
}

/// Move a finished temp file to its final name, replacing whatever is there.
pub fn persist(tmp: NamedTempFile, path: &Path) -> Result<()> {
    tmp.persist(path)
        .map_err(|e| LxdeltaError::file("move into place", path, e.error))?;
    apply_mode(path, ARTIFACT_MODE).map_err(|e| LxdeltaError::file("set mode of", path, e))
}

/// Rename a file produced outside this crate (e.g. a finished export) to its
/// final name in the same directory.
pub fn rename_into_place(from: &Path, to: &Path) -> Result<()> {
    std::fs::rename(from, to).map_err(|e| LxdeltaError::file("move into place", to, e))?;
    apply_mode(to, ARTIFACT_MODE).map_err(|e| LxdeltaError::file("set mode of", to, e))
}

/// Delete a file, treating "already gone" as success. Returns whether a file
/// was actually removed.
pub fn remove_if_exists(path: &Path) -> Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(LxdeltaError::file("remove", path, e)),
    }
}

pub fn apply_mode(path: &Path, mode: u32) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
    }

    #[cfg(not(unix))]
    {
        let _ = (path, mode);
        Ok(())
    }
}

/// Directory a file lives in; bare file names resolve to the current directory.
pub fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}
