//! Delta archive construction.
//!
//! A delta holds only the members of the current export whose paths the
//! diff classified as changed or added, copied byte for byte, plus two
//! siblings: `<delta>.removed` (one removed path per line) and
//! `<delta>.<profile>.profile` (the entity's configuration profile).

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::archive::{for_each_member, ArchiveWriter};
use crate::diff::DiffResult;
use crate::error::{LxdeltaError, Result};
use crate::platform::fs::{atomic_write, parent_dir, persist};

pub const REMOVED_SUFFIX: &str = ".removed";
pub const PROFILE_SUFFIX: &str = ".profile";

/// Opaque configuration profile stored next to every archive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Profile {
    pub name: String,
    pub data: String,
}

impl Profile {
    pub fn new(name: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }
}

/// Result of a [`DeltaBuilder::build`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildOutcome {
    /// The destination already existed; nothing was read or written.
    AlreadyPresent,
    Built { members: usize, removed: usize },
}

/// Path of the removal manifest for `archive`.
pub fn removed_manifest_path(archive: &Path) -> PathBuf {
    with_suffix(archive, REMOVED_SUFFIX)
}

/// Path of the profile sidecar for `archive`. Path separators in the profile
/// name are replaced so the sidecar stays next to the archive.
pub fn profile_path(archive: &Path, profile_name: &str) -> PathBuf {
    let safe: String = profile_name
        .chars()
        .map(|c| if c == '/' || c == '\0' { '_' } else { c })
        .collect();
    with_suffix(archive, &format!(".{safe}{PROFILE_SUFFIX}"))
}

/// Write (or overwrite) the profile sidecar of `archive`.
pub fn write_profile(archive: &Path, profile: &Profile) -> Result<()> {
    atomic_write(&profile_path(archive, &profile.name), profile.data.as_bytes())
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

fn removed_manifest(diff: &DiffResult) -> Vec<u8> {
    let mut out = Vec::new();
    for path in &diff.removed {
        out.extend_from_slice(path.as_bytes());
        out.push(b'\n');
    }
    out
}

/// Builds delta archives compressed with zstd at a fixed level.
#[derive(Debug, Clone, Copy)]
pub struct DeltaBuilder {
    zstd_level: i32,
}

impl Default for DeltaBuilder {
    fn default() -> Self {
        Self { zstd_level: 3 }
    }
}

impl DeltaBuilder {
    pub fn new(zstd_level: i32) -> Self {
        Self { zstd_level }
    }

    /// Materialize the delta of `source` at `destination`.
    ///
    /// A no-op when `destination` already exists. Otherwise the archive is
    /// assembled in a temp file; the manifest and profile are written next,
    /// and the archive is moved into place last, so a failure at any step
    /// leaves `destination` absent and the next run retries. Errors carry
    /// the destination as [`LxdeltaError::Bucket`].
    pub fn build(
        &self,
        source: &Path,
        diff: &DiffResult,
        destination: &Path,
        profile: &Profile,
    ) -> Result<BuildOutcome> {
        self.build_inner(destination, |dest| {
            let file = File::open(source).map_err(|e| LxdeltaError::file("open", source, e))?;
            self.write_delta(file, &source.display().to_string(), diff, dest, profile)
        })
    }

    /// Same as [`DeltaBuilder::build`] with the source given as a stream.
    pub fn build_from_reader<R: Read>(
        &self,
        reader: R,
        source_name: &str,
        diff: &DiffResult,
        destination: &Path,
        profile: &Profile,
    ) -> Result<BuildOutcome> {
        self.build_inner(destination, |dest| {
            self.write_delta(reader, source_name, diff, dest, profile)
        })
    }

    fn build_inner<F>(&self, destination: &Path, write: F) -> Result<BuildOutcome>
    where
        F: FnOnce(&Path) -> Result<BuildOutcome>,
    {
        let wrap = |source: LxdeltaError| LxdeltaError::Bucket {
            destination: destination.to_path_buf(),
            source: Box::new(source),
        };

        let exists = destination
            .try_exists()
            .map_err(|e| wrap(LxdeltaError::file("check", destination, e)))?;
        if exists {
            debug!(path = %destination.display(), "delta already present, skipping");
            return Ok(BuildOutcome::AlreadyPresent);
        }
        write(destination).map_err(wrap)
    }

    fn write_delta<R: Read>(
        &self,
        reader: R,
        source_name: &str,
        diff: &DiffResult,
        destination: &Path,
        profile: &Profile,
    ) -> Result<BuildOutcome> {
        debug!(
            path = %destination.display(),
            files = diff.changed_or_added.len(),
            "creating delta backup"
        );

        let mut writer = ArchiveWriter::create_in(parent_dir(destination), self.zstd_level)?;
        for_each_member(reader, source_name, |entry, path| {
            if diff.changed_or_added.contains(path) {
                writer.copy_member(entry, path, source_name)?;
            }
            Ok(())
        })?;
        let members = writer.members();
        let tmp = writer.finish()?;

        atomic_write(&removed_manifest_path(destination), &removed_manifest(diff))?;
        write_profile(destination, profile)?;
        persist(tmp, destination)?;

        info!(
            path = %destination.display(),
            members,
            removed = diff.removed.len(),
            "delta backup written"
        );
        Ok(BuildOutcome::Built {
            members,
            removed: diff.removed.len(),
        })
    }
}
