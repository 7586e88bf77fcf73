use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::NaiveDate;

use crate::retention::{BucketKey, Granularity};

pub const ARCHIVE_EXTENSION: &str = ".tar.zst";
pub const DEFAULT_PREFIX: &str = "lxd-backup-";
const TEMP_EXPORT_PREFIX: &str = "lxd-temporary-backup-";

/// File naming inside the backup target directory:
///
/// ```text
/// <prefix><entity>-Q<year><quarter>.tar.zst   quarterly baseline
/// <prefix><entity>-M<month>-delta.tar.zst     month slot
/// <prefix><entity>-WN<week%4>-delta.tar.zst   week slot
/// <prefix><entity>-WD<weekday>-delta.tar.zst  day slot
/// <prefix><entity>.log                        last status line
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupLayout {
    target: PathBuf,
    prefix: String,
}

impl BackupLayout {
    pub fn new(target: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            prefix: prefix.into(),
        }
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn bucket_path(&self, entity: &str, key: &BucketKey) -> PathBuf {
        self.target
            .join(format!("{}{entity}-{key}{ARCHIVE_EXTENSION}", self.prefix))
    }

    /// Baseline archive for the quarter containing `date`.
    pub fn baseline_path(&self, entity: &str, date: NaiveDate) -> PathBuf {
        self.bucket_path(entity, &BucketKey::for_date(Granularity::Quarter, date))
    }

    pub fn status_log_path(&self, entity: &str) -> PathBuf {
        self.target.join(format!("{}{entity}.log", self.prefix))
    }

    /// A fresh, unique path for a throwaway export.
    pub fn temp_export_path(&self) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        self.target
            .join(format!("{TEMP_EXPORT_PREFIX}{nanos}{ARCHIVE_EXTENSION}"))
    }
}
