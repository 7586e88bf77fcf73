//! Calendar buckets and their rotation.
//!
//! Each entity has one quarterly baseline plus three delta slots keyed by
//! month, week-of-month (ISO week mod 4) and weekday. A slot is deleted when
//! its period rolls over and rebuilt the next time changes are found, giving
//! roughly 12 monthly, 4 weekly and 7 daily deltas at any time. Every delta is
//! taken against the quarterly baseline, so the same change can appear in
//! several tiers at once.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{Datelike, Days, NaiveDate, Weekday};
use tracing::debug;

use crate::delta::{removed_manifest_path, PROFILE_SUFFIX};
use crate::error::{LxdeltaError, Result};
use crate::platform::fs::{parent_dir, remove_if_exists};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Granularity {
    Quarter,
    Month,
    Week,
    Day,
}

impl Granularity {
    /// Delta tiers in the order they are built, coarsest first.
    pub const DELTAS: [Granularity; 3] = [Granularity::Month, Granularity::Week, Granularity::Day];

    pub fn as_str(self) -> &'static str {
        match self {
            Granularity::Quarter => "quarter",
            Granularity::Month => "month",
            Granularity::Week => "week",
            Granularity::Day => "day",
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Period key of one bucket. Displays as the file name component, e.g.
/// `Q20243`, `M7-delta`, `WN2-delta`, `WD0-delta`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BucketKey {
    Quarter { year: i32, quarter: u32 },
    Month { month: u32 },
    Week { slot: u32 },
    Day { weekday: u32 },
}

impl BucketKey {
    /// Key of the period containing `date`, with weeks starting on Monday.
    pub fn for_date(granularity: Granularity, date: NaiveDate) -> Self {
        Self::for_date_with_rollover(granularity, date, Weekday::Mon)
    }

    /// Same as [`BucketKey::for_date`] with weeks starting on `week_start`.
    /// The week slot is the ISO week of `date` shifted back so `week_start`
    /// lands on Monday, so every slot spans exactly the days between two
    /// rollovers.
    pub fn for_date_with_rollover(
        granularity: Granularity,
        date: NaiveDate,
        week_start: Weekday,
    ) -> Self {
        match granularity {
            Granularity::Quarter => BucketKey::Quarter {
                year: date.year(),
                quarter: (date.month() - 1) / 3 + 1,
            },
            Granularity::Month => BucketKey::Month {
                month: date.month(),
            },
            Granularity::Week => {
                let shifted = date
                    .checked_sub_days(Days::new(u64::from(week_start.num_days_from_monday())))
                    .unwrap_or(date);
                BucketKey::Week {
                    slot: shifted.iso_week().week() % 4,
                }
            }
            Granularity::Day => BucketKey::Day {
                weekday: date.weekday().num_days_from_sunday(),
            },
        }
    }

    pub fn granularity(&self) -> Granularity {
        match self {
            BucketKey::Quarter { .. } => Granularity::Quarter,
            BucketKey::Month { .. } => Granularity::Month,
            BucketKey::Week { .. } => Granularity::Week,
            BucketKey::Day { .. } => Granularity::Day,
        }
    }
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BucketKey::Quarter { year, quarter } => write!(f, "Q{year}{quarter}"),
            BucketKey::Month { month } => write!(f, "M{month}-delta"),
            BucketKey::Week { slot } => write!(f, "WN{slot}-delta"),
            BucketKey::Day { weekday } => write!(f, "WD{weekday}-delta"),
        }
    }
}

/// Decides which delta slots expire on a given day and deletes them.
#[derive(Debug, Clone, Copy)]
pub struct RetentionRotator {
    week_rollover: Weekday,
}

impl Default for RetentionRotator {
    fn default() -> Self {
        Self {
            week_rollover: Weekday::Mon,
        }
    }
}

impl RetentionRotator {
    pub fn new(week_rollover: Weekday) -> Self {
        Self { week_rollover }
    }

    /// Key of the slot `granularity` uses on `date`.
    pub fn key(&self, granularity: Granularity, date: NaiveDate) -> BucketKey {
        BucketKey::for_date_with_rollover(granularity, date, self.week_rollover)
    }

    /// Tiers whose current slot must be evicted on `date`: the day slot every
    /// run, the week slot on the rollover weekday, the month slot on the 1st.
    pub fn evictions(&self, date: NaiveDate) -> Vec<Granularity> {
        let mut out = Vec::with_capacity(3);
        if date.day() == 1 {
            out.push(Granularity::Month);
        }
        if date.weekday() == self.week_rollover {
            out.push(Granularity::Week);
        }
        out.push(Granularity::Day);
        out
    }

    /// Evict every slot due on `date`. `slot_path` maps a bucket key to the
    /// delta archive path of the entity being processed. Returns the files
    /// that were deleted.
    pub fn rotate<F>(&self, date: NaiveDate, slot_path: F) -> Result<Vec<PathBuf>>
    where
        F: Fn(&BucketKey) -> PathBuf,
    {
        let mut removed = Vec::new();
        for granularity in self.evictions(date) {
            let archive = slot_path(&self.key(granularity, date));
            removed.extend(evict_slot(&archive)?);
        }
        Ok(removed)
    }
}

/// Delete a delta archive together with its removal manifest and any profile
/// sidecars. Missing files are ignored.
pub fn evict_slot(archive: &Path) -> Result<Vec<PathBuf>> {
    let mut removed = Vec::new();
    for path in [archive.to_path_buf(), removed_manifest_path(archive)] {
        if remove_if_exists(&path)? {
            removed.push(path);
        }
    }
    for sidecar in profile_sidecars(archive)? {
        if remove_if_exists(&sidecar)? {
            removed.push(sidecar);
        }
    }
    if !removed.is_empty() {
        debug!(path = %archive.display(), files = removed.len(), "evicted delta slot");
    }
    Ok(removed)
}

fn profile_sidecars(archive: &Path) -> Result<Vec<PathBuf>> {
    let Some(file_name) = archive.file_name().map(|n| n.to_string_lossy().into_owned()) else {
        return Ok(Vec::new());
    };
    let prefix = format!("{file_name}.");
    let dir = parent_dir(archive);

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(LxdeltaError::file("list", dir, e)),
    };

    let mut out = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| LxdeltaError::file("list", dir, e))?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with(&prefix) && name.ends_with(PROFILE_SUFFIX) {
            out.push(entry.path());
        }
    }
    Ok(out)
}
