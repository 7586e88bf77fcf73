use std::path::Path;
use std::time::Duration;

use lxdelta_core::commands::backup::{BucketOutcome, EntityOutcome};

/// Render an elapsed run time as `42s` or `3m 07s`.
pub(crate) fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    let mins = secs / 60;
    let secs = secs % 60;
    if mins > 0 {
        format!("{mins}m {secs:02}s")
    } else {
        format!("{secs}s")
    }
}

/// Short label for the summary table's outcome column.
pub(crate) fn outcome_label(outcome: &EntityOutcome) -> &'static str {
    match outcome {
        EntityOutcome::Baseline { .. } => "baseline",
        EntityOutcome::Delta { .. } => "delta",
        EntityOutcome::NoChanges => "no changes",
        EntityOutcome::Failed(_) => "FAILED",
    }
}

pub(crate) fn bucket_label(outcome: &BucketOutcome) -> String {
    match outcome {
        BucketOutcome::Built { members, removed } => {
            format!("built ({members} members, {removed} removed)")
        }
        BucketOutcome::AlreadyPresent => "already present".to_string(),
        BucketOutcome::Failed(e) => format!("FAILED: {e}"),
    }
}

/// File name of `path`, falling back to the full path.
pub(crate) fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
