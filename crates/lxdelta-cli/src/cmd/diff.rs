use std::io::Write;
use std::path::Path;

use lxdelta_core::commands::inspect;
use lxdelta_core::diff::DiffResult;

pub(crate) fn run_diff(
    baseline_fingerprints: &str,
    archive: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let result = inspect::diff_archive(Path::new(baseline_fingerprints), Path::new(archive))?;
    let stdout = std::io::stdout();
    write_diff(&mut stdout.lock(), &result)?;
    Ok(())
}

/// One `+ path` line per changed or added path, one `- path` line per
/// removed path, then the summary.
fn write_diff(out: &mut impl Write, result: &DiffResult) -> std::io::Result<()> {
    for path in &result.changed_or_added {
        writeln!(out, "+ {path}")?;
    }
    for path in &result.removed {
        writeln!(out, "- {path}")?;
    }
    writeln!(out, "{}", result.summary())
}
