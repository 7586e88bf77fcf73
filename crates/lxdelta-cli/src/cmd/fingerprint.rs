use std::path::Path;

use lxdelta_core::commands::inspect;

pub(crate) fn run_fingerprint(
    archive: &str,
    output: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let (written, table) = inspect::fingerprint_archive(Path::new(archive), output.map(Path::new))?;
    println!(
        "Fingerprinted {} file(s), table written to: {}",
        table.len(),
        written.display()
    );
    Ok(())
}
