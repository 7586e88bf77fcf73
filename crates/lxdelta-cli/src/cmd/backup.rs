use std::time::Instant;

use comfy_table::{Cell, Table};
use tracing::debug;

use lxdelta_core::commands::backup::{self, BackupPlan, BucketOutcome, EntityOutcome, EntityReport};
use lxdelta_core::config::LxdeltaConfig;
use lxdelta_core::runtime::LxcRuntime;

use crate::cli::BackupArgs;
use crate::format::{bucket_label, file_name, format_elapsed, outcome_label};
use crate::table::CliTableTheme;

pub(crate) fn run_backup(
    config: &LxdeltaConfig,
    args: &BackupArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = config.clone();
    args.apply(&mut config);
    config.validate()?;

    let runtime = LxcRuntime::from_config(&config.runtime)?;
    let binary = runtime.check_available()?;
    debug!(binary = %binary.display(), "container runtime found");

    let plan = BackupPlan::from_config(&config, chrono::Local::now().naive_local());
    let start = Instant::now();
    let reports = backup::run(&runtime, &plan)?;

    if reports.is_empty() {
        println!("No containers selected.");
        return Ok(());
    }

    let theme = CliTableTheme::detect();
    println!("{}", summary_table(&reports, theme));
    for report in &reports {
        print_bucket_failures(report);
    }
    println!();
    println!("Duration: {}", format_elapsed(start.elapsed()));

    let failed = reports.iter().filter(|r| r.has_failures()).count();
    if failed > 0 {
        return Err(format!("{failed} of {} container(s) had failures", reports.len()).into());
    }
    Ok(())
}

fn summary_table(reports: &[EntityReport], theme: CliTableTheme) -> Table {
    let mut table = theme.new_data_table(&["Container", "Outcome", "Details"]);
    for report in reports {
        let failed = report.has_failures();
        table.add_row(vec![
            Cell::new(&report.name),
            theme.status_cell(outcome_label(&report.outcome), failed),
            Cell::new(details(report)),
        ]);
    }
    table
}

fn details(report: &EntityReport) -> String {
    let mut lines = vec![report.status_line()];
    match &report.outcome {
        EntityOutcome::Baseline { archive, .. } => lines.push(file_name(archive)),
        EntityOutcome::Delta { buckets, .. } => {
            for bucket in buckets {
                lines.push(format!(
                    "{}: {}",
                    file_name(&bucket.path),
                    bucket_label(&bucket.outcome)
                ));
            }
        }
        EntityOutcome::NoChanges | EntityOutcome::Failed(_) => {}
    }
    if !report.evicted.is_empty() {
        lines.push(format!("{} expired file(s) removed", report.evicted.len()));
    }
    lines.join("\n")
}

fn print_bucket_failures(report: &EntityReport) {
    let EntityOutcome::Delta { buckets, .. } = &report.outcome else {
        return;
    };
    for bucket in buckets {
        if let BucketOutcome::Failed(e) = &bucket.outcome {
            eprintln!(
                "Warning: {}: {} delta not written: {e}",
                report.name, bucket.granularity
            );
        }
    }
}
