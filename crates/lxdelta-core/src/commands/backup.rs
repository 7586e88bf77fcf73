//! One backup run over every selected container.
//!
//! Per entity: stop, export, restart, fingerprint, then either seed the
//! quarterly baseline or diff against it and refresh the month, week and day
//! delta slots. Entities are independent; a failure is recorded in that
//! entity's report and the run moves on.

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use tracing::{debug, error, info, warn};

use crate::baseline::{self, fingerprint_path};
use crate::config::{HooksConfig, LxdeltaConfig};
use crate::delta::{write_profile, BuildOutcome, DeltaBuilder, Profile};
use crate::diff::{diff, DiffResult};
use crate::error::{LxdeltaError, Result};
use crate::fingerprint::fingerprint_file;
use crate::hooks::{run_with_hooks, HookContext};
use crate::layout::BackupLayout;
use crate::platform::fs::{atomic_write, remove_if_exists, rename_into_place};
use crate::retention::{Granularity, RetentionRotator};
use crate::runtime::{Container, ContainerRuntime, EntityFilter};

/// Everything a run needs besides the runtime itself.
#[derive(Debug, Clone)]
pub struct BackupPlan {
    pub layout: BackupLayout,
    pub rotator: RetentionRotator,
    pub builder: DeltaBuilder,
    pub hooks: HooksConfig,
    pub filter: EntityFilter,
    /// Wall clock of the run; every bucket key is derived from its date.
    pub now: NaiveDateTime,
}

impl BackupPlan {
    pub fn from_config(config: &LxdeltaConfig, now: NaiveDateTime) -> Self {
        Self {
            layout: config.layout(),
            rotator: config.rotator(),
            builder: config.delta_builder(),
            hooks: config.hooks.clone(),
            filter: config.entity_filter(),
            now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BucketOutcome {
    Built { members: usize, removed: usize },
    AlreadyPresent,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketReport {
    pub granularity: Granularity,
    pub path: PathBuf,
    pub outcome: BucketOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityOutcome {
    /// No baseline existed for the quarter; the export became it.
    Baseline { archive: PathBuf, files: usize },
    /// Changes were found and the delta slots were (re)built.
    Delta {
        changed: usize,
        removed: usize,
        buckets: Vec<BucketReport>,
    },
    NoChanges,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityReport {
    pub name: String,
    pub outcome: EntityOutcome,
    /// Delta slot files deleted by rotation during this run.
    pub evicted: Vec<PathBuf>,
}

impl EntityReport {
    /// True when the entity failed outright or any of its buckets failed.
    pub fn has_failures(&self) -> bool {
        match &self.outcome {
            EntityOutcome::Failed(_) => true,
            EntityOutcome::Delta { buckets, .. } => buckets
                .iter()
                .any(|b| matches!(b.outcome, BucketOutcome::Failed(_))),
            _ => false,
        }
    }

    /// The line written to the entity's status log.
    pub fn status_line(&self) -> String {
        match &self.outcome {
            EntityOutcome::Baseline { files, .. } => format!("Baseline created, {files} files."),
            EntityOutcome::Delta {
                changed,
                removed,
                buckets,
            } => {
                let failed = buckets
                    .iter()
                    .filter(|b| matches!(b.outcome, BucketOutcome::Failed(_)))
                    .count();
                let mut line = format!("{changed} files changed/added, {removed} removed.");
                if failed > 0 {
                    line.push_str(&format!(" {failed} delta bucket(s) failed."));
                }
                line
            }
            EntityOutcome::NoChanges => "No changes".to_string(),
            EntityOutcome::Failed(e) => format!("Failed: {e}"),
        }
    }
}

/// Back up every container the plan's filter selects.
///
/// Only setup failures (target directory, listing) abort the run; anything
/// that goes wrong for a single entity ends up in its [`EntityReport`].
pub fn run(runtime: &dyn ContainerRuntime, plan: &BackupPlan) -> Result<Vec<EntityReport>> {
    plan.filter.validate()?;
    let target = plan.layout.target();
    std::fs::create_dir_all(target).map_err(|e| LxdeltaError::file("create", target, e))?;

    let listed = runtime.list()?;
    let total = listed.len();
    let containers = plan.filter.apply(listed);
    info!(
        selected = containers.len(),
        total,
        target = %target.display(),
        "starting backup run"
    );

    let mut reports = Vec::with_capacity(containers.len());
    for container in &containers {
        reports.push(run_entity(runtime, plan, container));
    }
    Ok(reports)
}

fn run_entity(runtime: &dyn ContainerRuntime, plan: &BackupPlan, container: &Container) -> EntityReport {
    let mut ctx = HookContext::new(
        container.name.clone(),
        plan.layout.target().display().to_string(),
    );
    let mut evicted = Vec::new();

    let outcome = match run_with_hooks(&plan.hooks, &mut ctx, || {
        backup_entity(runtime, plan, container, &mut evicted)
    }) {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(container = %container.name, "backup failed: {e}");
            EntityOutcome::Failed(e.to_string())
        }
    };

    let report = EntityReport {
        name: container.name.clone(),
        outcome,
        evicted,
    };
    write_status(plan, &report);
    report
}

fn write_status(plan: &BackupPlan, report: &EntityReport) {
    let path = plan.layout.status_log_path(&report.name);
    let line = format!(
        "{}: {}\n",
        plan.now.format("%Y-%m-%d %H:%M:%S"),
        report.status_line()
    );
    if let Err(e) = atomic_write(&path, line.as_bytes()) {
        warn!(container = %report.name, "cannot write status log: {e}");
    }
}

/// Back up a single container. `evicted` collects rotated-out slot files even
/// when a later step fails.
pub fn backup_entity(
    runtime: &dyn ContainerRuntime,
    plan: &BackupPlan,
    container: &Container,
    evicted: &mut Vec<PathBuf>,
) -> Result<EntityOutcome> {
    let name = container.name.as_str();
    let date = plan.now.date();
    let baseline = plan.layout.baseline_path(name, date);
    let profile = Profile::new(container.profile_name.clone(), container.profile.clone());

    let needs_baseline = !baseline
        .try_exists()
        .map_err(|e| LxdeltaError::file("check", &baseline, e))?;

    // Slots whose period starts today go first, whatever the export, the
    // diff or the baseline state turn out to be.
    evicted.extend(
        plan.rotator
            .rotate(date, |key| plan.layout.bucket_path(name, key))?,
    );

    // Removed on every exit path; after a successful baseline rename there is
    // nothing left to remove.
    let export = TempExport::new(plan.layout.temp_export_path());
    export_stopped(runtime, container, export.path())?;

    let current = fingerprint_file(export.path())?;

    if needs_baseline {
        baseline::persist(&current, &fingerprint_path(&baseline))?;
        write_profile(&baseline, &profile)?;
        rename_into_place(export.path(), &baseline)?;
        info!(container = %name, path = %baseline.display(), files = current.len(), "baseline created");
        return Ok(EntityOutcome::Baseline {
            archive: baseline,
            files: current.len(),
        });
    }

    let reference = baseline::load(&fingerprint_path(&baseline))?;
    let changes = diff(&reference, &current);

    if changes.is_empty() {
        info!(container = %name, "no changes since baseline");
        return Ok(EntityOutcome::NoChanges);
    }

    let buckets = build_buckets(plan, name, export.path(), &changes, &profile);
    info!(container = %name, "{}", changes.summary());
    Ok(EntityOutcome::Delta {
        changed: changes.changed_or_added.len(),
        removed: changes.removed.len(),
        buckets,
    })
}

/// Stop the container if it runs, export it, and start it again whatever the
/// export did.
fn export_stopped(
    runtime: &dyn ContainerRuntime,
    container: &Container,
    destination: &Path,
) -> Result<()> {
    let was_running = container.state.is_running();
    if was_running {
        runtime.stop(&container.name)?;
    }

    let exported = runtime.export(&container.name, destination);

    if was_running {
        if let Err(e) = runtime.start(&container.name) {
            error!(container = %container.name, "failed to restart container: {e}");
            return Err(match exported {
                Ok(()) => e,
                Err(export_err) => LxdeltaError::Runtime(format!(
                    "{export_err}; restart also failed: {e}"
                )),
            });
        }
    }
    exported
}

fn build_buckets(
    plan: &BackupPlan,
    name: &str,
    source: &Path,
    changes: &DiffResult,
    profile: &Profile,
) -> Vec<BucketReport> {
    Granularity::DELTAS
        .iter()
        .map(|&granularity| {
            let key = plan.rotator.key(granularity, plan.now.date());
            let path = plan.layout.bucket_path(name, &key);
            let outcome = match plan.builder.build(source, changes, &path, profile) {
                Ok(BuildOutcome::Built { members, removed }) => {
                    BucketOutcome::Built { members, removed }
                }
                Ok(BuildOutcome::AlreadyPresent) => BucketOutcome::AlreadyPresent,
                Err(e) => {
                    error!(container = %name, bucket = %granularity, "{e}");
                    BucketOutcome::Failed(e.to_string())
                }
            };
            BucketReport {
                granularity,
                path,
                outcome,
            }
        })
        .collect()
}

struct TempExport {
    path: PathBuf,
}

impl TempExport {
    fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempExport {
    fn drop(&mut self) {
        match remove_if_exists(&self.path) {
            Ok(true) => debug!(path = %self.path.display(), "removed temporary export"),
            Ok(false) => {}
            Err(e) => warn!("cannot remove temporary export: {e}"),
        }
    }
}
