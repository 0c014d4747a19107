use crate::composite::{CompositeRequest, Compositor};
use crate::config::app_paths;
use crate::planner::{PlanAction, PlanEntry, RenamePlan};
use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

const TEMP_PREFIX: &str = ".geotag_tmp_";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct UndoLog {
    root: PathBuf,
    operations: Vec<RenameOperation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RenameOperation {
    from: PathBuf,
    to: PathBuf,
}

#[derive(Default)]
pub struct ApplyOptions<'a> {
    pub dry_run: bool,
    pub compositor: Option<&'a dyn Compositor>,
    /// Where the undo journal goes. `None` skips journaling.
    pub undo_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum ApplyStatus {
    Renamed,
    WouldRename,
    Unchanged,
    Skipped(String),
    Failed(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyOutcome {
    pub source: PathBuf,
    pub target: Option<PathBuf>,
    pub status: ApplyStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ApplyReport {
    pub dry_run: bool,
    pub applied: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub failed: usize,
    pub outcomes: Vec<ApplyOutcome>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UndoResult {
    pub restored: usize,
}

/// Applies a plan entry by entry.
///
/// Each change is its own unit of work: a failure is recorded in the report
/// and the next entry is attempted. Only validation problems that concern
/// the plan as a whole abort before anything is touched.
pub fn apply_plan(plan: &RenamePlan, options: &ApplyOptions<'_>) -> Result<ApplyReport> {
    let changes: Vec<&PlanEntry> = plan.changes().collect();
    validate_apply_entries(plan, &changes)?;

    let mut report = ApplyReport {
        dry_run: options.dry_run,
        ..ApplyReport::default()
    };
    let mut operations = Vec::with_capacity(changes.len());

    for (index, entry) in plan.entries.iter().enumerate() {
        let target = entry.target().map(Path::to_path_buf);
        let status = match &entry.action {
            PlanAction::Unchanged => {
                report.unchanged += 1;
                ApplyStatus::Unchanged
            }
            PlanAction::Skip { reason } => {
                report.skipped += 1;
                ApplyStatus::Skipped(reason.to_string())
            }
            PlanAction::Rename { .. } | PlanAction::AddMap { .. } if options.dry_run => {
                report.applied += 1;
                ApplyStatus::WouldRename
            }
            PlanAction::Rename { target, .. } | PlanAction::AddMap { target } => {
                match apply_entry(entry, target, index, options.compositor) {
                    Ok(()) => {
                        log::info!("renamed {} -> {}", entry.source.display(), target.display());
                        operations.push(RenameOperation {
                            from: entry.source.clone(),
                            to: target.clone(),
                        });
                        report.applied += 1;
                        ApplyStatus::Renamed
                    }
                    Err(err) => {
                        log::warn!("{}: {err:#}", entry.source.display());
                        report.failed += 1;
                        ApplyStatus::Failed(format!("{err:#}"))
                    }
                }
            }
        };
        report.outcomes.push(ApplyOutcome {
            source: entry.source.clone(),
            target,
            status,
        });
    }

    if let Some(undo_path) = options.undo_path.as_deref() {
        if !operations.is_empty() {
            let log = UndoLog {
                root: plan.root.clone(),
                operations,
            };
            persist_undo(undo_path, &log)?;
        }
    }

    Ok(report)
}

fn apply_entry(
    entry: &PlanEntry,
    target: &Path,
    index: usize,
    compositor: Option<&dyn Compositor>,
) -> Result<()> {
    if target.exists() {
        bail!("target already exists: {}", target.display());
    }

    let temp_path = temp_path_for(&entry.source, index);
    fs::rename(&entry.source, &temp_path).with_context(|| {
        format!(
            "cannot stage {} as {}",
            entry.source.display(),
            temp_path.display()
        )
    })?;

    if entry.needs_composite() {
        let composited = match compositor {
            Some(compositor) => {
                let request = CompositeRequest {
                    path: &temp_path,
                    captured_at: entry.captured_at,
                    label: entry.label.as_ref(),
                    coordinates: entry.coordinates,
                    watermark: entry.watermark,
                    map: entry.map,
                };
                compositor
                    .composite(&request)
                    .map_err(|err| anyhow!("compositing failed: {err}"))
            }
            None => Err(anyhow!("compositing requested but no compositor is configured")),
        };
        if let Err(err) = composited {
            return Err(unstage(&temp_path, &entry.source, err));
        }
    }

    if target.exists() {
        let err = anyhow!("target appeared during apply: {}", target.display());
        return Err(unstage(&temp_path, &entry.source, err));
    }
    if let Err(err) = fs::rename(&temp_path, target) {
        let err = anyhow::Error::from(err).context(format!(
            "final rename failed: {} -> {}",
            temp_path.display(),
            target.display()
        ));
        return Err(unstage(&temp_path, &entry.source, err));
    }
    Ok(())
}

/// Moves a staged file back to its source name, keeping the original error.
fn unstage(temp_path: &Path, source: &Path, err: anyhow::Error) -> anyhow::Error {
    match fs::rename(temp_path, source) {
        Ok(()) => err,
        Err(rollback_err) => err.context(format!(
            "could not restore {} from {}: {rollback_err}",
            source.display(),
            temp_path.display()
        )),
    }
}

fn validate_apply_entries(plan: &RenamePlan, entries: &[&PlanEntry]) -> Result<()> {
    if entries.is_empty() {
        return Ok(());
    }

    let root = fs::canonicalize(&plan.root)
        .with_context(|| format!("cannot resolve plan root: {}", plan.root.display()))?;
    let mut seen_sources = HashSet::<PathBuf>::new();
    let mut seen_targets = HashSet::<PathBuf>::new();

    for entry in entries {
        let source = fs::canonicalize(&entry.source)
            .with_context(|| format!("cannot resolve source: {}", entry.source.display()))?;
        if !source.starts_with(&root) {
            bail!("source is outside the plan root: {}", entry.source.display());
        }
        if !seen_sources.insert(source) {
            bail!("duplicate source in plan: {}", entry.source.display());
        }

        let target = entry
            .target()
            .with_context(|| format!("entry has no target: {}", entry.source.display()))?;
        let parent = target
            .parent()
            .with_context(|| format!("target has no parent directory: {}", target.display()))?;
        let name = target
            .file_name()
            .with_context(|| format!("target has no file name: {}", target.display()))?;
        let parent = fs::canonicalize(parent)
            .with_context(|| format!("cannot resolve target directory: {}", parent.display()))?;
        if !parent.starts_with(&root) {
            bail!("target is outside the plan root: {}", target.display());
        }
        if !seen_targets.insert(parent.join(name)) {
            bail!("duplicate target in plan: {}", target.display());
        }
    }

    Ok(())
}

fn temp_path_for(source: &Path, index: usize) -> PathBuf {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    let parent = source.parent().unwrap_or_else(|| Path::new("."));
    let file_name = source
        .file_name()
        .map(|v| v.to_string_lossy().to_string())
        .unwrap_or_else(|| "file".to_string());
    parent.join(format!("{TEMP_PREFIX}{now}_{index}_{file_name}"))
}

fn persist_undo(path: &Path, log: &UndoLog) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)
            .with_context(|| format!("cannot create directory: {}", dir.display()))?;
    }
    let body = serde_json::to_string_pretty(log).context("cannot serialize undo journal")?;
    fs::write(path, body)
        .with_context(|| format!("cannot write undo journal: {}", path.display()))?;
    Ok(())
}

pub fn undo_last() -> Result<UndoResult> {
    undo_last_from(&app_paths()?.undo_path)
}

pub fn undo_last_from(path: &Path) -> Result<UndoResult> {
    if !path.exists() {
        bail!("nothing to undo");
    }

    let raw = fs::read_to_string(path)
        .with_context(|| format!("cannot read undo journal: {}", path.display()))?;
    let log = serde_json::from_str::<UndoLog>(&raw).context("undo journal is corrupt")?;
    log::info!(
        "undoing {} renames under {}",
        log.operations.len(),
        log.root.display()
    );

    let restored = restore_operations(&log)?;

    fs::remove_file(path)
        .with_context(|| format!("cannot remove undo journal: {}", path.display()))?;

    Ok(UndoResult { restored })
}

fn restore_operations(log: &UndoLog) -> Result<usize> {
    let mut restored = 0usize;
    for op in log.operations.iter().rev() {
        if !op.to.exists() {
            log::warn!("{} no longer exists, not restored", op.to.display());
            continue;
        }
        if op.from.exists() {
            log::warn!("{} is occupied, not restored", op.from.display());
            continue;
        }
        fs::rename(&op.to, &op.from).with_context(|| {
            format!("undo failed: {} -> {}", op.to.display(), op.from.display())
        })?;
        restored += 1;
    }
    Ok(restored)
}
