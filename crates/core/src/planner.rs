use crate::composite::MapOptions;
use crate::counter::{CounterLedger, LedgerSummary};
use crate::geocode::{GeoLabel, GeocodingResolver};
use crate::metadata::{
    Coordinates, ExifExtractor, MediaKind, MetadataExtractor, PhotoRecord,
};
use crate::naming::{
    validate_separator, ProcessedName, SeparatorError, DEFAULT_SEPARATOR, MAP_TAG,
};
use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

const MAX_COLLISION_SUFFIX: u32 = 99;

#[derive(Debug, Clone)]
pub struct PlanOptions {
    pub root: PathBuf,
    pub recursive: bool,
    pub geocoding: bool,
    pub skip_processed: bool,
    pub separator: char,
    pub watermark: bool,
    pub map: Option<MapOptions>,
    pub reprocess_map: bool,
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self {
            root: PathBuf::new(),
            recursive: false,
            geocoding: true,
            skip_processed: true,
            separator: DEFAULT_SEPARATOR,
            watermark: false,
            map: None,
            reprocess_map: false,
        }
    }
}

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("target directory does not exist: {}", .0.display())]
    DirectoryMissing(PathBuf),
    #[error("target is not a directory: {}", .0.display())]
    NotADirectory(PathBuf),
    #[error(transparent)]
    InvalidSeparator(#[from] SeparatorError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    NoDate,
    AlreadyProcessed,
    CounterOverflow,
    Collision,
    NoLocation,
    MapPresent,
}

impl SkipReason {
    pub fn code(self) -> &'static str {
        match self {
            Self::NoDate => "no-date",
            Self::AlreadyProcessed => "already-processed",
            Self::CounterOverflow => "counter-overflow",
            Self::Collision => "collision",
            Self::NoLocation => "no-location",
            Self::MapPresent => "map-present",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::NoDate => "no capture date in EXIF or file system",
            Self::AlreadyProcessed => "already processed",
            Self::CounterOverflow => "counter exhausted for this directory",
            Self::Collision => "no free target name after collision retries",
            Self::NoLocation => "no GPS data and no location in the name",
            Self::MapPresent => "map already added",
        };
        write!(f, "{} ({})", text, self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PlanAction {
    Rename { target: PathBuf, counter: u32 },
    AddMap { target: PathBuf },
    Unchanged,
    Skip { reason: SkipReason },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanEntry {
    pub source: PathBuf,
    pub action: PlanAction,
    pub captured_at: Option<NaiveDateTime>,
    pub date_from_file_time: bool,
    pub coordinates: Option<Coordinates>,
    pub label: Option<GeoLabel>,
    pub watermark: bool,
    pub map: Option<MapOptions>,
    pub notes: Vec<String>,
}

impl PlanEntry {
    fn from_record(record: &PhotoRecord, action: PlanAction) -> Self {
        Self {
            source: record.path.clone(),
            action,
            captured_at: record.timestamp(),
            date_from_file_time: record.captured_at.is_degraded(),
            coordinates: record.coordinates(),
            label: None,
            watermark: false,
            map: None,
            notes: record.notes.clone(),
        }
    }

    pub fn target(&self) -> Option<&Path> {
        match &self.action {
            PlanAction::Rename { target, .. } | PlanAction::AddMap { target } => Some(target),
            PlanAction::Unchanged => Some(&self.source),
            PlanAction::Skip { .. } => None,
        }
    }

    pub fn is_change(&self) -> bool {
        matches!(
            self.action,
            PlanAction::Rename { .. } | PlanAction::AddMap { .. }
        )
    }

    pub fn needs_composite(&self) -> bool {
        self.is_change() && (self.watermark || self.map.is_some())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoFile {
    pub path: PathBuf,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct RenameStats {
    pub scanned_files: usize,
    pub photos: usize,
    pub videos: usize,
    pub unsupported: usize,
    pub hidden: usize,
    pub planned: usize,
    pub map_additions: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub geocoded: usize,
    pub unresolved: usize,
    pub file_time_dates: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenamePlan {
    pub root: PathBuf,
    pub separator: char,
    pub entries: Vec<PlanEntry>,
    pub videos: Vec<VideoFile>,
    pub ledgers: Vec<LedgerSummary>,
    pub stats: RenameStats,
}

impl RenamePlan {
    pub fn changes(&self) -> impl Iterator<Item = &PlanEntry> {
        self.entries.iter().filter(|e| e.is_change())
    }
}

pub fn generate_plan(options: &PlanOptions, resolver: &mut GeocodingResolver) -> Result<RenamePlan> {
    generate_plan_with(options, &ExifExtractor, resolver)
}

pub fn generate_plan_with<E>(
    options: &PlanOptions,
    extractor: &E,
    resolver: &mut GeocodingResolver,
) -> Result<RenamePlan>
where
    E: MetadataExtractor + Sync + ?Sized,
{
    validate_root(&options.root)?;
    let separator = validate_separator(options.separator).map_err(PlanError::from)?;

    let mut stats = RenameStats::default();
    let listing = collect_files(&options.root, options.recursive, &mut stats)?;

    let mut entries = Vec::new();
    let mut ledgers = Vec::with_capacity(listing.photos_by_dir.len());
    for (dir, photos) in &listing.photos_by_dir {
        let mut ledger = CounterLedger::scan(dir, separator)?;
        let records: Vec<PhotoRecord> = photos.par_iter().map(|p| extractor.extract(p)).collect();

        let mut planner = DirectoryPlanner {
            options,
            separator,
            ledger: &mut ledger,
            resolver: &mut *resolver,
            planned: HashSet::new(),
            stats: &mut stats,
        };
        entries.extend(planner.plan(records));
        ledgers.push(ledger.summary());
    }

    for entry in &entries {
        match entry.action {
            PlanAction::Rename { .. } => stats.planned += 1,
            PlanAction::AddMap { .. } => stats.map_additions += 1,
            PlanAction::Unchanged => stats.unchanged += 1,
            PlanAction::Skip { .. } => stats.skipped += 1,
        }
    }

    Ok(RenamePlan {
        root: options.root.clone(),
        separator,
        entries,
        videos: listing.videos,
        ledgers,
        stats,
    })
}

fn validate_root(root: &Path) -> Result<(), PlanError> {
    if !root.exists() {
        return Err(PlanError::DirectoryMissing(root.to_path_buf()));
    }
    if !root.is_dir() {
        return Err(PlanError::NotADirectory(root.to_path_buf()));
    }
    Ok(())
}

struct DirectoryPlanner<'a> {
    options: &'a PlanOptions,
    separator: char,
    ledger: &'a mut CounterLedger,
    resolver: &'a mut GeocodingResolver,
    planned: HashSet<PathBuf>,
    stats: &'a mut RenameStats,
}

impl DirectoryPlanner<'_> {
    fn plan(&mut self, records: Vec<PhotoRecord>) -> Vec<PlanEntry> {
        let mut entries = Vec::with_capacity(records.len());
        let mut queue = Vec::<(NaiveDateTime, PhotoRecord)>::new();

        for record in records {
            for note in &record.notes {
                log::warn!("{}: {note}", record.path.display());
            }
            if record.captured_at.is_degraded() {
                self.stats.file_time_dates += 1;
            }

            let existing = self.ledger.pattern().parse(&record.file_name());
            if let Some(existing) = existing {
                if self.options.reprocess_map && self.options.map.is_some() {
                    entries.push(self.plan_map_addition(record, existing));
                    continue;
                }
                if self.options.skip_processed {
                    entries.push(skip(&record, SkipReason::AlreadyProcessed));
                    continue;
                }
            }

            match record.timestamp() {
                Some(captured) => queue.push((captured, record)),
                None => entries.push(skip(&record, SkipReason::NoDate)),
            }
        }

        queue.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.path.cmp(&b.1.path)));
        for (captured, record) in queue {
            entries.push(self.plan_rename(captured, record));
        }
        entries
    }

    fn plan_rename(&mut self, captured: NaiveDateTime, record: PhotoRecord) -> PlanEntry {
        let coords = record.coordinates();
        let label = match coords {
            Some(c) if self.options.geocoding => {
                let label = self.resolver.resolve(c);
                if label.is_some() {
                    self.stats.geocoded += 1;
                } else {
                    self.stats.unresolved += 1;
                }
                label
            }
            _ => None,
        };
        let own = if self.options.skip_processed {
            None
        } else {
            self.ledger.pattern().parse(&record.file_name())
        };
        // An overlay already drawn stays in the pixels, and so does its tag.
        let overlay_drawn = own.as_ref().is_some_and(|own| own.map);
        let map = self
            .options
            .map
            .filter(|_| coords.is_some() && !overlay_drawn);
        let tagged = overlay_drawn || map.is_some();
        let location = label.as_ref().map(GeoLabel::location);
        let extension = extension_of(&record.path);

        let mut action = None;
        if let Some(own) = &own {
            let mut name =
                ProcessedName::new(&captured, own.counter, location.clone(), tagged, &extension);
            name.suffix = own.suffix;
            let target = self.ledger.directory().join(name.render(self.separator));
            if target == record.path {
                action = Some(PlanAction::Unchanged);
            } else if is_available(&target, &record.path, &self.planned) {
                action = Some(PlanAction::Rename {
                    target,
                    counter: own.counter,
                });
            }
        }

        let action = match action {
            Some(action) => action,
            None => match self.ledger.next_counter() {
                Ok(counter) => {
                    let name = ProcessedName::new(&captured, counter, location, tagged, &extension);
                    match resolve_collision(
                        self.ledger.directory(),
                        &name,
                        self.separator,
                        &record.path,
                        &self.planned,
                    ) {
                        Some(target) => PlanAction::Rename { target, counter },
                        None => PlanAction::Skip {
                            reason: SkipReason::Collision,
                        },
                    }
                }
                Err(err) => {
                    log::warn!("{}: {err}", record.path.display());
                    PlanAction::Skip {
                        reason: SkipReason::CounterOverflow,
                    }
                }
            },
        };

        let mut entry = PlanEntry::from_record(&record, action);
        if let Some(target) = entry.target() {
            self.planned.insert(target.to_path_buf());
        }
        if entry.is_change() {
            entry.watermark = self.options.watermark && !overlay_drawn;
            entry.map = map;
        }
        entry.label = label;
        log_entry(&entry);
        entry
    }

    fn plan_map_addition(&mut self, record: PhotoRecord, existing: ProcessedName) -> PlanEntry {
        if existing.map {
            return skip(&record, SkipReason::MapPresent);
        }

        let coords = record.coordinates().or_else(|| {
            let location = existing.location.as_ref()?;
            if !self.options.geocoding {
                return None;
            }
            self.resolver.forward(&location.city, &location.country)
        });
        let Some(coords) = coords else {
            return skip(&record, SkipReason::NoLocation);
        };

        let file_name = record.file_name();
        let (stem, dot_ext) = match file_name.rsplit_once('.') {
            Some((stem, ext)) => (stem.to_string(), format!(".{ext}")),
            None => (file_name.clone(), String::new()),
        };
        let sep = self.separator;
        // The collision suffix stays last, after the tag.
        let suffix = existing.suffix.map(|n| format!("{sep}{n:03}")).unwrap_or_default();
        let base = stem.strip_suffix(suffix.as_str()).unwrap_or(&stem);
        let target = self
            .ledger
            .directory()
            .join(format!("{base}{sep}{MAP_TAG}{suffix}{dot_ext}"));

        let action = if is_available(&target, &record.path, &self.planned) {
            self.planned.insert(target.clone());
            PlanAction::AddMap { target }
        } else {
            PlanAction::Skip {
                reason: SkipReason::Collision,
            }
        };

        let mut entry = PlanEntry::from_record(&record, action);
        entry.coordinates = Some(coords);
        entry.label = existing.location.map(|l| GeoLabel {
            city: l.city,
            country: l.country,
            provider: "filename".to_string(),
        });
        if entry.is_change() {
            entry.map = self.options.map;
        }
        log_entry(&entry);
        entry
    }
}

fn skip(record: &PhotoRecord, reason: SkipReason) -> PlanEntry {
    let entry = PlanEntry::from_record(record, PlanAction::Skip { reason });
    log_entry(&entry);
    entry
}

fn log_entry(entry: &PlanEntry) {
    match &entry.action {
        PlanAction::Rename { target, .. } | PlanAction::AddMap { target } => log::info!(
            "plan {} -> {}",
            entry.source.display(),
            target.display()
        ),
        PlanAction::Unchanged => log::info!("plan {} unchanged", entry.source.display()),
        PlanAction::Skip { reason } => {
            log::info!("plan {} skipped: {reason}", entry.source.display())
        }
    }
}

fn resolve_collision(
    dir: &Path,
    name: &ProcessedName,
    separator: char,
    source: &Path,
    planned: &HashSet<PathBuf>,
) -> Option<PathBuf> {
    let candidate = dir.join(name.render(separator));
    if is_available(&candidate, source, planned) {
        return Some(candidate);
    }

    for n in 1..=MAX_COLLISION_SUFFIX {
        let candidate = dir.join(name.render_with_suffix(separator, Some(n)));
        if is_available(&candidate, source, planned) {
            log::warn!(
                "{}: target taken, using {}",
                source.display(),
                candidate.display()
            );
            return Some(candidate);
        }
    }
    None
}

fn is_available(candidate: &Path, source: &Path, planned: &HashSet<PathBuf>) -> bool {
    if planned.contains(candidate) {
        return false;
    }
    if candidate == source {
        return true;
    }
    !candidate.exists()
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|v| v.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default()
}

struct FileListing {
    photos_by_dir: BTreeMap<PathBuf, Vec<PathBuf>>,
    videos: Vec<VideoFile>,
}

fn collect_files(root: &Path, recursive: bool, stats: &mut RenameStats) -> Result<FileListing> {
    let mut files = Vec::new();
    if recursive {
        let walker = WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                entry.depth() == 0 || !entry.file_type().is_dir() || !is_hidden(entry.path())
            });
        for entry in walker {
            let entry =
                entry.with_context(|| format!("cannot walk directory: {}", root.display()))?;
            if entry.file_type().is_file() {
                files.push(entry.into_path());
            }
        }
    } else {
        for entry in fs::read_dir(root)
            .with_context(|| format!("cannot read directory: {}", root.display()))?
        {
            let entry = entry.with_context(|| format!("cannot read entry in: {}", root.display()))?;
            if entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                files.push(entry.path());
            }
        }
        files.sort();
    }

    let mut listing = FileListing {
        photos_by_dir: BTreeMap::new(),
        videos: Vec::new(),
    };
    for path in files {
        stats.scanned_files += 1;
        if is_hidden(&path) {
            stats.hidden += 1;
            continue;
        }
        match MediaKind::classify(&path) {
            MediaKind::Photo => {
                stats.photos += 1;
                let dir = path.parent().unwrap_or(root).to_path_buf();
                listing.photos_by_dir.entry(dir).or_default().push(path);
            }
            MediaKind::Video => {
                stats.videos += 1;
                let size_bytes = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
                listing.videos.push(VideoFile { path, size_bytes });
            }
            MediaKind::Unknown => stats.unsupported += 1,
        }
    }
    Ok(listing)
}

/// Dot files, including macOS `._*` resource forks and `.DS_Store`.
fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .map(|name| name.to_string_lossy().starts_with('.'))
        .unwrap_or(false)
}
