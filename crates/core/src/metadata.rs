use crate::exif_reader::{read_exif_metadata, GpsReading};
use chrono::{DateTime, Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const PHOTO_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "heic", "heif"];
pub const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "mov", "avi", "mkv", "m4v", "3gp", "webm", "insv", "lrv",
];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Photo,
    Video,
    Unknown,
}

impl MediaKind {
    pub fn classify(path: &Path) -> Self {
        let Some(ext) = path.extension().map(|v| v.to_string_lossy().to_ascii_lowercase()) else {
            return Self::Unknown;
        };
        if PHOTO_EXTENSIONS.contains(&ext.as_str()) {
            Self::Photo
        } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            Self::Video
        } else {
            Self::Unknown
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    /// Returns `None` for NaN or out-of-range values.
    pub fn new(latitude: f64, longitude: f64) -> Option<Self> {
        let valid = latitude.is_finite()
            && longitude.is_finite()
            && (-90.0..=90.0).contains(&latitude)
            && (-180.0..=180.0).contains(&longitude);
        valid.then_some(Self {
            latitude,
            longitude,
        })
    }
}

/// Outcome of reading one piece of embedded metadata.
///
/// `Degraded` carries a usable value that did not come from the preferred
/// source (file mtime instead of EXIF, GPS without hemisphere reference).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum Extraction<T> {
    Found(T),
    Degraded(T),
    Absent,
}

impl<T> Extraction<T> {
    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Found(v) | Self::Degraded(v) => Some(v),
            Self::Absent => None,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded(_))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhotoRecord {
    pub path: PathBuf,
    pub kind: MediaKind,
    pub captured_at: Extraction<NaiveDateTime>,
    pub coordinates: Extraction<Coordinates>,
    pub notes: Vec<String>,
}

impl PhotoRecord {
    pub fn timestamp(&self) -> Option<NaiveDateTime> {
        self.captured_at.value().copied()
    }

    pub fn coordinates(&self) -> Option<Coordinates> {
        self.coordinates.value().copied()
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|v| v.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

/// Source of capture metadata for the planner.
pub trait MetadataExtractor {
    fn extract(&self, path: &Path) -> PhotoRecord;
}

/// Reads EXIF via kamadak-exif and falls back to the file's mtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExifExtractor;

impl MetadataExtractor for ExifExtractor {
    fn extract(&self, path: &Path) -> PhotoRecord {
        extract_record(path)
    }
}

pub fn extract_record(path: &Path) -> PhotoRecord {
    let mut notes = Vec::new();
    let exif = match read_exif_metadata(path) {
        Ok(exif) => exif,
        Err(err) => {
            notes.push(format!("EXIF unavailable: {err:#}"));
            Default::default()
        }
    };

    let captured_at = match exif.date {
        Some(date) => Extraction::Found(date),
        None => match file_modified_to_local(path) {
            Some(modified) => {
                notes.push(format!(
                    "no EXIF capture date, using file modification time {}",
                    modified.format("%Y-%m-%d %H:%M:%S")
                ));
                Extraction::Degraded(modified)
            }
            None => Extraction::Absent,
        },
    };

    let coordinates = match exif.gps {
        GpsReading::Present(coords) => Extraction::Found(coords),
        GpsReading::MissingReference(coords) => {
            notes.push("GPS hemisphere reference missing, assuming N/E".to_string());
            Extraction::Degraded(coords)
        }
        GpsReading::OutOfRange {
            latitude,
            longitude,
        } => {
            notes.push(format!(
                "ignoring out-of-range GPS position {latitude}, {longitude}"
            ));
            Extraction::Absent
        }
        GpsReading::Absent => Extraction::Absent,
    };

    PhotoRecord {
        path: path.to_path_buf(),
        kind: MediaKind::classify(path),
        captured_at,
        coordinates,
        notes,
    }
}

fn file_modified_to_local(path: &Path) -> Option<NaiveDateTime> {
    let time = fs::metadata(path).ok()?.modified().ok()?;
    let local: DateTime<Local> = DateTime::from(time);
    Some(local.naive_local())
}
