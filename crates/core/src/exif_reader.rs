use crate::metadata::Coordinates;
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime};
use exif::{Exif, In, Rational, Reader, Tag, Value};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

const DATE_TAGS: &[Tag] = &[Tag::DateTimeOriginal, Tag::DateTimeDigitized, Tag::DateTime];

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum GpsReading {
    Present(Coordinates),
    MissingReference(Coordinates),
    OutOfRange {
        latitude: f64,
        longitude: f64,
    },
    #[default]
    Absent,
}

#[derive(Debug, Clone, Default)]
pub struct ExifFields {
    pub date: Option<NaiveDateTime>,
    pub gps: GpsReading,
}

pub fn read_exif_metadata(path: &Path) -> Result<ExifFields> {
    let file = File::open(path)
        .with_context(|| format!("cannot open file for EXIF: {}", path.display()))?;
    let mut buf = BufReader::new(file);
    let exif = Reader::new()
        .read_from_container(&mut buf)
        .with_context(|| format!("cannot parse EXIF: {}", path.display()))?;

    let date = DATE_TAGS
        .iter()
        .filter_map(|tag| ascii_field(&exif, *tag))
        .find_map(|raw| parse_date(&raw));

    Ok(ExifFields {
        date,
        gps: read_gps(&exif),
    })
}

fn ascii_field(exif: &Exif, tag: Tag) -> Option<String> {
    let field = exif.get_field(tag, In::PRIMARY)?;
    match &field.value {
        Value::Ascii(values) => values
            .first()
            .map(|raw| String::from_utf8_lossy(raw).trim().to_string())
            .filter(|v| !v.is_empty()),
        _ => None,
    }
}

fn read_gps(exif: &Exif) -> GpsReading {
    let latitude = exif
        .get_field(Tag::GPSLatitude, In::PRIMARY)
        .and_then(|f| rationals_to_degrees(&f.value));
    let longitude = exif
        .get_field(Tag::GPSLongitude, In::PRIMARY)
        .and_then(|f| rationals_to_degrees(&f.value));
    let (Some(latitude), Some(longitude)) = (latitude, longitude) else {
        return GpsReading::Absent;
    };

    let lat_ref = ascii_field(exif, Tag::GPSLatitudeRef);
    let lon_ref = ascii_field(exif, Tag::GPSLongitudeRef);
    let latitude = apply_hemisphere(latitude, lat_ref.as_deref());
    let longitude = apply_hemisphere(longitude, lon_ref.as_deref());

    match Coordinates::new(latitude, longitude) {
        Some(coords) if lat_ref.is_some() && lon_ref.is_some() => GpsReading::Present(coords),
        Some(coords) => GpsReading::MissingReference(coords),
        None => GpsReading::OutOfRange {
            latitude,
            longitude,
        },
    }
}

fn rationals_to_degrees(value: &Value) -> Option<f64> {
    match value {
        Value::Rational(parts) if parts.len() >= 3 => dms_to_degrees(&parts[..3]),
        _ => None,
    }
}

fn dms_to_degrees(parts: &[Rational]) -> Option<f64> {
    if parts.iter().any(|r| r.denom == 0) {
        return None;
    }
    let degrees = parts[0].to_f64();
    let minutes = parts[1].to_f64();
    let seconds = parts[2].to_f64();
    Some(degrees + minutes / 60.0 + seconds / 3600.0)
}

fn apply_hemisphere(value: f64, reference: Option<&str>) -> f64 {
    match reference.map(str::trim) {
        Some(r) if r.eq_ignore_ascii_case("S") || r.eq_ignore_ascii_case("W") => -value.abs(),
        _ => value,
    }
}

pub(crate) fn parse_date(input: &str) -> Option<NaiveDateTime> {
    let normalized = input.trim().trim_end_matches('\0');

    let candidates = [
        "%Y:%m:%d %H:%M:%S",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%:z",
        "%Y-%m-%dT%H:%M:%S%.f%:z",
    ];

    for fmt in candidates {
        if let Ok(naive) = NaiveDateTime::parse_from_str(normalized, fmt) {
            return Some(naive);
        }
        // Offsets are dropped: the filename carries wall-clock capture time.
        if let Ok(dt) = DateTime::parse_from_str(normalized, fmt) {
            return Some(dt.naive_local());
        }
    }

    None
}
