use chrono::NaiveDateTime;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MAP_TAG: &str = "MAP";
pub const MAX_COUNTER: u32 = 9999;
pub const DEFAULT_SEPARATOR: char = '_';

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SeparatorError {
    #[error("separator must be a single visible non-alphanumeric character, got {0:?}")]
    Invalid(char),
}

/// Rejects characters that would make a name ambiguous or unsafe to parse back.
pub fn validate_separator(sep: char) -> Result<char, SeparatorError> {
    let bad = sep.is_alphanumeric()
        || sep.is_whitespace()
        || sep.is_control()
        || matches!(sep, '.' | '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|');
    if bad {
        Err(SeparatorError::Invalid(sep))
    } else {
        Ok(sep)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub city: String,
    pub country: String,
}

/// One name in the `YYYYMMDDHHMMSS<sep>NNNN<sep>City<sep>CC[<sep>MAP][<sep>NNN].<ext>` family.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedName {
    pub timestamp: String,
    pub counter: u32,
    pub location: Option<Location>,
    pub map: bool,
    /// Collision suffix, 1..=99.
    pub suffix: Option<u32>,
    pub extension: String,
}

impl ProcessedName {
    pub fn new(
        captured_at: &NaiveDateTime,
        counter: u32,
        location: Option<Location>,
        map: bool,
        extension: &str,
    ) -> Self {
        Self {
            timestamp: format_timestamp(captured_at),
            counter,
            location,
            map,
            suffix: None,
            extension: extension.to_ascii_lowercase(),
        }
    }

    pub fn render(&self, sep: char) -> String {
        self.render_with_suffix(sep, self.suffix)
    }

    /// Collision suffixes go last, right before the extension.
    pub fn render_with_suffix(&self, sep: char, suffix: Option<u32>) -> String {
        let mut out = format!("{}{sep}{:04}", self.timestamp, self.counter);
        if let Some(location) = &self.location {
            out.push(sep);
            out.push_str(&location.city);
            out.push(sep);
            out.push_str(&location.country);
        }
        if self.map {
            out.push(sep);
            out.push_str(MAP_TAG);
        }
        if let Some(n) = suffix {
            out.push_str(&format!("{sep}{n:03}"));
        }
        if !self.extension.is_empty() {
            out.push('.');
            out.push_str(&self.extension);
        }
        out
    }
}

pub fn format_timestamp(dt: &NaiveDateTime) -> String {
    dt.format("%Y%m%d%H%M%S").to_string()
}

/// Recognizes names produced by this tool (and older 8–14 digit variants).
#[derive(Debug, Clone)]
pub struct NamePattern {
    sep: char,
    stem: Regex,
}

impl NamePattern {
    pub fn new(sep: char) -> Self {
        let escaped = regex::escape(&sep.to_string());
        let stem = Regex::new(&format!(r"^(\d{{8,14}}){escaped}(\d{{4}})(?:{escaped}(.*))?$"))
            .expect("escaped separator always yields a valid pattern");
        Self { sep, stem }
    }

    pub fn separator(&self) -> char {
        self.sep
    }

    pub fn is_processed(&self, file_name: &str) -> bool {
        self.parse(file_name).is_some()
    }

    pub fn parse(&self, file_name: &str) -> Option<ProcessedName> {
        let (stem, extension) = split_extension(file_name);
        let caps = self.stem.captures(stem)?;
        let timestamp = caps.get(1)?.as_str().to_string();
        let counter = caps.get(2)?.as_str().parse::<u32>().ok()?;

        let mut rest = caps.get(3).map(|m| m.as_str()).unwrap_or_default();
        let suffix = split_collision_suffix(&mut rest, self.sep);
        let map_suffix = format!("{}{MAP_TAG}", self.sep);
        let map = if rest == MAP_TAG {
            rest = "";
            true
        } else if let Some(stripped) = rest.strip_suffix(&map_suffix) {
            rest = stripped;
            true
        } else {
            false
        };

        let location = rest.rsplit_once(self.sep).and_then(|(city, country)| {
            let is_code = country.len() == 2 && country.chars().all(|c| c.is_ascii_alphabetic());
            (is_code && !city.is_empty()).then(|| Location {
                city: city.to_string(),
                country: country.to_ascii_uppercase(),
            })
        });

        Some(ProcessedName {
            timestamp,
            counter,
            location,
            map,
            suffix,
            extension: extension.to_string(),
        })
    }
}

/// Takes a trailing three-digit collision suffix off `rest`.
fn split_collision_suffix(rest: &mut &str, sep: char) -> Option<u32> {
    let current: &str = *rest;
    let (head, digits) = current.rsplit_once(sep).unwrap_or(("", current));
    if digits.len() != 3 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let n = digits.parse::<u32>().ok().filter(|n| *n > 0)?;
    *rest = head;
    Some(n)
}

fn split_extension(file_name: &str) -> (&str, &str) {
    match file_name.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty() && !ext.is_empty() && ext.chars().all(char::is_alphanumeric) =>
        {
            (stem, ext)
        }
        _ => (file_name, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 12, 26)
            .and_then(|d| d.and_hms_opt(9, 30, 45))
            .expect("valid")
    }

    fn graz() -> Location {
        Location {
            city: "Graz".to_string(),
            country: "AT".to_string(),
        }
    }

    #[test]
    fn render_full_name() {
        let name = ProcessedName::new(&ts(), 3, Some(graz()), false, "JPG");
        assert_eq!(name.render('_'), "20241226093045_0003_Graz_AT.jpg");
    }

    #[test]
    fn render_without_location_with_map() {
        let name = ProcessedName::new(&ts(), 12, None, true, "png");
        assert_eq!(name.render('-'), "20241226093045-0012-MAP.png");
    }

    #[test]
    fn render_collision_suffix_goes_before_extension() {
        let name = ProcessedName::new(&ts(), 7, Some(graz()), true, "jpg");
        assert_eq!(
            name.render_with_suffix('_', Some(2)),
            "20241226093045_0007_Graz_AT_MAP_002.jpg"
        );
    }

    #[test]
    fn parse_recognizes_short_prefix_names() {
        let pattern = NamePattern::new('_');
        let parsed = pattern.parse("20241226_0002.jpg").expect("processed");
        assert_eq!(parsed.timestamp, "20241226");
        assert_eq!(parsed.counter, 2);
        assert_eq!(parsed.location, None);
        assert!(!parsed.map);
    }

    #[test]
    fn parse_extracts_city_with_spaces_and_map_tag() {
        let pattern = NamePattern::new('_');
        let parsed = pattern
            .parse("20241226093045_0001_St. Gallen_ch_MAP.jpeg")
            .expect("processed");
        assert_eq!(parsed.counter, 1);
        assert_eq!(
            parsed.location,
            Some(Location {
                city: "St. Gallen".to_string(),
                country: "CH".to_string(),
            })
        );
        assert!(parsed.map);
        assert_eq!(parsed.extension, "jpeg");
    }

    #[test]
    fn parse_rejects_other_names() {
        let pattern = NamePattern::new('_');
        assert!(!pattern.is_processed("IMG_0001.jpg"));
        assert!(!pattern.is_processed("20241226_00012.jpg"));
        assert!(!pattern.is_processed("2024122_0001.jpg"));
        assert!(!pattern.is_processed("20241226-0001.jpg"));
        assert!(NamePattern::new('-').is_processed("20241226-0001.jpg"));
    }

    #[test]
    fn rendered_names_parse_back() {
        let pattern = NamePattern::new('_');
        let name = ProcessedName::new(&ts(), 42, Some(graz()), true, "heic");
        assert_eq!(pattern.parse(&name.render('_')), Some(name.clone()));

        let suffixed = ProcessedName {
            suffix: Some(1),
            ..name
        };
        assert_eq!(
            suffixed.render('_'),
            "20241226093045_0042_Graz_AT_MAP_001.heic"
        );
        assert_eq!(pattern.parse(&suffixed.render('_')), Some(suffixed));

        let bare = ProcessedName {
            suffix: Some(12),
            ..ProcessedName::new(&ts(), 5, None, false, "jpg")
        };
        assert_eq!(bare.render('-'), "20241226093045-0005-012.jpg");
        assert_eq!(NamePattern::new('-').parse(&bare.render('-')), Some(bare));
    }

    #[test]
    fn parse_reads_collision_suffix_before_map_tag() {
        let pattern = NamePattern::new('_');
        let parsed = pattern
            .parse("20241226093045_0001_Graz_AT_MAP_001.jpg")
            .expect("processed");
        assert!(parsed.map);
        assert_eq!(parsed.suffix, Some(1));
        assert_eq!(parsed.location, Some(graz()));

        let plain = pattern.parse("20241226093045_0001_Graz_AT.jpg").expect("processed");
        assert_eq!(plain.suffix, None);
        let four_digits = pattern.parse("20241226093045_0001_1234.jpg").expect("processed");
        assert_eq!(four_digits.suffix, None);
    }

    #[test]
    fn separator_validation() {
        assert_eq!(validate_separator('_'), Ok('_'));
        assert_eq!(validate_separator('-'), Ok('-'));
        assert!(validate_separator('.').is_err());
        assert!(validate_separator('a').is_err());
        assert!(validate_separator('/').is_err());
        assert!(validate_separator(' ').is_err());
    }
}
