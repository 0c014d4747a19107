use crate::geocode::GeoLabel;
use crate::metadata::Coordinates;
use crate::naming::format_timestamp;
use chrono::NaiveDateTime;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageDecoder, ImageReader, Rgba, RgbaImage};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::str::FromStr;
use thiserror::Error;

const TILE_SIZE: u32 = 256;
const TILE_GRID: u32 = 3;
const DEFAULT_TILE_URL: &str = "https://tile.openstreetmap.org/{z}/{x}/{y}.png";
const EXIF_HEADER: &[u8; 6] = b"Exif\0\0";
const ORIENTATION_TAG: u16 = 0x0112;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MapSize {
    Small,
    #[default]
    Standard,
    Large,
}

impl MapSize {
    pub fn percent_of_width(self) -> u32 {
        match self {
            Self::Small => 10,
            Self::Standard => 15,
            Self::Large => 25,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MapZoom {
    Street,
    #[default]
    District,
    Region,
}

impl MapZoom {
    pub fn level(self) -> u32 {
        match self {
            Self::Street => 16,
            Self::District => 13,
            Self::Region => 10,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown value {0:?}")]
pub struct UnknownOption(String);

impl FromStr for MapSize {
    type Err = UnknownOption;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "small" => Ok(Self::Small),
            "standard" => Ok(Self::Standard),
            "large" => Ok(Self::Large),
            other => Err(UnknownOption(other.to_string())),
        }
    }
}

impl FromStr for MapZoom {
    type Err = UnknownOption;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "street" => Ok(Self::Street),
            "district" => Ok(Self::District),
            "region" => Ok(Self::Region),
            other => Err(UnknownOption(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct MapOptions {
    pub size: MapSize,
    pub opacity: u8,
    pub zoom: MapZoom,
}

impl Default for MapOptions {
    fn default() -> Self {
        Self {
            size: MapSize::default(),
            opacity: 70,
            zoom: MapZoom::default(),
        }
    }
}

impl MapOptions {
    pub fn clamped(mut self) -> Self {
        self.opacity = self.opacity.min(100);
        self
    }
}

#[derive(Debug, Clone)]
pub struct CompositeRequest<'a> {
    pub path: &'a Path,
    pub captured_at: Option<NaiveDateTime>,
    pub label: Option<&'a GeoLabel>,
    pub coordinates: Option<Coordinates>,
    pub watermark: bool,
    pub map: Option<MapOptions>,
}

#[derive(Debug, Error)]
pub enum CompositeError {
    #[error("{0}")]
    Unsupported(String),
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("no map tiles could be downloaded")]
    NoTiles,
    #[error("{program} exited with {status}")]
    Command { program: String, status: String },
}

/// Draws overlays into an image file in place.
///
/// The executor calls this on a staged copy before the final rename, so a
/// failing compositor never leaves a tagged name without its overlay.
pub trait Compositor {
    fn composite(&self, request: &CompositeRequest<'_>) -> Result<(), CompositeError>;
}

/// Built-in OpenStreetMap thumbnail overlay. Text watermarks are not drawn.
pub struct MapOverlayCompositor {
    client: Client,
    tile_url: String,
}

impl MapOverlayCompositor {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            tile_url: DEFAULT_TILE_URL.to_string(),
        }
    }

    fn fetch_tile(&self, zoom: u32, x: i64, y: i64) -> Option<DynamicImage> {
        let n = 1i64 << zoom;
        if y < 0 || y >= n {
            return None;
        }
        let x = x.rem_euclid(n);
        let url = self
            .tile_url
            .replace("{z}", &zoom.to_string())
            .replace("{x}", &x.to_string())
            .replace("{y}", &y.to_string());

        let response = match self.client.get(&url).send() {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                log::debug!("tile {url}: HTTP {}", r.status());
                return None;
            }
            Err(err) => {
                log::debug!("tile {url}: {err}");
                return None;
            }
        };
        let bytes = response.bytes().ok()?;
        image::load_from_memory(&bytes).ok()
    }

    fn render_map(
        &self,
        coords: Coordinates,
        zoom: u32,
        size: u32,
    ) -> Result<RgbaImage, CompositeError> {
        let (tx, ty) = tile_position(coords, zoom);
        let (tile_x, tile_y) = (tx.floor() as i64, ty.floor() as i64);
        let offset = (TILE_GRID / 2) as i64;

        let canvas_size = TILE_SIZE * TILE_GRID;
        let mut canvas =
            RgbaImage::from_pixel(canvas_size, canvas_size, Rgba([224, 224, 224, 255]));
        let mut fetched = 0usize;
        for dx in 0..TILE_GRID {
            for dy in 0..TILE_GRID {
                let x = tile_x + dx as i64 - offset;
                let y = tile_y + dy as i64 - offset;
                let Some(tile) = self.fetch_tile(zoom, x, y) else {
                    continue;
                };
                imageops::overlay(
                    &mut canvas,
                    &tile.to_rgba8(),
                    (dx * TILE_SIZE) as i64,
                    (dy * TILE_SIZE) as i64,
                );
                fetched += 1;
            }
        }
        if fetched == 0 {
            return Err(CompositeError::NoTiles);
        }

        let center_x = offset as f64 * TILE_SIZE as f64 + (tx - tile_x as f64) * TILE_SIZE as f64;
        let center_y = offset as f64 * TILE_SIZE as f64 + (ty - tile_y as f64) * TILE_SIZE as f64;
        let crop = size.min(canvas_size);
        let left = crop_origin(center_x, crop, canvas_size);
        let top = crop_origin(center_y, crop, canvas_size);

        let mut map = imageops::crop_imm(&canvas, left, top, crop, crop).to_image();
        if crop != size {
            map = imageops::resize(&map, size, size, FilterType::Lanczos3);
        }
        draw_pin(&mut map);
        Ok(map)
    }
}

impl Compositor for MapOverlayCompositor {
    fn composite(&self, request: &CompositeRequest<'_>) -> Result<(), CompositeError> {
        if request.watermark {
            return Err(CompositeError::Unsupported(
                "text watermarks need an external compositor command".to_string(),
            ));
        }
        let Some(options) = request.map else {
            return Ok(());
        };
        let coords = request.coordinates.ok_or_else(|| {
            CompositeError::Unsupported("map overlay needs GPS coordinates".to_string())
        })?;
        let options = options.clamped();

        let original = fs::read(request.path)?;
        // Pixels get rotated upright below, so the kept EXIF must say so.
        let exif = jpeg_exif_segment(&original).map(|mut segment| {
            normalize_exif_orientation(&mut segment);
            segment
        });

        let mut decoder = ImageReader::new(Cursor::new(original.as_slice()))
            .with_guessed_format()?
            .into_decoder()?;
        let orientation = decoder.orientation()?;
        let mut base = DynamicImage::from_decoder(decoder)?;
        base.apply_orientation(orientation);
        let mut base = base.to_rgba8();

        let size = (base.width() * options.size.percent_of_width() / 100).max(64);
        let map = self.render_map(coords, options.zoom.level(), size)?;
        let padding = (size / 12).max(4);
        let x = base.width().saturating_sub(size + padding);
        blend_into(&mut base, &map, x, padding, options.opacity);

        save_replacing(request.path, DynamicImage::ImageRgba8(base), exif.as_deref())?;
        log::info!(
            "map overlay {}px, {}% opacity, zoom {} on {}",
            size,
            options.opacity,
            options.zoom.level(),
            request.path.display()
        );
        Ok(())
    }
}

/// Runs an external program: `<program> [args..] --date .. [--city .. --country ..]
/// [--lat .. --lon ..] [--watermark] [--map-size % --map-opacity % --map-zoom z] <file>`.
#[derive(Debug, Clone)]
pub struct CommandCompositor {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandCompositor {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    fn arguments(&self, request: &CompositeRequest<'_>) -> Vec<String> {
        let mut out = self.args.clone();
        if let Some(date) = request.captured_at {
            out.extend(["--date".to_string(), format_timestamp(&date)]);
        }
        if let Some(label) = request.label {
            out.extend([
                "--city".to_string(),
                label.city.clone(),
                "--country".to_string(),
                label.country.clone(),
            ]);
        }
        if let Some(coords) = request.coordinates {
            out.extend([
                "--lat".to_string(),
                coords.latitude.to_string(),
                "--lon".to_string(),
                coords.longitude.to_string(),
            ]);
        }
        if request.watermark {
            out.push("--watermark".to_string());
        }
        if let Some(map) = request.map.map(MapOptions::clamped) {
            out.extend([
                "--map-size".to_string(),
                map.size.percent_of_width().to_string(),
                "--map-opacity".to_string(),
                map.opacity.to_string(),
                "--map-zoom".to_string(),
                map.zoom.level().to_string(),
            ]);
        }
        out.push(request.path.to_string_lossy().to_string());
        out
    }
}

impl Compositor for CommandCompositor {
    fn composite(&self, request: &CompositeRequest<'_>) -> Result<(), CompositeError> {
        let status = Command::new(&self.program)
            .args(self.arguments(request))
            .status()?;
        if status.success() {
            Ok(())
        } else {
            Err(CompositeError::Command {
                program: self.program.display().to_string(),
                status: status.to_string(),
            })
        }
    }
}

/// Fractional slippy-map tile coordinates of a position.
pub fn tile_position(coords: Coordinates, zoom: u32) -> (f64, f64) {
    let n = f64::from(1u32 << zoom);
    let lat = coords.latitude.clamp(-85.051_128, 85.051_128).to_radians();
    let x = (coords.longitude + 180.0) / 360.0 * n;
    let y = (1.0 - lat.tan().asinh() / std::f64::consts::PI) / 2.0 * n;
    (x, y)
}

fn crop_origin(center: f64, crop: u32, canvas: u32) -> u32 {
    let start = (center - f64::from(crop) / 2.0).round();
    start.clamp(0.0, f64::from(canvas - crop)) as u32
}

fn draw_pin(map: &mut RgbaImage) {
    let cx = map.width() as i64 / 2;
    let cy = map.height() as i64 / 2;
    let radius = (map.width() as i64 / 20).max(4);
    let ring = radius + 2;
    for y in (cy - ring).max(0)..(cy + ring + 1).min(map.height() as i64) {
        for x in (cx - ring).max(0)..(cx + ring + 1).min(map.width() as i64) {
            let d2 = (x - cx).pow(2) + (y - cy).pow(2);
            let pixel = if d2 <= radius.pow(2) {
                Rgba([220, 50, 50, 255])
            } else if d2 <= ring.pow(2) {
                Rgba([255, 255, 255, 255])
            } else {
                continue;
            };
            map.put_pixel(x as u32, y as u32, pixel);
        }
    }
}

fn blend_into(base: &mut RgbaImage, overlay: &RgbaImage, left: u32, top: u32, opacity: u8) {
    let alpha = f32::from(opacity.min(100)) / 100.0;
    for (ox, oy, src) in overlay.enumerate_pixels() {
        let (x, y) = (left + ox, top + oy);
        if x >= base.width() || y >= base.height() {
            continue;
        }
        let a = alpha * f32::from(src[3]) / 255.0;
        let dst = base.get_pixel_mut(x, y);
        for c in 0..3 {
            dst[c] = (f32::from(src[c]) * a + f32::from(dst[c]) * (1.0 - a)).round() as u8;
        }
    }
}

/// Re-encodes `image` over `path` through a `.partial` sibling. For JPEG the
/// given APP1 payload (`Exif\0\0` included) is written back into the output.
fn save_replacing(
    path: &Path,
    image: DynamicImage,
    exif: Option<&[u8]>,
) -> Result<(), CompositeError> {
    let file_name = path
        .file_name()
        .map(|v| v.to_string_lossy().to_string())
        .unwrap_or_else(|| "image".to_string());
    let partial = path.with_file_name(format!(".{file_name}.partial"));
    let is_jpeg = path
        .extension()
        .map(|ext| {
            let ext = ext.to_string_lossy();
            ext.eq_ignore_ascii_case("jpg") || ext.eq_ignore_ascii_case("jpeg")
        })
        .unwrap_or(false);

    let written = if is_jpeg {
        let mut encoded = Vec::new();
        JpegEncoder::new_with_quality(&mut encoded, 95).encode_image(&image.to_rgb8())?;
        if let Some(exif) = exif {
            insert_exif_segment(&mut encoded, exif);
        }
        fs::write(&partial, &encoded).map_err(CompositeError::from)
    } else {
        if exif.is_some() {
            log::debug!("EXIF not carried over for {}", path.display());
        }
        let format = image::ImageFormat::from_path(path)?;
        image
            .save_with_format(&partial, format)
            .map_err(CompositeError::from)
    };
    if let Err(err) = written {
        let _ = fs::remove_file(&partial);
        return Err(err);
    }
    fs::rename(&partial, path)?;
    Ok(())
}

/// Walks the JPEG marker segments up to the scan and returns the first APP1
/// payload that starts with `Exif\0\0`.
fn jpeg_exif_segment(jpeg: &[u8]) -> Option<Vec<u8>> {
    if !jpeg.starts_with(&[0xFF, 0xD8]) {
        return None;
    }
    let mut pos = 2;
    while pos + 4 <= jpeg.len() && jpeg[pos] == 0xFF {
        let marker = jpeg[pos + 1];
        if marker == 0xDA || marker == 0xD9 {
            break;
        }
        if marker == 0xFF {
            pos += 1;
            continue;
        }
        if marker == 0x01 || (0xD0..=0xD7).contains(&marker) {
            pos += 2;
            continue;
        }
        let len = usize::from(u16::from_be_bytes([jpeg[pos + 2], jpeg[pos + 3]]));
        if len < 2 {
            break;
        }
        let end = (pos + 2 + len).min(jpeg.len());
        let payload = &jpeg[pos + 4..end];
        if marker == 0xE1 && payload.starts_with(EXIF_HEADER) {
            return Some(payload.to_vec());
        }
        pos += 2 + len;
    }
    None
}

/// Places an APP1 segment after the APPn segments the encoder wrote.
fn insert_exif_segment(jpeg: &mut Vec<u8>, exif: &[u8]) {
    if !jpeg.starts_with(&[0xFF, 0xD8]) {
        return;
    }
    let Ok(len) = u16::try_from(exif.len() + 2) else {
        log::warn!("EXIF block of {} bytes does not fit a JPEG segment", exif.len());
        return;
    };

    let mut insert_at = 2;
    while insert_at + 4 <= jpeg.len()
        && jpeg[insert_at] == 0xFF
        && (0xE0..=0xEF).contains(&jpeg[insert_at + 1])
    {
        let seg_len = usize::from(u16::from_be_bytes([jpeg[insert_at + 2], jpeg[insert_at + 3]]));
        if seg_len < 2 {
            break;
        }
        insert_at += 2 + seg_len;
    }

    let mut segment = Vec::with_capacity(exif.len() + 4);
    segment.extend_from_slice(&[0xFF, 0xE1]);
    segment.extend_from_slice(&len.to_be_bytes());
    segment.extend_from_slice(exif);
    jpeg.splice(insert_at..insert_at, segment);
}

/// Rewrites IFD0 Orientation to 1 (top-left) in an `Exif\0\0`-prefixed block.
fn normalize_exif_orientation(exif: &mut [u8]) {
    let tiff = EXIF_HEADER.len();
    if exif.len() < tiff + 8 {
        return;
    }
    let le = match &exif[tiff..tiff + 2] {
        b"II" => true,
        b"MM" => false,
        _ => return,
    };
    let mut pos = tiff + read_u32(&exif[tiff + 4..tiff + 8], le) as usize;
    if pos + 2 > exif.len() {
        return;
    }
    let entries = usize::from(read_u16(&exif[pos..pos + 2], le));
    pos += 2;
    for _ in 0..entries {
        if pos + 12 > exif.len() {
            return;
        }
        if read_u16(&exif[pos..pos + 2], le) == ORIENTATION_TAG {
            let value = if le { 1u16.to_le_bytes() } else { 1u16.to_be_bytes() };
            exif[pos + 8..pos + 10].copy_from_slice(&value);
            return;
        }
        pos += 12;
    }
}

fn read_u16(bytes: &[u8], le: bool) -> u16 {
    let raw = [bytes[0], bytes[1]];
    if le {
        u16::from_le_bytes(raw)
    } else {
        u16::from_be_bytes(raw)
    }
}

fn read_u32(bytes: &[u8], le: bool) -> u32 {
    let raw = [bytes[0], bytes[1], bytes[2], bytes[3]];
    if le {
        u32::from_le_bytes(raw)
    } else {
        u32::from_be_bytes(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exif_reader::read_exif_metadata;
    use image::RgbImage;

    // Little-endian TIFF: IFD0 {Orientation, ExifIFD pointer}, ExifIFD {DateTimeOriginal}.
    fn exif_block(orientation: u16) -> Vec<u8> {
        let mut tiff = Vec::new();
        tiff.extend_from_slice(b"II");
        tiff.extend_from_slice(&42u16.to_le_bytes());
        tiff.extend_from_slice(&8u32.to_le_bytes());

        tiff.extend_from_slice(&2u16.to_le_bytes());
        tiff.extend_from_slice(&0x0112u16.to_le_bytes());
        tiff.extend_from_slice(&3u16.to_le_bytes());
        tiff.extend_from_slice(&1u32.to_le_bytes());
        tiff.extend_from_slice(&orientation.to_le_bytes());
        tiff.extend_from_slice(&[0, 0]);
        tiff.extend_from_slice(&0x8769u16.to_le_bytes());
        tiff.extend_from_slice(&4u16.to_le_bytes());
        tiff.extend_from_slice(&1u32.to_le_bytes());
        tiff.extend_from_slice(&38u32.to_le_bytes());
        tiff.extend_from_slice(&0u32.to_le_bytes());

        tiff.extend_from_slice(&1u16.to_le_bytes());
        tiff.extend_from_slice(&0x9003u16.to_le_bytes());
        tiff.extend_from_slice(&2u16.to_le_bytes());
        tiff.extend_from_slice(&20u32.to_le_bytes());
        tiff.extend_from_slice(&56u32.to_le_bytes());
        tiff.extend_from_slice(&0u32.to_le_bytes());
        tiff.extend_from_slice(b"2024:12:26 09:30:45\0");

        let mut block = EXIF_HEADER.to_vec();
        block.extend_from_slice(&tiff);
        block
    }

    fn plain_jpeg() -> Vec<u8> {
        let mut out = Vec::new();
        JpegEncoder::new_with_quality(&mut out, 90)
            .encode_image(&RgbImage::from_pixel(16, 8, image::Rgb([40, 90, 160])))
            .unwrap();
        out
    }

    fn orientation_of(path: &Path) -> Option<u32> {
        let file = std::fs::File::open(path).unwrap();
        let exif = exif::Reader::new()
            .read_from_container(&mut std::io::BufReader::new(file))
            .unwrap();
        exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)
            .and_then(|field| field.value.get_uint(0))
    }

    #[test]
    fn tile_position_matches_slippy_map_formula() {
        let (x, y) = tile_position(
            Coordinates {
                latitude: 0.0,
                longitude: 0.0,
            },
            1,
        );
        assert!((x - 1.0).abs() < 1e-9);
        assert!((y - 1.0).abs() < 1e-9);

        let (x, y) = tile_position(
            Coordinates {
                latitude: 47.0707,
                longitude: 15.4395,
            },
            13,
        );
        assert_eq!(x.floor() as i64, 4447);
        assert_eq!(y.floor() as i64, 2878);
    }

    #[test]
    fn crop_origin_clamps_to_canvas() {
        assert_eq!(crop_origin(384.0, 200, 768), 284);
        assert_eq!(crop_origin(10.0, 200, 768), 0);
        assert_eq!(crop_origin(760.0, 200, 768), 568);
        assert_eq!(crop_origin(384.0, 768, 768), 0);
    }

    #[test]
    fn options_parse_and_map_to_values() {
        assert_eq!("Large".parse::<MapSize>(), Ok(MapSize::Large));
        assert_eq!("street".parse::<MapZoom>(), Ok(MapZoom::Street));
        assert!("huge".parse::<MapSize>().is_err());
        assert_eq!(MapSize::Small.percent_of_width(), 10);
        assert_eq!(MapZoom::Region.level(), 10);
        let clamped = MapOptions {
            opacity: 180,
            ..MapOptions::default()
        }
        .clamped();
        assert_eq!(clamped.opacity, 100);
    }

    #[test]
    fn blend_respects_opacity_and_bounds() {
        let mut base = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255]));
        let overlay = RgbaImage::from_pixel(3, 3, Rgba([200, 100, 50, 255]));
        blend_into(&mut base, &overlay, 2, 2, 50);
        assert_eq!(base.get_pixel(0, 0), &Rgba([0, 0, 0, 255]));
        assert_eq!(base.get_pixel(3, 3), &Rgba([100, 50, 25, 255]));
    }

    #[test]
    fn pin_is_centered() {
        let mut map = RgbaImage::from_pixel(100, 100, Rgba([0, 0, 0, 255]));
        draw_pin(&mut map);
        assert_eq!(map.get_pixel(50, 50), &Rgba([220, 50, 50, 255]));
        assert_eq!(map.get_pixel(0, 0), &Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn command_arguments_carry_request_fields() {
        let compositor =
            CommandCompositor::new("overlay", vec!["--font".to_string(), "x.ttf".to_string()]);
        let label = GeoLabel {
            city: "Graz".to_string(),
            country: "AT".to_string(),
            provider: "test".to_string(),
        };
        let captured = chrono::NaiveDate::from_ymd_opt(2024, 12, 26)
            .and_then(|d| d.and_hms_opt(9, 30, 45))
            .expect("valid");
        let request = CompositeRequest {
            path: Path::new("/tmp/a.jpg"),
            captured_at: Some(captured),
            label: Some(&label),
            coordinates: None,
            watermark: true,
            map: Some(MapOptions::default()),
        };
        let args = compositor.arguments(&request);
        assert_eq!(args[..4], ["--font", "x.ttf", "--date", "20241226093045"]);
        assert!(args.contains(&"--watermark".to_string()));
        assert!(args.windows(2).any(|w| w == ["--map-zoom", "13"]));
        assert_eq!(args.last().map(String::as_str), Some("/tmp/a.jpg"));
    }

    #[test]
    fn failing_command_is_an_error() {
        let compositor = CommandCompositor::new("/definitely/not/a/program", Vec::new());
        let request = CompositeRequest {
            path: Path::new("/tmp/a.jpg"),
            captured_at: None,
            label: None,
            coordinates: None,
            watermark: true,
            map: None,
        };
        assert!(compositor.composite(&request).is_err());
    }

    #[test]
    fn exif_segment_is_found_after_jfif_header() {
        assert_eq!(jpeg_exif_segment(&plain_jpeg()), None);

        let mut jpeg = plain_jpeg();
        insert_exif_segment(&mut jpeg, &exif_block(6));
        assert_eq!(jpeg_exif_segment(&jpeg), Some(exif_block(6)));
        assert!(image::load_from_memory(&jpeg).is_ok());
    }

    #[test]
    fn orientation_is_reset_in_both_byte_orders() {
        let mut block = exif_block(8);
        normalize_exif_orientation(&mut block);
        assert_eq!(block, exif_block(1));

        let mut big_endian = EXIF_HEADER.to_vec();
        big_endian.extend_from_slice(b"MM\0\x2a\0\0\0\x08");
        big_endian.extend_from_slice(&[0, 1, 0x01, 0x12, 0, 3, 0, 0, 0, 1, 0, 6, 0, 0]);
        big_endian.extend_from_slice(&[0, 0, 0, 0]);
        normalize_exif_orientation(&mut big_endian);
        assert_eq!(big_endian[6 + 8 + 2 + 8..6 + 8 + 2 + 10], [0, 1]);

        let mut truncated = EXIF_HEADER.to_vec();
        normalize_exif_orientation(&mut truncated);
        assert_eq!(truncated, EXIF_HEADER.to_vec());
    }

    #[test]
    fn re_encoded_jpeg_keeps_capture_date() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.jpg");
        let mut jpeg = plain_jpeg();
        insert_exif_segment(&mut jpeg, &exif_block(6));
        std::fs::write(&path, &jpeg).unwrap();

        let mut exif = jpeg_exif_segment(&std::fs::read(&path).unwrap()).unwrap();
        normalize_exif_orientation(&mut exif);
        let image = image::open(&path).unwrap();
        save_replacing(&path, image, Some(exif.as_slice())).unwrap();

        let expected = chrono::NaiveDate::from_ymd_opt(2024, 12, 26)
            .and_then(|d| d.and_hms_opt(9, 30, 45));
        assert_eq!(read_exif_metadata(&path).unwrap().date, expected);
        assert_eq!(orientation_of(&path), Some(1));
        assert!(!dir.path().join(".a.jpg.partial").exists());
    }

    #[test]
    fn re_encoding_without_exif_writes_plain_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("b.jpeg");
        std::fs::write(&path, plain_jpeg()).unwrap();

        let image = image::open(&path).unwrap();
        save_replacing(&path, image, None).unwrap();
        assert!(read_exif_metadata(&path).is_err());
        assert_eq!(image::image_dimensions(&path).unwrap(), (16, 8));
    }
}
